//! Client connection lifecycle.
//!
//! # Invariants
//! - Every (re)connection starts with `join` then `resync`.
//! - Patches that arrive while a snapshot is pending are buffered and
//!   replayed on top of it; the mirror skips the ones it already holds.
//! - A dropped-events notice or a revision gap triggers another `resync`.

use crate::client::mirror::{MirrorPolicy, StoryMirror};
use crate::gateway::protocol::{
    ClientEvent, ErrorPayload, PatchRequest, ProtocolError, ServerEvent,
};
use crate::gateway::session::EVENTS_DROPPED;
use crate::model::patch::Patch;
use crate::model::window::Window;
use crate::opening::OpeningState;
use std::collections::VecDeque;

/// Patches kept while a snapshot is pending. Older ones go first; a gap
/// they leave behind is caught by the revision check.
pub const MAX_PENDING_PATCHES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Connected; waiting for a snapshot.
    AwaitingResync,
    Live,
}

/// Reconnecting client state machine around a [`StoryMirror`].
#[derive(Debug, Clone)]
pub struct ClientSession {
    mirror: StoryMirror,
    state: ConnectionState,
    opening: Option<OpeningState>,
    last_error: Option<ErrorPayload>,
    pending: VecDeque<Patch>,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSession {
    pub fn new() -> Self {
        Self::with_policy(MirrorPolicy::Append)
    }

    pub fn with_policy(policy: MirrorPolicy) -> Self {
        Self {
            mirror: StoryMirror::with_policy(policy),
            state: ConnectionState::Disconnected,
            opening: None,
            last_error: None,
            pending: VecDeque::new(),
        }
    }

    pub fn mirror(&self) -> &StoryMirror {
        &self.mirror
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Last Opening state the server reported.
    pub fn opening(&self) -> Option<&OpeningState> {
        self.opening.as_ref()
    }

    pub fn last_error(&self) -> Option<&ErrorPayload> {
        self.last_error.as_ref()
    }

    /// Number of patches waiting for the next snapshot.
    pub fn pending_patches(&self) -> usize {
        self.pending.len()
    }

    /// Whether the last known Opening state accepts writes.
    pub fn can_write(&self) -> bool {
        self.opening.map(|opening| opening.is_open).unwrap_or(false)
    }

    /// Returns the events to send right after the transport connects.
    pub fn on_connected(&mut self) -> Vec<ClientEvent> {
        self.state = ConnectionState::AwaitingResync;
        self.last_error = None;
        self.pending.clear();
        vec![ClientEvent::Join, ClientEvent::Resync]
    }

    pub fn on_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.pending.clear();
    }

    /// Builds a write intent. The server resolves story and position.
    pub fn submit(&mut self, text: impl Into<String>) -> ClientEvent {
        self.last_error = None;
        ClientEvent::Patch(PatchRequest::new(text))
    }

    /// Decodes one server frame and applies it.
    pub fn handle_frame(&mut self, frame: &str) -> Result<Vec<ClientEvent>, ProtocolError> {
        Ok(self.handle(ServerEvent::decode(frame)?))
    }

    /// Applies one server event and returns any follow-up events to send.
    pub fn handle(&mut self, event: ServerEvent) -> Vec<ClientEvent> {
        match event {
            ServerEvent::Resync(snapshot) => {
                self.mirror.reset(Window {
                    story_id: snapshot.story_id,
                    tokens: snapshot.tokens,
                    window_start_position: snapshot.window_start_position,
                    revision: snapshot.revision,
                });
                self.opening = Some(snapshot.opening);
                if self.state == ConnectionState::Disconnected {
                    return Vec::new();
                }
                self.state = ConnectionState::Live;
                self.replay_pending()
            }
            ServerEvent::State(state) => {
                self.opening = Some(state.opening);
                Vec::new()
            }
            ServerEvent::Opening(payload) => {
                self.opening = Some(payload.opening);
                Vec::new()
            }
            ServerEvent::Patch(patch) => match self.state {
                ConnectionState::Live => self.apply_live(patch),
                ConnectionState::AwaitingResync => {
                    self.buffer(patch);
                    Vec::new()
                }
                ConnectionState::Disconnected => Vec::new(),
            },
            ServerEvent::Error(error) => {
                if let Some(opening) = error
                    .details
                    .clone()
                    .and_then(|details| serde_json::from_value::<OpeningState>(details).ok())
                {
                    self.opening = Some(opening);
                }
                let resync = error.code == EVENTS_DROPPED && self.state == ConnectionState::Live;
                self.last_error = Some(error);
                if resync {
                    self.state = ConnectionState::AwaitingResync;
                    vec![ClientEvent::Resync]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn apply_live(&mut self, patch: Patch) -> Vec<ClientEvent> {
        if self.mirror.is_contiguous(&patch) {
            self.mirror.apply_patch(&patch);
            return Vec::new();
        }
        self.state = ConnectionState::AwaitingResync;
        self.buffer(patch);
        vec![ClientEvent::Resync]
    }

    fn replay_pending(&mut self) -> Vec<ClientEvent> {
        let mut follow_up = Vec::new();
        for patch in std::mem::take(&mut self.pending) {
            if self.state == ConnectionState::Live {
                follow_up = self.apply_live(patch);
            } else {
                self.buffer(patch);
            }
        }
        follow_up
    }

    fn buffer(&mut self, patch: Patch) {
        if self.pending.len() == MAX_PENDING_PATCHES {
            self.pending.pop_front();
        }
        self.pending.push_back(patch);
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientSession, ConnectionState};
    use crate::gateway::protocol::{ClientEvent, ErrorPayload, ResyncPayload, ServerEvent};
    use crate::gateway::session::EVENTS_DROPPED;
    use crate::model::patch::{InsertPatch, Patch};
    use crate::model::token::PositionedToken;
    use crate::opening::OpeningSchedule;
    use chrono::Utc;

    fn snapshot(values: &[&str], revision: i64) -> ServerEvent {
        ServerEvent::Resync(ResyncPayload {
            story_id: 1,
            tokens: values
                .iter()
                .enumerate()
                .map(|(index, value)| PositionedToken::new(*value, index as i64 + 1))
                .collect(),
            window_start_position: 1,
            revision,
            opening: OpeningSchedule::default().current_state(Utc::now()),
        })
    }

    fn appended(position: i64, value: &str, revision: i64) -> ServerEvent {
        ServerEvent::Patch(Patch::Insert(InsertPatch {
            story_id: 1,
            inserted: 1,
            from: position,
            to: position,
            window_start_position: Some(1),
            revision: Some(revision),
            tokens: vec![PositionedToken::new(value, position)],
        }))
    }

    #[test]
    fn connect_requests_join_then_resync() {
        let mut session = ClientSession::new();
        assert_eq!(
            session.on_connected(),
            vec![ClientEvent::Join, ClientEvent::Resync]
        );
        assert_eq!(session.state(), ConnectionState::AwaitingResync);
        session.on_disconnected();
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn events_dropped_before_first_resync_is_only_recorded() {
        let mut session = ClientSession::new();
        session.on_connected();

        let follow_up = session.handle(ServerEvent::Error(ErrorPayload::new(EVENTS_DROPPED, "missed")));
        assert!(follow_up.is_empty());
        assert_eq!(session.last_error().unwrap().code, EVENTS_DROPPED);
        assert!(!session.can_write());
    }

    #[test]
    fn events_dropped_while_live_requests_resync() {
        let mut session = ClientSession::new();
        session.on_connected();
        session.handle(snapshot(&[], 0));
        assert_eq!(session.state(), ConnectionState::Live);

        let follow_up = session.handle(ServerEvent::Error(ErrorPayload::new(EVENTS_DROPPED, "missed")));
        assert_eq!(follow_up, vec![ClientEvent::Resync]);
        assert_eq!(session.state(), ConnectionState::AwaitingResync);
    }

    #[test]
    fn patches_before_the_snapshot_are_replayed_on_top_of_it() {
        let mut session = ClientSession::new();
        session.on_connected();
        assert!(session.handle(appended(1, "once", 1)).is_empty());
        assert!(session.handle(appended(2, "upon", 2)).is_empty());
        assert_eq!(session.pending_patches(), 2);
        assert!(session.mirror().tokens().is_empty());

        // Read after the first commit but before the second.
        assert!(session.handle(snapshot(&["once"], 1)).is_empty());
        assert_eq!(session.mirror().text(), "once upon");
        assert_eq!(session.mirror().revision(), Some(2));
        assert_eq!(session.pending_patches(), 0);
    }

    #[test]
    fn revision_gap_requests_resync() {
        let mut session = ClientSession::new();
        session.on_connected();
        session.handle(snapshot(&["once"], 1));

        assert_eq!(session.handle(appended(3, "a", 3)), vec![ClientEvent::Resync]);
        assert_eq!(session.state(), ConnectionState::AwaitingResync);
        assert_eq!(session.mirror().text(), "once");

        assert!(session.handle(snapshot(&["once", "upon"], 2)).is_empty());
        assert_eq!(session.state(), ConnectionState::Live);
        assert_eq!(session.mirror().text(), "once upon a");
    }

    #[test]
    fn disconnect_discards_buffered_patches() {
        let mut session = ClientSession::new();
        session.on_connected();
        session.handle(appended(1, "once", 1));
        session.on_disconnected();
        assert_eq!(session.pending_patches(), 0);
        session.handle(appended(2, "upon", 2));
        assert_eq!(session.pending_patches(), 0);
    }

    #[test]
    fn frames_decode_into_events() {
        let mut session = ClientSession::new();
        session.on_connected();
        let frame = snapshot(&["once"], 1).encode().unwrap();
        assert!(session.handle_frame(&frame).unwrap().is_empty());
        assert_eq!(session.mirror().text(), "once");
        assert!(session.handle_frame("{").is_err());
    }
}
