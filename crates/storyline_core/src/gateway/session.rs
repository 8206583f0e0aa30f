//! Per-connection gateway state.
//!
//! # Responsibility
//! - Track the connection's identity and room membership.
//! - Relay room broadcasts into the connection's outbox.
//!
//! # Invariants
//! - A session joins at most one room; repeated joins are no-ops.
//! - A lagging room subscription is reported as an `EVENTS_DROPPED` error
//!   and the relay keeps running; the client recovers with `resync`.
//! - Dropping the session stops its relay task.

use crate::gateway::protocol::{ErrorPayload, ServerEvent};
use crate::model::story::{StoryId, UserId};
use log::{debug, warn};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Error code pushed when a subscriber fell behind its room.
pub const EVENTS_DROPPED: &str = "EVENTS_DROPPED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    Joined { story_id: StoryId },
}

/// One live connection.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    user_id: Option<UserId>,
    state: SessionState,
    outbox: mpsc::UnboundedSender<ServerEvent>,
    relay: Option<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(user_id: Option<UserId>, outbox: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            state: SessionState::Unjoined,
            outbox,
            relay: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Bound writer identity, `None` for anonymous readers.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn joined_story(&self) -> Option<StoryId> {
        match self.state {
            SessionState::Joined { story_id } => Some(story_id),
            SessionState::Unjoined => None,
        }
    }

    /// Queues an event for this connection only.
    ///
    /// Returns `false` once the connection's receiving half is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbox.send(event).is_ok()
    }

    /// Joins `story_id` using an already-created room subscription.
    ///
    /// Returns `false` when the session was already in the room.
    pub(crate) fn join(
        &mut self,
        story_id: StoryId,
        subscription: broadcast::Receiver<ServerEvent>,
    ) -> bool {
        if self.joined_story() == Some(story_id) {
            return false;
        }
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }

        self.relay = Some(tokio::spawn(relay_room(
            self.id,
            story_id,
            subscription,
            self.outbox.clone(),
        )));
        self.state = SessionState::Joined { story_id };
        true
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
    }
}

async fn relay_room(
    session_id: Uuid,
    story_id: StoryId,
    mut subscription: broadcast::Receiver<ServerEvent>,
    outbox: mpsc::UnboundedSender<ServerEvent>,
) {
    loop {
        match subscription.recv().await {
            Ok(event) => {
                if outbox.send(event).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    "event=room_relay module=gateway status=lagged session_id={} story_id={} skipped={}",
                    session_id, story_id, skipped
                );
                let dropped = ErrorPayload::new(EVENTS_DROPPED, "Missed updates; resync required")
                    .with_details(json!({ "skipped": skipped }));
                if outbox.send(ServerEvent::Error(dropped)).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!(
        "event=room_relay module=gateway status=stopped session_id={} story_id={}",
        session_id, story_id
    );
}
