//! Realtime gateway.
//!
//! # Responsibility
//! - Bind connections to identities and story rooms.
//! - Enforce the write path: identity, then a fresh Opening check, then the
//!   story service.
//! - Fan committed patches and Opening changes out to subscribers.
//!
//! # Invariants
//! - No error closes a connection; every failure becomes an `error` event.
//! - A committed patch is always published to its room, origin included.
//!   Failed submissions are reported to the writer only.
//! - Infrastructure details never reach the wire.
//! - The Opening check and the store transaction are separate steps; a
//!   submission checked just before close may commit just after it.

pub mod hub;
pub mod identity;
pub mod opening_timer;
pub mod protocol;
pub mod session;

use crate::clock::Clock;
use crate::config::StoryConfig;
use crate::model::patch::Patch;
use crate::model::story::{StoryId, UserId};
use crate::model::token::Position;
use crate::model::window::Window;
use crate::opening::OpeningState;
use crate::repo::insertion::{AppendOnly, InsertionStrategy};
use crate::repo::story_repo::SqliteStoryRepository;
use crate::repo::token_repo::SqliteTokenRepository;
use crate::repo::RepoError;
use crate::service::default_story::DefaultStoryCache;
use crate::service::story_service::{StoryError, StoryService};
use hub::RoomHub;
use log::{error, info, warn};
use opening_timer::OpeningTimer;
use protocol::{
    ClientEvent, ErrorPayload, OpeningPayload, PatchRequest, ResyncPayload, ServerEvent,
    StatePayload,
};
use rusqlite::Connection;
use session::Session;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Gateway-level error.
#[derive(Debug)]
pub enum GatewayError {
    /// Write attempted without a bound identity.
    Unauthorized,
    /// Write attempted outside the Opening.
    OpeningClosed(OpeningState),
    /// Undecodable frame or unknown event.
    BadRequest(String),
    Story(StoryError),
    /// Runtime failure outside the story service.
    Internal(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::OpeningClosed(_) => "OPENING_CLOSED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Story(err) => err.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_infrastructure(&self) -> bool {
        match self {
            Self::Story(err) => err.is_infrastructure(),
            Self::Internal(_) => true,
            _ => false,
        }
    }

    /// Client-facing error payload.
    pub fn to_payload(&self) -> ErrorPayload {
        if self.is_infrastructure() {
            return ErrorPayload::new(self.code(), INTERNAL_ERROR_MESSAGE);
        }
        let payload = ErrorPayload::new(self.code(), self.to_string());
        match self {
            Self::OpeningClosed(state) => match serde_json::to_value(state) {
                Ok(details) => payload.with_details(details),
                Err(_) => payload,
            },
            _ => payload,
        }
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "Sign in to write"),
            Self::OpeningClosed(_) => write!(f, "The Opening is closed"),
            Self::BadRequest(message) => write!(f, "Bad request: {message}"),
            Self::Story(err) => write!(f, "{err}"),
            Self::Internal(message) => write!(f, "{message}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Story(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoryError> for GatewayError {
    fn from(value: StoryError) -> Self {
        Self::Story(value)
    }
}

impl From<RepoError> for GatewayError {
    fn from(value: RepoError) -> Self {
        Self::Story(value.into())
    }
}

/// Shared gateway handle. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    conn: Mutex<Connection>,
    config: StoryConfig,
    clock: Arc<dyn Clock>,
    strategy: Arc<dyn InsertionStrategy>,
    rooms: RoomHub,
    default_story: DefaultStoryCache,
}

impl GatewayInner {
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn default_story_id(&self, conn: &Connection) -> Result<StoryId, GatewayError> {
        let repo = SqliteStoryRepository::try_new(conn)?;
        Ok(self.default_story.resolve(&repo)?)
    }

    fn story_service<'conn>(
        &self,
        conn: &'conn Connection,
    ) -> Result<StoryService<SqliteTokenRepository<'conn>>, GatewayError> {
        let repo = SqliteTokenRepository::try_new(conn)?;
        Ok(StoryService::with_config(repo, self.config)
            .with_shared_strategy(Arc::clone(&self.strategy)))
    }
}

impl Gateway {
    /// Creates a gateway over an opened database with append-only insertion.
    pub fn new(conn: Connection, config: StoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_strategy(conn, config, clock, Arc::new(AppendOnly))
    }

    pub fn with_strategy(
        conn: Connection,
        config: StoryConfig,
        clock: Arc<dyn Clock>,
        strategy: Arc<dyn InsertionStrategy>,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                conn: Mutex::new(conn),
                config,
                clock,
                strategy,
                rooms: RoomHub::new(),
                default_story: DefaultStoryCache::new(),
            }),
        }
    }

    pub fn config(&self) -> &StoryConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    pub fn rooms(&self) -> &RoomHub {
        &self.inner.rooms
    }

    /// Opens a session for a connection whose identity is already resolved.
    pub fn connect(&self, user_id: Option<UserId>) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let session = Session::new(user_id, outbox);
        info!(
            "event=session_connect module=gateway status=ok session_id={} writer={}",
            session.id(),
            user_id.is_some()
        );
        (session, inbox)
    }

    /// Fresh Opening state from the gateway clock.
    pub fn opening_state(&self) -> OpeningState {
        self.inner.config.opening.current_state(self.inner.clock.now())
    }

    /// Pushes the current Opening state to every room.
    pub fn broadcast_opening(&self) -> OpeningState {
        let opening = self.opening_state();
        let delivered = self
            .inner
            .rooms
            .publish_all(ServerEvent::Opening(OpeningPayload { opening }));
        info!(
            "event=opening_broadcast module=gateway status=ok is_open={} receivers={}",
            opening.is_open, delivered
        );
        opening
    }

    /// Starts the background Opening broadcaster.
    pub fn spawn_opening_timer(&self) -> OpeningTimer {
        OpeningTimer::spawn(self.clone())
    }

    /// Resolves (and caches) the default story id.
    pub async fn default_story_id(&self) -> Result<StoryId, GatewayError> {
        self.run_blocking(|inner| {
            let conn = inner.lock_conn();
            inner.default_story_id(&conn)
        })
        .await
    }

    /// Current window of the default story.
    pub async fn window(&self) -> Result<Window, GatewayError> {
        self.run_blocking(|inner| {
            let conn = inner.lock_conn();
            let story_id = inner.default_story_id(&conn)?;
            let service = inner.story_service(&conn)?;
            service.window(story_id).map_err(GatewayError::from)
        })
        .await
    }

    /// Handles one frame exactly as the transport received it.
    pub async fn handle_bytes(&self, session: &mut Session, frame: &[u8]) {
        match std::str::from_utf8(frame) {
            Ok(frame) => self.handle_frame(session, frame).await,
            Err(_) => self.reject_frame(session, "frame is not valid UTF-8"),
        }
    }

    /// Reports a frame the transport could not deliver intact.
    pub fn reject_frame(&self, session: &Session, reason: &str) {
        self.report(session, "decode", GatewayError::BadRequest(reason.to_string()));
    }

    /// Decodes and handles one raw frame.
    pub async fn handle_frame(&self, session: &mut Session, frame: &str) {
        match ClientEvent::decode(frame) {
            Ok(event) => self.handle_event(session, event).await,
            Err(err) => self.report(session, "decode", GatewayError::BadRequest(err.to_string())),
        }
    }

    /// Handles one decoded client event. Failures are pushed to the session.
    pub async fn handle_event(&self, session: &mut Session, event: ClientEvent) {
        let name = event.name();
        let result = match event {
            ClientEvent::Join => self.join(session).await,
            ClientEvent::Resync => self.resync(session).await,
            ClientEvent::Patch(request) => self.submit(session, request).await,
        };
        if let Err(err) = result {
            self.report(session, name, err);
        }
    }

    /// Deletes a token from the default story and fans out the result.
    ///
    /// Moderation entry point; no client event reaches it.
    pub async fn moderate_delete(&self, position: Position) -> Result<Patch, GatewayError> {
        let patch = self
            .run_blocking(move |inner| {
                let conn = inner.lock_conn();
                let story_id = inner.default_story_id(&conn)?;
                let service = inner.story_service(&conn)?;
                service
                    .delete_token(story_id, position)
                    .map_err(GatewayError::from)
            })
            .await?;

        if let Patch::Delete(delete) = &patch {
            if delete.deleted {
                self.inner
                    .rooms
                    .publish(delete.story_id, ServerEvent::Patch(patch.clone()));
            }
        }
        Ok(patch)
    }

    async fn join(&self, session: &mut Session) -> Result<(), GatewayError> {
        let story_id = self.default_story_id().await?;
        if session.join(story_id, self.inner.rooms.subscribe(story_id)) {
            info!(
                "event=session_join module=gateway status=ok session_id={} story_id={}",
                session.id(),
                story_id
            );
        }
        session.send(ServerEvent::State(StatePayload {
            story_id,
            opening: self.opening_state(),
        }));
        Ok(())
    }

    async fn resync(&self, session: &mut Session) -> Result<(), GatewayError> {
        let window = self.window().await?;
        session.send(ServerEvent::Resync(ResyncPayload {
            story_id: window.story_id,
            tokens: window.tokens,
            window_start_position: window.window_start_position,
            revision: window.revision,
            opening: self.opening_state(),
        }));
        Ok(())
    }

    async fn submit(&self, session: &mut Session, request: PatchRequest) -> Result<(), GatewayError> {
        let user_id = session.user_id().ok_or(GatewayError::Unauthorized)?;
        let opening = self.opening_state();
        if !opening.is_open {
            return Err(GatewayError::OpeningClosed(opening));
        }

        let text = request.submit_event.unwrap_or_default();
        let patch = self
            .run_blocking(move |inner| {
                let conn = inner.lock_conn();
                let story_id = inner.default_story_id(&conn)?;
                let service = inner.story_service(&conn)?;
                service
                    .submit(story_id, user_id, &text)
                    .map_err(GatewayError::from)
            })
            .await?;

        let Some(story_id) = patch.story_id() else {
            return Ok(());
        };
        if session.joined_story() != Some(story_id) {
            session.send(ServerEvent::Patch(patch.clone()));
        }
        self.inner.rooms.publish(story_id, ServerEvent::Patch(patch));
        Ok(())
    }

    fn report(&self, session: &Session, event: &str, err: GatewayError) {
        if err.is_infrastructure() {
            error!(
                "event=gateway_{} module=gateway status=error session_id={} error_code={} error={}",
                event,
                session.id(),
                err.code(),
                err
            );
        } else {
            warn!(
                "event=gateway_{} module=gateway status=rejected session_id={} error_code={}",
                event,
                session.id(),
                err.code()
            );
        }
        session.send(ServerEvent::Error(err.to_payload()));
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&GatewayInner) -> Result<T, GatewayError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || work(&inner))
            .await
            .map_err(|err| GatewayError::Internal(format!("store task failed: {err}")))?
    }
}
