//! Core domain logic for Storyline, a shared story written one token at a
//! time during a recurring write window.
//! This crate is the single source of truth for ordering invariants.

pub mod client;
pub mod clock;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod opening;
pub mod repo;
pub mod service;

pub use client::mirror::{MirrorPolicy, StoryMirror};
pub use client::session::{ClientSession, ConnectionState};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::StoryConfig;
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use gateway::identity::{IdentityProvider, StaticIdentityProvider};
pub use gateway::protocol::{ClientEvent, ErrorPayload, PatchRequest, ServerEvent};
pub use gateway::session::Session;
pub use gateway::{Gateway, GatewayError};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::patch::{DeletePatch, InsertPatch, Patch};
pub use model::story::{Revision, Story, StoryId, UserId};
pub use model::token::{Position, PositionedToken, Token};
pub use model::window::Window;
pub use opening::{OpeningSchedule, OpeningState};
pub use repo::insertion::{AppendOnly, InsertionStrategy, ShiftInsert};
pub use repo::{RepoError, RepoResult};
pub use service::story_service::{StoryError, StoryService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
