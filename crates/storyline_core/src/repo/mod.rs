//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for stories, tokens and
//!   submissions.
//! - Isolate SQLite query details from service orchestration.
//! - Own every position assignment and renumbering.
//!
//! # Invariants
//! - Repository writes validate token values and positions before SQL
//!   mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Multi-row mutations run inside one `BEGIN IMMEDIATE` transaction.

pub mod insertion;
pub mod story_repo;
pub mod submission_repo;
pub mod token_repo;

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::story::StoryId;
use crate::model::token::TokenValidationError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for story persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(TokenValidationError),
    Db(DbError),
    StoryNotFound(StoryId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
}

impl RepoError {
    /// Returns whether retrying the whole transaction may succeed.
    pub fn is_write_conflict(&self) -> bool {
        match self {
            Self::Db(err) => err.is_write_conflict(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::StoryNotFound(id) => write!(f, "story not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "story repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted story data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::StoryNotFound(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<TokenValidationError> for RepoError {
    fn from(value: TokenValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Rejects connections that did not go through `db::open_db*`.
pub(crate) fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
