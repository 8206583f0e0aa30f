//! Token domain model.
//!
//! # Responsibility
//! - Define the smallest immutable unit of story state.
//! - Validate token values before they reach persistence.
//!
//! # Invariants
//! - `value` is non-empty, at most [`TOKEN_MAX_CHARS`] characters and
//!   contains no whitespace or control characters.
//! - `position >= 1` and is unique within one story.

use super::story::{StoryId, UserId};
use super::submission::SubmissionId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// 1-based ordering key of a token within its story.
pub type Position = i64;

/// Maximum token length, in characters.
pub const TOKEN_MAX_CHARS: usize = 48;

/// Persisted token row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: i64,
    pub story_id: StoryId,
    pub user_id: UserId,
    /// Provenance link; cleared if the submission row ever disappears.
    pub submission_id: Option<SubmissionId>,
    pub value: String,
    pub position: Position,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

/// Wire shape of a token: the only fields clients ever see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionedToken {
    pub value: String,
    pub position: Position,
}

impl PositionedToken {
    pub fn new(value: impl Into<String>, position: Position) -> Self {
        Self {
            value: value.into(),
            position,
        }
    }
}

/// Token value/position validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    EmptyValue,
    ValueTooLong { chars: usize, max: usize },
    ValueContainsWhitespace,
    /// SQLite text functions stop at NUL, so control characters never reach
    /// the store.
    ValueContainsControl,
    InvalidPosition(Position),
}

impl Display for TokenValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyValue => write!(f, "token value must not be empty"),
            Self::ValueTooLong { chars, max } => {
                write!(f, "token has {chars} characters; maximum is {max}")
            }
            Self::ValueContainsWhitespace => write!(f, "token value must not contain whitespace"),
            Self::ValueContainsControl => {
                write!(f, "token value must not contain control characters")
            }
            Self::InvalidPosition(position) => {
                write!(f, "token position must be >= 1, got {position}")
            }
        }
    }
}

impl Error for TokenValidationError {}

/// Validates one token value against the fragment rules.
pub fn validate_token_value(value: &str) -> Result<(), TokenValidationError> {
    if value.is_empty() {
        return Err(TokenValidationError::EmptyValue);
    }
    let chars = value.chars().count();
    if chars > TOKEN_MAX_CHARS {
        return Err(TokenValidationError::ValueTooLong {
            chars,
            max: TOKEN_MAX_CHARS,
        });
    }
    if value.chars().any(char::is_whitespace) {
        return Err(TokenValidationError::ValueContainsWhitespace);
    }
    if value.chars().any(char::is_control) {
        return Err(TokenValidationError::ValueContainsControl);
    }
    Ok(())
}

/// Validates a 1-based position.
pub fn validate_position(position: Position) -> Result<(), TokenValidationError> {
    if position < 1 {
        return Err(TokenValidationError::InvalidPosition(position));
    }
    Ok(())
}
