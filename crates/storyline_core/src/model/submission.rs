//! Submission audit record.
//!
//! # Invariants
//! - `text` is the raw accepted input, before whitespace normalization.
//! - Rows are immutable once written; only a story cascade removes them.

use super::story::{StoryId, UserId};
use serde::{Deserialize, Serialize};

/// Store-assigned submission identifier.
pub type SubmissionId = i64;

/// Maximum raw submission length, in characters.
pub const SUBMISSION_MAX_CHARS: usize = 200;

/// One accepted write event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub story_id: StoryId,
    pub user_id: UserId,
    pub text: String,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}
