//! Authoritative state-change descriptions.
//!
//! # Responsibility
//! - Define the single patch representation returned to the writer and
//!   broadcast to every subscriber.
//!
//! # Invariants
//! - Patches carry server-computed positions; receivers never derive their
//!   own.
//! - Unknown `type` tags deserialize to [`Patch::Unknown`] so older clients
//!   ignore newer patch kinds instead of failing.

use super::story::{Revision, StoryId};
use super::token::{Position, PositionedToken};
use serde::{Deserialize, Serialize};

/// State change produced by one committed store transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Patch {
    /// Tokens inserted at `from..=to`.
    Insert(InsertPatch),
    /// One token removed by moderation; later positions closed the gap.
    Delete(DeletePatch),
    /// Any patch kind this build does not understand.
    #[serde(other)]
    Unknown,
}

impl Patch {
    /// Returns the story the patch belongs to, when known.
    pub fn story_id(&self) -> Option<StoryId> {
        match self {
            Self::Insert(patch) => Some(patch.story_id),
            Self::Delete(patch) => Some(patch.story_id),
            Self::Unknown => None,
        }
    }

    /// Story revision written by the change, when the sender supplied one.
    pub fn revision(&self) -> Option<Revision> {
        match self {
            Self::Insert(patch) => patch.revision,
            Self::Delete(patch) => patch.revision,
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertPatch {
    pub story_id: StoryId,
    /// Number of inserted tokens.
    pub inserted: usize,
    /// First inserted position.
    pub from: Position,
    /// Last inserted position (inclusive).
    pub to: Position,
    /// Server-declared first visible position after this insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start_position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    pub tokens: Vec<PositionedToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePatch {
    pub story_id: StoryId,
    pub position: Position,
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start_position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
}
