//! Bounded window over a story's token sequence.
//!
//! # Invariants
//! - The store keeps full history; the window is a read/broadcast-time
//!   clipping rule only.
//! - `window_start_position >= 1`.

use super::story::{Revision, StoryId};
use super::token::{Position, PositionedToken};
use serde::{Deserialize, Serialize};

/// Default number of most-recent tokens exposed to clients.
pub const WINDOW_SIZE: i64 = 10_000;

/// Materialized window: the canonical full-resync payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub story_id: StoryId,
    pub tokens: Vec<PositionedToken>,
    pub window_start_position: Position,
    /// Story revision the window was read at.
    #[serde(default)]
    pub revision: Revision,
}

impl Window {
    /// Returns an empty window for a story with no tokens.
    pub fn empty(story_id: StoryId, revision: Revision) -> Self {
        Self {
            story_id,
            tokens: Vec::new(),
            window_start_position: 1,
            revision,
        }
    }
}

/// Computes the first visible position for a story whose highest position
/// is `max_position`.
pub fn window_start_for(max_position: Position, window_size: i64) -> Position {
    (max_position - window_size + 1).max(1)
}

/// Drops every token positioned before `window_start_position`.
///
/// A boundary of `1` or less never removes anything. Applying the same
/// boundary twice is a no-op the second time.
pub fn clip_to_window(tokens: &mut Vec<PositionedToken>, window_start_position: Position) {
    if window_start_position > 1 {
        tokens.retain(|token| token.position >= window_start_position);
    }
}
