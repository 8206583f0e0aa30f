//! Story identity model.

use serde::{Deserialize, Serialize};

/// Store-assigned story identifier (always `>= 1`).
pub type StoryId = i64;

/// Per-story change counter, bumped by every committed token write.
///
/// Snapshots and patches carry it so replicas can tell which changes a
/// snapshot already contains.
pub type Revision = i64;

/// Opaque writer identifier supplied by the external identity provider.
pub type UserId = i64;

/// Slug of the single story every connection joins.
pub const DEFAULT_STORY_SLUG: &str = "default";

/// One shared document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub slug: String,
    pub revision: Revision,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

/// Returns whether `id` can name a persisted story.
pub fn is_valid_story_id(id: StoryId) -> bool {
    id >= 1
}

/// Returns whether `id` can name an authenticated writer.
pub fn is_valid_user_id(id: UserId) -> bool {
    id >= 1
}
