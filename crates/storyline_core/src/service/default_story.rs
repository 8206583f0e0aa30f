//! Process-wide default story id cache.
//!
//! # Invariants
//! - Resolved lazily on first use via idempotent find-or-create.
//! - Valid for the process lifetime once resolved.
//! - [`DefaultStoryCache::invalidate`] is always safe: the next call simply
//!   resolves again and lands on the same row.

use crate::model::story::{StoryId, DEFAULT_STORY_SLUG};
use crate::repo::story_repo::StoryRepository;
use crate::repo::RepoResult;
use log::info;
use std::sync::RwLock;

/// Cached id of the default story.
///
/// One instance is owned by the long-lived gateway, which gives it process
/// lifetime without a mutable global.
#[derive(Debug, Default)]
pub struct DefaultStoryCache {
    story_id: RwLock<Option<StoryId>>,
}

impl DefaultStoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached id, resolving it through `repo` on first use.
    pub fn resolve(&self, repo: &impl StoryRepository) -> RepoResult<StoryId> {
        if let Some(story_id) = self.cached() {
            return Ok(story_id);
        }

        let story = repo.find_or_create_story(DEFAULT_STORY_SLUG)?;
        let mut guard = self
            .story_id
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(story.id);
        info!(
            "event=default_story_resolved module=service status=ok story_id={}",
            story.id
        );
        Ok(story.id)
    }

    /// Returns the cached id without touching storage.
    pub fn cached(&self) -> Option<StoryId> {
        *self
            .story_id
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Forgets the cached id.
    pub fn invalidate(&self) {
        let mut guard = self
            .story_id
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }
}
