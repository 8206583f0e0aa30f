//! Story registry contracts and SQLite implementation.
//!
//! # Invariants
//! - `find_or_create_story` is idempotent: concurrent callers converge on the
//!   same row through the `UNIQUE(slug)` constraint.
//! - `revision` only moves forward, one step per committed token write.

use crate::model::story::{Revision, Story, StoryId};
use crate::repo::{ensure_connection_ready, RepoResult};
use rusqlite::{Connection, OptionalExtension, Row};

/// Repository interface for story rows.
pub trait StoryRepository {
    /// Returns the story with `slug`, creating it first when missing.
    fn find_or_create_story(&self, slug: &str) -> RepoResult<Story>;
    /// Loads one story by id.
    fn get_story(&self, id: StoryId) -> RepoResult<Option<Story>>;
}

/// SQLite-backed story repository.
pub struct SqliteStoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStoryRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl StoryRepository for SqliteStoryRepository<'_> {
    fn find_or_create_story(&self, slug: &str) -> RepoResult<Story> {
        self.conn.execute(
            "INSERT INTO stories (slug) VALUES (?1)
             ON CONFLICT(slug) DO NOTHING;",
            [slug],
        )?;
        let story = self.conn.query_row(
            "SELECT id, slug, revision, created_at
             FROM stories
             WHERE slug = ?1;",
            [slug],
            parse_story_row,
        )?;
        Ok(story)
    }

    fn get_story(&self, id: StoryId) -> RepoResult<Option<Story>> {
        let story = self
            .conn
            .query_row(
                "SELECT id, slug, revision, created_at
                 FROM stories
                 WHERE id = ?1;",
                [id],
                parse_story_row,
            )
            .optional()?;
        Ok(story)
    }
}

fn parse_story_row(row: &Row<'_>) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get("id")?,
        slug: row.get("slug")?,
        revision: row.get("revision")?,
        created_at: row.get("created_at")?,
    })
}

/// Bumps the story revision inside the caller's write transaction.
pub(crate) fn bump_revision(conn: &Connection, story_id: StoryId) -> RepoResult<Revision> {
    let revision = conn.query_row(
        "UPDATE stories
         SET revision = revision + 1
         WHERE id = ?1
         RETURNING revision;",
        [story_id],
        |row| row.get(0),
    )?;
    Ok(revision)
}

/// Current revision, or `0` for an unknown story.
pub(crate) fn revision_of(conn: &Connection, story_id: StoryId) -> RepoResult<Revision> {
    let revision = conn
        .query_row(
            "SELECT revision FROM stories WHERE id = ?1;",
            [story_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(revision.unwrap_or(0))
}
