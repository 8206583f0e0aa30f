//! Submission log contracts and SQLite implementation.
//!
//! # Responsibility
//! - Record one audit row per accepted write.
//! - Serve provenance reads for moderation tooling.
//!
//! # Invariants
//! - Rows are insert-only; nothing here updates or deletes them.
//! - [`insert_submission`] runs on the caller's transaction so the audit row
//!   commits or rolls back together with its tokens.

use crate::model::story::{StoryId, UserId};
use crate::model::submission::{Submission, SubmissionId};
use crate::repo::{ensure_connection_ready, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SUBMISSIONS_DEFAULT_LIMIT: u32 = 50;
const SUBMISSIONS_LIMIT_MAX: u32 = 500;

/// Writes one submission row and returns its id.
pub fn insert_submission(
    conn: &Connection,
    story_id: StoryId,
    user_id: UserId,
    text: &str,
) -> RepoResult<SubmissionId> {
    conn.execute(
        "INSERT INTO submissions (story_id, user_id, text)
         VALUES (?1, ?2, ?3);",
        params![story_id, user_id, text],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Repository interface for submission reads.
pub trait SubmissionRepository {
    /// Loads one submission by id.
    fn get_submission(&self, id: SubmissionId) -> RepoResult<Option<Submission>>;
    /// Lists a story's submissions, newest first.
    ///
    /// `limit` defaults to 50 and clamps to 500.
    fn list_submissions(&self, story_id: StoryId, limit: Option<u32>) -> RepoResult<Vec<Submission>>;
}

/// SQLite-backed submission repository.
pub struct SqliteSubmissionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSubmissionRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SubmissionRepository for SqliteSubmissionRepository<'_> {
    fn get_submission(&self, id: SubmissionId) -> RepoResult<Option<Submission>> {
        let submission = self
            .conn
            .query_row(
                "SELECT id, story_id, user_id, text, created_at
                 FROM submissions
                 WHERE id = ?1;",
                [id],
                parse_submission_row,
            )
            .optional()?;
        Ok(submission)
    }

    fn list_submissions(&self, story_id: StoryId, limit: Option<u32>) -> RepoResult<Vec<Submission>> {
        let limit = limit
            .unwrap_or(SUBMISSIONS_DEFAULT_LIMIT)
            .clamp(1, SUBMISSIONS_LIMIT_MAX);
        let mut stmt = self.conn.prepare(
            "SELECT id, story_id, user_id, text, created_at
             FROM submissions
             WHERE story_id = ?1
             ORDER BY id DESC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![story_id, i64::from(limit)])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_submission_row(row)?);
        }
        Ok(items)
    }
}

fn parse_submission_row(row: &Row<'_>) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: row.get("id")?,
        story_id: row.get("story_id")?,
        user_id: row.get("user_id")?,
        text: row.get("text")?,
        created_at: row.get("created_at")?,
    })
}
