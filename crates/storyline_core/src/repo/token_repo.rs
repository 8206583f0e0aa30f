//! Token store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the ordered token sequence of each story.
//! - Run the submission append transaction (submission row + token rows).
//! - Materialize the bounded window and perform gap-closing deletes.
//!
//! # Invariants
//! - Positions of one story are strictly increasing and duplicate-free;
//!   `UNIQUE(story_id, position)` backs this at the SQL level.
//! - Reads always return tokens sorted by `position ASC`.
//! - `delete_at` leaves no gap: every later token moves down by one.
//! - Every committed write bumps the story revision in the same transaction.

use crate::model::story::{Revision, StoryId, UserId};
use crate::model::submission::SubmissionId;
use crate::model::token::{
    validate_position, validate_token_value, Position, PositionedToken, Token,
};
use crate::model::window::{window_start_for, Window};
use crate::repo::insertion::{max_position_in, shift_positions_from, InsertionStrategy};
use crate::repo::story_repo::{bump_revision, revision_of};
use crate::repo::submission_repo::insert_submission;
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const TOKEN_SELECT_SQL: &str = "SELECT
    id,
    story_id,
    user_id,
    submission_id,
    value,
    position,
    created_at
FROM tokens";

/// Input of one append transaction.
#[derive(Debug, Clone, Copy)]
pub struct AppendRequest<'a> {
    pub story_id: StoryId,
    pub user_id: UserId,
    /// Raw submission text recorded in the audit log.
    pub text: &'a str,
    /// Normalized token values, in order.
    pub fragments: &'a [String],
}

/// Committed result of one append transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub submission_id: SubmissionId,
    /// First inserted position.
    pub from: Position,
    /// Last inserted position; `from - 1` when nothing was inserted.
    pub to: Position,
    /// Highest position after commit.
    pub new_max_position: Position,
    /// Story revision written by this transaction.
    pub revision: Revision,
    pub tokens: Vec<PositionedToken>,
}

/// Result of a gap-closing delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: bool,
    /// Highest position after the delete, if any token remains.
    pub max_position: Option<Position>,
    /// Story revision after the delete; unchanged for a no-op.
    pub revision: Revision,
}

/// Repository interface for the ordered token store.
pub trait TokenRepository {
    /// Highest position of the story, or `None` when it has no tokens.
    fn max_position(&self, story_id: StoryId) -> RepoResult<Option<Position>>;
    /// Number of stored tokens, including those outside the window.
    fn count_tokens(&self, story_id: StoryId) -> RepoResult<i64>;
    /// Materializes the most recent `window_size` positions.
    fn window(&self, story_id: StoryId, window_size: i64) -> RepoResult<Window>;
    /// Full ordered history of the story.
    fn list_all(&self, story_id: StoryId) -> RepoResult<Vec<Token>>;
    /// Tokens produced by one submission, ordered by position.
    fn tokens_for_submission(&self, submission_id: SubmissionId) -> RepoResult<Vec<Token>>;
    /// Writes one submission and its tokens in a single transaction.
    fn append_submission(
        &self,
        request: &AppendRequest<'_>,
        strategy: &dyn InsertionStrategy,
    ) -> RepoResult<AppendOutcome>;
    /// Removes the token at `position` and closes the gap.
    fn delete_at(&self, story_id: StoryId, position: Position) -> RepoResult<DeleteOutcome>;
}

/// SQLite-backed token store.
pub struct SqliteTokenRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTokenRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl TokenRepository for SqliteTokenRepository<'_> {
    fn max_position(&self, story_id: StoryId) -> RepoResult<Option<Position>> {
        max_position_in(self.conn, story_id)
    }

    fn count_tokens(&self, story_id: StoryId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE story_id = ?1;",
            [story_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn window(&self, story_id: StoryId, window_size: i64) -> RepoResult<Window> {
        let window_size = window_size.max(1);
        // One read transaction so tokens and revision come from the same snapshot.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let revision = revision_of(&tx, story_id)?;
        let Some(max_position) = max_position_in(&tx, story_id)? else {
            tx.commit()?;
            return Ok(Window::empty(story_id, revision));
        };
        let window_start_position = window_start_for(max_position, window_size);

        let tokens = {
            let mut stmt = tx.prepare(
                "SELECT value, position
                 FROM tokens
                 WHERE story_id = ?1
                   AND position >= ?2
                 ORDER BY position ASC
                 LIMIT ?3;",
            )?;
            let mut rows = stmt.query(params![story_id, window_start_position, window_size])?;
            let mut tokens = Vec::new();
            while let Some(row) = rows.next()? {
                tokens.push(PositionedToken {
                    value: row.get(0)?,
                    position: row.get(1)?,
                });
            }
            tokens
        };
        tx.commit()?;

        Ok(Window {
            story_id,
            tokens,
            window_start_position,
            revision,
        })
    }

    fn list_all(&self, story_id: StoryId) -> RepoResult<Vec<Token>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TOKEN_SELECT_SQL}
             WHERE story_id = ?1
             ORDER BY position ASC;"
        ))?;
        let mut rows = stmt.query([story_id])?;
        let mut tokens = Vec::new();
        while let Some(row) = rows.next()? {
            tokens.push(parse_token_row(row)?);
        }
        Ok(tokens)
    }

    fn tokens_for_submission(&self, submission_id: SubmissionId) -> RepoResult<Vec<Token>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TOKEN_SELECT_SQL}
             WHERE submission_id = ?1
             ORDER BY position ASC;"
        ))?;
        let mut rows = stmt.query([submission_id])?;
        let mut tokens = Vec::new();
        while let Some(row) = rows.next()? {
            tokens.push(parse_token_row(row)?);
        }
        Ok(tokens)
    }

    fn append_submission(
        &self,
        request: &AppendRequest<'_>,
        strategy: &dyn InsertionStrategy,
    ) -> RepoResult<AppendOutcome> {
        for fragment in request.fragments {
            validate_token_value(fragment)?;
        }
        let count = request.fragments.len() as i64;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if !story_exists(&tx, request.story_id)? {
            return Err(RepoError::StoryNotFound(request.story_id));
        }

        let previous_max = max_position_in(&tx, request.story_id)?.unwrap_or(0);
        let from = strategy.choose_position(&tx, request.story_id)?;
        validate_position(from)?;
        if count > 0 {
            strategy.shift_if_needed(&tx, request.story_id, from, count)?;
        }

        let submission_id =
            insert_submission(&tx, request.story_id, request.user_id, request.text)?;

        let mut tokens = Vec::with_capacity(request.fragments.len());
        {
            let mut insert = tx.prepare(
                "INSERT INTO tokens (story_id, user_id, submission_id, value, position)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
            )?;
            for (offset, value) in request.fragments.iter().enumerate() {
                let position = from + offset as i64;
                insert.execute(params![
                    request.story_id,
                    request.user_id,
                    submission_id,
                    value.as_str(),
                    position
                ])?;
                tokens.push(PositionedToken::new(value.as_str(), position));
            }
        }

        let revision = bump_revision(&tx, request.story_id)?;
        tx.commit()?;

        Ok(AppendOutcome {
            submission_id,
            from,
            to: from + count - 1,
            new_max_position: previous_max + count,
            revision,
            tokens,
        })
    }

    fn delete_at(&self, story_id: StoryId, position: Position) -> RepoResult<DeleteOutcome> {
        validate_position(position)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM tokens
             WHERE story_id = ?1
               AND position = ?2;",
            params![story_id, position],
        )?;

        if removed == 0 {
            let max_position = max_position_in(&tx, story_id)?;
            let revision = revision_of(&tx, story_id)?;
            tx.commit()?;
            return Ok(DeleteOutcome {
                deleted: false,
                max_position,
                revision,
            });
        }

        shift_positions_from(&tx, story_id, position + 1, -1)?;
        let max_position = max_position_in(&tx, story_id)?;
        let revision = bump_revision(&tx, story_id)?;
        tx.commit()?;

        Ok(DeleteOutcome {
            deleted: true,
            max_position,
            revision,
        })
    }
}

fn story_exists(conn: &Connection, story_id: StoryId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM stories WHERE id = ?1);",
        [story_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_token_row(row: &Row<'_>) -> RepoResult<Token> {
    let position: Position = row.get("position")?;
    if validate_position(position).is_err() {
        return Err(RepoError::InvalidData(format!(
            "invalid position `{position}` in tokens.position"
        )));
    }
    let value: String = row.get("value")?;
    if let Err(err) = validate_token_value(&value) {
        return Err(RepoError::InvalidData(format!(
            "invalid token value in tokens.value: {err}"
        )));
    }

    Ok(Token {
        id: row.get("id")?,
        story_id: row.get("story_id")?,
        user_id: row.get("user_id")?,
        submission_id: row.get("submission_id")?,
        value,
        position,
        created_at: row.get("created_at")?,
    })
}
