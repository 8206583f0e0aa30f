//! Insertion position strategies.
//!
//! # Responsibility
//! - Decide where a submission's tokens land, inside the store transaction.
//! - Make room for them when the strategy inserts mid-sequence.
//!
//! # Invariants
//! - Strategies only run inside the append transaction; they never commit.
//! - Shifting keeps positions unique at every statement boundary: rows move
//!   through negative positions before settling.
//!
//! [`AppendOnly`] is the steady-state policy. [`ShiftInsert`] keeps the
//! arbitrary-position behavior available behind the same interface; client
//! mirrors converge under either because they replay the same shift.

use crate::model::story::StoryId;
use crate::model::token::Position;
use crate::repo::RepoResult;
use rusqlite::{params, Connection};

/// Chooses insertion positions and shifts existing tokens when required.
pub trait InsertionStrategy: Send + Sync {
    /// Returns the first position for the new tokens.
    fn choose_position(&self, conn: &Connection, story_id: StoryId) -> RepoResult<Position>;

    /// Makes room for `count` tokens at `insert_at`.
    fn shift_if_needed(
        &self,
        conn: &Connection,
        story_id: StoryId,
        insert_at: Position,
        count: i64,
    ) -> RepoResult<()>;

    /// Whether existing positions may move when this strategy inserts.
    fn shifts_existing(&self) -> bool;
}

/// Appends one past the current maximum position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOnly;

impl InsertionStrategy for AppendOnly {
    fn choose_position(&self, conn: &Connection, story_id: StoryId) -> RepoResult<Position> {
        Ok(max_position_in(conn, story_id)?.unwrap_or(0) + 1)
    }

    fn shift_if_needed(
        &self,
        _conn: &Connection,
        _story_id: StoryId,
        _insert_at: Position,
        _count: i64,
    ) -> RepoResult<()> {
        Ok(())
    }

    fn shifts_existing(&self) -> bool {
        false
    }
}

/// Inserts at a fixed position, pushing later tokens back.
///
/// Positions past the end are clamped to `max + 1` so the sequence never
/// gains a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftInsert {
    pub position: Position,
}

impl ShiftInsert {
    pub fn at(position: Position) -> Self {
        Self { position }
    }
}

impl InsertionStrategy for ShiftInsert {
    fn choose_position(&self, conn: &Connection, story_id: StoryId) -> RepoResult<Position> {
        let append_at = max_position_in(conn, story_id)?.unwrap_or(0) + 1;
        Ok(self.position.clamp(1, append_at))
    }

    fn shift_if_needed(
        &self,
        conn: &Connection,
        story_id: StoryId,
        insert_at: Position,
        count: i64,
    ) -> RepoResult<()> {
        shift_positions_from(conn, story_id, insert_at, count)
    }

    fn shifts_existing(&self) -> bool {
        true
    }
}

/// Returns the highest position of `story_id`, if it has tokens.
pub(crate) fn max_position_in(conn: &Connection, story_id: StoryId) -> RepoResult<Option<Position>> {
    let max = conn.query_row(
        "SELECT MAX(position) FROM tokens WHERE story_id = ?1;",
        [story_id],
        |row| row.get::<_, Option<Position>>(0),
    )?;
    Ok(max)
}

/// Adds `delta` to every position `>= from` in two phases.
pub(crate) fn shift_positions_from(
    conn: &Connection,
    story_id: StoryId,
    from: Position,
    delta: i64,
) -> RepoResult<()> {
    conn.execute(
        "UPDATE tokens
         SET position = -(position + ?3)
         WHERE story_id = ?1
           AND position >= ?2;",
        params![story_id, from, delta],
    )?;
    conn.execute(
        "UPDATE tokens
         SET position = -position
         WHERE story_id = ?1
           AND position < 0;",
        [story_id],
    )?;
    Ok(())
}
