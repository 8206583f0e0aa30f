//! Local mirror of a story window.
//!
//! # Responsibility
//! - Hold the client's copy of the visible token sequence.
//! - Apply server patches exactly as the store applied them.
//!
//! # Invariants
//! - Mutated only through [`StoryMirror::reset`] and
//!   [`StoryMirror::apply_patch`].
//! - Tokens stay sorted by position with no duplicates.
//! - Window clipping follows the server-declared boundary only.
//! - A patch whose revision the mirror already holds is skipped, so replays
//!   after a snapshot never apply a change twice.

use crate::model::patch::{DeletePatch, InsertPatch, Patch};
use crate::model::story::{Revision, StoryId};
use crate::model::token::{Position, PositionedToken};
use crate::model::window::{clip_to_window, Window};
use crate::repo::insertion::InsertionStrategy;

/// How the server places inserted tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MirrorPolicy {
    /// Inserts land past the end; existing positions never move. Replaying
    /// a patch already contained in the last snapshot is harmless.
    #[default]
    Append,
    /// Inserts push later tokens back by the inserted count.
    Shift,
}

impl MirrorPolicy {
    /// Policy that replays what `strategy` does to existing positions.
    pub fn for_strategy(strategy: &dyn InsertionStrategy) -> Self {
        if strategy.shifts_existing() {
            Self::Shift
        } else {
            Self::Append
        }
    }
}

/// Client-side story state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryMirror {
    story_id: Option<StoryId>,
    tokens: Vec<PositionedToken>,
    window_start_position: Position,
    revision: Option<Revision>,
    policy: MirrorPolicy,
}

impl Default for StoryMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryMirror {
    pub fn new() -> Self {
        Self::with_policy(MirrorPolicy::Append)
    }

    pub fn with_policy(policy: MirrorPolicy) -> Self {
        Self {
            story_id: None,
            tokens: Vec::new(),
            window_start_position: 1,
            revision: None,
            policy,
        }
    }

    pub fn story_id(&self) -> Option<StoryId> {
        self.story_id
    }

    pub fn tokens(&self) -> &[PositionedToken] {
        &self.tokens
    }

    pub fn window_start_position(&self) -> Position {
        self.window_start_position
    }

    /// Last story revision applied, `None` before the first snapshot.
    pub fn revision(&self) -> Option<Revision> {
        self.revision
    }

    pub fn policy(&self) -> MirrorPolicy {
        self.policy
    }

    /// Whether `patch` is the next change after what the mirror holds, or
    /// one it already holds. Patches without a revision always qualify.
    pub fn is_contiguous(&self, patch: &Patch) -> bool {
        match (self.revision, patch.revision()) {
            (Some(current), Some(incoming)) => incoming <= current + 1,
            _ => true,
        }
    }

    /// Visible text, tokens joined by single spaces.
    pub fn text(&self) -> String {
        self.tokens
            .iter()
            .map(|token| token.value.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Replaces local state with a full snapshot.
    pub fn reset(&mut self, snapshot: Window) {
        self.story_id = Some(snapshot.story_id);
        self.window_start_position = snapshot.window_start_position.max(1);
        self.revision = Some(snapshot.revision);
        self.tokens = snapshot.tokens;
        self.normalize();
    }

    /// Applies one server patch.
    ///
    /// Returns `false` for patches that were ignored: unknown kinds,
    /// patches for another story and patches the mirror already holds.
    pub fn apply_patch(&mut self, patch: &Patch) -> bool {
        if let (Some(ours), Some(theirs)) = (self.story_id, patch.story_id()) {
            if ours != theirs {
                return false;
            }
        }
        if let (Some(current), Some(incoming)) = (self.revision, patch.revision()) {
            if incoming <= current {
                return false;
            }
        }

        match patch {
            Patch::Insert(insert) => self.apply_insert(insert),
            Patch::Delete(delete) => self.apply_delete(delete),
            Patch::Unknown => return false,
        }
        if self.story_id.is_none() {
            self.story_id = patch.story_id();
        }
        if let Some(revision) = patch.revision() {
            self.revision = Some(revision);
        }
        true
    }

    fn apply_insert(&mut self, patch: &InsertPatch) {
        let inserted = patch.tokens.len() as i64;
        match self.policy {
            MirrorPolicy::Shift => {
                for token in &mut self.tokens {
                    if token.position >= patch.from {
                        token.position += inserted;
                    }
                }
            }
            MirrorPolicy::Append => {
                self.tokens
                    .retain(|token| token.position < patch.from || token.position > patch.to);
            }
        }

        let at = self
            .tokens
            .partition_point(|token| token.position < patch.from);
        self.tokens
            .splice(at..at, patch.tokens.iter().cloned());
        self.finish(patch.window_start_position);
    }

    fn apply_delete(&mut self, patch: &DeletePatch) {
        if patch.deleted {
            self.tokens.retain(|token| token.position != patch.position);
            for token in &mut self.tokens {
                if token.position > patch.position {
                    token.position -= 1;
                }
            }
        }
        self.finish(patch.window_start_position);
    }

    fn finish(&mut self, window_start_position: Option<Position>) {
        if let Some(start) = window_start_position {
            self.window_start_position = start.max(1);
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        self.tokens.sort_by_key(|token| token.position);
        self.tokens.dedup_by_key(|token| token.position);
        clip_to_window(&mut self.tokens, self.window_start_position);
    }
}

#[cfg(test)]
mod tests {
    use super::{MirrorPolicy, StoryMirror};
    use crate::model::patch::{DeletePatch, InsertPatch, Patch};
    use crate::model::token::PositionedToken;
    use crate::model::window::Window;
    use crate::repo::insertion::{AppendOnly, ShiftInsert};

    fn insert(from: i64, values: &[&str], window_start: i64) -> Patch {
        let tokens: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(offset, value)| PositionedToken::new(*value, from + offset as i64))
            .collect();
        Patch::Insert(InsertPatch {
            story_id: 1,
            inserted: tokens.len(),
            from,
            to: from + tokens.len() as i64 - 1,
            window_start_position: Some(window_start),
            revision: None,
            tokens,
        })
    }

    fn snapshot(values: &[&str]) -> Window {
        Window {
            story_id: 1,
            tokens: values
                .iter()
                .enumerate()
                .map(|(index, value)| PositionedToken::new(*value, index as i64 + 1))
                .collect(),
            window_start_position: 1,
            revision: 0,
        }
    }

    fn delete(position: i64, revision: i64) -> Patch {
        Patch::Delete(DeletePatch {
            story_id: 1,
            position,
            deleted: true,
            window_start_position: Some(1),
            revision: Some(revision),
        })
    }

    #[test]
    fn append_patch_extends_the_tail() {
        let mut mirror = StoryMirror::new();
        mirror.reset(snapshot(&["once", "upon"]));
        assert!(mirror.apply_patch(&insert(3, &["a", "time"], 1)));
        assert_eq!(mirror.text(), "once upon a time");
    }

    #[test]
    fn replayed_append_patch_is_idempotent() {
        let mut mirror = StoryMirror::new();
        mirror.reset(snapshot(&["once", "upon", "a"]));
        mirror.apply_patch(&insert(3, &["a"], 1));
        assert_eq!(mirror.text(), "once upon a");
    }

    #[test]
    fn shift_policy_mirrors_server_shift() {
        let mut mirror = StoryMirror::with_policy(MirrorPolicy::Shift);
        mirror.reset(snapshot(&["once", "time"]));
        mirror.apply_patch(&insert(2, &["upon", "a"], 1));
        assert_eq!(mirror.text(), "once upon a time");
        let positions: Vec<_> = mirror.tokens().iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn window_start_clips_old_tokens() {
        let mut mirror = StoryMirror::new();
        mirror.reset(snapshot(&["a", "b", "c"]));
        mirror.apply_patch(&insert(4, &["d"], 3));
        assert_eq!(mirror.text(), "c d");
        assert_eq!(mirror.window_start_position(), 3);
    }

    #[test]
    fn delete_closes_the_gap() {
        let mut mirror = StoryMirror::new();
        mirror.reset(snapshot(&["a", "rude", "b"]));
        assert!(mirror.apply_patch(&delete(2, 1)));
        assert_eq!(mirror.text(), "a b");
        assert_eq!(mirror.tokens()[1].position, 2);
        assert_eq!(mirror.revision(), Some(1));
    }

    #[test]
    fn delete_already_in_snapshot_is_skipped() {
        let mut mirror = StoryMirror::new();
        let mut after_delete = snapshot(&["a", "b", "c"]);
        after_delete.revision = 2;
        mirror.reset(after_delete);

        assert!(!mirror.apply_patch(&delete(2, 2)));
        assert_eq!(mirror.text(), "a b c");
    }

    #[test]
    fn revision_gaps_are_detected() {
        let mut mirror = StoryMirror::new();
        let mut window = snapshot(&["a"]);
        window.revision = 2;
        mirror.reset(window);

        assert!(mirror.is_contiguous(&delete(1, 2)));
        assert!(mirror.is_contiguous(&delete(1, 3)));
        assert!(!mirror.is_contiguous(&delete(1, 4)));
        assert!(mirror.is_contiguous(&insert(2, &["b"], 1)));
    }

    #[test]
    fn policy_follows_server_strategy() {
        assert_eq!(MirrorPolicy::for_strategy(&AppendOnly), MirrorPolicy::Append);
        assert_eq!(MirrorPolicy::for_strategy(&ShiftInsert::at(1)), MirrorPolicy::Shift);
    }

    #[test]
    fn ignores_unknown_and_foreign_patches() {
        let mut mirror = StoryMirror::new();
        mirror.reset(snapshot(&["a"]));
        assert!(!mirror.apply_patch(&Patch::Unknown));

        let mut foreign = insert(2, &["b"], 1);
        if let Patch::Insert(patch) = &mut foreign {
            patch.story_id = 2;
        }
        assert!(!mirror.apply_patch(&foreign));
        assert_eq!(mirror.text(), "a");
    }
}
