//! Story behavior configuration.
//!
//! # Responsibility
//! - Hold the tunable constants of the submission pipeline, the window and
//!   the Opening schedule in one value.
//!
//! # Invariants
//! - `Default` matches the production constants.
//! - Every limit is at least 1; builders clamp instead of failing.

use crate::model::submission::SUBMISSION_MAX_CHARS;
use crate::model::token::TOKEN_MAX_CHARS;
use crate::model::window::WINDOW_SIZE;
use crate::opening::OpeningSchedule;

/// Attempts made for one submission before reporting a conflict.
pub const MAX_SUBMIT_ATTEMPTS: u32 = 3;

/// Configuration for the story service and gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoryConfig {
    /// Number of most-recent tokens exposed to clients.
    pub window_size: i64,
    /// Maximum token length, in characters.
    pub token_max_chars: usize,
    /// Maximum raw submission length, in characters.
    pub submission_max_chars: usize,
    /// Total transaction attempts per submission.
    pub max_submit_attempts: u32,
    /// Opening schedule constants.
    pub opening: OpeningSchedule,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            token_max_chars: TOKEN_MAX_CHARS,
            submission_max_chars: SUBMISSION_MAX_CHARS,
            max_submit_attempts: MAX_SUBMIT_ATTEMPTS,
            opening: OpeningSchedule::default(),
        }
    }
}

impl StoryConfig {
    /// Sets the window size.
    pub fn with_window_size(mut self, size: i64) -> Self {
        self.window_size = size.max(1);
        self
    }

    /// Sets the submission attempt bound.
    pub fn with_max_submit_attempts(mut self, attempts: u32) -> Self {
        self.max_submit_attempts = attempts.max(1);
        self
    }

    /// Sets the Opening schedule.
    pub fn with_opening(mut self, opening: OpeningSchedule) -> Self {
        self.opening = opening;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::StoryConfig;

    #[test]
    fn default_config_matches_production_constants() {
        let config = StoryConfig::default();
        assert_eq!(config.window_size, 10_000);
        assert_eq!(config.token_max_chars, 48);
        assert_eq!(config.submission_max_chars, 200);
        assert_eq!(config.max_submit_attempts, 3);
    }

    #[test]
    fn builders_clamp_to_one() {
        let config = StoryConfig::default()
            .with_window_size(0)
            .with_max_submit_attempts(0);
        assert_eq!(config.window_size, 1);
        assert_eq!(config.max_submit_attempts, 1);
    }
}
