//! Story use-case service.
//!
//! # Responsibility
//! - Validate and tokenize writer intent.
//! - Run the store append transaction with bounded retry on write conflicts.
//! - Turn committed store outcomes into the single [`Patch`] representation.
//!
//! # Invariants
//! - The service never computes positions; it only reads them back from the
//!   committed store outcome.
//! - A patch is produced only after commit. Failed submissions produce an
//!   error and no patch.
//! - Raw submission text is never logged; only lengths and counts.

use crate::config::StoryConfig;
use crate::model::patch::{DeletePatch, InsertPatch, Patch};
use crate::model::story::{is_valid_story_id, is_valid_user_id, StoryId, UserId};
use crate::model::token::{validate_position, Position, TokenValidationError};
use crate::model::window::{window_start_for, Window};
use crate::repo::insertion::{AppendOnly, InsertionStrategy};
use crate::repo::token_repo::{AppendRequest, TokenRepository};
use crate::repo::RepoError;
use crate::service::tokenize::tokenize;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Service error for story use-cases.
#[derive(Debug)]
pub enum StoryError {
    /// Submission text is blank after trimming or carries control characters.
    InvalidSubmission,
    /// Raw submission exceeds the character limit.
    SubmissionTooLong { chars: usize, max: usize },
    /// One fragment exceeds the token character limit.
    TokenTooLong { chars: usize, max: usize },
    /// Story id is not a valid persisted id.
    InvalidStoryId(StoryId),
    /// Position is below 1.
    InvalidPosition(Position),
    /// Writer id is not a valid identity.
    InvalidUser(UserId),
    /// Every attempt hit a write conflict.
    ConcurrencyConflict { attempts: u32 },
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl StoryError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSubmission => "INVALID_SUBMISSION",
            Self::SubmissionTooLong { .. } => "SUBMISSION_TOO_LONG",
            Self::TokenTooLong { .. } => "TOKEN_TOO_LONG",
            Self::InvalidStoryId(_) => "INVALID_STORY_ID",
            Self::InvalidPosition(_) => "INVALID_POSITION",
            Self::InvalidUser(_) => "INVALID_USER",
            Self::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            Self::Repo(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error comes from storage rather than from the request.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Repo(_))
    }
}

impl Display for StoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSubmission => write!(f, "Submission text is required"),
            Self::SubmissionTooLong { max, .. } => {
                write!(f, "Submission must be at most {max} characters")
            }
            Self::TokenTooLong { max, .. } => write!(f, "Token exceeds {max} characters"),
            Self::InvalidStoryId(id) => write!(f, "Invalid story id: {id}"),
            Self::InvalidPosition(position) => write!(f, "Position must be >= 1, got {position}"),
            Self::InvalidUser(id) => write!(f, "Invalid user: {id}"),
            Self::ConcurrencyConflict { attempts } => write!(
                f,
                "Submission conflicted with concurrent writes after {attempts} attempts"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for StoryError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::StoryNotFound(story_id) => Self::InvalidStoryId(story_id),
            RepoError::Validation(TokenValidationError::InvalidPosition(position)) => {
                Self::InvalidPosition(position)
            }
            RepoError::Validation(TokenValidationError::ValueTooLong { chars, max }) => {
                Self::TokenTooLong { chars, max }
            }
            RepoError::Validation(TokenValidationError::ValueContainsControl) => {
                Self::InvalidSubmission
            }
            other => Self::Repo(other),
        }
    }
}

/// Story service facade.
pub struct StoryService<R: TokenRepository> {
    repo: R,
    config: StoryConfig,
    strategy: Arc<dyn InsertionStrategy>,
}

impl<R: TokenRepository> StoryService<R> {
    /// Creates a service with default config and append-only insertion.
    pub fn new(repo: R) -> Self {
        Self::with_config(repo, StoryConfig::default())
    }

    /// Creates a service with explicit config and append-only insertion.
    pub fn with_config(repo: R, config: StoryConfig) -> Self {
        Self {
            repo,
            config,
            strategy: Arc::new(AppendOnly),
        }
    }

    /// Replaces the insertion strategy.
    pub fn with_strategy(self, strategy: impl InsertionStrategy + 'static) -> Self {
        self.with_shared_strategy(Arc::new(strategy))
    }

    /// Replaces the insertion strategy with one shared across services.
    pub fn with_shared_strategy(mut self, strategy: Arc<dyn InsertionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    /// Validates, tokenizes and commits one submission.
    ///
    /// # Contract
    /// - Validation order: story id, user id, blank text, control
    ///   characters, raw length, token length.
    /// - Write conflicts retry the whole transaction up to
    ///   `config.max_submit_attempts` attempts in total.
    /// - Returns the insert patch that is also broadcast to subscribers.
    pub fn submit(&self, story_id: StoryId, user_id: UserId, text: &str) -> Result<Patch, StoryError> {
        let started_at = Instant::now();
        let fragments = self.validate_submission(story_id, user_id, text)?;

        let request = AppendRequest {
            story_id,
            user_id,
            text,
            fragments: &fragments,
        };

        let max_attempts = self.config.max_submit_attempts.max(1);
        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            match self.repo.append_submission(&request, self.strategy.as_ref()) {
                Ok(outcome) => break outcome,
                Err(err) if err.is_write_conflict() && attempt < max_attempts => {
                    warn!(
                        "event=story_submit module=service status=retry story_id={} attempt={} error={}",
                        story_id, attempt, err
                    );
                }
                Err(err) if err.is_write_conflict() => {
                    error!(
                        "event=story_submit module=service status=error story_id={} attempts={} error_code=concurrency_conflict error={}",
                        story_id, attempt, err
                    );
                    return Err(StoryError::ConcurrencyConflict { attempts: attempt });
                }
                Err(err) => {
                    error!(
                        "event=story_submit module=service status=error story_id={} attempts={} error={}",
                        story_id, attempt, err
                    );
                    return Err(err.into());
                }
            }
        };

        info!(
            "event=story_submit module=service status=ok story_id={} submission_id={} revision={} inserted={} from={} to={} attempts={} duration_ms={}",
            story_id,
            outcome.submission_id,
            outcome.revision,
            outcome.tokens.len(),
            outcome.from,
            outcome.to,
            attempt,
            started_at.elapsed().as_millis()
        );

        Ok(Patch::Insert(InsertPatch {
            story_id,
            inserted: outcome.tokens.len(),
            from: outcome.from,
            to: outcome.to,
            window_start_position: Some(window_start_for(
                outcome.new_max_position,
                self.config.window_size,
            )),
            revision: Some(outcome.revision),
            tokens: outcome.tokens,
        }))
    }

    /// Returns the current bounded window: the full-resync payload.
    pub fn window(&self, story_id: StoryId) -> Result<Window, StoryError> {
        ensure_story_id(story_id)?;
        self.repo
            .window(story_id, self.config.window_size)
            .map_err(Into::into)
    }

    /// Deletes the token at `position` and closes the gap.
    ///
    /// Returns a delete patch even when nothing was at `position`
    /// (`deleted = false`), so moderation tooling can report the no-op.
    pub fn delete_token(&self, story_id: StoryId, position: Position) -> Result<Patch, StoryError> {
        ensure_story_id(story_id)?;
        validate_position(position).map_err(|_| StoryError::InvalidPosition(position))?;

        let outcome = self.repo.delete_at(story_id, position)?;
        info!(
            "event=story_delete module=service status=ok story_id={} position={} deleted={}",
            story_id, position, outcome.deleted
        );

        Ok(Patch::Delete(DeletePatch {
            story_id,
            position,
            deleted: outcome.deleted,
            window_start_position: Some(window_start_for(
                outcome.max_position.unwrap_or(0),
                self.config.window_size,
            )),
            revision: Some(outcome.revision),
        }))
    }

    fn validate_submission(
        &self,
        story_id: StoryId,
        user_id: UserId,
        text: &str,
    ) -> Result<Vec<String>, StoryError> {
        ensure_story_id(story_id)?;
        if !is_valid_user_id(user_id) {
            return Err(StoryError::InvalidUser(user_id));
        }
        if text.trim().is_empty() {
            return Err(StoryError::InvalidSubmission);
        }
        if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
            return Err(StoryError::InvalidSubmission);
        }

        let chars = text.chars().count();
        if chars > self.config.submission_max_chars {
            return Err(StoryError::SubmissionTooLong {
                chars,
                max: self.config.submission_max_chars,
            });
        }

        let fragments = tokenize(text);
        for fragment in &fragments {
            let chars = fragment.chars().count();
            if chars > self.config.token_max_chars {
                return Err(StoryError::TokenTooLong {
                    chars,
                    max: self.config.token_max_chars,
                });
            }
        }
        Ok(fragments)
    }
}

fn ensure_story_id(story_id: StoryId) -> Result<(), StoryError> {
    if !is_valid_story_id(story_id) {
        return Err(StoryError::InvalidStoryId(story_id));
    }
    Ok(())
}
