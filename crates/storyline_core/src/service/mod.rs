//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate validation, tokenization and repository transactions into
//!   use-case level APIs.
//! - Keep the realtime gateway decoupled from storage details.

pub mod default_story;
pub mod story_service;
pub mod tokenize;
