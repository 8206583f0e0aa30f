//! Story domain model.
//!
//! # Responsibility
//! - Define canonical records shared by the store, the service, the realtime
//!   gateway and the client mirror.
//! - Keep the wire shape of tokens and patches in one place.
//!
//! # Invariants
//! - `position` is the sole ordering key of a story's tokens.
//! - A patch value is produced once by the service and never rewritten by
//!   the layers that forward it.

pub mod patch;
pub mod story;
pub mod submission;
pub mod token;
pub mod window;
