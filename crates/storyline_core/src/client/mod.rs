//! Client-side reconciliation.

pub mod mirror;
pub mod session;
