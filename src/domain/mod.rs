//! Domain layer types and invariants.

pub mod block;
pub mod error;
pub mod manifest;
pub mod module;
