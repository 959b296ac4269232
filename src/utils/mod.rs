//! Generic utility primitives with zero domain knowledge.
//!
//! - `shell` - Shell escaping and command composition

pub mod shell;
