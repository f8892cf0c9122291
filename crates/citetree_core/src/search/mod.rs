//! Search entry points.
//!
//! # Responsibility
//! - Expose ranked substring search over the visible citation set.
//! - Keep result shaping and navigation state inside core.

pub mod engine;
