//! Core use-case engines.
//!
//! # Responsibility
//! - Orchestrate store access into invariant-preserving tree operations.
//! - Keep UI and sync collaborators decoupled from storage details.
//!
//! # Invariants
//! - Engines are constructed explicitly and share one serialized store
//!   pathway; there is no ambient global state.

pub mod mutation_service;
pub mod repair_service;
