//!
//! Quiver Core - domain layer for the Quiver API workbench
//!
//! This crate defines the entity models, identifiers, mutation events,
//! sparse patch fields, the assertion expression evaluator and the
//! variable interpolator. It is the foundation for the store, sync and
//! exec crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - entities, identifiers, events and patches
pub mod domain;

/// Error types
pub mod error;

/// Assertion expression language
pub mod expr;

/// `{{ name }}` variable interpolation
pub mod template;

// Re-export key types
pub use domain::ctx::Ctx;
pub use domain::event::{ModelKind, MutationEvent, Op};
pub use domain::id::Uid;
pub use domain::patch::FieldPatch;
pub use error::CoreError;
