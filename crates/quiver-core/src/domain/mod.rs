//! Domain layer - entities, identifiers, events and patches

/// Request context: caller identity, cancellation and deadline
pub mod ctx;

/// Mutation events and entity-kind tags
pub mod event;

/// Opaque time-ordered identifiers
pub mod id;

/// Entity models
pub mod model;

/// Three-valued patch fields
pub mod patch;
