//!
//! Quiver Sync - mutation pipeline and live event streaming
//!
//! The [`MutationPipeline`] wraps one storage transaction, collects a
//! typed event log (synthesizing delete events for cascade-reachable
//! children), and fans the log out to [`EventStreamer`] subscribers only
//! after the transaction commits. Subscribers receive ordered events on
//! `(entity kind, workspace)` topics through bounded queues; a
//! subscriber that cannot keep up is dropped, never waited on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cascade;
mod pipeline;
mod recorder;
mod streamer;

pub use pipeline::MutationPipeline;
pub use recorder::ReplayRecorder;
pub use streamer::{Converter, EventSink, EventStreamer, StreamHandle, WorkspaceFilter};
