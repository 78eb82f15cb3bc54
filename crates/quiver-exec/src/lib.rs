//!
//! Quiver Exec - request execution
//!
//! The [`RequestExecutor`] runs a stored HTTP or GraphQL entry end to
//! end: resolves variables from the workspace's global environment,
//! interpolates, dispatches with cancellation and deadline, evaluates
//! the entry's assertions in bounded parallel, and persists the whole
//! outcome in a single mutation-pipeline transaction whose commit
//! publishes the resulting events. [`Workbench`] bundles the shared
//! process state the serving layer builds pipelines and executors from.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod asserts;
mod config;
mod executor;
mod workbench;

pub use asserts::{response_env, AssertEvaluator, AssertOutcome, CapturedResponse, ExprEvaluator};
pub use config::ExecutorConfig;
pub use executor::RequestExecutor;
pub use workbench::Workbench;
