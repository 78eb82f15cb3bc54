//!
//! Quiver Store - typed, transactional storage gateway
//!
//! Wraps a SQLite pool behind typed read and write operations. Reads are
//! available both on the pool ([`Store`]) and on an open transaction
//! ([`StoreTx`]); code holding a transaction must do all of its reads
//! through the transaction so they participate in it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod model_ops;

/// Per-table query functions, shared by the pool and transaction views
pub mod queries;

pub use connection::{map_db_err, Store, StoreTx};
pub use model_ops::{Model, Owner};
