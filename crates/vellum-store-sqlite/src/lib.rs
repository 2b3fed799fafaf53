//! SQLite backend for the Vellum versioned property graph.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every engine operation is a
//! [`Statement`] assembled from the fragment functions in the public modules;
//! [`SqliteStore`] executes them atomically and retries them on conflict.

mod encode;
mod schema;
mod store;

pub mod changeset;
pub mod config;
pub mod diff;
pub mod error;
pub mod node;
pub mod property;
pub mod query;
pub mod resolve;
pub mod update;

pub use config::{EngineConfig, RetryPolicy};
pub use error::{Error, Result};
pub use query::Statement;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
