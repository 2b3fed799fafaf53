//! Core types and trait definitions for the Vellum versioned property graph.
//!
//! This crate has no database dependencies. Storage backends
//! implement [`store::GraphStore`]; domain services depend on the trait.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod changeset;
pub mod clock;
pub mod diff;
pub mod error;
pub mod node;
pub mod property;
pub mod store;
pub mod update;

pub use error::{Classify, Error, ErrorKind, Result};
