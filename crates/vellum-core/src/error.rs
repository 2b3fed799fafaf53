//! Error types for `vellum-core`, and the classification every backend error
//! reports so callers can decide between retrying and giving up.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid property key {key:?}: {reason}")]
  InvalidKey { key: String, reason: &'static str },

  #[error("unknown changeset status: {0:?}")]
  UnknownStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// The coarse kind of an engine failure.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  /// A node, property, relation or changeset does not exist. Never retried.
  NotFound,
  /// More than one active version was found where at most one may exist.
  InvariantViolation,
  /// A concurrent writer raced on the same rows; the whole logical operation
  /// may be retried from scratch.
  ConflictRetryable,
  /// A uniqueness or state constraint rejected the write. Never retried.
  ConstraintViolation,
  /// The caller supplied malformed input.
  Invalid,
  Internal,
}

/// Implemented by every error a [`crate::store::GraphStore`] can return.
pub trait Classify {
  fn kind(&self) -> ErrorKind;

  fn is_retryable(&self) -> bool { self.kind() == ErrorKind::ConflictRetryable }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidKey { .. } | Self::UnknownStatus(_) => ErrorKind::Invalid,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }
}
