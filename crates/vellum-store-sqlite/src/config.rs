//! Engine configuration, deserialisable from the admin binary's config file.

use std::time::Duration as StdDuration;

use serde::Deserialize;
use vellum_core::update::DEFAULT_PERMANENT_AFTER_SECS;

/// Tunables of a [`crate::SqliteStore`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Edits younger than this many seconds are replaced in place.
  pub permanent_after_secs: i64,
  /// How long SQLite waits on a locked database before reporting busy.
  pub busy_timeout_ms:      u64,
  /// Property labels whose values must be unique among canonical versions.
  pub unique_labels:        Vec<String>,
  pub retry:                RetryPolicy,
}

impl EngineConfig {
  pub fn permanent_after(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.permanent_after_secs)
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      permanent_after_secs: DEFAULT_PERMANENT_AFTER_SECS,
      busy_timeout_ms:      5_000,
      unique_labels:        Vec::new(),
      retry:                RetryPolicy::default(),
    }
  }
}

/// Optimistic retry of a whole logical operation after a retryable conflict.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts including the first; `1` disables retrying.
  pub max_attempts: u32,
  /// Linear backoff step between attempts.
  pub backoff_ms:   u64,
}

impl RetryPolicy {
  pub fn backoff(&self, attempt: u32) -> StdDuration {
    StdDuration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
  }
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { max_attempts: 3, backoff_ms: 25 } }
}
