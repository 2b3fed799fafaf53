//! Outcome records returned by the update coordinator.

use serde::{Deserialize, Serialize};

/// Default permanence window: edits younger than this are replaced in place.
pub const DEFAULT_PERMANENT_AFTER_SECS: i64 = 30 * 60;

/// Which arm of the update was taken.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
pub enum UpdateMethod {
  /// The visible version was still inside the permanence window and was
  /// overwritten without creating history.
  #[serde(rename = "inline replace")]
  #[strum(serialize = "inline replace")]
  InlineReplace,
  /// The visible version was retired and a new version created.
  #[serde(rename = "new entry")]
  #[strum(serialize = "new entry")]
  NewEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
  pub method:      UpdateMethod,
  /// Rows replaced in place.
  pub updated:     usize,
  pub deactivated: usize,
  pub created:     usize,
}

impl UpdateOutcome {
  pub fn inline_replace(updated: usize) -> Self {
    Self { method: UpdateMethod::InlineReplace, updated, deactivated: 0, created: 0 }
  }

  pub fn new_entry(deactivated: usize, created: usize) -> Self {
    Self { method: UpdateMethod::NewEntry, updated: 0, deactivated, created }
  }

  /// Whether the update changed anything at all.
  pub fn is_noop(&self) -> bool {
    self.updated == 0 && self.deactivated == 0 && self.created == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn methods_serialize_with_spaces() {
    assert_eq!(
      serde_json::to_value(UpdateMethod::InlineReplace).unwrap(),
      serde_json::json!("inline replace")
    );
    assert_eq!(UpdateMethod::NewEntry.to_string(), "new entry");
  }
}
