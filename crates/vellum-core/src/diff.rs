//! The difference a changeset makes relative to the canonical graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{node::BaseNode, property::Value};

/// A node whose properties differ between canonical and the changeset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedNode {
  pub node:     BaseNode,
  /// Keys whose drafted value differs from canonical.
  pub keys:     Vec<String>,
  /// The node resolved without the changeset.
  pub previous: BTreeMap<String, Value>,
  /// The node resolved within the changeset.
  pub updated:  BTreeMap<String, Value>,
}

impl ChangedNode {
  pub fn previous_value(&self, key: &str) -> Option<&Value> {
    self.previous.get(key)
  }

  pub fn updated_value(&self, key: &str) -> Option<&Value> {
    self.updated.get(key)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangesetDiff {
  /// Brand-new nodes proposed by the changeset.
  pub added:   Vec<BaseNode>,
  /// Nodes scheduled to disappear on commit.
  pub removed: Vec<BaseNode>,
  pub changed: Vec<ChangedNode>,
}

impl ChangesetDiff {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
  }
}
