//! Base nodes and the structural relationships between them.
//!
//! A base node is a thin envelope: identity, a type label and its lifecycle
//! timestamps. Everything else about the entity lives in its properties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A versioned domain entity instance (a project, a budget, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseNode {
  pub node_id:    Uuid,
  /// Entity type name, e.g. `"Project"`.
  pub label:      String,
  pub created_at: DateTime<Utc>,
  /// Set once when the node is soft-deleted; nodes are never hard-deleted.
  pub deleted_at: Option<DateTime<Utc>>,
}

impl BaseNode {
  pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }
}

/// A directed structural edge between two base nodes (parent/child,
/// ownership, membership...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
  pub relation_id: Uuid,
  pub kind:        String,
  pub from_id:     Uuid,
  pub to_id:       Uuid,
  /// Whether the edge is part of the canonical graph.
  pub active:      bool,
  pub created_at:  DateTime<Utc>,
  pub deleted_at:  Option<DateTime<Utc>>,
}

/// Input to [`crate::store::GraphStore::create_relation`].
#[derive(Debug, Clone)]
pub struct NewRelation {
  pub from_id:      Uuid,
  pub kind:         String,
  pub to_id:        Uuid,
  /// When set, the relation is proposed under this changeset and only becomes
  /// active on commit.
  pub changeset_id: Option<Uuid>,
}

impl NewRelation {
  pub fn new(from_id: Uuid, kind: impl Into<String>, to_id: Uuid) -> Self {
    Self { from_id, kind: kind.into(), to_id, changeset_id: None }
  }

  pub fn in_changeset(mut self, changeset_id: Uuid) -> Self {
    self.changeset_id = Some(changeset_id);
    self
  }
}
