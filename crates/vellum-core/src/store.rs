//! The `GraphStore` trait: the operation set domain services consume.
//!
//! The trait is implemented by storage backends (e.g. `vellum-store-sqlite`).
//! Domain services and the admin CLI depend on this abstraction, not on any
//! concrete backend.

use std::{collections::BTreeMap, future::Future};

use chrono::Duration;
use uuid::Uuid;

use crate::{
  Classify,
  changeset::Changeset,
  diff::ChangesetDiff,
  node::{BaseNode, NewRelation, Relation},
  property::{NewProperty, Property, PropertyKey, Value},
  update::UpdateOutcome,
};

/// Abstraction over a versioned property graph backend.
///
/// Every mutating method is atomic: it either applies completely or not at
/// all. Methods taking `changeset: Option<Uuid>` operate on the canonical
/// timeline when `None` and on that changeset's drafts otherwise.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes.
pub trait GraphStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Nodes ─────────────────────────────────────────────────────────────

  /// Create a node. Under a changeset the node stays invisible to canonical
  /// reads until the changeset is committed.
  fn create_node(
    &self,
    label: String,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<BaseNode, Self::Error>> + Send + '_;

  /// Retrieve a node visible in the given scope. Returns `None` if not found.
  fn get_node(
    &self,
    id: Uuid,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<Option<BaseNode>, Self::Error>> + Send + '_;

  /// Soft-delete a node and cascade to its property and relation edges, or
  /// schedule that for commit when a changeset is given.
  fn delete_node(
    &self,
    id: Uuid,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Relations ─────────────────────────────────────────────────────────

  fn create_relation(
    &self,
    input: NewRelation,
  ) -> impl Future<Output = Result<Relation, Self::Error>> + Send + '_;

  fn remove_relation(
    &self,
    relation_id: Uuid,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Outgoing relations of `node_id` visible in the given scope.
  fn relations(
    &self,
    node_id: Uuid,
    kind: Option<String>,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<Relation>, Self::Error>> + Send + '_;

  // ── Property writes ───────────────────────────────────────────────

  /// Create a property version. Returns the number of versions created: `0`
  /// when the visible value already equals the input.
  fn create_property(
    &self,
    input: NewProperty,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Retire the current version of `key`. Returns `0` or `1`.
  fn deactivate_property(
    &self,
    node_id: Uuid,
    key: PropertyKey,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Set `key` to `value`, replacing in place inside the permanence window
  /// and creating a new version otherwise. `permanent_after` overrides the
  /// store's configured window.
  fn update_property(
    &self,
    node_id: Uuid,
    key: PropertyKey,
    value: Value,
    changeset: Option<Uuid>,
    permanent_after: Option<Duration>,
  ) -> impl Future<Output = Result<UpdateOutcome, Self::Error>> + Send + '_;

  /// Apply [`GraphStore::update_property`] to every entry in one atomic
  /// operation.
  fn update_properties(
    &self,
    node_id: Uuid,
    changes: BTreeMap<PropertyKey, Value>,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<BTreeMap<String, UpdateOutcome>, Self::Error>>
  + Send
  + '_;

  // ── Property reads ────────────────────────────────────────────────

  /// The visible value of `key`: the changeset's draft if it has one,
  /// otherwise canonical.
  fn resolve_property(
    &self,
    node_id: Uuid,
    key: PropertyKey,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + '_;

  /// Like [`GraphStore::resolve_property`] but returns the whole version.
  fn resolve_version(
    &self,
    node_id: Uuid,
    key: PropertyKey,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<Option<Property>, Self::Error>> + Send + '_;

  /// Every visible value of the node, keyed by property key.
  fn properties(
    &self,
    node_id: Uuid,
    changeset: Option<Uuid>,
  ) -> impl Future<Output = Result<BTreeMap<String, Value>, Self::Error>> + Send + '_;

  /// Every version ever recorded for `key`, newest first, including retired
  /// and draft versions.
  fn history(
    &self,
    node_id: Uuid,
    key: PropertyKey,
  ) -> impl Future<Output = Result<Vec<Property>, Self::Error>> + Send + '_;

  // ── Changesets ────────────────────────────────────────────────────────

  fn open_changeset(
    &self,
  ) -> impl Future<Output = Result<Changeset, Self::Error>> + Send + '_;

  fn get_changeset(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Changeset>, Self::Error>> + Send + '_;

  /// Promote every draft of the changeset to canonical. Idempotent. Returns
  /// the number of nodes affected.
  fn commit_changeset(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Discard every draft of the changeset, keeping them for audit.
  /// Idempotent. Returns the number of nodes affected.
  fn reject_changeset(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn diff_changeset(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<ChangesetDiff, Self::Error>> + Send + '_;
}
