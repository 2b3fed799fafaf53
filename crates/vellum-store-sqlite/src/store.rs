//! [`SqliteStore`], the SQLite implementation of [`GraphStore`].

use std::{collections::BTreeMap, path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::TransactionBehavior;
use uuid::Uuid;
use vellum_core::{
  Classify as _,
  changeset::{Changeset, ChangesetAction},
  clock::{Clock, SystemClock},
  diff::ChangesetDiff,
  node::{BaseNode, NewRelation, Relation},
  property::{NewProperty, Property, PropertyKey, Value},
  store::GraphStore,
  update::UpdateOutcome,
};

use crate::{
  Error, Result,
  changeset, diff,
  config::EngineConfig,
  encode::truncate_dt,
  node, property,
  query::Statement,
  resolve,
  schema::SCHEMA,
  update,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vellum graph store backed by a single SQLite file.
///
/// Cloning is cheap; the connection, config and clock are shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  config: Arc<EngineConfig>,
  clock:  Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with the default configuration.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(path, EngineConfig::default()).await
  }

  pub async fn open_with(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, config).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(EngineConfig::default()).await
  }

  pub async fn open_in_memory_with(config: EngineConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, config).await
  }

  async fn init(conn: tokio_rusqlite::Connection, config: EngineConfig) -> Result<Self> {
    let store = Self {
      conn,
      config: Arc::new(config),
      clock: Arc::new(SystemClock),
    };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the time source, e.g. with a
  /// [`ManualClock`](vellum_core::clock::ManualClock) in tests.
  pub fn with_clock(mut self, clock: impl Clock) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  pub fn config(&self) -> &EngineConfig { &self.config }

  async fn init_schema(&self) -> Result<()> {
    let busy_timeout = Duration::from_millis(self.config.busy_timeout_ms);
    let unique_labels = self.config.unique_labels.clone();

    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        let mut stmt =
          conn.prepare("INSERT OR IGNORE INTO unique_labels (label) VALUES (?1)")?;
        for label in &unique_labels {
          stmt.execute([label])?;
        }
        Ok(())
      })
      .await?;

    tracing::debug!(
      unique_labels = self.config.unique_labels.len(),
      "initialised sqlite schema"
    );
    Ok(())
  }

  /// Execute a write statement in one `IMMEDIATE` transaction.
  ///
  /// `build` receives the statement's timestamp, read from the store's clock
  /// once the write lock is held, so writers that queued behind each other
  /// see increasing times. It is called again for every attempt: a statement
  /// that fails with a retryable conflict is rebuilt and rerun from scratch,
  /// up to the configured number of attempts.
  pub async fn run<T, F>(&self, build: F) -> Result<T>
  where
    T: Send + 'static,
    F: Fn(DateTime<Utc>) -> Statement<T> + Send + Sync + 'static,
  {
    let clock = Arc::clone(&self.clock);
    let build = Arc::new(build);
    self
      .attempt(TransactionBehavior::Immediate, move || {
        let clock = Arc::clone(&clock);
        let build = Arc::clone(&build);
        Statement::step(move |_| Ok(truncate_dt(clock.now())))
          .and_then(move |now| build(now))
      })
      .await
  }

  /// Execute a read-only statement in a deferred transaction.
  pub async fn query<T, F>(&self, build: F) -> Result<T>
  where
    T: Send + 'static,
    F: Fn() -> Statement<T> + Send,
  {
    self.attempt(TransactionBehavior::Deferred, build).await
  }

  async fn attempt<T, F>(&self, behavior: TransactionBehavior, build: F) -> Result<T>
  where
    T: Send + 'static,
    F: Fn() -> Statement<T> + Send,
  {
    let policy = self.config.retry;
    let mut attempt = 1;
    loop {
      let statement = build();
      let err = match self
        .conn
        .call(move |conn| Ok(statement.execute_with(conn, behavior)))
        .await
      {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(err)) => err,
        Err(err) => Error::from(err),
      };

      if !err.is_retryable() || attempt >= policy.max_attempts {
        return Err(err);
      }
      tracing::warn!(
        attempt,
        max_attempts = policy.max_attempts,
        error = %err,
        "statement conflicted, retrying"
      );
      tokio::time::sleep(policy.backoff(attempt)).await;
      attempt += 1;
    }
  }
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SqliteStore {
  type Error = Error;

  // ── Nodes ─────────────────────────────────────────────────────────────────

  async fn create_node(
    &self,
    label: String,
    changeset: Option<Uuid>,
  ) -> Result<BaseNode> {
    self
      .run(move |now| node::create_node(label.clone(), changeset, now))
      .await
  }

  async fn get_node(
    &self,
    id: Uuid,
    changeset: Option<Uuid>,
  ) -> Result<Option<BaseNode>> {
    self.query(move || node::get_node(id, changeset)).await
  }

  async fn delete_node(&self, id: Uuid, changeset: Option<Uuid>) -> Result<usize> {
    let deleted = self
      .run(move |now| node::delete_node(id, changeset, now))
      .await?;
    tracing::debug!(node = %id, ?changeset, deleted, "deleted node");
    Ok(deleted)
  }

  // ── Relations ─────────────────────────────────────────────────────────────

  async fn create_relation(&self, input: NewRelation) -> Result<Relation> {
    self
      .run(move |now| node::create_relation(input.clone(), now))
      .await
  }

  async fn remove_relation(
    &self,
    relation_id: Uuid,
    changeset: Option<Uuid>,
  ) -> Result<usize> {
    self
      .run(move |now| node::remove_relation(relation_id, changeset, now))
      .await
  }

  async fn relations(
    &self,
    node_id: Uuid,
    kind: Option<String>,
    changeset: Option<Uuid>,
  ) -> Result<Vec<Relation>> {
    self
      .query(move || node::relations(node_id, kind.clone(), changeset))
      .await
  }

  // ── Property writes ───────────────────────────────────────────────────────

  async fn create_property(&self, input: NewProperty) -> Result<usize> {
    self
      .run(move |now| property::create_property(input.clone(), now))
      .await
  }

  async fn deactivate_property(
    &self,
    node_id: Uuid,
    key: PropertyKey,
    changeset: Option<Uuid>,
  ) -> Result<usize> {
    self
      .run(move |now| {
        property::deactivate_property(node_id, key.clone(), changeset, now)
      })
      .await
  }

  async fn update_property(
    &self,
    node_id: Uuid,
    key: PropertyKey,
    value: Value,
    changeset: Option<Uuid>,
    permanent_after: Option<chrono::Duration>,
  ) -> Result<UpdateOutcome> {
    let window = permanent_after.unwrap_or_else(|| self.config.permanent_after());
    let name = key.to_string();

    let outcome = self
      .run(move |now| {
        update::update_property(
          node_id,
          key.clone(),
          value.clone(),
          changeset,
          window,
          now,
        )
      })
      .await?;

    tracing::debug!(
      node = %node_id,
      key = %name,
      ?changeset,
      method = %outcome.method,
      updated = outcome.updated,
      deactivated = outcome.deactivated,
      created = outcome.created,
      "updated property"
    );
    Ok(outcome)
  }

  async fn update_properties(
    &self,
    node_id: Uuid,
    changes: BTreeMap<PropertyKey, Value>,
    changeset: Option<Uuid>,
  ) -> Result<BTreeMap<String, UpdateOutcome>> {
    let window = self.config.permanent_after();
    self
      .run(move |now| {
        update::update_properties(node_id, changes.clone(), changeset, window, now)
      })
      .await
  }

  // ── Property reads ────────────────────────────────────────────────────────

  async fn resolve_property(
    &self,
    node_id: Uuid,
    key: PropertyKey,
    changeset: Option<Uuid>,
  ) -> Result<Option<Value>> {
    self
      .query(move || resolve::resolve_property(node_id, key.clone(), changeset))
      .await
  }

  async fn resolve_version(
    &self,
    node_id: Uuid,
    key: PropertyKey,
    changeset: Option<Uuid>,
  ) -> Result<Option<Property>> {
    self
      .query(move || resolve::resolve_version(node_id, key.clone(), changeset))
      .await
  }

  async fn properties(
    &self,
    node_id: Uuid,
    changeset: Option<Uuid>,
  ) -> Result<BTreeMap<String, Value>> {
    self
      .query(move || resolve::properties(node_id, changeset))
      .await
  }

  async fn history(&self, node_id: Uuid, key: PropertyKey) -> Result<Vec<Property>> {
    self
      .query(move || resolve::history(node_id, key.clone()))
      .await
  }

  // ── Changesets ────────────────────────────────────────────────────────────

  async fn open_changeset(&self) -> Result<Changeset> {
    let changeset = self.run(move |now| changeset::open_changeset(now)).await?;
    tracing::info!(changeset = %changeset.changeset_id, "opened changeset");
    Ok(changeset)
  }

  async fn get_changeset(&self, id: Uuid) -> Result<Option<Changeset>> {
    self.query(move || changeset::get_changeset(id)).await
  }

  async fn commit_changeset(&self, id: Uuid) -> Result<usize> {
    let affected = self
      .run(move |now| changeset::commit_changeset(id, now))
      .await
      .map_err(|e| e.in_changeset(id, ChangesetAction::Commit))?;
    tracing::info!(changeset = %id, affected, "committed changeset");
    Ok(affected)
  }

  async fn reject_changeset(&self, id: Uuid) -> Result<usize> {
    let affected = self
      .run(move |now| changeset::reject_changeset(id, now))
      .await
      .map_err(|e| e.in_changeset(id, ChangesetAction::Reject))?;
    tracing::info!(changeset = %id, affected, "rejected changeset");
    Ok(affected)
  }

  async fn diff_changeset(&self, id: Uuid) -> Result<ChangesetDiff> {
    self.query(move || diff::diff_changeset(id)).await
  }
}
