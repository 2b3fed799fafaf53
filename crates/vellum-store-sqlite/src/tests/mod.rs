//! Integration tests for `SqliteStore` against in-memory and on-disk
//! databases.

mod invariants;
mod nodes;

use chrono::{DateTime, TimeZone as _, Utc};
use uuid::Uuid;
use vellum_core::{
  clock::ManualClock,
  property::{NewProperty, PropertyKey, Value},
  store::GraphStore,
};

use crate::{EngineConfig, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn start() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

/// A store whose time only moves when the returned clock is advanced.
async fn clocked_store() -> (SqliteStore, ManualClock) {
  let clock = ManualClock::new(start());
  (store().await.with_clock(clock.clone()), clock)
}

async fn store_with(config: EngineConfig) -> SqliteStore {
  SqliteStore::open_in_memory_with(config)
    .await
    .expect("in-memory store")
}

async fn node(s: &SqliteStore, label: &str) -> Uuid {
  s.create_node(label.into(), None).await.unwrap().node_id
}

async fn set(s: &SqliteStore, node_id: Uuid, key: &'static str, value: Value) {
  let created = s
    .create_property(NewProperty::new(node_id, key, value))
    .await
    .unwrap();
  assert_eq!(created, 1);
}

async fn get(
  s: &SqliteStore,
  node_id: Uuid,
  key: &'static str,
  changeset: Option<Uuid>,
) -> Option<Value> {
  s.resolve_property(node_id, PropertyKey::from(key), changeset)
    .await
    .unwrap()
}
