use std::time::Duration as StdDuration;

use chrono::Duration;
use proptest::prelude::*;
use rusqlite::params;
use serde_json::json;
use vellum_core::{
  Classify as _, ErrorKind,
  property::{NewProperty, Value},
  store::GraphStore,
};

use super::{clocked_store, get, node, set, store};
use crate::{EngineConfig, Error, RetryPolicy, SqliteStore, Statement, property};

// ─── Statements ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_fragment_rolls_back_the_statement() {
  let s = store().await;
  let n = node(&s, "Project").await;

  let result = s
    .run(move |now| {
      property::create_property(NewProperty::new(n, "name", json!("A")), now).then(
        Statement::<()>::step(|_| Err(Error::Decode("boom".into()))),
      )
    })
    .await;
  assert!(matches!(result, Err(Error::Decode(_))));

  assert_eq!(get(&s, n, "name", None).await, None);
  assert!(s.history(n, "name".into()).await.unwrap().is_empty());
}

#[tokio::test]
async fn fragments_compose_into_one_statement() {
  let s = store().await;

  let (created, versions) = s
    .run(move |now| {
      crate::node::create_node("Project".into(), None, now).and_then(move |node| {
        let input = NewProperty::new(node.node_id, "name", json!("Apollo"));
        property::create_property(input, now).map(move |versions| (node, versions))
      })
    })
    .await
    .unwrap();

  assert_eq!(versions, 1);
  assert_eq!(get(&s, created.node_id, "name", None).await, Some(json!("Apollo")));
}

// ─── Single active version ───────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_active_versions_are_reported() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("graph.db");
  let s = SqliteStore::open(&path).await.unwrap();
  let n = node(&s, "Project").await;
  set(&s, n, "name", json!("A")).await;

  {
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn
      .execute_batch("DROP INDEX property_edges_one_active;")
      .unwrap();
    let id = uuid::Uuid::new_v4().to_string();
    let at = "2024-05-01T09:00:00.000000Z";
    conn
      .execute(
        "INSERT INTO properties (property_id, key, value_json, labels, created_at)
         VALUES (?1, 'name', '\"B\"', '[]', ?2)",
        params![id, at],
      )
      .unwrap();
    conn
      .execute(
        "INSERT INTO property_edges (property_id, node_id, key, active, created_at)
         VALUES (?1, ?2, 'name', 1, ?3)",
        params![id, n.to_string(), at],
      )
      .unwrap();
  }

  let err = s.resolve_property(n, "name".into(), None).await.unwrap_err();
  assert!(matches!(err, Error::InvariantViolation { active: 2, .. }));
  assert_eq!(err.kind(), ErrorKind::InvariantViolation);
  assert!(!err.is_retryable());

  let err = s
    .update_property(n, "name".into(), json!("C"), None, None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvariantViolation { .. }));
  assert!(s.properties(n, None).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_keep_one_active_version() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("graph.db");
  let s = SqliteStore::open(&path).await.unwrap();
  let n = node(&s, "Project").await;

  let mut tasks = Vec::new();
  for i in 0..8 {
    let handle = SqliteStore::open(&path).await.unwrap();
    tasks.push(tokio::spawn(async move {
      handle
        .update_property(n, "name".into(), json!(i), None, Some(Duration::zero()))
        .await
    }));
  }
  for task in tasks {
    task.await.unwrap().unwrap();
  }

  let history = s.history(n, "name".into()).await.unwrap();
  assert_eq!(history.len(), 8);
  let active: Vec<_> = history.iter().filter(|p| p.active).collect();
  assert_eq!(active.len(), 1);
  assert_eq!(get(&s, n, "name", None).await, Some(active[0].value.clone()));
}

// ─── Retry ───────────────────────────────────────────────────────────────────

fn impatient(max_attempts: u32) -> EngineConfig {
  EngineConfig {
    busy_timeout_ms: 0,
    retry: RetryPolicy { max_attempts, backoff_ms: 20 },
    ..EngineConfig::default()
  }
}

#[tokio::test]
async fn busy_database_is_retried() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("graph.db");
  let s = SqliteStore::open_with(&path, impatient(10)).await.unwrap();
  let n = node(&s, "Project").await;

  let lock = rusqlite::Connection::open(&path).unwrap();
  lock.execute_batch("BEGIN IMMEDIATE;").unwrap();
  let release = std::thread::spawn(move || {
    std::thread::sleep(StdDuration::from_millis(100));
    lock.execute_batch("COMMIT;").unwrap();
  });

  s.update_property(n, "name".into(), json!("A"), None, None)
    .await
    .unwrap();
  release.join().unwrap();
  assert_eq!(get(&s, n, "name", None).await, Some(json!("A")));
}

#[tokio::test]
async fn retries_give_up_after_the_last_attempt() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("graph.db");
  let s = SqliteStore::open_with(&path, impatient(1)).await.unwrap();
  let n = node(&s, "Project").await;

  let lock = rusqlite::Connection::open(&path).unwrap();
  lock.execute_batch("BEGIN IMMEDIATE;").unwrap();

  let err = s
    .update_property(n, "name".into(), json!("A"), None, None)
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::ConflictRetryable);

  lock.execute_batch("COMMIT;").unwrap();
}

// ─── Property-based ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
  Update(i64),
  Deactivate,
  Advance(i64),
  Draft { value: i64, commit: bool },
}

fn arb_op() -> impl Strategy<Value = Op> {
  prop_oneof![
    (0i64..4).prop_map(Op::Update),
    Just(Op::Deactivate),
    (1i64..45).prop_map(Op::Advance),
    (0i64..4, any::<bool>()).prop_map(|(value, commit)| Op::Draft { value, commit }),
  ]
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(32))]

  #[test]
  fn any_sequence_keeps_one_current_version(ops in prop::collection::vec(arb_op(), 1..24)) {
    let rt = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .unwrap();

    rt.block_on(async {
      let (s, clock) = clocked_store().await;
      let n = node(&s, "Project").await;
      let mut expected: Option<Value> = None;

      for op in ops {
        match op {
          Op::Update(v) => {
            s.update_property(n, "name".into(), json!(v), None, None)
              .await
              .unwrap();
            expected = Some(json!(v));
          }
          Op::Deactivate => {
            s.deactivate_property(n, "name".into(), None).await.unwrap();
            expected = None;
          }
          Op::Advance(minutes) => clock.advance(Duration::minutes(minutes)),
          Op::Draft { value, commit } => {
            let cs = s.open_changeset().await.unwrap().changeset_id;
            s.update_property(n, "name".into(), json!(value), Some(cs), None)
              .await
              .unwrap();
            if commit {
              s.commit_changeset(cs).await.unwrap();
              expected = Some(json!(value));
            } else {
              s.reject_changeset(cs).await.unwrap();
            }
          }
        }

        let history = s.history(n, "name".into()).await.unwrap();
        assert!(history.iter().filter(|p| p.active).count() <= 1);
        assert_eq!(get(&s, n, "name", None).await, expected);
      }
    });
  }
}
