//! Administrative commands over a Vellum store: changeset review and ad-hoc
//! property lookups, printed as JSON.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Subcommand;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use vellum_core::{property::PropertyKey, store::GraphStore};
use vellum_store_sqlite::EngineConfig;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Deserialised from `vellum.toml` and `VELLUM_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
  pub store_path: PathBuf,
  #[serde(default)]
  pub engine:     EngineConfig,
}

// ─── Commands ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
  /// Open a new changeset.
  Open,
  /// Make every draft of a changeset canonical.
  Commit { id: Uuid },
  /// Discard every draft of a changeset.
  Reject { id: Uuid },
  /// Show the nodes a changeset adds, removes and changes.
  Diff { id: Uuid },
  /// Print the value a reader sees for a node's property.
  Resolve {
    node: Uuid,
    key:  String,
    /// Resolve within this changeset's drafts.
    #[arg(long)]
    changeset: Option<Uuid>,
  },
}

/// Run one command against `store` and return its JSON report.
pub async fn execute<S: GraphStore>(store: &S, command: Command) -> anyhow::Result<Value> {
  let output = match command {
    Command::Open => {
      let changeset = store.open_changeset().await?;
      serde_json::to_value(changeset)?
    }

    Command::Commit { id } => {
      let affected = store
        .commit_changeset(id)
        .await
        .with_context(|| format!("failed to commit changeset {id}"))?;
      finalized(store, id, affected).await?
    }

    Command::Reject { id } => {
      let affected = store
        .reject_changeset(id)
        .await
        .with_context(|| format!("failed to reject changeset {id}"))?;
      finalized(store, id, affected).await?
    }

    Command::Diff { id } => {
      let diff = store
        .diff_changeset(id)
        .await
        .with_context(|| format!("failed to diff changeset {id}"))?;
      serde_json::to_value(diff)?
    }

    Command::Resolve { node, key, changeset } => {
      let key = PropertyKey::dynamic(key)?;
      let value = store
        .resolve_property(node, key.clone(), changeset)
        .await
        .with_context(|| format!("failed to resolve {key} on node {node}"))?;
      json!({
        "node_id":      node,
        "key":          key.as_str(),
        "changeset_id": changeset,
        "value":        value,
      })
    }
  };
  Ok(output)
}

async fn finalized<S: GraphStore>(
  store: &S,
  id: Uuid,
  affected: usize,
) -> anyhow::Result<Value> {
  let changeset = store
    .get_changeset(id)
    .await?
    .with_context(|| format!("changeset {id} vanished"))?;
  Ok(json!({
    "changeset_id": id,
    "status":       changeset.status,
    "finalized_at": changeset.finalized_at,
    "affected":     affected,
  }))
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use vellum_core::{property::NewProperty, store::GraphStore};
  use vellum_store_sqlite::SqliteStore;

  use super::*;

  async fn store() -> SqliteStore {
    SqliteStore::open_in_memory()
      .await
      .expect("in-memory store")
  }

  #[test]
  fn config_reads_nested_engine_settings() {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(
        r#"
          store_path = "/tmp/graph.db"

          [engine]
          permanent_after_secs = 60
          unique_labels = ["ProjectName"]
        "#,
        config::FileFormat::Toml,
      ))
      .build()
      .unwrap();
    let cfg: AdminConfig = settings.try_deserialize().unwrap();

    assert_eq!(cfg.store_path, PathBuf::from("/tmp/graph.db"));
    assert_eq!(cfg.engine.permanent_after_secs, 60);
    assert_eq!(cfg.engine.unique_labels, vec!["ProjectName".to_owned()]);
    assert_eq!(cfg.engine.retry.max_attempts, 3);
  }

  #[tokio::test]
  async fn review_cycle() {
    let s = store().await;
    let n = s.create_node("Project".into(), None).await.unwrap().node_id;
    s.create_property(NewProperty::new(n, "status", json!("Open")))
      .await
      .unwrap();

    let opened = execute(&s, Command::Open).await.unwrap();
    let id: Uuid = serde_json::from_value(opened["changeset_id"].clone()).unwrap();
    assert_eq!(opened["status"], json!("open"));

    s.update_property(n, "status".into(), json!("Closed"), Some(id), None)
      .await
      .unwrap();

    let diff = execute(&s, Command::Diff { id }).await.unwrap();
    assert_eq!(diff["changed"][0]["keys"], json!(["status"]));

    let resolved = execute(
      &s,
      Command::Resolve { node: n, key: "status".into(), changeset: Some(id) },
    )
    .await
    .unwrap();
    assert_eq!(resolved["value"], json!("Closed"));

    let committed = execute(&s, Command::Commit { id }).await.unwrap();
    assert_eq!(committed["status"], json!("approved"));
    assert_eq!(committed["affected"], json!(1));

    let resolved = execute(
      &s,
      Command::Resolve { node: n, key: "status".into(), changeset: None },
    )
    .await
    .unwrap();
    assert_eq!(resolved["value"], json!("Closed"));
  }

  #[tokio::test]
  async fn invalid_keys_are_refused() {
    let s = store().await;
    let n = s.create_node("Project".into(), None).await.unwrap().node_id;

    let result = execute(
      &s,
      Command::Resolve { node: n, key: "not a key".into(), changeset: None },
    )
    .await;
    assert!(result.is_err());
  }
}
