use serde_json::json;
use uuid::Uuid;
use vellum_core::{node::NewRelation, store::GraphStore};

use super::{get, node, set, store};
use crate::Error;

#[tokio::test]
async fn create_and_get_node() {
  let s = store().await;

  let created = s.create_node("Project".into(), None).await.unwrap();
  assert_eq!(created.label, "Project");
  assert!(!created.is_deleted());

  let fetched = s.get_node(created.node_id, None).await.unwrap();
  assert_eq!(fetched, Some(created));
}

#[tokio::test]
async fn get_node_missing_returns_none() {
  let s = store().await;
  assert!(s.get_node(Uuid::new_v4(), None).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_node_cascades_to_edges() {
  let s = store().await;
  let project = node(&s, "Project").await;
  let task = node(&s, "Task").await;
  set(&s, task, "title", json!("Write docs")).await;
  s.create_relation(NewRelation::new(project, "has_task", task))
    .await
    .unwrap();

  assert_eq!(s.delete_node(task, None).await.unwrap(), 1);
  assert!(s.get_node(task, None).await.unwrap().is_none());
  assert_eq!(get(&s, task, "title", None).await, None);
  assert!(s.relations(project, None, None).await.unwrap().is_empty());

  let history = s.history(task, "title".into()).await.unwrap();
  assert_eq!(history.len(), 1);
  assert!(history[0].is_historical());
}

#[tokio::test]
async fn deleted_nodes_refuse_writes() {
  let s = store().await;
  let n = node(&s, "Project").await;
  s.delete_node(n, None).await.unwrap();

  let result = s
    .update_property(n, "name".into(), json!("x"), None, None)
    .await;
  assert!(matches!(result, Err(Error::NodeNotFound(id)) if id == n));

  let result = s.delete_node(n, None).await;
  assert!(matches!(result, Err(Error::NodeNotFound(_))));
}

#[tokio::test]
async fn relations_filter_by_kind() {
  let s = store().await;
  let a = node(&s, "Project").await;
  let b = node(&s, "Task").await;
  let c = node(&s, "Person").await;
  s.create_relation(NewRelation::new(a, "has_task", b))
    .await
    .unwrap();
  s.create_relation(NewRelation::new(a, "owned_by", c))
    .await
    .unwrap();

  assert_eq!(s.relations(a, None, None).await.unwrap().len(), 2);
  let owners = s
    .relations(a, Some("owned_by".into()), None)
    .await
    .unwrap();
  assert_eq!(owners.len(), 1);
  assert_eq!(owners[0].to_id, c);
}

#[tokio::test]
async fn remove_relation() {
  let s = store().await;
  let a = node(&s, "Project").await;
  let b = node(&s, "Task").await;
  let rel = s
    .create_relation(NewRelation::new(a, "has_task", b))
    .await
    .unwrap();

  assert_eq!(s.remove_relation(rel.relation_id, None).await.unwrap(), 1);
  assert!(s.relations(a, None, None).await.unwrap().is_empty());

  let result = s.remove_relation(rel.relation_id, None).await;
  assert!(matches!(result, Err(Error::RelationNotFound(_))));
}

#[tokio::test]
async fn relation_to_missing_node_is_not_found() {
  let s = store().await;
  let a = node(&s, "Project").await;
  let result = s
    .create_relation(NewRelation::new(a, "has_task", Uuid::new_v4()))
    .await;
  assert!(matches!(result, Err(Error::NodeNotFound(_))));
}
