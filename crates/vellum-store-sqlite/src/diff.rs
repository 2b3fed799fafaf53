//! What a changeset changes relative to the canonical graph.

use std::collections::{BTreeSet, HashSet};

use rusqlite::{Transaction, params};
use uuid::Uuid;
use vellum_core::{
  changeset::NodeChange,
  diff::{ChangedNode, ChangesetDiff},
  node::BaseNode,
};

use crate::{
  Result,
  changeset::load_changeset,
  encode::{NODE_COLUMNS, RawNode, decode_uuid, encode_uuid},
  node::load_node,
  query::Statement,
  resolve::visible_map,
};

/// Nodes the changeset creates or deletes. Links of a rejected changeset are
/// still reported so the rejected proposal can be reviewed.
fn linked_nodes(
  tx: &Transaction<'_>,
  changeset: &str,
  change: NodeChange,
) -> Result<Vec<BaseNode>> {
  let mut stmt = tx.prepare(&format!(
    "SELECT {NODE_COLUMNS} FROM changeset_nodes c
     JOIN nodes n ON n.node_id = c.node_id
     WHERE c.changeset_id = ?1 AND c.change = ?2
       AND (c.active = 1 OR c.outcome = 'rejected')
     ORDER BY c.created_at, c.rowid"
  ))?;
  let raws = stmt
    .query_map(params![changeset, change.as_ref()], RawNode::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawNode::into_node).collect()
}

fn drafted_nodes(tx: &Transaction<'_>, changeset: &str) -> Result<Vec<Uuid>> {
  let mut stmt = tx.prepare(
    "SELECT node_id FROM changeset_properties
     WHERE changeset_id = ?1 AND (active = 1 OR outcome = 'rejected')
     GROUP BY node_id
     ORDER BY MIN(created_at)",
  )?;
  let ids = stmt
    .query_map(params![changeset], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  ids.iter().map(|id| decode_uuid(id)).collect()
}

fn changed_node(
  tx: &Transaction<'_>,
  node_id: Uuid,
  changeset: Uuid,
) -> Result<Option<ChangedNode>> {
  let previous = visible_map(tx, node_id, None)?;
  let updated = visible_map(tx, node_id, Some(changeset))?;

  let keys: Vec<String> = previous
    .keys()
    .chain(updated.keys())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .filter(|key| previous.get(*key) != updated.get(*key))
    .cloned()
    .collect();
  if keys.is_empty() {
    return Ok(None);
  }

  Ok(Some(ChangedNode { node: load_node(tx, node_id)?, keys, previous, updated }))
}

/// Partition the changeset's effect into added, removed and changed nodes.
/// Nodes created by the changeset are reported as added only.
pub fn diff_changeset(id: Uuid) -> Statement<ChangesetDiff> {
  Statement::step(move |tx| {
    load_changeset(tx, id)?;
    let changeset = encode_uuid(id);

    let added = linked_nodes(tx, &changeset, NodeChange::Create)?;
    let removed = linked_nodes(tx, &changeset, NodeChange::Delete)?;
    let new_nodes: HashSet<Uuid> = added.iter().map(|n| n.node_id).collect();

    let mut changed = Vec::new();
    for node_id in drafted_nodes(tx, &changeset)? {
      if new_nodes.contains(&node_id) {
        continue;
      }
      changed.extend(changed_node(tx, node_id, id)?);
    }

    Ok(ChangesetDiff { added, removed, changed })
  })
}
