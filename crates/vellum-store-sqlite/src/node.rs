//! Base node and relation fragments.
//!
//! Nodes and relations follow the same active-flag pattern as properties so
//! that creations, deletions and relation changes can be proposed under a
//! changeset and applied on commit.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Transaction, params};
use uuid::Uuid;
use vellum_core::{
  changeset::{NodeChange, RelationChange},
  node::{BaseNode, NewRelation, Relation},
};

use crate::{
  Error, Result,
  changeset::{require_open, require_scope},
  encode::{
    NODE_COLUMNS, RELATION_COLUMNS, RawNode, RawRelation, encode_dt,
    encode_uuid,
  },
  property::release_unique,
  query::Statement,
};

// ─── Guards ──────────────────────────────────────────────────────────────────

/// Fail with `NodeNotFound` unless the node exists and is not soft-deleted.
pub(crate) fn require_node(tx: &Transaction<'_>, node_id: Uuid) -> Result<()> {
  tx.query_row(
    "SELECT 1 FROM nodes WHERE node_id = ?1 AND deleted_at IS NULL",
    params![encode_uuid(node_id)],
    |_| Ok(()),
  )
  .optional()?
  .ok_or(Error::NodeNotFound(node_id))
}

/// Fail with `NodeNotFound` unless the node row exists, deleted or not.
pub(crate) fn require_node_row(tx: &Transaction<'_>, node_id: Uuid) -> Result<()> {
  tx.query_row(
    "SELECT 1 FROM nodes WHERE node_id = ?1",
    params![encode_uuid(node_id)],
    |_| Ok(()),
  )
  .optional()?
  .ok_or(Error::NodeNotFound(node_id))
}

pub(crate) fn load_node(tx: &Transaction<'_>, node_id: Uuid) -> Result<BaseNode> {
  let raw = tx
    .query_row(
      &format!("SELECT {NODE_COLUMNS} FROM nodes n WHERE n.node_id = ?1"),
      params![encode_uuid(node_id)],
      RawNode::from_row,
    )
    .optional()?
    .ok_or(Error::NodeNotFound(node_id))?;
  raw.into_node()
}

// ─── Soft delete ─────────────────────────────────────────────────────────────

/// Soft-delete every live node in `node_set`, deactivate the property and
/// relation edges hanging off them, and withdraw drafts still pending on them
/// in any changeset.
///
/// `node_set` is a subquery selecting node ids that may reference `?1`, bound
/// to `set_param`. Returns the number of nodes deleted.
pub(crate) fn cascade_soft_delete(
  tx: &Transaction<'_>,
  node_set: &str,
  set_param: &str,
  now: &str,
) -> Result<usize> {
  let live_versions = format!(
    "SELECT property_id FROM property_edges
     WHERE active = 1 AND node_id IN ({node_set})"
  );

  release_unique(tx, &live_versions, set_param)?;
  tx.execute(
    &format!(
      "UPDATE properties SET deleted_at = ?2
       WHERE deleted_at IS NULL AND property_id IN ({live_versions})"
    ),
    params![set_param, now],
  )?;
  tx.execute(
    &format!(
      "UPDATE property_edges SET active = 0
       WHERE active = 1 AND node_id IN ({node_set})"
    ),
    params![set_param],
  )?;
  // Drafts pending on a deleted node can never be promoted.
  let pending_drafts = format!(
    "SELECT property_id FROM changeset_properties
     WHERE active = 1 AND node_id IN ({node_set})"
  );
  tx.execute(
    &format!(
      "UPDATE properties SET deleted_at = ?2
       WHERE deleted_at IS NULL AND property_id IN ({pending_drafts})"
    ),
    params![set_param, now],
  )?;
  tx.execute(
    &format!(
      "UPDATE changeset_properties SET active = 0
       WHERE active = 1 AND node_id IN ({node_set})"
    ),
    params![set_param],
  )?;
  tx.execute(
    &format!(
      "UPDATE relations SET active = 0, deleted_at = ?2
       WHERE deleted_at IS NULL
         AND (from_id IN ({node_set}) OR to_id IN ({node_set}))"
    ),
    params![set_param, now],
  )?;
  let nodes = tx.execute(
    &format!(
      "UPDATE nodes SET deleted_at = ?2
       WHERE deleted_at IS NULL AND node_id IN ({node_set})"
    ),
    params![set_param, now],
  )?;
  Ok(nodes)
}

fn link_node(
  tx: &Transaction<'_>,
  changeset: Uuid,
  node_id: Uuid,
  change: NodeChange,
  now: &str,
) -> Result<usize> {
  Ok(tx.execute(
    "INSERT OR IGNORE INTO changeset_nodes
       (changeset_id, node_id, change, active, created_at)
     VALUES (?1, ?2, ?3, 1, ?4)",
    params![encode_uuid(changeset), encode_uuid(node_id), change.as_ref(), now],
  )?)
}

/// Drop the changeset's pending creation of the node. Returns whether there
/// was one.
fn withdraw_creation(
  tx: &Transaction<'_>,
  changeset: Uuid,
  node_id: Uuid,
) -> Result<bool> {
  let withdrawn = tx.execute(
    "UPDATE changeset_nodes SET active = 0
     WHERE changeset_id = ?1 AND node_id = ?2 AND change = 'create'
       AND active = 1",
    params![encode_uuid(changeset), encode_uuid(node_id)],
  )?;
  Ok(withdrawn > 0)
}

// ─── Node fragments ──────────────────────────────────────────────────────────

pub fn create_node(
  label: String,
  changeset: Option<Uuid>,
  now: DateTime<Utc>,
) -> Statement<BaseNode> {
  Statement::step(move |tx| {
    if let Some(changeset) = changeset {
      require_open(tx, changeset)?;
    }

    let node = BaseNode {
      node_id: Uuid::new_v4(),
      label,
      created_at: now,
      deleted_at: None,
    };
    let now = encode_dt(now);

    tx.execute(
      "INSERT INTO nodes (node_id, label, created_at) VALUES (?1, ?2, ?3)",
      params![encode_uuid(node.node_id), node.label, now],
    )?;
    if let Some(changeset) = changeset {
      link_node(tx, changeset, node.node_id, NodeChange::Create, &now)?;
    }
    Ok(node)
  })
}

/// Canonical reads hide nodes still pending creation in any changeset. A
/// changeset scope also sees its own pending creations and hides the nodes it
/// schedules for deletion.
pub fn get_node(
  node_id: Uuid,
  changeset: Option<Uuid>,
) -> Statement<Option<BaseNode>> {
  Statement::step(move |tx| {
    require_scope(tx, changeset)?;
    let raw = tx
      .query_row(
        &format!(
          "SELECT {NODE_COLUMNS} FROM nodes n
           WHERE n.node_id = ?1 AND n.deleted_at IS NULL
             AND NOT EXISTS (
               SELECT 1 FROM changeset_nodes c
               WHERE c.node_id = n.node_id AND c.active = 1
                 AND ((c.change = 'create' AND c.changeset_id IS NOT ?2)
                   OR (c.change = 'delete' AND c.changeset_id IS ?2)))"
        ),
        params![encode_uuid(node_id), changeset.map(encode_uuid)],
        RawNode::from_row,
      )
      .optional()?;
    raw.map(RawNode::into_node).transpose()
  })
}

pub fn delete_node(
  node_id: Uuid,
  changeset: Option<Uuid>,
  now: DateTime<Utc>,
) -> Statement<usize> {
  Statement::step(move |tx| {
    require_node(tx, node_id)?;
    let now = encode_dt(now);
    match changeset {
      Some(changeset) => {
        require_open(tx, changeset)?;
        if withdraw_creation(tx, changeset, node_id)? {
          cascade_soft_delete(tx, "SELECT ?1", &encode_uuid(node_id), &now)
        } else {
          link_node(tx, changeset, node_id, NodeChange::Delete, &now)
        }
      }
      None => cascade_soft_delete(tx, "SELECT ?1", &encode_uuid(node_id), &now),
    }
  })
}

// ─── Relation fragments ──────────────────────────────────────────────────────

fn link_relation(
  tx: &Transaction<'_>,
  changeset: Uuid,
  relation_id: Uuid,
  change: RelationChange,
  now: &str,
) -> Result<usize> {
  Ok(tx.execute(
    "INSERT OR IGNORE INTO changeset_relations
       (changeset_id, relation_id, change, active, created_at)
     VALUES (?1, ?2, ?3, 1, ?4)",
    params![
      encode_uuid(changeset),
      encode_uuid(relation_id),
      change.as_ref(),
      now
    ],
  )?)
}

pub fn create_relation(input: NewRelation, now: DateTime<Utc>) -> Statement<Relation> {
  Statement::step(move |tx| {
    require_node(tx, input.from_id)?;
    require_node(tx, input.to_id)?;
    if let Some(changeset) = input.changeset_id {
      require_open(tx, changeset)?;
    }

    let relation = Relation {
      relation_id: Uuid::new_v4(),
      kind:        input.kind,
      from_id:     input.from_id,
      to_id:       input.to_id,
      active:      input.changeset_id.is_none(),
      created_at:  now,
      deleted_at:  None,
    };
    let now = encode_dt(now);

    tx.execute(
      "INSERT INTO relations
         (relation_id, kind, from_id, to_id, active, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      params![
        encode_uuid(relation.relation_id),
        relation.kind,
        encode_uuid(relation.from_id),
        encode_uuid(relation.to_id),
        relation.active,
        now,
      ],
    )?;
    if let Some(changeset) = input.changeset_id {
      link_relation(tx, changeset, relation.relation_id, RelationChange::Add, &now)?;
    }
    Ok(relation)
  })
}

/// Remove a relation, or propose its removal under a changeset. Removing a
/// relation the same changeset proposed to add withdraws the proposal.
pub fn remove_relation(
  relation_id: Uuid,
  changeset: Option<Uuid>,
  now: DateTime<Utc>,
) -> Statement<usize> {
  Statement::step(move |tx| {
    let id = encode_uuid(relation_id);
    let relation = tx
      .query_row(
        &format!(
          "SELECT {RELATION_COLUMNS} FROM relations r
           WHERE r.relation_id = ?1 AND r.deleted_at IS NULL"
        ),
        params![id],
        RawRelation::from_row,
      )
      .optional()?
      .ok_or(Error::RelationNotFound(relation_id))?
      .into_relation()?;
    let now = encode_dt(now);

    let Some(changeset) = changeset else {
      return Ok(tx.execute(
        "UPDATE relations SET active = 0, deleted_at = ?2
         WHERE relation_id = ?1 AND active = 1",
        params![id, now],
      )?);
    };

    require_open(tx, changeset)?;
    let withdrawn = tx.execute(
      "UPDATE changeset_relations SET active = 0
       WHERE changeset_id = ?1 AND relation_id = ?2
         AND change = 'add' AND active = 1",
      params![encode_uuid(changeset), id],
    )?;
    if withdrawn > 0 {
      tx.execute(
        "UPDATE relations SET deleted_at = ?2 WHERE relation_id = ?1",
        params![id, now],
      )?;
      return Ok(withdrawn);
    }
    if !relation.active {
      return Ok(0);
    }
    link_relation(tx, changeset, relation_id, RelationChange::Remove, &now)
  })
}

/// Outgoing relations of a node. A changeset scope adds the relations it
/// proposes and hides the ones it proposes to remove.
pub fn relations(
  node_id: Uuid,
  kind: Option<String>,
  changeset: Option<Uuid>,
) -> Statement<Vec<Relation>> {
  Statement::step(move |tx| {
    require_node_row(tx, node_id)?;
    require_scope(tx, changeset)?;

    let mut stmt = tx.prepare(&format!(
      "SELECT {RELATION_COLUMNS} FROM relations r
       WHERE r.from_id = ?1 AND (?2 IS NULL OR r.kind = ?2)
         AND r.deleted_at IS NULL
         AND ((r.active = 1 AND NOT EXISTS (
                SELECT 1 FROM changeset_relations c
                WHERE c.relation_id = r.relation_id AND c.changeset_id IS ?3
                  AND c.change = 'remove' AND c.active = 1))
           OR EXISTS (
                SELECT 1 FROM changeset_relations c
                WHERE c.relation_id = r.relation_id AND c.changeset_id IS ?3
                  AND c.change = 'add' AND c.active = 1))
       ORDER BY r.created_at, r.rowid"
    ))?;
    let raws = stmt
      .query_map(
        params![encode_uuid(node_id), kind, changeset.map(encode_uuid)],
        RawRelation::from_row,
      )?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    raws.into_iter().map(RawRelation::into_relation).collect()
  })
}
