//! Version resolution: which version of a key a reader sees.
//!
//! Outside a changeset the reader sees the canonical version, the one behind
//! the single active edge. Inside a changeset the reader sees that changeset's
//! own draft if it has one, and the canonical version otherwise. Drafts of a
//! rejected changeset stay visible in its scope so the rejected edit can still
//! be inspected.

use std::collections::BTreeMap;

use rusqlite::{Params, Transaction, params};
use uuid::Uuid;
use vellum_core::property::{Property, PropertyKey, Value};

use crate::{
  Error, Result,
  changeset::require_scope,
  encode::{PROPERTY_COLUMNS, RawProperty, encode_uuid},
  node::require_node_row,
  query::Statement,
};

pub(crate) fn query_properties<P: Params>(
  tx: &Transaction<'_>,
  sql: &str,
  params: P,
) -> Result<Vec<Property>> {
  let mut stmt = tx.prepare(sql)?;
  let raws = stmt
    .query_map(params, RawProperty::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawProperty::into_property).collect()
}

/// At most one row may match; more means the single-current-version rule was
/// broken underneath us.
fn at_most_one(
  node_id: Uuid,
  key: &str,
  mut rows: Vec<Property>,
) -> Result<Option<Property>> {
  match rows.len() {
    0 | 1 => Ok(rows.pop()),
    active => Err(Error::InvariantViolation {
      node_id,
      key: key.to_owned(),
      active,
    }),
  }
}

fn canonical_sql(filter: &str) -> String {
  format!(
    "SELECT {PROPERTY_COLUMNS}, NULL
     FROM property_edges e JOIN properties p ON p.property_id = e.property_id
     WHERE e.node_id = ?1 AND e.active = 1 {filter}
     ORDER BY e.key"
  )
}

fn draft_sql(filter: &str) -> String {
  format!(
    "SELECT {PROPERTY_COLUMNS}, d.changeset_id
     FROM changeset_properties d
     JOIN properties p ON p.property_id = d.property_id
     JOIN property_edges e ON e.property_id = d.property_id
     WHERE d.node_id = ?1 AND d.changeset_id = ?2
       AND (d.active = 1 OR d.outcome = 'rejected') {filter}
     ORDER BY d.key, p.created_at DESC, p.rowid DESC"
  )
}

pub(crate) fn canonical_version(
  tx: &Transaction<'_>,
  node_id: Uuid,
  key: &str,
) -> Result<Option<Property>> {
  let rows = query_properties(
    tx,
    &canonical_sql("AND e.key = ?2"),
    params![encode_uuid(node_id), key],
  )?;
  at_most_one(node_id, key, rows)
}

/// The draft of `key` in `changeset`: the active one while the changeset is
/// open, or the last one before it was rejected.
pub(crate) fn draft_version(
  tx: &Transaction<'_>,
  changeset: Uuid,
  node_id: Uuid,
  key: &str,
) -> Result<Option<Property>> {
  let rows = query_properties(
    tx,
    &draft_sql("AND d.key = ?3"),
    params![encode_uuid(node_id), encode_uuid(changeset), key],
  )?;
  at_most_one(node_id, key, rows)
}

pub(crate) fn visible_version(
  tx: &Transaction<'_>,
  node_id: Uuid,
  key: &str,
  changeset: Option<Uuid>,
) -> Result<Option<Property>> {
  let draft = match changeset {
    Some(changeset) => draft_version(tx, changeset, node_id, key)?,
    None => None,
  };
  match draft {
    Some(draft) => Ok(Some(draft)),
    None => canonical_version(tx, node_id, key),
  }
}

/// Every key visible on a node in the given scope.
pub(crate) fn visible_map(
  tx: &Transaction<'_>,
  node_id: Uuid,
  changeset: Option<Uuid>,
) -> Result<BTreeMap<String, Value>> {
  let node = encode_uuid(node_id);
  let mut map = BTreeMap::new();

  for property in query_properties(tx, &canonical_sql(""), params![node])? {
    insert_unique(&mut map, node_id, property)?;
  }

  if let Some(changeset) = changeset {
    let mut drafts = BTreeMap::new();
    for draft in
      query_properties(tx, &draft_sql(""), params![node, encode_uuid(changeset)])?
    {
      insert_unique(&mut drafts, node_id, draft)?;
    }
    map.extend(drafts);
  }
  Ok(map)
}

fn insert_unique(
  map: &mut BTreeMap<String, Value>,
  node_id: Uuid,
  property: Property,
) -> Result<()> {
  if map.contains_key(&property.key) {
    return Err(Error::InvariantViolation { node_id, key: property.key, active: 2 });
  }
  map.insert(property.key, property.value);
  Ok(())
}

// ─── Fragments ───────────────────────────────────────────────────────────────

pub fn resolve_version(
  node_id: Uuid,
  key: PropertyKey,
  changeset: Option<Uuid>,
) -> Statement<Option<Property>> {
  Statement::step(move |tx| {
    key.validate()?;
    require_node_row(tx, node_id)?;
    require_scope(tx, changeset)?;
    visible_version(tx, node_id, key.as_str(), changeset)
  })
}

pub fn resolve_property(
  node_id: Uuid,
  key: PropertyKey,
  changeset: Option<Uuid>,
) -> Statement<Option<Value>> {
  resolve_version(node_id, key, changeset).map(|v| v.map(|p| p.value))
}

pub fn properties(
  node_id: Uuid,
  changeset: Option<Uuid>,
) -> Statement<BTreeMap<String, Value>> {
  Statement::step(move |tx| {
    require_node_row(tx, node_id)?;
    require_scope(tx, changeset)?;
    visible_map(tx, node_id, changeset)
  })
}

/// Every version ever attached to the key, newest first.
pub fn history(node_id: Uuid, key: PropertyKey) -> Statement<Vec<Property>> {
  Statement::step(move |tx| {
    key.validate()?;
    require_node_row(tx, node_id)?;
    query_properties(
      tx,
      &format!(
        "SELECT {PROPERTY_COLUMNS},
           (SELECT d.changeset_id FROM changeset_properties d
            WHERE d.property_id = p.property_id)
         FROM property_edges e JOIN properties p ON p.property_id = e.property_id
         WHERE e.node_id = ?1 AND e.key = ?2
         ORDER BY p.created_at DESC, p.rowid DESC"
      ),
      params![encode_uuid(node_id), key.as_str()],
    )
  })
}
