//! Property version writes: create, retire, and the unique-label claims that
//! accompany canonical versions.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Transaction, params};
use uuid::Uuid;
use vellum_core::property::{NewProperty, PropertyKey};

use crate::{
  Error, Result,
  changeset::require_open,
  encode::{encode_dt, encode_labels, encode_uuid, encode_value},
  node::require_node,
  query::Statement,
  resolve::{canonical_version, visible_version},
};

// ─── Unique labels ───────────────────────────────────────────────────────────

/// Claim the unique-label values of every version in `property_set`, a
/// subquery over property ids that may reference `?1`.
///
/// Fails with [`Error::Duplicate`] before writing anything if another
/// canonical version already holds one of the values, or if two versions in
/// the set would claim the same one.
pub(crate) fn claim_unique(
  tx: &Transaction<'_>,
  property_set: &str,
  set_param: &str,
) -> Result<()> {
  let claims = format!(
    "SELECT l.value AS label, p.value_json, p.property_id
     FROM properties p, json_each(p.labels) l
     WHERE p.property_id IN ({property_set})
       AND l.value IN (SELECT label FROM unique_labels)"
  );
  let held_elsewhere = format!(
    "SELECT c.label, c.value_json FROM ({claims}) c
     WHERE EXISTS (
       SELECT 1 FROM unique_values v
       WHERE v.label = c.label AND v.value_json = c.value_json
         AND v.property_id != c.property_id)"
  );
  let claimed_twice = format!(
    "SELECT c.label, c.value_json FROM ({claims}) c
     GROUP BY c.label, c.value_json
     HAVING COUNT(DISTINCT c.property_id) > 1"
  );

  for clash_sql in [held_elsewhere, claimed_twice] {
    let clash = tx
      .query_row(
        &format!("{clash_sql} LIMIT 1"),
        params![set_param],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
      )
      .optional()?;
    if let Some((label, value)) = clash {
      return Err(Error::Duplicate { label, value });
    }
  }

  tx.execute(
    &format!(
      "INSERT INTO unique_values (label, value_json, property_id)
       SELECT DISTINCT label, value_json, property_id FROM ({claims})"
    ),
    params![set_param],
  )?;
  Ok(())
}

/// Drop the unique-label claims held by the versions in `property_set`.
pub(crate) fn release_unique(
  tx: &Transaction<'_>,
  property_set: &str,
  set_param: &str,
) -> Result<()> {
  tx.execute(
    &format!("DELETE FROM unique_values WHERE property_id IN ({property_set})"),
    params![set_param],
  )?;
  Ok(())
}

// ─── Version rows ────────────────────────────────────────────────────────────

fn insert_version(
  tx: &Transaction<'_>,
  input: &NewProperty,
  now: &str,
  active: bool,
) -> Result<String> {
  let property_id = encode_uuid(Uuid::new_v4());
  tx.execute(
    "INSERT INTO properties (property_id, key, value_json, labels, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      property_id,
      input.key.as_str(),
      encode_value(&input.value)?,
      encode_labels(&input.labels)?,
      now,
    ],
  )?;
  tx.execute(
    "INSERT INTO property_edges (property_id, node_id, key, active, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      property_id,
      encode_uuid(input.node_id),
      input.key.as_str(),
      active,
      now
    ],
  )?;
  Ok(property_id)
}

/// Write a new canonical version. An identical active value is left alone; a
/// different one must be replaced through an update instead.
pub(crate) fn create_canonical(
  tx: &Transaction<'_>,
  input: &NewProperty,
  now: &str,
) -> Result<usize> {
  let key = input.key.as_str();
  if let Some(existing) = canonical_version(tx, input.node_id, key)? {
    if existing.value == input.value {
      return Ok(0);
    }
    return Err(Error::PropertyExists {
      node_id: input.node_id,
      key:     key.to_owned(),
    });
  }

  let property_id = insert_version(tx, input, now, true)?;
  claim_unique(tx, "SELECT ?1", &property_id)?;
  Ok(1)
}

/// Write a draft version under `changeset`. Nothing is written when the value
/// already matches what the changeset sees; an earlier draft of the same key
/// in this changeset is superseded.
pub(crate) fn create_draft(
  tx: &Transaction<'_>,
  changeset: Uuid,
  input: &NewProperty,
  now: &str,
) -> Result<usize> {
  let key = input.key.as_str();
  if let Some(visible) = visible_version(tx, input.node_id, key, Some(changeset))? {
    if visible.value == input.value {
      return Ok(0);
    }
    if visible.changeset_id == Some(changeset) {
      retire_draft(tx, changeset, input.node_id, key, now)?;
    }
  }

  let property_id = insert_version(tx, input, now, false)?;
  tx.execute(
    "INSERT INTO changeset_properties
       (changeset_id, property_id, node_id, key, active, created_at)
     VALUES (?1, ?2, ?3, ?4, 1, ?5)",
    params![
      encode_uuid(changeset),
      property_id,
      encode_uuid(input.node_id),
      key,
      now
    ],
  )?;
  Ok(1)
}

/// Retire the canonical version of a key: its edge goes inactive and the
/// version is stamped deleted. Returns the number of versions retired.
pub(crate) fn retire_canonical(
  tx: &Transaction<'_>,
  node_id: Uuid,
  key: &str,
  now: &str,
) -> Result<usize> {
  let Some(current) = canonical_version(tx, node_id, key)? else {
    return Ok(0);
  };
  let property_id = encode_uuid(current.property_id);

  release_unique(tx, "SELECT ?1", &property_id)?;
  tx.execute(
    "UPDATE property_edges SET active = 0 WHERE property_id = ?1",
    params![property_id],
  )?;
  tx.execute(
    "UPDATE properties SET deleted_at = ?2 WHERE property_id = ?1",
    params![property_id, now],
  )?;
  Ok(1)
}

/// Retire the current draft of a key within `changeset`.
pub(crate) fn retire_draft(
  tx: &Transaction<'_>,
  changeset: Uuid,
  node_id: Uuid,
  key: &str,
  now: &str,
) -> Result<usize> {
  let changeset = encode_uuid(changeset);
  let drafts = {
    let mut stmt = tx.prepare(
      "SELECT property_id FROM changeset_properties
       WHERE changeset_id = ?1 AND node_id = ?2 AND key = ?3 AND active = 1",
    )?;
    stmt
      .query_map(params![changeset, encode_uuid(node_id), key], |row| {
        row.get::<_, String>(0)
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };

  match drafts.as_slice() {
    [] => Ok(0),
    [property_id] => {
      tx.execute(
        "UPDATE changeset_properties SET active = 0
         WHERE changeset_id = ?1 AND property_id = ?2",
        params![changeset, property_id],
      )?;
      tx.execute(
        "UPDATE properties SET deleted_at = ?2 WHERE property_id = ?1",
        params![property_id, now],
      )?;
      Ok(1)
    }
    many => Err(Error::InvariantViolation {
      node_id,
      key: key.to_owned(),
      active: many.len(),
    }),
  }
}

// ─── Fragments ───────────────────────────────────────────────────────────────

/// Attach a new version to a node, canonically or as a draft of the input's
/// changeset. Returns the number of versions created (0 or 1).
pub fn create_property(input: NewProperty, now: DateTime<Utc>) -> Statement<usize> {
  Statement::step(move |tx| {
    input.key.validate()?;
    require_node(tx, input.node_id)?;
    let now = encode_dt(now);
    match input.changeset_id {
      Some(changeset) => {
        require_open(tx, changeset)?;
        create_draft(tx, changeset, &input, &now)
      }
      None => create_canonical(tx, &input, &now),
    }
  })
}

/// Retire the current version of a key, canonically or within a changeset.
/// Returns the number of versions retired (0 or 1).
pub fn deactivate_property(
  node_id: Uuid,
  key: PropertyKey,
  changeset: Option<Uuid>,
  now: DateTime<Utc>,
) -> Statement<usize> {
  Statement::step(move |tx| {
    key.validate()?;
    require_node(tx, node_id)?;
    let now = encode_dt(now);
    match changeset {
      Some(changeset) => {
        require_open(tx, changeset)?;
        retire_draft(tx, changeset, node_id, key.as_str(), &now)
      }
      None => retire_canonical(tx, node_id, key.as_str(), &now),
    }
  })
}
