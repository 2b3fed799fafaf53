//! The update coordinator: inline replace or new entry.
//!
//! A canonical version younger than the permanence window is overwritten in
//! place. Everything else (permanent versions, first writes, edits inside a
//! changeset) retires the visible version and creates a new one, so the
//! history keeps one entry per deliberate edit instead of one per keystroke.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use uuid::Uuid;
use vellum_core::{
  property::{NewProperty, Property, PropertyKey, Value, is_permanent},
  update::UpdateOutcome,
};

use crate::{
  Result,
  changeset::require_open,
  encode::{encode_dt, encode_uuid, encode_value},
  node::require_node,
  property::{
    claim_unique, create_canonical, create_draft, release_unique,
    retire_canonical, retire_draft,
  },
  query::Statement,
  resolve::visible_version,
};

/// Everything an update needs to decide its method.
struct Pending {
  node_id:   Uuid,
  key:       PropertyKey,
  value:     Value,
  changeset: Option<Uuid>,
  now:       DateTime<Utc>,
}

pub fn update_property(
  node_id: Uuid,
  key: PropertyKey,
  value: Value,
  changeset: Option<Uuid>,
  window: Duration,
  now: DateTime<Utc>,
) -> Statement<UpdateOutcome> {
  let pending = Pending { node_id, key, value, changeset, now };
  load_visible(pending).and_then(move |(mut pending, existing)| {
    let inline = pending.changeset.is_none()
      && !is_permanent(existing.as_ref(), pending.now, window);
    // Never stamp a write earlier than the version it follows.
    if let Some(existing) = &existing {
      pending.now = pending.now.max(existing.last_written_at());
    }
    match existing {
      Some(existing) if inline => inline_replace(existing, pending.value, pending.now),
      existing => new_entry(pending, existing),
    }
  })
}

/// Apply several updates to one node in a single transaction, keyed by the
/// property key's string form.
pub fn update_properties(
  node_id: Uuid,
  changes: BTreeMap<PropertyKey, Value>,
  changeset: Option<Uuid>,
  window: Duration,
  now: DateTime<Utc>,
) -> Statement<BTreeMap<String, UpdateOutcome>> {
  let updates = changes.into_iter().map(move |(key, value)| {
    let name = key.as_str().to_owned();
    update_property(node_id, key, value, changeset, window, now)
      .map(move |outcome| (name, outcome))
  });
  Statement::all(updates).map(|outcomes| outcomes.into_iter().collect())
}

fn load_visible(pending: Pending) -> Statement<(Pending, Option<Property>)> {
  Statement::step(move |tx| -> Result<_> {
    pending.key.validate()?;
    require_node(tx, pending.node_id)?;
    if let Some(changeset) = pending.changeset {
      require_open(tx, changeset)?;
    }
    let existing = visible_version(
      tx,
      pending.node_id,
      pending.key.as_str(),
      pending.changeset,
    )?;
    Ok((pending, existing))
  })
}

fn inline_replace(
  existing: Property,
  value: Value,
  now: DateTime<Utc>,
) -> Statement<UpdateOutcome> {
  Statement::step(move |tx| {
    let property_id = encode_uuid(existing.property_id);
    let updated = tx.execute(
      "UPDATE properties SET value_json = ?2, modified_at = ?3
       WHERE property_id = ?1 AND deleted_at IS NULL",
      params![property_id, encode_value(&value)?, encode_dt(now)],
    )?;
    if !existing.labels.is_empty() {
      release_unique(tx, "SELECT ?1", &property_id)?;
      claim_unique(tx, "SELECT ?1", &property_id)?;
    }
    Ok(UpdateOutcome::inline_replace(updated))
  })
}

/// Retire the visible version and write a new one. The new version inherits
/// the retired version's labels.
fn new_entry(
  pending: Pending,
  existing: Option<Property>,
) -> Statement<UpdateOutcome> {
  Statement::step(move |tx| {
    let Pending { node_id, key, value, changeset, now } = pending;

    if changeset.is_some() && existing.as_ref().is_some_and(|p| p.value == value) {
      return Ok(UpdateOutcome::new_entry(0, 0));
    }

    let now = encode_dt(now);
    let input = NewProperty {
      node_id,
      key,
      value,
      labels: existing.map(|p| p.labels).unwrap_or_default(),
      changeset_id: changeset,
    };
    let key = input.key.as_str();

    let (deactivated, created) = match changeset {
      Some(changeset) => (
        retire_draft(tx, changeset, node_id, key, &now)?,
        create_draft(tx, changeset, &input, &now)?,
      ),
      None => (
        retire_canonical(tx, node_id, key, &now)?,
        create_canonical(tx, &input, &now)?,
      ),
    };
    Ok(UpdateOutcome::new_entry(deactivated, created))
  })
}
