//! Changeset lifecycle: open, commit, reject.
//!
//! Commit and reject are set-based: each step is one statement over every
//! link of the changeset, and the whole sequence runs in one transaction.
//! Both are idempotent. Repeating the transition that already happened is a
//! no-op; attempting the opposite one fails with `ChangesetClosed`.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Transaction, params};
use uuid::Uuid;
use vellum_core::changeset::{
  Changeset, ChangesetAction, ChangesetStatus, LinkOutcome,
};

use crate::{
  Error, Result,
  encode::{RawChangeset, encode_dt, encode_uuid},
  node::cascade_soft_delete,
  property::{claim_unique, release_unique},
  query::Statement,
};

// ─── Guards ──────────────────────────────────────────────────────────────────

pub(crate) fn load_changeset(tx: &Transaction<'_>, id: Uuid) -> Result<Changeset> {
  find_changeset(tx, id)?.ok_or(Error::ChangesetNotFound(id))
}

fn find_changeset(tx: &Transaction<'_>, id: Uuid) -> Result<Option<Changeset>> {
  tx.query_row(
    "SELECT changeset_id, status, created_at, finalized_at
     FROM changesets WHERE changeset_id = ?1",
    params![encode_uuid(id)],
    RawChangeset::from_row,
  )
  .optional()?
  .map(RawChangeset::into_changeset)
  .transpose()
}

/// Fail unless the changeset exists and still accepts drafts.
pub(crate) fn require_open(tx: &Transaction<'_>, id: Uuid) -> Result<()> {
  let changeset = load_changeset(tx, id)?;
  if !changeset.status.is_open() {
    return Err(Error::ChangesetClosed { id, status: changeset.status });
  }
  Ok(())
}

/// Fail unless a read scope names an existing changeset. Finalized changesets
/// are still readable.
pub(crate) fn require_scope(tx: &Transaction<'_>, scope: Option<Uuid>) -> Result<()> {
  match scope {
    Some(id) => load_changeset(tx, id).map(|_| ()),
    None => Ok(()),
  }
}

// ─── Set queries ─────────────────────────────────────────────────────────────
// Each reads `?1` as the changeset id.

const ACTIVE_DRAFTS: &str = "SELECT property_id FROM changeset_properties
   WHERE changeset_id = ?1 AND active = 1";

/// Canonical versions of every key the changeset drafted.
const REPLACED_VERSIONS: &str = "SELECT e.property_id FROM property_edges e
   JOIN changeset_properties d ON d.node_id = e.node_id AND d.key = e.key
   WHERE d.changeset_id = ?1 AND d.active = 1 AND e.active = 1";

const DELETED_NODES: &str = "SELECT node_id FROM changeset_nodes
   WHERE changeset_id = ?1 AND change = 'delete' AND active = 1";

const CREATED_NODES: &str = "SELECT node_id FROM changeset_nodes
   WHERE changeset_id = ?1 AND change = 'create' AND active = 1";

const ADDED_RELATIONS: &str = "SELECT relation_id FROM changeset_relations
   WHERE changeset_id = ?1 AND change = 'add' AND active = 1";

const REMOVED_RELATIONS: &str = "SELECT relation_id FROM changeset_relations
   WHERE changeset_id = ?1 AND change = 'remove' AND active = 1";

/// Distinct nodes touched by the changeset's active links.
fn affected_nodes(tx: &Transaction<'_>, id: &str) -> Result<usize> {
  let count: i64 = tx.query_row(
    "SELECT COUNT(*) FROM (
       SELECT node_id FROM changeset_properties
        WHERE changeset_id = ?1 AND active = 1
       UNION
       SELECT node_id FROM changeset_nodes
        WHERE changeset_id = ?1 AND active = 1
       UNION
       SELECT r.from_id FROM changeset_relations c
         JOIN relations r ON r.relation_id = c.relation_id
        WHERE c.changeset_id = ?1 AND c.active = 1)",
    params![id],
    |row| row.get(0),
  )?;
  usize::try_from(count).map_err(|_| Error::Decode(format!("node count {count}")))
}

/// Close every active link of the changeset with the given outcome.
fn close_links(tx: &Transaction<'_>, id: &str, outcome: LinkOutcome) -> Result<()> {
  for table in ["changeset_properties", "changeset_relations", "changeset_nodes"] {
    tx.execute(
      &format!(
        "UPDATE {table} SET active = 0, outcome = ?2
         WHERE changeset_id = ?1 AND active = 1"
      ),
      params![id, outcome.as_ref()],
    )?;
  }
  Ok(())
}

fn finalize(
  tx: &Transaction<'_>,
  id: &str,
  status: ChangesetStatus,
  now: &str,
) -> Result<()> {
  tx.execute(
    "UPDATE changesets SET status = ?2, finalized_at = ?3
     WHERE changeset_id = ?1 AND status = 'open'",
    params![id, status.as_ref(), now],
  )?;
  Ok(())
}

/// Decide whether a transition has work to do. `Ok(false)` means it already
/// happened.
fn begin(tx: &Transaction<'_>, id: Uuid, action: ChangesetAction) -> Result<bool> {
  let changeset = load_changeset(tx, id)?;
  match changeset.status {
    ChangesetStatus::Open => Ok(true),
    status if status == action.target_status() => Ok(false),
    status => Err(Error::ChangesetClosed { id, status }),
  }
}

// ─── Transitions ─────────────────────────────────────────────────────────────

fn commit(tx: &Transaction<'_>, changeset: Uuid, now: &str) -> Result<usize> {
  if !begin(tx, changeset, ChangesetAction::Commit)? {
    return Ok(0);
  }
  let id = encode_uuid(changeset);
  let affected = affected_nodes(tx, &id)?;

  // Retire the canonical versions the drafts replace.
  release_unique(tx, REPLACED_VERSIONS, &id)?;
  tx.execute(
    &format!(
      "UPDATE properties SET deleted_at = ?2
       WHERE property_id IN ({REPLACED_VERSIONS})"
    ),
    params![id, now],
  )?;
  tx.execute(
    &format!(
      "UPDATE property_edges SET active = 0
       WHERE property_id IN ({REPLACED_VERSIONS})"
    ),
    params![id],
  )?;

  // Promote the drafts.
  tx.execute(
    &format!("UPDATE property_edges SET active = 1 WHERE property_id IN ({ACTIVE_DRAFTS})"),
    params![id],
  )?;
  claim_unique(tx, ACTIVE_DRAFTS, &id)?;

  tx.execute(
    &format!(
      "UPDATE relations SET active = 1
       WHERE deleted_at IS NULL AND relation_id IN ({ADDED_RELATIONS})"
    ),
    params![id],
  )?;
  tx.execute(
    &format!(
      "UPDATE relations SET active = 0, deleted_at = ?2
       WHERE active = 1 AND relation_id IN ({REMOVED_RELATIONS})"
    ),
    params![id, now],
  )?;

  cascade_soft_delete(tx, DELETED_NODES, &id, now)?;

  close_links(tx, &id, LinkOutcome::Committed)?;
  finalize(tx, &id, ChangesetStatus::Approved, now)?;
  Ok(affected)
}

fn reject(tx: &Transaction<'_>, changeset: Uuid, now: &str) -> Result<usize> {
  if !begin(tx, changeset, ChangesetAction::Reject)? {
    return Ok(0);
  }
  let id = encode_uuid(changeset);
  let affected = affected_nodes(tx, &id)?;

  // Proposed relations and nodes never became canonical; retire them.
  tx.execute(
    &format!(
      "UPDATE relations SET deleted_at = ?2
       WHERE deleted_at IS NULL AND active = 0
         AND relation_id IN ({ADDED_RELATIONS})"
    ),
    params![id, now],
  )?;
  cascade_soft_delete(tx, CREATED_NODES, &id, now)?;

  // Draft versions keep no deleted_at: they stay readable in this scope.
  close_links(tx, &id, LinkOutcome::Rejected)?;
  finalize(tx, &id, ChangesetStatus::Rejected, now)?;
  Ok(affected)
}

// ─── Fragments ───────────────────────────────────────────────────────────────

pub fn open_changeset(now: DateTime<Utc>) -> Statement<Changeset> {
  Statement::step(move |tx| {
    let changeset = Changeset {
      changeset_id: Uuid::new_v4(),
      status:       ChangesetStatus::Open,
      created_at:   now,
      finalized_at: None,
    };
    tx.execute(
      "INSERT INTO changesets (changeset_id, status, created_at)
       VALUES (?1, ?2, ?3)",
      params![
        encode_uuid(changeset.changeset_id),
        changeset.status.as_ref(),
        encode_dt(now)
      ],
    )?;
    Ok(changeset)
  })
}

pub fn get_changeset(id: Uuid) -> Statement<Option<Changeset>> {
  Statement::step(move |tx| find_changeset(tx, id))
}

/// Make every draft of the changeset canonical. Returns the number of nodes
/// affected; `0` when the changeset was already approved.
pub fn commit_changeset(id: Uuid, now: DateTime<Utc>) -> Statement<usize> {
  Statement::step(move |tx| {
    commit(tx, id, &encode_dt(now))
      .map_err(|e| e.in_changeset(id, ChangesetAction::Commit))
  })
}

/// Discard every draft of the changeset. Returns the number of nodes
/// affected; `0` when the changeset was already rejected.
pub fn reject_changeset(id: Uuid, now: DateTime<Utc>) -> Statement<usize> {
  Statement::step(move |tx| {
    reject(tx, id, &encode_dt(now))
      .map_err(|e| e.in_changeset(id, ChangesetAction::Reject))
  })
}
