//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that text ordering matches time ordering. Values and label lists are
//! stored as compact JSON. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::Row;
use uuid::Uuid;
use vellum_core::{
  changeset::{Changeset, ChangesetStatus},
  node::{BaseNode, Relation},
  property::{Property, Value},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Drop sub-microsecond precision so values survive a round trip unchanged.
pub fn truncate_dt(dt: DateTime<Utc>) -> DateTime<Utc> { dt.trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Values & labels ─────────────────────────────────────────────────────────

pub fn encode_value(value: &Value) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn encode_labels(labels: &[String]) -> Result<String> {
  Ok(serde_json::to_string(labels)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawNode::from_row`]; expects the table aliased `n`.
pub const NODE_COLUMNS: &str = "n.node_id, n.label, n.created_at, n.deleted_at";

/// Raw strings read directly from a `nodes` row.
pub struct RawNode {
  pub node_id:    String,
  pub label:      String,
  pub created_at: String,
  pub deleted_at: Option<String>,
}

impl RawNode {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      node_id:    row.get(0)?,
      label:      row.get(1)?,
      created_at: row.get(2)?,
      deleted_at: row.get(3)?,
    })
  }

  pub fn into_node(self) -> Result<BaseNode> {
    Ok(BaseNode {
      node_id:    decode_uuid(&self.node_id)?,
      label:      self.label,
      created_at: decode_dt(&self.created_at)?,
      deleted_at: decode_opt_dt(self.deleted_at)?,
    })
  }
}

/// Column list matching [`RawProperty::from_row`]. Expects `properties`
/// aliased `p` and `property_edges` aliased `e`; the caller supplies the draft
/// changeset column (or `NULL`) as the tenth column.
pub const PROPERTY_COLUMNS: &str = "p.property_id, e.node_id, p.key, \
   p.value_json, p.labels, p.created_at, p.modified_at, p.deleted_at, e.active";

/// Raw strings read from a `properties` row joined with its edge.
pub struct RawProperty {
  pub property_id:  String,
  pub node_id:      String,
  pub key:          String,
  pub value_json:   String,
  pub labels:       String,
  pub created_at:   String,
  pub modified_at:  Option<String>,
  pub deleted_at:   Option<String>,
  pub active:       bool,
  pub changeset_id: Option<String>,
}

impl RawProperty {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      property_id:  row.get(0)?,
      node_id:      row.get(1)?,
      key:          row.get(2)?,
      value_json:   row.get(3)?,
      labels:       row.get(4)?,
      created_at:   row.get(5)?,
      modified_at:  row.get(6)?,
      deleted_at:   row.get(7)?,
      active:       row.get(8)?,
      changeset_id: row.get(9)?,
    })
  }

  pub fn into_property(self) -> Result<Property> {
    Ok(Property {
      property_id:  decode_uuid(&self.property_id)?,
      node_id:      decode_uuid(&self.node_id)?,
      key:          self.key,
      value:        serde_json::from_str(&self.value_json)?,
      labels:       serde_json::from_str(&self.labels)?,
      created_at:   decode_dt(&self.created_at)?,
      modified_at:  decode_opt_dt(self.modified_at)?,
      deleted_at:   decode_opt_dt(self.deleted_at)?,
      active:       self.active,
      changeset_id: self.changeset_id.as_deref().map(decode_uuid).transpose()?,
    })
  }
}

/// Column list matching [`RawRelation::from_row`]; expects the table aliased
/// `r`.
pub const RELATION_COLUMNS: &str =
  "r.relation_id, r.kind, r.from_id, r.to_id, r.active, r.created_at, r.deleted_at";

pub struct RawRelation {
  pub relation_id: String,
  pub kind:        String,
  pub from_id:     String,
  pub to_id:       String,
  pub active:      bool,
  pub created_at:  String,
  pub deleted_at:  Option<String>,
}

impl RawRelation {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      relation_id: row.get(0)?,
      kind:        row.get(1)?,
      from_id:     row.get(2)?,
      to_id:       row.get(3)?,
      active:      row.get(4)?,
      created_at:  row.get(5)?,
      deleted_at:  row.get(6)?,
    })
  }

  pub fn into_relation(self) -> Result<Relation> {
    Ok(Relation {
      relation_id: decode_uuid(&self.relation_id)?,
      kind:        self.kind,
      from_id:     decode_uuid(&self.from_id)?,
      to_id:       decode_uuid(&self.to_id)?,
      active:      self.active,
      created_at:  decode_dt(&self.created_at)?,
      deleted_at:  decode_opt_dt(self.deleted_at)?,
    })
  }
}

/// Raw strings read directly from a `changesets` row.
pub struct RawChangeset {
  pub changeset_id: String,
  pub status:       String,
  pub created_at:   String,
  pub finalized_at: Option<String>,
}

impl RawChangeset {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      changeset_id: row.get(0)?,
      status:       row.get(1)?,
      created_at:   row.get(2)?,
      finalized_at: row.get(3)?,
    })
  }

  pub fn into_changeset(self) -> Result<Changeset> {
    Ok(Changeset {
      changeset_id: decode_uuid(&self.changeset_id)?,
      status:       ChangesetStatus::parse(&self.status)?,
      created_at:   decode_dt(&self.created_at)?,
      finalized_at: decode_opt_dt(self.finalized_at)?,
    })
  }
}
