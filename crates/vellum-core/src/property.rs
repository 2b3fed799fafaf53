//! Property versions: the unit of history in the graph.
//!
//! A property version is an immutable value record reached from its base node
//! through a property edge. Updates normally create a new version and retire
//! the old one; the only mutation ever applied to a stored version is the
//! in-place replace performed inside the permanence window.

use std::{
  cmp::Ordering,
  fmt,
  hash::{Hash, Hasher},
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// A property value: a JSON scalar or a small structured value.
pub type Value = serde_json::Value;

// ─── Keys ────────────────────────────────────────────────────────────────────

/// The logical field name of a property.
///
/// Keys known at compile time are `Static`; keys only known at runtime (e.g.
/// spreadsheet column names) are `Dynamic` and are validated before use. Both
/// compare by their string form, so `Static("name") == Dynamic("name")`.
#[derive(Debug, Clone)]
pub enum PropertyKey {
  Static(&'static str),
  Dynamic(String),
}

impl PropertyKey {
  /// Build a runtime key, validating it up front.
  pub fn dynamic(name: impl Into<String>) -> Result<Self> {
    let key = Self::Dynamic(name.into());
    key.validate()?;
    Ok(key)
  }

  pub fn as_str(&self) -> &str {
    match self {
      Self::Static(name) => name,
      Self::Dynamic(name) => name,
    }
  }

  pub fn is_dynamic(&self) -> bool { matches!(self, Self::Dynamic(_)) }

  /// Keys are identifiers: ASCII alphanumerics and `_`, not starting with a
  /// digit.
  pub fn validate(&self) -> Result<()> {
    let name = self.as_str();
    let invalid = |reason| Error::InvalidKey { key: name.to_owned(), reason };

    let mut chars = name.chars();
    match chars.next() {
      None => return Err(invalid("key is empty")),
      Some(c) if c.is_ascii_digit() => {
        return Err(invalid("key starts with a digit"));
      }
      Some(_) => {}
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
      return Err(invalid("key contains characters other than [A-Za-z0-9_]"));
    }
    Ok(())
  }
}

impl fmt::Display for PropertyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<&'static str> for PropertyKey {
  fn from(name: &'static str) -> Self { Self::Static(name) }
}

impl From<String> for PropertyKey {
  fn from(name: String) -> Self { Self::Dynamic(name) }
}

impl PartialEq for PropertyKey {
  fn eq(&self, other: &Self) -> bool { self.as_str() == other.as_str() }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
  fn hash<H: Hasher>(&self, state: &mut H) { self.as_str().hash(state) }
}

impl PartialOrd for PropertyKey {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for PropertyKey {
  fn cmp(&self, other: &Self) -> Ordering { self.as_str().cmp(other.as_str()) }
}

// ─── Property ────────────────────────────────────────────────────────────────

/// One version of a logical field, together with the state of the edge that
/// attaches it to its node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
  pub property_id:  Uuid,
  pub node_id:      Uuid,
  pub key:          String,
  pub value:        Value,
  /// Extra type tags, e.g. `"ProjectName"`; unique labels constrain values.
  pub labels:       Vec<String>,
  pub created_at:   DateTime<Utc>,
  /// Only set when the version was replaced in place.
  pub modified_at:  Option<DateTime<Utc>>,
  /// Set when the version was retired; retired versions stay queryable.
  pub deleted_at:   Option<DateTime<Utc>>,
  /// Whether the property edge is the canonical current version.
  pub active:       bool,
  /// The changeset this version was drafted under, if any.
  pub changeset_id: Option<Uuid>,
}

impl Property {
  /// When the value was last written, by creation or by in-place replace.
  pub fn last_written_at(&self) -> DateTime<Utc> {
    self.modified_at.unwrap_or(self.created_at)
  }

  /// Whether this version has outlived the permanence window and must be kept
  /// as a history entry rather than overwritten. A version written after `now`
  /// belongs to another writer and is always permanent.
  pub fn is_permanent(&self, now: DateTime<Utc>, window: Duration) -> bool {
    let elapsed = now - self.last_written_at();
    elapsed < Duration::zero() || elapsed >= window
  }

  pub fn is_historical(&self) -> bool { self.deleted_at.is_some() }

  pub fn is_draft(&self) -> bool { self.changeset_id.is_some() && !self.active }
}

/// Permanence of whatever is currently visible; no version at all counts as
/// permanent, so the first write always creates a new entry.
pub fn is_permanent(
  existing: Option<&Property>,
  now: DateTime<Utc>,
  window: Duration,
) -> bool {
  existing.is_none_or(|p| p.is_permanent(now, window))
}

// ─── NewProperty ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::GraphStore::create_property`].
/// Timestamps are always set by the store.
#[derive(Debug, Clone)]
pub struct NewProperty {
  pub node_id:      Uuid,
  pub key:          PropertyKey,
  pub value:        Value,
  pub labels:       Vec<String>,
  pub changeset_id: Option<Uuid>,
}

impl NewProperty {
  /// Convenience constructor with no labels, outside any changeset.
  pub fn new(node_id: Uuid, key: impl Into<PropertyKey>, value: Value) -> Self {
    Self {
      node_id,
      key: key.into(),
      value,
      labels: Vec::new(),
      changeset_id: None,
    }
  }

  pub fn with_labels<I, S>(mut self, labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.labels = labels.into_iter().map(Into::into).collect();
    self
  }

  pub fn in_changeset(mut self, changeset_id: Uuid) -> Self {
    self.changeset_id = Some(changeset_id);
    self
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn static_and_dynamic_keys_compare_by_name() {
    assert_eq!(PropertyKey::Static("name"), PropertyKey::dynamic("name").unwrap());
  }

  #[test]
  fn dynamic_key_validation() {
    assert!(PropertyKey::dynamic("budget_total").is_ok());
    assert!(PropertyKey::dynamic("_hidden2").is_ok());
    assert!(PropertyKey::dynamic("").is_err());
    assert!(PropertyKey::dynamic("2nd").is_err());
    assert!(matches!(
      PropertyKey::dynamic("drop table"),
      Err(Error::InvalidKey { .. })
    ));
  }

  fn property(created_at: DateTime<Utc>) -> Property {
    Property {
      property_id: Uuid::new_v4(),
      node_id: Uuid::new_v4(),
      key: "name".into(),
      value: json!("A"),
      labels: vec![],
      created_at,
      modified_at: None,
      deleted_at: None,
      active: true,
      changeset_id: None,
    }
  }

  #[test]
  fn permanence_boundary_is_inclusive() {
    let t0 = Utc::now();
    let window = Duration::minutes(30);
    let p = property(t0);

    assert!(!p.is_permanent(t0 + Duration::minutes(29), window));
    assert!(p.is_permanent(t0 + window, window));
    assert!(is_permanent(None, t0, window));
  }

  #[test]
  fn versions_from_the_future_are_permanent() {
    let t0 = Utc::now();
    let p = property(t0);

    assert!(p.is_permanent(t0 - Duration::seconds(1), Duration::minutes(30)));
    assert!(p.is_permanent(t0 - Duration::microseconds(1), Duration::zero()));
  }

  #[test]
  fn modified_at_restarts_the_window() {
    let t0 = Utc::now();
    let window = Duration::minutes(30);
    let mut p = property(t0);
    p.modified_at = Some(t0 + Duration::minutes(20));

    assert!(!p.is_permanent(t0 + Duration::minutes(40), window));
    assert!(p.is_permanent(t0 + Duration::minutes(50), window));
  }
}
