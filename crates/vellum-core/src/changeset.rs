//! Changesets: scoped sets of draft edits pending approval or rejection.
//!
//! Draft property versions, proposed relations and node creations/deletions
//! are linked to their changeset. While a link is active it is part of the
//! changeset's current draft; once the changeset is finalized the link keeps
//! its outcome as an audit record.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// `Open → {Approved, Rejected}`; both outcomes are terminal.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangesetStatus {
  Open,
  Approved,
  Rejected,
}

impl ChangesetStatus {
  pub fn is_open(self) -> bool { self == Self::Open }

  /// Parse the lowercase form stored in the database.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownStatus(s.to_owned()))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
  pub changeset_id: Uuid,
  pub status:       ChangesetStatus,
  pub created_at:   DateTime<Utc>,
  /// When the changeset reached a terminal status.
  pub finalized_at: Option<DateTime<Utc>>,
}

/// The lifecycle transitions, used to label failures.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ChangesetAction {
  Commit,
  Reject,
}

impl ChangesetAction {
  /// The status a successful transition leaves the changeset in.
  pub fn target_status(self) -> ChangesetStatus {
    match self {
      Self::Commit => ChangesetStatus::Approved,
      Self::Reject => ChangesetStatus::Rejected,
    }
  }
}

/// The recorded fate of a changeset link once the changeset is finalized.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkOutcome {
  Committed,
  Rejected,
}

/// What a changeset proposes to do with a node.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum NodeChange {
  Create,
  Delete,
}

/// What a changeset proposes to do with a relation.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum RelationChange {
  Add,
  Remove,
}
