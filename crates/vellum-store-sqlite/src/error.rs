//! Error type for `vellum-store-sqlite`, and the conflict classifier that
//! decides which failures the retry loop may repeat.

use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;
use vellum_core::{
  Classify, ErrorKind,
  changeset::{ChangesetAction, ChangesetStatus},
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] vellum_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decode error: {0}")]
  Decode(String),

  #[error("node not found: {0}")]
  NodeNotFound(Uuid),

  #[error("changeset not found: {0}")]
  ChangesetNotFound(Uuid),

  #[error("relation not found: {0}")]
  RelationNotFound(Uuid),

  /// More than one current version exists (or would exist) for a key.
  #[error("{active} active versions of {key:?} on node {node_id}")]
  InvariantViolation { node_id: Uuid, key: String, active: usize },

  /// A create over a different current value; changing it is an update.
  #[error("{key:?} already has a different value on node {node_id}")]
  PropertyExists { node_id: Uuid, key: String },

  #[error("duplicate value {value} for unique label {label:?}")]
  Duplicate { label: String, value: String },

  #[error("changeset {id} is {status}")]
  ChangesetClosed { id: Uuid, status: ChangesetStatus },

  #[error("failed to {action} changeset {id}: {source}")]
  Changeset {
    id:     Uuid,
    action: ChangesetAction,
    #[source]
    source: Box<Error>,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// Wrap a lifecycle failure with the changeset it happened on. Already
  /// wrapped errors are left alone.
  pub(crate) fn in_changeset(self, id: Uuid, action: ChangesetAction) -> Self {
    match self {
      wrapped @ Self::Changeset { .. } => wrapped,
      source => Self::Changeset { id, action, source: Box::new(source) },
    }
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) | Self::Sqlite(e) => {
        classify_sqlite(e)
      }
      Self::Database(_) | Self::Json(_) | Self::Uuid(_) | Self::Decode(_) => {
        ErrorKind::Internal
      }
      Self::NodeNotFound(_)
      | Self::ChangesetNotFound(_)
      | Self::RelationNotFound(_) => ErrorKind::NotFound,
      Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
      Self::PropertyExists { .. }
      | Self::Duplicate { .. }
      | Self::ChangesetClosed { .. } => {
        ErrorKind::ConstraintViolation
      }
      Self::Changeset { source, .. } => source.kind(),
    }
  }
}

// ─── Conflict classifier ─────────────────────────────────────────────────────

/// Column lists SQLite reports when one of the single-active partial indexes
/// rejects a write. Hitting them means another writer got there first.
const ONE_ACTIVE_INDEXES: &[&str] = &[
  "property_edges.node_id, property_edges.key",
  "changeset_properties.changeset_id, changeset_properties.node_id, \
   changeset_properties.key",
];

fn classify_sqlite(err: &rusqlite::Error) -> ErrorKind {
  let rusqlite::Error::SqliteFailure(code, message) = err else {
    return ErrorKind::Internal;
  };
  match code.code {
    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
      ErrorKind::ConflictRetryable
    }
    ErrorCode::ConstraintViolation => {
      let raced = message.as_deref().is_some_and(|m| {
        ONE_ACTIVE_INDEXES.iter().any(|columns| m.contains(columns))
      });
      if raced {
        ErrorKind::ConflictRetryable
      } else {
        ErrorKind::ConstraintViolation
      }
    }
    _ => ErrorKind::Internal,
  }
}
