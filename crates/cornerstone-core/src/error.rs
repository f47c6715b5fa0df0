//! Error types for `cornerstone-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("snapshot not found: {0}")]
  SnapshotNotFound(Uuid),

  #[error("lineage not found: {0}")]
  LineageNotFound(Uuid),

  /// Linking `parent -> child` would close a cycle in the snapshot DAG.
  #[error("edge {parent} -> {child} would create a cycle")]
  Cycle { parent: Uuid, child: Uuid },

  /// A field's source is not the snapshot itself or one of its ancestors.
  #[error("snapshot {snapshot}: field {field:?} sourced from unrelated snapshot {source_id}")]
  InvalidProvenance {
    snapshot:  Uuid,
    field:     String,
    source_id: Uuid,
  },

  #[error("tree inconsistency: {0}")]
  TreeInconsistency(String),

  #[error("validation error: {0}")]
  Validation(String),

  #[error("field {field:?}: cannot parse {value:?} as a date")]
  InvalidDate { field: String, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Failure inside a [`Ledger`](crate::ledger::Ledger) implementation.
  #[error("ledger backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend failure.
  pub fn backend(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Backend(Box::new(e))
  }

  /// `true` for caller-facing conditions (missing records, bad input). The
  /// rest signal a broken invariant and are fatal for the operation.
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      Self::SnapshotNotFound(_)
        | Self::LineageNotFound(_)
        | Self::Validation(_)
        | Self::InvalidDate { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
