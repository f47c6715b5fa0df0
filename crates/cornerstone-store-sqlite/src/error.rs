//! Error type for `cornerstone-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] cornerstone_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum discriminant this build does not know.
  #[error("cannot decode column: {0}")]
  Decode(String),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),
}

impl Error {
  /// Whether the failure is a caller-facing condition rather than a broken
  /// invariant or an I/O problem.
  pub fn is_recoverable(&self) -> bool {
    matches!(self, Self::Core(e) if e.is_recoverable())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
