//! Column-mapping cache entries.
//!
//! A flat memo of which target field a tenant mapped a raw column to, per
//! source kind. No lineage semantics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, snapshot::SourceKind};

pub const COLUMN_RAW_MAX_LEN: usize = 512;
pub const COLUMN_MAPPED_MAX_LEN: usize = 128;

/// `(tenant, raw column, source kind) -> mapped field`; unique per triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
  pub tenant_id:     Uuid,
  pub column_raw:    String,
  pub source_kind:   SourceKind,
  pub column_mapped: String,
}

impl ColumnMapping {
  pub fn new(
    tenant_id: Uuid,
    column_raw: impl Into<String>,
    source_kind: SourceKind,
    column_mapped: impl Into<String>,
  ) -> Self {
    Self {
      tenant_id,
      column_raw: column_raw.into(),
      source_kind,
      column_mapped: column_mapped.into(),
    }
  }

  /// Enforce the storage limits on both column names.
  pub fn validate(&self) -> Result<()> {
    if self.column_raw.is_empty() {
      return Err(Error::Validation("raw column name is empty".into()));
    }
    if self.column_raw.chars().count() > COLUMN_RAW_MAX_LEN {
      return Err(Error::Validation(format!(
        "raw column name exceeds {COLUMN_RAW_MAX_LEN} characters"
      )));
    }
    if self.column_mapped.chars().count() > COLUMN_MAPPED_MAX_LEN {
      return Err(Error::Validation(format!(
        "mapped column name exceeds {COLUMN_MAPPED_MAX_LEN} characters"
      )));
    }
    Ok(())
  }
}
