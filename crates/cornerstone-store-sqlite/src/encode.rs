//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and UUIDs as hyphenated
//! lowercase strings. A snapshot's attribute and extension maps, and its
//! origin, are stored as compact JSON.

use std::{
  collections::{BTreeMap, BTreeSet},
  str::FromStr,
};

use chrono::{DateTime, Utc};
use cornerstone_core::{
  attribute::Attribute,
  lineage::Lineage,
  snapshot::{ExtraField, Field, MatchType, Origin, Snapshot, SourceKind},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> { s.map(decode_uuid).transpose() }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Kinds ───────────────────────────────────────────────────────────────────

pub fn decode_source_kind(s: &str) -> Result<SourceKind> {
  SourceKind::from_str(s).map_err(|_| Error::Decode(format!("unknown source kind: {s:?}")))
}

pub fn decode_match_type(s: &str) -> Result<MatchType> {
  MatchType::from_str(s).map_err(|_| Error::Decode(format!("unknown match type: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawSnapshot::from_row`].
pub const SNAPSHOT_COLUMNS: &str = "s.snapshot_id, s.created_at, s.source_kind, s.origin, \
                                    s.tenant_id, s.import_batch_id, s.match_type, s.confidence, \
                                    s.last_modified_by, s.attributes, s.extra_data";

/// Raw values read directly from a `snapshots` row.
pub struct RawSnapshot {
  pub snapshot_id:      String,
  pub created_at:       String,
  pub source_kind:      String,
  pub origin:           String,
  pub tenant_id:        Option<String>,
  pub import_batch_id:  Option<String>,
  pub match_type:       Option<String>,
  pub confidence:       Option<f64>,
  pub last_modified_by: Option<String>,
  pub attributes:       String,
  pub extra_data:       String,
}

impl RawSnapshot {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id:      row.get(0)?,
      created_at:       row.get(1)?,
      source_kind:      row.get(2)?,
      origin:           row.get(3)?,
      tenant_id:        row.get(4)?,
      import_batch_id:  row.get(5)?,
      match_type:       row.get(6)?,
      confidence:       row.get(7)?,
      last_modified_by: row.get(8)?,
      attributes:       row.get(9)?,
      extra_data:       row.get(10)?,
    })
  }

  pub fn into_snapshot(self, meters: BTreeSet<Uuid>) -> Result<Snapshot> {
    let attributes: BTreeMap<Attribute, Field> = serde_json::from_str(&self.attributes)?;
    let extra_data: BTreeMap<String, ExtraField> = serde_json::from_str(&self.extra_data)?;
    let origin: Origin = serde_json::from_str(&self.origin)?;

    Ok(Snapshot {
      snapshot_id: decode_uuid(&self.snapshot_id)?,
      created_at: decode_dt(&self.created_at)?,
      source_kind: decode_source_kind(&self.source_kind)?,
      origin,
      tenant_id: decode_opt_uuid(self.tenant_id.as_deref())?,
      import_batch_id: decode_opt_uuid(self.import_batch_id.as_deref())?,
      match_type: self.match_type.as_deref().map(decode_match_type).transpose()?,
      confidence: self.confidence,
      last_modified_by: self.last_modified_by,
      attributes,
      extra_data,
      meters,
    })
  }
}

/// Column list matching [`RawLineage::from_row`].
pub const LINEAGE_COLUMNS: &str = "lineage_id, created_at, canonical_snapshot_id, active";

pub struct RawLineage {
  pub lineage_id:            String,
  pub created_at:            String,
  pub canonical_snapshot_id: Option<String>,
  pub active:                bool,
}

impl RawLineage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      lineage_id:            row.get(0)?,
      created_at:            row.get(1)?,
      canonical_snapshot_id: row.get(2)?,
      active:                row.get(3)?,
    })
  }

  pub fn into_lineage(self) -> Result<Lineage> {
    Ok(Lineage {
      lineage_id:            decode_uuid(&self.lineage_id)?,
      created_at:            decode_dt(&self.created_at)?,
      canonical_snapshot_id: decode_opt_uuid(self.canonical_snapshot_id.as_deref())?,
      active:                self.active,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_kinds_are_decode_errors() {
    assert_eq!(decode_source_kind("raw_assessed").unwrap(), SourceKind::RawAssessed);
    assert!(matches!(decode_source_kind("bogus"), Err(Error::Decode(_))));
    assert!(matches!(decode_match_type("maybe"), Err(Error::Decode(_))));
  }

  #[test]
  fn timestamps_round_trip() {
    let now = Utc::now();
    assert_eq!(decode_dt(&encode_dt(now)).unwrap(), now);
    assert!(decode_dt("yesterday").is_err());
  }
}
