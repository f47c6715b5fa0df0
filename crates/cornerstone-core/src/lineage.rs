//! The canonical registry: one [`Lineage`] per building.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{attribute::Attribute, snapshot::Snapshot};

/// A building lineage and the snapshot currently representing it.
///
/// Lineages are never deleted. A lineage absorbed by a merge is deactivated;
/// an unmerge may reactivate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
  pub lineage_id:            Uuid,
  pub created_at:            DateTime<Utc>,
  /// `None` only transiently, e.g. after its snapshot was removed by an
  /// unmerge and before it is repointed.
  pub canonical_snapshot_id: Option<Uuid>,
  pub active:                bool,
}

impl Lineage {
  pub fn new(canonical_snapshot_id: Uuid) -> Self {
    Self {
      lineage_id:            Uuid::new_v4(),
      created_at:            Utc::now(),
      canonical_snapshot_id: Some(canonical_snapshot_id),
      active:                true,
    }
  }
}

/// The identifying fields external matching compares candidates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFields {
  pub snapshot_id:    Uuid,
  pub tax_lot_id:     Option<String>,
  pub pm_property_id: Option<String>,
  pub custom_id_1:    Option<String>,
  pub address_line_1: Option<String>,
}

impl From<&Snapshot> for CandidateFields {
  fn from(s: &Snapshot) -> Self {
    let text = |a| s.text(a).map(str::to_owned);
    Self {
      snapshot_id:    s.snapshot_id,
      tax_lot_id:     text(Attribute::TaxLotId),
      pm_property_id: text(Attribute::PmPropertyId),
      custom_id_1:    text(Attribute::CustomId1),
      address_line_1: text(Attribute::AddressLine1),
    }
  }
}
