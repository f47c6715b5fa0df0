//! Merging two snapshots into a new composite.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use strum::IntoEnumIterator;
use tracing::{debug, info};
use uuid::Uuid;

use super::Engine;
use crate::{
  Error, Result,
  attribute::Attribute,
  edit::check_confidence,
  ledger::Ledger,
  lineage::Lineage,
  policy::Pick,
  snapshot::{MergeOptions, Origin, Snapshot, SourceKind},
};

impl<L: Ledger + ?Sized> Engine<'_, L> {
  /// Merge `a` (left) and `b` (right) into a new snapshot and move the
  /// lineage pointer onto it. Merging a snapshot with itself is a no-op and
  /// returns `None`.
  pub fn merge_snapshots(
    &mut self,
    a: Uuid,
    b: Uuid,
    opts: &MergeOptions,
  ) -> Result<Option<Snapshot>> {
    if a == b {
      debug!(snapshot = %a, "ignoring self-merge");
      return Ok(None);
    }
    if let Some(confidence) = opts.confidence {
      check_confidence(confidence)?;
    }

    let left = self.ledger.require(a)?;
    let right = self.ledger.require(b)?;
    self.merge_into(&left, &right, opts, None).map(Some)
  }

  /// Build and persist the merge of `left` and `right`.
  ///
  /// The surviving lineage is the first active one of `target`, the left
  /// parent's and the right parent's. When none of them is active the first
  /// that exists is reactivated, and when the parents have no lineage at all
  /// a new one is opened. Any other lineage the parents belonged to is
  /// deactivated.
  pub(super) fn merge_into(
    &mut self,
    left: &Snapshot,
    right: &Snapshot,
    opts: &MergeOptions,
    target: Option<Uuid>,
  ) -> Result<Snapshot> {
    let snapshot_id = Uuid::new_v4();

    let mut attributes = BTreeMap::new();
    for attr in Attribute::iter() {
      let (l, r) = (left.attributes.get(&attr), right.attributes.get(&attr));
      let pick = self.policy.pick_attribute(attr, l, r);
      if let Some(field) = take_side(pick, l, r, left, right, snapshot_id, || attr.to_string())? {
        attributes.insert(attr, field.clone());
      }
    }

    let keys: BTreeSet<&String> = left.extra_data.keys().chain(right.extra_data.keys()).collect();
    let mut extra_data = BTreeMap::new();
    for key in keys {
      let (l, r) = (left.extra_data.get(key), right.extra_data.get(key));
      let pick = self.policy.pick_extra(key, l, r);
      if let Some(field) = take_side(pick, l, r, left, right, snapshot_id, || format!("extra_data.{key}"))? {
        extra_data.insert(key.clone(), field.clone());
      }
    }

    let merged = Snapshot {
      snapshot_id,
      created_at: Utc::now(),
      source_kind: SourceKind::CompositeMerged,
      origin: Origin::Merged { left: left.snapshot_id, right: right.snapshot_id },
      tenant_id: right.tenant_id.or(left.tenant_id),
      import_batch_id: None,
      match_type: opts.match_type,
      confidence: opts.confidence,
      last_modified_by: opts.actor.clone(),
      attributes,
      extra_data,
      meters: left.meters.union(&right.meters).copied().collect(),
    };
    self.persist(&merged)?;

    let left_lineage = self.ledger.lineage_of(left.snapshot_id)?;
    let right_lineage = self.ledger.lineage_of(right.snapshot_id)?;

    let canon = self.surviving_lineage([target, left_lineage, right_lineage], snapshot_id)?;

    for absorbed in [left_lineage, right_lineage].into_iter().flatten() {
      if absorbed != canon.lineage_id {
        self.deactivate(absorbed)?;
      }
    }

    info!(
      snapshot = %snapshot_id,
      left = %left.snapshot_id,
      right = %right.snapshot_id,
      lineage = %canon.lineage_id,
      "merged snapshots"
    );
    Ok(merged)
  }

  fn surviving_lineage(
    &mut self,
    candidates: [Option<Uuid>; 3],
    snapshot_id: Uuid,
  ) -> Result<Lineage> {
    let mut fallback = None;
    for id in candidates.into_iter().flatten() {
      let mut lineage = self.ledger.require_lineage(id)?;
      if lineage.active {
        self.point_lineage(&mut lineage, snapshot_id)?;
        return Ok(lineage);
      }
      fallback.get_or_insert(lineage);
    }

    let Some(mut lineage) = fallback else {
      return self.open_lineage(snapshot_id);
    };
    lineage.active = true;
    self.point_lineage(&mut lineage, snapshot_id)?;
    info!(lineage = %lineage.lineage_id, snapshot = %snapshot_id, "lineage reactivated");
    Ok(lineage)
  }
}

/// Resolve a [`Pick`] to the chosen side's entry. Picking a side that has no
/// entry means the merged field would have no valid source.
fn take_side<'f, T>(
  pick: Pick,
  l: Option<&'f T>,
  r: Option<&'f T>,
  left: &Snapshot,
  right: &Snapshot,
  snapshot: Uuid,
  field: impl FnOnce() -> String,
) -> Result<Option<&'f T>> {
  let (entry, side) = match pick {
    Pick::Neither => return Ok(None),
    Pick::Left => (l, left.snapshot_id),
    Pick::Right => (r, right.snapshot_id),
  };
  entry
    .map(Some)
    .ok_or_else(|| Error::InvalidProvenance { snapshot, field: field(), source_id: side })
}
