//! Field edits. An edit never touches the old snapshot; it produces a child
//! that records which fields changed by pointing their provenance at itself.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::Engine;
use crate::{
  Result,
  edit::SnapshotEdit,
  ledger::Ledger,
  snapshot::{ExtraField, Field, Origin, Snapshot},
};

impl<L: Ledger + ?Sized> Engine<'_, L> {
  pub fn update_snapshot(
    &mut self,
    old_id: Uuid,
    edit: &SnapshotEdit,
    actor: Option<&str>,
  ) -> Result<Snapshot> {
    let old = self.ledger.require(old_id)?;
    let edit = edit.classify(self.settings.identifier_max_len)?;
    let snapshot_id = Uuid::new_v4();

    let mut attributes = old.attributes.clone();

    for (attr, source) in &edit.sources {
      self.ledger.require(*source)?;
      attributes
        .entry(*attr)
        .and_modify(|f| f.source = *source)
        .or_insert(Field { value: None, source: *source });
    }

    for (attr, value) in edit.mappable {
      match value {
        Some(v) if old.value(attr) != Some(&v) => {
          attributes.insert(attr, Field::new(v, snapshot_id));
        }
        Some(_) => {}
        None => {
          if let Some(field) = attributes.get_mut(&attr) {
            field.value = None;
          }
        }
      }
    }

    let mut extra_data = old.extra_data.clone();
    for (key, value) in edit.extra {
      if old.extra_data.get(&key).map(|f| &f.value) != Some(&value) {
        extra_data.insert(key, ExtraField { value, source: snapshot_id });
      }
    }

    let updated = Snapshot {
      snapshot_id,
      created_at: Utc::now(),
      source_kind: old.source_kind.edited(),
      origin: Origin::Edited { parent: old.snapshot_id },
      tenant_id: old.tenant_id,
      import_batch_id: old.import_batch_id,
      match_type: edit.match_type.unwrap_or(old.match_type),
      confidence: edit.confidence.unwrap_or(old.confidence),
      last_modified_by: actor.map(str::to_owned).or_else(|| old.last_modified_by.clone()),
      attributes,
      extra_data,
      meters: old.meters.clone(),
    };
    self.persist(&updated)?;

    if let Some(mut lineage) = self.ledger.owning_lineage(old.snapshot_id)? {
      if lineage.canonical_snapshot_id == Some(old.snapshot_id) {
        self.point_lineage(&mut lineage, snapshot_id)?;
      } else {
        self.ledger.assign_lineage(snapshot_id, lineage.lineage_id)?;
      }
    }

    info!(snapshot = %snapshot_id, parent = %old.snapshot_id, "updated snapshot");
    Ok(updated)
  }
}
