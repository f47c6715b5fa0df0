//! Root snapshots and lineage initialisation.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::Engine;
use crate::{
  Error, Result,
  ledger::Ledger,
  lineage::Lineage,
  snapshot::{ExtraField, Field, NewSnapshot, Origin, Snapshot, SourceKind},
};

impl<L: Ledger + ?Sized> Engine<'_, L> {
  /// Create a root snapshot with self-provenance on every field and give it
  /// a lineage: the one named by `input.lineage_id` if present, otherwise a
  /// new one.
  pub fn create_root(&mut self, input: NewSnapshot) -> Result<(Snapshot, Lineage)> {
    let lineage_id = input.lineage_id;
    let snapshot = self.build_root(input)?;
    self.persist(&snapshot)?;

    let lineage = match lineage_id {
      Some(id) => {
        let mut lineage = self.ledger.require_lineage(id)?;
        lineage.active = true;
        self.point_lineage(&mut lineage, snapshot.snapshot_id)?;
        lineage
      }
      None => self.open_lineage(snapshot.snapshot_id)?,
    };

    info!(
      snapshot = %snapshot.snapshot_id,
      lineage = %lineage.lineage_id,
      kind = snapshot.source_kind.as_str(),
      "created root snapshot"
    );
    Ok((snapshot, lineage))
  }

  /// Persist an ingested root without a lineage. It stays an unmatched
  /// candidate until it is merged or [`Self::initialize_lineage`] is called.
  pub fn stage_root(&mut self, input: NewSnapshot) -> Result<Snapshot> {
    if input.lineage_id.is_some() {
      return Err(Error::Validation("a staged root cannot name a lineage".into()));
    }
    let snapshot = self.build_root(input)?;
    self.persist(&snapshot)?;
    info!(snapshot = %snapshot.snapshot_id, "staged root snapshot");
    Ok(snapshot)
  }

  /// Make `snapshot_id` the canonical snapshot of its own lineage, creating
  /// the lineage if it has none. Idempotent.
  pub fn initialize_lineage(&mut self, snapshot_id: Uuid) -> Result<Lineage> {
    self.ledger.require(snapshot_id)?;
    match self.ledger.owning_lineage(snapshot_id)? {
      Some(lineage) if lineage.active && lineage.canonical_snapshot_id == Some(snapshot_id) => {
        Ok(lineage)
      }
      Some(mut lineage) => {
        lineage.active = true;
        self.point_lineage(&mut lineage, snapshot_id)?;
        info!(lineage = %lineage.lineage_id, snapshot = %snapshot_id, "lineage initialised");
        Ok(lineage)
      }
      None => self.open_lineage(snapshot_id),
    }
  }

  fn build_root(&self, input: NewSnapshot) -> Result<Snapshot> {
    if input.source_kind == SourceKind::CompositeMerged {
      return Err(Error::Validation("merged snapshots only arise from merges".into()));
    }

    let snapshot_id = Uuid::new_v4();
    let max_len = self.settings.identifier_max_len;

    let attributes = input
      .attributes
      .into_iter()
      .map(|(attr, value)| Ok((attr, Field::new(value.normalize(attr, max_len)?, snapshot_id))))
      .collect::<Result<BTreeMap<_, _>>>()?;

    let extra_data = input
      .extra_data
      .into_iter()
      .map(|(key, value)| (key, ExtraField { value, source: snapshot_id }))
      .collect();

    Ok(Snapshot {
      snapshot_id,
      created_at: Utc::now(),
      source_kind: input.source_kind,
      origin: Origin::Root,
      tenant_id: input.tenant_id,
      import_batch_id: input.import_batch_id,
      match_type: None,
      confidence: None,
      last_modified_by: None,
      attributes,
      extra_data,
      meters: input.meters,
    })
  }
}
