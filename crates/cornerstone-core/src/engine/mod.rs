//! The merge engine: root creation, merge, unmerge, and field updates.
//!
//! An [`Engine`] borrows one [`Ledger`] for the duration of a single
//! operation. Backends construct it inside their transaction so that an
//! error from any step leaves nothing behind.

mod merge;
mod root;
mod unmerge;
mod update;


use tracing::info;
use uuid::Uuid;

pub use unmerge::UnmergeReport;

use crate::{
  Error, Result,
  ledger::Ledger,
  lineage::Lineage,
  policy::MergePolicy,
  settings::EngineSettings,
  snapshot::Snapshot,
};

pub struct Engine<'a, L: Ledger + ?Sized> {
  ledger:   &'a mut L,
  policy:   &'a dyn MergePolicy,
  settings: &'a EngineSettings,
}

impl<'a, L: Ledger + ?Sized> Engine<'a, L> {
  pub fn new(ledger: &'a mut L, policy: &'a dyn MergePolicy, settings: &'a EngineSettings) -> Self {
    Self { ledger, policy, settings }
  }

  /// Validate and insert a freshly built snapshot.
  fn persist(&mut self, snapshot: &Snapshot) -> Result<()> {
    for parent in snapshot.origin.parents() {
      self.ledger.check_link(parent, snapshot.snapshot_id)?;
    }
    self.ledger.verify_provenance(snapshot)?;
    self.ledger.insert_snapshot(snapshot)
  }

  /// Make `snapshot_id` the canonical snapshot of `lineage` and record the
  /// membership. An active lineage may not claim a snapshot another active
  /// lineage already presents.
  fn point_lineage(&mut self, lineage: &mut Lineage, snapshot_id: Uuid) -> Result<()> {
    if lineage.active
      && let Some(other) = self.ledger.active_lineage_for(snapshot_id)?
      && other != lineage.lineage_id
    {
      return Err(Error::TreeInconsistency(format!(
        "snapshot {snapshot_id} is already canonical for active lineage {other}"
      )));
    }
    lineage.canonical_snapshot_id = Some(snapshot_id);
    self.ledger.put_lineage(lineage)?;
    self.ledger.assign_lineage(snapshot_id, lineage.lineage_id)
  }

  /// Open a brand-new active lineage headed by `snapshot_id`.
  fn open_lineage(&mut self, snapshot_id: Uuid) -> Result<Lineage> {
    let mut lineage = Lineage::new(snapshot_id);
    self.point_lineage(&mut lineage, snapshot_id)?;
    info!(lineage = %lineage.lineage_id, snapshot = %snapshot_id, "opened lineage");
    Ok(lineage)
  }

  fn deactivate(&mut self, lineage_id: Uuid) -> Result<()> {
    let mut lineage = self.ledger.require_lineage(lineage_id)?;
    if lineage.active {
      lineage.active = false;
      self.ledger.put_lineage(&lineage)?;
      info!(lineage = %lineage_id, "lineage absorbed");
    }
    Ok(())
  }

  /// Composite and merged ancestors of a snapshot.
  pub fn ancestors_of(&self, snapshot_id: Uuid) -> Result<Vec<Snapshot>> {
    self.ledger.composite_ancestors(snapshot_id)
  }
}
