//! [`MemoryLedger`], an in-process [`Ledger`] for tests and embedding.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::{Error, Result, ledger::Ledger, lineage::Lineage, snapshot::Snapshot};

/// A ledger held entirely in memory.
///
/// [`MemoryLedger::transact`] runs a closure against a scratch copy and only
/// keeps the copy if the closure succeeds, giving the same all-or-nothing
/// behaviour a database transaction does.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
  snapshots: BTreeMap<Uuid, Snapshot>,
  children:  HashMap<Uuid, Vec<Uuid>>,
  lineages:  BTreeMap<Uuid, Lineage>,
  members:   HashMap<Uuid, Uuid>,
}

impl MemoryLedger {
  pub fn new() -> Self { Self::default() }

  /// Run `op` atomically: on error every change it made is discarded.
  pub fn transact<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
    let mut scratch = self.clone();
    let out = op(&mut scratch)?;
    *self = scratch;
    Ok(out)
  }

  pub fn snapshot_count(&self) -> usize { self.snapshots.len() }

  pub fn lineages(&self) -> impl Iterator<Item = &Lineage> { self.lineages.values() }

  pub fn active_lineages(&self) -> impl Iterator<Item = &Lineage> {
    self.lineages.values().filter(|l| l.active)
  }

  pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> { self.snapshots.values() }
}

impl Ledger for MemoryLedger {
  fn snapshot(&self, id: Uuid) -> Result<Option<Snapshot>> { Ok(self.snapshots.get(&id).cloned()) }

  fn insert_snapshot(&mut self, snapshot: &Snapshot) -> Result<()> {
    if self.snapshots.contains_key(&snapshot.snapshot_id) {
      return Err(Error::TreeInconsistency(format!(
        "snapshot {} already exists",
        snapshot.snapshot_id
      )));
    }
    for parent in snapshot.origin.parents() {
      self.children.entry(parent).or_default().push(snapshot.snapshot_id);
    }
    self.snapshots.insert(snapshot.snapshot_id, snapshot.clone());
    Ok(())
  }

  fn delete_snapshot(&mut self, id: Uuid) -> Result<()> {
    let snapshot = self.snapshots.remove(&id).ok_or(Error::SnapshotNotFound(id))?;
    for parent in snapshot.origin.parents() {
      if let Some(siblings) = self.children.get_mut(&parent) {
        siblings.retain(|c| *c != id);
      }
    }
    self.children.remove(&id);
    self.members.remove(&id);
    for lineage in self.lineages.values_mut() {
      if lineage.canonical_snapshot_id == Some(id) {
        lineage.canonical_snapshot_id = None;
      }
    }
    Ok(())
  }

  fn children_of(&self, id: Uuid) -> Result<Vec<Uuid>> {
    Ok(self.children.get(&id).cloned().unwrap_or_default())
  }

  fn lineage(&self, id: Uuid) -> Result<Option<Lineage>> { Ok(self.lineages.get(&id).cloned()) }

  fn put_lineage(&mut self, lineage: &Lineage) -> Result<()> {
    self.lineages.insert(lineage.lineage_id, lineage.clone());
    Ok(())
  }

  fn lineage_of(&self, snapshot_id: Uuid) -> Result<Option<Uuid>> {
    Ok(self.members.get(&snapshot_id).copied())
  }

  fn assign_lineage(&mut self, snapshot_id: Uuid, lineage_id: Uuid) -> Result<()> {
    self.members.insert(snapshot_id, lineage_id);
    Ok(())
  }

  fn active_lineage_for(&self, snapshot_id: Uuid) -> Result<Option<Uuid>> {
    Ok(
      self
        .lineages
        .values()
        .find(|l| l.active && l.canonical_snapshot_id == Some(snapshot_id))
        .map(|l| l.lineage_id),
    )
  }
}
