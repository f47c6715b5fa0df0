//! The `Ledger` trait: the synchronous persistence seam the engine runs on.
//!
//! A ledger is a transactional view of the snapshot DAG, the lineage registry,
//! and the bidirectional index between them (lineage -> canonical snapshot,
//! snapshot -> owning lineage). Backends hand the engine a ledger scoped to
//! one transaction; the engine never sees connections or locks.
//!
//! The provided methods implement DAG traversal iteratively with explicit
//! visited sets, so depth is bounded by the heap and cycles are reported as
//! [`Error::Cycle`] instead of recursing forever.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use crate::{Error, Result, lineage::Lineage, snapshot::Snapshot};

pub trait Ledger {
  // ── Snapshots ───────────────────────────────────────────────────────────

  fn snapshot(&self, id: Uuid) -> Result<Option<Snapshot>>;

  /// Persist a new snapshot together with the parent edges implied by its
  /// origin and its meter links.
  fn insert_snapshot(&mut self, snapshot: &Snapshot) -> Result<()>;

  /// Remove a snapshot, its edges, meter links and lineage membership. Any
  /// lineage whose canonical pointer referenced it is left pointing nowhere.
  fn delete_snapshot(&mut self, id: Uuid) -> Result<()>;

  /// Direct children, in the order they were created.
  fn children_of(&self, id: Uuid) -> Result<Vec<Uuid>>;

  // ── Lineages ────────────────────────────────────────────────────────────

  fn lineage(&self, id: Uuid) -> Result<Option<Lineage>>;

  /// Insert or overwrite a lineage row.
  fn put_lineage(&mut self, lineage: &Lineage) -> Result<()>;

  /// The lineage a snapshot belongs to.
  fn lineage_of(&self, snapshot_id: Uuid) -> Result<Option<Uuid>>;

  fn assign_lineage(&mut self, snapshot_id: Uuid, lineage_id: Uuid) -> Result<()>;

  /// The active lineage whose canonical snapshot is `snapshot_id`, if any.
  fn active_lineage_for(&self, snapshot_id: Uuid) -> Result<Option<Uuid>>;

  // ── Provided ────────────────────────────────────────────────────────────

  fn require(&self, id: Uuid) -> Result<Snapshot> {
    self.snapshot(id)?.ok_or(Error::SnapshotNotFound(id))
  }

  fn require_lineage(&self, id: Uuid) -> Result<Lineage> {
    self.lineage(id)?.ok_or(Error::LineageNotFound(id))
  }

  /// The lineage record a snapshot belongs to.
  fn owning_lineage(&self, snapshot_id: Uuid) -> Result<Option<Lineage>> {
    match self.lineage_of(snapshot_id)? {
      Some(id) => Ok(Some(self.require_lineage(id)?)),
      None => Ok(None),
    }
  }

  fn parents_of(&self, id: Uuid) -> Result<Vec<Uuid>> {
    match self.snapshot(id)? {
      Some(s) => Ok(s.origin.parents()),
      None => Err(Error::TreeInconsistency(format!("edge references missing snapshot {id}"))),
    }
  }

  /// Every ancestor of `id` in merge order: a node's own ancestors precede
  /// it, and left parents precede right parents. `id` itself is excluded.
  fn ancestor_chain(&self, id: Uuid) -> Result<Vec<Uuid>> {
    struct Frame {
      id:      Uuid,
      parents: Vec<Uuid>,
      next:    usize,
    }

    let mut order = Vec::new();
    let mut done = HashSet::new();
    let mut on_path = HashSet::from([id]);
    let mut stack = vec![Frame { id, parents: self.require(id)?.origin.parents(), next: 0 }];

    while let Some(frame) = stack.last_mut() {
      match frame.parents.get(frame.next).copied() {
        Some(parent) => {
          frame.next += 1;
          let child = frame.id;
          if on_path.contains(&parent) {
            return Err(Error::Cycle { parent, child });
          }
          if done.contains(&parent) {
            continue;
          }
          let parents = self.parents_of(parent)?;
          on_path.insert(parent);
          stack.push(Frame { id: parent, parents, next: 0 });
        }
        None => {
          let finished = frame.id;
          stack.pop();
          on_path.remove(&finished);
          if finished != id {
            done.insert(finished);
            order.push(finished);
          }
        }
      }
    }

    Ok(order)
  }

  /// Every descendant of `id`, nearest first. The last element is the
  /// furthest (most merged-down) descendant.
  fn descendant_chain(&self, id: Uuid) -> Result<Vec<Uuid>> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut queue: VecDeque<(Uuid, Uuid)> =
      self.children_of(id)?.into_iter().map(|c| (id, c)).collect();

    while let Some((parent, child)) = queue.pop_front() {
      if child == id {
        return Err(Error::Cycle { parent, child });
      }
      if !visited.insert(child) {
        continue;
      }
      order.push(child);
      for grandchild in self.children_of(child)? {
        queue.push_back((child, grandchild));
      }
    }

    Ok(order)
  }

  /// All ancestors reachable from `starts`, including `starts` themselves.
  fn ancestor_closure(&self, starts: &[Uuid]) -> Result<HashSet<Uuid>> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<Uuid> = starts.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
      if seen.insert(id) {
        queue.extend(self.parents_of(id)?);
      }
    }
    Ok(seen)
  }

  /// Composite and merged ancestors of `id`. Raw snapshots are neither
  /// returned nor walked through.
  fn composite_ancestors(&self, id: Uuid) -> Result<Vec<Snapshot>> {
    let mut found = Vec::new();
    let mut visited = HashSet::from([id]);
    let mut queue: VecDeque<Uuid> = self.require(id)?.origin.parents().into();

    while let Some(parent) = queue.pop_front() {
      if !visited.insert(parent) {
        continue;
      }
      let snapshot = self.require(parent)?;
      if snapshot.source_kind.is_raw() {
        continue;
      }
      queue.extend(snapshot.origin.parents());
      found.push(snapshot);
    }

    Ok(found)
  }

  /// Reject an edge `parent -> child` that would close a cycle.
  fn check_link(&self, parent: Uuid, child: Uuid) -> Result<()> {
    if parent == child || self.ancestor_closure(&[parent])?.contains(&child) {
      return Err(Error::Cycle { parent, child });
    }
    Ok(())
  }

  /// Every provenance source on `snapshot` must be the snapshot itself or
  /// one of its ancestors.
  fn verify_provenance(&self, snapshot: &Snapshot) -> Result<()> {
    let mut allowed = self.ancestor_closure(&snapshot.origin.parents())?;
    allowed.insert(snapshot.snapshot_id);
    match snapshot.provenance().find(|(_, source)| !allowed.contains(source)) {
      Some((field, source_id)) => Err(Error::InvalidProvenance {
        snapshot: snapshot.snapshot_id,
        field,
        source_id,
      }),
      None => Ok(()),
    }
  }
}
