//! Undoing a merge.
//!
//! Unmerging snapshot `S` removes every descendant of `S`, rebuilds the rest
//! of the merged tree without it by re-merging the surviving ancestors in
//! their original order, and gives `S` back an active lineage of its own.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::Engine;
use crate::{
  Error, Result,
  ledger::Ledger,
  lineage::Lineage,
  settings::{FoldScope, ParentAnchor},
  snapshot::{MergeOptions, Snapshot},
};

/// What an unmerge did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmergeReport {
  /// The snapshot that was split out. Differs from the requested snapshot
  /// when that one had no descendants and its parent was used instead.
  pub anchor:         Uuid,
  /// The snapshot the remaining tree now ends in, if anything was rebuilt.
  pub new_root:       Option<Uuid>,
  /// Deleted descendants, furthest first.
  pub deleted:        Vec<Uuid>,
  /// The active lineage the anchor now heads.
  pub anchor_lineage: Uuid,
}

impl<L: Ledger + ?Sized> Engine<'_, L> {
  pub fn unmerge_lineage(&mut self, snapshot_id: Uuid) -> Result<UnmergeReport> {
    let mut anchor = self.ledger.require(snapshot_id)?;
    let mut children = self.ledger.descendant_chain(anchor.snapshot_id)?;

    // A leaf has nothing below it; split its parent out instead.
    if children.is_empty()
      && let Some(parent) = self.anchor_parent(&anchor)
    {
      anchor = self.ledger.require(parent)?;
      children = self.ledger.descendant_chain(parent)?;
    }

    let Some(&furthest) = children.last() else {
      let lineage = self.claim_own_lineage(anchor.snapshot_id, None)?;
      return Ok(UnmergeReport {
        anchor:         anchor.snapshot_id,
        new_root:       None,
        deleted:        Vec::new(),
        anchor_lineage: lineage.lineage_id,
      });
    };

    let doomed: HashSet<Uuid> = children.iter().copied().collect();
    let (last, leaf_lineage) = self.presented_descendant(&children, furthest)?;
    self.check_cut(&doomed, leaf_lineage)?;

    // Everything the doomed subtree was built from, minus the anchor. Every
    // doomed leaf contributes so that side branches lose nothing.
    let mut leaves = vec![last];
    for id in &children {
      if *id != last && self.ledger.children_of(*id)?.is_empty() {
        leaves.push(*id);
      }
    }
    let mut seen = HashSet::new();
    let mut remaining = Vec::new();
    for leaf in leaves {
      for id in self.ledger.ancestor_chain(leaf)? {
        if id != anchor.snapshot_id && !doomed.contains(&id) && seen.insert(id) {
          remaining.push(id);
        }
      }
    }
    if self.settings.unmerge.fold == FoldScope::Frontier {
      remaining = self.frontier(remaining)?;
    }

    let new_root = self.fold(&remaining, leaf_lineage)?;
    let new_root_id = new_root.as_ref().map_or(anchor.snapshot_id, |s| s.snapshot_id);

    if let Some(id) = leaf_lineage {
      let mut lineage = self.ledger.require_lineage(id)?;
      self.point_lineage(&mut lineage, new_root_id)?;
    }

    warn!(
      anchor = %anchor.snapshot_id,
      count = children.len(),
      "deleting merge history below unmerged snapshot"
    );
    let deleted: Vec<Uuid> = children.into_iter().rev().collect();
    for id in &deleted {
      self.ledger.delete_snapshot(*id)?;
    }

    let lineage = self.claim_own_lineage(anchor.snapshot_id, leaf_lineage)?;
    info!(
      anchor = %anchor.snapshot_id,
      new_root = %new_root_id,
      lineage = %lineage.lineage_id,
      "unmerged snapshot"
    );

    Ok(UnmergeReport {
      anchor:         anchor.snapshot_id,
      new_root:       Some(new_root_id),
      deleted,
      anchor_lineage: lineage.lineage_id,
    })
  }

  /// The doomed snapshot an active lineage presents, with that lineage.
  /// Without one, the furthest descendant and its owning lineage.
  fn presented_descendant(
    &self,
    children: &[Uuid],
    furthest: Uuid,
  ) -> Result<(Uuid, Option<Uuid>)> {
    for id in children.iter().rev() {
      if let Some(lineage) = self.ledger.active_lineage_for(*id)? {
        return Ok((*id, Some(lineage)));
      }
    }
    Ok((furthest, self.ledger.lineage_of(furthest)?))
  }

  fn anchor_parent(&self, snapshot: &Snapshot) -> Option<Uuid> {
    let parents = snapshot.origin.parents();
    match self.settings.unmerge.anchor {
      ParentAnchor::FirstParent => parents.first().copied(),
      ParentAnchor::LastParent => parents.last().copied(),
    }
  }

  /// Refuse to delete a set that would strand other state: every child of a
  /// doomed snapshot must itself be doomed, and no active lineage other than
  /// the one being rebuilt may present a doomed snapshot.
  fn check_cut(&self, doomed: &HashSet<Uuid>, leaf_lineage: Option<Uuid>) -> Result<()> {
    for id in doomed {
      if let Some(outside) = self.ledger.children_of(*id)?.into_iter().find(|c| !doomed.contains(c)) {
        return Err(Error::TreeInconsistency(format!(
          "snapshot {id} has descendant {outside} outside the unmerged subtree"
        )));
      }
      if let Some(lineage) = self.ledger.active_lineage_for(*id)?
        && Some(lineage) != leaf_lineage
      {
        return Err(Error::TreeInconsistency(format!(
          "active lineage {lineage} presents snapshot {id}, which unmerge would delete"
        )));
      }
    }
    Ok(())
  }

  /// Drop every snapshot that is an ancestor of another remaining snapshot.
  fn frontier(&self, remaining: Vec<Uuid>) -> Result<Vec<Uuid>> {
    let mut covered = HashSet::new();
    for id in &remaining {
      let parents = self.ledger.parents_of(*id)?;
      covered.extend(self.ledger.ancestor_closure(&parents)?);
    }
    Ok(remaining.into_iter().filter(|id| !covered.contains(id)).collect())
  }

  /// Re-merge `remaining` left to right. A single survivor is returned as
  /// is; an empty list yields `None`.
  fn fold(&mut self, remaining: &[Uuid], lineage: Option<Uuid>) -> Result<Option<Snapshot>> {
    let Some((first, rest)) = remaining.split_first() else {
      return Ok(None);
    };
    let mut root = self.ledger.require(*first)?;
    for id in rest {
      let next = self.ledger.require(*id)?;
      root = self.merge_into(&root, &next, &MergeOptions::default(), lineage)?;
    }
    Ok(Some(root))
  }

  /// Give `anchor` an active lineage whose canonical snapshot is itself,
  /// reusing its own lineage when that lineage is not the one just rebuilt.
  fn claim_own_lineage(&mut self, anchor: Uuid, rebuilt: Option<Uuid>) -> Result<Lineage> {
    if let Some(mut own) = self.ledger.owning_lineage(anchor)? {
      if own.canonical_snapshot_id == Some(anchor) {
        if !own.active {
          own.active = true;
          self.point_lineage(&mut own, anchor)?;
          info!(lineage = %own.lineage_id, snapshot = %anchor, "lineage reactivated");
        }
        return Ok(own);
      }

      if Some(own.lineage_id) != rebuilt {
        if let Some(other) = own.canonical_snapshot_id {
          return Err(Error::TreeInconsistency(format!(
            "lineage {} of snapshot {anchor} presents unrelated snapshot {other}",
            own.lineage_id
          )));
        }
        own.active = true;
        self.point_lineage(&mut own, anchor)?;
        info!(lineage = %own.lineage_id, snapshot = %anchor, "lineage reactivated");
        return Ok(own);
      }
    }

    self.open_lineage(anchor)
  }
}
