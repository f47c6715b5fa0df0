//! The `BuildingStore` trait, the async surface callers program against.
//!
//! Implemented by storage backends (e.g. `cornerstone-store-sqlite`). Each
//! write method is one atomic operation: if it returns an error, nothing it
//! did is visible afterwards.

use std::{collections::BTreeMap, future::Future};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  column::ColumnMapping,
  edit::SnapshotEdit,
  engine::UnmergeReport,
  lineage::{CandidateFields, Lineage},
  snapshot::{MergeOptions, NewSnapshot, Snapshot, SourceKind},
};

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a building-record store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait BuildingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Roots ─────────────────────────────────────────────────────────────

  /// Persist a new root snapshot with self-provenance and give it a lineage.
  fn create_root(
    &self,
    input: NewSnapshot,
  ) -> impl Future<Output = Result<(Snapshot, Lineage), Self::Error>> + Send + '_;

  /// Persist a new root snapshot without a lineage.
  fn stage_root(
    &self,
    input: NewSnapshot,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  /// Make a snapshot the canonical snapshot of its own active lineage.
  fn initialize_lineage(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<Lineage, Self::Error>> + Send + '_;

  // ── Structural operations ─────────────────────────────────────────────

  /// Merge `a` (left) and `b` (right) into a new snapshot that is a child of
  /// both. Returns `None` when `a == b`.
  fn merge_snapshots(
    &self,
    a: Uuid,
    b: Uuid,
    opts: MergeOptions,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  /// Split a snapshot's lineage back out of the merge tree it was folded
  /// into. Deletes every descendant of the anchor snapshot.
  fn unmerge_lineage(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<UnmergeReport, Self::Error>> + Send + '_;

  /// Record an edit as a new child snapshot of `old_id`.
  fn update_snapshot(
    &self,
    old_id: Uuid,
    edit: SnapshotEdit,
    actor: Option<String>,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_snapshot(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  fn get_lineage(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Lineage>, Self::Error>> + Send + '_;

  /// The lineage a snapshot belongs to.
  fn lineage_of(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<Option<Lineage>, Self::Error>> + Send + '_;

  fn active_lineages(&self) -> impl Future<Output = Result<Vec<Lineage>, Self::Error>> + Send + '_;

  fn children_of(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Composite and merged ancestors; raw snapshots are skipped.
  fn ancestors_of(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + '_;

  /// The flat key/value form of a snapshot (see [`crate::flat`]).
  fn to_flat(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<Option<Map<String, Value>>, Self::Error>> + Send + '_;

  // ── Matching candidates ───────────────────────────────────────────────

  /// Identifying fields of every snapshot from `import_batch_id` that is
  /// neither raw, nor merged, nor already linked to a lineage.
  fn unmatched_candidates(
    &self,
    import_batch_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CandidateFields>, Self::Error>> + Send + '_;

  /// Identifying fields of every active canonical snapshot of a tenant.
  fn canonical_candidates(
    &self,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CandidateFields>, Self::Error>> + Send + '_;

  // ── Column mappings ───────────────────────────────────────────────────

  /// Insert or replace the mapping for its `(tenant, raw, source_kind)` key.
  fn remember_column_mapping(
    &self,
    mapping: ColumnMapping,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn lookup_column_mapping<'a>(
    &'a self,
    tenant_id: Uuid,
    column_raw: &'a str,
    source_kind: SourceKind,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Every cached raw -> mapped choice for a tenant and source kind.
  fn column_mappings(
    &self,
    tenant_id: Uuid,
    source_kind: SourceKind,
  ) -> impl Future<Output = Result<BTreeMap<String, String>, Self::Error>> + Send + '_;
}
