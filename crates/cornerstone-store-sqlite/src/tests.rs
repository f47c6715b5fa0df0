//! Integration tests for `SqliteStore` against an in-memory database.

use cornerstone_core::{
  attribute::{Attribute, AttributeValue},
  column::ColumnMapping,
  edit::SnapshotEdit,
  policy::{MergePolicy, Pick},
  snapshot::{ExtraField, Field, MatchType, MergeOptions, NewSnapshot, Origin, Snapshot, SourceKind},
  store::BuildingStore,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{Error, SqliteStore, StoreConfig};

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

async fn store() -> SqliteStore {
  init_tracing();
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn building(fields: &[(Attribute, &str)]) -> NewSnapshot {
  fields
    .iter()
    .fold(NewSnapshot::new(SourceKind::RawAssessed), |s, (a, v)| s.with_text(*a, v))
}

async fn root(s: &SqliteStore, fields: &[(Attribute, &str)]) -> Snapshot {
  s.create_root(building(fields)).await.unwrap().0
}

async fn merge(s: &SqliteStore, a: &Snapshot, b: &Snapshot) -> Snapshot {
  s.merge_snapshots(a.snapshot_id, b.snapshot_id, MergeOptions::system(0.8))
    .await
    .unwrap()
    .expect("distinct snapshots merge")
}

async fn heads(s: &SqliteStore, id: Uuid) -> usize {
  s.active_lineages()
    .await
    .unwrap()
    .iter()
    .filter(|l| l.canonical_snapshot_id == Some(id))
    .count()
}

// ─── Roots ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_root_persists_self_provenance() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let meter = Uuid::new_v4();

  let mut input = building(&[(Attribute::TaxLotId, "100"), (Attribute::YearBuilt, "1931")])
    .with(Attribute::ReleaseDate, AttributeValue::text("2014-03-01"))
    .with_extra("Boiler Type", json!("steam"));
  input.tenant_id = Some(tenant);
  input.meters.insert(meter);

  let (created, lineage) = s.create_root(input).await.unwrap();
  let fetched = s.get_snapshot(created.snapshot_id).await.unwrap().unwrap();

  assert_eq!(fetched, created);
  assert_eq!(fetched.value(Attribute::YearBuilt), Some(&AttributeValue::Integer(1931)));
  assert!(fetched.attributes.values().all(|f| f.source == created.snapshot_id));
  assert!(fetched.extra_data.values().all(|f| f.source == created.snapshot_id));
  assert!(fetched.meters.contains(&meter));

  let owner = s.lineage_of(created.snapshot_id).await.unwrap().unwrap();
  assert_eq!(owner, lineage);
  assert_eq!(owner.canonical_snapshot_id, Some(created.snapshot_id));
}

#[tokio::test]
async fn missing_records_read_as_none() {
  let s = store().await;
  assert!(s.get_snapshot(Uuid::new_v4()).await.unwrap().is_none());
  assert!(s.get_lineage(Uuid::new_v4()).await.unwrap().is_none());
  assert!(s.to_flat(Uuid::new_v4()).await.unwrap().is_none());
}

// ─── Merge ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_records_contributing_sources() {
  let s = store().await;
  let a = root(&s, &[(Attribute::TaxLotId, "100")]).await;
  let b = root(&s, &[(Attribute::TaxLotId, "100"), (Attribute::PmPropertyId, "P1")]).await;

  let c = merge(&s, &a, &b).await;
  let c = s.get_snapshot(c.snapshot_id).await.unwrap().unwrap();

  assert_eq!(c.origin, Origin::Merged { left: a.snapshot_id, right: b.snapshot_id });
  assert_eq!(c.match_type, Some(MatchType::SystemMatch));
  assert!(matches!(c.source(Attribute::TaxLotId), Some(id) if id == a.snapshot_id || id == b.snapshot_id));
  assert_eq!(c.source(Attribute::PmPropertyId), Some(b.snapshot_id));
  assert_eq!(s.children_of(a.snapshot_id).await.unwrap(), vec![c.snapshot_id]);
  assert_eq!(s.children_of(b.snapshot_id).await.unwrap(), vec![c.snapshot_id]);
}

#[tokio::test]
async fn merge_leaves_exactly_one_active_head() {
  let s = store().await;
  let a = root(&s, &[(Attribute::TaxLotId, "100")]).await;
  let b = root(&s, &[(Attribute::TaxLotId, "200")]).await;
  let la = s.lineage_of(a.snapshot_id).await.unwrap().unwrap();
  let lb = s.lineage_of(b.snapshot_id).await.unwrap().unwrap();

  let c = merge(&s, &a, &b).await;

  assert_eq!(heads(&s, c.snapshot_id).await, 1);
  assert!(s.get_lineage(la.lineage_id).await.unwrap().unwrap().active);
  assert!(!s.get_lineage(lb.lineage_id).await.unwrap().unwrap().active);
  assert_eq!(s.active_lineages().await.unwrap().len(), 1);
}

#[tokio::test]
async fn merging_an_absorbed_snapshot_keeps_an_active_head() {
  let s = store().await;
  let a = root(&s, &[(Attribute::TaxLotId, "100")]).await;
  let b = root(&s, &[(Attribute::TaxLotId, "200")]).await;
  let d = root(&s, &[(Attribute::TaxLotId, "300")]).await;
  let ld = s.lineage_of(d.snapshot_id).await.unwrap().unwrap();
  merge(&s, &a, &b).await;

  let c2 = merge(&s, &b, &d).await;

  assert_eq!(heads(&s, c2.snapshot_id).await, 1);
  let ld = s.get_lineage(ld.lineage_id).await.unwrap().unwrap();
  assert!(ld.active);
  assert_eq!(ld.canonical_snapshot_id, Some(c2.snapshot_id));
  assert_eq!(s.active_lineages().await.unwrap().len(), 2);
}

#[tokio::test]
async fn repeated_merges_create_distinct_snapshots() {
  let s = store().await;
  let a = root(&s, &[(Attribute::TaxLotId, "100")]).await;
  let b = root(&s, &[(Attribute::TaxLotId, "100")]).await;

  let first = merge(&s, &a, &b).await;
  let second = merge(&s, &a, &b).await;

  assert_ne!(first.snapshot_id, second.snapshot_id);
  assert_eq!(s.children_of(a.snapshot_id).await.unwrap().len(), 2);
  assert_eq!(heads(&s, second.snapshot_id).await, 1);
}

#[tokio::test]
async fn self_merge_changes_nothing() {
  let s = store().await;
  let a = root(&s, &[(Attribute::TaxLotId, "100")]).await;
  let before = s.active_lineages().await.unwrap();

  let out = s
    .merge_snapshots(a.snapshot_id, a.snapshot_id, MergeOptions::default())
    .await
    .unwrap();

  assert!(out.is_none());
  assert!(s.children_of(a.snapshot_id).await.unwrap().is_empty());
  assert_eq!(s.active_lineages().await.unwrap(), before);
}

/// Picks the right side even when it has nothing to give.
struct AlwaysRight;

impl MergePolicy for AlwaysRight {
  fn pick_attribute(&self, _: Attribute, _: Option<&Field>, _: Option<&Field>) -> Pick { Pick::Right }

  fn pick_extra(&self, _: &str, _: Option<&ExtraField>, _: Option<&ExtraField>) -> Pick { Pick::Right }
}

#[tokio::test]
async fn failed_merge_rolls_back() {
  let s = store().await.with_policy(AlwaysRight);
  let a = root(&s, &[(Attribute::TaxLotId, "100")]).await;
  let b = root(&s, &[]).await;

  let err = s
    .merge_snapshots(a.snapshot_id, b.snapshot_id, MergeOptions::default())
    .await
    .unwrap_err();

  assert!(matches!(err, Error::Core(cornerstone_core::Error::InvalidProvenance { .. })));
  assert!(!err.is_recoverable());
  assert!(s.children_of(a.snapshot_id).await.unwrap().is_empty());
  assert_eq!(s.active_lineages().await.unwrap().len(), 2);
}

#[tokio::test]
async fn merge_with_missing_snapshot_is_recoverable() {
  let s = store().await;
  let a = root(&s, &[]).await;
  let err = s
    .merge_snapshots(a.snapshot_id, Uuid::new_v4(), MergeOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(cornerstone_core::Error::SnapshotNotFound(_))));
  assert!(err.is_recoverable());
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_attributes_only_changed_fields() {
  let s = store().await;
  let old = root(&s, &[(Attribute::TaxLotId, "100"), (Attribute::PmPropertyId, "P1")]).await;

  let edit = SnapshotEdit::new()
    .set("tax_lot_id", "200")
    .set("pm_property_id", "P1")
    .set("owner", "Acme");
  let new = s
    .update_snapshot(old.snapshot_id, edit, Some("ana@example.com".into()))
    .await
    .unwrap();
  let new = s.get_snapshot(new.snapshot_id).await.unwrap().unwrap();

  assert_eq!(new.origin, Origin::Edited { parent: old.snapshot_id });
  assert_eq!(new.source(Attribute::TaxLotId), Some(new.snapshot_id));
  assert_eq!(new.source(Attribute::Owner), Some(new.snapshot_id));
  assert_eq!(new.source(Attribute::PmPropertyId), Some(old.snapshot_id));
  assert_eq!(new.last_modified_by.as_deref(), Some("ana@example.com"));

  let lineage = s.lineage_of(new.snapshot_id).await.unwrap().unwrap();
  assert_eq!(lineage.canonical_snapshot_id, Some(new.snapshot_id));
}

#[tokio::test]
async fn flat_form_round_trips_through_update() {
  let s = store().await;
  let a = root(&s, &[(Attribute::TaxLotId, "100"), (Attribute::YearEnding, "2014-01-31")]).await;
  let b = root(&s, &[(Attribute::GrossFloorArea, "1200.5")]).await;
  let c = merge(&s, &a, &b).await;

  let flat = s.to_flat(c.snapshot_id).await.unwrap().unwrap();
  assert_eq!(flat["tax_lot_id"], json!("100"));
  assert_eq!(flat["tax_lot_id_source"], json!(a.snapshot_id));

  let n = s
    .update_snapshot(c.snapshot_id, SnapshotEdit { values: flat }, None)
    .await
    .unwrap();
  assert_eq!(n.attributes, c.attributes);
}

#[tokio::test]
async fn invalid_edit_is_rejected_before_writing() {
  let s = store().await;
  let old = root(&s, &[]).await;
  let err = s
    .update_snapshot(old.snapshot_id, SnapshotEdit::new().set("year_ending", "soon"), None)
    .await
    .unwrap_err();
  assert!(err.is_recoverable());
  assert!(s.children_of(old.snapshot_id).await.unwrap().is_empty());
}

// ─── Unmerge ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unmerge_restores_the_split_lineage() {
  let s = store().await;
  let a = root(&s, &[(Attribute::TaxLotId, "100")]).await;
  let b = root(&s, &[(Attribute::PmPropertyId, "P1")]).await;
  let d = root(&s, &[(Attribute::City, "Denver")]).await;
  let c = merge(&s, &a, &b).await;
  let e = merge(&s, &c, &d).await;

  let report = s.unmerge_lineage(a.snapshot_id).await.unwrap();

  assert!(s.get_snapshot(c.snapshot_id).await.unwrap().is_none());
  assert!(s.get_snapshot(e.snapshot_id).await.unwrap().is_none());
  assert_eq!(report.deleted, vec![e.snapshot_id, c.snapshot_id]);

  let own = s.lineage_of(a.snapshot_id).await.unwrap().unwrap();
  assert!(own.active);
  assert_eq!(own.canonical_snapshot_id, Some(a.snapshot_id));
  assert_eq!(own.lineage_id, report.anchor_lineage);

  let rebuilt = s.get_snapshot(report.new_root.unwrap()).await.unwrap().unwrap();
  assert_eq!(rebuilt.origin, Origin::Merged { left: b.snapshot_id, right: d.snapshot_id });
  assert_eq!(rebuilt.value(Attribute::TaxLotId), None);
  assert_eq!(heads(&s, rebuilt.snapshot_id).await, 1);
  assert_eq!(s.active_lineages().await.unwrap().len(), 2);
}

#[tokio::test]
async fn unmerge_of_isolated_root_is_a_no_op() {
  let s = store().await;
  let r = root(&s, &[(Attribute::TaxLotId, "100")]).await;
  let lineage = s.lineage_of(r.snapshot_id).await.unwrap().unwrap();

  let report = s.unmerge_lineage(r.snapshot_id).await.unwrap();

  assert_eq!(report.anchor_lineage, lineage.lineage_id);
  assert!(report.deleted.is_empty());
  assert!(s.get_snapshot(r.snapshot_id).await.unwrap().is_some());
  assert_eq!(heads(&s, r.snapshot_id).await, 1);
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unmatched_candidates_are_unlinked_mapped_snapshots() {
  let s = store().await;
  let batch = Uuid::new_v4();

  let staged = |tax: &str| {
    let mut input = NewSnapshot::new(SourceKind::CompositeAssessed).with_text(Attribute::TaxLotId, tax);
    input.import_batch_id = Some(batch);
    input
  };
  let one = s.stage_root(staged("100")).await.unwrap();
  let two = s.stage_root(staged("200")).await.unwrap();
  // Linked snapshots and raw snapshots are not candidates.
  s.initialize_lineage(two.snapshot_id).await.unwrap();
  let mut raw = building(&[(Attribute::TaxLotId, "300")]);
  raw.import_batch_id = Some(batch);
  s.stage_root(raw).await.unwrap();

  let candidates = s.unmatched_candidates(batch).await.unwrap();
  assert_eq!(candidates.len(), 1);
  assert_eq!(candidates[0].snapshot_id, one.snapshot_id);
  assert_eq!(candidates[0].tax_lot_id.as_deref(), Some("100"));
}

#[tokio::test]
async fn canonical_candidates_follow_active_heads() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let owned = |tax: &str| {
    let mut input = building(&[(Attribute::TaxLotId, tax), (Attribute::AddressLine1, "1 Main St")]);
    input.tenant_id = Some(tenant);
    input
  };
  let a = s.create_root(owned("100")).await.unwrap().0;
  let b = s.create_root(owned("200")).await.unwrap().0;
  s.create_root(building(&[(Attribute::TaxLotId, "999")])).await.unwrap();

  assert_eq!(s.canonical_candidates(tenant).await.unwrap().len(), 2);

  let c = merge(&s, &a, &b).await;
  let candidates = s.canonical_candidates(tenant).await.unwrap();
  assert_eq!(candidates.len(), 1);
  assert_eq!(candidates[0].snapshot_id, c.snapshot_id);
  assert_eq!(candidates[0].address_line_1.as_deref(), Some("1 Main St"));
}

#[tokio::test]
async fn ancestors_exclude_raw_snapshots() {
  let s = store().await;
  let a = root(&s, &[]).await;
  let b = root(&s, &[]).await;
  let d = root(&s, &[]).await;
  let c = merge(&s, &a, &b).await;
  let e = merge(&s, &c, &d).await;

  let ancestors = s.ancestors_of(e.snapshot_id).await.unwrap();
  assert_eq!(ancestors.iter().map(|x| x.snapshot_id).collect::<Vec<_>>(), vec![c.snapshot_id]);
}

// ─── Column mappings ─────────────────────────────────────────────────────────

#[tokio::test]
async fn column_mappings_upsert_per_triple() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let kind = SourceKind::RawAssessed;

  assert!(s.lookup_column_mapping(tenant, "BBL", kind).await.unwrap().is_none());

  s.remember_column_mapping(ColumnMapping::new(tenant, "BBL", kind, "tax_lot_id"))
    .await
    .unwrap();
  s.remember_column_mapping(ColumnMapping::new(tenant, "BBL", kind, "custom_id_1"))
    .await
    .unwrap();
  s.remember_column_mapping(ColumnMapping::new(tenant, "Owner", kind, "owner"))
    .await
    .unwrap();
  s.remember_column_mapping(ColumnMapping::new(tenant, "BBL", SourceKind::RawPortfolio, "pm_property_id"))
    .await
    .unwrap();

  assert_eq!(
    s.lookup_column_mapping(tenant, "BBL", kind).await.unwrap().as_deref(),
    Some("custom_id_1")
  );
  let all = s.column_mappings(tenant, kind).await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all["Owner"], "owner");
  assert!(s.column_mappings(Uuid::new_v4(), kind).await.unwrap().is_empty());
}

#[tokio::test]
async fn oversized_column_names_are_rejected() {
  let s = store().await;
  let mapping = ColumnMapping::new(Uuid::new_v4(), "x".repeat(600), SourceKind::RawAssessed, "owner");
  let err = s.remember_column_mapping(mapping).await.unwrap_err();
  assert!(err.is_recoverable());
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[tokio::test]
async fn file_store_survives_reopen() {
  init_tracing();
  let path = std::env::temp_dir().join(format!("cornerstone-{}.db", Uuid::new_v4()));
  let config = StoreConfig { store_path: path.clone(), ..StoreConfig::default() };

  let id = {
    let s = SqliteStore::open_with(&config).await.unwrap();
    root(&s, &[(Attribute::TaxLotId, "100")]).await.snapshot_id
  };

  let s = SqliteStore::open_with(&config).await.unwrap();
  let fetched = s.get_snapshot(id).await.unwrap().unwrap();
  assert_eq!(fetched.text(Attribute::TaxLotId), Some("100"));

  drop(s);
  let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn configured_identifier_limit_applies() {
  init_tracing();
  let mut config = StoreConfig::from_toml_str("[engine]\nidentifier_max_len = 8").unwrap();
  config.store_path = std::env::temp_dir().join(format!("cornerstone-{}.db", Uuid::new_v4()));
  let s = SqliteStore::open_with(&config).await.unwrap();

  let r = root(&s, &[(Attribute::PmPropertyId, "1234567890")]).await;
  assert_eq!(r.text(Attribute::PmPropertyId), Some("12345678"));

  drop(s);
  let _ = std::fs::remove_file(&config.store_path);
}
