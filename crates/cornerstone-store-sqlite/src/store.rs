//! [`SqliteStore`], the SQLite implementation of [`BuildingStore`].

use std::{collections::BTreeMap, path::Path, sync::Arc};

use cornerstone_core::{
  column::ColumnMapping,
  edit::SnapshotEdit,
  engine::{Engine, UnmergeReport},
  flat,
  ledger::Ledger,
  lineage::{CandidateFields, Lineage},
  policy::{MergePolicy, PreferPopulated},
  settings::EngineSettings,
  snapshot::{MergeOptions, NewSnapshot, Snapshot, SourceKind},
  store::BuildingStore,
};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  encode::{SNAPSHOT_COLUMNS, encode_uuid},
  ledger::SqliteLedger,
  schema::SCHEMA,
  settings::StoreConfig,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A building-record store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All clones
/// share one worker thread, so operations are applied one at a time.
#[derive(Clone)]
pub struct SqliteStore {
  conn:     tokio_rusqlite::Connection,
  policy:   Arc<dyn MergePolicy>,
  settings: Arc<EngineSettings>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with default engine settings.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, EngineSettings::default()).await
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, EngineSettings::default()).await
  }

  /// Open the store described by `config`.
  pub async fn open_with(config: &StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(&config.store_path).await?;
    Self::init(conn, config.engine.clone()).await
  }

  /// Replace the field-merge policy (the default is [`PreferPopulated`]
  /// favouring the configured side).
  pub fn with_policy(mut self, policy: impl MergePolicy + 'static) -> Self {
    self.policy = Arc::new(policy);
    self
  }

  async fn init(conn: tokio_rusqlite::Connection, settings: EngineSettings) -> Result<Self> {
    let store = Self {
      conn,
      policy: Arc::new(PreferPopulated::new(settings.merge.prefer)),
      settings: Arc::new(settings),
    };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run one engine operation inside an `IMMEDIATE` transaction. The
  /// transaction commits only if `op` succeeds; otherwise it is dropped and
  /// rolled back.
  async fn transact<T, F>(&self, op: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut Engine<'_, SqliteLedger<'_>>) -> cornerstone_core::Result<T> + Send + 'static,
  {
    let policy = Arc::clone(&self.policy);
    let settings = Arc::clone(&self.settings);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = {
          let mut ledger = SqliteLedger::new(&tx);
          let mut engine = Engine::new(&mut ledger, &*policy, &settings);
          op(&mut engine)
        };
        if outcome.is_ok() {
          tx.commit()?;
        }
        Ok(outcome)
      })
      .await?;

    Ok(outcome?)
  }

  /// Run a read-only closure against the ledger.
  async fn read<T, F>(&self, op: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&SqliteLedger<'_>) -> cornerstone_core::Result<T> + Send + 'static,
  {
    let outcome = self
      .conn
      .call(move |conn| Ok(op(&SqliteLedger::new(conn))))
      .await?;
    Ok(outcome?)
  }
}

// ─── BuildingStore impl ──────────────────────────────────────────────────────

impl BuildingStore for SqliteStore {
  type Error = crate::Error;

  // ── Roots ─────────────────────────────────────────────────────────────────

  async fn create_root(&self, input: NewSnapshot) -> Result<(Snapshot, Lineage)> {
    self.transact(move |engine| engine.create_root(input)).await
  }

  async fn stage_root(&self, input: NewSnapshot) -> Result<Snapshot> {
    self.transact(move |engine| engine.stage_root(input)).await
  }

  async fn initialize_lineage(&self, snapshot_id: Uuid) -> Result<Lineage> {
    self
      .transact(move |engine| engine.initialize_lineage(snapshot_id))
      .await
  }

  // ── Structural operations ─────────────────────────────────────────────────

  async fn merge_snapshots(&self, a: Uuid, b: Uuid, opts: MergeOptions) -> Result<Option<Snapshot>> {
    self
      .transact(move |engine| engine.merge_snapshots(a, b, &opts))
      .await
  }

  async fn unmerge_lineage(&self, snapshot_id: Uuid) -> Result<UnmergeReport> {
    self
      .transact(move |engine| engine.unmerge_lineage(snapshot_id))
      .await
  }

  async fn update_snapshot(
    &self,
    old_id: Uuid,
    edit: SnapshotEdit,
    actor: Option<String>,
  ) -> Result<Snapshot> {
    self
      .transact(move |engine| engine.update_snapshot(old_id, &edit, actor.as_deref()))
      .await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_snapshot(&self, id: Uuid) -> Result<Option<Snapshot>> {
    self.read(move |ledger| ledger.snapshot(id)).await
  }

  async fn get_lineage(&self, id: Uuid) -> Result<Option<Lineage>> {
    self.read(move |ledger| ledger.lineage(id)).await
  }

  async fn lineage_of(&self, snapshot_id: Uuid) -> Result<Option<Lineage>> {
    self.read(move |ledger| ledger.owning_lineage(snapshot_id)).await
  }

  async fn active_lineages(&self) -> Result<Vec<Lineage>> {
    self.read(|ledger| ledger.active_lineages()).await
  }

  async fn children_of(&self, snapshot_id: Uuid) -> Result<Vec<Uuid>> {
    self.read(move |ledger| ledger.children_of(snapshot_id)).await
  }

  async fn ancestors_of(&self, snapshot_id: Uuid) -> Result<Vec<Snapshot>> {
    self
      .read(move |ledger| ledger.composite_ancestors(snapshot_id))
      .await
  }

  async fn to_flat(&self, snapshot_id: Uuid) -> Result<Option<Map<String, Value>>> {
    self
      .read(move |ledger| {
        let Some(snapshot) = ledger.snapshot(snapshot_id)? else {
          return Ok(None);
        };
        let lineage = ledger.lineage_of(snapshot_id)?;
        Ok(Some(flat::to_flat(&snapshot, lineage)))
      })
      .await
  }

  // ── Matching candidates ───────────────────────────────────────────────────

  async fn unmatched_candidates(&self, import_batch_id: Uuid) -> Result<Vec<CandidateFields>> {
    let batch = encode_uuid(import_batch_id);
    let snapshots = self
      .read(move |ledger| {
        ledger.query_snapshots(
          &format!(
            "SELECT {SNAPSHOT_COLUMNS}
             FROM snapshots s
             LEFT JOIN lineage_members m ON m.snapshot_id = s.snapshot_id
             WHERE s.import_batch_id = ?1
               AND s.source_kind IN ('composite_assessed', 'composite_portfolio')
               AND s.match_type IS NULL
               AND m.lineage_id IS NULL
             ORDER BY s.created_at"
          ),
          rusqlite::params![batch],
        )
      })
      .await?;
    Ok(snapshots.iter().map(CandidateFields::from).collect())
  }

  async fn canonical_candidates(&self, tenant_id: Uuid) -> Result<Vec<CandidateFields>> {
    let tenant = encode_uuid(tenant_id);
    let snapshots = self
      .read(move |ledger| {
        ledger.query_snapshots(
          &format!(
            "SELECT {SNAPSHOT_COLUMNS}
             FROM lineages l
             JOIN snapshots s ON s.snapshot_id = l.canonical_snapshot_id
             WHERE l.active = 1 AND s.tenant_id = ?1
             ORDER BY s.created_at"
          ),
          rusqlite::params![tenant],
        )
      })
      .await?;
    Ok(snapshots.iter().map(CandidateFields::from).collect())
  }

  // ── Column mappings ───────────────────────────────────────────────────────

  async fn remember_column_mapping(&self, mapping: ColumnMapping) -> Result<()> {
    mapping.validate()?;
    debug!(
      raw = %mapping.column_raw,
      mapped = %mapping.column_mapped,
      kind = mapping.source_kind.as_str(),
      "remembering column mapping"
    );

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO column_mappings (tenant_id, column_raw, source_kind, column_mapped)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (tenant_id, column_raw, source_kind)
           DO UPDATE SET column_mapped = excluded.column_mapped",
          rusqlite::params![
            encode_uuid(mapping.tenant_id),
            mapping.column_raw,
            mapping.source_kind.as_str(),
            mapping.column_mapped,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn lookup_column_mapping(
    &self,
    tenant_id: Uuid,
    column_raw: &str,
    source_kind: SourceKind,
  ) -> Result<Option<String>> {
    let tenant = encode_uuid(tenant_id);
    let raw = column_raw.to_owned();
    let kind = source_kind.as_str();

    let mapped: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT column_mapped FROM column_mappings
               WHERE tenant_id = ?1 AND column_raw = ?2 AND source_kind = ?3",
              rusqlite::params![tenant, raw, kind],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(mapped)
  }

  async fn column_mappings(
    &self,
    tenant_id: Uuid,
    source_kind: SourceKind,
  ) -> Result<BTreeMap<String, String>> {
    let tenant = encode_uuid(tenant_id);
    let kind = source_kind.as_str();

    let pairs: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT column_raw, column_mapped FROM column_mappings
           WHERE tenant_id = ?1 AND source_kind = ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![tenant, kind], |r| {
          Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
      })
      .await?;
    Ok(pairs.into_iter().collect())
  }
}
