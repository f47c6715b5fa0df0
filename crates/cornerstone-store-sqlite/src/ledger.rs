//! [`SqliteLedger`]: the engine's [`Ledger`] over one SQLite connection.
//!
//! The store hands the engine a ledger borrowed from an open transaction, so
//! every statement issued here commits or rolls back together.

use std::collections::BTreeSet;

use cornerstone_core::{
  Error as CoreError, Result as CoreResult,
  ledger::Ledger,
  lineage::Lineage,
  snapshot::Snapshot,
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::encode::{
  LINEAGE_COLUMNS, RawLineage, RawSnapshot, SNAPSHOT_COLUMNS, decode_uuid, encode_dt, encode_uuid,
};

pub struct SqliteLedger<'c> {
  conn: &'c Connection,
}

impl<'c> SqliteLedger<'c> {
  pub fn new(conn: &'c Connection) -> Self { Self { conn } }

  /// Decode every snapshot a query returns. The query must select
  /// [`SNAPSHOT_COLUMNS`] from `snapshots s`.
  pub fn query_snapshots(
    &self,
    sql: &str,
    params: impl rusqlite::Params,
  ) -> CoreResult<Vec<Snapshot>> {
    let raws = (|| -> rusqlite::Result<Vec<RawSnapshot>> {
      let mut stmt = self.conn.prepare(sql)?;
      let rows = stmt.query_map(params, RawSnapshot::from_row)?;
      rows.collect::<rusqlite::Result<Vec<_>>>()
    })()
    .map_err(CoreError::backend)?;

    raws
      .into_iter()
      .map(|raw| {
        let meters = self.meters(&raw.snapshot_id)?;
        raw.into_snapshot(meters).map_err(CoreError::backend)
      })
      .collect()
  }

  pub fn active_lineages(&self) -> CoreResult<Vec<Lineage>> {
    let raws = (|| -> rusqlite::Result<Vec<RawLineage>> {
      let mut stmt = self.conn.prepare(&format!(
        "SELECT {LINEAGE_COLUMNS} FROM lineages WHERE active = 1 ORDER BY created_at"
      ))?;
      let rows = stmt.query_map([], RawLineage::from_row)?;
      rows.collect::<rusqlite::Result<Vec<_>>>()
    })()
    .map_err(CoreError::backend)?;

    raws
      .into_iter()
      .map(|raw| raw.into_lineage().map_err(CoreError::backend))
      .collect()
  }

  fn meters(&self, snapshot_id: &str) -> CoreResult<BTreeSet<Uuid>> {
    let ids = (|| -> rusqlite::Result<Vec<String>> {
      let mut stmt = self
        .conn
        .prepare("SELECT meter_id FROM snapshot_meters WHERE snapshot_id = ?1")?;
      let rows = stmt.query_map(params![snapshot_id], |r| r.get::<_, String>(0))?;
      rows.collect::<rusqlite::Result<Vec<_>>>()
    })()
    .map_err(CoreError::backend)?;

    ids
      .iter()
      .map(|s| decode_uuid(s).map_err(CoreError::backend))
      .collect()
  }

  fn single_uuid(&self, sql: &str, id: Uuid) -> CoreResult<Option<Uuid>> {
    let found: Option<String> = self
      .conn
      .query_row(sql, params![encode_uuid(id)], |r| r.get(0))
      .optional()
      .map_err(CoreError::backend)?;
    found
      .as_deref()
      .map(decode_uuid)
      .transpose()
      .map_err(CoreError::backend)
  }
}

impl Ledger for SqliteLedger<'_> {
  fn snapshot(&self, id: Uuid) -> CoreResult<Option<Snapshot>> {
    let mut found = self.query_snapshots(
      &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots s WHERE s.snapshot_id = ?1"),
      params![encode_uuid(id)],
    )?;
    Ok(found.pop())
  }

  fn insert_snapshot(&mut self, snapshot: &Snapshot) -> CoreResult<()> {
    let id = encode_uuid(snapshot.snapshot_id);
    let origin = serde_json::to_string(&snapshot.origin)?;
    let attributes = serde_json::to_string(&snapshot.attributes)?;
    let extra_data = serde_json::to_string(&snapshot.extra_data)?;

    (|| -> rusqlite::Result<()> {
      self.conn.execute(
        "INSERT INTO snapshots (
           snapshot_id, created_at, source_kind, origin, tenant_id, import_batch_id,
           match_type, confidence, last_modified_by, attributes, extra_data
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
          id,
          encode_dt(snapshot.created_at),
          snapshot.source_kind.as_str(),
          origin,
          snapshot.tenant_id.map(encode_uuid),
          snapshot.import_batch_id.map(encode_uuid),
          snapshot.match_type.map(|m| m.as_str()),
          snapshot.confidence,
          snapshot.last_modified_by,
          attributes,
          extra_data,
        ],
      )?;

      for (position, parent) in snapshot.origin.parents().into_iter().enumerate() {
        self.conn.execute(
          "INSERT INTO snapshot_edges (parent_id, child_id, position) VALUES (?1, ?2, ?3)",
          params![encode_uuid(parent), id, position as i64],
        )?;
      }

      for meter in &snapshot.meters {
        self.conn.execute(
          "INSERT INTO snapshot_meters (snapshot_id, meter_id) VALUES (?1, ?2)",
          params![id, encode_uuid(*meter)],
        )?;
      }
      Ok(())
    })()
    .map_err(CoreError::backend)
  }

  fn delete_snapshot(&mut self, id: Uuid) -> CoreResult<()> {
    // Edges, meters and membership cascade; canonical pointers are nulled.
    let deleted = self
      .conn
      .execute("DELETE FROM snapshots WHERE snapshot_id = ?1", params![encode_uuid(id)])
      .map_err(CoreError::backend)?;
    if deleted == 0 {
      return Err(CoreError::SnapshotNotFound(id));
    }
    Ok(())
  }

  fn children_of(&self, id: Uuid) -> CoreResult<Vec<Uuid>> {
    let ids = (|| -> rusqlite::Result<Vec<String>> {
      let mut stmt = self
        .conn
        .prepare("SELECT child_id FROM snapshot_edges WHERE parent_id = ?1 ORDER BY rowid")?;
      let rows = stmt.query_map(params![encode_uuid(id)], |r| r.get::<_, String>(0))?;
      rows.collect::<rusqlite::Result<Vec<_>>>()
    })()
    .map_err(CoreError::backend)?;

    ids
      .iter()
      .map(|s| decode_uuid(s).map_err(CoreError::backend))
      .collect()
  }

  fn lineage(&self, id: Uuid) -> CoreResult<Option<Lineage>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {LINEAGE_COLUMNS} FROM lineages WHERE lineage_id = ?1"),
        params![encode_uuid(id)],
        RawLineage::from_row,
      )
      .optional()
      .map_err(CoreError::backend)?;
    raw
      .map(RawLineage::into_lineage)
      .transpose()
      .map_err(CoreError::backend)
  }

  fn put_lineage(&mut self, lineage: &Lineage) -> CoreResult<()> {
    self
      .conn
      .execute(
        "INSERT INTO lineages (lineage_id, created_at, canonical_snapshot_id, active)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (lineage_id) DO UPDATE SET
           canonical_snapshot_id = excluded.canonical_snapshot_id,
           active                = excluded.active",
        params![
          encode_uuid(lineage.lineage_id),
          encode_dt(lineage.created_at),
          lineage.canonical_snapshot_id.map(encode_uuid),
          lineage.active,
        ],
      )
      .map_err(CoreError::backend)?;
    Ok(())
  }

  fn lineage_of(&self, snapshot_id: Uuid) -> CoreResult<Option<Uuid>> {
    self.single_uuid(
      "SELECT lineage_id FROM lineage_members WHERE snapshot_id = ?1",
      snapshot_id,
    )
  }

  fn assign_lineage(&mut self, snapshot_id: Uuid, lineage_id: Uuid) -> CoreResult<()> {
    self
      .conn
      .execute(
        "INSERT INTO lineage_members (snapshot_id, lineage_id) VALUES (?1, ?2)
         ON CONFLICT (snapshot_id) DO UPDATE SET lineage_id = excluded.lineage_id",
        params![encode_uuid(snapshot_id), encode_uuid(lineage_id)],
      )
      .map_err(CoreError::backend)?;
    Ok(())
  }

  fn active_lineage_for(&self, snapshot_id: Uuid) -> CoreResult<Option<Uuid>> {
    self.single_uuid(
      "SELECT lineage_id FROM lineages WHERE canonical_snapshot_id = ?1 AND active = 1",
      snapshot_id,
    )
  }
}
