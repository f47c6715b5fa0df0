//! SQL schema for the Cornerstone SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Snapshots are immutable. Rows are only ever inserted, or deleted by an
-- unmerge.
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id      TEXT PRIMARY KEY,
    created_at       TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    source_kind      TEXT NOT NULL,
    origin           TEXT NOT NULL,   -- JSON-encoded Origin
    tenant_id        TEXT,
    import_batch_id  TEXT,
    match_type       TEXT,
    confidence       REAL,
    last_modified_by TEXT,
    attributes       TEXT NOT NULL DEFAULT '{}',  -- attribute -> {value, source}
    extra_data       TEXT NOT NULL DEFAULT '{}'   -- key -> {value, source}
);

-- Parent edges, mirrored from `origin` for child lookups. Insertion order
-- (rowid) is creation order.
CREATE TABLE IF NOT EXISTS snapshot_edges (
    parent_id TEXT NOT NULL REFERENCES snapshots(snapshot_id) ON DELETE CASCADE,
    child_id  TEXT NOT NULL REFERENCES snapshots(snapshot_id) ON DELETE CASCADE,
    position  INTEGER NOT NULL,       -- 0 = left (or only) parent, 1 = right
    PRIMARY KEY (child_id, position),
    CHECK (parent_id != child_id)
);

CREATE TABLE IF NOT EXISTS snapshot_meters (
    snapshot_id TEXT NOT NULL REFERENCES snapshots(snapshot_id) ON DELETE CASCADE,
    meter_id    TEXT NOT NULL,
    PRIMARY KEY (snapshot_id, meter_id)
);

-- One row per building lineage. Never deleted; absorbed lineages are
-- deactivated.
CREATE TABLE IF NOT EXISTS lineages (
    lineage_id            TEXT PRIMARY KEY,
    created_at            TEXT NOT NULL,
    canonical_snapshot_id TEXT REFERENCES snapshots(snapshot_id) ON DELETE SET NULL,
    active                INTEGER NOT NULL DEFAULT 1
);

-- snapshot -> owning lineage.
CREATE TABLE IF NOT EXISTS lineage_members (
    snapshot_id TEXT PRIMARY KEY REFERENCES snapshots(snapshot_id) ON DELETE CASCADE,
    lineage_id  TEXT NOT NULL REFERENCES lineages(lineage_id)
);

CREATE TABLE IF NOT EXISTS column_mappings (
    tenant_id     TEXT NOT NULL,
    column_raw    TEXT NOT NULL,
    source_kind   TEXT NOT NULL,
    column_mapped TEXT NOT NULL,
    UNIQUE (tenant_id, column_raw, source_kind)
);

-- At most one active lineage presents any snapshot.
CREATE UNIQUE INDEX IF NOT EXISTS lineages_active_canonical_idx
    ON lineages(canonical_snapshot_id) WHERE active = 1;

CREATE INDEX IF NOT EXISTS edges_parent_idx      ON snapshot_edges(parent_id);
CREATE INDEX IF NOT EXISTS members_lineage_idx   ON lineage_members(lineage_id);
CREATE INDEX IF NOT EXISTS snapshots_batch_idx   ON snapshots(import_batch_id);
CREATE INDEX IF NOT EXISTS snapshots_tenant_idx  ON snapshots(tenant_id);

PRAGMA user_version = 1;
";
