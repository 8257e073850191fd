//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Tenants: registered sources and the state of their index
CREATE TABLE IF NOT EXISTS tenants (
    tenant_id TEXT PRIMARY KEY,
    database_name TEXT NOT NULL,
    dialect TEXT NOT NULL,
    location TEXT NOT NULL,
    schema_fingerprint TEXT NOT NULL,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Registration runs: history of index rebuilds (tenants and the example corpus)
CREATE TABLE IF NOT EXISTS registration_runs (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    operation TEXT NOT NULL DEFAULT 'register',
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    chunks_indexed INTEGER DEFAULT 0,
    schema_changed INTEGER,
    error_text TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_tenant ON registration_runs(tenant_id);
CREATE INDEX IF NOT EXISTS idx_runs_started ON registration_runs(started_at);
"#;
