//! SQLite schema and migrations for the knowledge store.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // Enable WAL mode for better concurrent access
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Enable foreign keys
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version = get_schema_version(conn).unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

/// Apply version 1 schema.
fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            concept TEXT NOT NULL,
            content TEXT NOT NULL,
            confidence REAL NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0,
            last_accessed TEXT NOT NULL,
            created_at TEXT NOT NULL,
            knowledge_type TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        )",
        [],
    )?;

    // Both endpoints must exist before an edge is committed
    conn.execute(
        "CREATE TABLE IF NOT EXISTS edges (
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            connection_type TEXT NOT NULL,
            strength REAL NOT NULL,
            evidence TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_reinforced TEXT NOT NULL,
            PRIMARY KEY (source_id, target_id),
            FOREIGN KEY (source_id) REFERENCES nodes(id) ON DELETE CASCADE,
            FOREIGN KEY (target_id) REFERENCES nodes(id) ON DELETE CASCADE
        )",
        [],
    )?;

    // Audit log for archived nodes
    conn.execute(
        "CREATE TABLE IF NOT EXISTS forgetting_events (
            node_id TEXT NOT NULL,
            forgotten_at TEXT NOT NULL,
            reason TEXT NOT NULL,
            recovery_snapshot TEXT NOT NULL,
            PRIMARY KEY (node_id, forgotten_at)
        )",
        [],
    )?;

    // Usage state owned by the decay manager, one row per node
    conn.execute(
        "CREATE TABLE IF NOT EXISTS memory_usage (
            node_id TEXT PRIMARY KEY,
            access_count INTEGER NOT NULL DEFAULT 0,
            last_access TEXT NOT NULL,
            importance_score REAL NOT NULL,
            retention_priority INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    // Single-row table holding the last known tuning
    conn.execute(
        "CREATE TABLE IF NOT EXISTS learning_parameters (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            learning_rate REAL NOT NULL,
            confidence_threshold REAL NOT NULL,
            connection_threshold REAL NOT NULL,
            forgetting_rate REAL NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Indexes for common queries
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_nodes_concept ON nodes(concept)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(knowledge_type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_usage_priority ON memory_usage(retention_priority)",
        [],
    )?;

    // Record migration
    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='nodes'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}
