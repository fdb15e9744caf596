//! SQLite schema definition.

/// Complete schema for the SQLite key-value store.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- String entries (cached pages, label documents, mapping records, title index)
-- ============================================================================

CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER                            -- unix millis, NULL = never
);

CREATE INDEX IF NOT EXISTS idx_kv_entries_expires_at ON kv_entries(expires_at);

-- ============================================================================
-- Sets (membership index; never expire)
-- ============================================================================

CREATE TABLE IF NOT EXISTS kv_set_members (
    set_key TEXT NOT NULL,
    member TEXT NOT NULL,
    PRIMARY KEY (set_key, member)
);
"#;
