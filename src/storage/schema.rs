//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Market-Refresh catalog.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    resolved_count INTEGER NOT NULL DEFAULT 0
);

-- Package identifiers harvested by earlier catalog crawls
CREATE TABLE IF NOT EXISTS packages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id TEXT,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_packages_app_id ON packages(app_id);

-- Egress proxies, tagged with the market they were vetted against
CREATE TABLE IF NOT EXISTS proxies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,
    validator TEXT NOT NULL,
    UNIQUE(address, validator)
);

CREATE INDEX IF NOT EXISTS idx_proxies_validator ON proxies(validator);

-- Append-only download status history; the newest distribution_id wins
CREATE TABLE IF NOT EXISTS download_status (
    distribution_id INTEGER PRIMARY KEY AUTOINCREMENT,
    package_name TEXT NOT NULL,
    version_code TEXT NOT NULL,
    download_url TEXT NOT NULL,
    download_flag INTEGER NOT NULL DEFAULT 0,
    collected_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_download_status_pair
    ON download_status(package_name, version_code, distribution_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
