//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::ResolvedItem;
use crate::proxy::ProxyEndpoint;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    DownloadFlag, DownloadStatusRecord, RunRecord, RunStatus, StatusLookup, StoreStatistics,
};
use crate::CrawlError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `busy_timeout` - How long a statement waits on a locked database
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn new(path: &Path, busy_timeout: Duration) -> Result<Self, CrawlError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(busy_timeout)?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, CrawlError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        resolved_count: row.get::<_, i64>(5)? as u64,
    })
}

fn status_from_row(row: &Row<'_>) -> rusqlite::Result<DownloadStatusRecord> {
    Ok(DownloadStatusRecord {
        distribution_id: row.get(0)?,
        package_name: row.get(1)?,
        version_code: row.get(2)?,
        download_url: row.get(3)?,
        download_flag: DownloadFlag(row.get(4)?),
        collected_at: row.get(5)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, resolved_count
                 FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, resolved_count
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        resolved_count: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, resolved_count = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, resolved_count as i64, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Catalog =====

    fn query_packages(&self, offset: u64, limit: u64) -> StorageResult<Vec<String>> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = if limit == 0 { -1 } else { limit as i64 };
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT app_id FROM packages
             WHERE app_id IS NOT NULL AND app_id != ''
             ORDER BY app_id LIMIT ?1 OFFSET ?2",
        )?;

        let packages = stmt
            .query_map(params![limit, offset as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(packages)
    }

    fn insert_package(&mut self, app_id: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO packages (app_id, discovered_at) VALUES (?1, ?2)",
            params![app_id, now],
        )?;
        Ok(())
    }

    // ===== Proxies =====

    fn query_proxies(&self, validator: &str) -> StorageResult<Vec<ProxyEndpoint>> {
        let mut stmt = self
            .conn
            .prepare("SELECT address, validator FROM proxies WHERE validator = ?1 ORDER BY id")?;

        let proxies = stmt
            .query_map(params![validator], |row| {
                Ok(ProxyEndpoint {
                    address: row.get(0)?,
                    validator: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(proxies)
    }

    fn insert_proxy(&mut self, endpoint: &ProxyEndpoint) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO proxies (address, validator) VALUES (?1, ?2)",
            params![endpoint.address, endpoint.validator],
        )?;
        Ok(())
    }

    // ===== Download Status =====

    fn query_status(&self, package_name: &str, version_code: &str) -> StorageResult<StatusLookup> {
        let status = self
            .conn
            .query_row(
                "SELECT download_flag, collected_at, distribution_id FROM download_status
                 WHERE package_name = ?1 AND version_code = ?2
                 ORDER BY distribution_id DESC LIMIT 1",
                params![package_name, version_code],
                |row| {
                    Ok(StatusLookup::Found {
                        download_flag: DownloadFlag(row.get(0)?),
                        collected_at: row.get(1)?,
                        distribution_id: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(status.unwrap_or(StatusLookup::NotFound))
    }

    fn query_latest_distribution_id(
        &self,
        package_name: &str,
        version_code: &str,
    ) -> StorageResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT MAX(distribution_id) FROM download_status
                 WHERE package_name = ?1 AND version_code = ?2",
                params![package_name, version_code],
                |row| row.get::<_, Option<i64>>(0),
            )?;
        Ok(id)
    }

    fn write(&mut self, item: &ResolvedItem) -> StorageResult<DownloadStatusRecord> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO download_status
             (package_name, version_code, download_url, download_flag, collected_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.package_name,
                item.version_code,
                item.download_url,
                DownloadFlag::NEW.0,
                now
            ],
        )?;

        Ok(DownloadStatusRecord {
            distribution_id: self.conn.last_insert_rowid(),
            package_name: item.package_name.clone(),
            version_code: item.version_code.clone(),
            download_url: item.download_url.clone(),
            download_flag: DownloadFlag::NEW,
            collected_at: now,
        })
    }

    fn status_history(
        &self,
        package_name: &str,
        version_code: &str,
    ) -> StorageResult<Vec<DownloadStatusRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT distribution_id, package_name, version_code, download_url, download_flag,
             collected_at FROM download_status
             WHERE package_name = ?1 AND version_code = ?2
             ORDER BY distribution_id DESC",
        )?;

        let records = stmt
            .query_map(params![package_name, version_code], status_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== Statistics =====

    fn statistics(&self) -> StorageResult<StoreStatistics> {
        let count = |sql: &str| -> StorageResult<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(StoreStatistics {
            packages: count(
                "SELECT COUNT(DISTINCT app_id) FROM packages
                 WHERE app_id IS NOT NULL AND app_id != ''",
            )?,
            proxies: count("SELECT COUNT(*) FROM proxies")?,
            status_records: count("SELECT COUNT(*) FROM download_status")?,
            distinct_versions: count(
                "SELECT COUNT(*) FROM
                 (SELECT DISTINCT package_name, version_code FROM download_status)",
            )?,
            runs: count("SELECT COUNT(*) FROM runs")?,
        })
    }
}
