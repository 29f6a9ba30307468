//! Storage traits and error types
//!
//! This module defines the catalog store interface consumed by the crawl
//! loop and its associated error types.

use crate::crawler::ResolvedItem;
use crate::proxy::ProxyEndpoint;
use crate::storage::{DownloadStatusRecord, RunRecord, RunStatus, StatusLookup, StoreStatistics};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for catalog store implementations
///
/// Covers everything the crawl loop reads from or writes to the store:
/// paged package lookup, proxy lookup, download status history, and run
/// bookkeeping. Implementations are shared between workers behind a mutex,
/// so they only need to be `Send`.
pub trait Storage: Send {
    // ===== Run Management =====

    /// Creates a new crawl run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with a final status and resolved item count
    fn finish_run(&mut self, run_id: i64, status: RunStatus, resolved_count: u64)
        -> StorageResult<()>;

    // ===== Catalog =====

    /// Returns one page of distinct package identifiers
    ///
    /// Entries are non-null, non-empty, deduplicated and returned in a stable
    /// order so consecutive offsets walk the catalog without overlap. A `limit`
    /// of 0 returns every identifier from `offset` onward.
    fn query_packages(&self, offset: u64, limit: u64) -> StorageResult<Vec<String>>;

    /// Records a package identifier in the catalog
    fn insert_package(&mut self, app_id: &str) -> StorageResult<()>;

    // ===== Proxies =====

    /// Returns every proxy endpoint vetted for `validator`
    fn query_proxies(&self, validator: &str) -> StorageResult<Vec<ProxyEndpoint>>;

    /// Adds a proxy endpoint; re-adding an existing endpoint is a no-op
    fn insert_proxy(&mut self, endpoint: &ProxyEndpoint) -> StorageResult<()>;

    // ===== Download Status =====

    /// Returns the current status of a (package, version) pair
    ///
    /// The current status is the record with the highest `distribution_id`.
    /// A pair with no records yields [`StatusLookup::NotFound`].
    fn query_status(&self, package_name: &str, version_code: &str) -> StorageResult<StatusLookup>;

    /// Returns the newest `distribution_id` recorded for a pair, if any
    fn query_latest_distribution_id(
        &self,
        package_name: &str,
        version_code: &str,
    ) -> StorageResult<Option<i64>>;

    /// Appends a new status record for a resolved item
    ///
    /// The `distribution_id` is assigned by the store, increases monotonically
    /// and is never reused. Earlier records are left untouched.
    fn write(&mut self, item: &ResolvedItem) -> StorageResult<DownloadStatusRecord>;

    /// Returns the full history for a pair, newest first
    fn status_history(
        &self,
        package_name: &str,
        version_code: &str,
    ) -> StorageResult<Vec<DownloadStatusRecord>>;

    // ===== Statistics =====

    /// Gets row counts for the catalog tables
    fn statistics(&self) -> StorageResult<StoreStatistics>;
}
