//! Storage module for the catalog store
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Paged package identifier lookup
//! - Proxy endpoint lookup by validator tag
//! - Append-only download status history
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use std::sync::{Arc, Mutex, MutexGuard};

/// A store shared between the crawl workers
pub type SharedStorage<S> = Arc<Mutex<S>>;

/// Locks a shared store, mapping a poisoned mutex to a storage error
pub fn lock_storage<S: Storage>(storage: &SharedStorage<S>) -> StorageResult<MutexGuard<'_, S>> {
    storage.lock().map_err(|_| StorageError::Poisoned)
}

/// Opaque download status flag
///
/// The store owns the meaning of the values. The crawler only distinguishes
/// "no record" ([`DownloadFlag::UNKNOWN`]) from the default carried by a
/// freshly collected record ([`DownloadFlag::NEW`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadFlag(pub i64);

impl DownloadFlag {
    /// Sentinel reported when a pair has no history
    pub const UNKNOWN: Self = Self(-1);

    /// Store default for a newly written record
    pub const NEW: Self = Self(0);
}

/// One row of download status history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadStatusRecord {
    pub distribution_id: i64,
    pub package_name: String,
    pub version_code: String,
    pub download_url: String,
    pub download_flag: DownloadFlag,
    pub collected_at: String,
}

/// Result of a current-status lookup for a (package, version) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLookup {
    /// No record has ever been written for the pair
    NotFound,

    /// The newest record for the pair
    Found {
        download_flag: DownloadFlag,
        collected_at: String,
        distribution_id: i64,
    },
}

impl StatusLookup {
    /// Flag of the current record, or [`DownloadFlag::UNKNOWN`] without history
    pub fn download_flag(&self) -> DownloadFlag {
        match self {
            Self::NotFound => DownloadFlag::UNKNOWN,
            Self::Found { download_flag, .. } => *download_flag,
        }
    }

    /// Distribution id of the current record, if any
    pub fn distribution_id(&self) -> Option<i64> {
        match self {
            Self::NotFound => None,
            Self::Found {
                distribution_id, ..
            } => Some(*distribution_id),
        }
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub resolved_count: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Row counts across the catalog tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    pub packages: u64,
    pub proxies: u64,
    pub status_records: u64,
    pub distinct_versions: u64,
    pub runs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_not_found_reports_unknown_flag() {
        let lookup = StatusLookup::NotFound;
        assert_eq!(lookup.download_flag(), DownloadFlag::UNKNOWN);
        assert_eq!(lookup.distribution_id(), None);
    }

    #[test]
    fn test_found_reports_record_fields() {
        let lookup = StatusLookup::Found {
            download_flag: DownloadFlag(2),
            collected_at: "2024-01-01T00:00:00+00:00".to_string(),
            distribution_id: 7,
        };
        assert_eq!(lookup.download_flag(), DownloadFlag(2));
        assert_eq!(lookup.distribution_id(), Some(7));
    }
}
