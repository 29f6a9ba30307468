//! Crawler module for the incremental update crawl
//!
//! This module contains the core crawling logic, including:
//! - Paged enumeration of known package identifiers
//! - HEAD probes over a pluggable transport
//! - Redirect classification and file name parsing
//! - Request pacing
//! - Overall crawl coordination

mod coordinator;
mod enumerator;
mod pacer;
mod resolver;
mod transport;

pub use coordinator::{Coordinator, RunSummary};
pub use enumerator::{should_probe, PackageEnumerator, Page, PageSource};
pub use pacer::Pacer;
pub use resolver::{resolve_response, ProbeError, RedirectResolver, ResolvedItem, REDIRECT_STATUSES};
pub use transport::{
    build_http_client, classify_error, ClientSettings, HttpTransport, ProbeResponse, Transport,
};

use crate::config::{load_config_with_hash, Config};
use crate::CrawlError;
use std::path::Path;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the catalog store
/// 2. Build the HTTP transport
/// 3. Record a new run
/// 4. Probe every known package and record resolved downloads
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, recorded on the run
///
/// # Returns
///
/// * `Ok(RunSummary)` - Crawl finished, possibly with per-item failures
/// * `Err(CrawlError)` - Crawl aborted
pub async fn crawl(config: Config, config_hash: &str) -> Result<RunSummary, CrawlError> {
    Coordinator::new(config, config_hash)?.run().await
}

/// Loads a config file and runs a crawl with it, recording the file's hash
pub async fn crawl_config_file(path: &Path) -> Result<RunSummary, CrawlError> {
    let (config, config_hash) = load_config_with_hash(path)?;
    crawl(config, &config_hash).await
}
