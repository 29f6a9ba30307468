//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that ties the pieces together:
//! - Recording the run in the store
//! - Pulling identifier pages from the enumerator
//! - Filtering out identifiers that need no probe
//! - Fanning probes out through the resolver with rotated proxies
//! - Appending resolved items to the download status history

use crate::config::Config;
use crate::crawler::enumerator::{should_probe, PackageEnumerator, Page};
use crate::crawler::pacer::Pacer;
use crate::crawler::resolver::{ProbeError, RedirectResolver, ResolvedItem};
use crate::crawler::transport::{ClientSettings, HttpTransport, Transport};
use crate::proxy::ProxyCache;
use crate::storage::{lock_storage, RunStatus, SharedStorage, SqliteStorage, Storage};
use crate::CrawlError;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Counters describing one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Store ID of the run
    pub run_id: i64,

    /// Non-empty pages processed
    pub pages: u64,

    /// Identifiers seen across those pages
    pub identifiers: u64,

    /// Identifiers filtered out without a probe
    pub skipped: u64,

    /// Probes that completed, whatever their outcome
    pub probed: u64,

    /// Probes that produced a written status record
    pub resolved: u64,

    pub no_redirect: u64,
    pub parse_failures: u64,
    pub transport_failures: u64,

    /// Identifiers left unprobed because the run was cancelled
    pub cancelled: u64,
}

enum Outcome {
    Cancelled,
    Probed(Result<ResolvedItem, ProbeError>),
}

/// Main crawler coordinator structure
pub struct Coordinator<S: Storage> {
    config: Config,
    storage: SharedStorage<S>,
    proxies: ProxyCache<S>,
    resolver: RedirectResolver,
    pacer: Option<Pacer>,
    config_hash: String,
    cancel: CancellationToken,
}

impl Coordinator<SqliteStorage> {
    /// Creates a coordinator backed by the configured SQLite store and HTTP transport
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, recorded on the run
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - Failed to open the store or build the HTTP client
    pub fn new(config: Config, config_hash: impl Into<String>) -> Result<Self, CrawlError> {
        let storage = SqliteStorage::new(
            Path::new(&config.output.database_path),
            Duration::from_secs(config.output.store_timeout_secs),
        )?;
        let transport = HttpTransport::new(ClientSettings::from_config(
            &config.crawler,
            &config.user_agent,
        ))?;

        Ok(Self::with_parts(
            config,
            Arc::new(Mutex::new(storage)),
            Arc::new(transport),
            config_hash,
        ))
    }
}

impl<S: Storage> Coordinator<S> {
    /// Creates a coordinator from an existing store and transport
    pub fn with_parts(
        config: Config,
        storage: SharedStorage<S>,
        transport: Arc<dyn Transport>,
        config_hash: impl Into<String>,
    ) -> Self {
        let proxies = ProxyCache::new(
            Arc::clone(&storage),
            Duration::from_secs(config.proxy.ttl_secs),
        );
        let resolver = RedirectResolver::new(transport, config.market.download_base.clone());
        let pacer = (config.crawler.download_delay_ms > 0)
            .then(|| Pacer::new(Duration::from_millis(config.crawler.download_delay_ms)));

        Self {
            config,
            storage,
            proxies,
            resolver,
            pacer,
            config_hash: config_hash.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the run from issuing new probes once cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Handle to the underlying store
    pub fn storage(&self) -> SharedStorage<S> {
        Arc::clone(&self.storage)
    }

    /// Runs one incremental update crawl
    ///
    /// Walks the catalog until the enumerator reports it exhausted or the run
    /// is cancelled. Per-item failures are counted and logged; only store
    /// failures while enumerating or writing abort the run. The run row ends
    /// up `completed`, `interrupted` or `failed` accordingly.
    pub async fn run(&self) -> Result<RunSummary, CrawlError> {
        let run_id = lock_storage(&self.storage)?.create_run(&self.config_hash)?;
        let market = &self.config.market;
        tracing::info!(
            "Starting run {} for {} via {}",
            run_id,
            market.name,
            market.download_base
        );

        let mut summary = RunSummary {
            run_id,
            ..RunSummary::default()
        };
        let start_time = Instant::now();

        let result = self.crawl_pages(&mut summary).await;

        let status = match &result {
            Err(_) => RunStatus::Failed,
            Ok(()) if self.cancel.is_cancelled() => RunStatus::Interrupted,
            Ok(()) => RunStatus::Completed,
        };
        let finished = lock_storage(&self.storage)
            .and_then(|mut storage| storage.finish_run(run_id, status, summary.resolved));

        match (result, finished) {
            (Ok(()), Ok(())) => {
                tracing::info!(
                    "Run {} {}: {} resolved from {} probes over {} pages in {:?}",
                    run_id,
                    status.to_db_string(),
                    summary.resolved,
                    summary.probed,
                    summary.pages,
                    start_time.elapsed()
                );
                Ok(summary)
            }
            (Ok(()), Err(e)) => Err(e.into()),
            (Err(e), finished) => {
                if let Err(finish_error) = finished {
                    tracing::warn!("Could not mark run {} as failed: {}", run_id, finish_error);
                }
                tracing::error!("Run {} failed: {}", run_id, e);
                Err(e)
            }
        }
    }

    async fn crawl_pages(&self, summary: &mut RunSummary) -> Result<(), CrawlError> {
        let crawler = &self.config.crawler;
        let mut enumerator =
            PackageEnumerator::new(u64::from(crawler.page_size), crawler.max_empty_pages);

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Cancellation requested, not fetching further pages");
                break;
            }

            let page = {
                let storage = lock_storage(&self.storage)?;
                enumerator.next_page(&*storage)?
            };

            let Some(page) = page else {
                tracing::info!(
                    "Catalog exhausted after {} page requests",
                    enumerator.pages_requested()
                );
                break;
            };

            self.process_page(page, summary).await?;
        }

        Ok(())
    }

    async fn process_page(&self, page: Page, summary: &mut RunSummary) -> Result<(), CrawlError> {
        let crawler = &self.config.crawler;
        let Page {
            index,
            offset,
            identifiers,
        } = page;

        summary.pages += 1;
        summary.identifiers += identifiers.len() as u64;

        let (candidates, skipped): (Vec<String>, Vec<String>) = identifiers
            .into_iter()
            .partition(|id| should_probe(id, &crawler.skip_extensions));
        for id in &skipped {
            tracing::debug!("Skipping {:?}: already a resolved file name", id);
        }
        summary.skipped += skipped.len() as u64;

        tracing::info!(
            "Page {} (offset {}): probing {} identifiers, {} skipped",
            index,
            offset,
            candidates.len(),
            skipped.len()
        );

        let mut outcomes = stream::iter(candidates.iter())
            .map(|id| self.probe_one(id))
            .buffer_unordered(crawler.concurrency as usize);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Outcome::Cancelled => summary.cancelled += 1,
                Outcome::Probed(Ok(item)) => {
                    summary.probed += 1;
                    self.persist(&item)?;
                    summary.resolved += 1;
                }
                Outcome::Probed(Err(error)) => {
                    summary.probed += 1;
                    record_failure(&error, summary);
                }
            }
        }

        Ok(())
    }

    async fn probe_one(&self, package_id: &str) -> Outcome {
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        if let Some(pacer) = &self.pacer {
            tokio::select! {
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                _ = pacer.wait() => {}
            }
        }

        let market = &self.config.market;
        let proxies = if market.use_proxies {
            self.proxies.get_active_proxies(market.validator_tag())
        } else {
            Arc::default()
        };
        let proxy = self.proxies.pick(&proxies);

        tracing::debug!(
            "Probing {} via {}",
            package_id,
            proxy.map(|p| p.address.as_str()).unwrap_or("direct")
        );

        Outcome::Probed(self.resolver.probe(package_id, proxy).await)
    }

    fn persist(&self, item: &ResolvedItem) -> Result<(), CrawlError> {
        let record = lock_storage(&self.storage)?.write(item)?;
        tracing::debug!(
            "Recorded {} version {} as distribution {}",
            record.package_name,
            record.version_code,
            record.distribution_id
        );
        Ok(())
    }
}

/// Logs and counts a probe that produced no item
fn record_failure(error: &ProbeError, summary: &mut RunSummary) {
    match error {
        ProbeError::NonRedirect { url, status } => {
            summary.no_redirect += 1;
            tracing::info!("No redirect from {} (HTTP {})", url, status);
        }
        ProbeError::ParseFailure { url, reason } => {
            summary.parse_failures += 1;
            tracing::debug!("Dropping redirect from {}: {}", url, reason);
        }
        ProbeError::DnsFailure { url, message } => {
            summary.transport_failures += 1;
            tracing::error!("DNS lookup failed on {}: {}", url, message);
        }
        ProbeError::Timeout { url } => {
            summary.transport_failures += 1;
            tracing::error!("Timeout on {}", url);
        }
        ProbeError::OtherHttpError {
            url,
            response_url,
            message,
        } => {
            summary.transport_failures += 1;
            tracing::error!(
                "HTTP error on {} (request {}): {}",
                response_url.as_deref().unwrap_or(url),
                url,
                message
            );
        }
    }
}
