use serde::Deserialize;

/// Main configuration structure for Market-Refresh
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub market: MarketConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawl loop configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of package identifiers requested per catalog page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Consecutive empty pages that end a run
    #[serde(rename = "max-empty-pages")]
    pub max_empty_pages: u32,

    /// Maximum number of probes in flight at once
    pub concurrency: u32,

    /// Whole-request timeout for a single probe (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Minimum spacing between probe starts across all workers (milliseconds)
    #[serde(rename = "download-delay-ms")]
    pub download_delay_ms: u64,

    /// Identifiers containing any of these are treated as already resolved
    #[serde(rename = "skip-extensions")]
    pub skip_extensions: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            page_size: 5000,
            max_empty_pages: 3,
            concurrency: 16,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            download_delay_ms: 0,
            skip_extensions: vec![".apk".to_string()],
        }
    }
}

/// Target market configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Market name, used in logs and as the default validator tag
    pub name: String,

    /// Base URL the package identifier is appended to
    #[serde(rename = "download-base")]
    pub download_base: String,

    /// Validator tag selecting proxies vetted for this market
    #[serde(default)]
    pub validator: Option<String>,

    /// Route probes through the proxy pool
    #[serde(rename = "use-proxies", default = "default_use_proxies")]
    pub use_proxies: bool,
}

impl MarketConfig {
    /// Returns the validator tag, falling back to the market name
    pub fn validator_tag(&self) -> &str {
        self.validator.as_deref().unwrap_or(&self.name)
    }
}

fn default_use_proxies() -> bool {
    true
}

/// Proxy pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// How long a fetched proxy set stays fresh (seconds)
    #[serde(rename = "ttl-secs")]
    pub ttl_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Formats the header value: `CrawlerName/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite catalog database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// How long a store call may wait on a locked database (seconds)
    #[serde(rename = "store-timeout-secs", default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

fn default_store_timeout() -> u64 {
    30
}
