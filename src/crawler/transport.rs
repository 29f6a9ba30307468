//! HTTP transport for download probes
//!
//! This module handles all network requests for the crawler, including:
//! - Building HTTP clients with the crawler's user agent
//! - Issuing HEAD probes with redirect following disabled
//! - Routing probes through an optional egress proxy
//! - Classifying transport failures

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::ProbeError;
use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::error::Error as _;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Status and headers of a completed probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    /// URL the response was received from
    pub url: Url,

    /// HTTP status code
    pub status: u16,

    /// Raw `Location` header value, if present
    pub location: Option<String>,
}

/// Issues non-body probe requests
///
/// Implementations must not follow redirects, consult robots policies or
/// retry on their own; a timed-out request surfaces as
/// [`ProbeError::Timeout`]. Only the `DnsFailure`, `Timeout` and
/// `OtherHttpError` variants are produced here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn head(&self, url: &Url, proxy: Option<&ProxyEndpoint>) -> Result<ProbeResponse, ProbeError>;
}

/// Settings shared by every client the transport builds
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl ClientSettings {
    pub fn from_config(crawler: &CrawlerConfig, user_agent: &UserAgentConfig) -> Self {
        Self {
            user_agent: user_agent.header_value(),
            timeout: Duration::from_secs(crawler.request_timeout_secs),
            connect_timeout: Duration::from_secs(crawler.connect_timeout_secs),
        }
    }
}

/// Builds an HTTP client for probing
///
/// Redirects are never followed, environment proxies are ignored, and the
/// only proxy used is the one passed in.
///
/// # Arguments
///
/// * `settings` - User agent and timeouts
/// * `proxy` - Optional proxy URL every request is routed through
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client or parse the proxy URL
///
/// # Example
///
/// ```no_run
/// use market_refresh::crawler::{build_http_client, ClientSettings};
/// use std::time::Duration;
///
/// let settings = ClientSettings {
///     user_agent: "MarketRefresh/1.0 (+https://example.com/about)".to_string(),
///     timeout: Duration::from_secs(30),
///     connect_timeout: Duration::from_secs(10),
/// };
///
/// let client = build_http_client(&settings, None).unwrap();
/// ```
pub fn build_http_client(settings: &ClientSettings, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.timeout)
        .connect_timeout(settings.connect_timeout)
        .redirect(Policy::none());

    let builder = match proxy {
        Some(address) => builder.proxy(Proxy::all(address)?),
        None => builder.no_proxy(),
    };

    builder.build()
}

/// reqwest-backed [`Transport`]
///
/// Keeps one client per proxy address so connection pools are reused
/// across probes routed through the same proxy.
pub struct HttpTransport {
    settings: ClientSettings,
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
}

impl HttpTransport {
    /// Creates a transport, building the direct (proxy-less) client eagerly
    pub fn new(settings: ClientSettings) -> Result<Self, reqwest::Error> {
        let direct = build_http_client(&settings, None)?;
        Ok(Self {
            settings,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Client, reqwest::Error> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        if let Ok(clients) = self.proxied.lock() {
            if let Some(client) = clients.get(&proxy.address) {
                return Ok(client.clone());
            }
        }

        let client = build_http_client(&self.settings, Some(&proxy.address))?;
        if let Ok(mut clients) = self.proxied.lock() {
            clients.insert(proxy.address.clone(), client.clone());
        }
        Ok(client)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn head(&self, url: &Url, proxy: Option<&ProxyEndpoint>) -> Result<ProbeResponse, ProbeError> {
        let client = self
            .client_for(proxy)
            .map_err(|e| classify_error(url.as_str(), &e))?;

        let response = client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| classify_error(url.as_str(), &e))?;

        let location = response
            .headers()
            .get(LOCATION)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

        Ok(ProbeResponse {
            url: response.url().clone(),
            status: response.status().as_u16(),
            location,
        })
    }
}

/// Maps a reqwest error onto the transport failure taxonomy
pub fn classify_error(url: &str, error: &reqwest::Error) -> ProbeError {
    if error.is_timeout() {
        return ProbeError::Timeout {
            url: url.to_string(),
        };
    }

    if is_dns_error(error) {
        return ProbeError::DnsFailure {
            url: url.to_string(),
            message: error.to_string(),
        };
    }

    ProbeError::OtherHttpError {
        url: url.to_string(),
        response_url: error.url().map(|u| u.to_string()),
        message: error.to_string(),
    }
}

/// Walks the error chain looking for a name resolution failure
fn is_dns_error(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        let message = cause.to_string().to_lowercase();
        if message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("no such host")
        {
            return true;
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_settings(timeout: Duration) -> ClientSettings {
        ClientSettings {
            user_agent: "TestCrawler/1.0 (+https://example.com/about)".to_string(),
            timeout,
            connect_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_build_http_client() {
        let settings = create_test_settings(Duration::from_secs(5));
        assert!(build_http_client(&settings, None).is_ok());
        assert!(build_http_client(&settings, Some("http://127.0.0.1:8080")).is_ok());
    }

    #[test]
    fn test_build_http_client_rejects_bad_proxy() {
        let settings = create_test_settings(Duration::from_secs(5));
        assert!(build_http_client(&settings, Some("not a proxy url")).is_err());
    }

    #[tokio::test]
    async fn test_head_does_not_follow_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/appdown/com.example.app"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "http://cdn.example.com/com.example.app_5.apk"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_test_settings(Duration::from_secs(5))).unwrap();
        let url = Url::parse(&format!("{}/appdown/com.example.app", server.uri())).unwrap();
        let response = transport.head(&url, None).await.unwrap();

        assert_eq!(response.status, 302);
        assert_eq!(
            response.location.as_deref(),
            Some("http://cdn.example.com/com.example.app_5.apk")
        );
    }

    #[tokio::test]
    async fn test_head_reports_plain_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_test_settings(Duration::from_secs(5))).unwrap();
        let url = Url::parse(&format!("{}/appdown/missing", server.uri())).unwrap();
        let response = transport.head(&url, None).await.unwrap();

        assert_eq!(response.status, 404);
        assert!(response.location.is_none());
    }

    #[tokio::test]
    async fn test_head_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(302).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(create_test_settings(Duration::from_millis(200))).unwrap();
        let url = Url::parse(&format!("{}/appdown/slow", server.uri())).unwrap();
        let result = transport.head(&url, None).await;

        assert!(matches!(result, Err(ProbeError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_head_connection_refused_is_other_error() {
        // Bind and drop a listener to get a port nothing is listening on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let transport = HttpTransport::new(create_test_settings(Duration::from_secs(5))).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{}/appdown/x", port)).unwrap();
        let result = transport.head(&url, None).await;

        assert!(matches!(result, Err(ProbeError::OtherHttpError { .. })));
    }

    #[tokio::test]
    async fn test_head_unresolvable_host_is_dns_failure() {
        let transport = HttpTransport::new(create_test_settings(Duration::from_secs(5))).unwrap();
        let url = Url::parse("http://market.invalid/appdown/x").unwrap();
        let result = transport.head(&url, None).await;

        match result {
            Err(ProbeError::DnsFailure { url, message }) => {
                assert_eq!(url, "http://market.invalid/appdown/x");
                assert!(!message.is_empty());
            }
            other => panic!("expected DnsFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_proxied_clients_are_cached() {
        let transport = HttpTransport::new(create_test_settings(Duration::from_secs(5))).unwrap();
        let proxy = ProxyEndpoint::new("http://127.0.0.1:9", "Market_Test");

        transport.client_for(Some(&proxy)).unwrap();
        transport.client_for(Some(&proxy)).unwrap();

        assert_eq!(transport.proxied.lock().unwrap().len(), 1);
    }
}
