//! Redirect resolution
//!
//! A probe is a HEAD request against `<download-base>/<package id>`. The
//! market answers with a redirect to the current binary, whose file name
//! carries the package name and version code.

use crate::crawler::transport::{ProbeResponse, Transport};
use crate::proxy::ProxyEndpoint;
use crate::url::{build_download_url, normalize_location, parse_package_file};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Status codes accepted as a terminal redirect
pub const REDIRECT_STATUSES: [u16; 4] = [301, 302, 303, 307];

/// The (package, version, URL) triple read from a redirect target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub package_name: String,
    pub version_code: String,
    pub download_url: String,
}

/// Every way a single probe can end without a resolved item
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("DNS lookup failed for {url}: {message}")]
    DnsFailure { url: String, message: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP error for {url}: {message}")]
    OtherHttpError {
        url: String,
        response_url: Option<String>,
        message: String,
    },

    #[error("No redirect from {url} (HTTP {status})")]
    NonRedirect { url: String, status: u16 },

    #[error("Malformed redirect target from {url}: {reason}")]
    ParseFailure { url: String, reason: String },
}

impl ProbeError {
    /// Returns true for failures raised by the transport itself
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::DnsFailure { .. } | Self::Timeout { .. } | Self::OtherHttpError { .. }
        )
    }
}

/// Issues probes and turns responses into [`ResolvedItem`]s
pub struct RedirectResolver {
    transport: Arc<dyn Transport>,
    download_base: String,
}

impl RedirectResolver {
    pub fn new(transport: Arc<dyn Transport>, download_base: impl Into<String>) -> Self {
        Self {
            transport,
            download_base: download_base.into(),
        }
    }

    /// Probes one package identifier
    ///
    /// # Arguments
    ///
    /// * `package_id` - Catalog identifier appended to the download base
    /// * `proxy` - Optional egress proxy for this request
    ///
    /// # Returns
    ///
    /// * `Ok(ResolvedItem)` - The market redirected to a parsable binary URL
    /// * `Err(ProbeError)` - Any other outcome, classified
    pub async fn probe(
        &self,
        package_id: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<ResolvedItem, ProbeError> {
        let url = build_download_url(&self.download_base, package_id).map_err(|e| {
            ProbeError::OtherHttpError {
                url: format!("{}/{}", self.download_base, package_id),
                response_url: None,
                message: e.to_string(),
            }
        })?;

        let response = self.transport.head(&url, proxy).await?;
        resolve_response(&url, &response)
    }
}

/// Classifies a probe response and extracts the resolved item
///
/// Relative `Location` values are resolved against the URL the response
/// came from.
pub fn resolve_response(request_url: &Url, response: &ProbeResponse) -> Result<ResolvedItem, ProbeError> {
    if !REDIRECT_STATUSES.contains(&response.status) {
        return Err(ProbeError::NonRedirect {
            url: request_url.to_string(),
            status: response.status,
        });
    }

    let parse_failure = |reason: String| ProbeError::ParseFailure {
        url: request_url.to_string(),
        reason,
    };

    let location = response
        .location
        .as_deref()
        .ok_or_else(|| parse_failure("missing Location header".to_string()))?;

    let target = normalize_location(&response.url, location).map_err(|e| parse_failure(e.to_string()))?;
    let (package_name, version_code) =
        parse_package_file(&target).map_err(|e| parse_failure(e.to_string()))?;

    Ok(ResolvedItem {
        package_name,
        version_code,
        download_url: target.to_string(),
    })
}
