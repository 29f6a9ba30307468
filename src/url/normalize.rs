use crate::UrlError;
use url::Url;

/// Builds the per-market download endpoint for a package identifier
///
/// The identifier is appended as the final path segment of `download_base`.
/// A trailing slash on the base is tolerated, and characters that are not
/// valid in a path segment are percent-encoded.
///
/// # Examples
///
/// ```
/// use market_refresh::url::build_download_url;
///
/// let url = build_download_url("http://apk.example.com/appdown/", "com.example.app").unwrap();
/// assert_eq!(url.as_str(), "http://apk.example.com/appdown/com.example.app");
/// ```
pub fn build_download_url(download_base: &str, package_id: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(download_base).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    url.path_segments_mut()
        .map_err(|_| UrlError::Parse(format!("Cannot be a base URL: {}", download_base)))?
        .pop_if_empty()
        .push(package_id);

    Ok(url)
}

/// Normalizes a `Location` header value into an absolute URL
///
/// Relative targets are resolved against the URL of the request that
/// produced the redirect. Parsing through [`Url`] percent-encodes any
/// unsafe characters in the target, and the fragment is dropped.
///
/// # Arguments
///
/// * `request_url` - The URL the probe was sent to
/// * `location` - The raw `Location` header value
///
/// # Returns
///
/// * `Ok(Url)` - The normalized redirect target
/// * `Err(UrlError)` - The target could not be parsed
pub fn normalize_location(request_url: &Url, location: &str) -> Result<Url, UrlError> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return Err(UrlError::MalformedTarget("empty Location header".to_string()));
    }

    let mut url = request_url
        .join(trimmed)
        .map_err(|e| UrlError::Parse(format!("{}: {}", trimmed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    url.set_fragment(None);
    Ok(url)
}
