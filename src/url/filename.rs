use crate::UrlError;
use percent_encoding::percent_decode_str;
use url::Url;

/// Extracts `(package_name, version_code)` from a resolved binary URL
///
/// The final path segment is percent-decoded and read as
/// `<package_name>_<...>_<version_code>.<extension>`: the package name is
/// everything before the first underscore, the version code is everything
/// between the last underscore and the following dot.
///
/// # Examples
///
/// ```
/// use market_refresh::url::parse_package_file;
/// use url::Url;
///
/// let url = Url::parse("http://cdn.example.com/pkg/com.example.app_102.apk").unwrap();
/// let (name, version) = parse_package_file(&url).unwrap();
/// assert_eq!(name, "com.example.app");
/// assert_eq!(version, "102");
/// ```
pub fn parse_package_file(url: &Url) -> Result<(String, String), UrlError> {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| UrlError::MalformedTarget(format!("no file name in {}", url)))?;

    let file_name = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|e| UrlError::MalformedTarget(format!("{}: {}", segment, e)))?;

    let (package_name, _) = file_name
        .split_once('_')
        .ok_or_else(|| UrlError::MalformedTarget(format!("no underscore in {}", file_name)))?;

    let version_code = file_name
        .rsplit_once('_')
        .and_then(|(_, tail)| tail.split('.').next())
        .unwrap_or_default();

    if package_name.is_empty() || version_code.is_empty() {
        return Err(UrlError::MalformedTarget(file_name.to_string()));
    }

    Ok((package_name.to_string(), version_code.to_string()))
}

/// Returns true if the identifier already looks like a resolved binary file name
///
/// Matching is a case-insensitive substring test against each extension.
pub fn has_binary_extension(identifier: &str, extensions: &[String]) -> bool {
    let lowered = identifier.to_lowercase();
    extensions
        .iter()
        .filter(|ext| !ext.is_empty())
        .any(|ext| lowered.contains(&ext.to_lowercase()))
}
