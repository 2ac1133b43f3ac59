//! URL canonicalization and resolution of image locators.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("relative locator without a base URL: {0}")]
    RelativeWithoutBase(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string for consistent fetching.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(parsed)
}

/// Resolve an image locator, joining relative paths onto `base`.
///
/// Absolute locators are canonicalized as-is. A root-relative or
/// path-relative locator requires a base; `static/img/bg1.jpg` with no base
/// is treated as a host name, like [`canonicalize`] does.
pub fn resolve(input: &str, base: Option<&url::Url>) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }
    if trimmed.contains("://") {
        return canonicalize(trimmed);
    }

    match base {
        Some(base) => {
            let joined = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
            normalize(joined)
        }
        None if trimmed.starts_with('/') || trimmed.starts_with('.') => {
            Err(UrlError::RelativeWithoutBase(trimmed.to_string()))
        }
        None => canonicalize(trimmed),
    }
}

fn normalize(mut parsed: url::Url) -> Result<url::Url, UrlError> {
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> url::Url {
        url::Url::parse("https://school.example/board/").unwrap()
    }

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://example.com/bg1.jpg").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/bg1.jpg");
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com/bg1.jpg").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("https://EXAMPLE.COM/Bg1.jpg").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/Bg1.jpg");
    }

    #[test]
    fn test_canonicalize_remove_fragment_keep_query() {
        let url = canonicalize("https://example.com/bg1.jpg?v=2#top").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("v=2"));
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_whitespace_only() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_resolve_root_relative() {
        let url = resolve("/static/img/bg1.jpg", Some(&base())).unwrap();
        assert_eq!(url.as_str(), "https://school.example/static/img/bg1.jpg");
    }

    #[test]
    fn test_resolve_path_relative() {
        let url = resolve("img/bg2.jpg", Some(&base())).unwrap();
        assert_eq!(url.as_str(), "https://school.example/board/img/bg2.jpg");
    }

    #[test]
    fn test_resolve_absolute_ignores_base() {
        let url = resolve("http://cdn.example/bg3.jpg", Some(&base())).unwrap();
        assert_eq!(url.as_str(), "http://cdn.example/bg3.jpg");
    }

    #[test]
    fn test_resolve_relative_without_base() {
        let result = resolve("/static/img/bg1.jpg", None);
        assert!(matches!(result, Err(UrlError::RelativeWithoutBase(_))));
    }
}
