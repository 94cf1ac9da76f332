//! URL normalization for queue dedupe and cache matching.
//!
//! Every URL entering the system passes through [`normalize_url`] exactly
//! once, at admission time. All persistence keys and dedupe checks operate
//! on the normalized form.

use url::Url;

/// Normalize a URL for consistent identity across representations.
///
/// Handles:
/// - Lowercase scheme and host
/// - Remove default ports (80, 443)
/// - Remove trailing slash from path (unless root)
/// - Remove fragment
/// - Query string preserved (pagination parameters are significant)
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let parsed = match Url::parse(url.trim()) {
        Ok(u) => u,
        Err(_) => return url.trim().to_lowercase(),
    };

    let mut normalized = String::with_capacity(url.len());

    normalized.push_str(parsed.scheme());
    normalized.push_str("://");

    if let Some(host) = parsed.host_str() {
        normalized.push_str(host);
    }

    if let Some(port) = parsed.port() {
        let default_port = match parsed.scheme() {
            "http" => 80,
            "https" => 443,
            _ => 0,
        };
        if port != default_port {
            normalized.push(':');
            normalized.push_str(&port.to_string());
        }
    }

    let path = parsed.path();
    if path.len() > 1 && path.ends_with('/') {
        normalized.push_str(&path[..path.len() - 1]);
    } else if path.is_empty() {
        normalized.push('/');
    } else {
        normalized.push_str(path);
    }

    if let Some(query) = parsed.query() {
        normalized.push('?');
        normalized.push_str(query);
    }

    normalized
}

/// Extract the host portion of a URL, lowercased.
///
/// Returns an error string for URLs with no host so callers can log
/// and skip rather than crash on malformed discovery output.
pub fn extract_host(url_str: &str) -> Result<String, String> {
    match Url::parse(url_str) {
        Ok(url) => match url.host_str() {
            Some(host) => Ok(host.to_lowercase()),
            None => Err(format!("URL has no host: {url_str}")),
        },
        Err(e) => Err(format!("Failed to parse URL {url_str}: {e}")),
    }
}

/// Strip a leading `www.` so `www.example.com` and `example.com`
/// share rate-limiter and breaker state.
#[must_use]
pub fn canonical_host(host: &str) -> String {
    let host = host.to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("https://Example.Com/World/France/"),
            "https://example.com/World/France"
        );
        assert_eq!(
            normalize_url("http://example.com:80/path"),
            "http://example.com/path"
        );
        assert_eq!(
            normalize_url("https://example.com/path#comments"),
            "https://example.com/path"
        );
        assert_eq!(
            normalize_url("https://example.com/world/france?page=3"),
            "https://example.com/world/france?page=3"
        );
    }

    #[test]
    fn test_extract_host() {
        assert_eq!(
            extract_host("https://www.theguardian.com/world").unwrap(),
            "www.theguardian.com"
        );
        assert!(extract_host("not a url").is_err());
    }

    #[test]
    fn test_canonical_host() {
        assert_eq!(canonical_host("www.Example.com"), "example.com");
        assert_eq!(canonical_host("news.example.com"), "news.example.com");
        assert_eq!(canonical_host("www."), "www.");
    }
}
