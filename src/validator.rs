//! Content validation for fetched bodies.
//!
//! Decides whether a response is usable, and when it is not, whether
//! the failure is hard (stop the host) or soft (escalate to headless).
//! All checks are deterministic and cheap: status-code inspection plus
//! substring and regex probes over the body text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bodies smaller than this are treated as empty shells.
pub const DEFAULT_MIN_BODY_BYTES: usize = 500;

/// How a failed validation should be handled upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Stop attempting this host (access denied, permanent block).
    Hard,
    /// Escalate to the headless fetcher once.
    Soft,
    /// No failure.
    None,
}

/// Validation verdict for one fetched body.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub accepted: bool,
    pub failure_class: FailureClass,
    pub reason: Option<String>,
}

impl ValidationResult {
    #[must_use]
    fn accepted() -> Self {
        Self {
            accepted: true,
            failure_class: FailureClass::None,
            reason: None,
        }
    }

    #[must_use]
    fn rejected(class: FailureClass, reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            failure_class: class,
            reason: Some(reason.into()),
        }
    }
}

// Pages that only render with JavaScript enabled.
static JS_REQUIRED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(enable\s+javascript|javascript\s+is\s+(?:required|disabled)|<noscript[^>]*>\s*(?:<[^>]+>\s*)*(?:please|you\s+need))",
    )
    .expect("valid js-required regex")
});

// Bot-challenge interstitials (Cloudflare and friends).
static BOT_CHALLENGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(checking\s+your\s+browser|cf-challenge|just\s+a\s+moment|verify\s+you\s+are\s+(?:a\s+)?human|attention\s+required.{0,40}cloudflare|ddos-guard)",
    )
    .expect("valid bot-challenge regex")
});

// Rate-limit interstitial text on a 200 body.
static RATE_INTERSTITIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(too\s+many\s+requests|rate\s+limit(?:ed)?|retry\s+after)")
        .expect("valid rate-interstitial regex")
});

// Permanent block / access-denied signals. Plain "forbidden" is too
// common in news copy; require the status-page phrasings.
static ACCESS_DENIED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(access\s+denied|403\s+forbidden|error\s+403|blocked\s+by\s+(?:the\s+)?(?:site|administrator)|your\s+ip\s+(?:address\s+)?has\s+been\s+(?:banned|blocked))")
        .expect("valid access-denied regex")
});

// Paywall markers: structured (JSON-LD isAccessibleForFree) or textual.
static PAYWALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)("isAccessibleForFree"\s*:\s*"?false|subscribe\s+to\s+(?:read|continue)|subscription\s+required)"#)
        .expect("valid paywall regex")
});

/// Validate a fetched body.
///
/// `robots_disallowed` is the fetch-time robots verdict; a disallowed
/// URL is a hard failure regardless of what came back.
#[must_use]
pub fn validate(
    url: &str,
    http_status: u16,
    body: &[u8],
    content_type: Option<&str>,
    robots_disallowed: bool,
    min_body_bytes: usize,
) -> ValidationResult {
    if robots_disallowed {
        return ValidationResult::rejected(FailureClass::Hard, "robots disallow at fetch time");
    }

    match http_status {
        401 | 403 => {
            return ValidationResult::rejected(
                FailureClass::Hard,
                format!("access denied (HTTP {http_status})"),
            );
        }
        429 | 503 => {
            return ValidationResult::rejected(
                FailureClass::Soft,
                format!("rate limited (HTTP {http_status})"),
            );
        }
        s if s >= 400 => {
            return ValidationResult::rejected(FailureClass::Hard, format!("HTTP error {s}"));
        }
        _ => {}
    }

    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if !ct.contains("html") && !ct.contains("xml") && !ct.contains("text") {
            return ValidationResult::rejected(
                FailureClass::Hard,
                format!("unusable content type: {ct}"),
            );
        }
    }

    if body.len() < min_body_bytes {
        log::debug!("body below minimum for {url}: {} bytes", body.len());
        return ValidationResult::rejected(
            FailureClass::Soft,
            format!("body too small ({} bytes)", body.len()),
        );
    }

    // Only inspect a bounded prefix; challenge pages are tiny and real
    // articles put their boilerplate up top.
    let prefix_len = body.len().min(64 * 1024);
    let text = String::from_utf8_lossy(&body[..prefix_len]);

    if ACCESS_DENIED.is_match(&text) {
        return ValidationResult::rejected(FailureClass::Hard, "access-denied body");
    }
    if BOT_CHALLENGE.is_match(&text) {
        return ValidationResult::rejected(FailureClass::Soft, "bot-challenge page");
    }
    if RATE_INTERSTITIAL.is_match(&text) && body.len() < 8 * 1024 {
        return ValidationResult::rejected(FailureClass::Soft, "rate-limit interstitial");
    }
    if PAYWALL.is_match(&text) {
        return ValidationResult::rejected(FailureClass::Soft, "paywalled content");
    }
    if JS_REQUIRED.is_match(&text) && body.len() < 16 * 1024 {
        return ValidationResult::rejected(FailureClass::Soft, "javascript required");
    }

    ValidationResult::accepted()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_body() -> Vec<u8> {
        let mut body = String::from("<html><body><article>");
        for _ in 0..100 {
            body.push_str("<p>Reported from the region, the story continues. </p>");
        }
        body.push_str("</article></body></html>");
        body.into_bytes()
    }

    #[test]
    fn test_accepts_real_article() {
        let result = validate(
            "https://example.com/a",
            200,
            &article_body(),
            Some("text/html; charset=utf-8"),
            false,
            DEFAULT_MIN_BODY_BYTES,
        );
        assert!(result.accepted);
        assert_eq!(result.failure_class, FailureClass::None);
    }

    #[test]
    fn test_403_is_hard() {
        let result = validate("https://example.com/a", 403, b"", None, false, 500);
        assert_eq!(result.failure_class, FailureClass::Hard);
    }

    #[test]
    fn test_429_is_soft() {
        let result = validate("https://example.com/a", 429, b"", None, false, 500);
        assert_eq!(result.failure_class, FailureClass::Soft);
    }

    #[test]
    fn test_robots_disallow_is_hard() {
        let result = validate("https://example.com/a", 200, &article_body(), None, true, 500);
        assert_eq!(result.failure_class, FailureClass::Hard);
    }

    #[test]
    fn test_small_body_is_soft() {
        let result = validate(
            "https://example.com/a",
            200,
            b"<html></html>",
            Some("text/html"),
            false,
            500,
        );
        assert_eq!(result.failure_class, FailureClass::Soft);
        assert!(result.reason.unwrap().contains("too small"));
    }

    #[test]
    fn test_bot_challenge_is_soft() {
        let mut body = String::from("<html><title>Just a moment...</title>");
        body.push_str(&" ".repeat(600));
        let result = validate(
            "https://example.com/a",
            200,
            body.as_bytes(),
            Some("text/html"),
            false,
            500,
        );
        assert!(!result.accepted);
        assert_eq!(result.failure_class, FailureClass::Soft);
    }

    #[test]
    fn test_access_denied_body_is_hard() {
        let mut body = String::from("<html><h1>Access Denied</h1>");
        body.push_str(&"x".repeat(600));
        let result = validate(
            "https://example.com/a",
            200,
            body.as_bytes(),
            Some("text/html"),
            false,
            500,
        );
        assert_eq!(result.failure_class, FailureClass::Hard);
    }

    #[test]
    fn test_binary_content_type_rejected() {
        let result = validate(
            "https://example.com/a.pdf",
            200,
            &article_body(),
            Some("application/pdf"),
            false,
            500,
        );
        assert_eq!(result.failure_class, FailureClass::Hard);
    }
}
