//! Structural URL signatures.
//!
//! A signature replaces each path segment with a regex character class
//! so URLs that differ only in dates, ids or slugs collapse to one
//! template. Templates are always anchored: an unanchored template
//! prefix-matches everything under it and learns garbage.

/// Regex class for one path segment.
#[must_use]
pub fn segment_class(segment: &str) -> String {
    if segment.is_empty() {
        return String::new();
    }
    if segment.len() == 4 && segment.bytes().all(|b| b.is_ascii_digit()) {
        return r"\d{4}".to_string();
    }
    if segment.len() <= 2 && segment.bytes().all(|b| b.is_ascii_digit()) {
        return r"\d{1,2}".to_string();
    }
    if segment.len() >= 8
        && segment
            .bytes()
            .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        && segment.bytes().any(|b| b.is_ascii_digit())
    {
        return "[a-f0-9]+".to_string();
    }
    if segment.len() > 20
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return "[a-z0-9-]+".to_string();
    }
    regex::escape(segment)
}

/// Anchored structural signature for a URL path.
///
/// `/world/2024/jan/some-long-story-slug-here-now` →
/// `^/world/\d{4}/jan/[a-z0-9-]+$`
#[must_use]
pub fn structural_signature(path: &str) -> String {
    let inner: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(segment_class)
        .collect();
    if inner.is_empty() {
        return "^/$".to_string();
    }
    format!("^/{}$", inner.join("/"))
}

/// Wildcard form used for similar-URL matching: like the signature but
/// comparable segment-by-segment.
#[must_use]
pub fn wildcard_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(segment_class)
        .collect()
}

/// Structural similarity between two paths in [0, 1]: the fraction of
/// aligned segments whose classes match, zero when depths differ.
#[must_use]
pub fn structural_similarity(path_a: &str, path_b: &str) -> f64 {
    let a = wildcard_segments(path_a);
    let b = wildcard_segments(path_b);
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let matching = a.iter().zip(&b).filter(|(x, y)| x == y).count();
    matching as f64 / a.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_collapses_dates_and_slugs() {
        let sig = structural_signature("/world/2024/15/some-long-story-slug-goes-here");
        assert_eq!(sig, r"^/world/\d{4}/\d{1,2}/[a-z0-9-]+$");
    }

    #[test]
    fn test_signature_is_anchored() {
        let sig = structural_signature("/world");
        assert!(sig.starts_with('^'));
        assert!(sig.ends_with('$'));
    }

    #[test]
    fn test_short_segments_stay_literal() {
        assert_eq!(structural_signature("/world/france"), "^/world/france$");
    }

    #[test]
    fn test_hex_segment_class() {
        assert_eq!(segment_class("a3f8b2c9d1"), "[a-f0-9]+");
        // All-letter strings are not hex ids.
        assert_eq!(segment_class("deadbeef"), "deadbeef");
    }

    #[test]
    fn test_similarity() {
        let a = "/world/2024/jan/story-one-about-something-long";
        let b = "/world/2023/feb/story-two-about-another-thing";
        assert!(structural_similarity(a, b) > 0.7);
        assert_eq!(structural_similarity("/world/france", "/a/b/c"), 0.0);
    }

    #[test]
    fn test_signature_matches_sibling_urls() {
        let sig = structural_signature("/uk-news/2024/15/some-story-slug-long-enough-here");
        let re = regex::Regex::new(&sig).unwrap();
        assert!(re.is_match("/uk-news/2023/02/another-story-slug-equally-long-here"));
        assert!(!re.is_match("/uk-news/2023/02/another-story/extra"));
    }
}
