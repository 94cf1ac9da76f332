//! Link extraction from fetched pages.

use scraper::{Html, Selector};
use url::Url;

use crate::util::urls::normalize_url;

/// Extract same-host links from a page, resolved against `base_url`,
/// normalized and deduplicated in document order.
#[must_use]
pub fn extract_links(base_url: &str, html: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let base_host = base.host_str().map(str::to_string);

    let doc = Html::parse_document(html);
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for element in doc.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("javascript:")
            || href.starts_with("tel:")
        {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        if resolved.host_str().map(str::to_string) != base_host {
            continue;
        }
        let normalized = normalize_url(resolved.as_str());
        if seen.insert(normalized.clone()) {
            links.push(normalized);
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_same_host_links() {
        let html = r##"<html><body>
            <a href="/world/france">France</a>
            <a href="https://example.com/world/spain">Spain</a>
            <a href="https://other.com/elsewhere">Offsite</a>
            <a href="#top">Anchor</a>
            <a href="mailto:x@example.com">Mail</a>
            <a href="/world/france">Duplicate</a>
        </body></html>"##;
        let links = extract_links("https://example.com/world", html);
        assert_eq!(
            links,
            vec![
                "https://example.com/world/france".to_string(),
                "https://example.com/world/spain".to_string(),
            ]
        );
    }

    #[test]
    fn test_relative_resolution() {
        let html = r#"<a href="page/2">next</a>"#;
        let links = extract_links("https://example.com/world/france/", html);
        assert_eq!(links, vec!["https://example.com/world/france/page/2"]);
    }
}
