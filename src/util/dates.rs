//! Article timestamp extraction from HTML.
//!
//! The depth prober's time-travel check and the hub seeder's
//! `oldest_content_date` both need the publication dates of articles
//! listed on a hub page. Three sources are checked, in order of
//! reliability: JSON-LD `datePublished`, `<time datetime>` attributes,
//! and date-shaped URL paths in article links.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static URL_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    // /2024/01/15/ or /2024/jan/15/
    Regex::new(r"/(\d{4})/(\d{1,2}|[a-z]{3})/(\d{1,2})(?:/|$)").expect("valid URL date regex")
});

static MONTH_ABBREVS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Extract all article publication dates visible on a page.
///
/// Returns dates in document order; callers reduce with [`newest_date`]
/// or [`oldest_date`]. Unparseable values are skipped silently.
#[must_use]
pub fn extract_article_dates(html: &str) -> Vec<DateTime<Utc>> {
    let doc = Html::parse_document(html);
    let mut dates = Vec::new();

    // JSON-LD datePublished
    if let Ok(sel) = Selector::parse(r#"script[type="application/ld+json"]"#) {
        for script in doc.select(&sel) {
            let raw = script.text().collect::<String>();
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
                collect_json_ld_dates(&value, &mut dates);
            }
        }
    }

    // <time datetime="...">
    if let Ok(sel) = Selector::parse("time[datetime]") {
        for el in doc.select(&sel) {
            if let Some(dt) = el.value().attr("datetime").and_then(parse_flexible_date) {
                dates.push(dt);
            }
        }
    }

    // Date-shaped paths in article links
    if let Ok(sel) = Selector::parse("a[href]") {
        for el in doc.select(&sel) {
            if let Some(dt) = el.value().attr("href").and_then(date_from_url_path) {
                dates.push(dt);
            }
        }
    }

    dates
}

fn collect_json_ld_dates(value: &serde_json::Value, out: &mut Vec<DateTime<Utc>>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(s)) = map.get("datePublished") {
                if let Some(dt) = parse_flexible_date(s) {
                    out.push(dt);
                }
            }
            for v in map.values() {
                collect_json_ld_dates(v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                collect_json_ld_dates(v, out);
            }
        }
        _ => {}
    }
}

/// Parse an ISO-8601-ish date string, tolerating date-only values.
#[must_use]
pub fn parse_flexible_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(
            d.and_hms_opt(0, 0, 0)?,
            Utc,
        ));
    }
    None
}

/// Pull a date out of a URL path like `/world/2024/jan/15/story-slug`.
#[must_use]
pub fn date_from_url_path(path: &str) -> Option<DateTime<Utc>> {
    let lowered = path.to_lowercase();
    let caps = URL_DATE_RE.captures(&lowered)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = match caps[2].parse::<u32>() {
        Ok(m) => m,
        Err(_) => (MONTH_ABBREVS.iter().position(|m| *m == &caps[2])? as u32) + 1,
    };
    let day: u32 = caps[3].parse().ok()?;
    let d = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(DateTime::from_naive_utc_and_offset(
        d.and_hms_opt(0, 0, 0)?,
        Utc,
    ))
}

/// Newest of a set of dates.
#[must_use]
pub fn newest_date(dates: &[DateTime<Utc>]) -> Option<DateTime<Utc>> {
    dates.iter().max().copied()
}

/// Oldest of a set of dates.
#[must_use]
pub fn oldest_date(dates: &[DateTime<Utc>]) -> Option<DateTime<Utc>> {
    dates.iter().min().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_from_url_path() {
        let dt = date_from_url_path("/uk-news/2024/jan/15/some-story").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-15");

        let dt = date_from_url_path("/news/2023/11/02/other").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2023-11-02");

        assert!(date_from_url_path("/world/france").is_none());
    }

    #[test]
    fn test_parse_flexible_date() {
        assert!(parse_flexible_date("2024-01-15T10:30:00Z").is_some());
        assert!(parse_flexible_date("2024-01-15").is_some());
        assert!(parse_flexible_date("yesterday").is_none());
    }

    #[test]
    fn test_extract_from_time_elements() {
        let html = r#"<html><body>
            <article><time datetime="2024-03-01T08:00:00Z">March 1</time></article>
            <article><time datetime="2024-02-15T08:00:00Z">Feb 15</time></article>
        </body></html>"#;
        let dates = extract_article_dates(html);
        assert_eq!(dates.len(), 2);
        assert_eq!(
            newest_date(&dates).unwrap().format("%Y-%m-%d").to_string(),
            "2024-03-01"
        );
        assert_eq!(
            oldest_date(&dates).unwrap().format("%Y-%m-%d").to_string(),
            "2024-02-15"
        );
    }

    #[test]
    fn test_extract_from_json_ld() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type":"NewsArticle","datePublished":"2024-05-20T12:00:00Z"}
        </script></head><body></body></html>"#;
        let dates = extract_article_dates(html);
        assert_eq!(dates.len(), 1);
    }
}
