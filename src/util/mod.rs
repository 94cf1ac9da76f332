//! Shared helpers: URL normalization and article date extraction.

pub mod dates;
pub mod urls;

pub use dates::{extract_article_dates, newest_date, oldest_date};
pub use urls::{extract_host, normalize_url};
