//! Queue manager and URL decision orchestrator.
//!
//! Single admission point for every URL the crawl touches: dedupe on
//! the normalized form, pre-fetch prediction, admission filtering,
//! priority scoring, and the lease discipline that guarantees at most
//! one in-flight worker per URL. The in-memory priority queue drives
//! scheduling; the `queue_entries` table mirrors state for crash
//! recovery and cross-process lease safety.

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use dashmap::DashSet;
use log::debug;
use priority_queue::PriorityQueue;
use tokio::sync::Mutex;

use crate::classify::predictor::UrlPredictor;
use crate::classify::Classification;
use crate::fetch::UrlKind;
use crate::storage::{QueueState, Storage};
use crate::util::urls::{extract_host, normalize_url};

/// Priority wrapper so f64 scores order inside the queue.
#[derive(Debug, Clone)]
struct Priority(f64);

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct UrlKey(String);

/// A unit of crawl work.
#[derive(Debug, Clone)]
pub struct CrawlItem {
    /// Normalized URL.
    pub url: String,
    pub host: String,
    pub url_id: i64,
    pub kind: UrlKind,
    pub priority: f64,
    pub retry_count: u8,
    /// Replay the stored body instead of fetching.
    pub cache_replay: bool,
}

/// Inputs to priority scoring beyond the URL itself.
#[derive(Debug, Clone, Default)]
pub struct AdmitHints {
    /// Page number within a paginated archive, when known.
    pub page_number: Option<u32>,
    /// Population of the place this URL covers, when known.
    pub population: u64,
    /// Extra base priority (seeds get a bump).
    pub base_boost: f64,
}

/// What admission decided.
#[derive(Debug)]
pub enum AdmitDecision {
    Enqueued { priority: f64 },
    Duplicate,
    Rejected { reason: String },
}

/// Predicted classes below this value are rejected outright when the
/// predictor is confident.
const REJECT_CONFIDENCE: f64 = 0.7;

struct QueueInner {
    heap: PriorityQueue<UrlKey, Priority>,
    items: HashMap<String, CrawlItem>,
}

pub struct QueueManager {
    inner: Mutex<QueueInner>,
    seen: DashSet<String>,
    storage: Storage,
    predictor: UrlPredictor,
}

impl QueueManager {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: PriorityQueue::new(),
                items: HashMap::new(),
            }),
            predictor: UrlPredictor::new(storage.clone()),
            seen: DashSet::new(),
            storage,
        }
    }

    /// Score: base + pagination recency + population + predicted class.
    fn score(hints: &AdmitHints, predicted: Classification, confidence: f64) -> f64 {
        let base = 1.0 + hints.base_boost;
        let recency = match hints.page_number {
            Some(page) if page > 0 => 3.0 / f64::from(page),
            _ => 0.0,
        };
        let population = (hints.population as f64 + 1.0).log10() * 0.5;
        let class_boost = match predicted {
            Classification::Hub => 2.0 * confidence,
            Classification::Article => 1.0 * confidence,
            Classification::Unknown => 0.25,
            Classification::Nav => -0.5,
            Classification::Other => -1.0,
        };
        base + recency + population + class_boost
    }

    /// Admit one URL: dedupe, predict, filter, score, enqueue.
    pub async fn admit(&self, raw_url: &str, hints: AdmitHints) -> Result<AdmitDecision> {
        let url = normalize_url(raw_url);
        let Ok(host) = extract_host(&url) else {
            return Ok(AdmitDecision::Rejected {
                reason: "unparseable URL".into(),
            });
        };

        if !self.seen.insert(url.clone()) {
            return Ok(AdmitDecision::Duplicate);
        }

        let url_id = self.storage.intern_url(&url, &host).await?;
        let prediction = self.predictor.predict(url_id, &url, &host).await?;

        // Low-value predicted classes are dropped at the door.
        if matches!(
            prediction.classification,
            Classification::Nav | Classification::Other
        ) && prediction.confidence >= REJECT_CONFIDENCE
        {
            self.storage.enqueue_url(url_id, 0.0, 0).await?;
            self.storage.mark_leased(url_id).await?;
            self.storage
                .complete_lease(url_id, QueueState::Skipped)
                .await?;
            debug!(
                "rejected {url}: predicted {} ({:.2})",
                prediction.classification.as_str(),
                prediction.confidence
            );
            return Ok(AdmitDecision::Rejected {
                reason: format!(
                    "predicted {} at {:.2}",
                    prediction.classification.as_str(),
                    prediction.confidence
                ),
            });
        }

        let priority = Self::score(&hints, prediction.classification, prediction.confidence);
        let kind = match prediction.classification {
            Classification::Hub => UrlKind::Hub,
            Classification::Article => UrlKind::Article,
            _ => UrlKind::Unknown,
        };

        self.storage.enqueue_url(url_id, priority, 0).await?;

        let item = CrawlItem {
            url: url.clone(),
            host,
            url_id,
            kind,
            priority,
            retry_count: 0,
            cache_replay: false,
        };
        let mut inner = self.inner.lock().await;
        inner.items.insert(url.clone(), item);
        inner.heap.push(UrlKey(url), Priority(priority));

        Ok(AdmitDecision::Enqueued { priority })
    }

    /// Replay previously fetched pages of a host as virtual entries
    /// that bypass the network but feed classification and discovery.
    pub async fn seed_from_cache(&self, host: &str) -> Result<usize> {
        let cached = self.storage.cached_urls_for_host(host).await?;
        let mut added = 0;
        let mut inner = self.inner.lock().await;
        for row in cached {
            if !self.seen.insert(row.normalized.clone()) {
                continue;
            }
            self.storage.enqueue_url(row.id, 1.0, 0).await?;
            let item = CrawlItem {
                url: row.normalized.clone(),
                host: row.host,
                url_id: row.id,
                kind: UrlKind::Unknown,
                priority: 1.0,
                retry_count: 0,
                cache_replay: true,
            };
            inner.items.insert(row.normalized.clone(), item);
            inner.heap.push(UrlKey(row.normalized), Priority(1.0));
            added += 1;
        }
        debug!("seeded {added} cached URLs for {host}");
        Ok(added)
    }

    /// Lease the highest-priority item. The durable conditional lease
    /// is the authority: an item whose row is no longer QUEUED is
    /// dropped and the next candidate tried.
    pub async fn lease_next(&self) -> Result<Option<CrawlItem>> {
        loop {
            let candidate = {
                let mut inner = self.inner.lock().await;
                match inner.heap.pop() {
                    Some((UrlKey(url), _)) => inner.items.remove(&url),
                    None => return Ok(None),
                }
            };
            let Some(item) = candidate else {
                continue;
            };
            if self.storage.mark_leased(item.url_id).await? {
                return Ok(Some(item));
            }
            debug!("lease contention on {}, skipping", item.url);
        }
    }

    /// Re-queue an item whose lease was released (breaker deferral or
    /// retry). Bypasses dedupe; retries are already-seen by design.
    pub async fn requeue(&self, item: CrawlItem, ready_after_ms: i64) -> Result<()> {
        self.storage
            .release_lease(item.url_id, ready_after_ms)
            .await?;
        let mut inner = self.inner.lock().await;
        let priority = item.priority;
        let url = item.url.clone();
        inner.items.insert(url.clone(), item);
        inner.heap.push(UrlKey(url), Priority(priority));
        Ok(())
    }

    /// Terminal completion of a leased item.
    pub async fn complete(&self, url_id: i64, state: QueueState) -> Result<()> {
        self.storage.complete_lease(url_id, state).await
    }

    /// Items currently queued in memory.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.heap.is_empty()
    }

    #[must_use]
    pub fn predictor(&self) -> &UrlPredictor {
        &self.predictor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admit_dedupes_normalized_forms() {
        let storage = Storage::open_in_memory().await.unwrap();
        let queue = QueueManager::new(storage);

        let first = queue
            .admit("https://Example.com/world/france/", AdmitHints::default())
            .await
            .unwrap();
        assert!(matches!(first, AdmitDecision::Enqueued { .. }));

        let second = queue
            .admit("https://example.com/world/france", AdmitHints::default())
            .await
            .unwrap();
        assert!(matches!(second, AdmitDecision::Duplicate));
    }

    #[tokio::test]
    async fn test_page_one_scores_higher() {
        let storage = Storage::open_in_memory().await.unwrap();
        let queue = QueueManager::new(storage);

        let page1 = queue
            .admit(
                "https://example.com/world/france?page=1",
                AdmitHints {
                    page_number: Some(1),
                    ..AdmitHints::default()
                },
            )
            .await
            .unwrap();
        let page9 = queue
            .admit(
                "https://example.com/world/france?page=9",
                AdmitHints {
                    page_number: Some(9),
                    ..AdmitHints::default()
                },
            )
            .await
            .unwrap();

        let (AdmitDecision::Enqueued { priority: p1 }, AdmitDecision::Enqueued { priority: p9 }) =
            (page1, page9)
        else {
            panic!("both should enqueue");
        };
        assert!(p1 > p9);
    }

    #[tokio::test]
    async fn test_population_boosts_priority() {
        let big = QueueManager::score(
            &AdmitHints {
                population: 10_000_000,
                ..AdmitHints::default()
            },
            Classification::Hub,
            0.8,
        );
        let small = QueueManager::score(
            &AdmitHints {
                population: 1_000,
                ..AdmitHints::default()
            },
            Classification::Hub,
            0.8,
        );
        assert!(big > small);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let storage = Storage::open_in_memory().await.unwrap();
        let queue = QueueManager::new(storage.clone());
        queue
            .admit("https://example.com/world/france", AdmitHints::default())
            .await
            .unwrap();

        let leased = queue.lease_next().await.unwrap().unwrap();
        // Durable state is LEASED: a second conditional lease must fail.
        assert!(!storage.mark_leased(leased.url_id).await.unwrap());
        assert!(queue.lease_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_requeue_after_deferral() {
        let storage = Storage::open_in_memory().await.unwrap();
        let queue = QueueManager::new(storage);
        queue
            .admit("https://example.com/world/france", AdmitHints::default())
            .await
            .unwrap();

        let item = queue.lease_next().await.unwrap().unwrap();
        queue.requeue(item, 0).await.unwrap();
        assert!(queue.lease_next().await.unwrap().is_some());
    }
}
