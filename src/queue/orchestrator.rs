//! Crawl orchestration: worker loop, retry policy, downstream stages.
//!
//! A fixed set of worker slots drain the queue concurrently. Each
//! leased item flows fetch → classify → verify-prediction → discover,
//! and every terminal path settles the item's durable lease. Breaker
//! deferrals park in the [`DeferredQueue`]; transient failures retry
//! with jittered exponential backoff.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, error, info, warn};
use rand::Rng;

use super::manager::{AdmitHints, CrawlItem, QueueManager};
use super::retry::DeferredQueue;
use crate::classify::{aggregate, classify_content, classify_url};
use crate::config::CrawlConfig;
use crate::discovery::{extract_links, PaginationPredictor};
use crate::events::{EventBus, FetchSource, TaskEvent};
use crate::fetch::{FailureKind, FetchOutcome, FetchPipeline};
use crate::resilience::{CircuitBreaker, Heartbeat, ShutdownSignal};
use crate::storage::QueueState;

const MAX_PAGE_RETRIES: u8 = 3;
/// Cap on links admitted from a single page.
const MAX_LINKS_PER_PAGE: usize = 200;

/// Exponential backoff with ±20% jitter for page retries.
fn retry_backoff(retry_count: u8, kind: FailureKind) -> Duration {
    const BASE_DELAY_MS: u64 = 1000;
    const MAX_DELAY_MS: u64 = 30_000;
    const JITTER: f64 = 0.2;

    let exp = BASE_DELAY_MS.saturating_mul(1 << retry_count.min(5));
    let multiplier = match kind {
        FailureKind::ConnectionReset | FailureKind::Headless => 1.5,
        _ => 1.0,
    };
    let adjusted = (exp as f64 * multiplier) as u64;
    let jitter = rand::rng().random_range(-JITTER..=JITTER);
    let jittered = (adjusted as f64 * (1.0 + jitter)) as u64;
    Duration::from_millis(jittered.min(MAX_DELAY_MS))
}

/// Result of processing one leased item.
enum WorkerOutcome {
    Done,
    Deferred(CrawlItem),
    Retryable {
        item: CrawlItem,
        kind: FailureKind,
        detail: String,
    },
    Permanent,
}

/// End-of-run accounting.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub pages_fetched: u64,
    pub cache_hits: u64,
    pub duration: Duration,
}

/// Shared context cloned into each worker task.
struct WorkerContext {
    queue: Arc<QueueManager>,
    pipeline: Arc<FetchPipeline>,
    pagination: Arc<PaginationPredictor>,
    bus: Arc<EventBus>,
    fetched: Arc<AtomicUsize>,
    cache_hits: Arc<AtomicUsize>,
}

pub struct CrawlOrchestrator {
    config: CrawlConfig,
    queue: Arc<QueueManager>,
    deferred: Arc<DeferredQueue>,
    pipeline: Arc<FetchPipeline>,
    pagination: Arc<PaginationPredictor>,
    bus: Arc<EventBus>,
    shutdown: ShutdownSignal,
}

impl CrawlOrchestrator {
    #[must_use]
    pub fn new(
        config: CrawlConfig,
        queue: Arc<QueueManager>,
        breaker: Arc<CircuitBreaker>,
        pipeline: Arc<FetchPipeline>,
        pagination: Arc<PaginationPredictor>,
        bus: Arc<EventBus>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            queue,
            deferred: Arc::new(DeferredQueue::new(breaker)),
            pipeline,
            pagination,
            bus,
            shutdown,
        }
    }

    /// Run the crawl to completion, limit, or cancellation.
    pub async fn run(&self, _heartbeat: &Heartbeat) -> Result<CrawlSummary> {
        let start_time = Instant::now();

        self.bus.publish(&TaskEvent::CrawlStarted {
            start_urls: self.config.start_urls.clone(),
        });

        for url in &self.config.start_urls {
            let decision = self
                .queue
                .admit(
                    url,
                    AdmitHints {
                        base_boost: 2.0,
                        ..AdmitHints::default()
                    },
                )
                .await?;
            debug!("seed {url}: {decision:?}");
        }
        for host in &self.config.seed_from_cache {
            let added = self.queue.seed_from_cache(host).await?;
            info!("seed-from-cache {host}: {added} entries");
        }

        let fetched = Arc::new(AtomicUsize::new(0));
        let cache_hits = Arc::new(AtomicUsize::new(0));
        let pending_retries = Arc::new(AtomicUsize::new(0));
        let mut active: FuturesUnordered<tokio::task::JoinHandle<WorkerOutcome>> =
            FuturesUnordered::new();

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            // Breaker recoveries come back into rotation first.
            for item in self.deferred.drain_ready() {
                self.queue.requeue(item, 0).await?;
            }

            // Fill worker slots.
            while active.len() < self.config.workers {
                if let Some(limit) = self.config.page_limit {
                    if fetched.load(Ordering::Relaxed) >= limit {
                        break;
                    }
                }
                let Some(item) = self.queue.lease_next().await? else {
                    break;
                };

                let ctx = WorkerContext {
                    queue: Arc::clone(&self.queue),
                    pipeline: Arc::clone(&self.pipeline),
                    pagination: Arc::clone(&self.pagination),
                    bus: Arc::clone(&self.bus),
                    fetched: Arc::clone(&fetched),
                    cache_hits: Arc::clone(&cache_hits),
                };
                active.push(tokio::spawn(process_item(item, ctx)));
            }

            // Settle the next completion.
            match active.next().await {
                Some(Ok(outcome)) => match outcome {
                    WorkerOutcome::Done | WorkerOutcome::Permanent => {}
                    WorkerOutcome::Deferred(item) => {
                        self.deferred.add(item);
                    }
                    WorkerOutcome::Retryable { mut item, kind, detail } => {
                        if item.retry_count < MAX_PAGE_RETRIES {
                            item.retry_count += 1;
                            let delay = retry_backoff(item.retry_count, kind);
                            warn!(
                                "retrying {} (attempt {}/{MAX_PAGE_RETRIES}) in {delay:?}: {detail}",
                                item.url, item.retry_count
                            );
                            // Backoff off-loop so one slow host cannot
                            // stall scheduling for the others.
                            pending_retries.fetch_add(1, Ordering::Relaxed);
                            let queue = Arc::clone(&self.queue);
                            let pending = Arc::clone(&pending_retries);
                            let shutdown = self.shutdown.clone();
                            tokio::spawn(async move {
                                if shutdown.guard(tokio::time::sleep(delay)).await.is_some() {
                                    if let Err(e) = queue.requeue(item, 0).await {
                                        warn!("retry requeue failed: {e:#}");
                                    }
                                }
                                pending.fetch_sub(1, Ordering::Relaxed);
                            });
                        } else {
                            warn!(
                                "giving up on {} after {} attempts: {detail}",
                                item.url, item.retry_count
                            );
                            self.queue.complete(item.url_id, QueueState::Done).await?;
                        }
                    }
                },
                Some(Err(e)) => error!("worker task panicked: {e}"),
                None => {
                    // No active workers. Anything left anywhere?
                    let retries_pending = pending_retries.load(Ordering::Relaxed) > 0;
                    if self.queue.is_empty().await
                        && self.deferred.is_empty()
                        && !retries_pending
                    {
                        break;
                    }
                    if let Some(limit) = self.config.page_limit {
                        if fetched.load(Ordering::Relaxed) >= limit {
                            break;
                        }
                    }
                    // Only deferred items or backoff timers remain:
                    // idle until a window can elapse.
                    if self.queue.is_empty().await {
                        debug!(
                            "{} deferred, {} retries pending",
                            self.deferred.len(),
                            pending_retries.load(Ordering::Relaxed)
                        );
                        if self
                            .shutdown
                            .guard(tokio::time::sleep(Duration::from_secs(2)))
                            .await
                            .is_none()
                        {
                            break;
                        }
                    }
                }
            }

            if let Some(limit) = self.config.page_limit {
                if fetched.load(Ordering::Relaxed) >= limit && active.is_empty() {
                    info!("reached page limit of {limit}");
                    break;
                }
            }
        }

        // Bounded drain of in-flight work on shutdown.
        let drain_deadline = Instant::now() + self.config.shutdown_grace;
        while !active.is_empty() {
            let remaining = drain_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("shutdown grace expired with {} workers in flight", active.len());
                break;
            }
            match tokio::time::timeout(remaining, active.next()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => break,
            }
        }

        let summary = CrawlSummary {
            pages_fetched: fetched.load(Ordering::Relaxed) as u64,
            cache_hits: cache_hits.load(Ordering::Relaxed) as u64,
            duration: start_time.elapsed(),
        };
        self.bus.publish(&TaskEvent::CrawlCompleted {
            pages: summary.pages_fetched,
            duration_ms: summary.duration.as_millis() as i64,
        });
        info!(
            "crawl complete: {} fetched, {} cache hits in {:?}",
            summary.pages_fetched, summary.cache_hits, summary.duration
        );
        Ok(summary)
    }
}

/// Process one leased item end to end.
async fn process_item(item: CrawlItem, ctx: WorkerContext) -> WorkerOutcome {
    if item.cache_replay {
        return process_cache_replay(item, &ctx).await;
    }

    let outcome = ctx.pipeline.fetch(&item.url, &item.host, item.kind).await;
    match outcome {
        FetchOutcome::Fetched {
            content_id,
            body,
            source,
            ..
        } => {
            ctx.fetched.fetch_add(1, Ordering::Relaxed);
            run_downstream(&item, content_id, &body, source, &ctx).await;
            settle(&ctx, &item, QueueState::Done).await
        }
        FetchOutcome::CacheHit { stored } => {
            ctx.cache_hits.fetch_add(1, Ordering::Relaxed);
            run_downstream(
                &item,
                stored.content_id,
                &stored.body,
                FetchSource::Cache,
                &ctx,
            )
            .await;
            settle(&ctx, &item, QueueState::Done).await
        }
        FetchOutcome::Deferred { .. } => WorkerOutcome::Deferred(item),
        FetchOutcome::RobotsDenied => settle(&ctx, &item, QueueState::Skipped).await,
        FetchOutcome::Failed { kind, detail, .. } => match kind {
            FailureKind::Http(404) => {
                // Dead URL; also closes any speculative pagination series.
                ctx.pagination.mark_exhausted(&item.host, &item.url);
                settle(&ctx, &item, QueueState::Done).await
            }
            FailureKind::Http(_)
            | FailureKind::HardContent
            | FailureKind::SoftContent
            | FailureKind::Cancelled => settle(&ctx, &item, QueueState::Done).await,
            FailureKind::Network | FailureKind::ConnectionReset | FailureKind::Headless => {
                WorkerOutcome::Retryable { item, kind, detail }
            }
        },
    }
}

async fn process_cache_replay(item: CrawlItem, ctx: &WorkerContext) -> WorkerOutcome {
    match ctx.pipeline.storage().cached_body(item.url_id).await {
        Ok(Some(stored)) => {
            ctx.cache_hits.fetch_add(1, Ordering::Relaxed);
            run_downstream(
                &item,
                stored.content_id,
                &stored.body,
                FetchSource::Cache,
                ctx,
            )
            .await;
            settle(ctx, &item, QueueState::Done).await
        }
        Ok(None) => {
            debug!("cache replay miss for {}", item.url);
            settle(ctx, &item, QueueState::Skipped).await
        }
        Err(e) => {
            warn!("cache replay failed for {}: {e:#}", item.url);
            settle(ctx, &item, QueueState::Skipped).await
        }
    }
}

async fn settle(ctx: &WorkerContext, item: &CrawlItem, state: QueueState) -> WorkerOutcome {
    if let Err(e) = ctx.queue.complete(item.url_id, state).await {
        // Persistence failure is fatal to the item only; the lease is
        // recovered as stale on the next run.
        warn!("failed to settle lease for {}: {e:#}", item.url);
    }
    match state {
        QueueState::Done => WorkerOutcome::Done,
        _ => WorkerOutcome::Permanent,
    }
}

/// Classification, prediction verification, and discovery for a fetched
/// or replayed body.
async fn run_downstream(
    item: &CrawlItem,
    content_id: i64,
    body: &[u8],
    source: FetchSource,
    ctx: &WorkerContext,
) {
    let html = String::from_utf8_lossy(body);

    // Cascade: URL stage plus content stage. A headless-fetched body is
    // already the rendered DOM, so the DOM stage comes along free.
    let url_stage = classify_url(&item.url);
    let content_stage = classify_content(&html);
    let dom_stage = (source == FetchSource::Headless).then(|| {
        crate::classify::classify_dom(&crate::browser_pool::RenderedPage {
            html: html.to_string(),
            final_url: item.url.clone(),
        })
    });
    let result = aggregate(url_stage, Some(content_stage), dom_stage);

    let signals =
        serde_json::to_string(&result.provenance).unwrap_or_else(|_| "{}".to_string());
    if let Err(e) = ctx
        .pipeline
        .storage()
        .upsert_analysis(
            content_id,
            result.classification.as_str(),
            result.confidence,
            &signals,
        )
        .await
    {
        warn!("failed to store analysis for {}: {e:#}", item.url);
    }

    if let Err(e) = ctx
        .queue
        .predictor()
        .verify(
            item.url_id,
            &item.url,
            &item.host,
            result.classification,
            &ctx.bus,
        )
        .await
    {
        warn!("prediction verification failed for {}: {e:#}", item.url);
    }

    // Discovery: same-host links back into admission.
    for link in extract_links(&item.url, &html).into_iter().take(MAX_LINKS_PER_PAGE) {
        let page_number = crate::discovery::pagination::detect(&link).map(|(_, n, _)| n);
        if let Err(e) = ctx
            .queue
            .admit(&link, AdmitHints {
                page_number,
                ..AdmitHints::default()
            })
            .await
        {
            debug!("admission failed for {link}: {e:#}");
        }
    }

    // Speculative next pages for recognized pagination shapes.
    for (speculative_url, page) in ctx.pagination.observe(&item.host, &item.url) {
        if let Err(e) = ctx
            .queue
            .admit(
                &speculative_url,
                AdmitHints {
                    page_number: Some(page),
                    ..AdmitHints::default()
                },
            )
            .await
        {
            debug!("speculative admission failed for {speculative_url}: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let d1 = retry_backoff(1, FailureKind::Network);
        assert!(d1 >= Duration::from_millis(1600) && d1 <= Duration::from_millis(2400));
        let d5 = retry_backoff(5, FailureKind::Network);
        assert!(d5 <= Duration::from_millis(30_000));
    }

    #[test]
    fn test_reset_failures_back_off_harder() {
        // Jitter is ±20%; multiplier 1.5 keeps the ranges disjoint.
        let reset = retry_backoff(2, FailureKind::ConnectionReset);
        assert!(reset >= Duration::from_millis(4800));
    }
}
