//! Hub pagination depth prober.
//!
//! Given a hub URL, finds the deepest valid paginated page with an
//! exponential probe (2, 4, 8, …) followed by a binary search over
//! `[last_good, first_bad]`. A page is bad when it 404s, lists no
//! article links, redirects back to page 1, or fails the time-travel
//! check: its oldest article date moved *forward* past the previous
//! known-good page's by more than the tolerance, the signature of a
//! site silently wrapping to page 1.
//!
//! Some section pages ignore `?page=N` entirely and serve page 1
//! forever; that is detected by a page-2 body identical to page 1 and
//! retried once with the `/all` shape (`/world/france/all?page=N`).

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info};

use crate::classify::url_stage::classify_url;
use crate::classify::Classification;
use crate::discovery::extract_links;
use crate::events::TaskEvent;
use crate::fetch::{FailureKind, FetchOutcome, FetchPipeline, UrlKind};
use crate::resilience::ShutdownSignal;
use crate::storage::{HubMapping, Presence};
use crate::util::dates::{extract_article_dates, oldest_date};
use crate::util::urls::normalize_url;

/// Pagination shape the hub responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageShape {
    /// `{base}?page=N`
    Query,
    /// `{base}/all?page=N`
    AllQuery,
}

fn page_url(base: &str, shape: PageShape, n: u32) -> String {
    let base = base.trim_end_matches('/');
    match shape {
        PageShape::Query => format!("{base}?page={n}"),
        PageShape::AllQuery => format!("{base}/all?page={n}"),
    }
}

#[derive(Debug)]
enum ProbeVerdict {
    Good {
        oldest: Option<DateTime<Utc>>,
        body_hash: u64,
    },
    Bad(String),
}

/// Outcome of a full depth probe.
#[derive(Debug)]
pub struct DepthResult {
    pub max_page_depth: u32,
    pub oldest_content_date: Option<DateTime<Utc>>,
    pub probes: u32,
}

pub struct HubDepthProber<'a> {
    pipeline: &'a FetchPipeline,
    shutdown: ShutdownSignal,
    probe_delay: std::time::Duration,
    ceiling: u32,
    time_travel_tolerance: ChronoDuration,
}

impl<'a> HubDepthProber<'a> {
    #[must_use]
    pub fn new(pipeline: &'a FetchPipeline, shutdown: ShutdownSignal) -> Self {
        let config = &pipeline.config;
        Self {
            pipeline,
            shutdown,
            probe_delay: config.depth_probe_delay,
            ceiling: config.depth_probe_ceiling,
            time_travel_tolerance: ChronoDuration::days(config.depth_time_travel_tolerance_days),
        }
    }

    /// Probe a verified hub and write the result onto its mapping.
    pub async fn probe_mapping(&self, mapping: &HubMapping) -> Result<()> {
        let storage = self.pipeline.storage().clone();
        match self.probe(&mapping.url, &mapping.host).await {
            Ok(result) => {
                storage
                    .record_depth_result(
                        mapping.id,
                        Some(i64::from(result.max_page_depth)),
                        result.oldest_content_date.map(|d| d.timestamp_millis()),
                        None,
                    )
                    .await?;
                if mapping.status != "verified" {
                    storage.verify_mapping(mapping.id, Presence::Present).await?;
                }
                Ok(())
            }
            Err(e) => {
                let detail = format!("{e:#}");
                storage
                    .record_depth_result(mapping.id, None, None, Some(&detail))
                    .await?;
                // A hub whose page 1 is gone is verified absent.
                if detail.contains("page 1 unavailable") && mapping.status != "verified" {
                    storage.verify_mapping(mapping.id, Presence::Absent).await?;
                }
                Err(e)
            }
        }
    }

    /// Run the full search. `base_url` is the unpaginated hub URL.
    pub async fn probe(&self, base_url: &str, host: &str) -> Result<DepthResult> {
        let mut probes = 0u32;
        let mut oldest_by_page: HashMap<u32, Option<DateTime<Utc>>> = HashMap::new();

        // Page 1 establishes the baseline.
        let page1 = self.fetch_page(base_url, host, &mut probes).await?;
        let (page1_oldest, page1_hash) = match page1 {
            ProbeVerdict::Good { oldest, body_hash } => (oldest, body_hash),
            ProbeVerdict::Bad(reason) => {
                return Err(anyhow!("page 1 unavailable: {reason}"));
            }
        };
        oldest_by_page.insert(1, page1_oldest);

        // Shape detection on page 2.
        let mut shape = PageShape::Query;
        let mut page2 = self
            .probe_page(base_url, host, shape, 2, page1_oldest, &mut probes)
            .await?;
        let echoes_page1 = |verdict: &ProbeVerdict| {
            matches!(verdict, ProbeVerdict::Good { body_hash, .. } if *body_hash == page1_hash)
        };
        if echoes_page1(&page2) {
            debug!("{base_url}: page 2 identical to page 1, retrying with /all shape");
            shape = PageShape::AllQuery;
            page2 = self
                .probe_page(base_url, host, shape, 2, page1_oldest, &mut probes)
                .await?;
            if echoes_page1(&page2) {
                page2 = ProbeVerdict::Bad("page parameter ignored".into());
            }
        }

        let (mut last_good, mut first_bad) = match page2 {
            ProbeVerdict::Good { oldest, .. } => {
                oldest_by_page.insert(2, oldest);
                (2u32, None::<u32>)
            }
            ProbeVerdict::Bad(reason) => {
                debug!("{base_url}: page 2 bad ({reason}), depth is 1");
                let result = DepthResult {
                    max_page_depth: 1,
                    oldest_content_date: page1_oldest,
                    probes,
                };
                self.emit(base_url, &result);
                return Ok(result);
            }
        };

        // Exponential phase: 4, 8, 16, … until bad or ceiling.
        let mut n = 4u32;
        while first_bad.is_none() && n <= self.ceiling {
            let prev_oldest = oldest_by_page.get(&last_good).copied().flatten();
            match self
                .probe_page(base_url, host, shape, n, prev_oldest, &mut probes)
                .await?
            {
                ProbeVerdict::Good { oldest, .. } => {
                    oldest_by_page.insert(n, oldest);
                    last_good = n;
                    n = n.saturating_mul(2);
                }
                ProbeVerdict::Bad(reason) => {
                    debug!("{base_url}: page {n} bad ({reason})");
                    first_bad = Some(n);
                }
            }
        }

        // Binary phase: collapse [last_good, first_bad] to one value.
        if let Some(mut bad) = first_bad {
            while bad - last_good > 1 {
                let mid = last_good + (bad - last_good) / 2;
                let prev_oldest = oldest_by_page.get(&last_good).copied().flatten();
                match self
                    .probe_page(base_url, host, shape, mid, prev_oldest, &mut probes)
                    .await?
                {
                    ProbeVerdict::Good { oldest, .. } => {
                        oldest_by_page.insert(mid, oldest);
                        last_good = mid;
                    }
                    ProbeVerdict::Bad(_) => bad = mid,
                }
            }
        }

        // Oldest date from the deepest valid page (falling back to the
        // deepest page that carried any date at all).
        let oldest_content_date = oldest_by_page
            .get(&last_good)
            .copied()
            .flatten()
            .or_else(|| {
                let mut dated: Vec<_> = oldest_by_page
                    .iter()
                    .filter_map(|(page, date)| date.map(|d| (*page, d)))
                    .collect();
                dated.sort_by_key(|(page, _)| *page);
                dated.last().map(|(_, d)| *d)
            });

        // Depth beyond page 1 is only claimed alongside a content date.
        let max_page_depth = if oldest_content_date.is_none() {
            1
        } else {
            last_good
        };

        let result = DepthResult {
            max_page_depth,
            oldest_content_date,
            probes,
        };
        self.emit(base_url, &result);
        info!(
            "hub depth for {base_url}: {} ({} probes)",
            result.max_page_depth, result.probes
        );
        Ok(result)
    }

    fn emit(&self, url: &str, result: &DepthResult) {
        self.pipeline.bus().publish(&TaskEvent::HubDepthProbed {
            url: url.to_string(),
            max_page_depth: Some(result.max_page_depth),
            probes: result.probes,
        });
    }

    async fn probe_page(
        &self,
        base_url: &str,
        host: &str,
        shape: PageShape,
        n: u32,
        prev_good_oldest: Option<DateTime<Utc>>,
        probes: &mut u32,
    ) -> Result<ProbeVerdict> {
        let url = page_url(base_url, shape, n);
        let verdict = self.fetch_page(&url, host, probes).await?;
        let ProbeVerdict::Good { oldest, body_hash } = verdict else {
            return Ok(verdict);
        };

        // Time-travel check: oldest date moving forward past the
        // previous good page means the site wrapped to page 1.
        if let (Some(prev), Some(current)) = (prev_good_oldest, oldest) {
            if current > prev + self.time_travel_tolerance {
                return Ok(ProbeVerdict::Bad(format!(
                    "time-travel: oldest date {current} newer than page-1 side {prev}"
                )));
            }
        }

        Ok(ProbeVerdict::Good { oldest, body_hash })
    }

    /// One cancellable, politeness-paced fetch, judged for probe use.
    async fn fetch_page(&self, url: &str, host: &str, probes: &mut u32) -> Result<ProbeVerdict> {
        if self.shutdown.is_cancelled() {
            return Err(anyhow!("depth probe cancelled"));
        }
        if *probes > 0 {
            // Extra spacing on top of the politeness token.
            if self
                .shutdown
                .guard(tokio::time::sleep(self.probe_delay))
                .await
                .is_none()
            {
                return Err(anyhow!("depth probe cancelled"));
            }
        }
        *probes += 1;

        let outcome = self.pipeline.fetch(url, host, UrlKind::Hub).await;
        match outcome {
            FetchOutcome::Fetched {
                body, final_url, ..
            } => Ok(self.judge_body(url, &body, Some(&final_url))),
            FetchOutcome::CacheHit { stored } => Ok(self.judge_body(url, &stored.body, None)),
            FetchOutcome::Failed {
                kind: FailureKind::Http(404),
                ..
            } => Ok(ProbeVerdict::Bad("HTTP 404".into())),
            FetchOutcome::Failed { kind, detail, .. } => {
                Err(anyhow!("probe fetch failed ({}): {detail}", kind.category()))
            }
            FetchOutcome::Deferred { host, .. } => {
                Err(anyhow!("breaker open for {host} during probe"))
            }
            FetchOutcome::RobotsDenied => Ok(ProbeVerdict::Bad("robots disallow".into())),
        }
    }

    fn judge_body(&self, url: &str, body: &[u8], final_url: Option<&str>) -> ProbeVerdict {
        // Loopback by URL: the paginated request redirected to page 1.
        if let Some(final_url) = final_url {
            let requested = normalize_url(url);
            let landed = normalize_url(final_url);
            if requested != landed && !landed.contains("page=") && requested.contains("page=") {
                return ProbeVerdict::Bad(format!("loopback redirect to {landed}"));
            }
        }

        let html = String::from_utf8_lossy(body);
        let article_links = extract_links(url, &html)
            .into_iter()
            .filter(|link| {
                classify_url(link).classification == Classification::Article
            })
            .count();
        if article_links == 0 {
            return ProbeVerdict::Bad("no article links".into());
        }

        let dates = extract_article_dates(&html);
        ProbeVerdict::Good {
            oldest: oldest_date(&dates),
            body_hash: xxhash_rust::xxh3::xxh3_64(body),
        }
    }
}
