//! Bounded pool of long-lived headless browser sessions.
//!
//! Sessions are expensive to launch (2-5s cold start), so they are kept
//! alive and handed out least-recently-used. A session is retired after
//! serving `max_pages_per_session` pages or living past
//! `max_session_age`; a periodic health check replaces crashed
//! sessions. When every session is checked out, `acquire` suspends the
//! caller until a release or the acquire timeout, whichever comes first.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use futures::StreamExt;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::events::{EventBus, TaskEvent};

/// Pool tuning knobs.
#[derive(Debug, Clone)]
pub struct HeadlessPoolConfig {
    /// Maximum live sessions (minimum 1).
    pub max_sessions: usize,
    /// Pages a session may serve before retirement.
    pub max_pages_per_session: u64,
    /// Wall-clock lifetime of a session.
    pub max_session_age: Duration,
    /// Interval between health checks of idle sessions.
    pub health_check_interval: Duration,
    /// How long `acquire` waits for a free session before failing.
    pub acquire_timeout: Duration,
    /// Per-navigation timeout applied to rendered fetches.
    pub page_timeout: Duration,
}

impl Default for HeadlessPoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 3,
            max_pages_per_session: 50,
            max_session_age: Duration::from_secs(600),
            health_check_interval: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(60),
            page_timeout: Duration::from_secs(30),
        }
    }
}

/// A live headless session with pool metadata.
struct HeadlessSession {
    id: u64,
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
    created_at: Instant,
    last_used: Instant,
    pages_served: u64,
}

impl HeadlessSession {
    fn should_retire(&self, config: &HeadlessPoolConfig) -> bool {
        self.pages_served >= config.max_pages_per_session
            || self.created_at.elapsed() >= config.max_session_age
    }
}

impl Drop for HeadlessSession {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(dir) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                trace!("failed to remove session profile {}: {e}", dir.display());
            }
        }
    }
}

/// Pool of headless sessions.
pub struct HeadlessPool {
    config: HeadlessPoolConfig,
    /// Idle sessions, least-recently-used at the front.
    idle: Mutex<VecDeque<HeadlessSession>>,
    in_use: AtomicUsize,
    next_id: AtomicU64,
    released: Notify,
    shutdown: AtomicBool,
    health_task: Mutex<Option<JoinHandle<()>>>,
    bus: Arc<EventBus>,
}

impl HeadlessPool {
    #[must_use]
    pub fn new(mut config: HeadlessPoolConfig, bus: Arc<EventBus>) -> Arc<Self> {
        config.max_sessions = config.max_sessions.max(1);
        Arc::new(Self {
            config,
            idle: Mutex::new(VecDeque::new()),
            in_use: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            released: Notify::new(),
            shutdown: AtomicBool::new(false),
            health_task: Mutex::new(None),
            bus,
        })
    }

    /// Start the periodic health check.
    pub async fn start(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(pool.config.health_check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            while !pool.shutdown.load(Ordering::Relaxed) {
                interval.tick().await;
                pool.health_sweep().await;
            }
        });
        *self.health_task.lock().await = Some(task);
    }

    /// Acquire the least-recently-used healthy session.
    ///
    /// Launches a fresh session when under capacity; suspends until a
    /// release when at capacity. Errors after `acquire_timeout`.
    pub async fn acquire(self: &Arc<Self>) -> Result<SessionGuard> {
        let deadline = Instant::now() + self.config.acquire_timeout;

        loop {
            {
                let mut idle = self.idle.lock().await;
                while let Some(mut session) = idle.pop_front() {
                    if session.should_retire(&self.config) {
                        self.retire(session);
                        continue;
                    }
                    match session.browser.version().await {
                        Ok(_) => {
                            session.last_used = Instant::now();
                            self.in_use.fetch_add(1, Ordering::Relaxed);
                            self.bus.publish(&TaskEvent::PoolSessionAcquired {
                                session_id: session.id,
                            });
                            return Ok(SessionGuard {
                                session: Some(session),
                                pool: Arc::clone(self),
                            });
                        }
                        Err(e) => {
                            warn!(session = session.id, error = %e, "session failed health check on acquire");
                            self.retire(session);
                        }
                    }
                }
            }

            let live = self.in_use.load(Ordering::Relaxed) + self.idle.lock().await.len();
            if live < self.config.max_sessions {
                let session = self.launch_session().await?;
                self.in_use.fetch_add(1, Ordering::Relaxed);
                self.bus.publish(&TaskEvent::PoolSessionAcquired {
                    session_id: session.id,
                });
                return Ok(SessionGuard {
                    session: Some(session),
                    pool: Arc::clone(self),
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!(
                    "headless pool exhausted: no session released within {:?}",
                    self.config.acquire_timeout
                );
            }
            let _ = tokio::time::timeout(remaining, self.released.notified()).await;
        }
    }

    /// Release path used by the guard's Drop: takes an owned Arc so the
    /// spawned task can outlive the guard.
    fn release_owned(pool: Arc<Self>, mut session: HeadlessSession) {
        pool.in_use.fetch_sub(1, Ordering::Relaxed);
        pool.bus.publish(&TaskEvent::PoolSessionReleased {
            session_id: session.id,
        });

        tokio::spawn(async move {
            if session.should_retire(&pool.config) || pool.shutdown.load(Ordering::Relaxed) {
                pool.retire(session);
            } else {
                session.last_used = Instant::now();
                pool.idle.lock().await.push_back(session);
                debug!("session returned to pool");
            }
            pool.released.notify_one();
        });
    }

    fn retire(&self, session: HeadlessSession) {
        self.bus.publish(&TaskEvent::PoolSessionRetired {
            session_id: session.id,
            pages_served: session.pages_served,
        });
        info!(
            session = session.id,
            pages = session.pages_served,
            "retiring headless session"
        );
        // Drop aborts the handler and removes the profile directory.
        drop(session);
    }

    /// Drop crashed or aged-out idle sessions.
    async fn health_sweep(&self) {
        let mut idle = self.idle.lock().await;
        let mut healthy = VecDeque::new();
        while let Some(session) = idle.pop_front() {
            if session.should_retire(&self.config) {
                self.retire(session);
                continue;
            }
            match session.browser.version().await {
                Ok(_) => healthy.push_back(session),
                Err(e) => {
                    warn!(session = session.id, error = %e, "session failed keepalive");
                    self.retire(session);
                }
            }
        }
        *idle = healthy;
        debug!("health sweep complete: {} idle sessions", idle.len());
    }

    async fn launch_session(&self) -> Result<HeadlessSession> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let profile = tempfile::Builder::new()
            .prefix("newsatlas_session_")
            .tempdir()
            .context("Failed to create session profile dir")?;
        let user_data_dir = profile.keep();

        let browser_config = BrowserConfigBuilder::default()
            .request_timeout(self.config.page_timeout)
            .window_size(1920, 1080)
            .user_data_dir(user_data_dir.clone())
            .headless_mode(HeadlessMode::default())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-notifications")
            .arg("--disable-background-networking")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio")
            .arg("--hide-scrollbars")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch headless session")?;

        let handler_task = tokio::task::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    let msg = e.to_string();
                    // CDP events chromiumoxide doesn't model deserialize
                    // noisily; only surface genuine failures.
                    if !msg.contains("data did not match any variant of untagged enum Message") {
                        warn!("browser handler error: {msg}");
                    }
                }
            }
        });

        self.bus
            .publish(&TaskEvent::PoolSessionLaunched { session_id: id });
        info!(session = id, "launched headless session");

        let now = Instant::now();
        Ok(HeadlessSession {
            id,
            browser,
            handler: handler_task,
            user_data_dir: Some(user_data_dir),
            created_at: now,
            last_used: now,
            pages_served: 0,
        })
    }

    /// Close every idle session and stop the health task. Checked-out
    /// sessions are retired as their guards drop.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(task) = self.health_task.lock().await.take() {
            task.abort();
        }
        let mut idle = self.idle.lock().await;
        while let Some(mut session) = idle.pop_front() {
            if let Err(e) = session.browser.close().await {
                warn!(session = session.id, "failed to close session: {e}");
            }
            let _ = session.browser.wait().await;
            self.retire(session);
        }
        info!("headless pool shut down");
    }
}

/// RAII guard: returns the session to the pool on drop.
pub struct SessionGuard {
    session: Option<HeadlessSession>,
    pool: Arc<HeadlessPool>,
}

/// A page rendered through a headless session.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub final_url: String,
}

impl SessionGuard {
    /// Navigate to `url`, wait for the load to settle, and return the
    /// rendered DOM. Counts one page against the session's retirement
    /// budget regardless of outcome.
    pub async fn render(&mut self, url: &str) -> Result<RenderedPage> {
        let session = self
            .session
            .as_mut()
            .context("session already returned to pool")?;
        session.pages_served += 1;

        let timeout = self.pool.config.page_timeout;
        let page = tokio::time::timeout(timeout, session.browser.new_page(url))
            .await
            .context("page open timed out")?
            .context("failed to open page")?;

        let result = async {
            tokio::time::timeout(timeout, page.wait_for_navigation())
                .await
                .context("navigation timed out")?
                .context("navigation failed")?;
            let html = page.content().await.context("failed to read DOM")?;
            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| url.to_string());
            Ok(RenderedPage { html, final_url })
        }
        .await;

        // The page must close on every exit path or the session leaks
        // targets until retirement.
        if let Err(e) = page.close().await {
            debug!("failed to close page for {url}: {e}");
        }

        result
    }

    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            HeadlessPool::release_owned(Arc::clone(&self.pool), session);
        }
    }
}
