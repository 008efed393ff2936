//! Metadata Cache Manager
//!
//! Owns the single [`IssuerConfiguration`] snapshot for one issuer and every
//! refresh of it.
//!
//! - Readers call [`MetadataManager::get_current`], a lock-free load that never
//!   waits on the network.
//! - Refreshes are single-flight: the first caller spawns a fetch-and-parse
//!   task, later callers join it and all of them observe the same result.
//! - A successful refresh swaps the snapshot atomically. A failed one keeps the
//!   previous snapshot and marks the cache [`CacheState::Stale`].
//! - The spawned task runs to completion (bounded by the backchannel timeout)
//!   even if every caller is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MAX_REFRESH_INTERVAL;
use crate::discovery::{ConfigurationRetriever, IssuerConfiguration};
use crate::error::RetrievalError;
use crate::auth_metrics;

/// Result shared by every caller of one refresh
pub type RefreshResult = Result<Arc<IssuerConfiguration>, RetrievalError>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// Observable cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No snapshot yet, nothing in flight
    Empty,
    /// A fetch-and-parse cycle is running
    Refreshing,
    /// Serving a snapshot from the most recent attempt
    Ready,
    /// The most recent attempt failed; serving the previous snapshot
    Stale,
}

/// Refresh timing
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Period of the background refresh task
    pub refresh_interval: Duration,
    /// Minimum spacing enforced by [`MetadataManager::request_refresh`]
    pub min_refresh_interval: Duration,
    /// Issuer the snapshot is expected to publish; a mismatch is logged
    pub expected_issuer: Option<String>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(3600),
            min_refresh_interval: Duration::from_secs(30),
            expected_issuer: None,
        }
    }
}

struct Inner {
    address: String,
    retriever: Arc<dyn ConfigurationRetriever>,
    settings: RefreshSettings,
    snapshot: ArcSwapOption<IssuerConfiguration>,
    in_flight: Mutex<Option<SharedRefresh>>,
    last_attempt: Mutex<Option<Instant>>,
    last_failed: AtomicBool,
}

/// Cache manager bound to one discovery address
///
/// Cheap to clone; clones share the same snapshot and refresh slot.
#[derive(Clone)]
pub struct MetadataManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataManager")
            .field("address", &self.inner.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl MetadataManager {
    /// Create an empty manager for `address`
    pub fn new<R>(address: impl Into<String>, retriever: R, settings: RefreshSettings) -> Self
    where
        R: ConfigurationRetriever + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                address: address.into(),
                retriever: Arc::new(retriever),
                settings,
                snapshot: ArcSwapOption::empty(),
                in_flight: Mutex::new(None),
                last_attempt: Mutex::new(None),
                last_failed: AtomicBool::new(false),
            }),
        }
    }

    /// Discovery address this manager refreshes from
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Current cache state
    pub fn state(&self) -> CacheState {
        if self.inner.in_flight.lock().is_some() {
            CacheState::Refreshing
        } else if self.inner.snapshot.load().is_none() {
            CacheState::Empty
        } else if self.inner.last_failed.load(Ordering::Acquire) {
            CacheState::Stale
        } else {
            CacheState::Ready
        }
    }

    /// Last good snapshot
    ///
    /// # Errors
    ///
    /// [`RetrievalError::NotYetInitialized`] if no refresh has ever succeeded
    pub fn get_current(&self) -> RefreshResult {
        self.inner
            .snapshot
            .load_full()
            .ok_or(RetrievalError::NotYetInitialized)
    }

    /// Last good snapshot, refreshing first if there is none
    ///
    /// # Errors
    ///
    /// The refresh failure when no snapshot has ever been obtained
    pub async fn current_or_refresh(&self) -> RefreshResult {
        match self.get_current() {
            Ok(config) => Ok(config),
            Err(_) => self.refresh_now().await,
        }
    }

    /// Run a fetch-and-parse cycle, or join the one already running
    ///
    /// # Errors
    ///
    /// The cycle's [`RetrievalError`]. The previous snapshot, if any, stays in
    /// place.
    pub async fn refresh_now(&self) -> RefreshResult {
        let refresh = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(running) => running.clone(),
                None => {
                    let started = self.start_refresh();
                    *slot = Some(started.clone());
                    started
                }
            }
        };
        refresh.await
    }

    /// Refresh unless one finished within the minimum refresh interval
    ///
    /// Joins an in-flight refresh if there is one. Returns `None` when the
    /// request was suppressed by the cool-down.
    pub async fn request_refresh(&self) -> Option<RefreshResult> {
        let refresh = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(running) => running.clone(),
                None => {
                    if self.cooling_down() {
                        debug!(address = %self.inner.address, "refresh suppressed by cool-down");
                        return None;
                    }
                    let started = self.start_refresh();
                    *slot = Some(started.clone());
                    started
                }
            }
        };
        Some(refresh.await)
    }

    /// Start the periodic refresh task
    ///
    /// The task stops when `shutdown` is cancelled. The period is clamped to
    /// between one second and [`MAX_REFRESH_INTERVAL`].
    pub fn spawn_refresh_task(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        let configured = self.inner.settings.refresh_interval;
        let period = configured.clamp(Duration::from_secs(1), MAX_REFRESH_INTERVAL);
        if period != configured {
            warn!(
                address = %self.inner.address,
                configured_secs = configured.as_secs(),
                period_secs = period.as_secs(),
                "refresh interval out of range, clamped"
            );
        }

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    () = shutdown.cancelled() => break,
                    result = manager.refresh_now() => {
                        if let Err(err) = result {
                            warn!(
                                address = %manager.inner.address,
                                error = %err,
                                "scheduled metadata refresh failed"
                            );
                        }
                    }
                }
            }

            debug!(address = %manager.inner.address, "metadata refresh task stopped");
        })
    }

    fn cooling_down(&self) -> bool {
        let last_attempt = *self.inner.last_attempt.lock();
        last_attempt.is_some_and(|at| at.elapsed() < self.inner.settings.min_refresh_interval)
    }

    fn start_refresh(&self) -> SharedRefresh {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let mut cycle = RefreshCycle {
                inner,
                recorded: false,
            };
            let result = cycle
                .inner
                .retriever
                .retrieve(&cycle.inner.address)
                .await
                .map(Arc::new);
            cycle.record(&result);
            result
        });

        let address = self.inner.address.clone();
        async move {
            task.await.unwrap_or_else(|join_err| {
                Err(RetrievalError::UnreachableIssuer {
                    address,
                    reason: format!("refresh task failed: {join_err}"),
                })
            })
        }
        .boxed()
        .shared()
    }
}

/// One fetch-and-parse cycle
///
/// Dropping it closes the cycle: the attempt is stamped and the in-flight
/// slot cleared, also when the task panics or is aborted before a result
/// was recorded.
struct RefreshCycle {
    inner: Arc<Inner>,
    recorded: bool,
}

impl RefreshCycle {
    fn record(&mut self, result: &RefreshResult) {
        self.inner.apply(result);
        self.recorded = true;
    }
}

impl Drop for RefreshCycle {
    fn drop(&mut self) {
        if !self.recorded {
            self.inner.last_failed.store(true, Ordering::Release);
            warn!(address = %self.inner.address, "metadata refresh ended without a result");
        }
        *self.inner.last_attempt.lock() = Some(Instant::now());
        // Cleared last so a caller that sees the slot empty also sees the new snapshot
        self.inner.in_flight.lock().take();
    }
}

impl Inner {
    fn apply(&self, result: &RefreshResult) {
        match result {
            Ok(config) => {
                if let Some(expected) = self.settings.expected_issuer.as_deref()
                    && config.issuer.trim_end_matches('/') != expected.trim_end_matches('/')
                {
                    warn!(
                        expected,
                        published = %config.issuer,
                        "discovery document publishes a different issuer"
                    );
                }
                self.snapshot.store(Some(Arc::clone(config)));
                self.last_failed.store(false, Ordering::Release);
                auth_metrics::record_signing_keys(config.signing_keys.len());
                info!(
                    address = %self.address,
                    issuer = %config.issuer,
                    key_count = config.signing_keys.len(),
                    "issuer metadata refreshed"
                );
            }
            Err(err) => {
                self.last_failed.store(true, Ordering::Release);
                if self.snapshot.load().is_some() {
                    warn!(
                        address = %self.address,
                        error = %err,
                        "metadata refresh failed, serving previous snapshot"
                    );
                } else {
                    warn!(address = %self.address, error = %err, "metadata refresh failed");
                }
            }
        }
    }
}
