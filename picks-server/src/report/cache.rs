//! Two-tier report cache.
//!
//! Lookup order for a request:
//!
//! 1. In-process snapshot, if still fresh
//! 2. Edge store, if it holds a fresh payload (adopted into memory)
//! 3. A generation, shared by every concurrent caller
//!
//! A successful generation replaces the snapshot and is written through to
//! the edge store with TTL = refresh interval. A failed one publishes
//! nothing; the previous payload, even an expired one, is served instead
//! and marked stale.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{DailyPayload, EdgeStore, PayloadGenerator};
use crate::error::{PicksError, PicksResult};
use crate::flight::SingleFlight;

/// A payload as served to a caller.
#[derive(Debug, Clone)]
pub struct CachedReport {
    pub payload: Arc<DailyPayload>,
    /// Served as a fallback after a failed generation, or past its expiry
    pub stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Idle,
    Generating,
    Published,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub state: CacheState,
    pub generated_at: Option<DateTime<Utc>>,
    pub next_update_at: Option<DateTime<Utc>>,
    pub fresh: bool,
    pub store_backend: &'static str,
    pub generations_started: u64,
    pub generations_succeeded: u64,
    pub generations_failed: u64,
    pub stale_served: u64,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    stale_served: AtomicU64,
}

pub struct ReportCache {
    generator: Arc<dyn PayloadGenerator>,
    store: Arc<dyn EdgeStore>,
    store_key: String,
    interval: Duration,
    deadline: Duration,
    current: Arc<RwLock<Option<Arc<DailyPayload>>>>,
    flight: SingleFlight<Arc<DailyPayload>>,
    counters: Arc<Counters>,
}

impl ReportCache {
    pub fn new(
        generator: Arc<dyn PayloadGenerator>,
        store: Arc<dyn EdgeStore>,
        store_key: impl Into<String>,
        interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            generator,
            store,
            store_key: store_key.into(),
            interval,
            deadline,
            current: Arc::new(RwLock::new(None)),
            flight: SingleFlight::new("report"),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Current payload, generating one if needed.
    ///
    /// `force_refresh` skips both cache tiers (joining a generation that is
    /// already running).
    pub async fn get_daily_payload(&self, force_refresh: bool) -> PicksResult<CachedReport> {
        if !force_refresh {
            if let Some(payload) = fresh(&self.current) {
                return Ok(CachedReport { payload, stale: false });
            }
            if let Some(payload) = self.read_edge().await.filter(|p| p.is_fresh()) {
                info!(generated_at = %payload.generated_at, "Adopted report from edge store");
                self.publish_memory(Arc::clone(&payload));
                return Ok(CachedReport { payload, stale: false });
            }
        }

        let check_slot = Arc::clone(&self.current);
        let outcome = self
            .flight
            .run_unless(
                move || if force_refresh { None } else { fresh(&check_slot) },
                || self.generation(),
            )
            .await;

        match outcome {
            Ok(payload) => Ok(CachedReport { payload, stale: false }),
            Err(e) => match self.fallback().await {
                Some(payload) => {
                    warn!(
                        error = %e,
                        generated_at = %payload.generated_at,
                        "Generation failed, serving previous report"
                    );
                    self.counters.stale_served.fetch_add(1, Ordering::Relaxed);
                    Ok(CachedReport { payload, stale: true })
                }
                None => Err(e),
            },
        }
    }

    /// The in-process snapshot, fresh or not.
    pub fn current(&self) -> Option<Arc<DailyPayload>> {
        self.current.read().ok()?.clone()
    }

    pub async fn status(&self) -> CacheStatus {
        let current = self.current();
        let state = if self.flight.is_running().await {
            CacheState::Generating
        } else if current.is_some() {
            CacheState::Published
        } else {
            CacheState::Idle
        };

        CacheStatus {
            state,
            generated_at: current.as_ref().map(|p| p.generated_at),
            next_update_at: current.as_ref().map(|p| p.next_update_at),
            fresh: current.as_ref().is_some_and(|p| p.is_fresh()),
            store_backend: self.store.backend(),
            generations_started: self.counters.started.load(Ordering::Relaxed),
            generations_succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            generations_failed: self.counters.failed.load(Ordering::Relaxed),
            stale_served: self.counters.stale_served.load(Ordering::Relaxed),
        }
    }

    /// The generation task. Owns everything it touches so it can outlive
    /// the caller that started it.
    fn generation(&self) -> impl std::future::Future<Output = PicksResult<Arc<DailyPayload>>> + Send + 'static {
        let generator = Arc::clone(&self.generator);
        let store = Arc::clone(&self.store);
        let key = self.store_key.clone();
        let interval = self.interval;
        let deadline = self.deadline;
        let current = Arc::clone(&self.current);
        let counters = Arc::clone(&self.counters);

        async move {
            counters.started.fetch_add(1, Ordering::Relaxed);

            let payload = match tokio::time::timeout(deadline, generator.generate()).await {
                Ok(Ok(payload)) => Arc::new(payload),
                Ok(Err(e)) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Report generation failed");
                    return Err(e);
                }
                Err(_) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(deadline_secs = deadline.as_secs(), "Report generation timed out");
                    return Err(PicksError::Timeout(format!(
                        "report generation exceeded {}s",
                        deadline.as_secs()
                    )));
                }
            };

            if let Ok(mut guard) = current.write() {
                *guard = Some(Arc::clone(&payload));
            }

            match serde_json::to_string(payload.as_ref()) {
                Ok(json) => {
                    if let Err(e) = store.put_with_ttl(&key, json, interval).await {
                        warn!(error = %e, backend = store.backend(), "Edge store write failed");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to serialize report for edge store"),
            }

            counters.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                generated_at = %payload.generated_at,
                next_update_at = %payload.next_update_at,
                "Report published"
            );
            Ok(payload)
        }
    }

    fn publish_memory(&self, payload: Arc<DailyPayload>) {
        if let Ok(mut guard) = self.current.write() {
            *guard = Some(payload);
        }
    }

    async fn read_edge(&self) -> Option<Arc<DailyPayload>> {
        let raw = match self.store.get(&self.store_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Edge store read failed");
                return None;
            }
        };
        match serde_json::from_str::<DailyPayload>(&raw) {
            Ok(payload) => Some(Arc::new(payload)),
            Err(e) => {
                warn!(error = %e, "Discarding undecodable report from edge store");
                None
            }
        }
    }

    async fn fallback(&self) -> Option<Arc<DailyPayload>> {
        if let Some(payload) = self.current() {
            return Some(payload);
        }
        let payload = self.read_edge().await?;
        debug!("Falling back to edge store report");
        self.publish_memory(Arc::clone(&payload));
        Some(payload)
    }
}

fn fresh(slot: &RwLock<Option<Arc<DailyPayload>>>) -> Option<Arc<DailyPayload>> {
    let guard = slot.read().ok()?;
    guard.as_ref().filter(|p| p.is_fresh()).cloned()
}
