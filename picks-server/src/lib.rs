//! Picks Server Library
//!
//! Publishes a once-per-interval "top picks" report per market.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     picks-server (:4440)                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  routes ──► ReportCache ──► ReportGenerator (per market)         │
//! │               │    │          ├─ universe   (screener)           │
//! │        memory ┘    └ edge     ├─ fetcher    (quotes + spark)     │
//! │                      store    ├─ indicators + scoring            │
//! │                               └─ news       (top N only)         │
//! │                                                                  │
//! │  AuthCache: cookie + crumb, single-flight, refresh on 401        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Generation is request-triggered: the first request after expiry starts
//! it, concurrent requests wait on the same run.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod error;
pub mod flight;
pub mod indicators;
pub mod news;
pub mod report;
pub mod routes;
pub mod scoring;
pub mod yahoo;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use axum::Router;
use picks_common::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

pub use error::{PicksError, PicksResult};
pub use report::{DailyPayload, MarketResult, Pick, ReportCache, ReportGenerator};
pub use routes::{build_router, AppState};

use crate::news::NewsScorer;
use crate::report::create_store;
use crate::yahoo::YahooClient;

/// Main picks service
pub struct PicksService {
    config: Config,
    state: AppState,
}

impl PicksService {
    /// Wire up clients, generator, store and cache from configuration.
    pub async fn new(config: Config) -> Result<Self> {
        let picks = &config.picks;

        let yahoo = YahooClient::new(picks.upstream.clone())
            .context("Failed to create upstream client")?;
        let news = NewsScorer::new(yahoo.http().clone(), picks.news.clone());
        let auth = Arc::clone(yahoo.auth());
        let generator = Arc::new(ReportGenerator::new(yahoo, news, picks.clone()));

        let store = create_store(&picks.store)
            .await
            .context("Failed to create report store")?;
        tracing::info!(backend = store.backend(), "Report store ready");

        let cache = Arc::new(ReportCache::new(
            generator,
            store,
            picks.store.key.clone(),
            Duration::from_secs(picks.refresh_interval_hours.saturating_mul(3600)),
            Duration::from_secs(picks.generation_deadline_secs),
        ));

        let cache_control = HeaderValue::from_str(&picks.cache_control.header_value())
            .context("Invalid cache-control configuration")?;

        let state = AppState {
            cache,
            auth,
            markets: Arc::new(picks.markets.iter().map(|m| m.to_uppercase()).collect()),
            cache_control,
            allow_manual_refresh: picks.allow_manual_refresh,
        };

        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Router with CORS and request timeout layers.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(allow_origin(&self.config.server.cors_origins))
            .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
            .expose_headers(Any);

        build_router(self.state.clone())
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.request_timeout_secs,
            )))
            .layer(cors)
    }

    /// Trigger one generation in the background.
    pub fn spawn_warmup(&self) {
        let cache = Arc::clone(&self.state.cache);
        tokio::spawn(async move {
            match cache.get_daily_payload(false).await {
                Ok(report) => tracing::info!(
                    generated_at = %report.payload.generated_at,
                    stale = report.stale,
                    "Warm-up complete"
                ),
                Err(e) => tracing::warn!(error = %e, "Warm-up generation failed"),
            }
        });
    }

    /// Serve until Ctrl-C.
    pub async fn start(self) -> Result<()> {
        if self.config.picks.warmup_on_start {
            self.spawn_warmup();
        }

        let addr = self.config.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        tracing::info!("Starting HTTP server on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        tracing::info!("Picks server stopped");
        Ok(())
    }
}

fn allow_origin(origins: &[String]) -> AllowOrigin {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if parsed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parsed)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
