//! HTTP API routes.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{PicksError, PicksResult};
use crate::report::cache::CachedReport;
use crate::report::ReportCache;
use crate::yahoo::session::AuthCache;
use crate::yahoo::universe::market_spec;

const X_GENERATED_AT: HeaderName = HeaderName::from_static("x-generated-at");
const X_NEXT_UPDATE_AT: HeaderName = HeaderName::from_static("x-next-update-at");
const X_REPORT_STALE: HeaderName = HeaderName::from_static("x-report-stale");

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ReportCache>,
    pub auth: Arc<AuthCache>,
    /// Configured markets, upper case
    pub markets: Arc<Vec<String>>,
    pub cache_control: HeaderValue,
    pub allow_manual_refresh: bool,
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Report (GET also answers HEAD)
        .route("/api/v1/daily-report", get(daily_report))
        .route("/api/v1/daily-report/refresh", post(refresh_report))
        // Status
        .route("/api/v1/status", get(status))
        .with_state(state)
}

// ============ Health Check ============

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "picks-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============ Daily Report ============

#[derive(Debug, Deserialize)]
struct ReportQuery {
    market: Option<String>,
}

async fn daily_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, PicksError> {
    let market = query
        .market
        .as_deref()
        .map(|m| state.check_market(m))
        .transpose()?;

    let report = state.cache.get_daily_payload(false).await?;
    state.report_response(&report, market.as_deref())
}

async fn refresh_report(State(state): State<AppState>) -> Result<Response, PicksError> {
    if !state.allow_manual_refresh {
        return Err(PicksError::Forbidden("manual refresh is disabled".into()));
    }

    let report = state.cache.get_daily_payload(true).await?;
    state.report_response(&report, None)
}

impl AppState {
    /// Normalise a `?market=` value; it must be known and configured.
    fn check_market(&self, market: &str) -> PicksResult<String> {
        let spec = market_spec(market)?;
        if !self.markets.iter().any(|m| m == spec.id) {
            return Err(PicksError::Validation(format!(
                "market '{}' is not configured",
                spec.id
            )));
        }
        Ok(spec.id.to_string())
    }

    fn report_response(&self, report: &CachedReport, market: Option<&str>) -> PicksResult<Response> {
        let payload = report.payload.as_ref();
        let mut response = match market {
            Some(m) => Json(payload.for_market(m)?).into_response(),
            None => Json(payload).into_response(),
        };

        let stale = report.stale || !payload.is_fresh();
        let headers = response.headers_mut();
        insert_text(headers, X_GENERATED_AT, &payload.generated_at.to_rfc3339());
        insert_text(headers, X_NEXT_UPDATE_AT, &payload.next_update_at.to_rfc3339());
        headers.insert(
            X_REPORT_STALE,
            HeaderValue::from_static(if stale { "true" } else { "false" }),
        );
        headers.insert(header::CACHE_CONTROL, self.cache_control.clone());

        Ok(response)
    }
}

fn insert_text(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

// ============ Status ============

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.cache.status().await;
    Json(serde_json::json!({
        "service": "picks-server",
        "version": env!("CARGO_PKG_VERSION"),
        "markets": state.markets.as_ref(),
        "manual_refresh": state.allow_manual_refresh,
        "cache": cache,
        "auth": state.auth.status(),
    }))
}
