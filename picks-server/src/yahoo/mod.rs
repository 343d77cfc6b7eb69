//! Upstream finance API adapter.
//!
//! # Endpoints
//! - Landing page: hands out the session cookie
//! - `/v1/test/getcrumb`: crumb for that cookie
//! - `/v1/finance/screener` (protected): most-active symbols per exchange
//! - `/v7/finance/quote` (protected): quote snapshots
//! - `/v8/finance/spark` (open): daily close/volume history
//!
//! Protected endpoints need both the cookie and the crumb. Sessions expire
//! without notice; a 401 triggers one forced refresh and one retry.

pub mod fetcher;
pub mod session;
pub mod universe;

use chrono::{DateTime, TimeZone, Utc};
use picks_common::UpstreamConfig;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PicksError, PicksResult};
use session::{AuthCache, AuthSession};

// ============================================================================
// Constants
// ============================================================================

/// Accept header sent with every upstream request
const ACCEPT: &str = "application/json,text/plain,*/*";

/// Accept-Language header sent with every upstream request
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Upstream limit on symbols per quote request
pub const MAX_QUOTE_CHUNK: usize = 15;

/// Upstream limit on symbols per spark request
pub const MAX_HISTORY_CHUNK: usize = 8;

// ============================================================================
// Data Types
// ============================================================================

/// Quote snapshot for one symbol, held for a single aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,
    /// Display name (long name, short name or the symbol itself)
    pub name: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    /// Trailing P/E
    pub pe: Option<f64>,
    /// Dividend yield in percent
    pub dividend_yield: Option<f64>,
    pub market_time: Option<DateTime<Utc>>,
    pub exchange: Option<String>,
}

impl QuoteRecord {
    /// Minimal record for a symbol, all optional fields empty.
    pub fn bare(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self {
            name: symbol.clone(),
            symbol,
            price: None,
            currency: None,
            pe: None,
            dividend_yield: None,
            market_time: None,
            exchange: None,
        }
    }
}

/// Daily close/volume samples for one symbol, oldest first.
///
/// Upstream reports gaps as nulls; they are kept so that trailing windows
/// line up with the calendar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceSeries {
    pub symbol: String,
    pub timestamps: Vec<i64>,
    pub closes: Vec<Option<f64>>,
    pub volumes: Vec<Option<f64>>,
}

impl PriceSeries {
    /// Build a series from closes only (no volume, no timestamps).
    pub fn from_closes(symbol: impl Into<String>, closes: &[f64]) -> Self {
        Self {
            symbol: symbol.into(),
            timestamps: Vec::new(),
            closes: closes.iter().copied().map(Some).collect(),
            volumes: Vec::new(),
        }
    }

    /// Non-null closes in order.
    pub fn valid_closes(&self) -> Vec<f64> {
        self.closes.iter().flatten().copied().collect()
    }

    /// Non-null volumes in order.
    pub fn valid_volumes(&self) -> Vec<f64> {
        self.volumes.iter().flatten().copied().collect()
    }

    /// Most recent non-null close.
    pub fn last_close(&self) -> Option<f64> {
        self.closes.iter().rev().flatten().next().copied()
    }

    /// Timestamp of the most recent sample.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps
            .last()
            .and_then(|&ts| Utc.timestamp_opt(ts, 0).single())
    }
}

// ============================================================================
// HTTP Client
// ============================================================================

/// Build the shared HTTP client with the fixed browser-like header set.
pub fn build_http_client(config: &UpstreamConfig) -> PicksResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static(ACCEPT_LANGUAGE),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));

    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| PicksError::Network(format!("Failed to build HTTP client: {e}")))
}

/// Upstream finance API client.
///
/// Cheap to clone; clones share the HTTP connection pool and the session.
#[derive(Clone)]
pub struct YahooClient {
    http: reqwest::Client,
    auth: Arc<AuthCache>,
    config: Arc<UpstreamConfig>,
}

impl YahooClient {
    /// Create a client with its own session cache.
    pub fn new(config: UpstreamConfig) -> PicksResult<Self> {
        let http = build_http_client(&config)?;
        let config = Arc::new(config);
        let auth = Arc::new(AuthCache::new(http.clone(), Arc::clone(&config)));
        Ok(Self { http, auth, config })
    }

    /// Session cache backing protected requests.
    pub fn auth(&self) -> &Arc<AuthCache> {
        &self.auth
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Absolute URL for an API path.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.query_base.trim_end_matches('/'), path)
    }

    /// Send a request that needs the session credential.
    ///
    /// `build` is called once per attempt with the session to attach. On a
    /// 401 the session is force-refreshed and the request retried once; a
    /// second 401 is an [`PicksError::Auth`].
    pub(crate) async fn send_protected<F>(&self, endpoint: &str, build: F) -> PicksResult<Response>
    where
        F: Fn(&reqwest::Client, &AuthSession) -> RequestBuilder,
    {
        let session = self.auth.get_session(false).await?;
        let response = send(build(&self.http, &session)).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(endpoint, response);
        }

        warn!(endpoint = endpoint, "Upstream rejected session, refreshing");
        let session = self.auth.get_session(true).await?;
        let response = send(build(&self.http, &session)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(PicksError::Auth(format!(
                "{endpoint} still unauthorized after session refresh"
            )));
        }
        check_status(endpoint, response)
    }

    /// Send a request to an open endpoint.
    pub(crate) async fn send_open(&self, endpoint: &str, request: RequestBuilder) -> PicksResult<Response> {
        let response = send(request).await?;
        check_status(endpoint, response)
    }
}

async fn send(request: RequestBuilder) -> PicksResult<Response> {
    request
        .send()
        .await
        .map_err(|e| PicksError::from_reqwest(&e))
}

fn check_status(endpoint: &str, response: Response) -> PicksResult<Response> {
    let status = response.status();
    if status.is_success() {
        debug!(endpoint = endpoint, status = status.as_u16(), "Upstream response");
        Ok(response)
    } else {
        Err(PicksError::Upstream {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Decode a JSON body into `T`.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> PicksResult<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| PicksError::from_reqwest(&e))?;
    serde_json::from_slice(&body).map_err(|e| PicksError::Parse(format!("{endpoint}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_helpers() {
        let series = PriceSeries {
            symbol: "TCS.NS".into(),
            timestamps: vec![1_700_000_000, 1_700_086_400, 1_700_172_800],
            closes: vec![Some(10.0), None, Some(12.0)],
            volumes: vec![None, Some(5.0), Some(7.0)],
        };
        assert_eq!(series.valid_closes(), vec![10.0, 12.0]);
        assert_eq!(series.valid_volumes(), vec![5.0, 7.0]);
        assert_eq!(series.last_close(), Some(12.0));
        assert_eq!(
            series.last_timestamp().map(|t| t.timestamp()),
            Some(1_700_172_800)
        );
    }

    #[test]
    fn test_last_close_skips_trailing_nulls() {
        let series = PriceSeries {
            symbol: "X".into(),
            closes: vec![Some(3.0), None, None],
            ..Default::default()
        };
        assert_eq!(series.last_close(), Some(3.0));
        assert_eq!(PriceSeries::default().last_close(), None);
    }

    #[test]
    fn test_bare_quote_uses_symbol_as_name() {
        let quote = QuoteRecord::bare("AAPL");
        assert_eq!(quote.name, "AAPL");
        assert!(quote.price.is_none());
    }

    #[test]
    fn test_url_joins_base() {
        let config = UpstreamConfig {
            query_base: "http://localhost:9000/".into(),
            ..Default::default()
        };
        let client = YahooClient::new(config).unwrap();
        assert_eq!(
            client.url("/v7/finance/quote"),
            "http://localhost:9000/v7/finance/quote"
        );
    }
}
