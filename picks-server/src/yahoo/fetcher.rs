//! Batch quote and history fetching.
//!
//! Symbols are split into chunks under the upstream size limits and fetched
//! with bounded parallelism. A failed chunk never aborts the batch: its
//! symbols are reported as failed and the rest of the data is returned.

use chrono::{TimeZone, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, warn};

use super::{read_json, PriceSeries, QuoteRecord, YahooClient, MAX_HISTORY_CHUNK, MAX_QUOTE_CHUNK};
use crate::error::{PicksError, PicksResult};

/// Result of a chunked fetch.
#[derive(Debug, Clone)]
pub struct BatchFetch<T> {
    pub items: HashMap<String, T>,
    /// Requested symbols with no data, in request order
    pub failed: Vec<String>,
    pub requested: usize,
}

impl<T> BatchFetch<T> {
    /// The partial-failure report, if any symbol is missing.
    pub fn partial_failure(&self) -> Option<PicksError> {
        (!self.failed.is_empty()).then(|| PicksError::PartialBatch {
            failed: self.failed.len(),
            total: self.requested,
        })
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Fetch quote snapshots (protected endpoint).
pub async fn fetch_quotes(client: &YahooClient, symbols: &[String]) -> BatchFetch<QuoteRecord> {
    let chunk_size = client.config().quote_chunk_size.clamp(1, MAX_QUOTE_CHUNK);
    fetch_chunked("quote", symbols, chunk_size, client.config().fetch_concurrency, |chunk| {
        quote_chunk(client, chunk)
    })
    .await
}

/// Fetch daily close/volume history (open endpoint).
pub async fn fetch_history(client: &YahooClient, symbols: &[String]) -> BatchFetch<PriceSeries> {
    let chunk_size = client.config().history_chunk_size.clamp(1, MAX_HISTORY_CHUNK);
    fetch_chunked("spark", symbols, chunk_size, client.config().fetch_concurrency, |chunk| {
        history_chunk(client, chunk)
    })
    .await
}

/// Run `fetch` over `symbols` in chunks of `chunk_size`, at most
/// `concurrency` chunks at a time.
pub async fn fetch_chunked<T, F, Fut>(
    endpoint: &str,
    symbols: &[String],
    chunk_size: usize,
    concurrency: usize,
    fetch: F,
) -> BatchFetch<T>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = PicksResult<HashMap<String, T>>>,
{
    let chunks: Vec<Vec<String>> = symbols
        .chunks(chunk_size.max(1))
        .map(<[String]>::to_vec)
        .collect();
    let chunk_count = chunks.len();

    let results: Vec<PicksResult<HashMap<String, T>>> = stream::iter(chunks)
        .map(|chunk| {
            let size = chunk.len();
            let fut = fetch(chunk);
            async move {
                fut.await.map_err(|e| {
                    warn!(endpoint = endpoint, symbols = size, error = %e, "Chunk fetch failed");
                    e
                })
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut items = HashMap::new();
    for map in results.into_iter().flatten() {
        items.extend(map);
    }

    let failed: Vec<String> = symbols
        .iter()
        .filter(|s| !items.contains_key(*s))
        .cloned()
        .collect();

    debug!(
        endpoint = endpoint,
        chunks = chunk_count,
        fetched = items.len(),
        failed = failed.len(),
        "Batch fetch complete"
    );

    BatchFetch {
        items,
        failed,
        requested: symbols.len(),
    }
}

// ============================================================================
// Quote Endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEnvelope {
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<RawQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuote {
    symbol: String,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    currency: Option<String>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    dividend_yield: Option<f64>,
    trailing_annual_dividend_yield: Option<f64>,
    regular_market_time: Option<i64>,
    full_exchange_name: Option<String>,
    exchange: Option<String>,
}

impl From<RawQuote> for QuoteRecord {
    fn from(raw: RawQuote) -> Self {
        let name = raw
            .long_name
            .or(raw.short_name)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| raw.symbol.clone());
        // `dividendYield` is already a percentage; the trailing annual figure
        // is a fraction.
        let dividend_yield = raw
            .dividend_yield
            .or(raw.trailing_annual_dividend_yield.map(|y| y * 100.0));

        Self {
            symbol: raw.symbol,
            name,
            price: raw.regular_market_price,
            currency: raw.currency,
            pe: raw.trailing_pe,
            dividend_yield,
            market_time: raw
                .regular_market_time
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            exchange: raw.full_exchange_name.or(raw.exchange),
        }
    }
}

async fn quote_chunk(
    client: &YahooClient,
    chunk: Vec<String>,
) -> PicksResult<HashMap<String, QuoteRecord>> {
    let url = client.url("/v7/finance/quote");
    let joined = chunk.join(",");

    let response = client
        .send_protected("quote", |http, session| {
            session.apply(http.get(&url).query(&[("symbols", joined.as_str())]))
        })
        .await?;
    let envelope: QuoteEnvelope = read_json("quote", response).await?;

    Ok(envelope
        .quote_response
        .result
        .into_iter()
        .map(|raw| {
            let quote = QuoteRecord::from(raw);
            (quote.symbol.clone(), quote)
        })
        .collect())
}

// ============================================================================
// Spark Endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
struct SparkEnvelope {
    spark: SparkBody,
}

#[derive(Debug, Deserialize)]
struct SparkBody {
    #[serde(default)]
    result: Vec<SparkResult>,
}

#[derive(Debug, Deserialize)]
struct SparkResult {
    symbol: String,
    #[serde(default)]
    response: Vec<SparkResponse>,
}

#[derive(Debug, Deserialize)]
struct SparkResponse {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: SparkIndicators,
}

#[derive(Debug, Deserialize)]
struct SparkIndicators {
    #[serde(default)]
    quote: Vec<SparkQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct SparkQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl SparkResult {
    /// `None` when the response carries no usable close.
    fn into_series(self) -> Option<PriceSeries> {
        let response = self.response.into_iter().next()?;
        let quote = response.indicators.quote.into_iter().next()?;
        if quote.close.iter().all(Option::is_none) {
            return None;
        }
        Some(PriceSeries {
            symbol: self.symbol,
            timestamps: response.timestamp,
            closes: quote.close,
            volumes: quote.volume,
        })
    }
}

async fn history_chunk(
    client: &YahooClient,
    chunk: Vec<String>,
) -> PicksResult<HashMap<String, PriceSeries>> {
    let config = client.config();
    let request = client.http().get(client.url("/v8/finance/spark")).query(&[
        ("symbols", chunk.join(",").as_str()),
        ("range", config.history_range.as_str()),
        ("interval", config.history_interval.as_str()),
    ]);

    let response = client.send_open("spark", request).await?;
    let envelope: SparkEnvelope = read_json("spark", response).await?;

    Ok(envelope
        .spark
        .result
        .into_iter()
        .filter_map(SparkResult::into_series)
        .map(|series| (series.symbol.clone(), series))
        .collect())
}
