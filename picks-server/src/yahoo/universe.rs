//! Candidate universe: most-active symbols per market.

use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::debug;

use super::{read_json, YahooClient};
use crate::error::{PicksError, PicksResult};

// ============================================================================
// Market Table
// ============================================================================

/// Static screener mapping for one market identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSpec {
    pub id: &'static str,
    /// Ticker suffix appended to bare symbols ("" for US listings)
    pub suffix: &'static str,
    pub region: &'static str,
    /// Exchange code used by the screener
    pub exchange: &'static str,
}

pub const MARKETS: &[MarketSpec] = &[
    MarketSpec { id: "NSE", suffix: ".NS", region: "in", exchange: "NSI" },
    MarketSpec { id: "BSE", suffix: ".BO", region: "in", exchange: "BSE" },
    MarketSpec { id: "NASDAQ", suffix: "", region: "us", exchange: "NMS" },
    MarketSpec { id: "NYSE", suffix: "", region: "us", exchange: "NYQ" },
    MarketSpec { id: "LSE", suffix: ".L", region: "gb", exchange: "LSE" },
    MarketSpec { id: "TSX", suffix: ".TO", region: "ca", exchange: "TOR" },
    MarketSpec { id: "ASX", suffix: ".AX", region: "au", exchange: "ASX" },
    MarketSpec { id: "HKEX", suffix: ".HK", region: "hk", exchange: "HKG" },
    MarketSpec { id: "XETRA", suffix: ".DE", region: "de", exchange: "GER" },
    MarketSpec { id: "TSE", suffix: ".T", region: "jp", exchange: "JPX" },
];

/// Look up a market identifier (case-insensitive).
pub fn market_spec(market: &str) -> PicksResult<&'static MarketSpec> {
    MARKETS
        .iter()
        .find(|m| m.id.eq_ignore_ascii_case(market.trim()))
        .ok_or_else(|| PicksError::Validation(format!("unknown market '{market}'")))
}

// ============================================================================
// Screener Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ScreenerResponse {
    finance: ScreenerFinance,
}

#[derive(Debug, Deserialize)]
struct ScreenerFinance {
    #[serde(default)]
    result: Option<Vec<ScreenerResult>>,
}

#[derive(Debug, Deserialize)]
struct ScreenerResult {
    #[serde(default)]
    quotes: Vec<ScreenerQuote>,
}

#[derive(Debug, Deserialize)]
struct ScreenerQuote {
    symbol: Option<String>,
}

// ============================================================================
// Builder
// ============================================================================

/// Fetch up to `limit` most-active symbols for `market`, suffixed and
/// deduplicated in first-seen order.
pub async fn build_candidates(
    client: &YahooClient,
    market: &str,
    limit: usize,
) -> PicksResult<Vec<String>> {
    let spec = market_spec(market)?;
    if limit == 0 {
        return Ok(Vec::new());
    }

    let url = client.url("/v1/finance/screener");
    let body = screener_query(spec, limit);

    let response = client
        .send_protected("screener", |http, session| {
            session.apply(http.post(&url).json(&body))
        })
        .await?;
    let parsed: ScreenerResponse = read_json("screener", response).await?;

    let raw: Vec<String> = parsed
        .finance
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|r| r.quotes.into_iter().filter_map(|q| q.symbol).collect())
        .unwrap_or_default();

    let candidates = normalize_symbols(raw, spec.suffix, limit);
    debug!(market = spec.id, count = candidates.len(), "Built candidate universe");
    Ok(candidates)
}

fn screener_query(spec: &MarketSpec, limit: usize) -> serde_json::Value {
    json!({
        "offset": 0,
        "size": limit,
        "sortField": "dayvolume",
        "sortType": "DESC",
        "quoteType": "EQUITY",
        "query": {
            "operator": "AND",
            "operands": [
                { "operator": "eq", "operands": ["region", spec.region] },
                { "operator": "eq", "operands": ["exchange", spec.exchange] }
            ]
        },
        "userId": "",
        "userIdType": "guid"
    })
}

/// Apply the market suffix where missing, drop duplicates and blanks, and
/// cap the list.
pub fn normalize_symbols<I>(raw: I, suffix: &str, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for symbol in raw {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }
        let symbol = if suffix.is_empty() || symbol.ends_with(&suffix.to_uppercase()) {
            symbol
        } else {
            format!("{symbol}{suffix}")
        };
        if seen.insert(symbol.clone()) {
            out.push(symbol);
            if out.len() == limit {
                break;
            }
        }
    }

    out
}
