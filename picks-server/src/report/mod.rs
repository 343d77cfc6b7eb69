//! Daily report: payload types, generation and caching.

pub mod cache;
pub mod generator;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PicksError, PicksResult};
use crate::indicators::Indicators;
use crate::news::Headline;
use crate::scoring::{ScoreBreakdown, TradePlan};

pub use cache::{CacheState, CacheStatus, ReportCache};
pub use generator::{PayloadGenerator, ReportGenerator};
pub use store::{create_store, EdgeStore, MemoryEdgeStore};

/// One ranked symbol in a market's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub symbol: String,
    pub name: String,
    pub currency: Option<String>,
    pub price: Option<f64>,
    pub plan: TradePlan,
    pub scores: ScoreBreakdown,
    pub indicators: Indicators,
    #[serde(default)]
    pub headlines: Vec<Headline>,
    pub rationale: String,
    /// Time of the quote (or last history sample) the pick is based on
    pub data_timestamp: Option<DateTime<Utc>>,
}

/// Outcome of one market's pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketResult {
    pub market: String,
    pub picks: Vec<Pick>,
    /// Symbols returned by the screener
    pub scanned: usize,
    /// Symbols with both a quote and a usable price series
    pub processed: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl MarketResult {
    pub fn empty(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            picks: Vec::new(),
            scanned: 0,
            processed: 0,
            failed: 0,
            elapsed_secs: 0.0,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMetadata {
    pub generation_id: String,
    /// Markets in processing order
    pub markets: Vec<String>,
    pub refresh_interval_hours: u64,
    pub export_cap: usize,
    pub news_top_n: usize,
    pub source: String,
    pub version: String,
}

/// The cached unit: one generation, valid until `next_update_at`.
///
/// Never mutated after publication; a refresh replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPayload {
    pub generated_at: DateTime<Utc>,
    pub next_update_at: DateTime<Utc>,
    pub markets: BTreeMap<String, MarketResult>,
    pub metadata: PayloadMetadata,
}

impl DailyPayload {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.next_update_at
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    /// Copy of the payload restricted to one market.
    pub fn for_market(&self, market: &str) -> PicksResult<Self> {
        let key = market.trim().to_uppercase();
        let result = self.markets.get(&key).ok_or_else(|| {
            PicksError::Validation(format!("market '{market}' is not part of this report"))
        })?;

        Ok(Self {
            generated_at: self.generated_at,
            next_update_at: self.next_update_at,
            markets: BTreeMap::from([(key, result.clone())]),
            metadata: self.metadata.clone(),
        })
    }

    pub fn total_processed(&self) -> usize {
        self.markets.values().map(|m| m.processed).sum()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::Duration;

    /// Payload with one empty result per market.
    pub fn payload(markets: &[&str], valid_for: Duration) -> DailyPayload {
        let now = Utc::now();
        DailyPayload {
            generated_at: now,
            next_update_at: now + valid_for,
            markets: markets
                .iter()
                .map(|m| {
                    let mut result = MarketResult::empty(*m);
                    result.processed = 1;
                    (m.to_string(), result)
                })
                .collect(),
            metadata: PayloadMetadata {
                generation_id: "test".into(),
                markets: markets.iter().map(|m| m.to_string()).collect(),
                refresh_interval_hours: 24,
                export_cap: 20,
                news_top_n: 1,
                source: "test".into(),
                version: "0.0.0".into(),
            },
        }
    }
}
