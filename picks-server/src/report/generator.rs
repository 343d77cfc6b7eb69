//! Report generation: the per-market pipeline.
//!
//! For each configured market, in order:
//!
//! 1. Screener → candidate symbols
//! 2. Quotes and price history, chunked
//! 3. Indicators + score for every symbol with both
//! 4. Rank, enrich the top N with news, re-rank
//! 5. Truncate to the export cap
//!
//! A market that fails records its error in `notes` and the run moves on.
//! Only a run where no market processed a single symbol fails as a whole.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use picks_common::logging::generate_trace_id;
use picks_common::util::round_to;
use picks_common::PicksConfig;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use super::{DailyPayload, MarketResult, PayloadMetadata, Pick};
use crate::error::{PicksError, PicksResult};
use crate::news::{Headline, NewsScorer};
use crate::scoring::{rank_by_total, score, ScoreCard};
use crate::yahoo::fetcher::{fetch_history, fetch_quotes};
use crate::yahoo::universe::build_candidates;
use crate::yahoo::{PriceSeries, QuoteRecord, YahooClient};

/// Data source label recorded in payload metadata
const SOURCE: &str = "yahoo-finance";

/// Produces a complete payload.
#[async_trait]
pub trait PayloadGenerator: Send + Sync {
    async fn generate(&self) -> PicksResult<DailyPayload>;
}

/// A scored symbol before export.
struct Candidate {
    quote: QuoteRecord,
    series: PriceSeries,
    card: ScoreCard,
    headlines: Vec<Headline>,
}

impl Candidate {
    fn into_pick(self) -> Pick {
        let data_timestamp = self.quote.market_time.or_else(|| self.series.last_timestamp());
        Pick {
            price: self.series.last_close().or(self.quote.price),
            symbol: self.quote.symbol,
            name: self.quote.name,
            currency: self.quote.currency,
            plan: self.card.plan,
            scores: self.card.scores,
            indicators: self.card.indicators,
            headlines: self.headlines,
            rationale: self.card.rationale,
            data_timestamp,
        }
    }
}

pub struct ReportGenerator {
    yahoo: YahooClient,
    news: NewsScorer,
    config: PicksConfig,
}

impl ReportGenerator {
    pub fn new(yahoo: YahooClient, news: NewsScorer, config: PicksConfig) -> Self {
        Self {
            yahoo,
            news,
            config,
        }
    }

    /// Run the pipeline for one market. Never fails; problems are noted.
    pub async fn run_market(&self, market: &str) -> MarketResult {
        let started = Instant::now();
        let mut result = MarketResult::empty(market);

        match build_candidates(&self.yahoo, market, self.config.scan_limit).await {
            Ok(symbols) => self.process_symbols(&symbols, &mut result).await,
            Err(e) => {
                warn!(market = market, error = %e, "Universe build failed");
                result.notes.push(format!("universe: {e}"));
            }
        }

        result.elapsed_secs = round_to(started.elapsed().as_secs_f64(), 2);
        info!(
            market = market,
            scanned = result.scanned,
            processed = result.processed,
            failed = result.failed,
            picks = result.picks.len(),
            elapsed_secs = result.elapsed_secs,
            "Market processed"
        );
        result
    }

    async fn process_symbols(&self, symbols: &[String], result: &mut MarketResult) {
        result.scanned = symbols.len();
        if symbols.is_empty() {
            result.notes.push("screener returned no symbols".into());
            return;
        }

        let (mut quotes, mut history) = tokio::join!(
            fetch_quotes(&self.yahoo, symbols),
            fetch_history(&self.yahoo, symbols)
        );
        if let Some(e) = quotes.partial_failure() {
            result.notes.push(format!("quotes: {e}"));
        }
        if let Some(e) = history.partial_failure() {
            result.notes.push(format!("history: {e}"));
        }

        let scoring = &self.config.scoring;
        let mut candidates: Vec<Candidate> = symbols
            .iter()
            .filter_map(|symbol| {
                let quote = quotes.items.remove(symbol)?;
                let series = history.items.remove(symbol)?;
                if series.last_close().is_none() {
                    return None;
                }
                let card = score(&series, &quote, None, scoring);
                Some(Candidate {
                    quote,
                    series,
                    card,
                    headlines: Vec::new(),
                })
            })
            .collect();

        result.processed = candidates.len();
        result.failed = result.scanned - result.processed;

        rank_by_total(&mut candidates, |c| c.card.scores.total);
        self.enrich_with_news(&mut candidates, result).await;
        rank_by_total(&mut candidates, |c| c.card.scores.total);

        candidates.truncate(self.config.export_cap);
        result.picks = candidates.into_iter().map(Candidate::into_pick).collect();
    }

    /// Fetch news for the top-ranked candidates and rescore them.
    async fn enrich_with_news(&self, candidates: &mut [Candidate], result: &mut MarketResult) {
        for candidate in candidates.iter_mut().take(self.config.news_top_n) {
            match self.news.fetch_sentiment(&candidate.quote.name).await {
                Ok(sentiment) => {
                    candidate.card = score(
                        &candidate.series,
                        &candidate.quote,
                        Some(sentiment.net),
                        &self.config.scoring,
                    );
                    candidate.headlines = sentiment.headlines;
                }
                Err(e) => {
                    warn!(symbol = %candidate.quote.symbol, error = %e, "News lookup failed");
                    result
                        .notes
                        .push(format!("news {}: {e}", candidate.quote.symbol));
                }
            }
        }
    }
}

#[async_trait]
impl PayloadGenerator for ReportGenerator {
    async fn generate(&self) -> PicksResult<DailyPayload> {
        let generation_id = generate_trace_id();
        info!(
            generation_id = %generation_id,
            markets = ?self.config.markets,
            "Starting report generation"
        );

        let mut markets = BTreeMap::new();
        for market in &self.config.markets {
            let result = self.run_market(market).await;
            markets.insert(market.to_uppercase(), result);
        }

        if markets.values().all(|m| m.processed == 0) {
            let reasons: Vec<String> = markets
                .values()
                .flat_map(|m| m.notes.iter().map(move |n| format!("{}: {n}", m.market)))
                .collect();
            return Err(PicksError::Generation(format!(
                "no market produced any scored symbol ({})",
                reasons.join("; ")
            )));
        }

        let interval_hours = i64::try_from(self.config.refresh_interval_hours).unwrap_or(24);
        let now = Utc::now();
        let payload = DailyPayload {
            generated_at: now,
            next_update_at: now + Duration::hours(interval_hours),
            markets,
            metadata: PayloadMetadata {
                generation_id: generation_id.clone(),
                markets: self.config.markets.iter().map(|m| m.to_uppercase()).collect(),
                refresh_interval_hours: self.config.refresh_interval_hours,
                export_cap: self.config.export_cap,
                news_top_n: self.config.news_top_n,
                source: SOURCE.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        info!(
            generation_id = %generation_id,
            processed = payload.total_processed(),
            "Report generation complete"
        );
        Ok(payload)
    }
}
