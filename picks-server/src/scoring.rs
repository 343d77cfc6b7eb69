//! Composite scoring and trade plans.
//!
//! A pick's total score is the sum of four integer components:
//!
//! | Component   | Signals |
//! |-------------|---------|
//! | technical   | price vs fast SMA, fast vs slow SMA, RSI band / overbought, price vs levels |
//! | fundamental | P/E band / expensive, dividend yield |
//! | news        | keyword sentiment, clamped |
//! | volume      | latest volume vs recent average |
//!
//! Missing inputs contribute nothing.

use picks_common::ScoringConfig;
use serde::{Deserialize, Serialize};

use crate::indicators::Indicators;
use crate::yahoo::{PriceSeries, QuoteRecord};

/// Separator between rationale facts
pub const RATIONALE_SEPARATOR: &str = " · ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub technical: i32,
    pub fundamental: i32,
    pub news: i32,
    pub volume: i32,
    pub total: i32,
}

/// Entry, stop and targets; all `None` with an empty note when levels are
/// unknown.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradePlan {
    pub entry: Option<f64>,
    pub stop: Option<f64>,
    pub target1: Option<f64>,
    pub target2: Option<f64>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub scores: ScoreBreakdown,
    pub plan: TradePlan,
    pub indicators: Indicators,
    pub rationale: String,
}

/// Score one symbol.
///
/// "Price" is the last valid close of `series`; the quote supplies the
/// fundamentals only. `news_net` is `None` until headlines have been
/// fetched for the symbol.
pub fn score(
    series: &PriceSeries,
    quote: &QuoteRecord,
    news_net: Option<i32>,
    config: &ScoringConfig,
) -> ScoreCard {
    let indicators = Indicators::compute(series, config);
    let price = series.last_close();

    let technical = technical_score(price, &indicators, config);
    let fundamental = fundamental_score(quote, config);
    let news = news_net.map(|net| net.clamp(-config.news_clamp, config.news_clamp));
    let volume = volume_score(indicators.volume_shock, config);

    let scores = ScoreBreakdown {
        technical,
        fundamental,
        news: news.unwrap_or(0),
        volume,
        total: technical + fundamental + news.unwrap_or(0) + volume,
    };

    ScoreCard {
        scores,
        plan: trade_plan(price, indicators.support, indicators.resistance, config),
        rationale: rationale(price, &indicators, quote, news, config),
        indicators,
    }
}

fn technical_score(price: Option<f64>, ind: &Indicators, config: &ScoringConfig) -> i32 {
    let mut score = 0;

    if let (Some(p), Some(fast)) = (price, ind.sma_fast) {
        if p > fast {
            score += 1;
        }
    }
    if let (Some(fast), Some(slow)) = (ind.sma_fast, ind.sma_slow) {
        if fast > slow {
            score += 1;
        }
    }
    if let Some(rsi) = ind.rsi {
        let (lo, hi) = config.rsi_band;
        if (lo..=hi).contains(&rsi) {
            score += 1;
        }
        if rsi > config.rsi_overbought {
            score -= 1;
        }
    }
    if let Some(p) = price {
        if ind.resistance.is_some_and(|r| p > r) {
            score += 1;
        }
        if ind.support.is_some_and(|s| p < s) {
            score -= 1;
        }
    }

    score
}

fn fundamental_score(quote: &QuoteRecord, config: &ScoringConfig) -> i32 {
    let mut score = 0;

    if let Some(pe) = quote.pe {
        let (lo, hi) = config.pe_band;
        if (lo..=hi).contains(&pe) {
            score += 1;
        }
        if pe > config.pe_expensive {
            score -= 1;
        }
    }
    if quote
        .dividend_yield
        .is_some_and(|y| y >= config.min_dividend_yield)
    {
        score += 1;
    }

    score
}

fn volume_score(shock: Option<f64>, config: &ScoringConfig) -> i32 {
    match shock {
        Some(r) if r >= config.volume_shock_high => 1,
        Some(r) if r <= config.volume_shock_low => -1,
        _ => 0,
    }
}

/// Breakout plan above resistance, support-bounce plan otherwise.
pub fn trade_plan(
    price: Option<f64>,
    support: Option<f64>,
    resistance: Option<f64>,
    config: &ScoringConfig,
) -> TradePlan {
    let (Some(price), Some(support), Some(resistance)) = (price, support, resistance) else {
        return TradePlan::default();
    };

    let (entry, stop, note) = if price > resistance {
        (
            resistance * config.breakout_entry,
            resistance * config.breakout_stop,
            "Breakout above resistance",
        )
    } else {
        (
            support * config.bounce_entry,
            support * config.bounce_stop,
            "Support bounce",
        )
    };
    let risk = entry - stop;
    let (m1, m2) = config.target_multiples;

    TradePlan {
        entry: Some(entry),
        stop: Some(stop),
        target1: Some(entry + m1 * risk),
        target2: Some(entry + m2 * risk),
        note: note.to_string(),
    }
}

fn rationale(
    price: Option<f64>,
    ind: &Indicators,
    quote: &QuoteRecord,
    news: Option<i32>,
    config: &ScoringConfig,
) -> String {
    let mut facts = Vec::new();

    if let (Some(p), Some(fast)) = (price, ind.sma_fast) {
        let side = if p > fast { "above" } else { "below" };
        facts.push(format!("Price {side} SMA{}", config.sma_fast));
    }
    if let (Some(fast), Some(slow)) = (ind.sma_fast, ind.sma_slow) {
        let side = if fast > slow { "above" } else { "below" };
        facts.push(format!("SMA{} {side} SMA{}", config.sma_fast, config.sma_slow));
    }
    if let Some(rsi) = ind.rsi {
        facts.push(format!("RSI {rsi:.1}"));
    }
    match (ind.support, ind.resistance) {
        (Some(s), Some(r)) => facts.push(format!("Support {s:.2} / Resistance {r:.2}")),
        (Some(s), None) => facts.push(format!("Support {s:.2}")),
        (None, Some(r)) => facts.push(format!("Resistance {r:.2}")),
        (None, None) => {}
    }
    if let Some(pe) = quote.pe {
        facts.push(format!("P/E {pe:.1}"));
    }
    if let Some(y) = quote.dividend_yield {
        facts.push(format!("Dividend yield {y:.2}%"));
    }
    if let Some(news) = news {
        facts.push(format!("News {news:+}"));
    }
    if let Some(shock) = ind.volume_shock {
        facts.push(format!("Volume {shock:.1}x avg"));
    }

    facts.join(RATIONALE_SEPARATOR)
}

/// Order by total score descending; equal totals keep their input order.
pub fn rank_by_total<T, F>(items: &mut [T], total: F)
where
    F: Fn(&T) -> i32,
{
    items.sort_by(|a, b| total(b).cmp(&total(a)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(pe: Option<f64>, dividend_yield: Option<f64>) -> QuoteRecord {
        QuoteRecord {
            pe,
            dividend_yield,
            ..QuoteRecord::bare("TEST")
        }
    }

    /// 60 closes from 100 alternating +3 / -2, so every up day is a new high
    /// and RSI settles near 60. Volume doubles on the last day.
    fn rising_series() -> PriceSeries {
        let mut closes = vec![100.0];
        for i in 1..60 {
            let step = if i % 2 == 1 { 3.0 } else { -2.0 };
            closes.push(closes[i - 1] + step);
        }
        let mut volumes = vec![Some(1000.0); 59];
        volumes.push(Some(2000.0));
        PriceSeries {
            symbol: "TEST".into(),
            timestamps: Vec::new(),
            closes: closes.into_iter().map(Some).collect(),
            volumes,
        }
    }

    #[test]
    fn test_scenario_rising_series() {
        let config = ScoringConfig::default();
        let card = score(&rising_series(), &quote(Some(15.0), Some(2.0)), Some(1), &config);

        assert!(card.scores.technical >= 2, "technical {}", card.scores.technical);
        assert_eq!(card.scores.fundamental, 2);
        assert_eq!(card.scores.news, 1);
        assert_eq!(card.scores.volume, 1);
        assert!(card.scores.total >= 6);
        assert_eq!(
            card.scores.total,
            card.scores.technical + card.scores.fundamental + card.scores.news + card.scores.volume
        );

        let resistance = card.indicators.resistance.unwrap();
        assert_eq!(card.plan.note, "Breakout above resistance");
        assert!(card.plan.entry.unwrap() > resistance);
    }

    #[test]
    fn test_score_is_pure() {
        let config = ScoringConfig::default();
        let series = rising_series();
        let q = quote(Some(30.0), None);
        let a = score(&series, &q, Some(-3), &config);
        let b = score(&series, &q, Some(-3), &config);
        assert_eq!(a, b);
        assert_eq!(a.scores.news, -2);
    }

    #[test]
    fn test_plan_null_without_levels() {
        let config = ScoringConfig::default();
        let plan = trade_plan(Some(10.0), None, Some(12.0), &config);
        assert_eq!(plan, TradePlan::default());
        assert!(plan.note.is_empty());

        let card = score(&PriceSeries::from_closes("X", &[10.0]), &quote(None, None), None, &config);
        assert!(card.plan.entry.is_none());
        assert!(card.plan.target2.is_none());
    }

    #[test]
    fn test_plan_ordering() {
        let config = ScoringConfig::default();
        for plan in [
            trade_plan(Some(130.0), Some(90.0), Some(120.0), &config),
            trade_plan(Some(100.0), Some(90.0), Some(120.0), &config),
        ] {
            let (entry, stop) = (plan.entry.unwrap(), plan.stop.unwrap());
            assert!(stop < entry);
            assert!(entry < plan.target1.unwrap());
            assert!(plan.target1.unwrap() < plan.target2.unwrap());
        }

        let bounce = trade_plan(Some(100.0), Some(90.0), Some(120.0), &config);
        assert_eq!(bounce.note, "Support bounce");
        assert!((bounce.entry.unwrap() - 90.9).abs() < 1e-9);
        assert!((bounce.stop.unwrap() - 88.65).abs() < 1e-9);
        assert!((bounce.target1.unwrap() - (90.9 + 1.5 * 2.25)).abs() < 1e-9);
    }

    #[test]
    fn test_fundamental_thresholds() {
        let config = ScoringConfig::default();
        assert_eq!(fundamental_score(&quote(Some(8.0), Some(1.0)), &config), 2);
        assert_eq!(fundamental_score(&quote(Some(30.0), None), &config), 0);
        assert_eq!(fundamental_score(&quote(Some(40.0), Some(0.5)), &config), -1);
        assert_eq!(fundamental_score(&quote(None, None), &config), 0);
    }

    #[test]
    fn test_volume_thresholds() {
        let config = ScoringConfig::default();
        assert_eq!(volume_score(Some(1.5), &config), 1);
        assert_eq!(volume_score(Some(1.0), &config), 0);
        assert_eq!(volume_score(Some(0.7), &config), -1);
        assert_eq!(volume_score(None, &config), 0);
    }

    #[test]
    fn test_rationale_only_available_facts() {
        let config = ScoringConfig::default();
        let series = PriceSeries::from_closes("X", &[10.0, 11.0, 12.0]);
        let card = score(&series, &quote(Some(12.0), None), None, &config);
        assert_eq!(card.rationale, "Support 10.00 / Resistance 11.00 · P/E 12.0");

        let card = score(&series, &quote(None, None), Some(-1), &config);
        assert!(card.rationale.ends_with("News -1"));
    }

    #[test]
    fn test_rationale_keeps_neutral_news_once_fetched() {
        let config = ScoringConfig::default();
        let series = PriceSeries::from_closes("X", &[10.0, 11.0, 12.0]);

        let card = score(&series, &quote(None, None), Some(0), &config);
        assert_eq!(card.scores.news, 0);
        assert!(card.rationale.ends_with("News +0"));

        let unfetched = score(&series, &quote(None, None), None, &config);
        assert_eq!(unfetched.scores, card.scores);
        assert!(!unfetched.rationale.contains("News"));
    }

    #[test]
    fn test_trailing_null_bar_keeps_breakout() {
        let config = ScoringConfig::default();
        let closes: Vec<f64> = (100..=160).map(f64::from).collect();
        let mut series = PriceSeries::from_closes("X", &closes);
        let complete = score(&series, &quote(None, None), None, &config);

        series.closes.push(None);
        let unfinished = score(&series, &quote(None, None), None, &config);

        assert_eq!(unfinished.indicators.resistance, Some(159.0));
        assert_eq!(unfinished.plan.note, "Breakout above resistance");
        assert_eq!(unfinished.plan, complete.plan);
        assert_eq!(unfinished.scores, complete.scores);
    }

    #[test]
    fn test_rank_is_stable() {
        let mut items = vec![("a", 1), ("b", 3), ("c", 1), ("d", 3), ("e", 2)];
        rank_by_total(&mut items, |item| item.1);
        let order: Vec<&str> = items.iter().map(|i| i.0).collect();
        assert_eq!(order, vec!["b", "d", "e", "a", "c"]);
    }
}
