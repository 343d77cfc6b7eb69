//! Technical indicators over daily price series.
//!
//! All functions are pure. Positions without enough history are `None`,
//! never zero-filled.

use picks_common::ScoringConfig;
use serde::{Deserialize, Serialize};

use crate::yahoo::PriceSeries;

/// Guards the RSI gain/loss ratio against division by zero.
pub const RSI_EPSILON: f64 = 1e-9;

/// Simple moving average. Index `i` is defined once `n` samples are
/// available up to and including `i`.
pub fn sma(values: &[f64], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if n == 0 || values.len() < n {
        return out;
    }

    let mut sum: f64 = values[..n].iter().sum();
    out[n - 1] = Some(sum / n as f64);
    for i in n..values.len() {
        sum += values[i] - values[i - n];
        out[i] = Some(sum / n as f64);
    }
    out
}

/// Wilder's RSI.
///
/// The first `n` changes seed the average gain/loss, giving the first value
/// at index `n`; later values smooth with weight `1/n`. A run with no losses
/// approaches 100, a run with no gains is 0.
pub fn rsi(values: &[f64], n: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if n == 0 || values.len() <= n {
        return out;
    }

    let (mut avg_gain, mut avg_loss) = (0.0, 0.0);
    for i in 1..=n {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= n as f64;
    avg_loss /= n as f64;
    out[n] = Some(rsi_value(avg_gain, avg_loss));

    let period = n as f64;
    for i in (n + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (period - 1.0) + gain) / period;
        avg_loss = (avg_loss * (period - 1.0) + loss) / period;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = avg_gain / (avg_loss + RSI_EPSILON);
    100.0 - 100.0 / (1.0 + rs)
}

/// Support (min) and resistance (max) over the `look` samples before the
/// latest non-null close, skipping nulls.
///
/// The latest close is excluded so that "price above resistance" can mark a
/// breakout from the prior range. Trailing null bars (an unfinished session)
/// sit after it and are ignored.
pub fn support_resistance(closes: &[Option<f64>], look: usize) -> (Option<f64>, Option<f64>) {
    if look == 0 {
        return (None, None);
    }
    let Some(latest) = closes.iter().rposition(Option::is_some) else {
        return (None, None);
    };
    let prior = &closes[..latest];
    let window = &prior[prior.len().saturating_sub(look)..];

    window
        .iter()
        .flatten()
        .fold((None, None), |(lo, hi): (Option<f64>, Option<f64>), &c| {
            (
                Some(lo.map_or(c, |l| l.min(c))),
                Some(hi.map_or(c, |h| h.max(c))),
            )
        })
}

/// Latest volume relative to the average of up to `lookback` samples
/// before it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VolumeShock {
    pub ratio: Option<f64>,
    pub average: Option<f64>,
}

pub fn volume_shock(volumes: &[f64], lookback: usize) -> VolumeShock {
    let Some((&latest, prior)) = volumes.split_last() else {
        return VolumeShock::default();
    };
    let window = &prior[prior.len().saturating_sub(lookback)..];
    if window.is_empty() {
        return VolumeShock::default();
    }

    let average = window.iter().sum::<f64>() / window.len() as f64;
    VolumeShock {
        ratio: (average > 0.0).then(|| latest / average),
        average: Some(average),
    }
}

/// Indicator snapshot attached to each pick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Indicators {
    pub sma_fast: Option<f64>,
    pub sma_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub volume_shock: Option<f64>,
    pub avg_volume: Option<f64>,
}

impl Indicators {
    /// Latest indicator values for a series.
    pub fn compute(series: &PriceSeries, config: &ScoringConfig) -> Self {
        let closes = series.valid_closes();
        let (support, resistance) = support_resistance(&series.closes, config.level_lookback);
        let shock = volume_shock(&series.valid_volumes(), config.volume_lookback);

        Self {
            sma_fast: last_defined(&sma(&closes, config.sma_fast)),
            sma_slow: last_defined(&sma(&closes, config.sma_slow)),
            rsi: last_defined(&rsi(&closes, config.rsi_period)),
            support,
            resistance,
            volume_shock: shock.ratio,
            avg_volume: shock.average,
        }
    }
}

fn last_defined(values: &[Option<f64>]) -> Option<f64> {
    values.last().copied().flatten()
}
