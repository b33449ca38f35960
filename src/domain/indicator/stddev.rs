//! Rolling sample standard deviation of closing prices.
//!
//! STDDEV(n)[i] = sqrt(sum((C[i-j] - SMA(n)[i])^2 for j in 0..n) / (n - 1))
//! Warmup: first (n-1) bars are invalid; n < 2 is never valid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

/// Sample standard deviation and mean of one window. `None` for fewer than two values.
pub(crate) fn window_stats(window: &[f64]) -> Option<(f64, f64)> {
    if window.len() < 2 {
        return None;
    }
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}

pub fn calculate_stddev(bars: &[Bar], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let stats = (i + 1 >= period)
                .then(|| window_stats(&closes[i + 1 - period..=i]))
                .flatten();
            IndicatorPoint {
                timestamp: bar.timestamp,
                valid: stats.is_some(),
                value: IndicatorValue::Simple(stats.map_or(0.0, |(_, sd)| sd)),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Stddev(period),
        values,
    }
}
