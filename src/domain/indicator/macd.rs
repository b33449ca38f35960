//! MACD (Moving Average Convergence Divergence).
//!
//! DIF = EMA(fast) - EMA(slow)
//! DEA = EMA(signal) of DIF
//! Histogram = DIF - DEA
//!
//! EMAs are recursive and seeded with the first input, so every bar carries
//! a value. Points are flagged valid once the slow EMA has seen `slow` bars.

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, ema_values, invalid_series,
};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[Bar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };
    if fast == 0 || slow == 0 || signal_period == 0 {
        return invalid_series(
            indicator_type,
            bars.iter().map(|b| b.timestamp),
            IndicatorValue::Macd {
                dif: 0.0,
                dea: 0.0,
                histogram: 0.0,
            },
        );
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema_fast = ema_values(&closes, fast);
    let ema_slow = ema_values(&closes, slow);
    let dif: Vec<f64> = ema_fast.iter().zip(&ema_slow).map(|(f, s)| f - s).collect();
    let dea = ema_values(&dif, signal_period);

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| IndicatorPoint {
            timestamp: bar.timestamp,
            valid: i + 1 >= slow,
            value: IndicatorValue::Macd {
                dif: dif[i],
                dea: dea[i],
                histogram: dif[i] - dea[i],
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
