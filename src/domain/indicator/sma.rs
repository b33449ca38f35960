//! Simple Moving Average over closing prices.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]). Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, invalid_series,
};
use crate::domain::ohlcv::Bar;

pub fn calculate_sma(bars: &[Bar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return invalid_series(
            IndicatorType::Sma(period),
            bars.iter().map(|b| b.timestamp),
            IndicatorValue::Simple(0.0),
        );
    }

    let mut values = Vec::with_capacity(bars.len());
    let mut sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        sum += bar.close;
        if i >= period {
            sum -= bars[i - period].close;
        }
        let valid = i + 1 >= period;
        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid,
            value: IndicatorValue::Simple(if valid { sum / period as f64 } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}
