//! Relative Strength Index with Wilder smoothing.
//!
//! - First average: simple mean of the first n gains/losses
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss). With no losses RSI is 100,
//! and a perfectly flat window reads 50.
//!
//! Warmup: first n bars are invalid (n price changes are needed).

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, invalid_series,
};
use crate::domain::ohlcv::Bar;

pub fn calculate_rsi(bars: &[Bar], period: usize) -> IndicatorSeries {
    let mut series = invalid_series(
        IndicatorType::Rsi(period),
        bars.iter().map(|b| b.timestamp),
        IndicatorValue::Simple(0.0),
    );
    if period == 0 || bars.len() <= period {
        return series;
    }

    let changes: Vec<(f64, f64)> = bars
        .windows(2)
        .map(|w| {
            let change = w[1].close - w[0].close;
            (change.max(0.0), (-change).max(0.0))
        })
        .collect();

    let n = period as f64;
    let mut avg_gain = changes[..period].iter().map(|c| c.0).sum::<f64>() / n;
    let mut avg_loss = changes[..period].iter().map(|c| c.1).sum::<f64>() / n;
    series.values[period] = point(bars[period].timestamp, avg_gain, avg_loss);

    for i in (period + 1)..bars.len() {
        let (gain, loss) = changes[i - 1];
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
        series.values[i] = point(bars[i].timestamp, avg_gain, avg_loss);
    }

    series
}

fn point(timestamp: chrono::NaiveDateTime, avg_gain: f64, avg_loss: f64) -> IndicatorPoint {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    IndicatorPoint {
        timestamp,
        valid: true,
        value: IndicatorValue::Simple(rsi),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_bars;

    #[test]
    fn rsi_empty_bars() {
        let series = calculate_rsi(&[], 14);
        assert!(series.values.is_empty());
    }

    #[test]
    fn rsi_warmup_period() {
        let closes: Vec<f64> = (1..=15).map(|i| 100.0 + (i as f64 % 5.0) * 2.0).collect();
        let series = calculate_rsi(&make_bars(&closes), 14);

        assert_eq!(series.values.len(), 15);
        for i in 0..14 {
            assert!(!series.values[i].valid, "bar {} should be invalid", i);
        }
        assert!(series.values[14].valid);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&make_bars(&closes), 14);
        assert!((series.simple(14).unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi(&make_bars(&closes), 14);
        assert!(series.simple(14).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_flat_is_neutral() {
        let series = calculate_rsi(&make_bars(&[100.0; 6]), 3);
        assert_eq!(series.simple(5), Some(50.0));
    }

    #[test]
    fn rsi_in_range() {
        let closes: Vec<f64> = (1..=30)
            .map(|i| 100.0 + (i as f64 % 7.0 - 3.0) * 2.0)
            .collect();
        let series = calculate_rsi(&make_bars(&closes), 14);
        for i in 0..closes.len() {
            if let Some(rsi) = series.simple(i) {
                assert!((0.0..=100.0).contains(&rsi), "RSI {} out of range", rsi);
            }
        }
    }

    #[test]
    fn rsi_wilder_smoothing_step() {
        // changes: +2, -1, +1, then +3
        let series = calculate_rsi(&make_bars(&[10.0, 12.0, 11.0, 12.0, 15.0]), 3);
        let g0 = 3.0 / 3.0;
        let l0 = 1.0 / 3.0;
        let first = 100.0 - 100.0 / (1.0 + g0 / l0);
        assert!((series.simple(3).unwrap() - first).abs() < 1e-12);

        let g1 = (g0 * 2.0 + 3.0) / 3.0;
        let l1 = (l0 * 2.0) / 3.0;
        let second = 100.0 - 100.0 / (1.0 + g1 / l1);
        assert!((series.simple(4).unwrap() - second).abs() < 1e-12);
    }

    #[test]
    fn rsi_zero_period() {
        let series = calculate_rsi(&make_bars(&[100.0, 101.0]), 0);
        assert_eq!(series.values.len(), 2);
        assert_eq!(series.valid_count(), 0);
    }

    #[test]
    fn rsi_indicator_type() {
        let series = calculate_rsi(&make_bars(&[100.0]), 14);
        assert_eq!(series.indicator_type, IndicatorType::Rsi(14));
    }
}
