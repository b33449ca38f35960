//! Bollinger Bands.
//!
//! - Middle: SMA over n closes
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the sample standard deviation (divides by N-1).
//! Warmup: first (period-1) bars are invalid.

use crate::domain::indicator::stddev::window_stats;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_STDDEV_MULT: f64 = 2.0;

pub fn calculate_bollinger(bars: &[Bar], period: usize, stddev_mult_x100: u32) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mult = stddev_mult_x100 as f64 / 100.0;

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let stats = (period > 0 && i + 1 >= period)
                .then(|| window_stats(&closes[i + 1 - period..=i]))
                .flatten();
            let (upper, middle, lower) = match stats {
                Some((middle, sd)) => (middle + mult * sd, middle, middle - mult * sd),
                None => (0.0, 0.0, 0.0),
            };
            IndicatorPoint {
                timestamp: bar.timestamp,
                valid: stats.is_some(),
                value: IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        },
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_bars;

    fn bands(series: &IndicatorSeries, i: usize) -> (f64, f64, f64) {
        match series.get(i) {
            Some(IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            }) => (upper, middle, lower),
            other => panic!("expected Bollinger value, got {:?}", other),
        }
    }

    #[test]
    fn bollinger_warmup() {
        let series = calculate_bollinger(&make_bars(&[1.0, 2.0, 3.0]), 3, 200);
        assert!(series.get(1).is_none());
        assert!(series.get(2).is_some());
    }

    #[test]
    fn bollinger_bands_are_symmetric() {
        let series = calculate_bollinger(&make_bars(&[2.0, 4.0, 6.0]), 3, 200);
        let (upper, middle, lower) = bands(&series, 2);
        assert!((middle - 4.0).abs() < 1e-12);
        assert!((upper - 8.0).abs() < 1e-12);
        assert!((lower - 0.0).abs() < 1e-12);
    }

    #[test]
    fn bollinger_fractional_multiplier() {
        let series = calculate_bollinger(&make_bars(&[2.0, 4.0, 6.0]), 3, 150);
        let (upper, _, _) = bands(&series, 2);
        assert!((upper - 7.0).abs() < 1e-12);
    }

    #[test]
    fn bollinger_constant_prices_collapse() {
        let series = calculate_bollinger(&make_bars(&[10.0; 5]), 3, 200);
        let (upper, middle, lower) = bands(&series, 4);
        assert!((upper - middle).abs() < f64::EPSILON);
        assert!((lower - middle).abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_indicator_type() {
        let series = calculate_bollinger(&make_bars(&[1.0]), 20, 200);
        assert_eq!(
            series.indicator_type,
            IndicatorType::Bollinger {
                period: 20,
                stddev_mult_x100: 200
            }
        );
    }
}
