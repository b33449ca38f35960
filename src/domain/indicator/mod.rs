//! Technical indicators computed over a bar series.
//!
//! - `IndicatorPoint`: a single point in an indicator time series
//! - `IndicatorValue`: the shape of an indicator output
//! - `IndicatorType`: indicator identity plus parameters
//! - `IndicatorSeries`: one point per input bar, flagged valid once warmed up

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod volume;
pub mod vwap;

pub use bollinger::calculate_bollinger;
pub use ema::ema_values;
pub use macd::calculate_macd;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use stddev::calculate_stddev;
pub use volume::calculate_volume_ratio;
pub use vwap::calculate_vwap;

use chrono::NaiveDateTime;

#[derive(Debug, Clone)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        dif: f64,
        dea: f64,
        histogram: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorType {
    Sma(usize),
    Rsi(usize),
    Stddev(usize),
    Vwap(usize),
    VolumeRatio(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// The value at `index` when it exists and is past warmup.
    pub fn get(&self, index: usize) -> Option<IndicatorValue> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }

    /// Shorthand for single-valued indicators.
    pub fn simple(&self, index: usize) -> Option<f64> {
        match self.get(index)? {
            IndicatorValue::Simple(v) => Some(v),
            _ => None,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|p| p.valid).count()
    }
}

/// An all-invalid series, used when parameters make the indicator undefined.
pub(crate) fn invalid_series(
    indicator_type: IndicatorType,
    timestamps: impl Iterator<Item = NaiveDateTime>,
    value: IndicatorValue,
) -> IndicatorSeries {
    IndicatorSeries {
        indicator_type,
        values: timestamps
            .map(|timestamp| IndicatorPoint {
                timestamp,
                valid: false,
                value,
            })
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::ohlcv::Bar;
    use chrono::{Duration, NaiveDate};

    pub fn make_bars(prices: &[f64]) -> Vec<Bar> {
        make_bars_with_volume(prices, &vec![1000.0; prices.len()])
    }

    pub fn make_bars_with_volume(prices: &[f64], volumes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        prices
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume,
                amount: None,
            })
            .collect()
    }
}
