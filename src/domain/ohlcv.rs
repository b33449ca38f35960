//! OHLCV bar and validated bar series.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use super::error::EngineError;

/// Timestamp layout used in every serialized output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: Option<f64>,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// True when all four prices are finite.
    pub fn has_finite_prices(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }

    /// True when every price and the volume are finite.
    pub fn is_complete(&self) -> bool {
        self.has_finite_prices() && self.volume.is_finite()
    }

    /// Check `low <= min(open, close) <= max(open, close) <= high` and `volume >= 0`.
    ///
    /// Bars with a non-finite price or volume are not judged here; the
    /// aggregator drops them as NaN groups.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.volume < 0.0 {
            return Err(EngineError::integrity(format!(
                "negative volume {} at {}",
                self.volume, self.timestamp
            )));
        }
        if !self.has_finite_prices() {
            return Ok(());
        }
        if self.high < self.low {
            return Err(EngineError::integrity(format!(
                "high {} below low {} at {}",
                self.high, self.low, self.timestamp
            )));
        }
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        if body_low < self.low || body_high > self.high {
            return Err(EngineError::integrity(format!(
                "open/close outside [low, high] at {}",
                self.timestamp
            )));
        }
        Ok(())
    }
}

/// Strictly time-ordered bars with unique timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self, EngineError> {
        for bar in &bars {
            if !bar.is_complete() {
                return Err(EngineError::integrity(format!(
                    "non-finite price or volume at {}",
                    bar.timestamp
                )));
            }
            bar.validate()?;
        }
        if let Some(pair) = bars.windows(2).find(|w| w[0].timestamp >= w[1].timestamp) {
            return Err(EngineError::integrity(format!(
                "timestamps not strictly increasing at {}",
                pair[1].timestamp
            )));
        }
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Bars whose calendar date falls within the optional bounds, inclusive.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> BarSeries {
        BarSeries {
            bars: self
                .bars
                .iter()
                .filter(|b| start.is_none_or(|s| b.date() >= s) && end.is_none_or(|e| b.date() <= e))
                .cloned()
                .collect(),
        }
    }
}
