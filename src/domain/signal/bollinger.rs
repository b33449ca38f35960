//! Bollinger breakout: entry when the close breaks above the upper band,
//! exit when it breaks below the lower band.

use serde::{Deserialize, Serialize};

use super::{Signal, SignalState};
use crate::domain::indicator::bollinger::{DEFAULT_PERIOD, DEFAULT_STDDEV_MULT};
use crate::domain::indicator::{IndicatorSeries, IndicatorValue, calculate_bollinger};
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BollingerParams {
    pub period: usize,
    pub std_dev: f64,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            std_dev: DEFAULT_STDDEV_MULT,
        }
    }
}

#[derive(Debug)]
pub struct BollingerSignal {
    bands: IndicatorSeries,
    closes: Vec<f64>,
    period: usize,
}

impl BollingerSignal {
    pub fn new(bars: &[Bar], params: &BollingerParams) -> Self {
        let mult_x100 = (params.std_dev * 100.0).round().max(0.0) as u32;
        Self {
            bands: calculate_bollinger(bars, params.period, mult_x100),
            closes: bars.iter().map(|b| b.close).collect(),
            period: params.period,
        }
    }
}

impl Signal for BollingerSignal {
    fn name(&self) -> &'static str {
        "bollinger"
    }

    fn start_index(&self) -> usize {
        self.period
    }

    fn state(&self, index: usize) -> SignalState {
        if index < self.period {
            return SignalState::NONE;
        }
        match (self.bands.get(index), self.closes.get(index)) {
            (Some(IndicatorValue::Bollinger { upper, lower, .. }), Some(&close)) => {
                SignalState::new(close > upper, close < lower)
            }
            _ => SignalState::NONE,
        }
    }
}
