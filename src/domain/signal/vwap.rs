//! VWAP deviation signal.
//!
//! Deviation is `(close - vwap) / vwap`. Only the configured side is active:
//! `below` buys when the deviation is under `-deviation`, `above` sells when
//! it is over `+deviation`.

use serde::{Deserialize, Serialize};

use super::{Signal, SignalState};
use crate::domain::indicator::{IndicatorSeries, calculate_vwap};
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VwapSide {
    #[default]
    Below,
    Above,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VwapParams {
    pub period: usize,
    pub deviation: f64,
    #[serde(alias = "operator")]
    pub side: VwapSide,
}

impl Default for VwapParams {
    fn default() -> Self {
        Self {
            period: 20,
            deviation: 0.02,
            side: VwapSide::Below,
        }
    }
}

#[derive(Debug)]
pub struct VwapSignal {
    vwap: IndicatorSeries,
    closes: Vec<f64>,
    params: VwapParams,
}

impl VwapSignal {
    pub fn new(bars: &[Bar], params: &VwapParams) -> Self {
        Self {
            vwap: calculate_vwap(bars, params.period),
            closes: bars.iter().map(|b| b.close).collect(),
            params: params.clone(),
        }
    }
}

impl Signal for VwapSignal {
    fn name(&self) -> &'static str {
        "vwap"
    }

    fn start_index(&self) -> usize {
        self.params.period
    }

    fn state(&self, index: usize) -> SignalState {
        if index < self.params.period {
            return SignalState::NONE;
        }
        let (Some(vwap), Some(&close)) = (self.vwap.simple(index), self.closes.get(index)) else {
            return SignalState::NONE;
        };
        let deviation = (close - vwap) / vwap;
        match self.params.side {
            VwapSide::Below => SignalState::new(deviation < -self.params.deviation, false),
            VwapSide::Above => SignalState::new(false, deviation > self.params.deviation),
        }
    }
}
