//! RSI threshold signal. Entry when RSI satisfies `operator` against
//! `threshold`; exit on the flipped comparison.

use serde::{Deserialize, Serialize};

use super::{Comparison, Signal, SignalState};
use crate::domain::indicator::{IndicatorSeries, calculate_rsi};
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiParams {
    pub period: usize,
    pub threshold: f64,
    pub operator: Comparison,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            period: 14,
            threshold: 30.0,
            operator: Comparison::Lt,
        }
    }
}

#[derive(Debug)]
pub struct RsiSignal {
    rsi: IndicatorSeries,
    params: RsiParams,
}

impl RsiSignal {
    pub fn new(bars: &[Bar], params: &RsiParams) -> Self {
        Self {
            rsi: calculate_rsi(bars, params.period),
            params: params.clone(),
        }
    }
}

impl Signal for RsiSignal {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn start_index(&self) -> usize {
        self.params.period
    }

    fn state(&self, index: usize) -> SignalState {
        if index < self.start_index() {
            return SignalState::NONE;
        }
        let Some(rsi) = self.rsi.simple(index) else {
            return SignalState::NONE;
        };
        let op = self.params.operator;
        SignalState::new(
            op.apply(rsi, self.params.threshold),
            op.flipped().apply(rsi, self.params.threshold),
        )
    }
}
