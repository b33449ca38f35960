//! Volume surge: entry when volume exceeds `multiplier` times its rolling
//! average. There is no exit rule; positions close through stop-loss.

use serde::{Deserialize, Serialize};

use super::{Signal, SignalState};
use crate::domain::indicator::{IndicatorSeries, calculate_volume_ratio};
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeParams {
    pub period: usize,
    pub multiplier: f64,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self {
            period: 5,
            multiplier: 1.5,
        }
    }
}

#[derive(Debug)]
pub struct VolumeSignal {
    ratio: IndicatorSeries,
    params: VolumeParams,
}

impl VolumeSignal {
    pub fn new(bars: &[Bar], params: &VolumeParams) -> Self {
        Self {
            ratio: calculate_volume_ratio(bars, params.period),
            params: params.clone(),
        }
    }
}

impl Signal for VolumeSignal {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn start_index(&self) -> usize {
        self.params.period
    }

    fn state(&self, index: usize) -> SignalState {
        if index < self.params.period {
            return SignalState::NONE;
        }
        match self.ratio.simple(index) {
            Some(ratio) => SignalState::new(ratio > self.params.multiplier, false),
            None => SignalState::NONE,
        }
    }
}
