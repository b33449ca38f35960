//! Moving-average signals.
//!
//! - `MaTrendSignal`: level based. Entry while the short SMA is above the
//!   long SMA, exit while it is below. This is the default strategy.
//! - `MaCrossSignal`: event based. Entry on the golden cross (short crosses
//!   above long), exit on the death cross.

use serde::{Deserialize, Serialize};

use super::{Signal, SignalState};
use crate::domain::indicator::{IndicatorSeries, calculate_sma};
use crate::domain::ohlcv::Bar;

/// Short window cap for the cross signal.
pub const MAX_SHORT_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaTrendParams {
    pub short: usize,
    pub long: usize,
}

impl Default for MaTrendParams {
    fn default() -> Self {
        Self { short: 5, long: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaCrossParams {
    pub period: usize,
}

impl Default for MaCrossParams {
    fn default() -> Self {
        Self { period: 20 }
    }
}

#[derive(Debug)]
pub struct MaTrendSignal {
    short: IndicatorSeries,
    long: IndicatorSeries,
    start: usize,
}

impl MaTrendSignal {
    pub fn new(bars: &[Bar], params: &MaTrendParams) -> Self {
        Self {
            short: calculate_sma(bars, params.short),
            long: calculate_sma(bars, params.long),
            start: params.long.max(params.short),
        }
    }
}

impl Signal for MaTrendSignal {
    fn name(&self) -> &'static str {
        "ma_trend"
    }

    fn start_index(&self) -> usize {
        self.start
    }

    fn state(&self, index: usize) -> SignalState {
        if index < self.start {
            return SignalState::NONE;
        }
        match (self.short.simple(index), self.long.simple(index)) {
            (Some(s), Some(l)) => SignalState::new(s > l, s < l),
            _ => SignalState::NONE,
        }
    }
}

#[derive(Debug)]
pub struct MaCrossSignal {
    short: IndicatorSeries,
    long: IndicatorSeries,
    start: usize,
}

impl MaCrossSignal {
    pub fn new(bars: &[Bar], params: &MaCrossParams) -> Self {
        let long = params.period;
        let short = long.min(MAX_SHORT_WINDOW);
        Self {
            short: calculate_sma(bars, short),
            long: calculate_sma(bars, long),
            start: long,
        }
    }
}

impl Signal for MaCrossSignal {
    fn name(&self) -> &'static str {
        "ma_cross"
    }

    fn start_index(&self) -> usize {
        self.start
    }

    fn state(&self, index: usize) -> SignalState {
        if index < self.start || index == 0 {
            return SignalState::NONE;
        }
        let current = (self.short.simple(index), self.long.simple(index));
        let previous = (self.short.simple(index - 1), self.long.simple(index - 1));
        match (current, previous) {
            ((Some(s), Some(l)), (Some(ps), Some(pl))) => {
                let golden = s > l && ps <= pl;
                let death = s < l && ps >= pl;
                SignalState::new(golden, death)
            }
            _ => SignalState::NONE,
        }
    }
}
