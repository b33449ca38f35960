//! MACD signal family.
//!
//! | mode                 | entry                    | exit                     |
//! |----------------------|--------------------------|--------------------------|
//! | `golden_cross`       | DIF crosses above DEA    | DIF crosses below DEA    |
//! | `death_cross`        | DIF crosses below DEA    | DIF crosses above DEA    |
//! | `zero_above`         | DIF crosses above 0      | DIF crosses below DEA    |
//! | `zero_below`         | DIF crosses above DEA    | DIF crosses below 0      |
//! | `hist_turn_positive` | histogram turns positive | DIF crosses below DEA    |
//! | `hist_turn_negative` | DIF crosses above DEA    | histogram turns negative |
//! | `hist_threshold`     | histogram passes threshold from `<= threshold` | DIF crosses below DEA |

use serde::{Deserialize, Serialize};

use super::{Comparison, Signal, SignalState};
use crate::domain::indicator::macd::{DEFAULT_FAST, DEFAULT_SIGNAL, DEFAULT_SLOW};
use crate::domain::indicator::{IndicatorSeries, IndicatorValue, calculate_macd};
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacdMode {
    GoldenCross,
    DeathCross,
    ZeroAbove,
    ZeroBelow,
    HistTurnPositive,
    HistTurnNegative,
    #[default]
    #[serde(other)]
    HistThreshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
    pub mode: MacdMode,
    pub threshold: f64,
    pub operator: Comparison,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST,
            slow: DEFAULT_SLOW,
            signal: DEFAULT_SIGNAL,
            mode: MacdMode::HistThreshold,
            threshold: 0.0,
            operator: Comparison::Gt,
        }
    }
}

#[derive(Debug)]
pub struct MacdSignal {
    macd: IndicatorSeries,
    params: MacdParams,
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    dif: f64,
    dea: f64,
    hist: f64,
}

impl MacdSignal {
    pub fn new(bars: &[Bar], params: &MacdParams) -> Self {
        Self {
            macd: calculate_macd(bars, params.fast, params.slow, params.signal),
            params: params.clone(),
        }
    }

    fn snapshot(&self, index: usize) -> Option<Snapshot> {
        match self.macd.get(index)? {
            IndicatorValue::Macd {
                dif,
                dea,
                histogram,
            } => Some(Snapshot {
                dif,
                dea,
                hist: histogram,
            }),
            _ => None,
        }
    }
}

impl Signal for MacdSignal {
    fn name(&self) -> &'static str {
        "macd"
    }

    fn start_index(&self) -> usize {
        self.params.slow.max(self.params.signal) + 1
    }

    fn state(&self, index: usize) -> SignalState {
        if index < self.start_index() {
            return SignalState::NONE;
        }
        let (Some(prev), Some(cur)) = (self.snapshot(index - 1), self.snapshot(index)) else {
            return SignalState::NONE;
        };

        let golden = prev.dif <= prev.dea && cur.dif > cur.dea;
        let death = prev.dif >= prev.dea && cur.dif < cur.dea;
        let zero_up = prev.dif <= 0.0 && cur.dif > 0.0;
        let zero_down = prev.dif >= 0.0 && cur.dif < 0.0;
        let hist_up = prev.hist <= 0.0 && cur.hist > 0.0;
        let hist_down = prev.hist >= 0.0 && cur.hist < 0.0;

        let (entry, exit) = match self.params.mode {
            MacdMode::GoldenCross => (golden, death),
            MacdMode::DeathCross => (death, golden),
            MacdMode::ZeroAbove => (zero_up, death),
            MacdMode::ZeroBelow => (golden, zero_down),
            MacdMode::HistTurnPositive => (hist_up, death),
            MacdMode::HistTurnNegative => (golden, hist_down),
            MacdMode::HistThreshold => {
                let threshold = self.params.threshold;
                let passed =
                    prev.hist <= threshold && self.params.operator.apply(cur.hist, threshold);
                (passed, death)
            }
        };
        SignalState::new(entry, exit)
    }
}
