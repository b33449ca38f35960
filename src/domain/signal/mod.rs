//! Signal library: parameterized indicator evaluators producing per-bar
//! entry/exit states.
//!
//! Each signal precomputes its indicators over the whole series when built.
//! The state at bar `i` reads only indicator values at `i` and `i - 1`,
//! and every indicator value at `i` is a function of bars `0..=i`.

pub mod bollinger;
pub mod ma;
pub mod macd;
pub mod rsi;
pub mod volume;
pub mod vwap;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::EngineError;
use crate::domain::ohlcv::BarSeries;

pub use bollinger::{BollingerParams, BollingerSignal};
pub use ma::{MaCrossParams, MaCrossSignal, MaTrendParams, MaTrendSignal};
pub use macd::{MacdMode, MacdParams, MacdSignal};
pub use rsi::{RsiParams, RsiSignal};
pub use volume::{VolumeParams, VolumeSignal};
pub use vwap::{VwapParams, VwapSide, VwapSignal};

/// Entry and exit conditions of one signal at one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalState {
    pub entry: bool,
    pub exit: bool,
}

impl SignalState {
    pub const NONE: SignalState = SignalState {
        entry: false,
        exit: false,
    };

    pub fn new(entry: bool, exit: bool) -> Self {
        Self { entry, exit }
    }
}

/// Single-position policy: the engine is either flat or long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a position. An explicit quantity overrides position sizing.
    Buy { quantity: Option<i64> },
    Sell,
    Hold,
}

impl Action {
    /// Gate a signal state on the current position: buy only while flat,
    /// sell only while long.
    pub fn gate(state: SignalState, position: PositionState) -> Action {
        match position {
            PositionState::Flat if state.entry => Action::Buy { quantity: None },
            PositionState::Long if state.exit => Action::Sell,
            _ => Action::Hold,
        }
    }
}

/// A per-bar signal evaluator over a fixed series.
pub trait Signal: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// First bar index the signal is evaluated at.
    fn start_index(&self) -> usize;

    /// Entry/exit state at `index`. Indices before `start_index` read as
    /// no signal.
    fn state(&self, index: usize) -> SignalState;
}

/// Comparison operator used by threshold signals.
///
/// Accepts the symbolic forms plus `below`/`above` as aliases of `<`/`>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Comparison {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Lt => left < right,
            Comparison::Gt => left > right,
            Comparison::Le => left <= right,
            Comparison::Ge => left >= right,
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
        }
    }

    /// The opposite polarity, used for exits.
    pub fn flipped(self) -> Comparison {
        match self {
            Comparison::Lt => Comparison::Gt,
            Comparison::Gt => Comparison::Lt,
            Comparison::Le => Comparison::Ge,
            Comparison::Ge => Comparison::Le,
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Gt => ">",
            Comparison::Le => "<=",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

impl TryFrom<String> for Comparison {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim() {
            "<" | "below" | "less_than" => Ok(Comparison::Lt),
            ">" | "above" | "greater_than" => Ok(Comparison::Gt),
            "<=" => Ok(Comparison::Le),
            ">=" => Ok(Comparison::Ge),
            "==" => Ok(Comparison::Eq),
            "!=" => Ok(Comparison::Ne),
            other => Err(format!("unknown operator '{other}'")),
        }
    }
}

impl From<Comparison> for String {
    fn from(value: Comparison) -> Self {
        value.as_str().to_string()
    }
}

/// Flat-record strategy selection: one Signal Library entry with its
/// parameters, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalSpec {
    MaTrend(MaTrendParams),
    MaCross(MaCrossParams),
    Rsi(RsiParams),
    Macd(MacdParams),
    Bollinger(BollingerParams),
    Vwap(VwapParams),
    Volume(VolumeParams),
}

impl Default for SignalSpec {
    fn default() -> Self {
        SignalSpec::MaTrend(MaTrendParams::default())
    }
}

impl SignalSpec {
    /// Build a spec from a graph condition node's sub-type and data object.
    ///
    /// Returns `Ok(None)` for an unrecognized sub-type so the caller can
    /// decide on a fallback.
    pub fn from_condition(
        sub_type: &str,
        data: &serde_json::Value,
    ) -> Result<Option<SignalSpec>, EngineError> {
        let parse_err =
            |e: serde_json::Error| EngineError::strategy(format!("{sub_type} condition: {e}"));
        let data = match data {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        let spec = match sub_type {
            "ma" => SignalSpec::MaCross(serde_json::from_value(data).map_err(parse_err)?),
            "rsi" => SignalSpec::Rsi(serde_json::from_value(data).map_err(parse_err)?),
            "macd" => SignalSpec::Macd(serde_json::from_value(data).map_err(parse_err)?),
            "bollinger" => {
                SignalSpec::Bollinger(serde_json::from_value(data).map_err(parse_err)?)
            }
            "vwap" => SignalSpec::Vwap(serde_json::from_value(data).map_err(parse_err)?),
            "volume" => {
                SignalSpec::Volume(serde_json::from_value(data).map_err(parse_err)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(spec))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = |name: &str, v: usize| {
            if v == 0 {
                Err(EngineError::strategy(format!("{name} must be positive")))
            } else {
                Ok(())
            }
        };
        match self {
            SignalSpec::MaTrend(p) => {
                positive("short", p.short)?;
                positive("long", p.long)
            }
            SignalSpec::MaCross(p) => positive("period", p.period),
            SignalSpec::Rsi(p) => positive("period", p.period),
            SignalSpec::Macd(p) => {
                positive("fast", p.fast)?;
                positive("slow", p.slow)?;
                positive("signal", p.signal)
            }
            SignalSpec::Bollinger(p) => {
                if p.period < 2 {
                    return Err(EngineError::strategy("bollinger period must be at least 2"));
                }
                // Band width is applied in hundredths of a deviation.
                if !p.std_dev.is_finite() || (p.std_dev * 100.0).round() < 1.0 {
                    return Err(EngineError::strategy(format!(
                        "bollinger stdDev must be at least 0.01, got {}",
                        p.std_dev
                    )));
                }
                Ok(())
            }
            SignalSpec::Vwap(p) => positive("period", p.period),
            SignalSpec::Volume(p) => positive("period", p.period),
        }
    }

    pub fn build(&self, series: &BarSeries) -> Box<dyn Signal> {
        let bars = series.bars();
        match self {
            SignalSpec::MaTrend(p) => Box::new(MaTrendSignal::new(bars, p)),
            SignalSpec::MaCross(p) => Box::new(MaCrossSignal::new(bars, p)),
            SignalSpec::Rsi(p) => Box::new(RsiSignal::new(bars, p)),
            SignalSpec::Macd(p) => Box::new(MacdSignal::new(bars, p)),
            SignalSpec::Bollinger(p) => Box::new(BollingerSignal::new(bars, p)),
            SignalSpec::Vwap(p) => Box::new(VwapSignal::new(bars, p)),
            SignalSpec::Volume(p) => Box::new(VolumeSignal::new(bars, p)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignalSpec::MaTrend(_) => "ma_trend",
            SignalSpec::MaCross(_) => "ma_cross",
            SignalSpec::Rsi(_) => "rsi",
            SignalSpec::Macd(_) => "macd",
            SignalSpec::Bollinger(_) => "bollinger",
            SignalSpec::Vwap(_) => "vwap",
            SignalSpec::Volume(_) => "volume",
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::ohlcv::{Bar, BarSeries};
    use chrono::{Duration, NaiveDate};

    pub fn series_from(closes: &[f64], volumes: &[f64]) -> BarSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        let bars = closes
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
            .collect();
        BarSeries::new(bars).unwrap()
    }

    pub fn series(closes: &[f64]) -> BarSeries {
        series_from(closes, &vec![1000.0; closes.len()])
    }

    /// Indices in `0..len` where the predicate holds.
    pub fn firing(len: usize, f: impl Fn(usize) -> bool) -> Vec<usize> {
        (0..len).filter(|&i| f(i)).collect()
    }
}
