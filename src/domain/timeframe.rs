//! Bar timeframes accepted by the aggregator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Min30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
            Timeframe::Month1 => "1M",
        }
    }

    /// Width in minutes for the minute-based right-closed windows.
    pub fn minutes(&self) -> Option<i64> {
        match self {
            Timeframe::Min1 => Some(1),
            Timeframe::Min5 => Some(5),
            Timeframe::Min15 => Some(15),
            Timeframe::Min30 => Some(30),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1M" (month) and "1m" (minute) differ only by case.
        match s.trim() {
            "1m" => Ok(Timeframe::Min1),
            "5m" => Ok(Timeframe::Min5),
            "15m" => Ok(Timeframe::Min15),
            "30m" => Ok(Timeframe::Min30),
            "1h" | "60m" => Ok(Timeframe::Hour1),
            "4h" => Ok(Timeframe::Hour4),
            "1d" => Ok(Timeframe::Day1),
            "1w" => Ok(Timeframe::Week1),
            "1M" => Ok(Timeframe::Month1),
            other => Err(EngineError::ConfigInvalid {
                section: "backtest".into(),
                key: "timeframe".into(),
                reason: format!("unknown timeframe '{other}'"),
            }),
        }
    }
}
