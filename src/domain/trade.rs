//! Trade and equity records produced by a run.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::ohlcv::serialize_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// Why a trade happened when it was not a plain signal fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeNote {
    StopLoss,
    Liquidation,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub action: TradeAction,
    pub price: f64,
    pub quantity: i64,
    /// Cash ledger: traded notional. Margin account: fee charged.
    pub amount: f64,
    /// `None` until the trade closes (or reduces) a position.
    pub realized_pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<TradeNote>,
}

impl TradeRecord {
    pub fn is_closed(&self) -> bool {
        self.realized_pnl.is_some()
    }

    pub fn is_liquidation(&self) -> bool {
        self.note == Some(TradeNote::Liquidation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub equity: f64,
    #[serde(rename = "return")]
    pub ret: f64,
    pub reference_price: f64,
}

/// Equity samples in time order. Each return is relative to the previous
/// recorded point; the first point's return is 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EquityCurve(Vec<EquityPoint>);

impl EquityCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, timestamp: NaiveDateTime, equity: f64, reference_price: f64) {
        let ret = match self.0.last() {
            Some(prev) if prev.equity != 0.0 => (equity - prev.equity) / prev.equity,
            _ => 0.0,
        };
        self.0.push(EquityPoint {
            timestamp,
            equity,
            ret: super::error::sanitize(ret),
            reference_price,
        });
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.0
    }

    pub fn last(&self) -> Option<&EquityPoint> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_points(self) -> Vec<EquityPoint> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    BelowLot,
    InsufficientCash,
    NoCapacity,
    NoPosition,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::BelowLot => "below_lot",
            RejectReason::InsufficientCash => "insufficient_cash",
            RejectReason::NoCapacity => "no_capacity",
            RejectReason::NoPosition => "no_position",
        }
    }
}

/// Result of an order attempt. Rejections are recorded, never raised.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled(TradeRecord),
    Rejected(RejectReason),
}

impl OrderOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderOutcome::Filled(_))
    }
}
