//! Cash-market ledger: long-only, lot-sized, commission on both legs.

use std::str::FromStr;

use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;

use super::error::EngineError;
use super::position::Position;
use super::signal::PositionState;
use super::strategy::{StopLoss, StopLossAction};
use super::trade::{
    EquityCurve, OrderOutcome, RejectReason, TradeAction, TradeNote, TradeRecord,
};

/// Share of available cash committed by a sized buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionManagement {
    #[default]
    Full,
    Half,
    Third,
    Quarter,
}

impl PositionManagement {
    pub fn fraction(&self) -> f64 {
        match self {
            PositionManagement::Full => 1.0,
            PositionManagement::Half => 0.5,
            PositionManagement::Third => 1.0 / 3.0,
            PositionManagement::Quarter => 0.25,
        }
    }
}

impl FromStr for PositionManagement {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(PositionManagement::Full),
            "half" => Ok(PositionManagement::Half),
            "third" => Ok(PositionManagement::Third),
            "quarter" => Ok(PositionManagement::Quarter),
            other => Err(EngineError::ConfigInvalid {
                section: "backtest".into(),
                key: "position_management".into(),
                reason: format!("expected full, half, third or quarter, got '{other}'"),
            }),
        }
    }
}

/// True for six-digit exchange codes, which trade in the cash market.
pub fn is_cash_symbol(symbol: &str) -> bool {
    symbol.len() == 6 && symbol.bytes().all(|b| b.is_ascii_digit())
}

pub fn default_lot_size(symbol: &str) -> i64 {
    if is_cash_symbol(symbol) { 100 } else { 1 }
}

/// Quantity affordable with `capital * mode.fraction()` at `price`, floored
/// to a whole number of lots. Commission is not reserved here; `buy`
/// rejects the order if it no longer fits.
pub fn size_order(capital: f64, price: f64, mode: PositionManagement, lot: i64) -> i64 {
    if price <= 0.0 || capital <= 0.0 || lot <= 0 {
        return 0;
    }
    let raw = (capital * mode.fraction() / price).floor();
    if !raw.is_finite() {
        return 0;
    }
    floor_to_lot(raw as i64, lot)
}

fn floor_to_lot(quantity: i64, lot: i64) -> i64 {
    if lot <= 0 {
        return 0;
    }
    quantity.max(0) / lot * lot
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub lot_size: i64,
    pub management: PositionManagement,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    config: LedgerConfig,
    cash: f64,
    position: Option<Position>,
    trades: Vec<TradeRecord>,
    equity: EquityCurve,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Ledger {
            cash: config.initial_capital,
            config,
            position: None,
            trades: Vec::new(),
            equity: EquityCurve::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn position_state(&self) -> PositionState {
        match &self.position {
            Some(pos) if !pos.is_flat() => PositionState::Long,
            _ => PositionState::Flat,
        }
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &EquityCurve {
        &self.equity
    }

    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.position.as_ref().map_or(0.0, |p| p.market_value(price))
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, price: f64) {
        let equity = self.equity(price);
        self.equity.record(timestamp, equity, price);
    }

    /// Buy `quantity` (floored to the lot) or, without one, the sized
    /// quantity for the configured position management.
    pub fn buy(&mut self, timestamp: NaiveDateTime, price: f64, quantity: Option<i64>) -> OrderOutcome {
        let lot = self.config.lot_size;
        let quantity = match quantity {
            Some(q) => floor_to_lot(q, lot),
            None => size_order(self.cash, price, self.config.management, lot),
        };
        if quantity < lot || quantity == 0 {
            debug!("{timestamp}: buy rejected, quantity {quantity} below lot {lot}");
            return OrderOutcome::Rejected(RejectReason::BelowLot);
        }

        let notional = quantity as f64 * price;
        let commission = notional * self.config.commission_rate;
        if notional + commission > self.cash {
            debug!(
                "{timestamp}: buy rejected, cost {:.2} exceeds cash {:.2}",
                notional + commission,
                self.cash
            );
            return OrderOutcome::Rejected(RejectReason::InsufficientCash);
        }

        self.cash -= notional + commission;
        if let Some(pos) = self.position.as_mut().filter(|p| !p.is_flat()) {
            pos.add(quantity, price, commission);
        } else {
            self.position = Some(Position::open(quantity, price, commission));
        }

        let trade = TradeRecord {
            timestamp,
            action: TradeAction::Buy,
            price,
            quantity,
            amount: notional,
            realized_pnl: None,
            note: None,
        };
        debug!("{timestamp}: bought {quantity} @ {price:.4}, commission {commission:.2}");
        self.trades.push(trade.clone());
        OrderOutcome::Filled(trade)
    }

    /// Sell up to `quantity` of the open position.
    pub fn sell(
        &mut self,
        timestamp: NaiveDateTime,
        price: f64,
        quantity: i64,
        note: Option<TradeNote>,
    ) -> OrderOutcome {
        let Some(pos) = self.position.as_mut().filter(|p| !p.is_flat()) else {
            debug!("{timestamp}: sell rejected, no open position");
            return OrderOutcome::Rejected(RejectReason::NoPosition);
        };
        let quantity = quantity.clamp(0, pos.quantity);
        if quantity == 0 {
            return OrderOutcome::Rejected(RejectReason::BelowLot);
        }

        let proceeds = quantity as f64 * price;
        let commission = proceeds * self.config.commission_rate;
        let released = pos.reduce(quantity);
        let pnl = proceeds - commission - released;
        self.cash += proceeds - commission;
        if pos.is_flat() {
            self.position = None;
        }

        let trade = TradeRecord {
            timestamp,
            action: TradeAction::Sell,
            price,
            quantity,
            amount: proceeds,
            realized_pnl: Some(pnl),
            note,
        };
        debug!("{timestamp}: sold {quantity} @ {price:.4}, pnl {pnl:.2}");
        self.trades.push(trade.clone());
        OrderOutcome::Filled(trade)
    }

    pub fn sell_all(&mut self, timestamp: NaiveDateTime, price: f64, note: Option<TradeNote>) -> OrderOutcome {
        let held = self.position.as_ref().map_or(0, |p| p.quantity);
        self.sell(timestamp, price, held, note)
    }

    /// Apply the stop-loss rule at `price`. Returns the outcome when it fired.
    pub fn check_stop_loss(
        &mut self,
        timestamp: NaiveDateTime,
        price: f64,
        stop: &StopLoss,
    ) -> Option<OrderOutcome> {
        let pos = self.position.as_ref().filter(|p| !p.is_flat())?;
        if !stop.is_triggered(pos.cost_basis, pos.market_value(price)) {
            return None;
        }
        let held = pos.quantity;
        let lot = self.config.lot_size.max(1);
        let quantity = match stop.action {
            StopLossAction::SellAll => held,
            StopLossAction::ReduceHalf => floor_to_lot(held / 2, lot).max(lot).min(held),
        };
        debug!("{timestamp}: stop-loss triggered, selling {quantity} of {held}");
        Some(self.sell(timestamp, price, quantity, Some(TradeNote::StopLoss)))
    }

    pub fn into_parts(self) -> (f64, Vec<TradeRecord>, EquityCurve) {
        (self.cash, self.trades, self.equity)
    }
}
