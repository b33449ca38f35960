//! Leveraged (margin) account: long-only, whole contracts, marked to market
//! every bar and force-liquidated below maintenance margin.
//!
//! Fees hit cash and equity alike, so at any time
//! `equity == cash + (price - entry_price) * multiplier * position`.

use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;

use super::error::EngineError;
use super::signal::PositionState;
use super::trade::{
    EquityCurve, OrderOutcome, RejectReason, TradeAction, TradeNote, TradeRecord,
};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_MULTIPLIER: f64 = 10.0;
pub const DEFAULT_TICK_SIZE: f64 = 1.0;
pub const DEFAULT_FEE_PER_CONTRACT: f64 = 2.0;
pub const DEFAULT_INITIAL_MARGIN_RATE: f64 = 0.14;
pub const DEFAULT_MAINTENANCE_MARGIN_RATE: f64 = 0.14;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractSpec {
    pub multiplier: f64,
    pub tick_size: f64,
    /// Charged per contract on each leg.
    pub fee_per_contract: f64,
    pub initial_margin_rate: f64,
    pub maintenance_margin_rate: f64,
}

impl Default for ContractSpec {
    fn default() -> Self {
        ContractSpec {
            multiplier: DEFAULT_MULTIPLIER,
            tick_size: DEFAULT_TICK_SIZE,
            fee_per_contract: DEFAULT_FEE_PER_CONTRACT,
            initial_margin_rate: DEFAULT_INITIAL_MARGIN_RATE,
            maintenance_margin_rate: DEFAULT_MAINTENANCE_MARGIN_RATE,
        }
    }
}

impl ContractSpec {
    /// Load the contract terms for `symbol` from `[contract.<symbol>]`, inheriting
    /// missing keys from `[contract.default]` and then the built-in defaults.
    pub fn from_config(config: &dyn ConfigPort, symbol: &str) -> Result<Self, EngineError> {
        let own = format!("contract.{}", symbol.to_ascii_lowercase());
        let base = ContractSpec::default();
        let read = |key: &str, fallback: f64| {
            let inherited = config.get_double("contract.default", key, fallback);
            config.get_double(&own, key, inherited)
        };
        let spec = ContractSpec {
            multiplier: read("multiplier", base.multiplier),
            tick_size: read("tick_size", base.tick_size),
            fee_per_contract: read("fee_per_contract", base.fee_per_contract),
            initial_margin_rate: read("initial_margin_rate", base.initial_margin_rate),
            maintenance_margin_rate: read("maintenance_margin_rate", base.maintenance_margin_rate),
        };
        spec.validate(&own)?;
        Ok(spec)
    }

    fn validate(&self, section: &str) -> Result<(), EngineError> {
        let invalid = |key: &str, reason: &str| EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.multiplier.is_nan() || self.multiplier <= 0.0 {
            return Err(invalid("multiplier", "multiplier must be positive"));
        }
        if self.tick_size < 0.0 {
            return Err(invalid("tick_size", "tick_size must be non-negative"));
        }
        if self.fee_per_contract < 0.0 {
            return Err(invalid("fee_per_contract", "fee_per_contract must be non-negative"));
        }
        if !valid_rate(self.initial_margin_rate) {
            return Err(invalid("initial_margin_rate", "must be in (0, 1]"));
        }
        if !valid_rate(self.maintenance_margin_rate) {
            return Err(invalid("maintenance_margin_rate", "must be in (0, 1]"));
        }
        Ok(())
    }
}

fn valid_rate(rate: f64) -> bool {
    rate > 0.0 && rate <= 1.0
}

/// Snap `price` to the nearest tick, rounded to 6 decimals. A non-positive
/// tick leaves the price unchanged.
pub fn round_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    ((price / tick).round() * tick * 1e6).round() / 1e6
}

#[derive(Debug, Clone)]
pub struct MarginAccount {
    spec: ContractSpec,
    equity: f64,
    cash: f64,
    position: i64,
    entry_price: f64,
    entry_fee: f64,
    last_price: Option<f64>,
    trades: Vec<TradeRecord>,
    equity_curve: EquityCurve,
    capacity_samples: Vec<i64>,
    total_fees: f64,
    liquidations: usize,
}

impl MarginAccount {
    pub fn new(initial_capital: f64, spec: ContractSpec) -> Self {
        MarginAccount {
            spec,
            equity: initial_capital,
            cash: initial_capital,
            position: 0,
            entry_price: 0.0,
            entry_fee: 0.0,
            last_price: None,
            trades: Vec::new(),
            equity_curve: EquityCurve::new(),
            capacity_samples: Vec::new(),
            total_fees: 0.0,
            liquidations: 0,
        }
    }

    pub fn spec(&self) -> &ContractSpec {
        &self.spec
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn position_state(&self) -> PositionState {
        if self.position > 0 {
            PositionState::Long
        } else {
            PositionState::Flat
        }
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &EquityCurve {
        &self.equity_curve
    }

    pub fn capacity_samples(&self) -> &[i64] {
        &self.capacity_samples
    }

    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    pub fn liquidations(&self) -> usize {
        self.liquidations
    }

    pub fn snap(&self, price: f64) -> f64 {
        round_to_tick(price, self.spec.tick_size)
    }

    /// Move equity by the price change since the previous mark. Returns the
    /// snapped price.
    pub fn mark_to_market(&mut self, price: f64) -> f64 {
        let price = self.snap(price);
        if let Some(prev) = self.last_price
            && self.position > 0
        {
            self.equity += (price - prev) * self.spec.multiplier * self.position as f64;
        }
        self.last_price = Some(price);
        price
    }

    pub fn maintenance_requirement(&self, price: f64) -> f64 {
        self.position as f64 * price * self.spec.multiplier * self.spec.maintenance_margin_rate
    }

    /// Contracts the current equity can open at `price` under initial margin.
    pub fn max_open_contracts(&self, price: f64) -> i64 {
        let denom = (price * self.spec.multiplier * self.spec.initial_margin_rate).max(1e-9);
        let raw = (self.equity / denom).floor();
        if raw.is_finite() { (raw as i64).max(0) } else { 0 }
    }

    /// Close the whole position when equity has fallen below maintenance
    /// margin at `price`.
    pub fn check_liquidation(&mut self, timestamp: NaiveDateTime, price: f64) -> Option<TradeRecord> {
        if self.position <= 0 {
            return None;
        }
        let price = self.snap(price);
        let requirement = self.maintenance_requirement(price);
        if self.equity >= requirement {
            return None;
        }
        debug!(
            "{timestamp}: equity {:.2} below maintenance {requirement:.2}, liquidating",
            self.equity
        );
        self.liquidations += 1;
        match self.close(timestamp, price, Some(TradeNote::Liquidation)) {
            OrderOutcome::Filled(trade) => Some(trade),
            OrderOutcome::Rejected(_) => None,
        }
    }

    /// Open a long position sized by initial margin, capped by `quantity`
    /// when given. Only one position is held at a time.
    pub fn open_long(
        &mut self,
        timestamp: NaiveDateTime,
        price: f64,
        quantity: Option<i64>,
    ) -> OrderOutcome {
        let price = self.snap(price);
        if self.position > 0 || self.equity <= 0.0 {
            debug!(
                "{timestamp}: open rejected, equity {:.2}, position {}",
                self.equity, self.position
            );
            return OrderOutcome::Rejected(RejectReason::NoCapacity);
        }
        let capacity = self.max_open_contracts(price);
        self.capacity_samples.push(capacity);

        let mut contracts = capacity.max(1);
        if let Some(cap) = quantity {
            contracts = contracts.min(cap.max(1));
        }
        let fee = self.spec.fee_per_contract * contracts as f64;
        self.cash -= fee;
        self.equity -= fee;
        self.total_fees += fee;
        self.position = contracts;
        self.entry_price = price;
        self.entry_fee = fee;

        let trade = TradeRecord {
            timestamp,
            action: TradeAction::Buy,
            price,
            quantity: contracts,
            amount: fee,
            realized_pnl: None,
            note: None,
        };
        debug!("{timestamp}: opened {contracts} contracts @ {price}, capacity {capacity}");
        self.trades.push(trade.clone());
        OrderOutcome::Filled(trade)
    }

    /// Close the whole position at `price`.
    pub fn close(
        &mut self,
        timestamp: NaiveDateTime,
        price: f64,
        note: Option<TradeNote>,
    ) -> OrderOutcome {
        if self.position <= 0 {
            return OrderOutcome::Rejected(RejectReason::NoPosition);
        }
        let price = self.snap(price);
        let contracts = self.position;
        let fee = self.spec.fee_per_contract * contracts as f64;
        let gross = (price - self.entry_price) * self.spec.multiplier * contracts as f64;
        let pnl = gross - self.entry_fee - fee;

        self.cash += gross - fee;
        self.equity -= fee;
        self.total_fees += fee;
        self.position = 0;
        self.entry_price = 0.0;
        self.entry_fee = 0.0;

        let trade = TradeRecord {
            timestamp,
            action: TradeAction::Sell,
            price,
            quantity: contracts,
            amount: fee,
            realized_pnl: Some(pnl),
            note,
        };
        debug!("{timestamp}: closed {contracts} contracts @ {price}, pnl {pnl:.2}");
        self.trades.push(trade.clone());
        OrderOutcome::Filled(trade)
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, price: f64) {
        let price = self.snap(price);
        self.equity_curve.record(timestamp, self.equity, price);
    }

    pub fn into_parts(self) -> (Vec<TradeRecord>, EquityCurve) {
        (self.trades, self.equity_curve)
    }
}
