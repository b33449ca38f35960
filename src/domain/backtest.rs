//! Backtest engine and bar loop.
//!
//! A run takes an already aggregated series (the cutoff is applied during
//! aggregation), binds the strategy to it and walks the bars once. Bar `i`
//! only ever sees indicator values computed from bars `0..=i`.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use serde::Serialize;

use super::error::{EngineError, sanitize};
use super::ledger::{Ledger, LedgerConfig, PositionManagement};
use super::margin::{ContractSpec, MarginAccount};
use super::metrics::Metrics;
use super::ohlcv::{Bar, BarSeries, serialize_timestamp};
use super::signal::{Action, PositionState};
use super::strategy::{Strategy, StrategyDefinition};
use super::timeframe::Timeframe;
use super::trade::{EquityPoint, OrderOutcome, RejectReason, TradeNote, TradeRecord};

/// Fewest usable bars a run accepts.
pub const MIN_BARS: usize = 10;
pub const DEFAULT_EQUITY_SAMPLE_INTERVAL: usize = 10;
pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;
pub const DEFAULT_COMMISSION_RATE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Market {
    Cash { lot_size: i64 },
    Margin(ContractSpec),
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub management: PositionManagement,
    pub market: Market,
    pub equity_sample_interval: usize,
    pub debug: bool,
}

impl BacktestConfig {
    /// Cash-market defaults for `symbol`.
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let lot_size = super::ledger::default_lot_size(&symbol);
        BacktestConfig {
            symbol,
            timeframe: Timeframe::Day1,
            start_date: None,
            end_date: None,
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            commission_rate: DEFAULT_COMMISSION_RATE,
            management: PositionManagement::Full,
            market: Market::Cash { lot_size },
            equity_sample_interval: DEFAULT_EQUITY_SAMPLE_INTERVAL,
            debug: false,
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        let invalid = |key: &str, reason: &str| EngineError::ConfigInvalid {
            section: "backtest".into(),
            key: key.into(),
            reason: reason.into(),
        };
        if self.initial_capital.is_nan() || self.initial_capital <= 0.0 {
            return Err(invalid("initial_capital", "initial_capital must be positive"));
        }
        if self.commission_rate.is_nan() || self.commission_rate < 0.0 {
            return Err(invalid("commission_rate", "commission_rate must be non-negative"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && start > end
        {
            return Err(invalid("start_date", "start_date must be on or before end_date"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl From<&Bar> for PricePoint {
    fn from(bar: &Bar) -> Self {
        PricePoint {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataInfo {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub records: usize,
    #[serde(serialize_with = "serialize_timestamp")]
    pub first_timestamp: NaiveDateTime,
    #[serde(serialize_with = "serialize_timestamp")]
    pub last_timestamp: NaiveDateTime,
    pub min_low: f64,
    pub max_high: f64,
    pub last_close: f64,
}

impl DataInfo {
    /// Summary of `series`, or `None` when it is empty.
    pub fn from_series(series: &BarSeries, symbol: &str, timeframe: Timeframe) -> Option<Self> {
        let bars = series.bars();
        let (first, last) = (bars.first()?, bars.last()?);
        Some(DataInfo {
            symbol: symbol.to_string(),
            timeframe,
            records: bars.len(),
            first_timestamp: first.timestamp,
            last_timestamp: last.timestamp,
            min_low: bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
            max_high: bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max),
            last_close: last.close,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalCounts {
    pub entry: usize,
    pub exit: usize,
}

/// Run statistics, returned only for debug runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub strategy: String,
    pub start_index: usize,
    pub signal_counts: SignalCounts,
    pub buy_attempts: usize,
    pub sell_attempts: usize,
    pub fills: usize,
    pub rejections: BTreeMap<&'static str, usize>,
    pub stop_losses: usize,
    pub forced_liquidations: usize,
    pub capacity_samples: Vec<i64>,
    pub average_capacity: f64,
    pub total_fees: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<ContractSpec>,
}

impl Diagnostics {
    fn tally(&mut self, outcome: &OrderOutcome) {
        match outcome {
            OrderOutcome::Filled(_) => self.fills += 1,
            OrderOutcome::Rejected(reason) => self.reject(*reason),
        }
    }

    fn reject(&mut self, reason: RejectReason) {
        *self.rejections.entry(reason.as_str()).or_default() += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return: f64,
    pub annual_return: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub profit_loss_ratio: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub final_market_price: f64,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub price_series: Vec<PricePoint>,
    pub data_info: DataInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

struct RunOutput {
    final_equity: f64,
    final_price: f64,
    trades: Vec<TradeRecord>,
    equity_curve: Vec<EquityPoint>,
    diagnostics: Diagnostics,
}

/// Run `definition` over `series`.
///
/// Fails only on structural problems: bad configuration, an invalid
/// strategy or too few bars. Everything that happens inside the bar loop is
/// recorded on the result instead.
pub fn run_backtest(
    series: &BarSeries,
    definition: &StrategyDefinition,
    config: &BacktestConfig,
) -> Result<BacktestResult, EngineError> {
    config.validate()?;
    let plan = definition.plan()?;

    let series = series.between(config.start_date, config.end_date);
    let data_info = DataInfo::from_series(&series, &config.symbol, config.timeframe)
        .filter(|_| series.len() >= MIN_BARS)
        .ok_or_else(|| EngineError::InsufficientData {
            symbol: config.symbol.clone(),
            bars: series.len(),
            minimum: MIN_BARS,
        })?;

    info!(
        "backtest {} {}: {} bars, {}",
        config.symbol,
        config.timeframe,
        series.len(),
        plan.describe()
    );
    let strategy = plan.bind(&series);
    let stop_loss = definition.stop_loss();

    let mut output = match &config.market {
        Market::Cash { lot_size } => {
            run_cash(&series, &strategy, config, *lot_size, stop_loss.as_ref())
        }
        Market::Margin(spec) => run_margin(&series, &strategy, config, spec.clone()),
    };
    output.diagnostics.strategy = strategy.name().to_string();
    output.diagnostics.start_index = strategy.start_index();

    let num_days = (data_info.last_timestamp.date() - data_info.first_timestamp.date()).num_days();
    let metrics = Metrics::compute(
        config.initial_capital,
        output.final_equity,
        &output.equity_curve,
        &output.trades,
        num_days,
    );

    info!(
        "backtest {} finished: final equity {:.2}, {} trades, return {:.2}%",
        config.symbol,
        output.final_equity,
        metrics.total_trades,
        metrics.total_return * 100.0
    );

    Ok(BacktestResult {
        initial_capital: config.initial_capital,
        final_equity: sanitize(output.final_equity),
        total_return: metrics.total_return,
        annual_return: metrics.annual_return,
        sharpe_ratio: metrics.sharpe_ratio,
        win_rate: metrics.win_rate,
        profit_loss_ratio: metrics.profit_loss_ratio,
        max_drawdown: metrics.max_drawdown,
        total_trades: metrics.total_trades,
        winning_trades: metrics.winning_trades,
        losing_trades: metrics.losing_trades,
        final_market_price: output.final_price,
        trades: output.trades,
        equity_curve: output.equity_curve,
        price_series: series.bars().iter().map(PricePoint::from).collect(),
        data_info,
        diagnostics: config.debug.then_some(output.diagnostics),
    })
}

fn count_signals(diag: &mut Diagnostics, entry: bool, exit: bool) {
    if entry {
        diag.signal_counts.entry += 1;
    }
    if exit {
        diag.signal_counts.exit += 1;
    }
}

fn run_cash(
    series: &BarSeries,
    strategy: &Strategy,
    config: &BacktestConfig,
    lot_size: i64,
    stop_loss: Option<&super::strategy::StopLoss>,
) -> RunOutput {
    let mut ledger = Ledger::new(LedgerConfig {
        initial_capital: config.initial_capital,
        commission_rate: config.commission_rate,
        lot_size,
        management: config.management,
    });
    let mut diag = Diagnostics::default();
    let interval = config.equity_sample_interval.max(1);
    let start = strategy.start_index();
    let bars = series.bars();
    let last = bars.len() - 1;

    for (i, bar) in bars.iter().enumerate() {
        if i >= start {
            let decision = strategy.decide(i, ledger.position_state());
            count_signals(&mut diag, decision.state.entry, decision.state.exit);
            // The stop is first checked on the bar after a fill.
            let mut filled_now = false;
            match decision.action {
                Action::Buy { quantity } => {
                    diag.buy_attempts += 1;
                    let outcome = ledger.buy(bar.timestamp, bar.close, quantity);
                    filled_now = outcome.is_filled();
                    diag.tally(&outcome);
                }
                Action::Sell => {
                    diag.sell_attempts += 1;
                    let outcome = ledger.sell_all(bar.timestamp, bar.close, None);
                    diag.tally(&outcome);
                }
                Action::Hold => {}
            }

            if let Some(stop) = stop_loss
                && !filled_now
                && ledger.position_state() == PositionState::Long
                && let Some(outcome) = ledger.check_stop_loss(bar.timestamp, bar.close, stop)
            {
                diag.stop_losses += 1;
                diag.tally(&outcome);
            }
        }

        if i % interval == 0 || i == last {
            ledger.record_equity(bar.timestamp, bar.close);
        }
    }

    let final_price = bars[last].close;
    let final_equity = ledger.equity(final_price);
    let (_, trades, curve) = ledger.into_parts();
    diag.total_fees = trades
        .iter()
        .map(|t| t.amount * config.commission_rate)
        .sum();

    RunOutput {
        final_equity,
        final_price,
        trades,
        equity_curve: curve.into_points(),
        diagnostics: diag,
    }
}

fn run_margin(
    series: &BarSeries,
    strategy: &Strategy,
    config: &BacktestConfig,
    spec: ContractSpec,
) -> RunOutput {
    let mut account = MarginAccount::new(config.initial_capital, spec);
    let mut diag = Diagnostics::default();
    let start = strategy.start_index();
    let bars = series.bars();
    let last = bars.len() - 1;

    for (i, bar) in bars.iter().enumerate() {
        let price = account.mark_to_market(bar.close);
        if i < start {
            continue;
        }

        let liquidated = account.check_liquidation(bar.timestamp, price).is_some();
        if liquidated {
            diag.forced_liquidations += 1;
            diag.fills += 1;
        }

        let decision = strategy.decide(i, account.position_state());
        count_signals(&mut diag, decision.state.entry, decision.state.exit);
        // One trade per bar: a liquidation consumes the bar.
        if !liquidated {
            match decision.action {
                Action::Buy { quantity } => {
                    diag.buy_attempts += 1;
                    let outcome = account.open_long(bar.timestamp, price, quantity);
                    diag.tally(&outcome);
                }
                Action::Sell => {
                    diag.sell_attempts += 1;
                    let outcome = account.close(bar.timestamp, price, None);
                    diag.tally(&outcome);
                }
                Action::Hold => {}
            }
        }

        if i == last && account.position_state() == PositionState::Long {
            debug!("{}: closing open position at series end", bar.timestamp);
            let outcome = account.close(bar.timestamp, price, Some(TradeNote::Final));
            diag.tally(&outcome);
        }
        account.record_equity(bar.timestamp, price);
    }

    let final_price = account.snap(bars[last].close);
    let final_equity = account.equity();
    diag.capacity_samples = account.capacity_samples().to_vec();
    diag.average_capacity = if diag.capacity_samples.is_empty() {
        0.0
    } else {
        diag.capacity_samples.iter().sum::<i64>() as f64 / diag.capacity_samples.len() as f64
    };
    diag.total_fees = account.total_fees();
    diag.contract = Some(account.spec().clone());
    let (trades, curve) = account.into_parts();

    RunOutput {
        final_equity,
        final_price,
        trades,
        equity_curve: curve.into_points(),
        diagnostics: diag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::test_support::series;
    use crate::domain::trade::TradeAction;
    use serde_json::json;

    fn definition(value: serde_json::Value) -> StrategyDefinition {
        serde_json::from_value(value).unwrap()
    }

    fn rising(len: usize) -> BarSeries {
        let closes: Vec<f64> = (0..len).map(|i| 100.0 + i as f64).collect();
        series(&closes)
    }

    fn cash_config() -> BacktestConfig {
        BacktestConfig {
            commission_rate: 0.0,
            market: Market::Cash { lot_size: 100 },
            ..BacktestConfig::new("600000")
        }
    }

    #[test]
    fn rejects_short_series() {
        let err = run_backtest(&rising(9), &StrategyDefinition::default(), &cash_config())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData { bars: 9, minimum: 10, .. }
        ));
    }

    #[test]
    fn rejects_non_positive_capital() {
        let config = BacktestConfig {
            initial_capital: 0.0,
            ..cash_config()
        };
        assert!(matches!(
            run_backtest(&rising(30), &StrategyDefinition::default(), &config),
            Err(EngineError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn default_strategy_buys_once_on_rising_series() {
        let result =
            run_backtest(&rising(60), &StrategyDefinition::default(), &cash_config()).unwrap();
        assert_eq!(result.trades.len(), 1);
        let buy = &result.trades[0];
        assert_eq!(buy.action, TradeAction::Buy);
        assert!((buy.price - 120.0).abs() < f64::EPSILON);
        assert_eq!(buy.quantity, 800);
        assert!((result.final_equity - 131_200.0).abs() < 1e-6);
        assert!(result.final_equity > result.initial_capital);
        assert_eq!(result.price_series.len(), 60);
        assert!(result.diagnostics.is_none());
    }

    #[test]
    fn equity_sampled_on_interval_and_last_bar() {
        let result =
            run_backtest(&rising(25), &StrategyDefinition::default(), &cash_config()).unwrap();
        // indices 0, 10, 20 and the final 24
        assert_eq!(result.equity_curve.len(), 4);
        assert!((result.equity_curve[0].ret - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn start_date_trims_series() {
        let config = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 11),
            ..cash_config()
        };
        let result = run_backtest(&rising(30), &StrategyDefinition::default(), &config).unwrap();
        assert_eq!(result.data_info.records, 20);
        assert!((result.data_info.min_low - 110.0).abs() < f64::EPSILON);
    }

    #[test]
    fn debug_run_reports_diagnostics() {
        let config = BacktestConfig {
            debug: true,
            ..cash_config()
        };
        let result = run_backtest(&rising(60), &StrategyDefinition::default(), &config).unwrap();
        let diag = result.diagnostics.unwrap();
        assert_eq!(diag.strategy, "ma_trend");
        assert_eq!(diag.buy_attempts, 1);
        assert_eq!(diag.fills, 1);
        assert!(diag.signal_counts.entry >= 1);
        assert!(diag.contract.is_none());
    }

    #[test]
    fn stop_loss_closes_losing_position() {
        let mut closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        closes.extend([100.0, 90.0, 80.0, 70.0, 60.0]);
        let def = definition(json!({
            "meta": {"stop_loss": {"type": "pct", "value": 10}}
        }));
        let result = run_backtest(&series(&closes), &def, &cash_config()).unwrap();
        let stop = result
            .trades
            .iter()
            .find(|t| t.note == Some(TradeNote::StopLoss));
        assert!(stop.is_some());
        assert!(stop.unwrap().realized_pnl.unwrap() < 0.0);
    }

    #[test]
    fn stop_loss_skips_the_entry_bar() {
        let mut closes = vec![100.0; 30];
        closes.push(110.0);
        closes.extend([120.0; 29]);
        let def = definition(json!({
            "signal": {"type": "ma_cross", "period": 20},
            "meta": {"stop_loss": {"type": "amount", "value": 1}}
        }));
        let config = BacktestConfig {
            commission_rate: 0.001,
            debug: true,
            ..cash_config()
        };
        let result = run_backtest(&series(&closes), &def, &config).unwrap();

        // Commission alone exceeds the stop amount on the fill bar.
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].action, TradeAction::Buy);
        assert!((result.trades[0].price - 110.0).abs() < f64::EPSILON);
        assert_eq!(result.diagnostics.unwrap().stop_losses, 0);
    }

    #[test]
    fn margin_run_closes_at_series_end() {
        let config = BacktestConfig {
            market: Market::Margin(ContractSpec {
                multiplier: 10.0,
                tick_size: 1.0,
                fee_per_contract: 2.0,
                initial_margin_rate: 0.14,
                maintenance_margin_rate: 0.14,
            }),
            debug: true,
            ..BacktestConfig::new("RB")
        };
        let result = run_backtest(&rising(40), &StrategyDefinition::default(), &config).unwrap();
        let last = result.trades.last().unwrap();
        assert_eq!(last.action, TradeAction::Sell);
        assert_eq!(last.note, Some(TradeNote::Final));
        assert!(last.realized_pnl.unwrap() > 0.0);
        // equity recorded every bar from the warmup index
        assert_eq!(result.equity_curve.len(), 20);
        let diag = result.diagnostics.unwrap();
        assert_eq!(diag.capacity_samples.len(), 1);
        assert!(diag.contract.is_some());
        assert!((result.final_equity - (result.initial_capital + last.realized_pnl.unwrap())).abs() < 1e-6);
    }

    #[test]
    fn condition_to_buy_graph_sells_on_death_cross() {
        let mut closes = vec![100.0; 30];
        closes.extend([110.0; 15]);
        closes.extend([90.0; 25]);
        let def = definition(json!({
            "nodes": [
                {"id": "c", "type": "condition", "data": {"subType": "ma", "period": 20}},
                {"id": "a", "type": "action", "data": {"type": "buy"}}
            ],
            "edges": [{"source": "c", "target": "a"}]
        }));
        let result = run_backtest(&series(&closes), &def, &cash_config()).unwrap();

        let buys: Vec<_> = result.trades.iter().filter(|t| t.action == TradeAction::Buy).collect();
        let sells: Vec<_> = result.trades.iter().filter(|t| t.action == TradeAction::Sell).collect();
        assert_eq!(buys.len(), 1);
        assert!((buys[0].price - 110.0).abs() < f64::EPSILON);
        assert_eq!(sells.len(), 1);
        assert!((sells[0].price - 90.0).abs() < f64::EPSILON);
        assert_eq!(sells[0].timestamp, series(&closes).bars()[46].timestamp);
    }

    #[test]
    fn result_serializes_expected_keys() {
        let result =
            run_backtest(&rising(30), &StrategyDefinition::default(), &cash_config()).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        for key in [
            "initial_capital",
            "final_equity",
            "total_return",
            "win_rate",
            "profit_loss_ratio",
            "max_drawdown",
            "total_trades",
            "trades",
            "equity_curve",
            "price_series",
            "data_info",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json.get("diagnostics").is_none());
        assert_eq!(json["data_info"]["timeframe"], "1d");
    }
}
