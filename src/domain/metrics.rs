//! Performance metrics over an equity curve and trade list.
//!
//! Every value returned here is finite: NaN and infinities are replaced
//! with zero before they leave the calculator.

use super::error::sanitize;
use super::trade::{EquityPoint, TradeRecord};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const CALENDAR_DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annual_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_loss_ratio: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
}

impl Metrics {
    /// `num_days` is the calendar span of the traded series.
    pub fn compute(
        initial_capital: f64,
        final_equity: f64,
        equity_curve: &[EquityPoint],
        trades: &[TradeRecord],
        num_days: i64,
    ) -> Self {
        let total_return = total_return(initial_capital, final_equity);
        let (win_rate, profit_loss_ratio, winning_trades, losing_trades) = trade_stats(trades);

        Metrics {
            total_return,
            annual_return: annual_return(total_return, num_days),
            sharpe_ratio: sharpe_ratio(equity_curve),
            max_drawdown: max_drawdown(equity_curve),
            win_rate,
            profit_loss_ratio,
            total_trades: trades.len(),
            winning_trades,
            losing_trades,
        }
    }
}

pub fn total_return(initial_capital: f64, final_equity: f64) -> f64 {
    if initial_capital <= 0.0 {
        return 0.0;
    }
    sanitize((final_equity - initial_capital) / initial_capital)
}

pub fn annual_return(total_return: f64, num_days: i64) -> f64 {
    if num_days <= 0 {
        return 0.0;
    }
    sanitize((1.0 + total_return).powf(CALENDAR_DAYS_PER_YEAR / num_days as f64) - 1.0)
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
    }
    sanitize(max_dd)
}

/// Annualised Sharpe over the recorded per-point returns, zero when they
/// have no variance.
pub fn sharpe_ratio(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = equity_curve[1..].iter().map(|p| p.ret).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if stddev > 0.0 {
        sanitize(mean / stddev * TRADING_DAYS_PER_YEAR.sqrt())
    } else {
        0.0
    }
}

fn trade_stats(trades: &[TradeRecord]) -> (f64, f64, usize, usize) {
    let closed: Vec<f64> = trades.iter().filter_map(|t| t.realized_pnl).collect();
    let wins: Vec<f64> = closed.iter().copied().filter(|&p| p > 0.0).collect();
    let losses: Vec<f64> = closed.iter().copied().filter(|&p| p < 0.0).collect();

    let win_rate = if closed.is_empty() {
        0.0
    } else {
        wins.len() as f64 / closed.len() as f64
    };

    let profit_loss_ratio = if losses.is_empty() || wins.is_empty() {
        0.0
    } else {
        let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
        let avg_loss = losses.iter().map(|l| l.abs()).sum::<f64>() / losses.len() as f64;
        avg_win / avg_loss
    };

    (
        sanitize(win_rate),
        sanitize(profit_loss_ratio),
        wins.len(),
        losses.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::{EquityCurve, TradeAction};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
            + chrono::Duration::days(i)
    }

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        let mut curve = EquityCurve::new();
        for (i, &v) in values.iter().enumerate() {
            curve.record(ts(i as i64), v, 10.0);
        }
        curve.into_points()
    }

    fn sell(pnl: Option<f64>) -> TradeRecord {
        TradeRecord {
            timestamp: ts(0),
            action: if pnl.is_some() {
                TradeAction::Sell
            } else {
                TradeAction::Buy
            },
            price: 10.0,
            quantity: 100,
            amount: 1000.0,
            realized_pnl: pnl,
            note: None,
        }
    }

    #[test]
    fn total_return_basic() {
        assert!((total_return(100_000.0, 110_000.0) - 0.1).abs() < 1e-12);
        assert!((total_return(0.0, 110_000.0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn annual_return_guards_days() {
        assert!((annual_return(0.5, 0) - 0.0).abs() < f64::EPSILON);
        assert!((annual_return(0.5, -3) - 0.0).abs() < f64::EPSILON);
        let one_year = annual_return(0.1, 365);
        assert!((one_year - 0.1).abs() < 1e-3);
    }

    #[test]
    fn max_drawdown_tracks_running_peak() {
        let dd = max_drawdown(&curve(&[100.0, 120.0, 90.0, 130.0, 117.0]));
        assert!((dd - 0.25).abs() < 1e-12);
        assert!((max_drawdown(&[]) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn single_point_sharpe_is_zero() {
        assert!((sharpe_ratio(&curve(&[100_000.0])) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn flat_curve_sharpe_is_zero() {
        assert!((sharpe_ratio(&curve(&[100.0, 100.0, 100.0])) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rising_curve_sharpe_positive() {
        assert!(sharpe_ratio(&curve(&[100.0, 101.0, 103.0, 104.0])) > 0.0);
    }

    #[test]
    fn trade_statistics() {
        let trades = vec![
            sell(None),
            sell(Some(300.0)),
            sell(None),
            sell(Some(-100.0)),
            sell(None),
            sell(Some(100.0)),
        ];
        let m = Metrics::compute(1000.0, 1300.0, &curve(&[1000.0, 1300.0]), &trades, 30);
        assert_eq!(m.total_trades, 6);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 1);
        assert!((m.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.profit_loss_ratio - 2.0).abs() < 1e-12);
    }

    #[test]
    fn no_losers_gives_zero_ratio() {
        let trades = vec![sell(None), sell(Some(50.0))];
        let m = Metrics::compute(1000.0, 1050.0, &curve(&[1000.0]), &trades, 1);
        assert!((m.profit_loss_ratio - 0.0).abs() < f64::EPSILON);
        assert!((m.win_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_trades_all_zero() {
        let m = Metrics::compute(1000.0, 1000.0, &[], &[], 0);
        assert_eq!(
            m,
            Metrics {
                total_return: 0.0,
                annual_return: 0.0,
                sharpe_ratio: 0.0,
                max_drawdown: 0.0,
                win_rate: 0.0,
                profit_loss_ratio: 0.0,
                total_trades: 0,
                winning_trades: 0,
                losing_trades: 0,
            }
        );
    }
}
