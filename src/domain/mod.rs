//! Core engine: bars, signals, strategies, ledgers and metrics.

pub mod aggregate;
pub mod backtest;
pub mod bar_cache;
pub mod config_validation;
pub mod error;
pub mod graph;
pub mod indicator;
pub mod ledger;
pub mod margin;
pub mod metrics;
pub mod ohlcv;
pub mod position;
pub mod signal;
pub mod strategy;
pub mod timeframe;
pub mod trade;
