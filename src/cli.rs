//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use crate::adapters::csv_adapter::CsvBarProvider;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{
    self as backtest_engine, BacktestConfig, BacktestResult, DataInfo, Market,
    DEFAULT_COMMISSION_RATE, DEFAULT_EQUITY_SAMPLE_INTERVAL, DEFAULT_INITIAL_CAPITAL,
};
use crate::domain::bar_cache::BarCache;
use crate::domain::config_validation::{parse_date, validate_backtest_config, validate_data_config};
use crate::domain::error::EngineError;
use crate::domain::ledger::{PositionManagement, default_lot_size, is_cash_symbol};
use crate::domain::margin::ContractSpec;
use crate::domain::strategy::StrategyDefinition;
use crate::domain::timeframe::Timeframe;
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "stratbench", about = "Strategy backtester for cash and margin markets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MarketKind {
    Cash,
    Margin,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        timeframe: Option<String>,
        #[arg(long, value_enum)]
        market: Option<MarketKind>,
        /// Include run diagnostics in the result
        #[arg(long)]
        debug: bool,
        /// Write the JSON result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Validate config and strategy without loading data
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a strategy definition
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// Show the aggregated data range for a symbol
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        timeframe: Option<String>,
    },
}

/// Command line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub market: Option<MarketKind>,
    pub debug: bool,
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            strategy,
            symbol,
            timeframe,
            market,
            debug,
            output,
            dry_run,
        } => {
            let overrides = Overrides {
                symbol,
                timeframe,
                market,
                debug,
            };
            if dry_run {
                run_dry_run(&config, &strategy, &overrides)
            } else {
                run_backtest(&config, &strategy, &overrides, output.as_deref())
            }
        }
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Info {
            config,
            symbol,
            timeframe,
        } => {
            let overrides = Overrides {
                symbol,
                timeframe,
                ..Overrides::default()
            };
            run_info(&config, &overrides)
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, EngineError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    validate_backtest_config(&adapter)?;
    Ok(adapter)
}

pub fn load_strategy(path: &Path) -> Result<StrategyDefinition, EngineError> {
    let text = fs::read_to_string(path)?;
    StrategyDefinition::from_json(&text)
}

fn optional_date(adapter: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, EngineError> {
    adapter
        .get_string("backtest", key)
        .map(|s| parse_date(&s, key))
        .transpose()
}

fn resolve_symbol(adapter: &dyn ConfigPort, overrides: &Overrides) -> Result<String, EngineError> {
    overrides
        .symbol
        .clone()
        .or_else(|| adapter.get_string("backtest", "symbol"))
        .ok_or_else(|| EngineError::ConfigMissing {
            section: "backtest".into(),
            key: "symbol".into(),
        })
}

fn resolve_timeframe(adapter: &dyn ConfigPort, overrides: &Overrides) -> Result<Timeframe, EngineError> {
    match overrides
        .timeframe
        .clone()
        .or_else(|| adapter.get_string("backtest", "timeframe"))
    {
        Some(raw) => Timeframe::from_str(&raw),
        None => Ok(Timeframe::Day1),
    }
}

pub fn build_backtest_config(
    adapter: &dyn ConfigPort,
    overrides: &Overrides,
) -> Result<BacktestConfig, EngineError> {
    let symbol = resolve_symbol(adapter, overrides)?;
    let timeframe = resolve_timeframe(adapter, overrides)?;

    let management = match adapter.get_string("backtest", "position_management") {
        Some(raw) => PositionManagement::from_str(&raw)?,
        None => PositionManagement::Full,
    };

    let kind = match overrides.market {
        Some(kind) => kind,
        None => match adapter.get_string("backtest", "market") {
            Some(raw) => <MarketKind as ValueEnum>::from_str(&raw, true).map_err(|reason| {
                EngineError::ConfigInvalid {
                    section: "backtest".into(),
                    key: "market".into(),
                    reason,
                }
            })?,
            None if is_cash_symbol(&symbol) => MarketKind::Cash,
            None => MarketKind::Margin,
        },
    };
    let market = match kind {
        MarketKind::Cash => Market::Cash {
            lot_size: adapter.get_int("backtest", "lot_size", default_lot_size(&symbol)),
        },
        MarketKind::Margin => Market::Margin(ContractSpec::from_config(adapter, &symbol)?),
    };

    let interval = adapter.get_int(
        "backtest",
        "equity_sample_interval",
        DEFAULT_EQUITY_SAMPLE_INTERVAL as i64,
    );

    Ok(BacktestConfig {
        start_date: optional_date(adapter, "start_date")?,
        end_date: optional_date(adapter, "end_date")?,
        initial_capital: adapter.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL),
        commission_rate: adapter.get_double("backtest", "commission_rate", DEFAULT_COMMISSION_RATE),
        management,
        market,
        equity_sample_interval: usize::try_from(interval).unwrap_or(DEFAULT_EQUITY_SAMPLE_INTERVAL),
        debug: overrides.debug || adapter.get_bool("backtest", "debug", false),
        symbol,
        timeframe,
    })
}

fn bar_cache(adapter: &dyn ConfigPort) -> Result<BarCache<CsvBarProvider>, EngineError> {
    validate_data_config(adapter)?;
    let dir = adapter
        .get_string("data", "dir")
        .ok_or_else(|| EngineError::ConfigMissing {
            section: "data".into(),
            key: "dir".into(),
        })?;
    Ok(BarCache::new(CsvBarProvider::new(PathBuf::from(dir))))
}

fn run_backtest(
    config_path: &Path,
    strategy_path: &Path,
    overrides: &Overrides,
    output_path: Option<&Path>,
) -> Result<(), EngineError> {
    let adapter = load_config(config_path)?;
    let bt_config = build_backtest_config(&adapter, overrides)?;
    let definition = load_strategy(strategy_path)?;
    let cache = bar_cache(&adapter)?;

    info!(
        "loading {} {} up to {}",
        bt_config.symbol,
        bt_config.timeframe,
        bt_config
            .end_date
            .map_or_else(|| "latest".to_string(), |d| d.to_string())
    );
    let series = cache.get(&bt_config.symbol, bt_config.timeframe, bt_config.end_date)?;
    let result = backtest_engine::run_backtest(&series, &definition, &bt_config)?;

    print_summary(&result);
    write_result(&result, output_path)
}

fn print_summary(result: &BacktestResult) {
    eprintln!("\n=== Results: {} ({}) ===", result.data_info.symbol, result.data_info.timeframe);
    eprintln!("Final Equity:     {:.2}", result.final_equity);
    eprintln!("Total Return:     {:.2}%", result.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", result.annual_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", result.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", result.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", result.total_trades);
    eprintln!("Win Rate:         {:.1}%", result.win_rate * 100.0);
    eprintln!("P/L Ratio:        {:.2}", result.profit_loss_ratio);
}

fn write_result(result: &BacktestResult, output_path: Option<&Path>) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(result).map_err(std::io::Error::from)?;
    match output_path {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!("\nResult written to: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_dry_run(
    config_path: &Path,
    strategy_path: &Path,
    overrides: &Overrides,
) -> Result<(), EngineError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_data_config(&adapter)?;
    let bt_config = build_backtest_config(&adapter, overrides)?;
    let plan = load_strategy(strategy_path)?.plan()?;

    eprintln!("Config validated successfully");
    eprintln!("  symbol:     {}", bt_config.symbol);
    eprintln!("  timeframe:  {}", bt_config.timeframe);
    match &bt_config.market {
        Market::Cash { lot_size } => eprintln!("  market:     cash (lot {lot_size})"),
        Market::Margin(spec) => eprintln!(
            "  market:     margin (x{}, tick {}, margin {}/{})",
            spec.multiplier, spec.tick_size, spec.initial_margin_rate, spec.maintenance_margin_rate
        ),
    }
    eprintln!("  strategy:   {}", plan.describe());
    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_validate(strategy_path: &Path) -> Result<(), EngineError> {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let definition = load_strategy(strategy_path)?;
    let plan = definition.plan()?;

    eprintln!("  Plan: {}", plan.describe());
    if let Some(stop) = definition.stop_loss() {
        eprintln!("  Stop-loss: {:?} {} ({:?})", stop.kind, stop.value, stop.action);
    }
    eprintln!("\nStrategy definition is valid.");
    Ok(())
}

fn run_info(config_path: &Path, overrides: &Overrides) -> Result<(), EngineError> {
    let adapter = load_config(config_path)?;
    let symbol = resolve_symbol(&adapter, overrides)?;
    let timeframe = resolve_timeframe(&adapter, overrides)?;
    let cutoff = optional_date(&adapter, "end_date")?;

    let series = bar_cache(&adapter)?.get(&symbol, timeframe, cutoff)?;
    match DataInfo::from_series(&series, &symbol, timeframe) {
        Some(info) => {
            println!(
                "{} ({}): {} bars, {} to {}, low {:.2}, high {:.2}, last close {:.2}",
                info.symbol,
                info.timeframe,
                info.records,
                info.first_timestamp,
                info.last_timestamp,
                info.min_low,
                info.max_high,
                info.last_close
            );
            Ok(())
        }
        None => Err(EngineError::InsufficientData {
            symbol,
            bars: 0,
            minimum: backtest_engine::MIN_BARS,
        }),
    }
}
