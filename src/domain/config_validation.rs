//! Configuration validation.
//!
//! Validates every `[backtest]` and `[data]` field before any bars are
//! loaded. Absent optional keys fall back to their defaults later.

use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::error::EngineError;
use crate::domain::ledger::PositionManagement;
use crate::domain::timeframe::Timeframe;
use crate::ports::config_port::ConfigPort;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_dates(config)?;
    validate_timeframe(config)?;
    validate_position_management(config)?;
    validate_market(config)?;
    validate_lot_size(config)?;
    validate_sample_interval(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), EngineError> {
    if config.get_string("data", "dir").is_none() {
        return Err(EngineError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        });
    }
    Ok(())
}

fn invalid(key: &str, reason: impl Into<String>) -> EngineError {
    EngineError::ConfigInvalid {
        section: "backtest".to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// A present but unparseable number is an error, not a silent default.
fn number(config: &dyn ConfigPort, key: &str) -> Result<Option<f64>, EngineError> {
    match config.get_string("backtest", key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(key, format!("'{raw}' is not a number"))),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), EngineError> {
    if let Some(value) = number(config, "initial_capital")?
        && (value.is_nan() || value <= 0.0)
    {
        return Err(invalid("initial_capital", "initial_capital must be positive"));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), EngineError> {
    if let Some(value) = number(config, "commission_rate")?
        && (value.is_nan() || value < 0.0)
    {
        return Err(invalid("commission_rate", "commission_rate must be non-negative"));
    }
    Ok(())
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| invalid(field, "invalid date format (expected YYYY-MM-DD)"))
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), EngineError> {
    let start = config
        .get_string("backtest", "start_date")
        .map(|s| parse_date(&s, "start_date"))
        .transpose()?;
    let end = config
        .get_string("backtest", "end_date")
        .map(|s| parse_date(&s, "end_date"))
        .transpose()?;
    if let (Some(start), Some(end)) = (start, end)
        && start > end
    {
        return Err(invalid("start_date", "start_date must be on or before end_date"));
    }
    Ok(())
}

fn validate_timeframe(config: &dyn ConfigPort) -> Result<(), EngineError> {
    if let Some(raw) = config.get_string("backtest", "timeframe") {
        Timeframe::from_str(&raw)?;
    }
    Ok(())
}

fn validate_position_management(config: &dyn ConfigPort) -> Result<(), EngineError> {
    if let Some(raw) = config.get_string("backtest", "position_management") {
        PositionManagement::from_str(&raw)?;
    }
    Ok(())
}

fn validate_market(config: &dyn ConfigPort) -> Result<(), EngineError> {
    match config.get_string("backtest", "market") {
        None => Ok(()),
        Some(raw) if matches!(raw.to_ascii_lowercase().as_str(), "cash" | "margin") => Ok(()),
        Some(raw) => Err(invalid("market", format!("expected cash or margin, got '{raw}'"))),
    }
}

fn validate_lot_size(config: &dyn ConfigPort) -> Result<(), EngineError> {
    if let Some(raw) = config.get_string("backtest", "lot_size") {
        match raw.parse::<i64>() {
            Ok(lot) if lot > 0 => {}
            _ => return Err(invalid("lot_size", "lot_size must be a positive integer")),
        }
    }
    Ok(())
}

fn validate_sample_interval(config: &dyn ConfigPort) -> Result<(), EngineError> {
    if let Some(raw) = config.get_string("backtest", "equity_sample_interval") {
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => {}
            _ => {
                return Err(invalid(
                    "equity_sample_interval",
                    "equity_sample_interval must be a positive integer",
                ));
            }
        }
    }
    Ok(())
}
