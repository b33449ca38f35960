//! CSV raw bar provider.
//!
//! Reads `<dir>/<symbol>.csv`. The header must name `timestamp` (or
//! `timestamps`), `open`, `high`, `low`, `close` and `volume`; `amount` is
//! optional. Column order is free.

use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::error::EngineError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::BarProvider;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub struct CsvBarProvider {
    base_path: PathBuf,
}

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    amount: Option<usize>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Result<Self, EngineError> {
        let find = |names: &[&str]| {
            header
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| {
                EngineError::integrity(format!("missing required column '{}'", names[0]))
            })
        };
        Ok(Columns {
            timestamp: require(&["timestamp", "timestamps"])?,
            open: require(&["open"])?,
            high: require(&["high"])?,
            low: require(&["low"])?,
            close: require(&["close"])?,
            volume: require(&["volume"])?,
            amount: find(&["amount"]),
        })
    }
}

impl CsvBarProvider {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, EngineError> {
    let value = value.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }
    // Date-only rows are daily closes.
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(15, 0, 0))
        .ok_or_else(|| EngineError::integrity(format!("invalid timestamp '{value}'")))
}

fn parse_field(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, EngineError> {
    let raw = record
        .get(index)
        .ok_or_else(|| EngineError::integrity(format!("row is missing the {name} column")))?;
    let raw = raw.trim();
    // Empty cells read as NaN; such groups are dropped during aggregation.
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse()
        .map_err(|e| EngineError::integrity(format!("invalid {name} value '{raw}': {e}")))
}

impl BarProvider for CsvBarProvider {
    fn load_raw(&self, symbol: &str) -> Result<Vec<Bar>, EngineError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let header = rdr
            .headers()
            .map_err(|e| EngineError::integrity(format!("{}: {e}", path.display())))?
            .clone();
        let columns = Columns::from_header(&header)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| EngineError::integrity(format!("CSV parse error: {e}")))?;
            let timestamp = record
                .get(columns.timestamp)
                .ok_or_else(|| EngineError::integrity("row is missing the timestamp column"))?;
            let amount = match columns.amount {
                Some(i) => Some(parse_field(&record, i, "amount")?).filter(|a| !a.is_nan()),
                None => None,
            };
            bars.push(Bar {
                timestamp: parse_timestamp(timestamp)?,
                open: parse_field(&record, columns.open, "open")?,
                high: parse_field(&record, columns.high, "high")?,
                low: parse_field(&record, columns.low, "low")?,
                close: parse_field(&record, columns.close, "close")?,
                volume: parse_field(&record, columns.volume, "volume")?,
                amount,
            });
        }

        Ok(bars)
    }
}
