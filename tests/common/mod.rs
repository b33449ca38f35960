#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use stratbench::domain::error::EngineError;
pub use stratbench::domain::ohlcv::{Bar, BarSeries};
use stratbench::ports::data_port::BarProvider;

pub struct MockBarProvider {
    pub data: HashMap<String, Vec<Bar>>,
    pub loads: AtomicUsize,
}

impl MockBarProvider {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl BarProvider for MockBarProvider {
    fn load_raw(&self, symbol: &str) -> Result<Vec<Bar>, EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.data.get(symbol).cloned().ok_or_else(|| {
            EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no bars for {symbol}"),
            ))
        })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

pub fn make_bar(timestamp: NaiveDateTime, close: f64) -> Bar {
    Bar {
        timestamp,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1000.0,
        amount: None,
    }
}

/// Daily bars at 15:00 starting 2024-01-01, one per close.
pub fn daily_bars(closes: &[f64]) -> Vec<Bar> {
    let start = ts("2024-01-01 15:00:00");
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(start + Duration::days(i as i64), c))
        .collect()
}

pub fn daily_series(closes: &[f64]) -> BarSeries {
    BarSeries::new(daily_bars(closes)).unwrap()
}

pub fn rising_closes(len: usize) -> Vec<f64> {
    (0..len).map(|i| 100.0 + i as f64).collect()
}

/// CSV text in the on-disk bar format.
pub fn bars_to_csv(bars: &[Bar]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.timestamp.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    out
}
