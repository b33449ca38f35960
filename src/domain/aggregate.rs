//! Bar aggregation from fine-grained raw bars to a requested timeframe.
//!
//! The cutoff filter runs before any grouping, so a bar stamped after the
//! cutoff can never leak into a partially formed period.
//!
//! Grouping rules:
//! - minute timeframes: right-closed windows labelled by their end
//! - `1h` / `4h`: floored buckets from midnight
//! - `1d`: calendar date
//! - `1w`: weeks ending Friday
//! - `1M`: calendar month
//!
//! Each output bar is stamped with the last raw timestamp of its group.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use log::warn;

use super::error::EngineError;
use super::ohlcv::{Bar, BarSeries};
use super::timeframe::Timeframe;

pub fn aggregate(
    raw: &[Bar],
    timeframe: Timeframe,
    cutoff: Option<NaiveDate>,
) -> Result<BarSeries, EngineError> {
    let mut bars: Vec<Bar> = raw
        .iter()
        .filter(|b| cutoff.is_none_or(|c| b.date() <= c))
        .cloned()
        .collect();

    for bar in &bars {
        bar.validate()?;
    }

    bars.sort_by_key(|b| b.timestamp);
    if let Some(pair) = bars.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
        return Err(EngineError::integrity(format!(
            "duplicate timestamp {}",
            pair[0].timestamp
        )));
    }

    let mut out = Vec::new();
    let mut dropped = 0usize;
    let mut start = 0usize;
    while start < bars.len() {
        let key = group_key(bars[start].timestamp, timeframe);
        let mut end = start + 1;
        while end < bars.len() && group_key(bars[end].timestamp, timeframe) == key {
            end += 1;
        }
        match merge_group(&bars[start..end]) {
            Some(bar) => out.push(bar),
            None => dropped += 1,
        }
        start = end;
    }

    if dropped > 0 {
        warn!("dropped {dropped} {timeframe} groups with NaN prices or volume");
    }

    BarSeries::new(out)
}

/// The label identifying which output period a raw timestamp belongs to.
///
/// Every rule is monotone in time, so equal keys are always contiguous in
/// a sorted series.
fn group_key(ts: NaiveDateTime, timeframe: Timeframe) -> NaiveDateTime {
    let midnight = ts.date().and_hms_opt(0, 0, 0).unwrap_or(ts);
    let secs = ts.num_seconds_from_midnight() as i64;
    match timeframe {
        Timeframe::Min1 | Timeframe::Min5 | Timeframe::Min15 | Timeframe::Min30 => {
            let width = timeframe.minutes().unwrap_or(1) * 60;
            let buckets = (secs + width - 1) / width;
            midnight + Duration::seconds(buckets * width)
        }
        Timeframe::Hour1 | Timeframe::Hour4 => {
            let width = if timeframe == Timeframe::Hour1 { 3600 } else { 4 * 3600 };
            midnight + Duration::seconds(secs / width * width)
        }
        Timeframe::Day1 => midnight,
        Timeframe::Week1 => {
            let from_monday = ts.date().weekday().num_days_from_monday() as i64;
            let to_friday = (4 - from_monday).rem_euclid(7);
            midnight + Duration::days(to_friday)
        }
        Timeframe::Month1 => ts
            .date()
            .with_day(1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(midnight),
    }
}

fn merge_group(group: &[Bar]) -> Option<Bar> {
    if group.iter().any(|b| !b.is_complete()) {
        return None;
    }
    let first = group.first()?;
    let last = group.last()?;

    let high = group.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = group.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let volume = group.iter().map(|b| b.volume).sum();
    let amount = if group.iter().any(|b| b.amount.is_some()) {
        Some(group.iter().filter_map(|b| b.amount).sum())
    } else {
        None
    };

    Some(Bar {
        timestamp: last.timestamp,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
        amount,
    })
}
