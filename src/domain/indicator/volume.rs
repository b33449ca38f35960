//! Volume ratio: current volume over its rolling mean (current bar included).
//! A window with no traded bar is invalid.

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, invalid_series,
};
use crate::domain::ohlcv::Bar;

pub fn calculate_volume_ratio(bars: &[Bar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return invalid_series(
            IndicatorType::VolumeRatio(period),
            bars.iter().map(|b| b.timestamp),
            IndicatorValue::Simple(0.0),
        );
    }

    let mut values = Vec::with_capacity(bars.len());
    let mut sum = 0.0;
    let mut traded = 0usize;
    for (i, bar) in bars.iter().enumerate() {
        sum += bar.volume;
        traded += usize::from(bar.volume > 0.0);
        if i >= period {
            let old = bars[i - period].volume;
            sum -= old;
            traded -= usize::from(old > 0.0);
        }
        if traded == 0 {
            sum = 0.0;
        }
        let avg = sum / period as f64;
        let valid = i + 1 >= period && traded > 0 && avg > 0.0;
        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid,
            value: IndicatorValue::Simple(if valid { bar.volume / avg } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::VolumeRatio(period),
        values,
    }
}
