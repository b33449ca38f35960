//! Rolling volume-weighted average price.
//!
//! VWAP(n)[i] = sum(C*V over the window) / sum(V over the window).
//! Invalid during warmup and whenever the window traded no volume. The
//! window counts its traded bars so a quiet window reads as exactly empty
//! rather than as the rounding residue of the running sums.

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, invalid_series,
};
use crate::domain::ohlcv::Bar;

pub fn calculate_vwap(bars: &[Bar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return invalid_series(
            IndicatorType::Vwap(period),
            bars.iter().map(|b| b.timestamp),
            IndicatorValue::Simple(0.0),
        );
    }

    let mut values = Vec::with_capacity(bars.len());
    let mut value_sum = 0.0;
    let mut volume_sum = 0.0;
    let mut traded = 0usize;

    for (i, bar) in bars.iter().enumerate() {
        value_sum += bar.close * bar.volume;
        volume_sum += bar.volume;
        traded += usize::from(bar.volume > 0.0);
        if i >= period {
            let old = &bars[i - period];
            value_sum -= old.close * old.volume;
            volume_sum -= old.volume;
            traded -= usize::from(old.volume > 0.0);
        }
        if traded == 0 {
            value_sum = 0.0;
            volume_sum = 0.0;
        }
        let valid = i + 1 >= period && traded > 0;
        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid,
            value: IndicatorValue::Simple(if valid { value_sum / volume_sum } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Vwap(period),
        values,
    }
}
