//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the first input, then EMA[i] = X[i]*k + EMA[i-1]*(1-k).
//! Every point is defined, so callers decide their own warmup.

pub fn ema_values(input: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = input.first() else {
        return Vec::new();
    };
    let k = 2.0 / (period.max(1) as f64 + 1.0);

    let mut out = Vec::with_capacity(input.len());
    let mut ema = first;
    out.push(ema);
    for &x in &input[1..] {
        ema = x * k + ema * (1.0 - k);
        out.push(ema);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_seed_is_first_value() {
        let out = ema_values(&[10.0, 20.0, 30.0], 3);
        assert!((out[0] - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_recursive_calculation() {
        let out = ema_values(&[10.0, 20.0, 30.0], 3);
        let k = 0.5;
        let e1 = 20.0 * k + 10.0 * (1.0 - k);
        let e2 = 30.0 * k + e1 * (1.0 - k);
        assert!((out[1] - e1).abs() < f64::EPSILON);
        assert!((out[2] - e2).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_period_1_tracks_input() {
        let out = ema_values(&[10.0, 20.0, 30.0], 1);
        assert_eq!(out, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn ema_equal_prices() {
        let out = ema_values(&[100.0; 5], 3);
        assert!(out.iter().all(|v| (v - 100.0).abs() < f64::EPSILON));
    }

    #[test]
    fn ema_empty_input() {
        assert!(ema_values(&[], 3).is_empty());
    }
}
