//! ADX: Average Directional Index (Wilder).
//!
//! 1. +DM / -DM from consecutive highs and lows
//! 2. Wilder-smooth +DM, -DM and TR
//! 3. +DI, -DI = 100 * smoothed DM / smoothed TR
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 5. ADX = Wilder-smoothed DX
//!
//! Lookback: 2 * period.

use super::atr::{true_range, wilder_smooth};
use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    /// A zero period is treated as 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("adx_{period}"),
        }
    }
}

/// Directional movement pair for bar `i` relative to bar `i - 1`.
fn directional_movement(prev: &PriceBar, bar: &PriceBar) -> (f64, f64) {
    let up = bar.high - prev.high;
    let down = prev.low - bar.low;
    if up.is_nan() || down.is_nan() {
        return (f64::NAN, f64::NAN);
    }
    let plus = if up > down && up > 0.0 { up } else { 0.0 };
    let minus = if down > up && down > 0.0 { down } else { 0.0 };
    (plus, minus)
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let n = bars.len();
        if n < 2 {
            return vec![f64::NAN; n];
        }

        let mut plus_dm = vec![f64::NAN; n];
        let mut minus_dm = vec![f64::NAN; n];
        for i in 1..n {
            let (p, m) = directional_movement(&bars[i - 1], &bars[i]);
            plus_dm[i] = p;
            minus_dm[i] = m;
        }

        let tr = wilder_smooth(&true_range(bars), self.period);
        let pdm = wilder_smooth(&plus_dm, self.period);
        let mdm = wilder_smooth(&minus_dm, self.period);

        let dx: Vec<f64> = (0..n)
            .map(|i| {
                if tr[i].is_nan() || pdm[i].is_nan() || mdm[i].is_nan() || tr[i] == 0.0 {
                    return f64::NAN;
                }
                let plus_di = 100.0 * pdm[i] / tr[i];
                let minus_di = 100.0 * mdm[i] / tr[i];
                let sum = plus_di + minus_di;
                if sum == 0.0 {
                    0.0
                } else {
                    100.0 * (plus_di - minus_di).abs() / sum
                }
            })
            .collect();

        wilder_smooth(&dx, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_bars, make_ohlc_bars};

    fn sample() -> Vec<PriceBar> {
        make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0),
            (106.0, 107.0, 98.0, 99.0),
            (99.0, 103.0, 97.0, 101.0),
            (101.0, 106.0, 100.0, 105.0),
            (105.0, 110.0, 103.0, 108.0),
            (108.0, 112.0, 106.0, 110.0),
            (110.0, 111.0, 104.0, 105.0),
            (105.0, 109.0, 103.0, 107.0),
            (107.0, 113.0, 105.0, 112.0),
        ])
    }

    #[test]
    fn adx_bounds() {
        let result = Adx::new(3).compute(&sample());
        let valid: Vec<f64> = result.iter().copied().filter(|v| !v.is_nan()).collect();
        assert!(!valid.is_empty());
        for v in valid {
            assert!((0.0..=100.0).contains(&v), "ADX out of bounds: {v}");
        }
    }

    #[test]
    fn adx_first_value_within_lookback() {
        let adx = Adx::new(3);
        let result = adx.compute(&sample());
        assert!(result[..5].iter().all(|v| v.is_nan()));
        assert!(!result[adx.lookback()].is_nan());
    }

    #[test]
    fn steady_uptrend_has_strong_adx() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 2.0).collect();
        let v = Adx::new(14).latest(&make_bars(&closes)).value().unwrap();
        assert!(v > 25.0, "expected trending ADX, got {v}");
    }

    #[test]
    fn directional_movement_rules() {
        let bars = make_ohlc_bars(&[(10.0, 12.0, 8.0, 10.0), (10.0, 15.0, 7.0, 10.0)]);
        // up = 3, down = 1 → +DM = 3, -DM = 0
        assert_eq!(directional_movement(&bars[0], &bars[1]), (3.0, 0.0));
        let inside = make_ohlc_bars(&[(10.0, 12.0, 8.0, 10.0), (10.0, 11.0, 9.0, 10.0)]);
        assert_eq!(directional_movement(&inside[0], &inside[1]), (0.0, 0.0));
    }

    #[test]
    fn adx_lookback() {
        assert_eq!(Adx::new(14).lookback(), 28);
        assert_eq!(Adx::new(14).required_bars(), 29);
    }
}
