//! Exponential moving average for filtered RSSI (§4.2).

pub const ALPHA: f64 = 0.5;

/// `erssi <- alpha*rssi + (1-alpha)*erssi_prev`; with no prior sample, `erssi = rssi`.
pub fn ema(raw_rssi: f64, previous_filtered: Option<f64>) -> f64 {
    match previous_filtered {
        Some(prev) => ALPHA * raw_rssi + (1.0 - ALPHA) * prev,
        None => raw_rssi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_sample_passes_through() {
        assert_eq!(ema(-65.0, None), -65.0);
    }

    proptest! {
        #[test]
        fn idempotent_on_repeated_value(x in -100.0f64..0.0) {
            let mut filtered = ema(x, None);
            for _ in 0..50 {
                filtered = ema(x, Some(filtered));
            }
            prop_assert!((filtered - x).abs() < 1e-9);
        }

        #[test]
        fn always_between_previous_and_raw(raw in -100.0f64..0.0, prev in -100.0f64..0.0) {
            let next = ema(raw, Some(prev));
            let (lo, hi) = if raw < prev { (raw, prev) } else { (prev, raw) };
            prop_assert!(next >= lo - 1e-9 && next <= hi + 1e-9);
        }
    }
}
