//! Per-user position fix by trilateration from the three strongest RSSI samples
//! (§4.2), and distance recovery from RSSI via the log-distance model (n=3, A=-30,
//! shared with `mecctl-estimator`).

pub const PATH_LOSS_EXPONENT: f64 = 3.0;
pub const REFERENCE_RSSI: f64 = -30.0;

/// `d = 10^((A - rssi) / (10*n))`.
pub fn rssi_to_distance(rssi: f64) -> f64 {
    10f64.powf((REFERENCE_RSSI - rssi) / (10.0 * PATH_LOSS_EXPONENT))
}

#[derive(Debug, Clone, Copy)]
pub struct BsObservation {
    pub x: f64,
    pub y: f64,
    pub rssi: f64,
}

/// Solves the 2x2 linear system from §4.2 for the three strongest observations.
/// Returns `None` when the three base stations are (near-)collinear and the system
/// is singular.
pub fn trilaterate(obs: [BsObservation; 3]) -> Option<(f64, f64)> {
    let d: Vec<f64> = obs.iter().map(|o| rssi_to_distance(o.rssi)).collect();
    let (x1, y1, r1) = (obs[0].x, obs[0].y, d[0]);
    let (x2, y2, r2) = (obs[1].x, obs[1].y, d[1]);
    let (x3, y3, r3) = (obs[2].x, obs[2].y, d[2]);

    let a11 = 2.0 * (x2 - x1);
    let a12 = 2.0 * (y2 - y1);
    let b1 = (x2 * x2 - x1 * x1) + (y2 * y2 - y1 * y1) - (r2 * r2 - r1 * r1);

    let a21 = 2.0 * (x3 - x1);
    let a22 = 2.0 * (y3 - y1);
    let b2 = (x3 * x3 - x1 * x1) + (y3 * y3 - y1 * y1) - (r3 * r3 - r1 * r1);

    let det = a11 * a22 - a12 * a21;
    if det.abs() < 1e-9 {
        return None;
    }
    let x = (b1 * a22 - a12 * b2) / det;
    let y = (a11 * b2 - b1 * a21) / det;
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn observe(bs: (f64, f64), user: (f64, f64)) -> BsObservation {
        let d = ((user.0 - bs.0).powi(2) + (user.1 - bs.1).powi(2)).sqrt().max(1e-6);
        let rssi = REFERENCE_RSSI - 10.0 * PATH_LOSS_EXPONENT * d.log10();
        BsObservation { x: bs.0, y: bs.1, rssi }
    }

    proptest! {
        #[test]
        fn round_trips_user_position(
            ux in -200.0f64..200.0, uy in -200.0f64..200.0,
        ) {
            // Fixed, non-collinear base-station layout (spec's property 5 is about the
            // inversion given *a* layout, not genericity over layouts).
            let bss = [(0.0, 0.0), (100.0, 0.0), (0.0, 100.0)];
            let obs = [
                observe(bss[0], (ux, uy)),
                observe(bss[1], (ux, uy)),
                observe(bss[2], (ux, uy)),
            ];
            let (rx, ry) = trilaterate(obs).expect("non-collinear layout must solve");
            prop_assert!((rx - ux).abs() < 1e-3, "x: {} vs {}", rx, ux);
            prop_assert!((ry - uy).abs() < 1e-3, "y: {} vs {}", ry, uy);
        }
    }

    #[test]
    fn collinear_base_stations_are_singular() {
        let obs = [
            BsObservation { x: 0.0, y: 0.0, rssi: -60.0 },
            BsObservation { x: 10.0, y: 0.0, rssi: -65.0 },
            BsObservation { x: 20.0, y: 0.0, rssi: -70.0 },
        ];
        assert!(trilaterate(obs).is_none());
    }
}
