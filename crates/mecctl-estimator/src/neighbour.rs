//! Neighbour-BS candidate enumeration for the optimised planner (§4.3).

use crate::log_distance::{PATH_LOSS_EXPONENT, REFERENCE_RSSI};

pub const RSSI_MINIMUM: f64 = -83.0;
pub const NEIGHBOUR_LOOKBACK_SECONDS: f64 = 300.0;

/// A base station observed within the lookback window, with its last measured RSSI
/// and coordinates.
#[derive(Debug, Clone, Copy)]
pub struct ObservedBs<'a> {
    pub name: &'a str,
    pub x: f64,
    pub y: f64,
    pub last_measured_rssi: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighbourCandidate {
    pub bs: String,
    pub predicted_rssi: f64,
}

/// For each observed BS, projects the user's position forward by `delta_t` using
/// `(x0, y0)` and `(vx, vy)`, derives a predicted RSSI from the projected distance,
/// and keeps the BS if `max(predicted, last_measured) > RSSI_MINIMUM`.
pub fn neighbour_candidates(
    observed: &[ObservedBs],
    x0: f64,
    y0: f64,
    vx: f64,
    vy: f64,
    delta_t: f64,
) -> Vec<NeighbourCandidate> {
    let (px, py) = (x0 + vx * delta_t, y0 + vy * delta_t);
    observed
        .iter()
        .filter_map(|bs| {
            let d = ((px - bs.x).powi(2) + (py - bs.y).powi(2)).sqrt().max(1e-6);
            let predicted = -10.0 * PATH_LOSS_EXPONENT * d.log10() + REFERENCE_RSSI;
            if predicted.max(bs.last_measured_rssi) > RSSI_MINIMUM {
                Some(NeighbourCandidate { bs: bs.name.to_string(), predicted_rssi: predicted })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_bs_survives_even_with_weak_prediction() {
        let observed = [ObservedBs { name: "bs1", x: 1000.0, y: 1000.0, last_measured_rssi: -50.0 }];
        let candidates = neighbour_candidates(&observed, 0.0, 0.0, 0.0, 0.0, 10.0);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn far_weak_bs_is_excluded() {
        let observed =
            [ObservedBs { name: "bs1", x: 100_000.0, y: 100_000.0, last_measured_rssi: -95.0 }];
        let candidates = neighbour_candidates(&observed, 0.0, 0.0, 0.0, 0.0, 10.0);
        assert!(candidates.is_empty());
    }
}
