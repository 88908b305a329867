//! Per-(user, BS) ring of the last up-to-10 filtered RSSIs with timestamps (§4.3).

use rustc_hash::FxHashMap;

use crate::log_distance::{self, LogDistanceFit, Observation};
use crate::Result;

pub const RING_CAP: usize = 10;

#[derive(Debug, Default)]
pub struct RssiRings {
    rings: FxHashMap<(String, String), Vec<Observation>>,
}

impl RssiRings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, user: &str, bs: &str, tau: f64, filtered_rssi: f64) {
        let ring = self.rings.entry((user.to_string(), bs.to_string())).or_default();
        ring.push(Observation { tau, rssi: filtered_rssi });
        if ring.len() > RING_CAP {
            ring.remove(0);
        }
    }

    pub fn fit(&self, user: &str, bs: &str) -> Result<LogDistanceFit> {
        let key = (user.to_string(), bs.to_string());
        let samples = self.rings.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        log_distance::fit(samples).map_err(|_| crate::error::EstimatorError::InsufficientSamples {
            user: user.to_string(),
            bs: bs.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_caps_at_ten() {
        let mut rings = RssiRings::new();
        for i in 0..15 {
            rings.push("U1", "bs1", i as f64, -60.0);
        }
        assert_eq!(rings.rings.get(&("U1".to_string(), "bs1".to_string())).unwrap().len(), RING_CAP);
    }

    #[test]
    fn fit_errors_before_two_samples() {
        let mut rings = RssiRings::new();
        rings.push("U1", "bs1", 0.0, -60.0);
        assert!(rings.fit("U1", "bs1").is_err());
        rings.push("U1", "bs1", 1.0, -61.0);
        assert!(rings.fit("U1", "bs1").is_ok());
    }
}
