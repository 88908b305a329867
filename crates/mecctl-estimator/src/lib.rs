pub mod error;
pub mod handover;
pub mod log_distance;
pub mod neighbour;
pub mod ring;

pub use error::{EstimatorError, Result};
pub use handover::{handover_time, Trajectory, DEFAULT_HYSTERESIS_DB};
pub use log_distance::{LogDistanceFit, Observation};
pub use neighbour::{neighbour_candidates, NeighbourCandidate, ObservedBs, RSSI_MINIMUM};
pub use ring::RssiRings;
