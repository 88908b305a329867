//! Plain input/output types shared by every planner variant. Callers (the
//! orchestrator) assemble these from the store, the estimators, and the cost model;
//! planners themselves stay pure functions of this data.

/// Access-tier RSSI threshold used by cloud/random/nearest reassignment triggers and
/// by the cloud planner's BS-switch gate (§4.5, §8 S1/S2).
pub const RSSI_THRESHOLD: f64 = -76.0;

#[derive(Debug, Clone)]
pub struct ServerCandidate {
    pub name: String,
    pub is_cloud: bool,
    pub cpu_max_mhz: f64,
    pub core_count: u32,
    pub cpu_used_mhz: f64,
    pub ram_mb: f64,
    pub ram_used_mb: f64,
    pub disk_mb: f64,
    pub disk_used_mb: f64,
}

impl ServerCandidate {
    pub fn cpu_capacity_mhz(&self) -> f64 {
        self.cpu_max_mhz * self.core_count as f64
    }

    pub fn cpu_free_mhz(&self) -> f64 {
        self.cpu_capacity_mhz() - self.cpu_used_mhz
    }

    /// A server with no CPU capacity at all cannot host anything (used by `nearest`'s
    /// co-located-server check, §4.5).
    pub fn has_cpu(&self) -> bool {
        self.cpu_capacity_mhz() > 0.0
    }

    pub fn has_capacity_for(&self, cpu_mhz: f64, mem_mb: f64, size_mb: f64) -> bool {
        self.has_cpu()
            && self.cpu_free_mhz() >= cpu_mhz
            && (self.ram_mb - self.ram_used_mb) >= mem_mb
            && (self.disk_mb - self.disk_used_mb) >= size_mb
    }
}

/// One base station observed for a user, with the server it is wired to (if any).
#[derive(Debug, Clone)]
pub struct BsObservation {
    pub name: String,
    pub server_name: Option<String>,
    pub rssi: f64,
}

#[derive(Debug, Clone)]
pub struct UserPlanningState {
    pub user: String,
    pub current_server: String,
    pub current_bs: Option<String>,
    pub current_rssi: f64,
    /// All BSes currently observed for this user, strongest-first order not required.
    pub observed_bs: Vec<BsObservation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMove {
    pub user: String,
    pub next_bs: String,
    pub next_server: String,
}

pub(crate) fn strongest_bs(observed: &[BsObservation]) -> Option<&BsObservation> {
    observed.iter().max_by(|a, b| a.rssi.partial_cmp(&b.rssi).unwrap())
}

/// Picks uniformly at random among the servers with nonzero CPU capacity. Shared by
/// `random`'s primary path and `nearest`'s no-co-located-server fallback (§4.5: "the
/// nearest planner falls back to random when no co-located BS server is eligible").
pub(crate) fn random_eligible_server(servers: &[ServerCandidate]) -> Option<String> {
    use rand::seq::SliceRandom;
    let eligible: Vec<&ServerCandidate> = servers.iter().filter(|s| s.has_cpu()).collect();
    eligible.choose(&mut rand::thread_rng()).map(|s| s.name.clone())
}
