//! Entities of spec §3. Access is always by lookup against `mecctl-store`, never by
//! holding a graph pointer between entities (see DESIGN.md "cyclic entity references").

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// An edge server, distance tier 0 reserved for the cloud server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub name: String,
    pub ip: String,
    pub distance_tier: u32,
    pub core_count: u32,
    pub cpu_max_mhz: f64,
    pub ram_mb: f64,
    pub ram_free_mb: f64,
    pub disk_mb: f64,
    pub disk_free_mb: f64,
    /// Checkpoint coefficient, learned from `MigrateRecord` history (§4.2).
    pub phi: f64,
    /// Restore coefficient, learned from `MigrateRecord` history (§4.2).
    pub rho: f64,
}

impl Server {
    pub fn is_cloud(&self) -> bool {
        self.distance_tier == 0
    }
}

/// A radio base station, co-located with at most one `Server` (invariant 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseStation {
    pub name: String,
    pub bssid: String,
    pub password: String,
    pub x: f64,
    pub y: f64,
    pub server_name: Option<String>,
}

/// A position ring entry used to refit the user's linear trajectory (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub t: f64,
    pub x: f64,
    pub y: f64,
}

/// A mobile end-user. Owns at most one live `Service` (invariant 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndUser {
    pub name: String,
    pub current_bs: Option<String>,
    pub current_service_id: Option<String>,
    pub online: bool,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Trajectory `y = a*x + b`, refit by linear regression over the last 5 fixes.
    pub trajectory_a: f64,
    pub trajectory_b: f64,
    #[serde(default)]
    pub recent_positions: Vec<PositionFix>,
}

impl EndUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current_bs: None,
            current_service_id: None,
            online: true,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            trajectory_a: 0.0,
            trajectory_b: 0.0,
            recent_positions: Vec::new(),
        }
    }
}

/// Container migration technique (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrateMethod {
    PreCopy,
    NonLive,
}

/// Service lifecycle state (§3), distinct from the per-user migration bitmask (§4.6):
/// this is persisted per-service, the bitmask is in-memory per-user orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Init,
    Running,
    PreMigrate,
    PreMigrated,
    Migrate,
}

/// A deployed container, exclusively bound to one `EndUser` (1:1, invariant 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// `service_name ∥ user`, unique.
    pub id: String,
    pub service_name: String,
    pub user: String,
    pub image: String,
    pub server: String,
    pub host_port: u16,
    pub container_port: u16,
    pub checkpoint_dir: String,
    pub method: MigrateMethod,
    pub status: String,
    pub state: ServiceState,
    pub cpu_mhz: f64,
    pub mem_mb: f64,
    pub size_mb: f64,
    pub delta_memory_bytes: f64,
    pub pre_checkpoint_bytes: f64,
    pub time_xdelta_s: f64,
    pub time_checkpoint_s: f64,
    pub request_count: u64,
}

impl Service {
    pub fn make_id(service_name: &str, user: &str) -> String {
        format!("{service_name}\u{2225}{user}")
    }

    pub fn is_mid_migration(&self) -> bool {
        matches!(
            self.state,
            ServiceState::PreMigrate | ServiceState::PreMigrated | ServiceState::Migrate
        )
    }
}

/// One filtered RSSI observation for a (user, BS) pair (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RssiSample {
    /// Seconds since controller start (`t0`).
    pub t: f64,
    pub raw_rssi: f64,
    pub filtered_rssi: f64,
}

/// A network measurement between an ordered pair of servers (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkSample {
    pub t: f64,
    pub latency_us: f64,
    pub bw_mbps: f64,
}

/// A request-latency measurement for a user's service (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestSample {
    pub t: f64,
    pub proc_delay_ms: f64,
    pub e2e_delay_ms: f64,
    pub request_size_bytes: f64,
}

/// A migration-history row (§3). `restore` (and the dest-only fields) stay `None`
/// until a matching dest-side report arrives within the 60 s correlation window
/// (invariant 4).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrateRecord {
    pub t: f64,
    pub src: String,
    pub dst: String,
    pub service: String,
    pub method: Option<MigrateMethod>,
    pub pre_checkpoint: Option<f64>,
    pub pre_rsync: Option<f64>,
    pub prepare: Option<f64>,
    pub checkpoint: Option<f64>,
    pub rsync: Option<f64>,
    pub xdelta_source: Option<f64>,
    pub final_rsync: Option<f64>,
    pub migrate: Option<f64>,
    pub premigration: Option<f64>,
    pub xdelta_dest: Option<f64>,
    pub restore: Option<f64>,
    pub size_pre_rsync: Option<f64>,
    pub size_rsync: Option<f64>,
    pub size_final_rsync: Option<f64>,
}

impl MigrateRecord {
    pub fn is_completed(&self) -> bool {
        self.restore.is_some()
    }
}

bitflags! {
    /// Per-user migration state (§3 invariant 5, §4.6). `INIT` is the all-zero value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MigrationState: u8 {
        const INIT          = 0;
        const RUNNING       = 1 << 0;
        const PRE_MIGRATE   = 1 << 1;
        const PRE_MIGRATED  = 1 << 2;
        const MIGRATE       = 1 << 3;
        const HANDOVER      = 1 << 4;
        const HANDOVERED    = 1 << 5;
    }
}

impl MigrationState {
    /// Invariant 5: a new pre-migration may only start if none of these bits are set.
    pub const MID_MIGRATION: MigrationState = MigrationState::PRE_MIGRATE
        .union(MigrationState::PRE_MIGRATED)
        .union(MigrationState::MIGRATE);

    pub fn is_mid_migration(self) -> bool {
        self.intersects(Self::MID_MIGRATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_user_is_not_mid_migration() {
        assert!(!MigrationState::INIT.is_mid_migration());
        assert!(!MigrationState::RUNNING.is_mid_migration());
    }

    #[test]
    fn each_mid_migration_bit_is_detected() {
        assert!(MigrationState::PRE_MIGRATE.is_mid_migration());
        assert!(MigrationState::PRE_MIGRATED.is_mid_migration());
        assert!(MigrationState::MIGRATE.is_mid_migration());
        assert!((MigrationState::RUNNING | MigrationState::HANDOVER).is_mid_migration() == false);
    }

    #[test]
    fn service_id_is_stable_and_distinguishes_users() {
        let a = Service::make_id("openface", "U1");
        let b = Service::make_id("openface", "U2");
        assert_ne!(a, b);
        assert_eq!(a, Service::make_id("openface", "U1"));
    }
}
