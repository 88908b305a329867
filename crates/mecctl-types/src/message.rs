//! Inbound/outbound message-bus payloads (spec §6). Every inbound type is a narrow
//! record with explicit optional fields, per DESIGN.md "dynamic kwargs payloads":
//! unknown JSON fields are ignored (`serde`'s default), missing required fields fail
//! to deserialize and the caller maps that into `MecError::MalformedPayload`.

use serde::{Deserialize, Serialize};

use crate::model::{MigrateMethod, ServiceState};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterMsg {
    pub server_name: String,
    pub ip: String,
    pub distance: u32,
    pub port: u16,
    #[serde(default)]
    pub bs: Option<String>,
    #[serde(default)]
    pub bs_x: Option<f64>,
    #[serde(default)]
    pub bs_y: Option<f64>,
    #[serde(default)]
    pub rho: Option<f64>,
    #[serde(default)]
    pub phi: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverMsg {
    pub service_name: String,
    pub end_user: String,
    pub ssid: String,
    pub bssid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NearbyAp {
    #[serde(rename = "SSID")]
    pub ssid: String,
    #[serde(rename = "BSSID")]
    pub bssid: String,
    pub level: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorEuMsg {
    pub end_user: String,
    #[serde(rename = "nearbyAP")]
    pub nearby_ap: Vec<NearbyAp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorServiceMsg {
    pub end_user: String,
    pub service_name: String,
    pub ssid: String,
    pub bssid: String,
    #[serde(rename = "startTime")]
    pub start_time_ns: i64,
    #[serde(rename = "endTime")]
    pub end_time_ns: i64,
    #[serde(rename = "processTime")]
    pub process_time_ms: f64,
    #[serde(rename = "sentSize")]
    pub sent_size_bytes: u64,
}

impl MonitorServiceMsg {
    /// Transmission delay component of e2e latency: `e2e - processing`, in ms.
    pub fn transfer_delay_ms(&self) -> f64 {
        let e2e_ms = (self.end_time_ns - self.start_time_ns) as f64 / 1_000_000.0;
        e2e_ms - self.process_time_ms
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorServerMsg {
    pub cpu_max: f64,
    pub cpu_cores: u32,
    pub mem_total: f64,
    pub mem_free: f64,
    pub disk_total: f64,
    pub disk_free: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorContainerMsg {
    pub container: String,
    pub status: String,
    pub cpu: f64,
    pub mem: f64,
    pub size: f64,
    pub delta_memory: f64,
    pub pre_checkpoint: f64,
    pub time_xdelta: f64,
    pub time_checkpoint: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorEdgeMsg {
    pub src_node: String,
    pub dest_node: String,
    pub latency: f64,
    pub bw: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrateReportMsg {
    pub source: String,
    pub dest: String,
    pub service: String,
    #[serde(default)]
    pub pre_checkpoint: Option<f64>,
    #[serde(default)]
    pub pre_rsync: Option<f64>,
    #[serde(default)]
    pub prepare: Option<f64>,
    #[serde(default)]
    pub checkpoint: Option<f64>,
    #[serde(default)]
    pub rsync: Option<f64>,
    #[serde(default)]
    pub xdelta_source: Option<f64>,
    #[serde(default)]
    pub final_rsync: Option<f64>,
    #[serde(default)]
    pub migrate: Option<f64>,
    #[serde(default)]
    pub premigration: Option<f64>,
    #[serde(default)]
    pub xdelta_dest: Option<f64>,
    #[serde(default)]
    pub restore: Option<f64>,
}

/// Used for `allocated/<user>`, `pre_migrated/<user>`, `migrated/<user>` inbound
/// payloads and `deploy/<server>`, `pre_migrate/<server>`, `migrate/<server>`,
/// `destroy/<server>` outbound payloads (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service_name: String,
    pub end_user: String,
    pub image: String,
    pub server: String,
    pub ip: String,
    pub bs: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
    pub checkpoint_dir: String,
    pub method: MigrateMethod,
    pub state: ServiceState,
    /// Set only on `pre_migrate`/`migrate` outbound payloads: the destination server.
    #[serde(default)]
    pub next_server: Option<String>,
    #[serde(default)]
    pub next_ip: Option<String>,
    #[serde(default)]
    pub next_bs: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandoveredMsg {
    pub ssid: String,
    pub bssid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoverCmdMsg {
    #[serde(rename = "nextSSID")]
    pub next_ssid: String,
    #[serde(rename = "nextBSSID")]
    pub next_bssid: String,
    #[serde(rename = "nextPassword")]
    pub next_password: String,
    /// Milliseconds until the predicted handover deadline.
    pub elapsed_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatedEntry {
    pub server_name: String,
    pub ip: String,
    pub distance: u32,
    pub bs: Option<String>,
}
