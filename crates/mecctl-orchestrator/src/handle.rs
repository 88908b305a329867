use tokio::sync::{mpsc, oneshot};

use mecctl_types::message::{
    MigrateReportMsg, MonitorContainerMsg, MonitorEdgeMsg, MonitorEuMsg, MonitorServerMsg, MonitorServiceMsg,
    RegisterMsg, ServiceDescriptor,
};

use crate::commands::Cmd;
use crate::error::{OrchestratorError, Result};

/// Cloneable handle to the dispatcher (§4.6/§5).
#[derive(Clone, Debug)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Cmd>,
}

impl OrchestratorHandle {
    pub(crate) fn new(tx: mpsc::Sender<Cmd>) -> Self {
        Self { tx }
    }

    async fn call(&self, build: impl FnOnce(oneshot::Sender<()>) -> Cmd) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| OrchestratorError::ShutDown)?;
        rx.await.map_err(|_| OrchestratorError::ShutDown)
    }

    pub async fn register(&self, msg: RegisterMsg) -> Result<()> {
        self.call(|reply| Cmd::Register { msg, reply }).await
    }

    pub async fn discover(&self, user: String, ssid: String, bssid: String, service: ServiceDescriptor) -> Result<()> {
        self.call(|reply| Cmd::Discover { user, ssid, bssid, service, reply }).await
    }

    pub async fn monitor_eu(&self, user: String, msg: MonitorEuMsg) -> Result<()> {
        self.call(|reply| Cmd::MonitorEu { user, msg, reply }).await
    }

    pub async fn monitor_service(&self, user: String, msg: MonitorServiceMsg) -> Result<()> {
        self.call(|reply| Cmd::MonitorService { user, msg, reply }).await
    }

    pub async fn monitor_server(&self, server: String, msg: MonitorServerMsg) -> Result<()> {
        self.call(|reply| Cmd::MonitorServer { server, msg, reply }).await
    }

    pub async fn monitor_container(&self, server: String, msg: MonitorContainerMsg) -> Result<()> {
        self.call(|reply| Cmd::MonitorContainer { server, msg, reply }).await
    }

    pub async fn monitor_edge(&self, server: String, msg: MonitorEdgeMsg) -> Result<()> {
        self.call(|reply| Cmd::MonitorEdge { server, msg, reply }).await
    }

    pub async fn allocated(&self, user: String) -> Result<()> {
        self.call(|reply| Cmd::Allocated { user, reply }).await
    }

    pub async fn eu_rssi_update(&self, user: String, bs: String, rssi: f64) -> Result<()> {
        self.call(|reply| Cmd::EuRssiUpdate { user, bs, rssi, reply }).await
    }

    pub async fn pre_migrated(&self, user: String) -> Result<()> {
        self.call(|reply| Cmd::PreMigrated { user, reply }).await
    }

    pub async fn migrated(&self, user: String) -> Result<()> {
        self.call(|reply| Cmd::Migrated { user, reply }).await
    }

    pub async fn handovered(&self, user: String, ssid: String, bssid: String) -> Result<()> {
        self.call(|reply| Cmd::Handovered { user, ssid, bssid, reply }).await
    }

    pub async fn migrate_report_source(&self, msg: MigrateReportMsg) -> Result<()> {
        self.call(|reply| Cmd::MigrateReportSource { msg, reply }).await
    }

    pub async fn migrate_report_dest(&self, msg: MigrateReportMsg) -> Result<()> {
        self.call(|reply| Cmd::MigrateReportDest { msg, reply }).await
    }

    pub async fn lwt_eu(&self, user: String) -> Result<()> {
        self.call(|reply| Cmd::LwtEu { user, reply }).await
    }

    pub async fn lwt_edge(&self, server: String) -> Result<()> {
        self.call(|reply| Cmd::LwtEdge { server, reply }).await
    }

    /// Fire-and-forget: timer callbacks have no caller waiting on a reply.
    pub fn trigger_handover(&self, user: String, generation: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Cmd::TriggerHandover { user, generation }).await;
        });
    }

    pub fn trigger_migration(&self, user: String, generation: u64) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Cmd::TriggerMigration { user, generation }).await;
        });
    }
}
