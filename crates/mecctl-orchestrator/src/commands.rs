use tokio::sync::oneshot;

use mecctl_types::message::{
    MonitorContainerMsg, MonitorEdgeMsg, MonitorEuMsg, MonitorServerMsg, MonitorServiceMsg, RegisterMsg,
    ServiceDescriptor,
};

/// Commands accepted by the single dispatcher (§5 "single-writer over the Central
/// Store"). Every bus callback and timer fire is funnelled through this mailbox.
#[derive(Debug)]
pub enum Cmd {
    Register {
        msg: RegisterMsg,
        reply: oneshot::Sender<()>,
    },
    Discover {
        user: String,
        ssid: String,
        bssid: String,
        service: ServiceDescriptor,
        reply: oneshot::Sender<()>,
    },
    MonitorEu {
        user: String,
        msg: MonitorEuMsg,
        reply: oneshot::Sender<()>,
    },
    MonitorService {
        user: String,
        msg: MonitorServiceMsg,
        reply: oneshot::Sender<()>,
    },
    MonitorServer {
        server: String,
        msg: MonitorServerMsg,
        reply: oneshot::Sender<()>,
    },
    MonitorContainer {
        server: String,
        msg: MonitorContainerMsg,
        reply: oneshot::Sender<()>,
    },
    MonitorEdge {
        server: String,
        msg: MonitorEdgeMsg,
        reply: oneshot::Sender<()>,
    },
    Allocated {
        user: String,
        reply: oneshot::Sender<()>,
    },
    EuRssiUpdate {
        user: String,
        bs: String,
        rssi: f64,
        reply: oneshot::Sender<()>,
    },
    PreMigrated {
        user: String,
        reply: oneshot::Sender<()>,
    },
    Migrated {
        user: String,
        reply: oneshot::Sender<()>,
    },
    Handovered {
        user: String,
        ssid: String,
        bssid: String,
        reply: oneshot::Sender<()>,
    },
    MigrateReportSource {
        msg: mecctl_types::message::MigrateReportMsg,
        reply: oneshot::Sender<()>,
    },
    MigrateReportDest {
        msg: mecctl_types::message::MigrateReportMsg,
        reply: oneshot::Sender<()>,
    },
    LwtEu {
        user: String,
        reply: oneshot::Sender<()>,
    },
    LwtEdge {
        server: String,
        reply: oneshot::Sender<()>,
    },
    TriggerHandover {
        user: String,
        generation: u64,
    },
    TriggerMigration {
        user: String,
        generation: u64,
    },
}
