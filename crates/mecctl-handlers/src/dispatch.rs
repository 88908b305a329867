//! One function per inbound topic class (§6): parse the payload, then hand off to
//! the orchestrator's single dispatcher, which is the sole owner of the store (§5
//! "accessed exclusively by the dispatcher").

use tracing::{error, warn};

use mecctl_bus::{longest_prefix_match, InboundMessage};
use mecctl_orchestrator::OrchestratorHandle;
use mecctl_types::message::{
    DiscoverMsg, HandoveredMsg, MigrateReportMsg, MonitorContainerMsg, MonitorEdgeMsg, MonitorEuMsg,
    MonitorServerMsg, MonitorServiceMsg, RegisterMsg, ServiceDescriptor,
};
use mecctl_types::model::MigrateMethod;

use crate::error::{HandlerError, Result};

fn parse<T: serde::de::DeserializeOwned>(topic: &str, payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .map_err(|source| HandlerError::MalformedPayload { topic: topic.to_string(), source })
}

/// Handler families, keyed by the registered pattern they're dispatched under (§4.1:
/// "dispatched to handlers by longest-prefix match against registered patterns").
enum Route {
    Register,
    Discover,
    Updated,
    Monitor,
    Allocated,
    PreMigrated,
    Migrated,
    Handovered,
    MigrateReport,
    LwtEu,
    LwtEdge,
    LwtCentre,
}

const ROUTES: &[(&str, Route)] = &[
    ("register", Route::Register),
    ("discover", Route::Discover),
    ("updated", Route::Updated),
    ("monitor/#", Route::Monitor),
    ("allocated/+", Route::Allocated),
    ("pre_migrated/+", Route::PreMigrated),
    ("migrated/+", Route::Migrated),
    ("handovered/+", Route::Handovered),
    ("migrate_report/#", Route::MigrateReport),
    ("LWT/eu/+", Route::LwtEu),
    ("LWT/edge/+", Route::LwtEdge),
    ("LWT/centre", Route::LwtCentre),
];

pub struct Handlers {
    pub orchestrator: OrchestratorHandle,
    /// `--migrate_method` (§6 CLI), applied to every service this dispatcher deploys.
    pub migrate_method: MigrateMethod,
}

impl Handlers {
    /// Longest-prefix dispatch entry point; logs and drops on any `HandlerError`.
    pub async fn dispatch(&self, msg: InboundMessage) {
        let result = self.dispatch_inner(&msg).await;
        if let Err(e) = result {
            error!(topic = %msg.topic, error = %e, "dropping message");
        }
    }

    async fn dispatch_inner(&self, msg: &InboundMessage) -> Result<()> {
        let topic = msg.topic.as_str();
        let route = longest_prefix_match(ROUTES.iter().map(|(pattern, route)| (*pattern, route)), topic);
        match route {
            Some(Route::Register) => {
                let parsed: RegisterMsg = parse(topic, &msg.payload)?;
                self.orchestrator.register(parsed).await?;
                Ok(())
            }
            Some(Route::Discover) => self.handle_discover(&msg.payload).await,
            Some(Route::Updated) => Ok(()),
            Some(Route::Monitor) => {
                let rest = topic.strip_prefix("monitor/").unwrap_or(topic);
                self.handle_monitor(rest, &msg.payload).await
            }
            Some(Route::Allocated) => {
                let user = topic.strip_prefix("allocated/").unwrap_or(topic);
                self.orchestrator.allocated(user.to_string()).await?;
                Ok(())
            }
            Some(Route::PreMigrated) => {
                let user = topic.strip_prefix("pre_migrated/").unwrap_or(topic);
                self.orchestrator.pre_migrated(user.to_string()).await?;
                Ok(())
            }
            Some(Route::Migrated) => {
                let user = topic.strip_prefix("migrated/").unwrap_or(topic);
                self.orchestrator.migrated(user.to_string()).await?;
                Ok(())
            }
            Some(Route::Handovered) => {
                let user = topic.strip_prefix("handovered/").unwrap_or(topic);
                let parsed: HandoveredMsg = parse(topic, &msg.payload)?;
                self.orchestrator.handovered(user.to_string(), parsed.ssid, parsed.bssid).await?;
                Ok(())
            }
            Some(Route::MigrateReport) => {
                let rest = topic.strip_prefix("migrate_report/").unwrap_or(topic);
                self.handle_migrate_report(rest, &msg.payload).await
            }
            Some(Route::LwtEu) => {
                let user = topic.strip_prefix("LWT/eu/").unwrap_or(topic);
                self.orchestrator.lwt_eu(user.to_string()).await?;
                Ok(())
            }
            Some(Route::LwtEdge) => {
                let server = topic.strip_prefix("LWT/edge/").unwrap_or(topic);
                self.orchestrator.lwt_edge(server.to_string()).await?;
                Ok(())
            }
            Some(Route::LwtCentre) => Ok(()),
            None => {
                warn!(%topic, "no handler registered for topic");
                Ok(())
            }
        }
    }

    async fn handle_discover(&self, payload: &[u8]) -> Result<()> {
        let msg: DiscoverMsg = parse("discover", payload)?;
        let descriptor = ServiceDescriptor {
            service_name: msg.service_name,
            end_user: msg.end_user.clone(),
            image: String::new(),
            server: String::new(),
            ip: String::new(),
            bs: Some(msg.ssid.clone()),
            host_port: 0,
            container_port: 0,
            checkpoint_dir: String::new(),
            method: self.migrate_method,
            state: mecctl_types::model::ServiceState::Init,
            next_server: None,
            next_ip: None,
            next_bs: None,
        };
        self.orchestrator.discover(msg.end_user, msg.ssid, msg.bssid, descriptor).await?;
        Ok(())
    }

    async fn handle_monitor(&self, rest: &str, payload: &[u8]) -> Result<()> {
        if let Some(user) = rest.strip_prefix("eu/") {
            let parsed: MonitorEuMsg = parse("monitor/eu", payload)?;
            self.orchestrator.monitor_eu(user.to_string(), parsed).await?;
            return Ok(());
        }
        if let Some(user) = rest.strip_prefix("service/") {
            let parsed: MonitorServiceMsg = parse("monitor/service", payload)?;
            self.orchestrator.monitor_service(user.to_string(), parsed).await?;
            return Ok(());
        }
        if let Some(server) = rest.strip_prefix("server/") {
            let parsed: MonitorServerMsg = parse("monitor/server", payload)?;
            self.orchestrator.monitor_server(server.to_string(), parsed).await?;
            return Ok(());
        }
        if let Some(server) = rest.strip_prefix("container/") {
            let parsed: MonitorContainerMsg = parse("monitor/container", payload)?;
            self.orchestrator.monitor_container(server.to_string(), parsed).await?;
            return Ok(());
        }
        if let Some(server) = rest.strip_prefix("edge/") {
            let parsed: MonitorEdgeMsg = parse("monitor/edge", payload)?;
            self.orchestrator.monitor_edge(server.to_string(), parsed).await?;
            return Ok(());
        }
        warn!(topic = %format!("monitor/{rest}"), "unrecognised monitor sub-topic");
        Ok(())
    }

    async fn handle_migrate_report(&self, rest: &str, payload: &[u8]) -> Result<()> {
        let msg: MigrateReportMsg = parse("migrate_report", payload)?;
        if rest.starts_with("source/") {
            self.orchestrator.migrate_report_source(msg).await?;
        } else if rest.starts_with("dest/") {
            self.orchestrator.migrate_report_dest(msg).await?;
        } else {
            warn!(%rest, "migrate_report topic missing source/dest segment");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use mecctl_bus::LocalBus;
    use mecctl_orchestrator::{OrchestratorService, PlannerKind};
    use mecctl_planner::NearestPlanner;
    use mecctl_store::Store;

    fn handlers() -> (Handlers, Arc<LocalBus>) {
        let store = Store::open_in_memory().unwrap();
        let bus = Arc::new(LocalBus::new());
        let orchestrator =
            OrchestratorService::start(store, bus.clone(), PlannerKind::Simple(Box::new(NearestPlanner)));
        (Handlers { orchestrator, migrate_method: mecctl_types::model::MigrateMethod::PreCopy }, bus)
    }

    #[tokio::test]
    async fn register_publishes_updated() {
        let (handlers, bus) = handlers();
        let payload = serde_json::json!({
            "server_name": "edge01",
            "ip": "10.0.99.10",
            "distance": 1,
            "port": 9999,
            "bs": "edge01-bs",
        });
        handlers
            .dispatch(InboundMessage { topic: "register".into(), payload: serde_json::to_vec(&payload).unwrap() })
            .await;
        let topics = bus.published_topics().await;
        assert_eq!(topics, vec!["updated"]);
    }

    #[tokio::test]
    async fn discover_with_no_known_bs_is_dropped() {
        let (handlers, bus) = handlers();
        let payload = serde_json::json!({
            "service_name": "openface",
            "end_user": "U1",
            "ssid": "unknown-bs",
            "bssid": "aa:bb:cc",
        });
        handlers
            .dispatch(InboundMessage { topic: "discover".into(), payload: serde_json::to_vec(&payload).unwrap() })
            .await;
        assert!(bus.published_topics().await.is_empty());
    }

    #[tokio::test]
    async fn discover_deploys_to_the_colocated_server() {
        let (handlers, bus) = handlers();
        let register = serde_json::json!({
            "server_name": "edge01", "ip": "10.0.99.10", "distance": 1, "port": 9999,
            "bs": "edge01-bs",
        });
        handlers
            .dispatch(InboundMessage { topic: "register".into(), payload: serde_json::to_vec(&register).unwrap() })
            .await;
        bus.take_published().await;

        let discover = serde_json::json!({
            "service_name": "openface", "end_user": "U1", "ssid": "edge01-bs", "bssid": "51:3e:aa",
        });
        handlers
            .dispatch(InboundMessage { topic: "discover".into(), payload: serde_json::to_vec(&discover).unwrap() })
            .await;
        let published = bus.take_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "deploy/edge01");
    }
}
