//! Cloud planner: everything runs on the distance-0 server; only the radio
//! association is ever reassigned (§4.5).

use crate::context::{strongest_bs, BsObservation, PlannedMove, RSSI_THRESHOLD, ServerCandidate, UserPlanningState};
use crate::planner::Planner;

pub struct CloudPlanner;

fn cloud_server(servers: &[ServerCandidate]) -> Option<&ServerCandidate> {
    servers.iter().find(|s| s.is_cloud)
}

impl Planner for CloudPlanner {
    fn place_service(&self, servers: &[ServerCandidate], _bs: Option<&BsObservation>) -> Option<String> {
        cloud_server(servers).map(|s| s.name.clone())
    }

    fn compute_plan(
        &self,
        servers: &[ServerCandidate],
        users: &[UserPlanningState],
    ) -> Vec<PlannedMove> {
        let Some(cloud) = cloud_server(servers) else { return Vec::new() };
        users
            .iter()
            .filter_map(|user| {
                let strongest = strongest_bs(&user.observed_bs)?;
                if strongest.rssi <= RSSI_THRESHOLD {
                    return None;
                }
                if Some(strongest.name.as_str()) == user.current_bs.as_deref() {
                    return None;
                }
                Some(PlannedMove {
                    user: user.user.clone(),
                    next_bs: strongest.name.clone(),
                    next_server: cloud.name.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, is_cloud: bool) -> ServerCandidate {
        ServerCandidate {
            name: name.to_string(),
            is_cloud,
            cpu_max_mhz: 1000.0,
            core_count: 1,
            cpu_used_mhz: 0.0,
            ram_mb: 1000.0,
            ram_used_mb: 0.0,
            disk_mb: 1000.0,
            disk_used_mb: 0.0,
        }
    }

    #[test]
    fn place_service_is_always_the_cloud() {
        let servers = vec![server("edge01", false), server("cloud", true)];
        assert_eq!(CloudPlanner.place_service(&servers, None), Some("cloud".to_string()));
    }

    #[test]
    fn switches_bs_only_above_threshold() {
        let servers = vec![server("cloud", true)];
        let users = vec![UserPlanningState {
            user: "U1".into(),
            current_server: "cloud".into(),
            current_bs: Some("bs1".into()),
            current_rssi: -80.0,
            observed_bs: vec![
                BsObservation { name: "bs1".into(), server_name: None, rssi: -80.0 },
                BsObservation { name: "bs2".into(), server_name: None, rssi: -60.0 },
            ],
        }];
        let plan = CloudPlanner.compute_plan(&servers, &users);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].next_bs, "bs2");
        assert_eq!(plan[0].next_server, "cloud");
    }
}
