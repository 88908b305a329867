//! Nearest planner: colocate the service with whatever server the strongest BS is
//! wired to (§4.5).

use crate::context::{
    random_eligible_server, strongest_bs, BsObservation, PlannedMove, ServerCandidate, UserPlanningState,
};
use crate::planner::Planner;

pub struct NearestPlanner;

fn colocated_server<'a>(
    bs: &BsObservation,
    servers: &'a [ServerCandidate],
) -> Option<&'a ServerCandidate> {
    let name = bs.server_name.as_ref()?;
    servers.iter().find(|s| &s.name == name && s.has_cpu())
}

impl Planner for NearestPlanner {
    fn place_service(&self, servers: &[ServerCandidate], bs: Option<&BsObservation>) -> Option<String> {
        if let Some(bs) = bs {
            if let Some(server) = colocated_server(bs, servers) {
                return Some(server.name.clone());
            }
        }
        random_eligible_server(servers)
    }

    fn compute_plan(
        &self,
        servers: &[ServerCandidate],
        users: &[UserPlanningState],
    ) -> Vec<PlannedMove> {
        users
            .iter()
            .filter_map(|user| {
                let strongest = strongest_bs(&user.observed_bs)?;
                if Some(strongest.name.as_str()) == user.current_bs.as_deref() {
                    return None;
                }
                let next_server = colocated_server(strongest, servers)
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| user.current_server.clone());
                Some(PlannedMove {
                    user: user.user.clone(),
                    next_bs: strongest.name.clone(),
                    next_server,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, cpu: f64) -> ServerCandidate {
        ServerCandidate {
            name: name.to_string(),
            is_cloud: false,
            cpu_max_mhz: cpu,
            core_count: 1,
            cpu_used_mhz: 0.0,
            ram_mb: 1000.0,
            ram_used_mb: 0.0,
            disk_mb: 1000.0,
            disk_used_mb: 0.0,
        }
    }

    #[test]
    fn place_service_picks_the_colocated_server() {
        let servers = vec![server("edge01", 1000.0)];
        let bs = BsObservation { name: "bs1".into(), server_name: Some("edge01".into()), rssi: -60.0 };
        let planner = NearestPlanner;
        assert_eq!(planner.place_service(&servers, Some(&bs)), Some("edge01".to_string()));
    }

    #[test]
    fn place_service_falls_back_when_bs_server_has_zero_cpu() {
        let servers = vec![server("cloud", 1000.0), server("edge01", 0.0)];
        let bs = BsObservation { name: "bs1".into(), server_name: Some("edge01".into()), rssi: -60.0 };
        let planner = NearestPlanner;
        assert_eq!(planner.place_service(&servers, Some(&bs)), Some("cloud".to_string()));
    }

    #[test]
    fn compute_plan_switches_to_the_strongest_bs() {
        let servers = vec![server("edge01", 1000.0), server("edge02", 1000.0)];
        let users = vec![UserPlanningState {
            user: "U1".into(),
            current_server: "edge01".into(),
            current_bs: Some("bs1".into()),
            current_rssi: -80.0,
            observed_bs: vec![
                BsObservation { name: "bs1".into(), server_name: Some("edge01".into()), rssi: -80.0 },
                BsObservation { name: "bs2".into(), server_name: Some("edge02".into()), rssi: -55.0 },
            ],
        }];
        let plan = NearestPlanner.compute_plan(&servers, &users);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].next_bs, "bs2");
        assert_eq!(plan[0].next_server, "edge02");
    }
}
