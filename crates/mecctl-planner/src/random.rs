//! Random planner: a deliberately naive baseline used for A/B comparison against
//! `nearest`/`optimised` (§4.5).

use crate::context::{
    random_eligible_server, strongest_bs, BsObservation, PlannedMove, RSSI_THRESHOLD, ServerCandidate,
    UserPlanningState,
};
use crate::planner::Planner;

pub struct RandomPlanner;

impl Planner for RandomPlanner {
    fn place_service(&self, servers: &[ServerCandidate], _bs: Option<&BsObservation>) -> Option<String> {
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
                if user.current_rssi >= RSSI_THRESHOLD {
                    return None;
                }
                let next_server = random_eligible_server(servers)?;
                let next_bs = strongest_bs(&user.observed_bs)
                    .map(|bs| bs.name.clone())
                    .unwrap_or_else(|| user.current_bs.clone().unwrap_or_default());
                Some(PlannedMove { user: user.user.clone(), next_bs, next_server })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str) -> ServerCandidate {
        ServerCandidate {
            name: name.to_string(),
            is_cloud: false,
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
    fn does_not_trigger_above_threshold() {
        let servers = vec![server("edge01")];
        let users = vec![UserPlanningState {
            user: "U1".into(),
            current_server: "edge01".into(),
            current_bs: Some("bs1".into()),
            current_rssi: -50.0,
            observed_bs: vec![],
        }];
        assert!(RandomPlanner.compute_plan(&servers, &users).is_empty());
    }

    #[test]
    fn triggers_below_threshold() {
        let servers = vec![server("edge01")];
        let users = vec![UserPlanningState {
            user: "U1".into(),
            current_server: "edge01".into(),
            current_bs: Some("bs1".into()),
            current_rssi: -80.0,
            observed_bs: vec![],
        }];
        let plan = RandomPlanner.compute_plan(&servers, &users);
        assert_eq!(plan.len(), 1);
    }
}
