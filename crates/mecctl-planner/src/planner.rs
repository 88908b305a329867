use crate::context::{BsObservation, PlannedMove, ServerCandidate, UserPlanningState};

/// Common surface for every placement strategy (§4.5).
pub trait Planner: Send + Sync {
    /// Initial server choice for a freshly discovered service.
    fn place_service(&self, servers: &[ServerCandidate], bs: Option<&BsObservation>) -> Option<String>;

    /// Reassignment diffs against each user's current (bs, server).
    fn compute_plan(
        &self,
        servers: &[ServerCandidate],
        users: &[UserPlanningState],
    ) -> Vec<PlannedMove>;
}
