pub mod cloud;
pub mod context;
pub mod nearest;
pub mod optimised;
pub mod planner;
pub mod random;

pub use cloud::CloudPlanner;
pub use context::{
    BsObservation, PlannedMove, ServerCandidate, UserPlanningState, RSSI_THRESHOLD,
};
pub use nearest::NearestPlanner;
pub use optimised::{AssignmentCandidate, OptimisedPlanner, ServerCapacity, SolveError, MAX_USERS_PER_BS};
pub use planner::Planner;
pub use random::RandomPlanner;
