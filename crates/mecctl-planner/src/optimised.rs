//! LP-optimised planner (§4.5): maximises a precomputed delay/downtime objective
//! over a binary assignment relaxed to `[0,1]`, subject to per-user exactly-one,
//! per-server capacity, and per-BS population constraints.
//!
//! Candidate rows (including the "stay put" option with coefficient 0) are assembled
//! upstream from the cost/estimator modules; this module only builds and solves the
//! LP and turns the solution back into diffs.

use good_lp::solvers::microlp::microlp;
use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};

use crate::context::{BsObservation, PlannedMove, ServerCandidate};
use crate::nearest::NearestPlanner;
use crate::planner::Planner;

/// Per-BS population cap (§4.5).
pub const MAX_USERS_PER_BS: usize = 200;

/// One candidate `(user, server, bs)` assignment. `coefficient` is the already
/// computed `Δ_delay·n_req_est − downtime` term relative to the user's current
/// assignment (the bilinear `x_cur · x` product is constant-folded by only listing
/// candidates reachable from the current assignment).
#[derive(Debug, Clone)]
pub struct AssignmentCandidate {
    pub user: String,
    pub server: String,
    pub bs: String,
    pub is_current: bool,
    pub coefficient: f64,
    pub cpu_mhz: f64,
    pub mem_mb: f64,
    pub size_mb: f64,
}

#[derive(Debug, Clone)]
pub struct ServerCapacity {
    pub name: String,
    pub cpu_capacity_mhz: f64,
    pub ram_mb: f64,
    pub disk_mb: f64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SolveError {
    #[error("solver returned a non-optimal status: {0}")]
    NotOptimal(String),
}

pub struct OptimisedPlanner;

impl OptimisedPlanner {
    /// Initial placement reuses the `nearest` heuristic; the LP only governs
    /// reassignment of already-running services (§4.5 describes `compute_plan` for
    /// `optimised` but is silent on initial placement).
    pub fn place_service(servers: &[ServerCandidate], bs: Option<&BsObservation>) -> Option<String> {
        NearestPlanner.place_service(servers, bs)
    }

    /// Solves the assignment LP over `candidates` and returns diffs against the
    /// current assignment. Users with zero candidates must already be excluded by
    /// the caller (§4.5 "a user with no eligible neighbour is excluded"). On any
    /// non-Optimal status, returns `Ok(vec![])` (keep current assignment) per §4.5.
    pub fn solve(
        candidates: &[AssignmentCandidate],
        servers: &[ServerCapacity],
    ) -> Result<Vec<PlannedMove>, SolveError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut vars = ProblemVariables::new();
        let xs: Vec<Variable> = candidates.iter().map(|_| vars.add(variable().min(0.0).max(1.0))).collect();

        let objective: Expression =
            candidates.iter().zip(&xs).map(|(c, &x)| c.coefficient * x).sum();

        let mut model = vars.maximise(objective.clone()).using(microlp);

        // (i) exactly one (s,b) per user.
        let mut users: Vec<&str> = candidates.iter().map(|c| c.user.as_str()).collect();
        users.sort_unstable();
        users.dedup();
        for user in &users {
            let sum: Expression = candidates
                .iter()
                .zip(&xs)
                .filter(|(c, _)| c.user == *user)
                .map(|(_, &x)| x)
                .sum();
            model = model.with(constraint!(sum == 1.0));
        }

        // (ii) per-server CPU/memory/disk capacity.
        for server in servers {
            let cpu: Expression = candidates
                .iter()
                .zip(&xs)
                .filter(|(c, _)| c.server == server.name)
                .map(|(c, &x)| c.cpu_mhz * x)
                .sum();
            model = model.with(constraint!(cpu <= server.cpu_capacity_mhz));

            let mem: Expression = candidates
                .iter()
                .zip(&xs)
                .filter(|(c, _)| c.server == server.name)
                .map(|(c, &x)| c.mem_mb * x)
                .sum();
            model = model.with(constraint!(mem <= server.ram_mb));

            let disk: Expression = candidates
                .iter()
                .zip(&xs)
                .filter(|(c, _)| c.server == server.name)
                .map(|(c, &x)| c.size_mb * x)
                .sum();
            model = model.with(constraint!(disk <= server.disk_mb));
        }

        // (iv) per-BS population cap.
        let mut bss: Vec<&str> = candidates.iter().map(|c| c.bs.as_str()).collect();
        bss.sort_unstable();
        bss.dedup();
        for bs in &bss {
            let count: Expression = candidates
                .iter()
                .zip(&xs)
                .filter(|(c, _)| c.bs == *bs)
                .map(|(_, &x)| x)
                .sum();
            model = model.with(constraint!(count <= MAX_USERS_PER_BS as f64));
        }

        let solution = match model.solve() {
            Ok(solution) => solution,
            Err(e) => return Err(SolveError::NotOptimal(e.to_string())),
        };

        let mut moves = Vec::new();
        for user in &users {
            let best = candidates
                .iter()
                .zip(&xs)
                .filter(|(c, _)| c.user == *user)
                .max_by(|(_, &a), (_, &b)| {
                    solution.value(a).partial_cmp(&solution.value(b)).unwrap()
                });
            let Some((candidate, &x)) = best else { continue };
            if solution.value(x) > 0.5 && !candidate.is_current {
                moves.push(PlannedMove {
                    user: candidate.user.clone(),
                    next_bs: candidate.bs.clone(),
                    next_server: candidate.server.clone(),
                });
            }
        }
        Ok(moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_current_assignment_when_it_is_the_only_candidate() {
        let candidates = vec![AssignmentCandidate {
            user: "U1".into(),
            server: "edge01".into(),
            bs: "bs1".into(),
            is_current: true,
            coefficient: 0.0,
            cpu_mhz: 100.0,
            mem_mb: 256.0,
            size_mb: 500.0,
        }];
        let servers = vec![ServerCapacity {
            name: "edge01".into(),
            cpu_capacity_mhz: 1000.0,
            ram_mb: 1000.0,
            disk_mb: 1000.0,
        }];
        let moves = OptimisedPlanner::solve(&candidates, &servers).unwrap();
        assert!(moves.is_empty());
    }

    #[test]
    fn prefers_the_higher_coefficient_candidate() {
        let candidates = vec![
            AssignmentCandidate {
                user: "U1".into(),
                server: "edge01".into(),
                bs: "bs1".into(),
                is_current: true,
                coefficient: 0.0,
                cpu_mhz: 100.0,
                mem_mb: 256.0,
                size_mb: 500.0,
            },
            AssignmentCandidate {
                user: "U1".into(),
                server: "edge02".into(),
                bs: "bs2".into(),
                is_current: false,
                coefficient: 50.0,
                cpu_mhz: 100.0,
                mem_mb: 256.0,
                size_mb: 500.0,
            },
        ];
        let servers = vec![
            ServerCapacity { name: "edge01".into(), cpu_capacity_mhz: 1000.0, ram_mb: 1000.0, disk_mb: 1000.0 },
            ServerCapacity { name: "edge02".into(), cpu_capacity_mhz: 1000.0, ram_mb: 1000.0, disk_mb: 1000.0 },
        ];
        let moves = OptimisedPlanner::solve(&candidates, &servers).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].next_server, "edge02");
    }

    #[test]
    fn empty_candidates_is_a_noop() {
        let moves = OptimisedPlanner::solve(&[], &[]).unwrap();
        assert!(moves.is_empty());
    }
}
