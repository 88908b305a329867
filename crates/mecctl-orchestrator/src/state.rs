//! Pure per-user migration-bitmask state machine (§4.6). Kept free of bus/store/timer
//! IO so the transition table can be exercised without a live dispatcher; the
//! `service.rs` shell turns the `Action`s this emits into real side effects.

use rustc_hash::FxHashMap;

use mecctl_types::model::MigrationState;

use crate::action::{Action, TimerKind};

/// 200 s threshold on the lifetime-to-migration used by the `optimised` planner's
/// `pre_migrated` handling (§4.6).
pub const OPTIMISED_CANCEL_THRESHOLD_S: f64 = 200.0;

#[derive(Debug, Clone)]
pub struct MigratePlan {
    pub src: String,
    pub dst: String,
    /// The BS to hand the user over to once migration completes (§8 S2: for
    /// nearest/random, migrate and handover are issued back to back).
    pub next_bs: String,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct HandoverPlan {
    pub next_ssid: String,
    pub next_bssid: String,
    pub next_password: String,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct OrchestratorState {
    bitmask: FxHashMap<String, MigrationState>,
    migrate_plan: FxHashMap<String, MigratePlan>,
    handover_plan: FxHashMap<String, HandoverPlan>,
    generation: FxHashMap<(String, TimerKind), u64>,
}

impl OrchestratorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bitmask(&self, user: &str) -> MigrationState {
        self.bitmask.get(user).copied().unwrap_or(MigrationState::INIT)
    }

    fn set_bitmask(&mut self, user: &str, value: MigrationState) {
        self.bitmask.insert(user.to_string(), value);
    }

    fn bump_generation(&mut self, user: &str, kind: TimerKind) -> u64 {
        let entry = self.generation.entry((user.to_string(), kind)).or_insert(0);
        *entry += 1;
        *entry
    }

    /// `allocated/<user>`: create/update Service in `running`; M<-RUNNING.
    pub fn mark_running(&mut self, user: &str) {
        self.set_bitmask(user, MigrationState::RUNNING);
    }

    /// Row: planner decides next-server != current. Returns `false` (no transition)
    /// if the guard `M ∩ {PRE_MIGRATE,PRE_MIGRATED,MIGRATE} = ∅` fails; on success
    /// sets `PRE_MIGRATE` and stores the migrate plan.
    pub fn try_begin_pre_migrate(&mut self, user: &str, src: &str, dst: &str, next_bs: &str) -> bool {
        let m = self.bitmask(user);
        if m.is_mid_migration() {
            return false;
        }
        self.set_bitmask(user, m | MigrationState::PRE_MIGRATE);
        let generation = self.bump_generation(user, TimerKind::Migrate);
        self.migrate_plan.insert(
            user.to_string(),
            MigratePlan { src: src.to_string(), dst: dst.to_string(), next_bs: next_bs.to_string(), generation },
        );
        true
    }

    /// Row: planner decides next-BS != current and user not mid-migration.
    pub fn try_begin_handover(
        &mut self,
        user: &str,
        next_ssid: &str,
        next_bssid: &str,
        next_password: &str,
    ) -> Option<u64> {
        let m = self.bitmask(user);
        if m.is_mid_migration() {
            return None;
        }
        self.set_bitmask(user, m | MigrationState::HANDOVER);
        let generation = self.bump_generation(user, TimerKind::Handover);
        self.handover_plan.insert(
            user.to_string(),
            HandoverPlan {
                next_ssid: next_ssid.to_string(),
                next_bssid: next_bssid.to_string(),
                next_password: next_password.to_string(),
                generation,
            },
        );
        Some(generation)
    }

    /// `pre_migrated/<user>` under a non-optimised planner: emits `migrate/<src>` if
    /// a stored plan still matches.
    pub fn pre_migrated_non_optimised(&mut self, user: &str) -> Option<MigratePlan> {
        let plan = self.migrate_plan.get(user).cloned()?;
        let m = self.bitmask(user);
        self.set_bitmask(user, m | MigrationState::MIGRATE);
        Some(plan)
    }

    /// Companion handover to a just-emitted `migrate/<src>` (§8 S2: nearest/random
    /// issue migrate and handover back to back). Unlike `try_begin_handover`, this is
    /// exempt from the mid-migration guard since it is *part of* the active migration,
    /// not a competing transition.
    pub fn begin_handover_for_migration(
        &mut self,
        user: &str,
        next_ssid: &str,
        next_bssid: &str,
        next_password: &str,
    ) -> Option<u64> {
        let m = self.bitmask(user);
        if m.contains(MigrationState::HANDOVER) {
            return None;
        }
        self.set_bitmask(user, m | MigrationState::HANDOVER);
        let generation = self.bump_generation(user, TimerKind::Handover);
        self.handover_plan.insert(
            user.to_string(),
            HandoverPlan {
                next_ssid: next_ssid.to_string(),
                next_bssid: next_bssid.to_string(),
                next_password: next_password.to_string(),
                generation,
            },
        );
        Some(generation)
    }

    /// `pre_migrated/<user>` under `optimised`, `lifetime_to_mig > 200s`: cancel.
    pub fn cancel_pre_migrate(&mut self, user: &str) {
        self.set_bitmask(user, MigrationState::RUNNING);
        self.migrate_plan.remove(user);
        self.handover_plan.remove(user);
    }

    /// `pre_migrated/<user>` under `optimised`, `lifetime_to_mig <= 200s`: schedule
    /// the two timers, skipping any already-set bit.
    pub fn schedule_optimised_timers(&mut self, user: &str, lifetime_to_mig: f64) -> Vec<Action> {
        let mut actions = Vec::new();
        let m = self.bitmask(user);
        if !m.contains(MigrationState::HANDOVER) {
            let delay = if lifetime_to_mig > 0.0 { lifetime_to_mig + 0.1 } else { 0.1 };
            let generation = self.bump_generation(user, TimerKind::Handover);
            actions.push(Action::ScheduleTimer {
                user: user.to_string(),
                kind: TimerKind::Handover,
                delay_s: delay,
                generation,
            });
        }
        if !m.contains(MigrationState::MIGRATE) {
            let delay = lifetime_to_mig.max(0.0);
            let generation = self.bump_generation(user, TimerKind::Migrate);
            actions.push(Action::ScheduleTimer {
                user: user.to_string(),
                kind: TimerKind::Migrate,
                delay_s: delay,
                generation,
            });
        }
        actions
    }

    /// `migrated/<user>`: update service to running; M<-RUNNING; drop stored plans.
    pub fn migrated(&mut self, user: &str) {
        self.set_bitmask(user, MigrationState::RUNNING);
        self.migrate_plan.remove(user);
        self.handover_plan.remove(user);
    }

    /// `handovered/<user>`: clear HANDOVER; RUNNING if it was the only in-flight bit,
    /// else keep the rest and add HANDOVERED.
    pub fn handovered(&mut self, user: &str) {
        let remaining = self.bitmask(user).difference(MigrationState::HANDOVER);
        let next = if remaining.is_empty() { MigrationState::RUNNING } else { remaining | MigrationState::HANDOVERED };
        self.set_bitmask(user, next);
        self.handover_plan.remove(user);
    }

    /// `LWT/eu/<user>`: discard all in-memory state for this user.
    pub fn clear_user(&mut self, user: &str) {
        self.bitmask.remove(user);
        self.migrate_plan.remove(user);
        self.handover_plan.remove(user);
        self.generation.remove(&(user.to_string(), TimerKind::Handover));
        self.generation.remove(&(user.to_string(), TimerKind::Migrate));
    }

    /// A timer fire consults the current plan map before acting (§5 "a timer firing
    /// for a payload no longer present in the stored-plan map is a no-op").
    pub fn handover_plan_if_current(&self, user: &str, generation: u64) -> Option<HandoverPlan> {
        self.handover_plan
            .get(user)
            .filter(|p| p.generation == generation)
            .cloned()
    }

    pub fn migrate_plan_if_current(&self, user: &str, generation: u64) -> Option<MigratePlan> {
        self.migrate_plan.get(user).filter(|p| p.generation == generation).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_migrate_is_refused_while_mid_migration() {
        let mut state = OrchestratorState::new();
        assert!(state.try_begin_pre_migrate("U1", "edge01", "edge02", "edge02-bs"));
        assert!(!state.try_begin_pre_migrate("U1", "edge01", "edge03", "edge03-bs"));
    }

    #[test]
    fn handovered_with_only_handover_bit_returns_to_running() {
        let mut state = OrchestratorState::new();
        state.mark_running("U1");
        state.try_begin_handover("U1", "edge03-bs", "aa:bb", "pw").unwrap();
        state.handovered("U1");
        assert_eq!(state.bitmask("U1"), MigrationState::RUNNING);
    }

    #[test]
    fn handovered_while_migrating_keeps_migrate_bit_and_adds_handovered() {
        let mut state = OrchestratorState::new();
        state.try_begin_pre_migrate("U1", "edge01", "edge02", "edge02-bs");
        state.pre_migrated_non_optimised("U1");
        state.set_bitmask("U1", state.bitmask("U1") | MigrationState::HANDOVER);
        state.handovered("U1");
        let m = state.bitmask("U1");
        assert!(m.contains(MigrationState::MIGRATE));
        assert!(m.contains(MigrationState::HANDOVERED));
        assert!(!m.contains(MigrationState::HANDOVER));
    }

    #[test]
    fn stale_timer_generation_is_rejected() {
        let mut state = OrchestratorState::new();
        let gen1 = state.try_begin_handover("U1", "bs", "bssid", "pw").unwrap();
        // A later plan for the same user supersedes the first (§5: "the latest
        // plan's stored handover/migrate payloads REPLACE any older ones").
        let gen2 = state.try_begin_handover("U1", "bs2", "bssid2", "pw2").unwrap();
        assert_ne!(gen1, gen2);
        assert!(state.handover_plan_if_current("U1", gen1).is_none());
        assert!(state.handover_plan_if_current("U1", gen2).is_some());
    }

    #[test]
    fn cancel_clears_state_back_to_running() {
        let mut state = OrchestratorState::new();
        state.try_begin_pre_migrate("U1", "edge01", "edge02", "edge02-bs");
        state.cancel_pre_migrate("U1");
        assert_eq!(state.bitmask("U1"), MigrationState::RUNNING);
        assert!(state.migrate_plan_if_current("U1", 1).is_none());
    }
}
