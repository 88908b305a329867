//! Side effects the pure state-machine core in `state.rs` asks the dispatcher shell
//! to perform. Keeping these as data (rather than calling the bus/timers directly)
//! is what makes `state.rs` unit-testable without a live bus or tokio runtime.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Handover,
    Migrate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Publish { topic: String, payload: Value },
    ScheduleTimer { user: String, kind: TimerKind, delay_s: f64, generation: u64 },
    CancelTimer { user: String, kind: TimerKind },
    Warn(String),
}
