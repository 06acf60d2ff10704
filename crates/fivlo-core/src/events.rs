use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{PendingDecision, PhaseKind, SessionStatus};
use crate::sync::RewardEvent;

/// Every state change in the engine produces an Event.
/// Commands return the events they caused; the host renders from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionCreated {
        goal_label: String,
        phase_count: usize,
        at: DateTime<Utc>,
    },
    TimerStarted {
        phase_index: usize,
        phase_kind: PhaseKind,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    Tick {
        remaining_secs: u64,
    },
    PhaseCompleted {
        phase_index: usize,
        phase_kind: PhaseKind,
        pending: Option<PendingDecision>,
        at: DateTime<Utc>,
    },
    /// Time Attack checklist progress after a step boundary.
    StepProgress {
        completed_index: usize,
        remaining_steps: usize,
    },
    CycleCompleted {
        cycle_count: u32,
        at: DateTime<Utc>,
    },
    PhaseStarted {
        phase_index: usize,
        phase_kind: PhaseKind,
        name: String,
        total_secs: u64,
        at: DateTime<Utc>,
    },
    RewardRequested {
        event: RewardEvent,
    },
    SessionFinished {
        cycle_count: u32,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    SessionReset {
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Non-blocking notice for the user (e.g. rewards delayed).
    Notice {
        message: String,
    },
    StateSnapshot {
        status: SessionStatus,
        phase_index: usize,
        phase_kind: PhaseKind,
        phase_name: String,
        remaining_secs: u64,
        total_secs: u64,
        cycle_count: u32,
        at: DateTime<Utc>,
    },
}
