//! Types shared by the controller and the sync worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionId, SessionMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardReason {
    CycleComplete,
    SessionComplete,
}

impl RewardReason {
    /// Ledger source tag sent to the coin API.
    pub fn source(&self) -> &'static str {
        match self {
            RewardReason::CycleComplete => "pomodoro_completion",
            RewardReason::SessionComplete => "time_attack_completion",
        }
    }
}

/// Request for a coin grant, created once per boundary crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardEvent {
    pub session_id: Option<SessionId>,
    pub amount: u64,
    pub reason: RewardReason,
    pub requested_at: DateTime<Utc>,
}

/// What a transport needs to register a session remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSession {
    pub goal_label: String,
    pub color_tag: String,
    /// Planned duration in seconds.
    pub total_duration: u64,
    pub mode: Option<SessionMode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndAck {
    #[serde(default)]
    pub coin_earned: u64,
}

/// Identifies which session instance and phase a request was made for.
/// Responses whose tag no longer matches the live session are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTag {
    pub generation: u64,
    pub phase_index: usize,
}

/// Fire-and-forget work queued by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Create {
        tag: SyncTag,
        request: CreateSession,
    },
    StartOrResume {
        tag: SyncTag,
        session_id: Option<SessionId>,
    },
    Pause {
        tag: SyncTag,
        session_id: Option<SessionId>,
    },
    StepUpdate {
        tag: SyncTag,
        session_id: Option<SessionId>,
        step_index: usize,
        remaining_steps: usize,
    },
    /// End the remote session. When `settle` is set, the coins reported by
    /// the server become the amount of that reward event (0 on failure).
    End {
        tag: SyncTag,
        session_id: Option<SessionId>,
        elapsed_secs: u64,
        settle: Option<RewardEvent>,
    },
    Grant {
        tag: SyncTag,
        event: RewardEvent,
    },
}

/// Results the worker reports back to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Created {
        tag: SyncTag,
        session_id: SessionId,
    },
    Ended {
        tag: SyncTag,
        ack: EndAck,
    },
    Granted {
        tag: SyncTag,
        event: RewardEvent,
    },
    RewardFailed {
        tag: SyncTag,
        reason: RewardReason,
        message: String,
    },
}

impl Inbound {
    pub fn tag(&self) -> SyncTag {
        match self {
            Inbound::Created { tag, .. }
            | Inbound::Ended { tag, .. }
            | Inbound::Granted { tag, .. }
            | Inbound::RewardFailed { tag, .. } => *tag,
        }
    }
}
