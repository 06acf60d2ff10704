//! Session data model.
//!
//! A [`Session`] is a plain serializable value. The controller owns the only
//! mutable copy; everything else sees a [`SessionSnapshot`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Opaque identifier assigned by the remote session API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Focus,
    Break,
    Step,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub total_seconds: u64,
    pub kind: PhaseKind,
}

impl Phase {
    pub fn focus(total_seconds: u64) -> Self {
        Self {
            name: "focus".into(),
            total_seconds,
            kind: PhaseKind::Focus,
        }
    }

    pub fn rest(total_seconds: u64) -> Self {
        Self {
            name: "break".into(),
            total_seconds,
            kind: PhaseKind::Break,
        }
    }

    pub fn step(name: impl Into<String>, total_seconds: u64) -> Self {
        Self {
            name: name.into(),
            total_seconds,
            kind: PhaseKind::Step,
        }
    }
}

/// Session flavour. Pomodoro carries its two durations so a restored
/// snapshot can keep generating phases without outside configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SessionMode {
    Pomodoro { focus_secs: u64, break_secs: u64 },
    TimeAttack,
}

impl SessionMode {
    pub fn is_pomodoro(&self) -> bool {
        matches!(self, SessionMode::Pomodoro { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    PhaseComplete,
    Finished,
    Reset,
}

impl SessionStatus {
    /// FINISHED and RESET accept no further commands.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Finished | SessionStatus::Reset)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::PhaseComplete => "phase_complete",
            SessionStatus::Finished => "finished",
            SessionStatus::Reset => "reset",
        };
        f.write_str(s)
    }
}

/// What the controller is waiting for while in PHASE_COMPLETE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingDecision {
    /// Focus ended, a break is scheduled: take it or skip it.
    BreakChoice,
    /// Break ended, cycle counted: keep going or finish.
    ContinueChoice,
    /// Time Attack step ended, more steps remain.
    NextStep,
}

/// How a [`PendingDecision`] gets resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The host advances on its own (possibly after a delay).
    Auto,
    /// The user has to pick.
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pending {
    pub decision: PendingDecision,
    pub resolution: Resolution,
}

/// Everything needed to create a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub goal_label: String,
    #[serde(default)]
    pub color_tag: String,
    pub mode: SessionMode,
    /// Ordered steps for Time Attack; ignored for Pomodoro.
    #[serde(default)]
    pub steps: Vec<Phase>,
}

impl SessionRequest {
    pub fn pomodoro(goal_label: impl Into<String>, focus_secs: u64, break_secs: u64) -> Self {
        Self {
            goal_label: goal_label.into(),
            color_tag: String::new(),
            mode: SessionMode::Pomodoro {
                focus_secs,
                break_secs,
            },
            steps: Vec::new(),
        }
    }

    pub fn time_attack(goal_label: impl Into<String>, steps: Vec<Phase>) -> Self {
        Self {
            goal_label: goal_label.into(),
            color_tag: String::new(),
            mode: SessionMode::TimeAttack,
            steps,
        }
    }

    pub fn with_color(mut self, color_tag: impl Into<String>) -> Self {
        self.color_tag = color_tag.into();
        self
    }

    /// Check the request and build the initial phase sequence.
    pub fn validate(&self) -> Result<Vec<Phase>, ValidationError> {
        if self.goal_label.trim().is_empty() {
            return Err(ValidationError::EmptyGoal);
        }
        match self.mode {
            SessionMode::Pomodoro {
                focus_secs,
                break_secs,
            } => {
                if focus_secs == 0 {
                    return Err(ValidationError::ZeroDuration {
                        phase: "focus".into(),
                    });
                }
                if break_secs == 0 {
                    return Err(ValidationError::ZeroDuration {
                        phase: "break".into(),
                    });
                }
                Ok(vec![Phase::focus(focus_secs)])
            }
            SessionMode::TimeAttack => {
                if self.steps.is_empty() {
                    return Err(ValidationError::EmptyStepList);
                }
                if let Some(step) = self.steps.iter().find(|s| s.total_seconds == 0) {
                    return Err(ValidationError::ZeroDuration {
                        phase: step.name.clone(),
                    });
                }
                Ok(self
                    .steps
                    .iter()
                    .map(|s| Phase::step(s.name.clone(), s.total_seconds))
                    .collect())
            }
        }
    }
}

/// One live focus session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Option<SessionId>,
    pub goal_label: String,
    pub color_tag: String,
    pub mode: SessionMode,
    pub phase_sequence: Vec<Phase>,
    pub current_phase_index: usize,
    pub remaining_seconds: u64,
    pub cycle_count: u32,
    pub status: SessionStatus,
    /// Set while PHASE_COMPLETE waits for a transition.
    #[serde(default)]
    pub pending: Option<Pending>,
    /// Seconds actually counted down across every phase.
    #[serde(default)]
    pub elapsed_seconds: u64,
    /// RewardEvents emitted so far, one per boundary crossing.
    #[serde(default)]
    pub rewards_requested: u32,
    /// Coins confirmed by the remote ledger.
    #[serde(default)]
    pub coins_earned: u64,
    /// Controller generation that owns this session's sync results.
    #[serde(default)]
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Build a fresh IDLE session from a validated request.
    pub fn create(request: &SessionRequest) -> Result<Self, ValidationError> {
        let phase_sequence = request.validate()?;
        let remaining_seconds = phase_sequence[0].total_seconds;
        Ok(Self {
            id: None,
            goal_label: request.goal_label.trim().to_string(),
            color_tag: request.color_tag.clone(),
            mode: request.mode,
            phase_sequence,
            current_phase_index: 0,
            remaining_seconds,
            cycle_count: 0,
            status: SessionStatus::Idle,
            pending: None,
            elapsed_seconds: 0,
            rewards_requested: 0,
            coins_earned: 0,
            generation: 0,
            created_at: Utc::now(),
        })
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        self.phase_sequence.get(self.current_phase_index)
    }

    /// Steps after the current one (Time Attack only; 0 for Pomodoro).
    pub fn remaining_steps(&self) -> usize {
        match self.mode {
            SessionMode::TimeAttack => self
                .phase_sequence
                .len()
                .saturating_sub(self.current_phase_index + 1),
            SessionMode::Pomodoro { .. } => 0,
        }
    }

    /// Planned duration used when registering the session remotely.
    pub fn planned_total_seconds(&self) -> u64 {
        match self.mode {
            SessionMode::Pomodoro {
                focus_secs,
                break_secs,
            } => focus_secs.saturating_add(break_secs),
            SessionMode::TimeAttack => self
                .phase_sequence
                .iter()
                .fold(0u64, |acc, p| acc.saturating_add(p.total_seconds)),
        }
    }

    /// Invariants every snapshot must satisfy before it can be restored.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        let phase = self.current_phase().ok_or_else(|| {
            ValidationError::InvalidSnapshot(format!(
                "phase index {} out of bounds ({} phases)",
                self.current_phase_index,
                self.phase_sequence.len()
            ))
        })?;
        if self.remaining_seconds > phase.total_seconds {
            return Err(ValidationError::InvalidSnapshot(format!(
                "remaining {}s exceeds phase total {}s",
                self.remaining_seconds, phase.total_seconds
            )));
        }
        if self.status == SessionStatus::PhaseComplete && self.pending.is_none() {
            return Err(ValidationError::InvalidSnapshot(
                "phase_complete without a pending decision".into(),
            ));
        }
        Ok(())
    }
}

/// Immutable copy of a session handed across screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub taken_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub(crate) fn of(session: &Session) -> Self {
        Self {
            session: session.clone(),
            taken_at: Utc::now(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.session.remaining_seconds
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        self.session.current_phase()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
