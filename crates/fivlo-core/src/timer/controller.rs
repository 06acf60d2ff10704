//! Session lifecycle controller.
//!
//! Owns the one live [`Session`] and its clock. All mutation happens here,
//! synchronously, on the caller's thread. Remote calls are pushed onto the
//! sync queue and never awaited; their results come back as [`Inbound`]
//! messages and are dropped when they no longer match the live session.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (Paused <-> Running) -> PhaseComplete -> (Running | Finished)
//! any non-terminal state -> Reset
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::clock::Clock;
use super::scheduler::{scheduler_for, PomodoroScheduler};
use crate::error::ValidationError;
use crate::events::Event;
use crate::session::{
    Pending, PendingDecision, Phase, PhaseKind, Resolution, Session, SessionMode, SessionRequest,
    SessionSnapshot, SessionStatus,
};
use crate::sync::{CreateSession, Inbound, Outbound, RewardEvent, RewardReason, SyncHandle, SyncTag};

/// How each kind of phase boundary is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPolicy {
    #[serde(default = "default_prompt")]
    pub after_focus: Resolution,
    #[serde(default = "default_prompt")]
    pub after_break: Resolution,
    #[serde(default = "default_auto")]
    pub after_step: Resolution,
    /// Delay before a host applies an automatic transition.
    #[serde(default = "default_auto_advance_delay")]
    pub auto_advance_delay_secs: u64,
}

fn default_prompt() -> Resolution {
    Resolution::Prompt
}
fn default_auto() -> Resolution {
    Resolution::Auto
}
fn default_auto_advance_delay() -> u64 {
    3
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            after_focus: Resolution::Prompt,
            after_break: Resolution::Prompt,
            after_step: Resolution::Auto,
            auto_advance_delay_secs: default_auto_advance_delay(),
        }
    }
}

impl TransitionPolicy {
    /// Everything advances on its own with no delay.
    pub fn automatic() -> Self {
        Self {
            after_focus: Resolution::Auto,
            after_break: Resolution::Auto,
            after_step: Resolution::Auto,
            auto_advance_delay_secs: 0,
        }
    }

    fn resolution_for(&self, decision: PendingDecision) -> Resolution {
        match decision {
            PendingDecision::BreakChoice => self.after_focus,
            PendingDecision::ContinueChoice => self.after_break,
            PendingDecision::NextStep => self.after_step,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Coins requested for each completed focus+break cycle.
    #[serde(default = "default_cycle_coins")]
    pub cycle_coins: u64,
}

fn default_true() -> bool {
    true
}
fn default_cycle_coins() -> u64 {
    1
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            cycle_coins: default_cycle_coins(),
        }
    }
}

/// Answer to a [`PendingDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    TakeBreak,
    SkipBreak,
    Continue,
    Finish,
    NextStep,
}

impl Choice {
    /// What an automatic transition picks.
    pub fn default_for(decision: PendingDecision) -> Self {
        match decision {
            PendingDecision::BreakChoice => Choice::TakeBreak,
            PendingDecision::ContinueChoice => Choice::Continue,
            PendingDecision::NextStep => Choice::NextStep,
        }
    }

    fn answers(&self, decision: PendingDecision) -> bool {
        matches!(
            (decision, self),
            (PendingDecision::BreakChoice, Choice::TakeBreak | Choice::SkipBreak)
                | (PendingDecision::ContinueChoice, Choice::Continue | Choice::Finish)
                | (PendingDecision::NextStep, Choice::NextStep)
        )
    }
}

/// Something the host loop woke up for.
#[derive(Debug)]
pub enum Wakeup {
    Tick(u64),
    Sync(Inbound),
}

pub struct SessionController {
    session: Option<Session>,
    transitions: TransitionPolicy,
    rewards: RewardPolicy,
    clock: Box<dyn Clock>,
    /// Bumped on every clock start so ticks from an earlier run are ignored.
    clock_epoch: u64,
    ticks_tx: mpsc::UnboundedSender<u64>,
    ticks_rx: mpsc::UnboundedReceiver<u64>,
    sync: SyncHandle,
    /// Bumped on every `create`; sync results for older sessions are stale.
    generation: u64,
    /// Generation and creation time of the session last detached by `take`.
    handed_off: Option<(u64, DateTime<Utc>)>,
}

impl SessionController {
    pub fn new(
        clock: Box<dyn Clock>,
        sync: SyncHandle,
        transitions: TransitionPolicy,
        rewards: RewardPolicy,
    ) -> Self {
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        Self {
            session: None,
            transitions,
            rewards,
            clock,
            clock_epoch: 0,
            ticks_tx,
            ticks_rx,
            sync,
            generation: 0,
            handed_off: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(|s| s.status)
    }

    pub fn pending(&self) -> Option<Pending> {
        self.session.as_ref().and_then(|s| s.pending)
    }

    pub fn transitions(&self) -> &TransitionPolicy {
        &self.transitions
    }

    pub fn clock_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Read-only copy for rendering or hand-off.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(SessionSnapshot::of)
    }

    /// Build a full state snapshot event.
    pub fn state_event(&self) -> Option<Event> {
        let s = self.session.as_ref()?;
        let phase = s.current_phase()?;
        Some(Event::StateSnapshot {
            status: s.status,
            phase_index: s.current_phase_index,
            phase_kind: phase.kind,
            phase_name: phase.name.clone(),
            remaining_secs: s.remaining_seconds,
            total_secs: phase.total_seconds,
            cycle_count: s.cycle_count,
            at: Utc::now(),
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Validate the request and make it the live session (IDLE).
    pub fn create(&mut self, request: &SessionRequest) -> Result<Vec<Event>, ValidationError> {
        self.ensure_vacant()?;
        let mut session = Session::create(request)?;
        self.generation += 1;
        session.generation = self.generation;
        self.handed_off = None;
        self.stop_clock();

        self.sync.send(Outbound::Create {
            tag: SyncTag {
                generation: self.generation,
                phase_index: 0,
            },
            request: CreateSession {
                goal_label: session.goal_label.clone(),
                color_tag: session.color_tag.clone(),
                total_duration: session.planned_total_seconds(),
                mode: Some(session.mode),
            },
        });
        tracing::info!(
            goal = %session.goal_label,
            phases = session.phase_sequence.len(),
            generation = self.generation,
            "session created"
        );
        let event = Event::SessionCreated {
            goal_label: session.goal_label.clone(),
            phase_count: session.phase_sequence.len(),
            at: Utc::now(),
        };
        self.session = Some(session);
        Ok(vec![event])
    }

    /// Detach the live session, stopping its clock. The controller is
    /// empty afterwards, so only the returned snapshot remains.
    pub fn take(&mut self) -> Option<SessionSnapshot> {
        self.stop_clock();
        let session = self.session.take()?;
        self.handed_off = Some((session.generation, session.created_at));
        tracing::debug!(status = %session.status, "session handed off");
        Some(SessionSnapshot::of(&session))
    }

    /// Re-attach a snapshot produced by [`take`](Self::take) or
    /// [`snapshot`](Self::snapshot). A RUNNING snapshot resumes ticking.
    ///
    /// Only the session this controller last handed off keeps its
    /// generation. Any other snapshot gets a fresh one, so results still
    /// in flight for earlier sessions are dropped.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> Result<Vec<Event>, ValidationError> {
        self.ensure_vacant()?;
        let mut session = snapshot.session;
        session.check_invariants()?;
        let same_instance = self.handed_off.take()
            == Some((session.generation, session.created_at))
            && session.generation == self.generation;
        if !same_instance {
            self.generation += 1;
            session.generation = self.generation;
        }
        tracing::debug!(generation = self.generation, same_instance, "session restored");
        let running = session.status == SessionStatus::Running;
        self.session = Some(session);
        self.stop_clock();
        if running {
            self.start_clock();
        }
        Ok(self.state_event().into_iter().collect())
    }

    /// Drop the session. A session that is still live is reset first.
    pub fn discard(&mut self) -> Vec<Event> {
        let events = match self.status() {
            Some(status) if !status.is_terminal() => self.reset(),
            _ => Vec::new(),
        };
        self.stop_clock();
        self.session = None;
        events
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// IDLE or PAUSED -> RUNNING.
    pub fn start(&mut self) -> Vec<Event> {
        let tag = self.tag();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let event = match session.status {
            SessionStatus::Idle => {
                let kind = session.current_phase().map(|p| p.kind).unwrap_or(PhaseKind::Focus);
                Event::TimerStarted {
                    phase_index: session.current_phase_index,
                    phase_kind: kind,
                    remaining_secs: session.remaining_seconds,
                    at: Utc::now(),
                }
            }
            SessionStatus::Paused => Event::TimerResumed {
                remaining_secs: session.remaining_seconds,
                at: Utc::now(),
            },
            other => {
                tracing::debug!(status = %other, "start ignored");
                return Vec::new();
            }
        };
        session.status = SessionStatus::Running;
        let msg = Outbound::StartOrResume {
            tag,
            session_id: session.id.clone(),
        };
        self.start_clock();
        self.sync.send(msg);
        vec![event]
    }

    /// PAUSED -> RUNNING.
    pub fn resume(&mut self) -> Vec<Event> {
        if self.status() != Some(SessionStatus::Paused) {
            return Vec::new();
        }
        self.start()
    }

    /// RUNNING -> PAUSED. `remaining_seconds` is kept exactly.
    pub fn pause(&mut self) -> Vec<Event> {
        if self.status() != Some(SessionStatus::Running) {
            return Vec::new();
        }
        self.stop_clock();
        let tag = self.tag();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.status = SessionStatus::Paused;
        self.sync.send(Outbound::Pause {
            tag,
            session_id: session.id.clone(),
        });
        vec![Event::TimerPaused {
            remaining_secs: session.remaining_seconds,
            at: Utc::now(),
        }]
    }

    /// One second elapsed. Ignored unless RUNNING.
    pub fn tick(&mut self) -> Vec<Event> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.status != SessionStatus::Running {
            return Vec::new();
        }
        session.remaining_seconds = session.remaining_seconds.saturating_sub(1);
        session.elapsed_seconds = session.elapsed_seconds.saturating_add(1);
        let mut events = vec![Event::Tick {
            remaining_secs: session.remaining_seconds,
        }];
        if session.remaining_seconds == 0 {
            events.extend(self.complete_current_phase());
        }
        events
    }

    /// End the current phase now (the "next" button). Only an explicit
    /// user action may cut a phase short.
    pub fn complete_phase(&mut self) -> Vec<Event> {
        match self.status() {
            Some(SessionStatus::Running | SessionStatus::Paused) => {}
            _ => return Vec::new(),
        }
        if let Some(session) = self.session.as_mut() {
            session.remaining_seconds = 0;
        }
        self.complete_current_phase()
    }

    /// Apply an automatic transition. No-op unless the pending decision
    /// is configured as [`Resolution::Auto`].
    pub fn advance(&mut self) -> Vec<Event> {
        match self.pending() {
            Some(Pending {
                decision,
                resolution: Resolution::Auto,
            }) if self.status() == Some(SessionStatus::PhaseComplete) => {
                self.apply_choice(Choice::default_for(decision))
            }
            _ => Vec::new(),
        }
    }

    /// Answer the pending decision explicitly.
    pub fn choose(&mut self, choice: Choice) -> Vec<Event> {
        if self.status() != Some(SessionStatus::PhaseComplete) {
            return Vec::new();
        }
        match self.pending() {
            Some(p) if choice.answers(p.decision) => self.apply_choice(choice),
            other => {
                tracing::warn!(?choice, pending = ?other, "choice does not answer pending decision");
                Vec::new()
            }
        }
    }

    /// Abandon the session from any non-terminal state.
    pub fn reset(&mut self) -> Vec<Event> {
        match self.status() {
            Some(status) if !status.is_terminal() => {}
            _ => return Vec::new(),
        }
        self.stop_clock();
        let tag = self.tag();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.status = SessionStatus::Reset;
        session.pending = None;
        self.sync.send(Outbound::End {
            tag,
            session_id: session.id.clone(),
            elapsed_secs: session.elapsed_seconds,
            settle: None,
        });
        tracing::info!(elapsed = session.elapsed_seconds, "session reset");
        vec![Event::SessionReset {
            elapsed_secs: session.elapsed_seconds,
            at: Utc::now(),
        }]
    }

    /// Same as [`reset`](Self::reset).
    pub fn stop(&mut self) -> Vec<Event> {
        self.reset()
    }

    // ── Host plumbing ────────────────────────────────────────────────

    /// Wait for the next clock tick or sync result.
    pub async fn wakeup(&mut self) -> Option<Wakeup> {
        tokio::select! {
            Some(epoch) = self.ticks_rx.recv() => Some(Wakeup::Tick(epoch)),
            Some(msg) = self.sync.recv() => Some(Wakeup::Sync(msg)),
            else => None,
        }
    }

    pub fn handle(&mut self, wakeup: Wakeup) -> Vec<Event> {
        match wakeup {
            Wakeup::Tick(epoch) => self.on_clock_tick(epoch),
            Wakeup::Sync(msg) => self.apply_sync(msg),
        }
    }

    /// Tick delivered by the clock callback. Ticks from an earlier clock
    /// run are orphans and dropped.
    pub fn on_clock_tick(&mut self, epoch: u64) -> Vec<Event> {
        if epoch != self.clock_epoch || !self.clock.is_running() {
            return Vec::new();
        }
        self.tick()
    }

    /// Apply every sync result that is already available.
    pub fn drain_sync(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(msg) = self.sync.try_recv() {
            events.extend(self.apply_sync(msg));
        }
        events
    }

    /// Close the sync queue and apply results until the worker has drained
    /// or `grace` passes without a new result.
    ///
    /// Terminal for remote sync: the controller keeps working locally, but
    /// every later remote call is dropped with a warning. Call it on
    /// shutdown only.
    pub async fn flush(&mut self, grace: std::time::Duration) -> Vec<Event> {
        self.sync.close();
        let mut events = Vec::new();
        while let Ok(Some(msg)) = tokio::time::timeout(grace, self.sync.recv()).await {
            events.extend(self.apply_sync(msg));
        }
        events
    }

    /// Apply one sync result, unless it is stale.
    pub fn apply_sync(&mut self, msg: Inbound) -> Vec<Event> {
        let tag = msg.tag();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if tag.generation != self.generation || session.status == SessionStatus::Reset {
            tracing::debug!(?tag, "discarding stale sync result");
            return Vec::new();
        }
        match msg {
            Inbound::Created { session_id, .. } => {
                if session.id.is_none() {
                    tracing::debug!(%session_id, "remote id attached");
                    session.id = Some(session_id);
                }
                Vec::new()
            }
            Inbound::Ended { ack, .. } => {
                if tag.phase_index != session.current_phase_index {
                    tracing::debug!(?tag, "discarding end ack for another phase");
                    return Vec::new();
                }
                session.coins_earned = session.coins_earned.saturating_add(ack.coin_earned);
                Vec::new()
            }
            Inbound::Granted { event, .. } => {
                session.coins_earned = session.coins_earned.saturating_add(event.amount);
                Vec::new()
            }
            Inbound::RewardFailed { reason, message, .. } => {
                tracing::warn!(?reason, %message, "reward not granted");
                vec![Event::Notice {
                    message: "Rewards could not be synced right now and may be delayed.".into(),
                }]
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn ensure_vacant(&self) -> Result<(), ValidationError> {
        match self.status() {
            Some(status) if !status.is_terminal() => Err(ValidationError::SessionAlreadyLive {
                status: status.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn tag(&self) -> SyncTag {
        SyncTag {
            generation: self.generation,
            phase_index: self
                .session
                .as_ref()
                .map(|s| s.current_phase_index)
                .unwrap_or(0),
        }
    }

    fn start_clock(&mut self) {
        self.clock_epoch += 1;
        let epoch = self.clock_epoch;
        let tx = self.ticks_tx.clone();
        self.clock.start(Box::new(move || {
            let _ = tx.send(epoch);
        }));
    }

    fn stop_clock(&mut self) {
        self.clock.stop();
        self.clock_epoch += 1;
    }

    fn new_reward(&mut self, reason: RewardReason, amount: u64) -> Option<RewardEvent> {
        if !self.rewards.enabled {
            return None;
        }
        let session = self.session.as_mut()?;
        session.rewards_requested += 1;
        Some(RewardEvent {
            session_id: session.id.clone(),
            amount,
            reason,
            requested_at: Utc::now(),
        })
    }

    /// Runs exactly once per boundary: the caller has just moved
    /// `remaining_seconds` to 0 while RUNNING or PAUSED.
    fn complete_current_phase(&mut self) -> Vec<Event> {
        self.stop_clock();
        let tag = self.tag();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let index = session.current_phase_index;
        let kind = session.current_phase().map(|p| p.kind).unwrap_or(PhaseKind::Step);
        session.status = SessionStatus::PhaseComplete;
        tracing::debug!(phase_index = index, ?kind, "phase complete");

        let mut events = Vec::new();
        let decision = match kind {
            PhaseKind::Focus => Some(PendingDecision::BreakChoice),
            PhaseKind::Break => {
                session.cycle_count += 1;
                events.push(Event::CycleCompleted {
                    cycle_count: session.cycle_count,
                    at: Utc::now(),
                });
                Some(PendingDecision::ContinueChoice)
            }
            PhaseKind::Step => {
                let remaining_steps = session.remaining_steps();
                self.sync.send(Outbound::StepUpdate {
                    tag,
                    session_id: session.id.clone(),
                    step_index: index,
                    remaining_steps,
                });
                events.push(Event::StepProgress {
                    completed_index: index,
                    remaining_steps,
                });
                let next = scheduler_for(&session.mode).next(session);
                next.map(|_| PendingDecision::NextStep)
            }
        };
        events.push(Event::PhaseCompleted {
            phase_index: index,
            phase_kind: kind,
            pending: decision,
            at: Utc::now(),
        });

        match decision {
            Some(decision) => {
                if let Some(session) = self.session.as_mut() {
                    session.pending = Some(Pending {
                        decision,
                        resolution: self.transitions.resolution_for(decision),
                    });
                }
                if kind == PhaseKind::Break {
                    let amount = self.rewards.cycle_coins;
                    if let Some(event) = self.new_reward(RewardReason::CycleComplete, amount) {
                        self.sync.send(Outbound::Grant {
                            tag,
                            event: event.clone(),
                        });
                        events.push(Event::RewardRequested { event });
                    }
                }
            }
            None => {
                // Amount is settled from the coins the server reports on end.
                let settle = self.new_reward(RewardReason::SessionComplete, 0);
                if let Some(event) = settle.clone() {
                    events.push(Event::RewardRequested { event });
                }
                events.extend(self.finish(settle));
            }
        }
        events
    }

    fn apply_choice(&mut self, choice: Choice) -> Vec<Event> {
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };
        let next = match (choice, session.mode) {
            (Choice::Finish, _) => return self.finish(None),
            (
                Choice::SkipBreak,
                SessionMode::Pomodoro {
                    focus_secs,
                    break_secs,
                },
            ) => Some(
                PomodoroScheduler {
                    focus_secs,
                    break_secs,
                }
                .focus_phase(),
            ),
            _ => scheduler_for(&session.mode).next(session),
        };
        match next {
            Some(phase) => self.enter_phase(phase),
            None => self.finish(None),
        }
    }

    fn enter_phase(&mut self, phase: Phase) -> Vec<Event> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let index = session.current_phase_index + 1;
        if session.mode.is_pomodoro() {
            session.phase_sequence.truncate(index);
            session.phase_sequence.push(phase.clone());
        }
        session.current_phase_index = index;
        session.remaining_seconds = phase.total_seconds;
        session.pending = None;
        session.status = SessionStatus::Running;
        let session_id = session.id.clone();
        tracing::debug!(phase_index = index, kind = ?phase.kind, "phase started");

        self.start_clock();
        self.sync.send(Outbound::StartOrResume {
            tag: self.tag(),
            session_id,
        });
        vec![Event::PhaseStarted {
            phase_index: index,
            phase_kind: phase.kind,
            name: phase.name,
            total_secs: phase.total_seconds,
            at: Utc::now(),
        }]
    }

    fn finish(&mut self, settle: Option<RewardEvent>) -> Vec<Event> {
        self.stop_clock();
        let tag = self.tag();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.status = SessionStatus::Finished;
        session.pending = None;
        self.sync.send(Outbound::End {
            tag,
            session_id: session.id.clone(),
            elapsed_secs: session.elapsed_seconds,
            settle,
        });
        tracing::info!(
            cycles = session.cycle_count,
            elapsed = session.elapsed_seconds,
            "session finished"
        );
        vec![Event::SessionFinished {
            cycle_count: session.cycle_count,
            elapsed_secs: session.elapsed_seconds,
            at: Utc::now(),
        }]
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.clock.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use crate::sync::{EndAck, SyncEndpoint};
    use crate::timer::clock::ManualClock;
    use proptest::prelude::*;

    fn controller(transitions: TransitionPolicy) -> (SessionController, ManualClock, SyncEndpoint) {
        let clock = ManualClock::new();
        let (sync, endpoint) = SyncHandle::channel();
        let ctl = SessionController::new(
            Box::new(clock.clone()),
            sync,
            transitions,
            RewardPolicy::default(),
        );
        (ctl, clock, endpoint)
    }

    fn outbound(endpoint: &mut SyncEndpoint) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = endpoint.outbound.try_recv() {
            out.push(msg);
        }
        out
    }

    fn grants(msgs: &[Outbound]) -> usize {
        msgs.iter()
            .filter(|m| matches!(m, Outbound::Grant { .. } | Outbound::End { settle: Some(_), .. }))
            .count()
    }

    fn ticks(ctl: &mut SessionController, n: u64) -> Vec<Event> {
        (0..n).flat_map(|_| ctl.tick()).collect()
    }

    fn pomodoro(ctl: &mut SessionController) {
        ctl.create(&SessionRequest::pomodoro("Study", 1500, 300)).unwrap();
        ctl.start();
    }

    #[test]
    fn start_runs_clock_and_syncs() {
        let (mut ctl, clock, mut ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        assert_eq!(ctl.status(), Some(SessionStatus::Running));
        assert!(clock.is_running());
        let msgs = outbound(&mut ep);
        assert!(matches!(msgs[0], Outbound::Create { .. }));
        assert!(matches!(msgs[1], Outbound::StartOrResume { session_id: None, .. }));
    }

    #[test]
    fn pause_then_start_keeps_remaining() {
        let (mut ctl, clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        ticks(&mut ctl, 42);
        let before = ctl.session().unwrap().remaining_seconds;

        ctl.pause();
        assert!(!clock.is_running());
        assert_eq!(ctl.status(), Some(SessionStatus::Paused));
        assert!(ctl.tick().is_empty());

        let events = ctl.start();
        assert!(matches!(events[0], Event::TimerResumed { remaining_secs, .. } if remaining_secs == before));
        assert_eq!(ctl.session().unwrap().remaining_seconds, before);
        assert!(clock.is_running());
    }

    #[test]
    fn focus_expiry_waits_for_break_choice() {
        let (mut ctl, clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        ticks(&mut ctl, 1500);

        assert_eq!(ctl.status(), Some(SessionStatus::PhaseComplete));
        assert!(!clock.is_running());
        assert_eq!(
            ctl.pending(),
            Some(Pending {
                decision: PendingDecision::BreakChoice,
                resolution: Resolution::Prompt,
            })
        );
        // prompted decisions are not auto-advanced
        assert!(ctl.advance().is_empty());
        assert!(ctl.choose(Choice::Continue).is_empty());

        ctl.choose(Choice::TakeBreak);
        let s = ctl.session().unwrap();
        assert_eq!(s.current_phase().unwrap(), &Phase::rest(300));
        assert_eq!(s.status, SessionStatus::Running);
    }

    #[test]
    fn auto_policy_advances_into_break() {
        let (mut ctl, _clock, _ep) = controller(TransitionPolicy::automatic());
        pomodoro(&mut ctl);
        ticks(&mut ctl, 1500);
        assert_eq!(ctl.status(), Some(SessionStatus::PhaseComplete));

        let events = ctl.advance();
        assert!(matches!(
            events[0],
            Event::PhaseStarted {
                phase_kind: PhaseKind::Break,
                total_secs: 300,
                ..
            }
        ));
        assert_eq!(ctl.session().unwrap().remaining_seconds, 300);
    }

    #[test]
    fn skipping_break_starts_new_focus_without_cycle() {
        let (mut ctl, _clock, mut ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        ticks(&mut ctl, 1500);
        ctl.choose(Choice::SkipBreak);

        let s = ctl.session().unwrap();
        assert_eq!(s.current_phase().unwrap().kind, PhaseKind::Focus);
        assert_eq!(s.current_phase_index, 1);
        assert_eq!(s.cycle_count, 0);
        assert_eq!(grants(&outbound(&mut ep)), 0);
    }

    #[test]
    fn break_completion_counts_cycle_and_grants_once() {
        let (mut ctl, _clock, mut ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        ticks(&mut ctl, 1500);
        ctl.choose(Choice::TakeBreak);
        let events = ticks(&mut ctl, 300);
        assert!(events.iter().any(|e| matches!(e, Event::CycleCompleted { cycle_count: 1, .. })));

        // duplicate ticks and a second completion attempt change nothing
        ticks(&mut ctl, 5);
        assert!(ctl.complete_phase().is_empty());

        let s = ctl.session().unwrap();
        assert_eq!(s.cycle_count, 1);
        assert_eq!(s.rewards_requested, 1);
        assert_eq!(grants(&outbound(&mut ep)), 1);
        assert_eq!(ctl.pending().unwrap().decision, PendingDecision::ContinueChoice);
    }

    #[test]
    fn finish_after_cycle_ends_remote_session() {
        let (mut ctl, clock, mut ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        ticks(&mut ctl, 1500);
        ctl.choose(Choice::TakeBreak);
        ticks(&mut ctl, 300);
        outbound(&mut ep);

        let events = ctl.choose(Choice::Finish);
        assert!(matches!(events[0], Event::SessionFinished { cycle_count: 1, elapsed_secs: 1800, .. }));
        assert_eq!(ctl.status(), Some(SessionStatus::Finished));
        assert!(!clock.is_running());
        assert!(matches!(
            outbound(&mut ep)[..],
            [Outbound::End { elapsed_secs: 1800, settle: None, .. }]
        ));
    }

    #[test]
    fn time_attack_steps_complete_on_schedule() {
        let (mut ctl, _clock, mut ep) = controller(TransitionPolicy::default());
        let steps = vec![Phase::step("a", 5), Phase::step("b", 10), Phase::step("c", 3)];
        ctl.create(&SessionRequest::time_attack("Room", steps)).unwrap();
        ctl.start();

        let mut boundaries = Vec::new();
        let mut session_rewards = 0;
        for t in 1..=18u64 {
            for event in ctl.tick() {
                match event {
                    Event::PhaseCompleted { .. } => boundaries.push(t),
                    Event::RewardRequested { event } => {
                        assert_eq!(event.reason, RewardReason::SessionComplete);
                        session_rewards += 1;
                    }
                    _ => {}
                }
            }
            if ctl.status() == Some(SessionStatus::PhaseComplete) {
                ctl.advance();
            }
            if t < 18 {
                assert_ne!(ctl.status(), Some(SessionStatus::Finished), "finished early at {t}");
            }
        }

        assert_eq!(boundaries, vec![5, 15, 18]);
        assert_eq!(ctl.status(), Some(SessionStatus::Finished));
        assert_eq!(session_rewards, 1);
        let msgs = outbound(&mut ep);
        assert_eq!(grants(&msgs), 1);
        let updates: Vec<(usize, usize)> = msgs
            .iter()
            .filter_map(|m| match m {
                Outbound::StepUpdate {
                    step_index,
                    remaining_steps,
                    ..
                } => Some((*step_index, *remaining_steps)),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec![(0, 2), (1, 1), (2, 0)]);
    }

    #[test]
    fn explicit_next_ends_step_early() {
        let (mut ctl, _clock, _ep) = controller(TransitionPolicy::default());
        let steps = vec![Phase::step("a", 60), Phase::step("b", 60)];
        ctl.create(&SessionRequest::time_attack("Room", steps)).unwrap();
        ctl.start();
        ticks(&mut ctl, 10);

        let events = ctl.complete_phase();
        assert!(events.iter().any(|e| matches!(e, Event::StepProgress { completed_index: 0, remaining_steps: 1 })));
        ctl.choose(Choice::NextStep);
        assert_eq!(ctl.session().unwrap().current_phase().unwrap().name, "b");
        assert_eq!(ctl.session().unwrap().elapsed_seconds, 10);
    }

    #[test]
    fn reset_stops_everything() {
        let (mut ctl, clock, mut ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        ticks(&mut ctl, 7);
        outbound(&mut ep);

        ctl.reset();
        assert_eq!(ctl.status(), Some(SessionStatus::Reset));
        assert!(!clock.is_running());
        assert!(!clock.fire());
        assert!(matches!(outbound(&mut ep)[..], [Outbound::End { elapsed_secs: 7, .. }]));

        let remaining = ctl.session().unwrap().remaining_seconds;
        assert!(ctl.tick().is_empty());
        assert!(ctl.start().is_empty());
        assert!(ctl.reset().is_empty());
        assert_eq!(ctl.session().unwrap().remaining_seconds, remaining);
        assert!(outbound(&mut ep).is_empty());
    }

    #[test]
    fn second_session_rejected_while_live() {
        let (mut ctl, _clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        let err = ctl
            .create(&SessionRequest::pomodoro("Other", 60, 60))
            .unwrap_err();
        assert!(matches!(err, ValidationError::SessionAlreadyLive { .. }));

        ctl.stop();
        assert!(ctl.create(&SessionRequest::pomodoro("Other", 60, 60)).is_ok());
    }

    #[test]
    fn invalid_request_never_starts_clock() {
        let (mut ctl, clock, mut ep) = controller(TransitionPolicy::default());
        let err = ctl
            .create(&SessionRequest::time_attack("Room", vec![]))
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyStepList);
        assert!(ctl.session().is_none());
        assert!(ctl.start().is_empty());
        assert_eq!(clock.start_count(), 0);
        assert!(outbound(&mut ep).is_empty());
    }

    #[test]
    fn clock_callback_feeds_tick_channel() {
        let (mut ctl, clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        clock.fire();
        clock.fire();
        let mut events = Vec::new();
        while let Ok(epoch) = ctl.ticks_rx.try_recv() {
            events.extend(ctl.on_clock_tick(epoch));
        }
        assert_eq!(events.len(), 2);
        assert_eq!(ctl.session().unwrap().remaining_seconds, 1498);
    }

    #[test]
    fn orphaned_ticks_are_dropped() {
        let (mut ctl, clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        clock.fire();
        ctl.pause();
        ctl.start();
        // tick queued by the previous clock run
        let epoch = ctl.ticks_rx.try_recv().unwrap();
        assert!(ctl.on_clock_tick(epoch).is_empty());
        assert_eq!(ctl.session().unwrap().remaining_seconds, 1500);
    }

    #[test]
    fn stale_sync_results_are_discarded() {
        let (mut ctl, _clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        let old = SyncTag {
            generation: 0,
            phase_index: 0,
        };
        ctl.apply_sync(Inbound::Created {
            tag: old,
            session_id: SessionId("old".into()),
        });
        assert!(ctl.session().unwrap().id.is_none());

        let current = SyncTag {
            generation: 1,
            phase_index: 0,
        };
        ctl.apply_sync(Inbound::Created {
            tag: current,
            session_id: SessionId("s-1".into()),
        });
        assert_eq!(ctl.session().unwrap().id, Some(SessionId("s-1".into())));

        ticks(&mut ctl, 1500);
        ctl.choose(Choice::TakeBreak);
        ctl.apply_sync(Inbound::Ended {
            tag: current,
            ack: EndAck { coin_earned: 9 },
        });
        assert_eq!(ctl.session().unwrap().coins_earned, 0);

        ctl.reset();
        let events = ctl.apply_sync(Inbound::RewardFailed {
            tag: SyncTag {
                generation: 1,
                phase_index: 1,
            },
            reason: RewardReason::CycleComplete,
            message: "down".into(),
        });
        assert!(events.is_empty());
    }

    #[test]
    fn reward_failure_becomes_notice() {
        let (mut ctl, _clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        let events = ctl.apply_sync(Inbound::RewardFailed {
            tag: SyncTag {
                generation: 1,
                phase_index: 0,
            },
            reason: RewardReason::CycleComplete,
            message: "offline".into(),
        });
        assert!(matches!(events[..], [Event::Notice { .. }]));
        assert_eq!(ctl.status(), Some(SessionStatus::Running));
    }

    #[test]
    fn disabled_rewards_dispatch_nothing() {
        let clock = ManualClock::new();
        let (sync, mut ep) = SyncHandle::channel();
        let mut ctl = SessionController::new(
            Box::new(clock),
            sync,
            TransitionPolicy::automatic(),
            RewardPolicy {
                enabled: false,
                cycle_coins: 5,
            },
        );
        ctl.create(&SessionRequest::pomodoro("Study", 2, 1)).unwrap();
        ctl.start();
        ticks(&mut ctl, 2);
        ctl.advance();
        ticks(&mut ctl, 1);
        assert_eq!(ctl.session().unwrap().cycle_count, 1);
        assert_eq!(grants(&outbound(&mut ep)), 0);
    }

    #[test]
    fn take_and_restore_hand_off_the_session() {
        let (mut ctl, clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        ticks(&mut ctl, 100);
        ctl.pause();

        let snap = ctl.take().unwrap();
        assert!(ctl.session().is_none());
        let json = snap.to_json().unwrap();

        let restored = SessionSnapshot::from_json(&json).unwrap();
        ctl.restore(restored).unwrap();
        assert_eq!(ctl.status(), Some(SessionStatus::Paused));
        assert!(!clock.is_running());
        ctl.start();
        assert_eq!(ctl.session().unwrap().remaining_seconds, 1400);
    }

    #[test]
    fn restoring_running_snapshot_restarts_clock() {
        let (mut ctl, clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        let snap = ctl.take().unwrap();
        assert!(!clock.is_running());

        ctl.restore(snap.clone()).unwrap();
        assert!(clock.is_running());
        let err = ctl.restore(snap).unwrap_err();
        assert!(matches!(err, ValidationError::SessionAlreadyLive { .. }));
    }

    #[test]
    fn restore_rejects_broken_snapshot() {
        let (mut ctl, _clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        let mut snap = ctl.take().unwrap();
        snap.session.remaining_seconds = 99_999;
        assert!(matches!(
            ctl.restore(snap),
            Err(ValidationError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn discard_resets_live_session() {
        let (mut ctl, clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        let events = ctl.discard();
        assert!(matches!(events[..], [Event::SessionReset { .. }]));
        assert!(ctl.session().is_none());
        assert!(!clock.is_running());
    }

    #[test]
    fn restored_foreign_session_ignores_results_for_discarded_one() {
        let (mut ctl, _clock, _ep) = controller(TransitionPolicy::default());
        ctl.create(&SessionRequest::pomodoro("A", 1500, 300)).unwrap();
        ctl.start();
        ctl.discard();

        let (mut other, _other_clock, _other_ep) = controller(TransitionPolicy::default());
        other.create(&SessionRequest::pomodoro("B", 1500, 300)).unwrap();
        let fresh_b = other.take().unwrap();
        assert_eq!(fresh_b.session.generation, 1);
        ctl.restore(fresh_b).unwrap();

        let first = SyncTag {
            generation: 1,
            phase_index: 0,
        };
        ctl.apply_sync(Inbound::Created {
            tag: first,
            session_id: SessionId("A-remote".into()),
        });
        ctl.apply_sync(Inbound::Ended {
            tag: first,
            ack: EndAck { coin_earned: 9 },
        });
        let s = ctl.session().unwrap();
        assert_eq!(s.goal_label, "B");
        assert!(s.id.is_none());
        assert_eq!(s.coins_earned, 0);
        assert_eq!(s.generation, 2);
    }

    #[test]
    fn restored_hand_off_keeps_accepting_its_results() {
        let (mut ctl, _clock, _ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        let snap = ctl.take().unwrap();
        ctl.restore(snap).unwrap();

        ctl.apply_sync(Inbound::Created {
            tag: SyncTag {
                generation: 1,
                phase_index: 0,
            },
            session_id: SessionId("s-1".into()),
        });
        assert_eq!(ctl.session().unwrap().id, Some(SessionId("s-1".into())));
    }

    #[tokio::test]
    async fn flush_ends_remote_sync_but_not_local_work() {
        let (mut ctl, _clock, mut ep) = controller(TransitionPolicy::default());
        pomodoro(&mut ctl);
        ctl.flush(std::time::Duration::from_millis(10)).await;
        assert!(ctl.sync.is_closed());

        ctl.discard();
        ctl.create(&SessionRequest::pomodoro("After", 60, 60)).unwrap();
        ctl.start();
        assert_eq!(ctl.status(), Some(SessionStatus::Running));

        let msgs = outbound(&mut ep);
        assert_eq!(msgs.len(), 2);
        assert!(matches!(msgs[0], Outbound::Create { .. }));
    }

    proptest! {
        #[test]
        fn n_ticks_decrement_by_n(total in 1u64..400, n in 0u64..400) {
            let (mut ctl, _clock, _ep) = controller(TransitionPolicy::default());
            ctl.create(&SessionRequest::pomodoro("Prop", total, 60)).unwrap();
            ctl.start();
            ticks(&mut ctl, n);
            let s = ctl.session().unwrap();
            prop_assert_eq!(s.remaining_seconds, total.saturating_sub(n));
            prop_assert_eq!(s.elapsed_seconds, n.min(total));
            if n >= total {
                prop_assert_eq!(s.status, SessionStatus::PhaseComplete);
            }
        }
    }
}
