//! Shared fixtures for the session flow tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fivlo_core::sync::{CreateSession, EndAck, RewardDispatcher, SessionTransport};
use fivlo_core::{
    spawn_sync, ManualClock, RewardEvent, RewardPolicy, SessionController, SessionId,
    TransitionPolicy, TransportError,
};

/// Transport that answers every call and records it.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
    end_coins: u64,
}

impl Recorder {
    pub fn with_end_coins(end_coins: u64) -> Self {
        Self {
            end_coins,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SessionTransport for Recorder {
    async fn create_session(&self, request: &CreateSession) -> Result<SessionId, TransportError> {
        self.record(format!("create:{}:{}", request.goal_label, request.total_duration));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionId(format!("s-{n}")))
    }

    async fn start_or_resume(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.record(format!("start:{session_id}"));
        Ok(())
    }

    async fn pause(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.record(format!("pause:{session_id}"));
        Ok(())
    }

    async fn end(&self, session_id: &SessionId, elapsed_secs: u64) -> Result<EndAck, TransportError> {
        self.record(format!("end:{session_id}:{elapsed_secs}"));
        Ok(EndAck {
            coin_earned: self.end_coins,
        })
    }

    async fn step_update(
        &self,
        session_id: &SessionId,
        step_index: usize,
        remaining_steps: usize,
    ) -> Result<(), TransportError> {
        self.record(format!("step:{session_id}:{step_index}:{remaining_steps}"));
        Ok(())
    }
}

#[async_trait]
impl RewardDispatcher for Recorder {
    async fn grant(&self, event: &RewardEvent) -> Result<(), TransportError> {
        let id = event
            .session_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();
        self.record(format!("grant:{:?}:{}:{id}", event.reason, event.amount));
        Ok(())
    }
}

/// Controller wired to a background sync worker over `recorder`, driven by
/// a manual clock.
pub fn recorded_controller(
    recorder: Arc<Recorder>,
    transitions: TransitionPolicy,
) -> (SessionController, ManualClock) {
    let transport: Arc<dyn SessionTransport> = recorder.clone();
    let rewards: Arc<dyn RewardDispatcher> = recorder;
    controller_over(transport, rewards, transitions)
}

pub fn controller_over(
    transport: Arc<dyn SessionTransport>,
    rewards: Arc<dyn RewardDispatcher>,
    transitions: TransitionPolicy,
) -> (SessionController, ManualClock) {
    let clock = ManualClock::new();
    let (sync, _join) = spawn_sync(transport, rewards);
    let ctl = SessionController::new(
        Box::new(clock.clone()),
        sync,
        transitions,
        RewardPolicy::default(),
    );
    (ctl, clock)
}

/// Feed `n` ticks straight into the controller.
pub fn tick_n(ctl: &mut SessionController, n: u64) {
    for _ in 0..n {
        ctl.tick();
    }
}
