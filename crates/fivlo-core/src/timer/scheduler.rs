//! Phase sequencing for both session modes.

use crate::session::{Phase, PhaseKind, Session, SessionMode};

pub trait PhaseScheduler {
    /// Phase that follows the current one, or `None` when the session is
    /// out of phases.
    fn next(&self, session: &Session) -> Option<Phase>;
}

/// Focus and break alternate forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PomodoroScheduler {
    pub focus_secs: u64,
    pub break_secs: u64,
}

impl PomodoroScheduler {
    pub fn focus_phase(&self) -> Phase {
        Phase::focus(self.focus_secs)
    }

    pub fn break_phase(&self) -> Phase {
        Phase::rest(self.break_secs)
    }
}

impl PhaseScheduler for PomodoroScheduler {
    fn next(&self, session: &Session) -> Option<Phase> {
        match session.current_phase().map(|p| p.kind) {
            Some(PhaseKind::Focus) => Some(self.break_phase()),
            _ => Some(self.focus_phase()),
        }
    }
}

/// Walks the fixed Time Attack step list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSequencer;

impl PhaseScheduler for StepSequencer {
    fn next(&self, session: &Session) -> Option<Phase> {
        session
            .phase_sequence
            .get(session.current_phase_index + 1)
            .cloned()
    }
}

pub fn scheduler_for(mode: &SessionMode) -> Box<dyn PhaseScheduler + Send> {
    match *mode {
        SessionMode::Pomodoro {
            focus_secs,
            break_secs,
        } => Box::new(PomodoroScheduler {
            focus_secs,
            break_secs,
        }),
        SessionMode::TimeAttack => Box::new(StepSequencer),
    }
}

/// Default subdivision used when no AI step plan is available:
/// prepare 10 %, the goal itself 80 %, wrap up 10 %. Zero-length
/// steps are dropped.
pub fn fallback_plan(goal: &str, total_minutes: u64) -> Vec<Phase> {
    let total_secs = total_minutes.saturating_mul(60);
    let edge = (total_minutes / 10).saturating_mul(60);
    let core_minutes = total_minutes / 10 * 8 + total_minutes % 10 * 8 / 10;
    let core = core_minutes.saturating_mul(60);
    let core = if edge == 0 && core == 0 { total_secs } else { core };
    [
        Phase::step("Prepare", edge),
        Phase::step(goal.trim(), core),
        Phase::step("Wrap up", edge),
    ]
    .into_iter()
    .filter(|p| p.total_seconds > 0)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRequest;

    fn pomodoro() -> Session {
        Session::create(&SessionRequest::pomodoro("Study", 1500, 300)).unwrap()
    }

    #[test]
    fn break_follows_focus_and_focus_follows_break() {
        let sched = PomodoroScheduler {
            focus_secs: 1500,
            break_secs: 300,
        };
        let mut s = pomodoro();
        let next = sched.next(&s).unwrap();
        assert_eq!(next, Phase::rest(300));

        s.phase_sequence.push(next);
        s.current_phase_index = 1;
        assert_eq!(sched.next(&s).unwrap(), Phase::focus(1500));
    }

    #[test]
    fn step_sequencer_runs_out() {
        let steps = vec![Phase::step("a", 5), Phase::step("b", 10)];
        let mut s = Session::create(&SessionRequest::time_attack("Room", steps)).unwrap();
        assert_eq!(StepSequencer.next(&s).unwrap().name, "b");
        s.current_phase_index = 1;
        assert!(StepSequencer.next(&s).is_none());
    }

    #[test]
    fn scheduler_for_matches_mode() {
        let s = pomodoro();
        assert_eq!(scheduler_for(&s.mode).next(&s).unwrap().kind, PhaseKind::Break);
    }

    #[test]
    fn fallback_plan_splits_ten_eighty_ten() {
        let plan = fallback_plan("Clean room", 30);
        let secs: Vec<u64> = plan.iter().map(|p| p.total_seconds).collect();
        assert_eq!(secs, vec![180, 1440, 180]);
        assert_eq!(plan[1].name, "Clean room");
    }

    #[test]
    fn fallback_plan_drops_empty_edges() {
        let plan = fallback_plan("Quick", 5);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].total_seconds, 4 * 60);

        let tiny = fallback_plan("Tiny", 1);
        assert_eq!(tiny.len(), 1);
        assert_eq!(tiny[0].total_seconds, 60);
    }

    #[test]
    fn fallback_plan_saturates_huge_budgets() {
        let plan = fallback_plan("x", u64::MAX / 4);
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|p| p.total_seconds == u64::MAX));

        let request = SessionRequest::time_attack("x", plan);
        let session = Session::create(&request).unwrap();
        assert_eq!(session.planned_total_seconds(), u64::MAX);
    }
}
