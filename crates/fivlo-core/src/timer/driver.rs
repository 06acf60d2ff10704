//! Async host loop around a [`SessionController`].
//!
//! The driver multiplexes clock ticks, sync results, user commands and the
//! auto-advance timer, and forwards every emitted [`Event`]. It returns the
//! controller once the session reaches a terminal state or on `Quit`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::controller::{Choice, SessionController, Wakeup};
use crate::events::Event;
use crate::session::{Pending, Resolution, SessionStatus};

/// User input accepted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Choose(Choice),
    /// Apply a pending automatic transition without waiting for the delay.
    Advance,
    /// End the current phase now.
    CompletePhase,
    /// Emit a full state snapshot.
    Status,
    Stop,
    Quit,
}

enum Step {
    Wake(Option<Wakeup>),
    Command(Option<Command>),
    AutoAdvance,
}

pub struct SessionDriver {
    controller: SessionController,
    auto_at: Option<Instant>,
}

impl SessionDriver {
    pub fn new(controller: SessionController) -> Self {
        Self {
            controller,
            auto_at: None,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Run until the session is terminal or `Quit` arrives. A closed
    /// command channel only stops input; the session keeps running.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        events: mpsc::UnboundedSender<Event>,
    ) -> SessionController {
        let mut commands_open = true;
        loop {
            if self.is_terminal() {
                break;
            }
            self.schedule_auto_advance();
            let deadline = self.auto_at;

            let step = tokio::select! {
                wake = self.controller.wakeup() => Step::Wake(wake),
                cmd = commands.recv(), if commands_open => Step::Command(cmd),
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Step::AutoAdvance
                }
            };

            let emitted = match step {
                Step::Wake(Some(wake)) => self.controller.handle(wake),
                Step::Wake(None) => {
                    tracing::debug!("controller channels closed");
                    break;
                }
                Step::Command(Some(Command::Quit)) => break,
                Step::Command(Some(cmd)) => self.apply(cmd),
                Step::Command(None) => {
                    commands_open = false;
                    Vec::new()
                }
                Step::AutoAdvance => {
                    self.auto_at = None;
                    self.controller.advance()
                }
            };
            for event in emitted {
                let _ = events.send(event);
            }
        }
        self.controller
    }

    fn apply(&mut self, cmd: Command) -> Vec<Event> {
        tracing::debug!(?cmd, "command");
        match cmd {
            Command::Start => self.controller.start(),
            Command::Pause => self.controller.pause(),
            Command::Resume => self.controller.resume(),
            Command::Choose(choice) => self.controller.choose(choice),
            Command::Advance => self.controller.advance(),
            Command::CompletePhase => self.controller.complete_phase(),
            Command::Status => self.controller.state_event().into_iter().collect(),
            Command::Stop => self.controller.stop(),
            Command::Quit => Vec::new(),
        }
    }

    fn is_terminal(&self) -> bool {
        self.controller
            .status()
            .map(|s| s.is_terminal())
            .unwrap_or(true)
    }

    fn schedule_auto_advance(&mut self) {
        let waiting = self.controller.status() == Some(SessionStatus::PhaseComplete)
            && matches!(
                self.controller.pending(),
                Some(Pending {
                    resolution: Resolution::Auto,
                    ..
                })
            );
        if !waiting {
            self.auto_at = None;
        } else if self.auto_at.is_none() {
            let delay = Duration::from_secs(self.controller.transitions().auto_advance_delay_secs);
            self.auto_at = Some(Instant::now() + delay);
        }
    }
}
