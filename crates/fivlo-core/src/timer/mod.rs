mod clock;
mod controller;
mod driver;
mod scheduler;

pub use clock::{Clock, IntervalClock, ManualClock, TickFn};
pub use controller::{Choice, RewardPolicy, SessionController, TransitionPolicy, Wakeup};
pub use driver::{Command, SessionDriver};
pub use scheduler::{fallback_plan, scheduler_for, PhaseScheduler, PomodoroScheduler, StepSequencer};
