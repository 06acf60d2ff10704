//! # FIVLO Core Library
//!
//! This library provides the focus-session engine behind FIVLO: Pomodoro
//! cycles and step-by-step Time Attack runs. Every operation is available
//! through the standalone CLI binary, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer**: a tick-driven state machine. A [`Clock`] delivers 1 Hz ticks,
//!   a [`PhaseScheduler`] decides what follows each phase and the
//!   [`SessionController`] owns every transition.
//! - **Sync**: remote session bookkeeping and coin rewards, pushed
//!   fire-and-forget onto a background worker. The local timer never waits
//!   on the network.
//! - **Storage**: TOML-based configuration.
//!
//! ## Key Components
//!
//! - [`SessionController`]: lifecycle state machine
//! - [`SessionDriver`]: async host loop with auto-advance
//! - [`HttpTransport`]: REST implementation of [`SessionTransport`] and
//!   [`RewardDispatcher`]
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod sync;
pub mod timer;

pub use error::{ConfigError, CoreError, TransportError, ValidationError};
pub use events::Event;
pub use session::{
    Pending, PendingDecision, Phase, PhaseKind, Resolution, Session, SessionId, SessionMode,
    SessionRequest, SessionSnapshot, SessionStatus,
};
pub use storage::{Config, RemoteConfig};
pub use sync::{
    spawn_sync, HttpTransport, OfflineTransport, RewardDispatcher, RewardEvent, RewardReason,
    SessionTransport, SyncHandle,
};
pub use timer::{
    fallback_plan, Choice, Clock, Command, IntervalClock, ManualClock, PhaseScheduler,
    RewardPolicy, SessionController, SessionDriver, TransitionPolicy,
};
