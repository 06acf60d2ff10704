//! Remote synchronization for the session engine.
//!
//! The controller talks to the remote session API and reward ledger only
//! through the [`SessionTransport`] and [`RewardDispatcher`] traits, and
//! only via the fire-and-forget queue in [`worker`].

pub mod http;
pub mod transport;
pub mod types;
pub mod worker;

pub use http::HttpTransport;
pub use transport::{OfflineTransport, RewardDispatcher, SessionTransport};
pub use types::{CreateSession, EndAck, Inbound, Outbound, RewardEvent, RewardReason, SyncTag};
pub use worker::{spawn_sync, SyncEndpoint, SyncHandle, SyncWorker};
