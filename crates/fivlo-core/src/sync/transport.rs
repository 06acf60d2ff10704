use async_trait::async_trait;

use crate::error::TransportError;
use crate::session::SessionId;
use crate::sync::types::{CreateSession, EndAck, RewardEvent};

/// Remote session API as seen by the engine.
///
/// Every call is advisory: the controller never waits on one and never
/// rolls back local state when one fails. Implementations own their own
/// request timeout.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Register a session. Called once at creation.
    async fn create_session(&self, request: &CreateSession) -> Result<SessionId, TransportError>;

    /// Idempotent.
    async fn start_or_resume(&self, session_id: &SessionId) -> Result<(), TransportError>;

    /// Idempotent.
    async fn pause(&self, session_id: &SessionId) -> Result<(), TransportError>;

    /// Called on natural completion or explicit stop.
    async fn end(&self, session_id: &SessionId, elapsed_secs: u64) -> Result<EndAck, TransportError>;

    /// Time Attack checklist progress.
    async fn step_update(
        &self,
        _session_id: &SessionId,
        _step_index: usize,
        _remaining_steps: usize,
    ) -> Result<(), TransportError> {
        Ok(()) // default no-op
    }
}

/// Reward ledger. Failures are logged by the caller and never retried.
#[async_trait]
pub trait RewardDispatcher: Send + Sync {
    async fn grant(&self, event: &RewardEvent) -> Result<(), TransportError>;
}

/// The "remote unavailable" capability: every call fails immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

#[async_trait]
impl SessionTransport for OfflineTransport {
    async fn create_session(&self, _request: &CreateSession) -> Result<SessionId, TransportError> {
        Err(TransportError::Offline)
    }

    async fn start_or_resume(&self, _session_id: &SessionId) -> Result<(), TransportError> {
        Err(TransportError::Offline)
    }

    async fn pause(&self, _session_id: &SessionId) -> Result<(), TransportError> {
        Err(TransportError::Offline)
    }

    async fn end(&self, _session_id: &SessionId, _elapsed_secs: u64) -> Result<EndAck, TransportError> {
        Err(TransportError::Offline)
    }

    async fn step_update(
        &self,
        _session_id: &SessionId,
        _step_index: usize,
        _remaining_steps: usize,
    ) -> Result<(), TransportError> {
        Err(TransportError::Offline)
    }
}

#[async_trait]
impl RewardDispatcher for OfflineTransport {
    async fn grant(&self, _event: &RewardEvent) -> Result<(), TransportError> {
        Err(TransportError::Offline)
    }
}
