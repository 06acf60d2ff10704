//! Outbound sync queue.
//!
//! The controller pushes [`Outbound`] messages without waiting. A single
//! worker task drains them in order, calls the transport and reward
//! ledger, and reports results back as [`Inbound`] messages which the
//! controller applies (or drops as stale) on its own thread.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::SessionId;
use crate::sync::transport::{RewardDispatcher, SessionTransport};
use crate::sync::types::{Inbound, Outbound, RewardEvent, SyncTag};

/// Controller side of the sync channels.
#[derive(Debug)]
pub struct SyncHandle {
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Worker side of the sync channels, or a test double standing in for it.
#[derive(Debug)]
pub struct SyncEndpoint {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub inbound: mpsc::UnboundedSender<Inbound>,
}

impl SyncHandle {
    /// A connected pair of channel ends.
    pub fn channel() -> (SyncHandle, SyncEndpoint) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            SyncHandle {
                outbound: Some(out_tx),
                inbound: in_rx,
            },
            SyncEndpoint {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }

    /// Queue a message. Never blocks; on a closed queue the message is
    /// dropped with a warning.
    pub fn send(&self, msg: Outbound) {
        let delivered = match &self.outbound {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        };
        if !delivered {
            tracing::warn!("sync queue closed, remote call dropped");
        }
    }

    /// Stop accepting new work for good. Results already in flight still
    /// arrive through [`SyncHandle::recv`] until the worker has drained.
    pub fn close(&mut self) {
        self.outbound = None;
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Next result if one is ready.
    pub fn try_recv(&mut self) -> Option<Inbound> {
        self.inbound.try_recv().ok()
    }

    /// Wait for the next result.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }
}

/// Spawn a worker on the current tokio runtime.
///
/// Must be called from within a runtime. The worker exits once every
/// [`SyncHandle`] sender has been dropped and the queue is drained.
pub fn spawn_sync(
    transport: Arc<dyn SessionTransport>,
    rewards: Arc<dyn RewardDispatcher>,
) -> (SyncHandle, JoinHandle<()>) {
    let (handle, endpoint) = SyncHandle::channel();
    let worker = SyncWorker::new(transport, rewards);
    let join = tokio::spawn(worker.run(endpoint));
    (handle, join)
}

pub struct SyncWorker {
    transport: Arc<dyn SessionTransport>,
    rewards: Arc<dyn RewardDispatcher>,
    /// Remote id from the most recent successful create, by generation.
    created: Option<(u64, SessionId)>,
}

impl SyncWorker {
    pub fn new(transport: Arc<dyn SessionTransport>, rewards: Arc<dyn RewardDispatcher>) -> Self {
        Self {
            transport,
            rewards,
            created: None,
        }
    }

    pub async fn run(mut self, mut endpoint: SyncEndpoint) {
        while let Some(msg) = endpoint.outbound.recv().await {
            if let Some(result) = self.process(msg).await {
                // Controller dropped: nothing left to apply results to.
                let _ = endpoint.inbound.send(result);
            }
        }
        tracing::debug!("sync worker drained");
    }

    /// Messages queued before the create response was applied carry no id;
    /// fill it in from the create this worker already performed.
    fn resolve(&self, generation: u64, session_id: Option<SessionId>) -> Option<SessionId> {
        let resolved = session_id.or_else(|| match &self.created {
            Some((g, id)) if *g == generation => Some(id.clone()),
            _ => None,
        });
        if resolved.is_none() {
            tracing::debug!(generation, "no remote session id, skipping call");
        }
        resolved
    }

    async fn process(&mut self, msg: Outbound) -> Option<Inbound> {
        match msg {
            Outbound::Create { tag, request } => {
                match self.transport.create_session(&request).await {
                    Ok(session_id) => {
                        tracing::debug!(%session_id, "remote session created");
                        self.created = Some((tag.generation, session_id.clone()));
                        Some(Inbound::Created { tag, session_id })
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "create session failed, continuing offline");
                        None
                    }
                }
            }
            Outbound::StartOrResume { tag, session_id } => {
                let id = self.resolve(tag.generation, session_id)?;
                if let Err(e) = self.transport.start_or_resume(&id).await {
                    tracing::warn!(session_id = %id, error = %e, "start/resume sync failed");
                }
                None
            }
            Outbound::Pause { tag, session_id } => {
                let id = self.resolve(tag.generation, session_id)?;
                if let Err(e) = self.transport.pause(&id).await {
                    tracing::warn!(session_id = %id, error = %e, "pause sync failed");
                }
                None
            }
            Outbound::StepUpdate {
                tag,
                session_id,
                step_index,
                remaining_steps,
            } => {
                let id = self.resolve(tag.generation, session_id)?;
                if let Err(e) = self
                    .transport
                    .step_update(&id, step_index, remaining_steps)
                    .await
                {
                    tracing::warn!(session_id = %id, step_index, error = %e, "step update sync failed");
                }
                None
            }
            Outbound::End {
                tag,
                session_id,
                elapsed_secs,
                settle,
            } => {
                let id = self.resolve(tag.generation, session_id);
                let ack = match &id {
                    Some(id) => match self.transport.end(id, elapsed_secs).await {
                        Ok(ack) => Some(ack),
                        Err(e) => {
                            tracing::warn!(session_id = %id, error = %e, "end sync failed");
                            None
                        }
                    },
                    None => None,
                };
                match settle {
                    Some(mut event) => {
                        event.amount = ack.map(|a| a.coin_earned).unwrap_or(0);
                        if event.session_id.is_none() {
                            event.session_id = id;
                        }
                        Some(self.grant(tag, event).await)
                    }
                    None => ack.map(|ack| Inbound::Ended { tag, ack }),
                }
            }
            Outbound::Grant { tag, mut event } => {
                if event.session_id.is_none() {
                    event.session_id = self.resolve(tag.generation, None);
                }
                Some(self.grant(tag, event).await)
            }
        }
    }

    async fn grant(&self, tag: SyncTag, event: RewardEvent) -> Inbound {
        match self.rewards.grant(&event).await {
            Ok(()) => Inbound::Granted { tag, event },
            Err(e) => {
                tracing::warn!(reason = ?event.reason, amount = event.amount, error = %e, "reward grant failed");
                Inbound::RewardFailed {
                    tag,
                    reason: event.reason,
                    message: e.to_string(),
                }
            }
        }
    }
}
