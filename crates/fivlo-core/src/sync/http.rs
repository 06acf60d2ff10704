//! REST client for the FIVLO session and coin APIs.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use crate::error::TransportError;
use crate::session::{SessionId, SessionMode};
use crate::storage::RemoteConfig;
use crate::sync::transport::{RewardDispatcher, SessionTransport};
use crate::sync::types::{CreateSession, EndAck, RewardEvent, RewardReason};

/// `reqwest`-backed transport. One client serves both the session API and
/// the reward ledger.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration, token: Option<String>) -> Result<Self, TransportError> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_config(remote: &RemoteConfig) -> Result<Self, TransportError> {
        Self::new(&remote.base_url, remote.timeout(), remote.bearer_token())
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base_url.join(path)?)
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> Result<Value, TransportError> {
        let url = self.endpoint(path)?;
        let mut req = self.client.request(method, url).json(&body);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Lifecycle changes share the pomodoro route for both modes.
    async fn set_status(&self, session_id: &SessionId, action: &str) -> Result<(), TransportError> {
        let path = format!("pomodoro/sessions/{}/{action}", session_id.as_str());
        self.send(reqwest::Method::PUT, &path, json!({}))
            .await
            .map(|_| ())
    }
}

#[derive(Debug, Serialize)]
struct PomodoroStart<'a> {
    goal: &'a str,
    color: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TimeAttackStart<'a> {
    title: &'a str,
    /// Whole minutes, rounded up.
    total_time: u64,
    description: &'a str,
}

/// Pull a session id out of a create response. The API has answered
/// `{"session": {"id": ..}}`, `{"sessionId": ..}` and `{"id": ..}`, with
/// string or numeric values.
fn extract_session_id(body: &Value) -> Option<SessionId> {
    let raw = body
        .get("sessionId")
        .or_else(|| body.get("id"))
        .or_else(|| body.get("session").and_then(|s| s.get("id")))?;
    match raw {
        Value::String(s) if !s.is_empty() => Some(SessionId(s.clone())),
        Value::Number(n) => Some(SessionId(n.to_string())),
        _ => None,
    }
}

fn to_body<T: Serialize>(body: &T) -> Result<Value, TransportError> {
    serde_json::to_value(body).map_err(|e| TransportError::Malformed(e.to_string()))
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn create_session(&self, request: &CreateSession) -> Result<SessionId, TransportError> {
        let (path, payload) = match request.mode {
            Some(SessionMode::TimeAttack) => (
                "time-attack/sessions",
                to_body(&TimeAttackStart {
                    title: &request.goal_label,
                    total_time: request.total_duration.div_ceil(60),
                    description: "",
                })?,
            ),
            _ => (
                "pomodoro/sessions/start",
                to_body(&PomodoroStart {
                    goal: &request.goal_label,
                    color: &request.color_tag,
                    description: "",
                })?,
            ),
        };
        let body = self.send(reqwest::Method::POST, path, payload).await?;
        extract_session_id(&body)
            .ok_or_else(|| TransportError::Malformed("create response carries no session id".into()))
    }

    async fn start_or_resume(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.set_status(session_id, "start").await
    }

    async fn pause(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.set_status(session_id, "pause").await
    }

    async fn end(&self, session_id: &SessionId, elapsed_secs: u64) -> Result<EndAck, TransportError> {
        let body = self
            .send(
                reqwest::Method::POST,
                "pomodoro/sessions/end",
                json!({ "sessionId": session_id.as_str(), "actualDuration": elapsed_secs }),
            )
            .await?;
        if body.is_null() {
            return Ok(EndAck::default());
        }
        serde_json::from_value(body).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    // The API has no per-step progress route; step_update stays a no-op.
}

#[async_trait]
impl RewardDispatcher for HttpTransport {
    /// Cycle rewards go to the pomodoro coin route keyed by session.
    /// Time Attack completions go to the general ledger.
    async fn grant(&self, event: &RewardEvent) -> Result<(), TransportError> {
        let source = event.reason.source();
        let (path, body) = match event.reason {
            RewardReason::CycleComplete => (
                "pomodoro/coins",
                json!({
                    "goalId": event.session_id.as_ref().map(SessionId::as_str),
                    "amount": event.amount,
                    "source": source,
                    "description": "pomodoro cycle complete",
                }),
            ),
            RewardReason::SessionComplete => (
                "coins/earn",
                json!({
                    "source": source,
                    "amount": event.amount,
                    "description": "time attack complete",
                }),
            ),
        };
        self.send(reqwest::Method::POST, path, body).await.map(|_| ())
    }
}
