use std::sync::Arc;

use tracing::{error, info};

use jobrelay_core::config::ClosePolicy;
use jobrelay_core::RelayError;

use crate::api::{AgentApi, EndReason};
use crate::token::TokenProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    NoActiveSession,
}

/// Result of a close attempt plus whether the caller should drop the
/// session cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReport {
    pub result: Result<CloseOutcome, RelayError>,
    pub clear_cookie: bool,
}

pub struct SessionTerminator {
    api: Arc<dyn AgentApi>,
    tokens: Arc<TokenProvider>,
    policy: ClosePolicy,
}

impl SessionTerminator {
    pub fn new(api: Arc<dyn AgentApi>, tokens: Arc<TokenProvider>, policy: ClosePolicy) -> Self {
        Self { api, tokens, policy }
    }

    pub fn policy(&self) -> ClosePolicy {
        self.policy
    }

    pub async fn close_session(&self, session_id: Option<&str>) -> CloseReport {
        let Some(session_id) = session_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return CloseReport { result: Ok(CloseOutcome::NoActiveSession), clear_cookie: false };
        };

        let result = self.end(session_id).await;
        let clear_cookie = match self.policy {
            ClosePolicy::OnConfirmedClose => result.is_ok(),
            ClosePolicy::Always => true,
        };
        CloseReport { result, clear_cookie }
    }

    async fn end(&self, session_id: &str) -> Result<CloseOutcome, RelayError> {
        let credential = self.tokens.get_token().await?;
        self.api
            .end_session(credential.token(), session_id, EndReason::UserRequest)
            .await
            .map_err(|failure| {
                error!(
                    event_name = "session.close.failed",
                    session_id,
                    error = %failure,
                    "agent session close failed"
                );
                RelayError::RelayFailure(failure.to_string())
            })?;

        info!(event_name = "session.close.ended", session_id, "agent session ended");
        Ok(CloseOutcome::Closed)
    }
}
