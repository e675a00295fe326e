use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Duration, Utc};
use jobrelay_agent::TokenProvider;
use jobrelay_core::Clock;
use serde::Serialize;

/// After a failed token exchange, health checks reuse the failure for this long
/// instead of hitting the CRM token endpoint again.
pub const FAILURE_HOLD_SECS: i64 = 15;

#[derive(Clone, Debug)]
struct CrmFailure {
    at: DateTime<Utc>,
    detail: String,
}

#[derive(Clone)]
pub struct HealthState {
    tokens: Arc<TokenProvider>,
    clock: Arc<dyn Clock>,
    last_failure: Arc<Mutex<Option<CrmFailure>>>,
}

impl HealthState {
    pub fn new(tokens: Arc<TokenProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { tokens, clock, last_failure: Arc::new(Mutex::new(None)) }
    }

    fn held_failure(&self, now: DateTime<Utc>) -> Option<CrmFailure> {
        let last = self.last_failure.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        last.clone().filter(|failure| now < failure.at + Duration::seconds(FAILURE_HOLD_SECS))
    }

    fn record(&self, failure: Option<CrmFailure>) {
        *self.last_failure.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = failure;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub crm: HealthCheck,
    pub checked_at: String,
}

pub fn router(tokens: Arc<TokenProvider>, clock: Arc<dyn Clock>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState::new(tokens, clock))
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let crm = crm_check(&state).await;
    let ready = crm.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "jobrelay-server runtime initialized".to_string(),
        },
        crm,
        checked_at: state.clock.now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn crm_check(state: &HealthState) -> HealthCheck {
    let now = state.clock.now();
    if let Some(failure) = state.held_failure(now) {
        return HealthCheck {
            status: "degraded",
            detail: format!("{} (as of {})", failure.detail, failure.at.to_rfc3339()),
        };
    }

    // A fresh cached credential is served without an exchange.
    match state.tokens.get_token().await {
        Ok(_) => {
            state.record(None);
            HealthCheck { status: "ready", detail: "crm credential available".to_string() }
        }
        Err(error) => {
            let detail = format!("crm token exchange failed: {error}");
            state.record(Some(CrmFailure { at: now, detail: detail.clone() }));
            HealthCheck { status: "degraded", detail }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use chrono::{Duration, TimeZone, Utc};
    use jobrelay_agent::{ApiCall, ApiError, ScriptedAgentApi, TokenProvider};
    use jobrelay_core::{ManualClock, SystemClock};

    use crate::health::{health, HealthState, FAILURE_HOLD_SECS};

    fn state(api: ScriptedAgentApi) -> State<HealthState> {
        State(HealthState::new(
            Arc::new(TokenProvider::new(Arc::new(api), Arc::new(SystemClock), 60)),
            Arc::new(SystemClock),
        ))
    }

    fn failing_api() -> ScriptedAgentApi {
        ScriptedAgentApi::new().with_token_error(ApiError::Transport {
            endpoint: "token",
            message: "dns error".to_string(),
        })
    }

    #[tokio::test]
    async fn health_returns_ready_when_crm_token_is_available() {
        let (status, Json(payload)) = health(state(ScriptedAgentApi::new())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.crm.status, "ready");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_token_exchange_fails() {
        let (status, Json(payload)) = health(state(failing_api())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert!(payload.crm.detail.contains("dns error"));
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn repeated_checks_reuse_a_recent_failure() {
        let api = Arc::new(failing_api());
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("valid time");
        let clock = Arc::new(ManualClock::new(start));
        let tokens = Arc::new(TokenProvider::new(api.clone(), clock.clone(), 60));
        let state = HealthState::new(tokens, clock.clone());
        let exchanges = || {
            api.calls().iter().filter(|call| matches!(call, ApiCall::ExchangeToken)).count()
        };

        for _ in 0..5 {
            let (status, _) = health(State(state.clone())).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        }
        assert_eq!(exchanges(), 1);

        clock.advance(Duration::seconds(FAILURE_HOLD_SECS));
        let (status, Json(payload)) = health(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(payload.crm.detail.contains("dns error"));
        assert_eq!(exchanges(), 2);
    }
}
