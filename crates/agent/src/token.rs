use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use jobrelay_core::{Clock, Credential, RelayError};

use crate::api::AgentApi;

/// Caches the CRM bearer credential and refreshes it on demand.
///
/// The cache lock is held across the exchange, so callers that find the
/// credential expired at the same time wait for one refresh instead of each
/// starting their own.
pub struct TokenProvider {
    api: Arc<dyn AgentApi>,
    clock: Arc<dyn Clock>,
    skew: Duration,
    cache: Mutex<Option<Credential>>,
}

impl TokenProvider {
    pub fn new(api: Arc<dyn AgentApi>, clock: Arc<dyn Clock>, skew_secs: u64) -> Self {
        let skew = Duration::seconds(skew_secs.min(86_400) as i64);
        Self { api, clock, skew, cache: Mutex::new(None) }
    }

    pub async fn get_token(&self) -> Result<Credential, RelayError> {
        let mut cache = self.cache.lock().await;

        if let Some(credential) = cache.as_ref() {
            if credential.is_fresh(self.clock.now(), self.skew) {
                debug!(event_name = "crm.token.cache_hit", "reusing cached crm credential");
                return Ok(credential.clone());
            }
        }

        let grant = self.api.exchange_token().await.map_err(|failure| {
            error!(
                event_name = "crm.token.exchange_failed",
                endpoint = failure.endpoint(),
                error = %failure,
                "crm token exchange failed"
            );
            RelayError::AuthFailure(failure.to_string())
        })?;

        if grant.access_token.trim().is_empty() {
            error!(event_name = "crm.token.empty", "token endpoint returned empty access token");
            return Err(RelayError::AuthFailure(
                "token endpoint returned empty access token".to_string(),
            ));
        }

        let credential = Credential::issued(
            grant.access_token,
            self.clock.now(),
            grant.expires_in.unwrap_or_default(),
        );
        info!(
            event_name = "crm.token.refreshed",
            expires_at = %credential.expires_at(),
            "crm credential refreshed"
        );
        *cache = Some(credential.clone());
        Ok(credential)
    }

    /// Drops the cached credential so the next call exchanges again.
    pub async fn invalidate(&self) {
        self.cache.lock().await.take();
    }
}
