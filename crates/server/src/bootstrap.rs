use std::sync::Arc;

use jobrelay_agent::{AgentServices, ApiError, HttpAgentApi};
use jobrelay_core::config::AppConfig;
use jobrelay_core::{SessionCookieCodec, SystemClock};
use thiserror::Error;
use tracing::info;

use crate::routes::RelayState;

pub struct Application {
    pub config: AppConfig,
    pub services: Arc<AgentServices>,
    pub cookies: SessionCookieCodec,
}

impl Application {
    pub fn relay_state(&self) -> RelayState {
        RelayState::new(self.services.clone(), self.cookies.clone())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("crm http client could not be built: {0}")]
    CrmClient(#[source] ApiError),
}

/// Builds the relay services from an already validated config.
pub fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let api = HttpAgentApi::from_config(&config.crm).map_err(BootstrapError::CrmClient)?;
    info!(
        event_name = "system.bootstrap.crm_client_ready",
        correlation_id = "bootstrap",
        crm_domain = %api.endpoints().domain(),
        "crm http client constructed"
    );

    let services = Arc::new(AgentServices::new(Arc::new(api), Arc::new(SystemClock), &config));
    let cookies = SessionCookieCodec::from_config(&config.session);

    Ok(Application { config, services, cookies })
}
