//! Agent relay - the CRM-facing half of jobrelay.
//!
//! Every browser request that reaches the CRM goes through one of four
//! components, all sharing one [`token::TokenProvider`]:
//!
//! 1. **Session open** (`session`) - resolve the applicant through two flows,
//!    then open an agent session seeded with their context
//! 2. **Message relay** (`relay`) - forward one user message, return the reply
//! 3. **Session close** (`terminate`) - end the agent session
//! 4. **Event stream** (`events`) - proxy the CRM server-sent event stream
//!
//! # Key Types
//!
//! - `AgentApi` - transport seam; `HttpAgentApi` in production,
//!   `ScriptedAgentApi` in tests
//! - `AgentServices` - the four components wired from one config
//!
//! The relay holds no per-session state. The session id travels in the
//! signed cookie and is handed in on every call.

use std::sync::Arc;

use jobrelay_core::config::AppConfig;
use jobrelay_core::Clock;

pub mod api;
pub mod endpoints;
pub mod events;
pub mod flows;
pub mod http;
pub mod relay;
pub mod scripted;
pub mod session;
pub mod terminate;
pub mod token;

pub use api::{AgentApi, ApiError};
pub use events::EventStreamBridge;
pub use http::HttpAgentApi;
pub use relay::{MessageOutcome, MessageRelay, MAX_MESSAGE_CHARS};
pub use scripted::{ApiCall, ScriptedAgentApi};
pub use session::{SessionCoordinator, SessionSettings};
pub use terminate::{CloseOutcome, CloseReport, SessionTerminator};
pub use token::TokenProvider;

pub struct AgentServices {
    pub tokens: Arc<TokenProvider>,
    pub sessions: SessionCoordinator,
    pub messages: MessageRelay,
    pub terminator: SessionTerminator,
    pub events: EventStreamBridge,
}

impl AgentServices {
    pub fn new(api: Arc<dyn AgentApi>, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        let tokens =
            Arc::new(TokenProvider::new(api.clone(), clock.clone(), config.crm.token_skew_secs));
        Self {
            sessions: SessionCoordinator::new(
                api.clone(),
                tokens.clone(),
                SessionSettings::from_config(&config.crm),
            ),
            messages: MessageRelay::new(api.clone(), tokens.clone(), clock),
            terminator: SessionTerminator::new(
                api.clone(),
                tokens.clone(),
                config.session.close_policy,
            ),
            events: EventStreamBridge::new(api, tokens.clone()),
            tokens,
        }
    }
}
