use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use jobrelay_core::RelayError;

use crate::api::{AgentApi, ByteStream};
use crate::token::TokenProvider;

/// Proxies the CRM server-sent event stream chunk for chunk.
///
/// No reconnect happens here; when the upstream ends or fails the downstream
/// body ends too and the browser's EventSource reconnects on its own.
pub struct EventStreamBridge {
    api: Arc<dyn AgentApi>,
    tokens: Arc<TokenProvider>,
}

impl EventStreamBridge {
    pub fn new(api: Arc<dyn AgentApi>, tokens: Arc<TokenProvider>) -> Self {
        Self { api, tokens }
    }

    pub async fn open_stream(&self) -> Result<ByteStream, RelayError> {
        let credential = self.tokens.get_token().await?;
        let upstream = self.api.open_event_stream(credential.token()).await.map_err(|failure| {
            error!(
                event_name = "events.stream.open_failed",
                error = %failure,
                "agent event stream could not be opened"
            );
            RelayError::RelayFailure(failure.to_string())
        })?;

        info!(event_name = "events.stream.opened", "agent event stream opened");
        Ok(upstream
            .inspect(|chunk| match chunk {
                Ok(bytes) => debug!(event_name = "events.stream.chunk", bytes = bytes.len()),
                Err(failure) => warn!(
                    event_name = "events.stream.upstream_error",
                    error = %failure,
                    "agent event stream failed mid-flight"
                ),
            })
            .boxed())
    }
}
