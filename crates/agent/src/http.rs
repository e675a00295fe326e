//! reqwest-backed [`AgentApi`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use jobrelay_core::config::CrmConfig;

use crate::api::{
    AgentApi, ApiError, ByteStream, EndReason, FlowResult, MessageRequest, MessageResponse,
    SessionOpenRequest, SessionOpenResponse, TokenGrant,
};
use crate::endpoints::CrmEndpoints;

const END_REASON_HEADER: &str = "x-session-end-reason";
const ORG_ID_HEADER: &str = "X-Org-Id";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Clone)]
pub struct HttpAgentApi {
    client: Client,
    endpoints: CrmEndpoints,
    client_id: String,
    client_secret: SecretString,
    org_id: Option<String>,
    request_timeout: Duration,
}

impl HttpAgentApi {
    pub fn from_config(config: &CrmConfig) -> Result<Self, ApiError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder().connect_timeout(request_timeout).build().map_err(|error| {
            ApiError::Transport { endpoint: "client", message: error.to_string() }
        })?;

        Ok(Self {
            client,
            endpoints: CrmEndpoints::from_config(config),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            org_id: config.org_id.clone().filter(|value| !value.trim().is_empty()),
            request_timeout,
        })
    }

    pub fn endpoints(&self) -> &CrmEndpoints {
        &self.endpoints
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|error| ApiError::Transport { endpoint, message: error.to_string() })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            endpoint,
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(endpoint, request.timeout(self.request_timeout)).await?;
        response
            .json::<T>()
            .await
            .map_err(|error| ApiError::Decode { endpoint, message: error.to_string() })
    }
}

#[async_trait]
impl AgentApi for HttpAgentApi {
    async fn exchange_token(&self) -> Result<TokenGrant, ApiError> {
        let request = self.client.post(self.endpoints.token()).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ]);
        self.read_json("token", request).await
    }

    async fn invoke_flow(
        &self,
        token: &str,
        flow_name: &str,
        inputs: Value,
    ) -> Result<Vec<FlowResult>, ApiError> {
        let request = self
            .client
            .post(self.endpoints.flow(flow_name))
            .bearer_auth(token)
            .json(&json!({ "inputs": [inputs] }));
        self.read_json("flow", request).await
    }

    async fn open_session(
        &self,
        token: &str,
        request: &SessionOpenRequest,
    ) -> Result<SessionOpenResponse, ApiError> {
        let request =
            self.client.post(self.endpoints.session_open()).bearer_auth(token).json(request);
        self.read_json("session_open", request).await
    }

    async fn send_message(
        &self,
        token: &str,
        session_id: &str,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ApiError> {
        let request = self
            .client
            .post(self.endpoints.messages(session_id))
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .json(request);
        self.read_json("message", request).await
    }

    async fn end_session(
        &self,
        token: &str,
        session_id: &str,
        reason: EndReason,
    ) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.endpoints.session(session_id))
            .bearer_auth(token)
            .header(END_REASON_HEADER, reason.as_header_value())
            .timeout(self.request_timeout);
        self.send("session_end", request).await.map(|_| ())
    }

    async fn open_event_stream(&self, token: &str) -> Result<ByteStream, ApiError> {
        let mut request = self
            .client
            .get(self.endpoints.events())
            .bearer_auth(token)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json");
        if let Some(org_id) = &self.org_id {
            request = request.header(ORG_ID_HEADER, org_id);
        }

        let response = self.send("events", request).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|error| ApiError::Transport {
                    endpoint: "events",
                    message: error.to_string(),
                })
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use jobrelay_core::config::AppConfig;

    use super::HttpAgentApi;

    #[test]
    fn blank_org_id_is_not_forwarded() {
        let mut config = AppConfig::default().crm;
        config.domain = "https://acme.my.salesforce.com".to_string();
        config.org_id = Some("  ".to_string());

        let api = HttpAgentApi::from_config(&config).expect("client builds");
        assert!(api.org_id.is_none());
        assert_eq!(api.endpoints().domain(), "https://acme.my.salesforce.com");
    }
}
