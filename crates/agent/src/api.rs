//! Wire types and the transport seam for the CRM agent API.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use jobrelay_core::{AgentMessage, SessionVariable};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{endpoint} request failed: {message}")]
    Transport { endpoint: &'static str, message: String },
    #[error("{endpoint} returned status {status}: {body}")]
    Status { endpoint: &'static str, status: u16, body: String },
    #[error("could not decode {endpoint} response: {message}")]
    Decode { endpoint: &'static str, message: String },
}

impl ApiError {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Decode { endpoint, .. } => endpoint,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowError {
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// One element of the flow-invocation response array.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResult {
    #[serde(default)]
    pub is_success: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub output_values: Map<String, Value>,
    #[serde(default)]
    pub errors: Option<Vec<FlowError>>,
}

impl FlowResult {
    pub fn success(outputs: Value) -> Self {
        let output_values = match outputs {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { is_success: true, output_values, errors: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            output_values: Map::new(),
            errors: Some(vec![FlowError { message: Some(message.into()), ..FlowError::default() }]),
        }
    }

    /// Flow-reported error messages joined for logging.
    pub fn error_summary(&self) -> String {
        let messages: Vec<&str> = self
            .errors
            .iter()
            .flatten()
            .filter_map(|error| error.message.as_deref())
            .collect();
        if messages.is_empty() {
            "flow reported isSuccess=false".to_string()
        } else {
            messages.join("; ")
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub endpoint: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingCapabilities {
    pub chunk_types: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOpenRequest {
    pub external_session_key: String,
    pub instance_config: InstanceConfig,
    pub tz: String,
    pub variables: Vec<SessionVariable>,
    pub feature_support: String,
    pub streaming_capabilities: StreamingCapabilities,
    pub bypass_user: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOpenResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub sequence_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub message: OutboundMessage,
    pub variables: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    UserRequest,
}

impl EndReason {
    pub fn as_header_value(self) -> &'static str {
        match self {
            Self::UserRequest => "UserRequest",
        }
    }
}

/// Every CRM call the relay makes. Implemented over HTTP by
/// [`crate::http::HttpAgentApi`] and in-process by
/// [`crate::scripted::ScriptedAgentApi`].
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn exchange_token(&self) -> Result<TokenGrant, ApiError>;

    async fn invoke_flow(
        &self,
        token: &str,
        flow_name: &str,
        inputs: Value,
    ) -> Result<Vec<FlowResult>, ApiError>;

    async fn open_session(
        &self,
        token: &str,
        request: &SessionOpenRequest,
    ) -> Result<SessionOpenResponse, ApiError>;

    async fn send_message(
        &self,
        token: &str,
        session_id: &str,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ApiError>;

    async fn end_session(
        &self,
        token: &str,
        session_id: &str,
        reason: EndReason,
    ) -> Result<(), ApiError>;

    async fn open_event_stream(&self, token: &str) -> Result<ByteStream, ApiError>;
}
