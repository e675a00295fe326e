//! In-process [`AgentApi`] that answers from canned responses and records
//! every call it receives. Used by the relay and router tests in place of a
//! live CRM.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;

use jobrelay_core::AgentMessage;

use crate::api::{
    AgentApi, ApiError, ByteStream, EndReason, FlowResult, MessageRequest, MessageResponse,
    SessionOpenRequest, SessionOpenResponse, TokenGrant,
};

pub const SCRIPTED_TOKEN: &str = "scripted-token";
pub const SCRIPTED_SESSION_ID: &str = "scripted-session";

#[derive(Clone, Debug, PartialEq)]
pub enum ApiCall {
    ExchangeToken,
    InvokeFlow { flow_name: String, inputs: Value },
    OpenSession(SessionOpenRequest),
    SendMessage { session_id: String, request: MessageRequest },
    EndSession { session_id: String, reason: EndReason },
    OpenEventStream,
}

pub struct ScriptedAgentApi {
    token: Result<TokenGrant, ApiError>,
    token_delay: Option<Duration>,
    flows: HashMap<String, Result<Vec<FlowResult>, ApiError>>,
    session: Result<SessionOpenResponse, ApiError>,
    reply: Result<MessageResponse, ApiError>,
    end: Result<(), ApiError>,
    events: Result<Vec<Result<Bytes, ApiError>>, ApiError>,
    calls: Mutex<Vec<ApiCall>>,
}

impl Default for ScriptedAgentApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAgentApi {
    pub fn new() -> Self {
        Self {
            token: Ok(TokenGrant { access_token: SCRIPTED_TOKEN.to_string(), expires_in: Some(3600) }),
            token_delay: None,
            flows: HashMap::new(),
            session: Ok(SessionOpenResponse {
                session_id: Some(SCRIPTED_SESSION_ID.to_string()),
                messages: Vec::new(),
            }),
            reply: Ok(MessageResponse::default()),
            end: Ok(()),
            events: Ok(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_token(mut self, access_token: &str, expires_in: Option<i64>) -> Self {
        self.token = Ok(TokenGrant { access_token: access_token.to_string(), expires_in });
        self
    }

    pub fn with_token_error(mut self, error: ApiError) -> Self {
        self.token = Err(error);
        self
    }

    /// Makes every token exchange take `delay` before answering.
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    /// Answers flow `flow_name` with a single successful result carrying `outputs`.
    pub fn with_flow_outputs(self, flow_name: &str, outputs: Value) -> Self {
        self.with_flow_results(flow_name, vec![FlowResult::success(outputs)])
    }

    pub fn with_flow_results(mut self, flow_name: &str, results: Vec<FlowResult>) -> Self {
        self.flows.insert(flow_name.to_string(), Ok(results));
        self
    }

    pub fn with_flow_error(mut self, flow_name: &str, error: ApiError) -> Self {
        self.flows.insert(flow_name.to_string(), Err(error));
        self
    }

    pub fn with_session(mut self, session_id: Option<&str>, messages: Vec<AgentMessage>) -> Self {
        self.session =
            Ok(SessionOpenResponse { session_id: session_id.map(str::to_string), messages });
        self
    }

    pub fn with_session_error(mut self, error: ApiError) -> Self {
        self.session = Err(error);
        self
    }

    pub fn with_reply(mut self, messages: Vec<AgentMessage>) -> Self {
        self.reply = Ok(MessageResponse { messages });
        self
    }

    pub fn with_reply_error(mut self, error: ApiError) -> Self {
        self.reply = Err(error);
        self
    }

    pub fn with_end_error(mut self, error: ApiError) -> Self {
        self.end = Err(error);
        self
    }

    pub fn with_event_chunks(mut self, chunks: &[&str]) -> Self {
        self.events =
            Ok(chunks.iter().map(|chunk| Ok(Bytes::copy_from_slice(chunk.as_bytes()))).collect());
        self
    }

    /// Stream items delivered as-is, including mid-stream failures.
    pub fn with_event_items(mut self, items: Vec<Result<Bytes, ApiError>>) -> Self {
        self.events = Ok(items);
        self
    }

    pub fn with_event_error(mut self, error: ApiError) -> Self {
        self.events = Err(error);
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Calls other than token exchanges, in order.
    pub fn crm_calls(&self) -> Vec<ApiCall> {
        self.calls().into_iter().filter(|call| !matches!(call, ApiCall::ExchangeToken)).collect()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(call);
    }
}

#[async_trait]
impl AgentApi for ScriptedAgentApi {
    async fn exchange_token(&self) -> Result<TokenGrant, ApiError> {
        self.record(ApiCall::ExchangeToken);
        if let Some(delay) = self.token_delay {
            tokio::time::sleep(delay).await;
        }
        self.token.clone()
    }

    async fn invoke_flow(
        &self,
        _token: &str,
        flow_name: &str,
        inputs: Value,
    ) -> Result<Vec<FlowResult>, ApiError> {
        self.record(ApiCall::InvokeFlow { flow_name: flow_name.to_string(), inputs });
        self.flows.get(flow_name).cloned().unwrap_or_else(|| {
            Err(ApiError::Status {
                endpoint: "flow",
                status: 404,
                body: format!("no scripted response for flow `{flow_name}`"),
            })
        })
    }

    async fn open_session(
        &self,
        _token: &str,
        request: &SessionOpenRequest,
    ) -> Result<SessionOpenResponse, ApiError> {
        self.record(ApiCall::OpenSession(request.clone()));
        self.session.clone()
    }

    async fn send_message(
        &self,
        _token: &str,
        session_id: &str,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ApiError> {
        self.record(ApiCall::SendMessage {
            session_id: session_id.to_string(),
            request: request.clone(),
        });
        self.reply.clone()
    }

    async fn end_session(
        &self,
        _token: &str,
        session_id: &str,
        reason: EndReason,
    ) -> Result<(), ApiError> {
        self.record(ApiCall::EndSession { session_id: session_id.to_string(), reason });
        self.end.clone()
    }

    async fn open_event_stream(&self, _token: &str) -> Result<ByteStream, ApiError> {
        self.record(ApiCall::OpenEventStream);
        let items = self.events.clone()?;
        Ok(futures::stream::iter(items).boxed())
    }
}
