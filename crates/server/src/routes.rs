use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use jobrelay_agent::{AgentServices, CloseOutcome, MessageOutcome};
use jobrelay_core::{AgentMessage, InterfaceError, RelayError, SessionCookieCodec, SessionHandle, Turn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

const NO_SESSION_MESSAGE: &str = "Invalid Session ID. Start a new session.";
const NO_SESSION_ON_CLOSE_MESSAGE: &str = "Invalid Session ID";
const SESSION_ENDED_MESSAGE: &str = "Session ended";

#[derive(Clone)]
pub struct RelayState {
    services: Arc<AgentServices>,
    cookies: Arc<SessionCookieCodec>,
}

impl RelayState {
    pub fn new(services: Arc<AgentServices>, cookies: SessionCookieCodec) -> Self {
        Self { services, cookies: Arc::new(cookies) }
    }

    /// Session handle from the request's signed cookie. Missing, tampered
    /// and unparsable cookies all read as no session.
    fn session_from(&self, headers: &HeaderMap) -> Option<SessionHandle> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|header| self.cookies.read_from_header(header))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub application_ref: Option<String>,
    #[serde(default, deserialize_with = "only_true")]
    pub terms_agreed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "vars")]
    pub variables: Option<Vec<Value>>,
}

/// Terms count as agreed only for a literal JSON `true`.
fn only_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

/// `Json` whose rejections answer with the same error body as the handlers.
pub struct RelayJson<T>(pub T);

impl<T, S> FromRequest<S> for RelayJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = HandlerError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejected_body(&rejection)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReply {
    pub status: &'static str,
    pub sequence_id: u64,
    pub messages: Vec<AgentMessage>,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct StatusReply {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

type HandlerError = (StatusCode, Json<ErrorBody>);

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/session/create", post(create_session))
        .route("/message", post(send_message))
        .route("/session", delete(close_session))
        .route("/events", get(stream_events))
        .with_state(state)
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn interface_error(error: RelayError, correlation_id: &str, stage: &'static str) -> HandlerError {
    let interface = error.into_interface(correlation_id);
    let status = if interface.is_client_error() {
        warn!(
            event_name = "relay.request.rejected",
            correlation_id,
            stage,
            kind = interface.kind(),
            error = %interface,
            "request rejected"
        );
        StatusCode::BAD_REQUEST
    } else {
        error!(
            event_name = "relay.request.failed",
            correlation_id,
            stage,
            kind = interface.kind(),
            error = %interface,
            "request failed"
        );
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(error_body(&interface)))
}

fn rejected_body(rejection: &JsonRejection) -> HandlerError {
    let correlation_id = correlation_id();
    let status = rejection.status();
    warn!(
        event_name = "relay.request.unreadable",
        correlation_id = %correlation_id,
        status = status.as_u16(),
        error = %rejection.body_text(),
        "request body rejected"
    );
    let body = ErrorBody {
        status: "error".to_string(),
        error: "invalid_request".to_string(),
        message: "Request body must be a JSON object with the expected fields.".to_string(),
        correlation_id,
    };
    (status, Json(body))
}

fn error_body(interface: &InterfaceError) -> ErrorBody {
    ErrorBody {
        status: "error".to_string(),
        error: interface.kind().to_string(),
        message: interface.user_message().to_string(),
        correlation_id: interface.correlation_id().to_string(),
    }
}

async fn create_session(
    State(state): State<RelayState>,
    RelayJson(request): RelayJson<CreateSessionRequest>,
) -> Result<Response, HandlerError> {
    let correlation_id = correlation_id();
    let handle = state
        .services
        .sessions
        .create_session(request.application_ref.as_deref().unwrap_or_default(), request.terms_agreed)
        .await
        .map_err(|error| interface_error(error, &correlation_id, "session.create"))?;

    let cookie = state.cookies.set_cookie_header(&handle).map_err(|error| {
        interface_error(RelayError::RelayFailure(error.to_string()), &correlation_id, "session.cookie")
    })?;

    info!(
        event_name = "relay.session.created",
        correlation_id = %correlation_id,
        session_id = %handle.session_id,
        "session cookie issued"
    );
    Ok(([(SET_COOKIE, cookie)], Json(handle)).into_response())
}

async fn send_message(
    State(state): State<RelayState>,
    headers: HeaderMap,
    RelayJson(request): RelayJson<SendMessageRequest>,
) -> Result<Response, HandlerError> {
    let correlation_id = correlation_id();
    let handle = state.session_from(&headers);
    let outcome = state
        .services
        .messages
        .send_message(
            handle.as_ref().and_then(SessionHandle::active_session_id),
            request.text.as_deref().unwrap_or_default(),
            request.variables.unwrap_or_default(),
        )
        .await
        .map_err(|error| interface_error(error, &correlation_id, "message.relay"))?;

    Ok(match outcome {
        MessageOutcome::Delivered { sequence_id, messages, turns } => {
            Json(MessageReply { status: "success", sequence_id, messages, turns }).into_response()
        }
        MessageOutcome::NoActiveSession => {
            Json(StatusReply { status: "no_session", message: NO_SESSION_MESSAGE }).into_response()
        }
    })
}

async fn close_session(State(state): State<RelayState>, headers: HeaderMap) -> Response {
    let correlation_id = correlation_id();
    let handle = state.session_from(&headers);
    let report = state
        .services
        .terminator
        .close_session(handle.as_ref().and_then(SessionHandle::active_session_id))
        .await;

    let mut response = match report.result {
        Ok(CloseOutcome::Closed) => {
            Json(StatusReply { status: "success", message: SESSION_ENDED_MESSAGE }).into_response()
        }
        Ok(CloseOutcome::NoActiveSession) => Json(StatusReply {
            status: "no_session",
            message: NO_SESSION_ON_CLOSE_MESSAGE,
        })
        .into_response(),
        Err(error) => interface_error(error, &correlation_id, "session.close").into_response(),
    };

    if report.clear_cookie {
        if let Ok(value) = HeaderValue::from_str(&state.cookies.clear_cookie_header()) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }
    response
}

async fn stream_events(State(state): State<RelayState>) -> Result<Response, HandlerError> {
    let correlation_id = correlation_id();
    let stream = state
        .services
        .events
        .open_stream()
        .await
        .map_err(|error| interface_error(error, &correlation_id, "events.open"))?;

    Ok((
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache, no-transform"),
            (CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
