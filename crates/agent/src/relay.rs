use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use jobrelay_core::{AgentMessage, Clock, RelayError, Turn};

use crate::api::{AgentApi, MessageRequest, OutboundMessage};
use crate::token::TokenProvider;

pub const MAX_MESSAGE_CHARS: usize = 2000;
const DEFAULT_TEXT: &str = "hi";
const TEXT_MESSAGE_TYPE: &str = "Text";

#[derive(Clone, Debug, PartialEq)]
pub enum MessageOutcome {
    Delivered { sequence_id: u64, messages: Vec<AgentMessage>, turns: Vec<Turn> },
    NoActiveSession,
}

/// Epoch-millisecond sequence ids that never repeat or go backwards within
/// the process, even when two messages land in the same millisecond.
#[derive(Debug, Default)]
pub struct SequenceIds {
    last: AtomicU64,
}

impl SequenceIds {
    pub fn next(&self, clock: &dyn Clock) -> u64 {
        let now = u64::try_from(clock.now().timestamp_millis()).unwrap_or_default();
        let mut issued = now;
        let _ = self.last.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            issued = now.max(last + 1);
            Some(issued)
        });
        issued
    }
}

pub struct MessageRelay {
    api: Arc<dyn AgentApi>,
    tokens: Arc<TokenProvider>,
    clock: Arc<dyn Clock>,
    sequence: SequenceIds,
}

impl MessageRelay {
    pub fn new(api: Arc<dyn AgentApi>, tokens: Arc<TokenProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { api, tokens, clock, sequence: SequenceIds::default() }
    }

    pub async fn send_message(
        &self,
        session_id: Option<&str>,
        text: &str,
        variables: Vec<Value>,
    ) -> Result<MessageOutcome, RelayError> {
        let length = text.chars().count();
        if length > MAX_MESSAGE_CHARS {
            return Err(RelayError::MessageTooLong { length, limit: MAX_MESSAGE_CHARS });
        }

        let Some(session_id) = session_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(MessageOutcome::NoActiveSession);
        };

        let credential = self.tokens.get_token().await?;
        let text = if text.is_empty() { DEFAULT_TEXT } else { text };
        let sequence_id = self.sequence.next(self.clock.as_ref());
        let request = MessageRequest {
            message: OutboundMessage {
                sequence_id: sequence_id.to_string(),
                kind: TEXT_MESSAGE_TYPE.to_string(),
                text: text.to_string(),
            },
            variables,
        };

        let reply = self
            .api
            .send_message(credential.token(), session_id, &request)
            .await
            .map_err(|failure| {
                error!(
                    event_name = "message.relay.failed",
                    session_id,
                    error = %failure,
                    "agent message relay failed"
                );
                RelayError::RelayFailure(failure.to_string())
            })?;

        info!(
            event_name = "message.relay.delivered",
            session_id,
            sequence_id,
            replies = reply.messages.len(),
            "message relayed to agent"
        );
        let turns = Turn::from_agent_messages(&reply.messages, 1);
        Ok(MessageOutcome::Delivered { sequence_id, messages: reply.messages, turns })
    }
}
