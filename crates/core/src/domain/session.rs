use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SESSION_STATUS_SUCCESS: &str = "success";

/// A single message object as returned by the agent API.
///
/// Known fields are typed; everything else is carried through untouched so
/// replies reach the browser exactly as the CRM produced them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentMessage {
    pub fn text(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Client-held handle for an open agent session.
///
/// Serialized as `{status, messages, sessionId}`; this is both the JSON body
/// returned on session creation and the content of the signed cookie.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    #[serde(default = "success_status")]
    pub status: String,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    pub session_id: String,
}

fn success_status() -> String {
    SESSION_STATUS_SUCCESS.to_string()
}

impl SessionHandle {
    pub fn new(session_id: impl Into<String>, messages: Vec<AgentMessage>) -> Self {
        Self { status: success_status(), messages, session_id: session_id.into() }
    }

    /// The session id, if the handle carries a usable one.
    pub fn active_session_id(&self) -> Option<&str> {
        let id = self.session_id.trim();
        (!id.is_empty()).then_some(id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AgentMessage, SessionHandle};

    #[test]
    fn unknown_message_fields_survive_a_round_trip() {
        let raw = json!({
            "type": "Inform",
            "id": "m-1",
            "message": "Welcome!",
            "feedbackId": "fb-9",
            "citedReferences": []
        });

        let message: AgentMessage = serde_json::from_value(raw.clone()).expect("decode");
        assert_eq!(message.text(), Some("Welcome!"));
        assert_eq!(serde_json::to_value(&message).expect("encode"), raw);
    }

    #[test]
    fn handle_uses_camel_case_wire_names() {
        let handle = SessionHandle::new("sess-1", Vec::new());
        let value = serde_json::to_value(&handle).expect("encode");

        assert_eq!(value["sessionId"], "sess-1");
        assert_eq!(value["status"], "success");
        assert!(value["messages"].as_array().is_some_and(|items| items.is_empty()));
    }

    #[test]
    fn blank_session_id_is_not_active() {
        assert_eq!(SessionHandle::new("  ", Vec::new()).active_session_id(), None);
        assert_eq!(SessionHandle::new("abc", Vec::new()).active_session_id(), Some("abc"));
    }
}
