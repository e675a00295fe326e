use serde::{Deserialize, Serialize};

use crate::domain::session::AgentMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Agent,
}

/// One exchanged message as the browser renders it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub sequence: u64,
}

impl Turn {
    /// Projects agent replies into turns numbered from `first_sequence`.
    /// Messages without text (progress indicators, end-of-turn markers) are skipped.
    pub fn from_agent_messages(messages: &[AgentMessage], first_sequence: u64) -> Vec<Self> {
        messages
            .iter()
            .filter_map(|message| message.text().filter(|text| !text.trim().is_empty()))
            .enumerate()
            .map(|(offset, text)| Self {
                role: TurnRole::Agent,
                text: text.to_string(),
                sequence: first_sequence + offset as u64,
            })
            .collect()
    }
}
