use thiserror::Error;

/// Failures of the session/message relay. Each one short-circuits the request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("crm token exchange failed: {0}")]
    AuthFailure(String),
    #[error("flow `{flow}` execution failed: {message}")]
    FlowExecution { flow: String, message: String },
    #[error("invalid application reference `{0}`")]
    InvalidReference(String),
    #[error("message is {length} characters long (limit {limit})")]
    MessageTooLong { length: usize, limit: usize },
    #[error("crm relay failed: {0}")]
    RelayFailure(String),
}

impl RelayError {
    /// Stable machine-readable kind, echoed to the browser.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthFailure(_) => "auth_failure",
            Self::FlowExecution { .. } => "flow_execution_error",
            Self::InvalidReference(_) => "invalid_reference",
            Self::MessageTooLong { .. } => "message_too_long",
            Self::RelayFailure(_) => "relay_failure",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { kind: &'static str, message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { kind: &'static str, message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { kind, .. } | Self::Internal { kind, .. } => kind,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } | Self::Internal { correlation_id, .. } => {
                correlation_id
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest { .. })
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { kind: "message_too_long", .. } => "Message too long",
            Self::BadRequest { kind: "invalid_reference", .. } => "Invalid Job Application number",
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Internal { kind: "auth_failure", .. } => "Failed to get access token",
            Self::Internal { kind: "flow_execution_error", .. } => "Flow execution failed",
            Self::Internal { .. } => {
                "The assistant is unavailable right now. Please start a new session."
            }
        }
    }
}

impl From<RelayError> for InterfaceError {
    fn from(value: RelayError) -> Self {
        let kind = value.kind();
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            RelayError::InvalidReference(_) | RelayError::MessageTooLong { .. } => {
                Self::BadRequest { kind, message, correlation_id }
            }
            RelayError::AuthFailure(_)
            | RelayError::FlowExecution { .. }
            | RelayError::RelayFailure(_) => Self::Internal { kind, message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{InterfaceError, RelayError};

    #[test]
    fn invalid_reference_maps_to_bad_request() {
        let interface = RelayError::InvalidReference("JA-0".to_owned()).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.user_message(), "Invalid Job Application number");
    }

    #[test]
    fn message_too_long_is_a_client_error() {
        let interface =
            RelayError::MessageTooLong { length: 2001, limit: 2000 }.into_interface("req-2");

        assert!(interface.is_client_error());
        assert_eq!(interface.kind(), "message_too_long");
        assert_eq!(interface.user_message(), "Message too long");
    }

    #[test]
    fn upstream_failures_map_to_internal() {
        for error in [
            RelayError::AuthFailure("401".to_owned()),
            RelayError::FlowExecution { flow: "A".to_owned(), message: "boom".to_owned() },
            RelayError::RelayFailure("timeout".to_owned()),
        ] {
            let interface = error.into_interface("req-3");
            assert!(matches!(interface, InterfaceError::Internal { .. }));
            assert_eq!(interface.correlation_id(), "req-3");
        }
    }

    #[test]
    fn flow_error_message_names_the_flow() {
        let error = RelayError::FlowExecution {
            flow: "Check_Candidate_Response".to_owned(),
            message: "isSuccess=false".to_owned(),
        };
        assert!(error.to_string().contains("Check_Candidate_Response"));
        assert_eq!(error.kind(), "flow_execution_error");
    }
}
