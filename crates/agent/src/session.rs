use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use jobrelay_core::config::CrmConfig;
use jobrelay_core::{CandidateJobDetails, DomainContext, Eligibility, RelayError, SessionHandle};

use crate::api::{AgentApi, InstanceConfig, SessionOpenRequest, StreamingCapabilities};
use crate::endpoints::CrmEndpoints;
use crate::flows::{flow_inputs, run_flow};
use crate::token::TokenProvider;

const FEATURE_SUPPORT: &str = "Streaming";
const TEXT_CHUNK_TYPE: &str = "Text";

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub candidate_flow_name: String,
    pub eligibility_flow_name: String,
    pub instance_endpoint: String,
    pub locale: String,
    pub timezone: String,
}

impl SessionSettings {
    pub fn from_config(config: &CrmConfig) -> Self {
        Self {
            candidate_flow_name: config.candidate_flow_name.clone(),
            eligibility_flow_name: config.eligibility_flow_name.clone(),
            instance_endpoint: CrmEndpoints::from_config(config).domain().to_string(),
            locale: config.locale.clone(),
            timezone: config.timezone.clone(),
        }
    }
}

/// Resolves the applicant through both flows and opens an agent session
/// seeded with their context.
pub struct SessionCoordinator {
    api: Arc<dyn AgentApi>,
    tokens: Arc<TokenProvider>,
    settings: SessionSettings,
}

impl SessionCoordinator {
    pub fn new(api: Arc<dyn AgentApi>, tokens: Arc<TokenProvider>, settings: SessionSettings) -> Self {
        Self { api, tokens, settings }
    }

    pub async fn create_session(
        &self,
        application_ref: &str,
        terms_agreed: bool,
    ) -> Result<SessionHandle, RelayError> {
        let application_ref = application_ref.trim();
        if application_ref.is_empty() {
            warn!(event_name = "session.create.blank_reference", "blank application reference");
            return Err(RelayError::InvalidReference(String::new()));
        }

        let credential = self.tokens.get_token().await?;
        let token = credential.token();

        let details: CandidateJobDetails = run_flow(
            self.api.as_ref(),
            token,
            &self.settings.candidate_flow_name,
            flow_inputs([("ApplicationNumber", application_ref)]),
        )
        .await?;

        let Some((candidate_id, _)) = details.resolved_ids() else {
            warn!(
                event_name = "session.create.unknown_application",
                application_ref, "application did not resolve to a candidate and job"
            );
            return Err(RelayError::InvalidReference(application_ref.to_string()));
        };

        let eligibility: Eligibility = run_flow(
            self.api.as_ref(),
            token,
            &self.settings.eligibility_flow_name,
            flow_inputs([("Candidate_Id", candidate_id)]),
        )
        .await?;

        let context = DomainContext::resolve(application_ref, terms_agreed, details, eligibility)
            .ok_or_else(|| RelayError::InvalidReference(application_ref.to_string()))?;

        let request = SessionOpenRequest {
            external_session_key: Uuid::new_v4().to_string(),
            instance_config: InstanceConfig { endpoint: self.settings.instance_endpoint.clone() },
            tz: self.settings.timezone.clone(),
            variables: context.session_variables(&self.settings.locale),
            feature_support: FEATURE_SUPPORT.to_string(),
            streaming_capabilities: StreamingCapabilities {
                chunk_types: vec![TEXT_CHUNK_TYPE.to_string()],
            },
            bypass_user: true,
        };

        let opened = self.api.open_session(token, &request).await.map_err(|failure| {
            error!(
                event_name = "session.create.open_failed",
                error = %failure,
                "agent session open failed"
            );
            RelayError::RelayFailure(failure.to_string())
        })?;

        let session_id = opened.session_id.unwrap_or_default();
        if session_id.trim().is_empty() {
            error!(event_name = "session.create.missing_id", "agent session open returned no session id");
            return Err(RelayError::RelayFailure("session open returned no sessionId".to_string()));
        }

        info!(
            event_name = "session.create.opened",
            session_id = %session_id,
            candidate_id = %context.candidate_id,
            job_id = %context.job_id,
            "agent session opened"
        );
        Ok(SessionHandle::new(session_id, opened.messages))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use jobrelay_core::{RelayError, SystemClock};

    use super::{SessionCoordinator, SessionSettings};
    use crate::api::{ApiError, FlowResult};
    use crate::scripted::{ApiCall, ScriptedAgentApi};
    use crate::token::TokenProvider;

    fn settings() -> SessionSettings {
        SessionSettings {
            candidate_flow_name: "Get_Candidate_Details".to_string(),
            eligibility_flow_name: "Check_Candidate_Response".to_string(),
            instance_endpoint: "https://acme.my.salesforce.com".to_string(),
            locale: "en_US".to_string(),
            timezone: "America/Los_Angeles".to_string(),
        }
    }

    fn coordinator(api: Arc<ScriptedAgentApi>) -> SessionCoordinator {
        let tokens = Arc::new(TokenProvider::new(api.clone(), Arc::new(SystemClock), 60));
        SessionCoordinator::new(api, tokens, settings())
    }

    fn happy_api() -> ScriptedAgentApi {
        ScriptedAgentApi::new()
            .with_flow_outputs(
                "Get_Candidate_Details",
                json!({"CandidateId": "c1", "JobId": "j1", "JobLocation": "Remote"}),
            )
            .with_flow_outputs("Check_Candidate_Response", json!({"AllowUser": "true"}))
    }

    #[tokio::test]
    async fn resolved_application_opens_seeded_session() {
        let api = Arc::new(happy_api().with_session(Some("sess-77"), Vec::new()));
        let handle =
            coordinator(api.clone()).create_session("JA-00042", true).await.expect("session");

        assert_eq!(handle.session_id, "sess-77");
        assert_eq!(handle.status, "success");

        let calls = api.crm_calls();
        assert_eq!(
            calls[0],
            ApiCall::InvokeFlow {
                flow_name: "Get_Candidate_Details".to_string(),
                inputs: json!({"ApplicationNumber": "JA-00042"}),
            }
        );
        assert_eq!(
            calls[1],
            ApiCall::InvokeFlow {
                flow_name: "Check_Candidate_Response".to_string(),
                inputs: json!({"Candidate_Id": "c1"}),
            }
        );
        let ApiCall::OpenSession(request) = &calls[2] else {
            panic!("expected session open, got {:?}", calls[2]);
        };
        assert_eq!(request.tz, "America/Los_Angeles");
        assert_eq!(request.feature_support, "Streaming");
        assert!(request.bypass_user);
        assert_eq!(request.instance_config.endpoint, "https://acme.my.salesforce.com");
        assert!(uuid::Uuid::parse_str(&request.external_session_key).is_ok());

        let value_of = |name: &str| {
            request
                .variables
                .iter()
                .find(|variable| variable.name == name)
                .map(|variable| variable.value.clone())
        };
        assert_eq!(value_of("Job_Application_Number"), Some(json!("JA-00042")));
        assert_eq!(value_of("allowUser"), Some(json!("true")));
        assert_eq!(value_of("JobLocation"), Some(json!("Remote")));
    }

    #[tokio::test]
    async fn unresolved_application_never_opens_a_session() {
        let api = Arc::new(
            ScriptedAgentApi::new()
                .with_flow_outputs("Get_Candidate_Details", json!({"CandidateId": "c1"})),
        );

        let error =
            coordinator(api.clone()).create_session("JA-404", true).await.expect_err("rejected");

        assert_eq!(error, RelayError::InvalidReference("JA-404".to_string()));
        assert_eq!(api.crm_calls().len(), 1);
    }

    #[tokio::test]
    async fn blank_reference_makes_no_crm_calls() {
        let api = Arc::new(happy_api());

        let error = coordinator(api.clone()).create_session("  ", false).await.expect_err("blank");

        assert!(matches!(error, RelayError::InvalidReference(_)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn eligibility_failure_is_a_flow_error() {
        let api = Arc::new(
            ScriptedAgentApi::new()
                .with_flow_outputs("Get_Candidate_Details", json!({"CandidateId": "c1", "JobId": "j1"}))
                .with_flow_results("Check_Candidate_Response", vec![FlowResult::failure("locked")]),
        );

        let error = coordinator(api.clone()).create_session("JA-1", true).await.expect_err("fails");

        assert!(matches!(
            error,
            RelayError::FlowExecution { ref flow, .. } if flow == "Check_Candidate_Response"
        ));
        assert!(!api.crm_calls().iter().any(|call| matches!(call, ApiCall::OpenSession(_))));
    }

    #[tokio::test]
    async fn missing_session_id_is_a_relay_failure() {
        let api = Arc::new(happy_api().with_session(None, Vec::new()));

        let error = coordinator(api).create_session("JA-1", true).await.expect_err("no id");

        assert!(matches!(error, RelayError::RelayFailure(_)));
    }

    #[tokio::test]
    async fn session_open_transport_error_is_a_relay_failure() {
        let api = Arc::new(happy_api().with_session_error(ApiError::Transport {
            endpoint: "session_open",
            message: "connection reset".to_string(),
        }));

        let error = coordinator(api).create_session("JA-1", true).await.expect_err("fails");

        assert!(matches!(error, RelayError::RelayFailure(ref message) if message.contains("reset")));
    }

    #[tokio::test]
    async fn token_failure_stops_before_any_flow() {
        let api = Arc::new(happy_api().with_token_error(ApiError::Status {
            endpoint: "token",
            status: 400,
            body: "invalid_grant".to_string(),
        }));

        let error = coordinator(api.clone()).create_session("JA-1", true).await.expect_err("auth");

        assert!(matches!(error, RelayError::AuthFailure(_)));
        assert!(api.crm_calls().is_empty());
    }
}
