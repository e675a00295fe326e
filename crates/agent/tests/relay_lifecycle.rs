use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use jobrelay_agent::{AgentServices, ApiCall, CloseOutcome, MessageOutcome, ScriptedAgentApi};
use jobrelay_core::config::AppConfig;
use jobrelay_core::{AgentMessage, ManualClock};

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.crm.domain = "https://acme.my.salesforce.com".to_string();
    config.crm.agent_id = "0XxAG000000001".to_string();
    config.crm.candidate_flow_name = "Get_Candidate_Details".to_string();
    config.crm.eligibility_flow_name = "Check_Candidate_Response".to_string();
    config
}

fn greeting() -> Vec<AgentMessage> {
    serde_json::from_value(json!([{"type": "Inform", "id": "g1", "message": "Hi Ada!"}]))
        .expect("greeting decodes")
}

#[tokio::test]
async fn full_session_lifecycle_shares_one_token() {
    let api = Arc::new(
        ScriptedAgentApi::new()
            .with_flow_outputs(
                "Get_Candidate_Details",
                json!({"CandidateId": "c1", "JobId": "j1", "FirstName": "Ada"}),
            )
            .with_flow_outputs("Check_Candidate_Response", json!({"AllowUser": true}))
            .with_session(Some("sess-1"), greeting())
            .with_reply(greeting()),
    );
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).single().expect("valid time"),
    ));
    let services = AgentServices::new(api.clone(), clock, &config());

    let handle = services.sessions.create_session("JA-00042", true).await.expect("session opens");
    assert_eq!(handle.messages, greeting());

    let outcome = services
        .messages
        .send_message(handle.active_session_id(), "hello", Vec::new())
        .await
        .expect("message relays");
    assert!(matches!(outcome, MessageOutcome::Delivered { ref turns, .. } if turns.len() == 1));

    let report = services.terminator.close_session(handle.active_session_id()).await;
    assert_eq!(report.result, Ok(CloseOutcome::Closed));

    let calls = api.calls();
    let exchanges = calls.iter().filter(|call| matches!(call, ApiCall::ExchangeToken)).count();
    assert_eq!(exchanges, 1);
    assert_eq!(api.crm_calls().len(), 5);

    let opened = calls.iter().find_map(|call| match call {
        ApiCall::OpenSession(request) => Some(request.clone()),
        _ => None,
    });
    let opened = opened.expect("session open recorded");
    let first_name = opened.variables.iter().find(|variable| variable.name == "CandidateFirstName");
    assert_eq!(first_name.map(|variable| variable.value.clone()), Some(json!("Ada")));
    let allow_user = opened.variables.iter().find(|variable| variable.name == "allowUser");
    assert_eq!(allow_user.map(|variable| variable.value.clone()), Some(json!("true")));
}
