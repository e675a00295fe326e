use std::env;
use std::sync::{Mutex, OnceLock};

use jobrelay_cli::commands::{config, doctor};
use serde_json::Value;

const VALID_ENV: &[(&str, &str)] = &[
    ("JOBRELAY_CRM_DOMAIN", "https://acme.my.salesforce.com"),
    ("JOBRELAY_CRM_CHAT_DOMAIN", "https://acme.my.salesforce-scrt.com"),
    ("JOBRELAY_CRM_CLIENT_ID", "client-id"),
    ("JOBRELAY_CRM_CLIENT_SECRET", "client-secret-value"),
    ("JOBRELAY_CRM_AGENT_ID", "0XxAGENT"),
    ("JOBRELAY_CRM_CANDIDATE_FLOW_NAME", "Get_Candidate_And_Job_Details"),
    ("JOBRELAY_CRM_ELIGIBILITY_FLOW_NAME", "Check_Candidate_Response"),
    ("JOBRELAY_SESSION_SIGNING_KEY", "0123456789abcdef0123456789abcdef"),
];

#[test]
fn config_reports_env_sources_and_redacts_secrets() {
    with_env(VALID_ENV, || {
        let result = config::run();
        assert_eq!(result.exit_code, 0, "expected config to load from env");

        assert!(result
            .output
            .contains("- crm.domain = https://acme.my.salesforce.com (source: env (JOBRELAY_CRM_DOMAIN))"));
        assert!(result.output.contains("- crm.api_version = v64.0 (source: default)"));
        assert!(result.output.contains("- session.close_policy = OnConfirmedClose (source: default)"));
        assert!(!result.output.contains("client-secret-value"));
        assert!(!result.output.contains("0123456789abcdef0123456789abcdef"));
    });
}

#[test]
fn config_log_level_alias_is_attributed() {
    let mut vars = VALID_ENV.to_vec();
    vars.push(("JOBRELAY_LOG_LEVEL", "debug"));

    with_env(&vars, || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("- logging.level = debug (source: env (JOBRELAY_LOG_LEVEL))"));
    });
}

#[test]
fn config_returns_validation_failure_without_credentials() {
    with_env(&[], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1, "expected doctor failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert!(checks[1..].iter().all(|check| check["status"] == "skipped"));
    });
}

#[test]
fn doctor_human_output_lists_every_check() {
    with_env(&[], || {
        let result = doctor::run(false);

        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] crm_token_exchange"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "JOBRELAY_SERVER_BIND_ADDRESS",
        "JOBRELAY_SERVER_PORT",
        "JOBRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "JOBRELAY_CRM_DOMAIN",
        "JOBRELAY_CRM_API_HOST",
        "JOBRELAY_CRM_CHAT_DOMAIN",
        "JOBRELAY_CRM_API_VERSION",
        "JOBRELAY_CRM_CLIENT_ID",
        "JOBRELAY_CRM_CLIENT_SECRET",
        "JOBRELAY_CRM_AGENT_ID",
        "JOBRELAY_CRM_ORG_ID",
        "JOBRELAY_CRM_CANDIDATE_FLOW_NAME",
        "JOBRELAY_CRM_ELIGIBILITY_FLOW_NAME",
        "JOBRELAY_CRM_LOCALE",
        "JOBRELAY_CRM_TIMEZONE",
        "JOBRELAY_CRM_REQUEST_TIMEOUT_SECS",
        "JOBRELAY_CRM_TOKEN_SKEW_SECS",
        "JOBRELAY_SESSION_COOKIE_NAME",
        "JOBRELAY_SESSION_SIGNING_KEY",
        "JOBRELAY_SESSION_SECURE_COOKIE",
        "JOBRELAY_SESSION_MAX_AGE_SECS",
        "JOBRELAY_SESSION_CLOSE_POLICY",
        "JOBRELAY_LOGGING_LEVEL",
        "JOBRELAY_LOGGING_FORMAT",
        "JOBRELAY_LOG_LEVEL",
        "JOBRELAY_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
