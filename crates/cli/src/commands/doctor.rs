use std::sync::Arc;

use jobrelay_agent::{AgentApi, HttpAgentApi, TokenProvider};
use jobrelay_core::config::{AppConfig, LoadOptions};
use jobrelay_core::{SessionCookieCodec, SessionHandle, SystemClock};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_CHECK_FAILED};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CHECK_FAILED };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult::report(exit_code, output);
    }

    CommandResult::report(exit_code, render_human(&report))
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let token_check = match HttpAgentApi::from_config(&config.crm) {
                Ok(api) => check_crm_token(Arc::new(api), &config),
                Err(error) => DoctorCheck {
                    name: "crm_token_exchange",
                    status: CheckStatus::Fail,
                    details: format!("failed to build crm client: {error}"),
                },
            };
            vec![
                DoctorCheck {
                    name: "config_validation",
                    status: CheckStatus::Pass,
                    details: "configuration loaded and validated".to_string(),
                },
                check_session_cookie(&config),
                token_check,
            ]
        }
        Err(error) => vec![
            DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
            skipped("session_cookie_signing"),
            skipped("crm_token_exchange"),
        ],
    };

    summarize(checks)
}

fn summarize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    }
}

fn check_session_cookie(config: &AppConfig) -> DoctorCheck {
    let codec = SessionCookieCodec::from_config(&config.session);
    let sample = SessionHandle::new("doctor-check", Vec::new());

    let verified = codec
        .encode(&sample)
        .map(|value| codec.decode(&value).is_some_and(|decoded| decoded == sample));
    match verified {
        Ok(true) => DoctorCheck {
            name: "session_cookie_signing",
            status: CheckStatus::Pass,
            details: format!("`{}` cookie signs and verifies", codec.cookie_name()),
        },
        Ok(false) => DoctorCheck {
            name: "session_cookie_signing",
            status: CheckStatus::Fail,
            details: "signed cookie did not verify with the configured key".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "session_cookie_signing",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_crm_token(api: Arc<dyn AgentApi>, config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "crm_token_exchange",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let tokens = TokenProvider::new(api, Arc::new(SystemClock), config.crm.token_skew_secs);
    match runtime.block_on(tokens.get_token()) {
        Ok(credential) => DoctorCheck {
            name: "crm_token_exchange",
            status: CheckStatus::Pass,
            details: format!(
                "token issued by `{}`, expires at {}",
                config.crm.domain,
                credential.expires_at().to_rfc3339()
            ),
        },
        Err(error) => DoctorCheck {
            name: "crm_token_exchange",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
