use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use jobrelay_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG_INVALID};

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG_INVALID,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    CommandResult::report(0, render(&config, config_file_doc.as_ref(), config_file_path.as_deref()))
}

fn render(config: &AppConfig, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string(),
    ];
    for field in fields(config) {
        let source = field_source(field.key, field.env_keys, file_doc, file_path);
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let server = &config.server;
    let crm = &config.crm;
    let session = &config.session;

    vec![
        Field::new("server.bind_address", &server.bind_address, &["JOBRELAY_SERVER_BIND_ADDRESS"]),
        Field::new("server.port", server.port.to_string(), &["JOBRELAY_SERVER_PORT"]),
        Field::new(
            "server.graceful_shutdown_secs",
            server.graceful_shutdown_secs.to_string(),
            &["JOBRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new("crm.domain", &crm.domain, &["JOBRELAY_CRM_DOMAIN"]),
        Field::new("crm.api_host", &crm.api_host, &["JOBRELAY_CRM_API_HOST"]),
        Field::new("crm.chat_domain", &crm.chat_domain, &["JOBRELAY_CRM_CHAT_DOMAIN"]),
        Field::new("crm.api_version", &crm.api_version, &["JOBRELAY_CRM_API_VERSION"]),
        Field::new("crm.client_id", &crm.client_id, &["JOBRELAY_CRM_CLIENT_ID"]),
        Field::new(
            "crm.client_secret",
            redact_secret(crm.client_secret.expose_secret()),
            &["JOBRELAY_CRM_CLIENT_SECRET"],
        ),
        Field::new("crm.agent_id", &crm.agent_id, &["JOBRELAY_CRM_AGENT_ID"]),
        Field::new(
            "crm.org_id",
            crm.org_id.as_deref().unwrap_or("<unset>"),
            &["JOBRELAY_CRM_ORG_ID"],
        ),
        Field::new(
            "crm.candidate_flow_name",
            &crm.candidate_flow_name,
            &["JOBRELAY_CRM_CANDIDATE_FLOW_NAME"],
        ),
        Field::new(
            "crm.eligibility_flow_name",
            &crm.eligibility_flow_name,
            &["JOBRELAY_CRM_ELIGIBILITY_FLOW_NAME"],
        ),
        Field::new("crm.locale", &crm.locale, &["JOBRELAY_CRM_LOCALE"]),
        Field::new("crm.timezone", &crm.timezone, &["JOBRELAY_CRM_TIMEZONE"]),
        Field::new(
            "crm.request_timeout_secs",
            crm.request_timeout_secs.to_string(),
            &["JOBRELAY_CRM_REQUEST_TIMEOUT_SECS"],
        ),
        Field::new(
            "crm.token_skew_secs",
            crm.token_skew_secs.to_string(),
            &["JOBRELAY_CRM_TOKEN_SKEW_SECS"],
        ),
        Field::new("session.cookie_name", &session.cookie_name, &["JOBRELAY_SESSION_COOKIE_NAME"]),
        Field::new(
            "session.signing_key",
            redact_secret(session.signing_key.expose_secret()),
            &["JOBRELAY_SESSION_SIGNING_KEY"],
        ),
        Field::new(
            "session.secure_cookie",
            session.secure_cookie.to_string(),
            &["JOBRELAY_SESSION_SECURE_COOKIE"],
        ),
        Field::new(
            "session.max_age_secs",
            session.max_age_secs.map(|secs| secs.to_string()).unwrap_or_else(|| "<unset>".into()),
            &["JOBRELAY_SESSION_MAX_AGE_SECS"],
        ),
        Field::new(
            "session.close_policy",
            format!("{:?}", session.close_policy),
            &["JOBRELAY_SESSION_CLOSE_POLICY"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["JOBRELAY_LOGGING_LEVEL", "JOBRELAY_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["JOBRELAY_LOGGING_FORMAT", "JOBRELAY_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("jobrelay.toml"), PathBuf::from("config/jobrelay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    let length = secret.trim().len();
    if length == 0 {
        return "<empty>".to_string();
    }
    format!("<redacted> ({length} bytes)")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use jobrelay_core::config::AppConfig;

    use super::{contains_path, redact_secret, render};

    #[test]
    fn secrets_never_render_in_clear() {
        let mut config = AppConfig::default();
        config.crm.client_secret = "super-secret-value".to_string().into();
        config.session.signing_key = "0123456789abcdef0123456789abcdef".to_string().into();

        let output = render(&config, None, None);

        assert!(!output.contains("super-secret-value"));
        assert!(!output.contains("0123456789abcdef"));
        assert!(output.contains("- crm.client_secret = <redacted> (18 bytes)"));
        assert!(output.contains("- session.signing_key = <redacted> (32 bytes)"));
    }

    #[test]
    fn file_keys_are_attributed_to_the_file() {
        let doc: toml::Value =
            "[crm]\nlocale = \"fr_FR\"\n".parse().expect("toml parses");
        let mut config = AppConfig::default();
        config.crm.locale = "fr_FR".to_string();

        let output = render(&config, Some(&doc), Some(Path::new("jobrelay.toml")));

        assert!(output.contains("- crm.locale = fr_FR (source: file (jobrelay.toml))"));
        assert!(output.contains("- crm.timezone = America/Los_Angeles (source: default)"));
    }

    #[test]
    fn nested_lookup_requires_every_segment() {
        let doc: toml::Value = "[session]\ncookie_name = \"c\"\n".parse().expect("toml parses");
        assert!(contains_path(&doc, "session.cookie_name"));
        assert!(!contains_path(&doc, "session.signing_key"));
        assert_eq!(redact_secret("  "), "<empty>");
    }
}
