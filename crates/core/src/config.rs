use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_SIGNING_KEY_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub crm: CrmConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    /// Instance domain hosting the token and flow endpoints.
    pub domain: String,
    /// Host of the agent API (`/einstein/ai-agent/v1/...`).
    pub api_host: String,
    /// Host of the messaging event router.
    pub chat_domain: String,
    pub api_version: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub agent_id: String,
    pub org_id: Option<String>,
    pub candidate_flow_name: String,
    pub eligibility_flow_name: String,
    pub locale: String,
    pub timezone: String,
    pub request_timeout_secs: u64,
    pub token_skew_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub signing_key: SecretString,
    pub secure_cookie: bool,
    pub max_age_secs: Option<u64>,
    pub close_policy: ClosePolicy,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// When the session cookie is cleared after a close request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosePolicy {
    /// Clear only after the CRM confirmed the delete.
    OnConfirmedClose,
    /// Clear even when the CRM delete failed.
    Always,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub crm_domain: Option<String>,
    pub crm_api_host: Option<String>,
    pub crm_chat_domain: Option<String>,
    pub crm_client_id: Option<String>,
    pub crm_client_secret: Option<String>,
    pub crm_agent_id: Option<String>,
    pub crm_candidate_flow_name: Option<String>,
    pub crm_eligibility_flow_name: Option<String>,
    pub session_signing_key: Option<String>,
    pub session_secure_cookie: Option<bool>,
    pub session_close_policy: Option<ClosePolicy>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            crm: CrmConfig {
                domain: String::new(),
                api_host: "https://api.salesforce.com".to_string(),
                chat_domain: String::new(),
                api_version: "v64.0".to_string(),
                client_id: String::new(),
                client_secret: String::new().into(),
                agent_id: String::new(),
                org_id: None,
                candidate_flow_name: String::new(),
                eligibility_flow_name: String::new(),
                locale: "en_US".to_string(),
                timezone: "America/Los_Angeles".to_string(),
                request_timeout_secs: 30,
                token_skew_secs: 60,
            },
            session: SessionConfig {
                cookie_name: "chatSession".to_string(),
                signing_key: String::new().into(),
                secure_cookie: true,
                max_age_secs: None,
                close_policy: ClosePolicy::OnConfirmedClose,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for ClosePolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "on_confirmed_close" => Ok(Self::OnConfirmedClose),
            "always" => Ok(Self::Always),
            other => Err(ConfigError::Validation(format!(
                "unsupported session close policy `{other}` (expected on_confirmed_close|always)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("jobrelay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(domain) = crm.domain {
                self.crm.domain = domain;
            }
            if let Some(api_host) = crm.api_host {
                self.crm.api_host = api_host;
            }
            if let Some(chat_domain) = crm.chat_domain {
                self.crm.chat_domain = chat_domain;
            }
            if let Some(api_version) = crm.api_version {
                self.crm.api_version = api_version;
            }
            if let Some(client_id) = crm.client_id {
                self.crm.client_id = client_id;
            }
            if let Some(client_secret_value) = crm.client_secret {
                self.crm.client_secret = secret_value(client_secret_value);
            }
            if let Some(agent_id) = crm.agent_id {
                self.crm.agent_id = agent_id;
            }
            if let Some(org_id) = crm.org_id {
                self.crm.org_id = Some(org_id);
            }
            if let Some(candidate_flow_name) = crm.candidate_flow_name {
                self.crm.candidate_flow_name = candidate_flow_name;
            }
            if let Some(eligibility_flow_name) = crm.eligibility_flow_name {
                self.crm.eligibility_flow_name = eligibility_flow_name;
            }
            if let Some(locale) = crm.locale {
                self.crm.locale = locale;
            }
            if let Some(timezone) = crm.timezone {
                self.crm.timezone = timezone;
            }
            if let Some(request_timeout_secs) = crm.request_timeout_secs {
                self.crm.request_timeout_secs = request_timeout_secs;
            }
            if let Some(token_skew_secs) = crm.token_skew_secs {
                self.crm.token_skew_secs = token_skew_secs;
            }
        }

        if let Some(session) = patch.session {
            if let Some(cookie_name) = session.cookie_name {
                self.session.cookie_name = cookie_name;
            }
            if let Some(signing_key_value) = session.signing_key {
                self.session.signing_key = secret_value(signing_key_value);
            }
            if let Some(secure_cookie) = session.secure_cookie {
                self.session.secure_cookie = secure_cookie;
            }
            if let Some(max_age_secs) = session.max_age_secs {
                self.session.max_age_secs = Some(max_age_secs);
            }
            if let Some(close_policy) = session.close_policy {
                self.session.close_policy = close_policy;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("JOBRELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("JOBRELAY_SERVER_PORT") {
            self.server.port = parse_u16("JOBRELAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("JOBRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("JOBRELAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("JOBRELAY_CRM_DOMAIN") {
            self.crm.domain = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_API_HOST") {
            self.crm.api_host = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_CHAT_DOMAIN") {
            self.crm.chat_domain = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_API_VERSION") {
            self.crm.api_version = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_CLIENT_ID") {
            self.crm.client_id = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_CLIENT_SECRET") {
            self.crm.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("JOBRELAY_CRM_AGENT_ID") {
            self.crm.agent_id = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_ORG_ID") {
            self.crm.org_id = Some(value);
        }
        if let Some(value) = read_env("JOBRELAY_CRM_CANDIDATE_FLOW_NAME") {
            self.crm.candidate_flow_name = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_ELIGIBILITY_FLOW_NAME") {
            self.crm.eligibility_flow_name = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_LOCALE") {
            self.crm.locale = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_TIMEZONE") {
            self.crm.timezone = value;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_REQUEST_TIMEOUT_SECS") {
            self.crm.request_timeout_secs =
                parse_u64("JOBRELAY_CRM_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("JOBRELAY_CRM_TOKEN_SKEW_SECS") {
            self.crm.token_skew_secs = parse_u64("JOBRELAY_CRM_TOKEN_SKEW_SECS", &value)?;
        }

        if let Some(value) = read_env("JOBRELAY_SESSION_COOKIE_NAME") {
            self.session.cookie_name = value;
        }
        if let Some(value) = read_env("JOBRELAY_SESSION_SIGNING_KEY") {
            self.session.signing_key = secret_value(value);
        }
        if let Some(value) = read_env("JOBRELAY_SESSION_SECURE_COOKIE") {
            self.session.secure_cookie = parse_bool("JOBRELAY_SESSION_SECURE_COOKIE", &value)?;
        }
        if let Some(value) = read_env("JOBRELAY_SESSION_MAX_AGE_SECS") {
            self.session.max_age_secs = Some(parse_u64("JOBRELAY_SESSION_MAX_AGE_SECS", &value)?);
        }
        if let Some(value) = read_env("JOBRELAY_SESSION_CLOSE_POLICY") {
            self.session.close_policy = value.parse()?;
        }

        let log_level =
            read_env("JOBRELAY_LOGGING_LEVEL").or_else(|| read_env("JOBRELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("JOBRELAY_LOGGING_FORMAT").or_else(|| read_env("JOBRELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(domain) = overrides.crm_domain {
            self.crm.domain = domain;
        }
        if let Some(api_host) = overrides.crm_api_host {
            self.crm.api_host = api_host;
        }
        if let Some(chat_domain) = overrides.crm_chat_domain {
            self.crm.chat_domain = chat_domain;
        }
        if let Some(client_id) = overrides.crm_client_id {
            self.crm.client_id = client_id;
        }
        if let Some(client_secret) = overrides.crm_client_secret {
            self.crm.client_secret = secret_value(client_secret);
        }
        if let Some(agent_id) = overrides.crm_agent_id {
            self.crm.agent_id = agent_id;
        }
        if let Some(candidate_flow_name) = overrides.crm_candidate_flow_name {
            self.crm.candidate_flow_name = candidate_flow_name;
        }
        if let Some(eligibility_flow_name) = overrides.crm_eligibility_flow_name {
            self.crm.eligibility_flow_name = eligibility_flow_name;
        }
        if let Some(signing_key) = overrides.session_signing_key {
            self.session.signing_key = secret_value(signing_key);
        }
        if let Some(secure_cookie) = overrides.session_secure_cookie {
            self.session.secure_cookie = secure_cookie;
        }
        if let Some(close_policy) = overrides.session_close_policy {
            self.session.close_policy = close_policy;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_crm(&self.crm)?;
        validate_session(&self.session)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("jobrelay.toml"), PathBuf::from("config/jobrelay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("crm.domain", &crm.domain),
        ("crm.api_host", &crm.api_host),
        ("crm.chat_domain", &crm.chat_domain),
    ] {
        validate_url(key, value)?;
    }

    let required = [
        ("crm.client_id", crm.client_id.as_str()),
        ("crm.client_secret", crm.client_secret.expose_secret()),
        ("crm.agent_id", crm.agent_id.as_str()),
        ("crm.candidate_flow_name", crm.candidate_flow_name.as_str()),
        ("crm.eligibility_flow_name", crm.eligibility_flow_name.as_str()),
        ("crm.api_version", crm.api_version.as_str()),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{key} is required. Find it under Setup > App Manager > your connected app"
            )));
        }
    }

    if !crm.api_version.starts_with('v') {
        return Err(ConfigError::Validation(
            "crm.api_version must look like `v64.0`".to_string(),
        ));
    }

    if crm.request_timeout_secs == 0 || crm.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "crm.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if crm.token_skew_secs > 3600 {
        return Err(ConfigError::Validation(
            "crm.token_skew_secs must not exceed 3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{key} is required")));
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{key} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    let cookie_name = session.cookie_name.trim();
    let valid_name = !cookie_name.is_empty()
        && cookie_name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if !valid_name {
        return Err(ConfigError::Validation(
            "session.cookie_name must be a non-empty token of [A-Za-z0-9_-]".to_string(),
        ));
    }

    let key_len = session.signing_key.expose_secret().len();
    if key_len < MIN_SIGNING_KEY_LEN {
        return Err(ConfigError::Validation(format!(
            "session.signing_key must be at least {MIN_SIGNING_KEY_LEN} bytes (got {key_len})"
        )));
    }

    if session.max_age_secs == Some(0) {
        return Err(ConfigError::Validation(
            "session.max_age_secs must be greater than zero when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    crm: Option<CrmPatch>,
    session: Option<SessionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    domain: Option<String>,
    api_host: Option<String>,
    chat_domain: Option<String>,
    api_version: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    agent_id: Option<String>,
    org_id: Option<String>,
    candidate_flow_name: Option<String>,
    eligibility_flow_name: Option<String>,
    locale: Option<String>,
    timezone: Option<String>,
    request_timeout_secs: Option<u64>,
    token_skew_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    cookie_name: Option<String>,
    signing_key: Option<String>,
    secure_cookie: Option<bool>,
    max_age_secs: Option<u64>,
    close_policy: Option<ClosePolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
