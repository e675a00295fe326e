use jobrelay_core::config::CrmConfig;

const AGENT_API_PREFIX: &str = "einstein/ai-agent/v1";

/// Absolute URLs of every CRM endpoint the relay talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrmEndpoints {
    domain: String,
    api_host: String,
    chat_domain: String,
    api_version: String,
    agent_id: String,
}

impl CrmEndpoints {
    pub fn from_config(config: &CrmConfig) -> Self {
        Self {
            domain: trim_base(&config.domain),
            api_host: trim_base(&config.api_host),
            chat_domain: trim_base(&config.chat_domain),
            api_version: config.api_version.trim().to_string(),
            agent_id: config.agent_id.trim().to_string(),
        }
    }

    /// The instance domain, also sent as the session's `instanceConfig.endpoint`.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn token(&self) -> String {
        format!("{}/services/oauth2/token", self.domain)
    }

    pub fn flow(&self, flow_name: &str) -> String {
        format!(
            "{}/services/data/{}/actions/custom/flow/{}",
            self.domain,
            self.api_version,
            flow_name.trim()
        )
    }

    pub fn session_open(&self) -> String {
        format!("{}/{AGENT_API_PREFIX}/agents/{}/sessions", self.api_host, self.agent_id)
    }

    pub fn messages(&self, session_id: &str) -> String {
        format!("{}/{AGENT_API_PREFIX}/sessions/{session_id}/messages", self.api_host)
    }

    pub fn session(&self, session_id: &str) -> String {
        format!("{}/{AGENT_API_PREFIX}/sessions/{session_id}", self.api_host)
    }

    pub fn events(&self) -> String {
        format!("{}/eventrouter/v1/sse?channelType=embedded_messaging", self.chat_domain)
    }
}

fn trim_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use jobrelay_core::config::AppConfig;

    use super::CrmEndpoints;

    fn endpoints() -> CrmEndpoints {
        let mut config = AppConfig::default().crm;
        config.domain = "https://acme.my.salesforce.com/".to_string();
        config.chat_domain = "https://acme.my.salesforce-scrt.com".to_string();
        config.agent_id = "0XxAG000000001".to_string();
        CrmEndpoints::from_config(&config)
    }

    #[test]
    fn trailing_slashes_do_not_double_up() {
        let endpoints = endpoints();
        assert_eq!(endpoints.domain(), "https://acme.my.salesforce.com");
        assert_eq!(endpoints.token(), "https://acme.my.salesforce.com/services/oauth2/token");
    }

    #[test]
    fn flow_url_carries_api_version() {
        assert_eq!(
            endpoints().flow("Get_Candidate_Details"),
            "https://acme.my.salesforce.com/services/data/v64.0/actions/custom/flow/Get_Candidate_Details"
        );
    }

    #[test]
    fn agent_api_urls_live_on_api_host() {
        let endpoints = endpoints();
        assert_eq!(
            endpoints.session_open(),
            "https://api.salesforce.com/einstein/ai-agent/v1/agents/0XxAG000000001/sessions"
        );
        assert_eq!(
            endpoints.messages("s-1"),
            "https://api.salesforce.com/einstein/ai-agent/v1/sessions/s-1/messages"
        );
        assert_eq!(
            endpoints.session("s-1"),
            "https://api.salesforce.com/einstein/ai-agent/v1/sessions/s-1"
        );
    }

    #[test]
    fn events_url_selects_embedded_messaging_channel() {
        assert_eq!(
            endpoints().events(),
            "https://acme.my.salesforce-scrt.com/eventrouter/v1/sse?channelType=embedded_messaging"
        );
    }
}
