//! Candidate/job context resolved from the CRM flows and its projection into
//! the named variables injected at session open.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LANGUAGE_VARIABLE: &str = "$Context.EndUserLanguage";
pub const APPLICATION_REF_VARIABLE: &str = "Job_Application_Number";
pub const TERMS_AGREED_VARIABLE: &str = "T_C_Agreed";
pub const ALLOW_USER_VARIABLE: &str = "allowUser";

/// Output of the candidate/job details flow. Every field is optional on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CandidateJobDetails {
    #[serde(default)]
    pub candidate_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_location: Option<String>,
    #[serde(default)]
    pub job_travel_required: Option<bool>,
    #[serde(default)]
    pub job_responsibilities: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub candidate_country: Option<String>,
    #[serde(default)]
    pub candidate_email: Option<String>,
    #[serde(default)]
    pub job_skill_required: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
    #[serde(default)]
    pub job_type: Option<String>,
}

impl CandidateJobDetails {
    /// Candidate and job ids, both present and non-blank.
    pub fn resolved_ids(&self) -> Option<(&str, &str)> {
        let candidate = non_blank(self.candidate_id.as_deref())?;
        let job = non_blank(self.job_id.as_deref())?;
        Some((candidate, job))
    }
}

/// Output of the candidate eligibility flow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Eligibility {
    #[serde(rename = "AllowUser", default, deserialize_with = "lenient_flag")]
    pub allow_user: Option<String>,
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Text,
    Boolean,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: VariableType,
    pub value: Value,
}

impl SessionVariable {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        Self { name: name.to_string(), kind: VariableType::Text, value: Value::String(value.into()) }
    }

    fn optional_text(name: &str, value: &Option<String>) -> Self {
        Self::text(name, value.clone().unwrap_or_default())
    }
}

/// Everything known about the applicant when a session is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainContext {
    pub application_ref: String,
    pub terms_agreed: bool,
    pub candidate_id: String,
    pub job_id: String,
    pub details: CandidateJobDetails,
    pub eligibility: Eligibility,
}

impl DomainContext {
    /// Returns `None` when the details lack a candidate or job id.
    pub fn resolve(
        application_ref: impl Into<String>,
        terms_agreed: bool,
        details: CandidateJobDetails,
        eligibility: Eligibility,
    ) -> Option<Self> {
        let (candidate_id, job_id) = details.resolved_ids()?;
        let (candidate_id, job_id) = (candidate_id.to_string(), job_id.to_string());
        Some(Self {
            application_ref: application_ref.into(),
            terms_agreed,
            candidate_id,
            job_id,
            details,
            eligibility,
        })
    }

    /// The ordered variable set sent with the session-open request.
    pub fn session_variables(&self, locale: &str) -> Vec<SessionVariable> {
        let details = &self.details;
        let travel = match details.job_travel_required {
            Some(flag) => Value::Bool(flag),
            None => Value::String(String::new()),
        };

        vec![
            SessionVariable::text(LANGUAGE_VARIABLE, locale),
            SessionVariable::text(APPLICATION_REF_VARIABLE, self.application_ref.as_str()),
            SessionVariable::optional_text("JobLocation", &details.job_location),
            SessionVariable {
                name: "JobTravelRequired".to_string(),
                kind: VariableType::Boolean,
                value: travel,
            },
            SessionVariable::optional_text("JobResponsibilities", &details.job_responsibilities),
            SessionVariable::optional_text("CandidateFirstName", &details.first_name),
            SessionVariable::optional_text("CandidateLastName", &details.last_name),
            SessionVariable::optional_text("PositionName", &details.job_name),
            SessionVariable::optional_text("CandidateCountry", &details.candidate_country),
            SessionVariable::optional_text("CandidateEmail", &details.candidate_email),
            SessionVariable::optional_text("JobSkills", &details.job_skill_required),
            SessionVariable::optional_text("CompanyName", &details.company_name),
            SessionVariable::optional_text("JobDescription", &details.job_description),
            SessionVariable::optional_text("JobType", &details.job_type),
            SessionVariable::text("Customer_Id", self.candidate_id.as_str()),
            SessionVariable::text("Job_Id", self.job_id.as_str()),
            SessionVariable::text(TERMS_AGREED_VARIABLE, self.terms_agreed.to_string()),
            SessionVariable::text(
                ALLOW_USER_VARIABLE,
                self.eligibility.allow_user.clone().unwrap_or_else(|| "false".to_string()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{CandidateJobDetails, DomainContext, Eligibility, VariableType};

    fn details(value: Value) -> CandidateJobDetails {
        serde_json::from_value(value).expect("details decode")
    }

    fn variable<'a>(variables: &'a [super::SessionVariable], name: &str) -> &'a Value {
        &variables.iter().find(|variable| variable.name == name).expect("variable present").value
    }

    #[test]
    fn blank_ids_do_not_resolve() {
        let missing_job = details(json!({"CandidateId": "c1", "JobId": null}));
        let blank_candidate = details(json!({"CandidateId": " ", "JobId": "j1"}));

        assert!(DomainContext::resolve("JA-1", true, missing_job, Eligibility::default()).is_none());
        assert!(
            DomainContext::resolve("JA-1", true, blank_candidate, Eligibility::default()).is_none()
        );
    }

    #[test]
    fn variables_follow_fixed_order_with_empty_defaults() {
        let context = DomainContext::resolve(
            "JA-00042",
            true,
            details(json!({"CandidateId": "c1", "JobId": "j1", "JobLocation": "Remote"})),
            Eligibility { allow_user: Some("true".to_string()) },
        )
        .expect("context resolves");

        let variables = context.session_variables("en_US");
        let names: Vec<&str> = variables.iter().map(|variable| variable.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "$Context.EndUserLanguage",
                "Job_Application_Number",
                "JobLocation",
                "JobTravelRequired",
                "JobResponsibilities",
                "CandidateFirstName",
                "CandidateLastName",
                "PositionName",
                "CandidateCountry",
                "CandidateEmail",
                "JobSkills",
                "CompanyName",
                "JobDescription",
                "JobType",
                "Customer_Id",
                "Job_Id",
                "T_C_Agreed",
                "allowUser",
            ]
        );
        assert_eq!(variable(&variables, "Job_Application_Number"), "JA-00042");
        assert_eq!(variable(&variables, "JobLocation"), "Remote");
        assert_eq!(variable(&variables, "JobDescription"), "");
        assert_eq!(variable(&variables, "JobTravelRequired"), "");
        assert_eq!(variable(&variables, "T_C_Agreed"), "true");
        assert_eq!(variable(&variables, "allowUser"), "true");
        assert_eq!(variables[3].kind, VariableType::Boolean);
    }

    #[test]
    fn allow_user_defaults_to_false_and_travel_keeps_boolean() {
        let context = DomainContext::resolve(
            "JA-7",
            false,
            details(json!({"CandidateId": "c1", "JobId": "j1", "JobTravelRequired": true})),
            Eligibility::default(),
        )
        .expect("context resolves");

        let variables = context.session_variables("en_US");
        assert_eq!(variable(&variables, "allowUser"), "false");
        assert_eq!(variable(&variables, "T_C_Agreed"), "false");
        assert_eq!(variable(&variables, "JobTravelRequired"), &Value::Bool(true));
    }

    #[test]
    fn eligibility_accepts_boolean_or_text_flags() {
        let from_bool: Eligibility =
            serde_json::from_value(json!({"AllowUser": true})).expect("decode");
        let from_text: Eligibility =
            serde_json::from_value(json!({"AllowUser": "false"})).expect("decode");
        let absent: Eligibility = serde_json::from_value(json!({})).expect("decode");

        assert_eq!(from_bool.allow_user.as_deref(), Some("true"));
        assert_eq!(from_text.allow_user.as_deref(), Some("false"));
        assert_eq!(absent.allow_user, None);
    }

    #[test]
    fn extra_flow_outputs_are_ignored() {
        let parsed = details(json!({
            "CandidateId": "c1",
            "JobId": "j1",
            "Flow__InterviewGuid": "guid",
            "SuggestionsText": {"nested": true}
        }));
        assert_eq!(parsed.resolved_ids(), Some(("c1", "j1")));
    }
}
