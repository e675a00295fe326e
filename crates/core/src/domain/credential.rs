use chrono::{DateTime, Duration, Utc};

/// Longest lifetime accepted from a token grant; larger values are clamped.
pub const MAX_EXPIRES_IN_SECS: i64 = 86_400 * 365;

/// Bearer credential for the CRM agent API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self { token: token.into(), expires_at }
    }

    /// Builds a credential from an `expires_in` seconds value relative to `issued_at`.
    /// The lifetime is clamped to `0..=MAX_EXPIRES_IN_SECS`; an expiry that still
    /// cannot be represented leaves the credential expired at issue.
    pub fn issued(token: impl Into<String>, issued_at: DateTime<Utc>, expires_in_secs: i64) -> Self {
        let expires_at = Duration::try_seconds(expires_in_secs.clamp(0, MAX_EXPIRES_IN_SECS))
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .unwrap_or(issued_at);
        Self::new(token, expires_at)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True while `now` is earlier than the expiry minus `skew`.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at.checked_sub_signed(skew).is_some_and(|limit| now < limit)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
