//! Signed cookie carrying the [`SessionHandle`].
//!
//! Value layout: `base64url(json) "." hex(hmac_sha256(key, base64url(json)))`.
//! A value whose signature does not verify decodes to nothing, the same as a
//! missing cookie.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

use crate::config::SessionConfig;
use crate::domain::session::SessionHandle;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("session handle could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("session signing key is unusable")]
    InvalidKey,
}

#[derive(Clone, Debug)]
pub struct CookieAttributes {
    pub name: String,
    pub secure: bool,
    pub max_age_secs: Option<u64>,
}

impl From<&SessionConfig> for CookieAttributes {
    fn from(config: &SessionConfig) -> Self {
        Self {
            name: config.cookie_name.clone(),
            secure: config.secure_cookie,
            max_age_secs: config.max_age_secs,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionCookieCodec {
    key: SecretString,
    attributes: CookieAttributes,
}

impl SessionCookieCodec {
    pub fn new(key: SecretString, attributes: CookieAttributes) -> Self {
        Self { key, attributes }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.signing_key.clone(), CookieAttributes::from(config))
    }

    pub fn cookie_name(&self) -> &str {
        &self.attributes.name
    }

    pub fn encode(&self, handle: &SessionHandle) -> Result<String, CookieError> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(handle)?);
        let signature = self.sign(payload.as_bytes())?;
        Ok(format!("{payload}.{signature}"))
    }

    pub fn decode(&self, value: &str) -> Option<SessionHandle> {
        let (payload, signature) = value.trim().rsplit_once('.')?;
        let signature = decode_hex(signature)?;

        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes()).ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let raw = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Reads and verifies the session cookie out of a `Cookie` request header.
    pub fn read_from_header(&self, cookie_header: &str) -> Option<SessionHandle> {
        find_cookie(cookie_header, &self.attributes.name).and_then(|value| self.decode(value))
    }

    /// Full `Set-Cookie` header value storing `handle`.
    pub fn set_cookie_header(&self, handle: &SessionHandle) -> Result<String, CookieError> {
        let value = self.encode(handle)?;
        let mut header = format!("{}={value}; HttpOnly; Path=/; SameSite=Lax", self.attributes.name);
        if let Some(max_age) = self.attributes.max_age_secs {
            header.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.attributes.secure {
            header.push_str("; Secure");
        }
        Ok(header)
    }

    /// `Set-Cookie` header value that removes the session cookie.
    pub fn clear_cookie_header(&self) -> String {
        let mut header = format!(
            "{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            self.attributes.name
        );
        if self.attributes.secure {
            header.push_str("; Secure");
        }
        header
    }

    fn sign(&self, payload: &[u8]) -> Result<String, CookieError> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret().as_bytes())
            .map_err(|_| CookieError::InvalidKey)?;
        mac.update(payload);
        Ok(encode_hex(mac.finalize().into_bytes().as_slice()))
    }
}

/// Finds the value of cookie `name` in a `Cookie` header (`a=1; b=2`).
pub fn find_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|index| raw.get(index..index + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}
