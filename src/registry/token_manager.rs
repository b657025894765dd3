//! Bearer token lifetime and scope tracking
//!
//! Registry tokens are JWTs. Their payload carries an `exp` timestamp and the
//! list of repositories the token grants access to. Both are decoded from the
//! token string on every check and never cached, so a token obtained for one
//! repository reads as expired when another repository is requested.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token endpoint response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub issued_at: Option<String>,
}

impl BearerToken {
    /// The credential to send; some token servers only fill `access_token`
    pub fn value(&self) -> Option<&str> {
        [self.token.as_str(), self.access_token.as_str()]
            .into_iter()
            .find(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Access {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// The JWT claims the expiry check reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub access: Vec<Access>,
}

impl TokenClaims {
    pub fn grants(&self, repository: &str) -> bool {
        self.access.iter().any(|a| a.name == repository)
    }
}

/// Decode the payload segment of a JWT without verifying its signature
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Holds the current token of one registry client
#[derive(Debug, Clone, Default)]
pub struct TokenManager {
    current: Option<BearerToken>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expired(&self, repository: &str) -> bool {
        self.is_expired_at(repository, now_unix())
    }

    /// Expired when there is no token, the payload cannot be decoded, `exp`
    /// is not in the future, or `repository` is missing from `access`
    pub fn is_expired_at(&self, repository: &str, now: i64) -> bool {
        let Some(token) = self.current.as_ref().and_then(BearerToken::value) else {
            return true;
        };
        match decode_claims(token) {
            Some(claims) => claims.exp <= now || !claims.grants(repository),
            None => true,
        }
    }

    pub fn replace(&mut self, token: BearerToken) {
        self.current = Some(token);
    }

    /// Value for the `Authorization: Bearer` header
    pub fn bearer(&self) -> Option<&str> {
        self.current.as_ref().and_then(BearerToken::value)
    }
}
