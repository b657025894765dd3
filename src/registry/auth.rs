//! Authentication handshake with a registry domain
//!
//! [`Authenticator::dial`] probes `/v2/` without credentials and records the
//! bearer challenge the registry answers with. Tokens are then requested per
//! repository from the advertised realm.

use crate::config::AuthConfig;
use crate::error::{PullerError, Result};
use crate::logging::Logger;
use crate::registry::challenge::{bearer_realm, parse_challenges};
use crate::registry::token_manager::BearerToken;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{Client, StatusCode};
use url::Url;

#[derive(Debug, Clone)]
pub struct Authenticator {
    domain: String,
    realm: String,
    service: String,
    credentials: Option<AuthConfig>,
    requires_auth: bool,
}

impl Authenticator {
    /// Credentials are only used when both username and password are set
    pub fn new(domain: &str, credentials: Option<AuthConfig>) -> Self {
        Self {
            domain: domain.to_string(),
            realm: String::new(),
            service: String::new(),
            credentials: credentials.filter(AuthConfig::has_credentials),
            requires_auth: true,
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// False once the probe was answered without a challenge
    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    /// False when the registry wants a token but the probe left no usable
    /// realm to ask for one, so no repository on this domain can be pulled
    pub fn can_request_tokens(&self) -> bool {
        !self.requires_auth || Url::parse(&self.realm).is_ok()
    }

    /// Probe `<base_url>/v2/` and record the bearer realm and service
    pub async fn dial(&mut self, http: &Client, base_url: &str, output: &Logger) -> Result<()> {
        let url = format!("{}/v2/", base_url);
        output.detail(&format!("Probing registry API at {}", url));

        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| PullerError::auth(&self.domain, format!("registry probe failed: {}", e)))?;
        let status = response.status();
        output.debug(&format!("Probe response status: {}", status));

        if status.is_success() {
            output.detail(&format!("{} does not require authentication", self.domain));
            self.requires_auth = false;
            return Ok(());
        }

        if status != StatusCode::UNAUTHORIZED {
            return Err(PullerError::auth(
                &self.domain,
                format!("registry probe {} returned HTTP {}", url, status.as_u16()),
            ));
        }

        let values: Vec<&str> = response
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let challenges = parse_challenges(values);
        output.debug(&format!("Parsed {} authentication challenge(s)", challenges.len()));

        self.requires_auth = true;
        match bearer_realm(&challenges) {
            Some((realm, service)) => {
                output.detail(&format!("Auth realm: {}, service: {}", realm, service));
                self.realm = realm;
                self.service = service;
            }
            None => output.warning(&format!(
                "{} requires authentication but offered no bearer challenge",
                self.domain
            )),
        }
        Ok(())
    }

    /// Request a pull token for `repository` from the recorded realm
    pub async fn request_token(
        &self,
        http: &Client,
        repository: &str,
        output: &Logger,
    ) -> Result<BearerToken> {
        if self.realm.is_empty() {
            return Err(PullerError::auth(
                &self.domain,
                "registry did not advertise a bearer token realm",
            ));
        }

        let scope = format!("repository:{}:pull", repository);
        let url = Url::parse_with_params(
            &self.realm,
            &[("service", self.service.as_str()), ("scope", scope.as_str())],
        )
        .map_err(|e| PullerError::auth(&self.domain, format!("invalid realm {}: {}", self.realm, e)))?;

        output.detail(&format!("Requesting token from: {}", url));

        let mut request = http.get(url);
        if let Some(AuthConfig {
            username: Some(username),
            password,
        }) = &self.credentials
        {
            output.debug(&format!("Using basic credentials for user {}", username));
            request = request.basic_auth(username, password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PullerError::auth(&self.domain, format!("token request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(PullerError::auth(
                &self.domain,
                format!("token request for {} returned HTTP {}", repository, status.as_u16()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PullerError::auth(&self.domain, format!("token response unreadable: {}", e)))?;
        let token: BearerToken = serde_json::from_slice(&body)
            .map_err(|e| PullerError::auth(&self.domain, format!("token response malformed: {}", e)))?;

        if token.value().is_none() {
            return Err(PullerError::auth(&self.domain, "token response carried no token"));
        }

        output.detail(&format!("Token obtained for {}", repository));
        if token.expires_in > 0 {
            output.debug(&format!("Token expires in {} seconds", token.expires_in));
        }
        Ok(token)
    }
}
