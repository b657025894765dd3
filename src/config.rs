//! Configuration for pull runs: credentials, transport options and output location

use crate::error::{PullerError, Result};
use crate::image::manifest::Platform;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Directory under the download dir that receives the archives
pub const SAVE_DIR_NAME: &str = "download_images";

pub const ENV_USERNAME: &str = "DOCKER_PULLER_USERNAME";
pub const ENV_PASSWORD: &str = "DOCKER_PULLER_PASSWORD";
pub const ENV_PROXY: &str = "DOCKER_PULLER_PROXY";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AuthConfig {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }

    /// Both username and password present and non-empty
    pub fn has_credentials(&self) -> bool {
        matches!(
            (&self.username, &self.password),
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty()
        )
    }

    /// Only one of username and password given; such credentials are ignored
    pub fn is_partial(&self) -> bool {
        let given = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        !self.has_credentials() && (given(&self.username) || given(&self.password))
    }
}

#[derive(Debug, Clone)]
pub struct PullConfig {
    pub download_dir: PathBuf,
    pub auth: AuthConfig,
    /// Per-domain credentials, preferred over `auth`
    pub registry_auth: HashMap<String, AuthConfig>,
    pub skip_tls: bool,
    pub plain_http: bool,
    pub proxy: Option<String>,
    pub use_system_proxy: bool,
    pub platform: Platform,
    pub timeout: Option<Duration>,
    pub fail_fast: bool,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("."),
            auth: AuthConfig::default(),
            registry_auth: HashMap::new(),
            skip_tls: false,
            plain_http: false,
            proxy: None,
            use_system_proxy: true,
            platform: Platform::default(),
            timeout: None,
            fail_fast: false,
        }
    }
}

impl PullConfig {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_registry_auth(mut self, domain: &str, auth: AuthConfig) -> Self {
        self.registry_auth.insert(domain.to_string(), auth);
        self
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    pub fn with_plain_http(mut self, plain_http: bool) -> Self {
        self.plain_http = plain_http;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        self.use_system_proxy = use_system_proxy;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// `<download_dir>/download_images`
    pub fn save_dir(&self) -> PathBuf {
        self.download_dir.join(SAVE_DIR_NAME)
    }

    /// Credentials to use against `domain`, if any complete set applies
    pub fn credentials_for(&self, domain: &str) -> Option<AuthConfig> {
        self.registry_auth
            .get(domain)
            .filter(|auth| auth.has_credentials())
            .or(Some(&self.auth).filter(|auth| auth.has_credentials()))
            .cloned()
    }

    pub fn validate(&self) -> Result<()> {
        if self.download_dir.as_os_str().is_empty() {
            return Err(PullerError::Configuration(
                "Download directory cannot be empty".to_string(),
            ));
        }

        if let Some(proxy) = &self.proxy {
            url::Url::parse(proxy)
                .map_err(|e| PullerError::Configuration(format!("Invalid proxy {}: {}", proxy, e)))?;
        }

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(PullerError::Configuration(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Fill unset credentials and proxy from `DOCKER_PULLER_*` variables
    pub fn from_env(self) -> Self {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.auth.username.is_none() {
            self.auth.username = lookup(ENV_USERNAME);
        }

        if self.auth.password.is_none() {
            self.auth.password = lookup(ENV_PASSWORD);
        }

        if self.proxy.is_none() {
            self.proxy = lookup(ENV_PROXY).filter(|p| !p.is_empty());
        }

        self
    }
}
