//! Registry client for pulling images over the Docker Registry HTTP API v2
//!
//! A [`RegistryClient`] talks to exactly one registry domain. Every request
//! against a repository first checks the held token and fetches a new one for
//! that repository when it is missing, expired or scoped elsewhere.

use crate::config::AuthConfig;
use crate::error::{PullerError, Result};
use crate::image::digest::DigestUtils;
use crate::image::manifest::{
    Descriptor, Manifest, ManifestResponse, Platform, Tags, manifest_accept_header,
};
use crate::logging::{Logger, NoProgress, ProgressReporter};
use crate::registry::auth::Authenticator;
use crate::registry::token_manager::TokenManager;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub const USER_AGENT: &str = concat!("docker-image-puller/", env!("CARGO_PKG_VERSION"));

pub struct RegistryClientBuilder {
    domain: String,
    credentials: Option<AuthConfig>,
    skip_tls: bool,
    plain_http: bool,
    proxy: Option<String>,
    use_system_proxy: bool,
    timeout: Option<Duration>,
    platform: Platform,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            credentials: None,
            skip_tls: false,
            plain_http: false,
            proxy: None,
            use_system_proxy: true,
            timeout: None,
            platform: Platform::default(),
            output: Logger::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Option<AuthConfig>) -> Self {
        self.credentials = credentials;
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

    /// Honour `HTTP(S)_PROXY` from the environment when no explicit proxy is set
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        self.use_system_proxy = use_system_proxy;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_logger(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let mut builder = Client::builder().user_agent(USER_AGENT);

        if self.skip_tls {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        match &self.proxy {
            Some(proxy) => {
                let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
                    PullerError::Configuration(format!("Invalid proxy {}: {}", proxy, e))
                })?;
                builder = builder.proxy(proxy);
            }
            None if !self.use_system_proxy => builder = builder.no_proxy(),
            None => {}
        }

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder.build()?;
        let scheme = if self.plain_http { "http" } else { "https" };

        Ok(RegistryClient {
            http,
            base_url: format!("{}://{}", scheme, self.domain),
            authenticator: Authenticator::new(&self.domain, self.credentials),
            tokens: TokenManager::new(),
            platform: self.platform,
            output: self.output,
            domain: self.domain,
        })
    }
}

pub struct RegistryClient {
    http: Client,
    domain: String,
    base_url: String,
    authenticator: Authenticator,
    tokens: TokenManager,
    platform: Platform,
    output: Logger,
}

impl RegistryClient {
    pub fn builder(domain: &str) -> RegistryClientBuilder {
        RegistryClientBuilder::new(domain)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Probe the registry and record its authentication challenge
    pub async fn dial(&mut self) -> Result<()> {
        self.authenticator
            .dial(&self.http, &self.base_url, &self.output)
            .await
    }

    pub fn token_expired(&self, repository: &str) -> bool {
        self.tokens.is_expired(repository)
    }

    /// Fetch a pull token for `repository`; the held token survives a failure
    pub async fn get_token(&mut self, repository: &str) -> Result<()> {
        let token = self
            .authenticator
            .request_token(&self.http, repository, &self.output)
            .await?;
        self.tokens.replace(token);
        Ok(())
    }

    async fn ensure_token(&mut self, repository: &str) -> Result<()> {
        if self.authenticator.requires_auth() && self.token_expired(repository) {
            self.output
                .debug(&format!("Token missing or expired for {}, refreshing", repository));
            self.get_token(repository).await?;
        }
        Ok(())
    }

    /// Authenticated `GET <base>/v2/<repository>/<path>`; only 200 is accepted
    pub async fn fetch(
        &mut self,
        repository: &str,
        path: &str,
        accept: Option<&str>,
    ) -> Result<Response> {
        self.ensure_token(repository).await?;

        let url = format!("{}/v2/{}/{}", self.base_url, repository, path);
        self.output.debug(&format!("GET {}", url));

        let mut request = self.http.get(&url);
        if self.authenticator.requires_auth() {
            if let Some(token) = self.tokens.bearer() {
                request = request.bearer_auth(token);
            }
        }
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(PullerError::Registry {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    async fn fetch_manifest(&mut self, repository: &str, reference: &str) -> Result<ManifestResponse> {
        let response = self
            .fetch(
                repository,
                &format!("manifests/{}", reference),
                Some(manifest_accept_header().as_str()),
            )
            .await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.bytes().await?;
        ManifestResponse::from_slice(content_type.as_deref(), &body)
    }

    /// Image manifest for `repository:tag`, resolving manifest lists to the
    /// configured platform
    pub async fn get_manifest(&mut self, repository: &str, tag: &str) -> Result<Manifest> {
        self.output
            .detail(&format!("Fetching manifest for {}:{}", repository, tag));

        let list = match self.fetch_manifest(repository, tag).await? {
            ManifestResponse::Image(manifest) => return Ok(manifest),
            ManifestResponse::List(list) => list,
        };

        let entry = list.select(&self.platform).ok_or_else(|| {
            PullerError::Parse(format!(
                "No manifest for platform {} in {}:{}",
                self.platform, repository, tag
            ))
        })?;
        let digest = entry.digest.clone();
        DigestUtils::split(&digest)?;

        self.output.detail(&format!(
            "Resolved {}:{} for {} to {}",
            repository, tag, self.platform, digest
        ));

        match self.fetch_manifest(repository, &digest).await? {
            ManifestResponse::Image(manifest) => Ok(manifest),
            ManifestResponse::List(_) => Err(PullerError::Parse(format!(
                "Manifest {} for {} is another manifest list",
                digest, repository
            ))),
        }
    }

    pub async fn list_tags(&mut self, repository: &str) -> Result<Tags> {
        let response = self.fetch(repository, "tags/list", None).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Download the config blob to `<digest-hex>.json` in `dir`
    pub async fn get_config_blob(
        &mut self,
        dir: &Path,
        repository: &str,
        manifest: &Manifest,
    ) -> Result<String> {
        let file_name = DigestUtils::blob_file_name(&manifest.config.digest, "json")?;
        self.download_blob(repository, &manifest.config, &dir.join(&file_name), &mut NoProgress)
            .await?;
        Ok(file_name)
    }

    /// Download every layer to `<digest-hex>.tar` in `dir`, in manifest order.
    /// The returned names keep that order, repeats included.
    pub async fn get_layer_blobs(
        &mut self,
        dir: &Path,
        repository: &str,
        manifest: &Manifest,
        progress: &mut dyn ProgressReporter,
    ) -> Result<Vec<String>> {
        let mut files = Vec::with_capacity(manifest.layers.len());
        for (index, layer) in manifest.layers.iter().enumerate() {
            let file_name = DigestUtils::blob_file_name(&layer.digest, "tar")?;
            if files.contains(&file_name) {
                files.push(file_name);
                continue;
            }

            self.output.step(&format!(
                "Layer {}/{}: {} ({})",
                index + 1,
                manifest.layers.len(),
                DigestUtils::short(&layer.digest),
                self.output.format_size(layer.size)
            ));
            self.download_blob(repository, layer, &dir.join(&file_name), progress)
                .await?;
            files.push(file_name);
        }
        Ok(files)
    }

    /// Stream one blob to `path`, reporting bytes written
    pub async fn download_blob(
        &mut self,
        repository: &str,
        descriptor: &Descriptor,
        path: &Path,
        progress: &mut dyn ProgressReporter,
    ) -> Result<u64> {
        let response = self
            .fetch(
                repository,
                &format!("blobs/{}", descriptor.digest),
                descriptor.media_type.as_deref(),
            )
            .await?;

        let total = response.content_length().unwrap_or(descriptor.size);
        progress.start(DigestUtils::short(&descriptor.digest), total);

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.advance(written);
        }
        file.flush().await?;
        progress.finish();

        Ok(written)
    }
}
