//! Fetch-and-package pipeline
//!
//! References are processed one at a time: parse, skip when the archive is
//! already present, reuse or dial the domain's client, download manifest,
//! config and layers into a scratch directory, then write the archive.

use crate::config::PullConfig;
use crate::error::{PullerError, Result};
use crate::image::archive::ImageArchive;
use crate::image::manifest::ArchiveDescriptor;
use crate::image::reference::ImageReference;
use crate::logging::{Logger, NoProgress, ProgressReporter};
use crate::registry::cache::RegistryCache;
use crate::registry::client::{RegistryClient, RegistryClientBuilder};
use std::collections::HashMap;
use std::path::PathBuf;

/// What happened to one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Pulled { path: PathBuf, size: u64 },
    AlreadyPresent(PathBuf),
    Skipped(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub pulled: Vec<String>,
    pub existing: Vec<String>,
    pub skipped: Vec<String>,
    /// Reference and error message
    pub failed: Vec<(String, String)>,
}

impl PullReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.pulled.len() + self.existing.len() + self.skipped.len() + self.failed.len()
    }
}

pub struct ImagePuller {
    config: PullConfig,
    cache: RegistryCache,
    output: Logger,
    progress: Box<dyn ProgressReporter>,
    /// Domains that failed authentication for every repository, with the
    /// first error message
    failed_domains: HashMap<String, String>,
}

impl ImagePuller {
    pub fn new(config: PullConfig, output: Logger) -> Self {
        Self {
            config,
            cache: RegistryCache::new(),
            output,
            progress: Box::new(NoProgress),
            failed_domains: HashMap::new(),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PullConfig {
        &self.config
    }

    pub fn cache(&self) -> &RegistryCache {
        &self.cache
    }

    /// Final archive location for an image
    pub fn archive_path(&self, image: &ImageReference) -> PathBuf {
        self.config.save_dir().join(image.archive_file_name())
    }

    /// Pull every reference in order.
    ///
    /// Failures are recorded and the batch continues, unless `fail_fast` is
    /// set, in which case the first failure is returned.
    pub async fn pull_all(&mut self, references: &[String]) -> Result<PullReport> {
        let mut report = PullReport::default();

        for (index, reference) in references.iter().enumerate() {
            self.output.section(&format!(
                "[{}/{}] {}",
                index + 1,
                references.len(),
                reference
            ));

            match self.pull(reference).await {
                Ok(PullOutcome::Pulled { path, size }) => {
                    self.output.success(&format!(
                        "Saved {} ({})",
                        path.display(),
                        self.output.format_size(size)
                    ));
                    report.pulled.push(reference.clone());
                }
                Ok(PullOutcome::AlreadyPresent(path)) => {
                    self.output
                        .info(&format!("Archive already exists, skipping: {}", path.display()));
                    report.existing.push(reference.clone());
                }
                Ok(PullOutcome::Skipped(reason)) => {
                    self.output.warning(&reason);
                    report.skipped.push(reference.clone());
                }
                Err(err) => {
                    self.output
                        .error(&format!("Failed to pull {}: {}", reference, err));
                    if self.config.fail_fast {
                        return Err(err);
                    }
                    report.failed.push((reference.clone(), err.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Pull a single reference into its archive
    pub async fn pull(&mut self, reference: &str) -> Result<PullOutcome> {
        let image = ImageReference::parse(reference);
        if !image.is_complete() {
            return Ok(PullOutcome::Skipped(
                PullerError::ReferenceMalformed(reference.to_string()).to_string(),
            ));
        }

        let destination = self.archive_path(&image);
        if tokio::fs::try_exists(&destination).await? {
            return Ok(PullOutcome::AlreadyPresent(destination));
        }

        if let Some(message) = self.failed_domains.get(&image.domain) {
            return Err(PullerError::auth(
                &image.domain,
                format!("skipped after earlier failure: {}", message),
            ));
        }

        self.output.detail(&format!(
            "Registry: {}, repository: {}, tag: {}",
            image.domain, image.repository, image.tag
        ));

        let result = self.fetch_and_package(&image, destination).await;
        if let Err(PullerError::Auth { message, .. }) = &result {
            if self.domain_unusable(&image.domain) {
                self.output.detail(&format!(
                    "Not contacting {} again for the remaining images",
                    image.domain
                ));
                self.failed_domains
                    .entry(image.domain.clone())
                    .or_insert_with(|| message.clone());
            }
        }
        result
    }

    /// True when an auth failure holds for every repository on `domain`: the
    /// probe failed and nothing was cached, or the registry offered no realm.
    /// A token refused for one repository leaves the domain usable.
    fn domain_unusable(&mut self, domain: &str) -> bool {
        match self.cache.get(domain) {
            Some(client) => !client.authenticator().can_request_tokens(),
            None => true,
        }
    }

    fn client_builder(&self, domain: &str) -> RegistryClientBuilder {
        RegistryClient::builder(domain)
            .with_credentials(self.config.credentials_for(domain))
            .with_skip_tls(self.config.skip_tls)
            .with_plain_http(self.config.plain_http)
            .with_proxy(self.config.proxy.clone())
            .with_system_proxy(self.config.use_system_proxy)
            .with_timeout(self.config.timeout)
            .with_platform(self.config.platform.clone())
            .with_logger(self.output.clone())
    }

    async fn fetch_and_package(
        &mut self,
        image: &ImageReference,
        destination: PathBuf,
    ) -> Result<PullOutcome> {
        tokio::fs::create_dir_all(self.config.save_dir()).await?;

        let work_dir = tempfile::Builder::new()
            .prefix("docker-image-puller-")
            .tempdir()?;
        self.output
            .debug(&format!("Working directory: {}", work_dir.path().display()));

        let builder = self.client_builder(&image.domain);
        let client = self
            .cache
            .get_or_dial(&image.domain, move || builder.build())
            .await?;

        let manifest = client.get_manifest(&image.repository, &image.tag).await?;
        self.output.info(&format!(
            "Manifest: {} layer(s), {}",
            manifest.layers.len(),
            self.output.format_size(manifest.total_size())
        ));

        let config_file = client
            .get_config_blob(work_dir.path(), &image.repository, &manifest)
            .await?;
        let layers = client
            .get_layer_blobs(
                work_dir.path(),
                &image.repository,
                &manifest,
                self.progress.as_mut(),
            )
            .await?;

        let descriptor = ArchiveDescriptor {
            config: config_file,
            repo_tags: vec![image.repo_tag()],
            layers,
        };
        ImageArchive::write_descriptor(work_dir.path(), &descriptor)?;

        self.output.step("Compressing archive");
        let work_path = work_dir.path().to_path_buf();
        let archive_path = destination.clone();
        let size = tokio::task::spawn_blocking(move || {
            ImageArchive::create(&work_path, &descriptor, &archive_path)
        })
        .await
        .map_err(std::io::Error::other)??;

        work_dir.close()?;
        Ok(PullOutcome::Pulled {
            path: destination,
            size,
        })
    }
}
