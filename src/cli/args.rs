//! Command-line argument parsing

use crate::config::{AuthConfig, PullConfig};
use crate::error::{PullerError, Result};
use crate::image::manifest::Platform;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "docker-image-puller")]
#[command(about = "Pull Docker images from a registry into docker-load compatible archives")]
#[command(version, author)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', global = true, alias = "debug")]
    pub verbose: bool,

    /// Only print errors and the final summary
    #[arg(long = "quiet", short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull one or more images and save each as a .tar.gz archive
    Pull(PullArgs),
    /// List the tags of a repository
    Tags(TagsArgs),
}

/// Options shared by every command that talks to a registry
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Registry username
    #[arg(long = "registry-user", short = 'u')]
    pub username: Option<String>,

    /// Registry password
    #[arg(long = "registry-password", short = 'p')]
    pub password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long = "skip-tls", short = 'k')]
    pub skip_tls: bool,

    /// Talk plain HTTP to the registry
    #[arg(long = "plain-http")]
    pub plain_http: bool,

    /// Proxy URL for all registry traffic
    #[arg(long = "proxy", conflicts_with = "no_proxy")]
    pub proxy: Option<String>,

    /// Ignore proxy settings from the environment
    #[arg(long = "no-proxy")]
    pub no_proxy: bool,

    /// Timeout in seconds for each request
    #[arg(long = "timeout", short = 't')]
    pub timeout: Option<u64>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PullArgs {
    /// Images to pull, e.g. busybox, library/busybox:latest, localhost:5000/app:v1
    #[arg(required = true)]
    pub images: Vec<String>,

    /// Directory that receives the download_images folder
    #[arg(long = "download-dir", short = 'd', default_value = ".")]
    pub download_dir: PathBuf,

    /// Platform to select from multi-arch images
    #[arg(long = "platform", default_value = "linux/amd64")]
    pub platform: String,

    /// Stop at the first image that fails
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct TagsArgs {
    /// Repository to list, e.g. busybox or localhost:5000/team/app
    pub image: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}

impl RegistryArgs {
    /// Build the registry side of a [`PullConfig`], environment fallbacks included
    pub fn to_config(&self, download_dir: PathBuf) -> PullConfig {
        PullConfig::new(download_dir)
            .with_auth(AuthConfig {
                username: self.username.clone(),
                password: self.password.clone(),
            })
            .with_skip_tls(self.skip_tls)
            .with_plain_http(self.plain_http)
            .with_proxy(self.proxy.clone())
            .with_system_proxy(!self.no_proxy)
            .with_timeout(self.timeout.map(Duration::from_secs))
            .from_env()
    }
}

impl PullArgs {
    pub fn to_config(&self) -> Result<PullConfig> {
        let platform: Platform = self.platform.parse()?;
        let config = self
            .registry
            .to_config(self.download_dir.clone())
            .with_platform(platform)
            .with_fail_fast(self.fail_fast);
        config.validate()?;
        Ok(config)
    }
}

impl TagsArgs {
    pub fn to_config(&self) -> Result<PullConfig> {
        let config = self.registry.to_config(PathBuf::from("."));
        config.validate()?;
        if self.image.trim().is_empty() {
            return Err(PullerError::Configuration(
                "Image name cannot be empty".to_string(),
            ));
        }
        Ok(config)
    }
}
