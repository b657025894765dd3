//! Runner wiring parsed arguments to the pull pipeline

use crate::cli::args::{Args, Command, PullArgs, TagsArgs};
use crate::config::PullConfig;
use crate::error::{PullerError, Result};
use crate::image::reference::ImageReference;
use crate::logging::{Logger, ProgressTracker};
use crate::pipeline::{ImagePuller, PullReport};
use crate::registry::client::RegistryClient;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };

        Self { args, output }
    }

    pub fn output(&self) -> &Logger {
        &self.output
    }

    pub async fn run(&self) -> Result<()> {
        match &self.args.command {
            Command::Pull(pull) => self.run_pull(pull).await,
            Command::Tags(tags) => self.run_tags(tags).await,
        }
    }

    async fn run_pull(&self, args: &PullArgs) -> Result<()> {
        self.output.section("Docker Image Puller");
        let config = args.to_config()?;

        self.output.info(&format!(
            "Saving {} image(s) to {}",
            args.images.len(),
            config.save_dir().display()
        ));
        self.output.detail(&format!("Platform: {}", config.platform));
        if config.auth.has_credentials() {
            self.output.detail("Using registry credentials");
        }
        self.warn_partial_credentials(&config);

        let mut puller = ImagePuller::new(config, self.output.clone())
            .with_progress(Box::new(ProgressTracker::new(self.output.clone())));
        let report = puller.pull_all(&args.images).await?;

        self.print_summary(&report);

        if report.is_success() {
            Ok(())
        } else {
            Err(PullerError::Incomplete {
                failed: report.failed.len(),
                total: report.total(),
            })
        }
    }

    async fn run_tags(&self, args: &TagsArgs) -> Result<()> {
        let config = args.to_config()?;
        self.warn_partial_credentials(&config);
        let image = ImageReference::parse(&args.image);
        if !image.is_complete() {
            return Err(PullerError::ReferenceMalformed(args.image.clone()));
        }

        let mut client = RegistryClient::builder(&image.domain)
            .with_credentials(config.credentials_for(&image.domain))
            .with_skip_tls(config.skip_tls)
            .with_plain_http(config.plain_http)
            .with_proxy(config.proxy.clone())
            .with_system_proxy(config.use_system_proxy)
            .with_timeout(config.timeout)
            .with_logger(self.output.clone())
            .build()?;
        client.dial().await?;

        let tags = client.list_tags(&image.repository).await?;
        self.output
            .section(&format!("Tags for {}/{}", image.domain, tags.name));
        for tag in &tags.tags {
            println!("{}", tag);
        }
        self.output
            .detail(&format!("{} tag(s) found", tags.tags.len()));
        Ok(())
    }

    fn warn_partial_credentials(&self, config: &PullConfig) {
        if config.auth.is_partial() {
            self.output
                .warning("Username and password must be given together, pulling anonymously");
        }
    }

    fn print_summary(&self, report: &PullReport) {
        self.output.summary_kv(
            "Summary",
            &[
                ("Pulled", report.pulled.len().to_string()),
                ("Already present", report.existing.len().to_string()),
                ("Skipped", report.skipped.len().to_string()),
                ("Failed", report.failed.len().to_string()),
                (
                    "Elapsed",
                    self.output.format_duration(self.output.elapsed()),
                ),
            ],
        );
        for (reference, message) in &report.failed {
            self.output.error(&format!("{}: {}", reference, message));
        }
    }
}
