//! Image reference parsing
//!
//! Splits strings such as `busybox`, `library/busybox:1.36` or
//! `localhost:5000/team/app:v2` into registry domain, repository and tag.
//!
//! The first path segment is only taken as a registry domain when it contains a
//! `.`, contains a `:` (port) or is exactly `localhost`. A private registry
//! reachable through a bare hostname such as `registry/app` is therefore read as
//! the repository `registry/app` on Docker Hub; such registries must be named
//! with a port or a dotted name.

use crate::error::PullerError;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DOMAIN: &str = "registry-1.docker.io";
pub const DEFAULT_TAG: &str = "latest";
pub const OFFICIAL_NAMESPACE: &str = "library";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub domain: String,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(domain: &str, repository: &str, tag: &str) -> Self {
        Self {
            domain: domain.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        }
    }

    /// Parse a reference and apply registry and tag defaults.
    ///
    /// Never fails: an empty or unusable string comes back with empty fields,
    /// which [`ImageReference::is_complete`] reports.
    pub fn parse(reference: &str) -> Self {
        Self::decompose(reference).with_defaults()
    }

    /// Structural split without any defaults applied
    pub fn decompose(reference: &str) -> Self {
        let reference = reference.trim();
        if reference.is_empty() {
            return Self::default();
        }

        // A '/' after the last ':' means the colon separated a port, not a tag
        let (remainder, tag) = match reference.rsplit_once(':') {
            Some((head, last)) if !last.contains('/') => (head, last),
            _ => (reference, ""),
        };

        let (domain, repository) = match remainder.split_once('/') {
            Some((first, rest)) if is_domain(first) => (first, rest),
            None if is_domain(remainder) => (remainder, ""),
            _ => ("", remainder),
        };

        Self::new(domain, repository, tag)
    }

    /// Fill in Docker Hub and `latest` where the reference left them out
    pub fn with_defaults(mut self) -> Self {
        if self.domain.is_empty() {
            self.domain = DEFAULT_DOMAIN.to_string();
            if !self.repository.is_empty() && !self.repository.contains('/') {
                self.repository = format!("{}/{}", OFFICIAL_NAMESPACE, self.repository);
            }
        }
        if self.tag.is_empty() {
            self.tag = DEFAULT_TAG.to_string();
        }
        self
    }

    pub fn is_complete(&self) -> bool {
        !self.domain.is_empty() && !self.repository.is_empty() && !self.tag.is_empty()
    }

    /// `repository:tag`, the name an image gets after `docker load`
    pub fn repo_tag(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// File name of the archive produced for this image
    pub fn archive_file_name(&self) -> String {
        format!("{}_{}.tar.gz", self.repository.replace('/', "_"), self.tag)
    }
}

fn is_domain(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.domain.is_empty() {
            write!(f, "{}", self.repo_tag())
        } else {
            write!(f, "{}/{}", self.domain, self.repo_tag())
        }
    }
}

impl FromStr for ImageReference {
    type Err = PullerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let image = Self::parse(s);
        if image.is_complete() {
            Ok(image)
        } else {
            Err(PullerError::ReferenceMalformed(s.to_string()))
        }
    }
}
