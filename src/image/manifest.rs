//! Registry manifest documents and the archive descriptor written for `docker load`

use crate::error::{PullerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Accept header for manifest requests, single-image manifests first
pub fn manifest_accept_header() -> String {
    [
        MEDIA_TYPE_DOCKER_MANIFEST,
        MEDIA_TYPE_DOCKER_MANIFEST_LIST,
        MEDIA_TYPE_OCI_MANIFEST,
        MEDIA_TYPE_OCI_INDEX,
    ]
    .join(", ")
}

/// Reference to a blob or manifest inside a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Docker image manifest v2 schema 2 (or the equivalent OCI manifest)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    pub fn total_size(&self) -> u64 {
        self.config.size + self.layers.iter().map(|l| l.size).sum::<u64>()
    }
}

/// Docker manifest list or OCI image index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
}

impl ManifestList {
    pub fn select(&self, platform: &Platform) -> Option<&Descriptor> {
        self.manifests
            .iter()
            .find(|m| m.platform.as_ref().is_some_and(|p| platform.matches(p)))
    }
}

/// Either kind of document a manifest endpoint can return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestResponse {
    Image(Manifest),
    List(ManifestList),
}

impl ManifestResponse {
    /// Decode a manifest body; lists are recognised by content type or by
    /// their `manifests` array when the registry sends a generic type.
    pub fn from_slice(content_type: Option<&str>, body: &[u8]) -> Result<Self> {
        let is_list_type = content_type.is_some_and(|ct| {
            ct.starts_with(MEDIA_TYPE_DOCKER_MANIFEST_LIST) || ct.starts_with(MEDIA_TYPE_OCI_INDEX)
        });

        let value: serde_json::Value = serde_json::from_slice(body)?;
        if is_list_type || value.get("manifests").is_some() {
            return Ok(ManifestResponse::List(serde_json::from_value(value)?));
        }

        if value.get("schemaVersion").and_then(|v| v.as_u64()) == Some(1) {
            return Err(PullerError::Parse(
                "Manifest schema version 1 is not supported".to_string(),
            ));
        }

        Ok(ManifestResponse::Image(serde_json::from_value(value)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    pub fn new(os: &str, architecture: &str) -> Self {
        Self {
            os: os.to_string(),
            architecture: architecture.to_string(),
            variant: None,
        }
    }

    /// A wanted platform without a variant accepts any variant
    pub fn matches(&self, candidate: &Platform) -> bool {
        self.os == candidate.os
            && self.architecture == candidate.architecture
            && (self.variant.is_none() || self.variant == candidate.variant)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new("linux", "amd64")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{}/{}", self.os, self.architecture, variant),
            None => write!(f, "{}/{}", self.os, self.architecture),
        }
    }
}

impl FromStr for Platform {
    type Err = PullerError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(PullerError::Configuration(format!("Invalid platform: {}", s)));
        }
        match parts.as_slice() {
            [os, arch] => Ok(Platform::new(os, arch)),
            [os, arch, variant] => Ok(Platform {
                variant: Some(variant.to_string()),
                ..Platform::new(os, arch)
            }),
            _ => Err(PullerError::Configuration(format!(
                "Invalid platform {}, expected os/arch[/variant]",
                s
            ))),
        }
    }
}

/// Response of `GET /v2/<name>/tags/list`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One entry of the `manifest.json` array inside a `docker save` style archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    #[serde(rename = "Config")]
    pub config: String,
    #[serde(rename = "RepoTags")]
    pub repo_tags: Vec<String>,
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}
