//! Archive writing for pulled images
//!
//! The produced `.tar.gz` follows the `docker save` layout: a `manifest.json`
//! array at the root next to the config JSON and one tar per layer.

use crate::error::{PullerError, Result};
use crate::image::manifest::ArchiveDescriptor;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const ARCHIVE_MANIFEST_FILE: &str = "manifest.json";

pub struct ImageArchive;

impl ImageArchive {
    /// Write `manifest.json` (a one-element array) into `work_dir`
    pub fn write_descriptor(work_dir: &Path, descriptor: &ArchiveDescriptor) -> Result<PathBuf> {
        let path = work_dir.join(ARCHIVE_MANIFEST_FILE);
        let file = File::create(&path)?;
        serde_json::to_writer(file, &[descriptor])?;
        Ok(path)
    }

    /// Archive members in write order; a layer listed twice is stored once
    pub fn entries(descriptor: &ArchiveDescriptor) -> Vec<String> {
        let mut entries = vec![descriptor.config.clone()];
        for layer in &descriptor.layers {
            if !entries.contains(layer) {
                entries.push(layer.clone());
            }
        }
        entries.push(ARCHIVE_MANIFEST_FILE.to_string());
        entries
    }

    /// Compress the descriptor's files from `work_dir` into `destination`.
    ///
    /// The archive is assembled in a temporary file next to `destination` and
    /// renamed over it only once complete, so an interrupted write never leaves
    /// a truncated archive at the final path. Returns the archive size.
    pub fn create(
        work_dir: &Path,
        descriptor: &ArchiveDescriptor,
        destination: &Path,
    ) -> Result<u64> {
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let partial = tempfile::Builder::new()
            .prefix(".docker-image-puller-")
            .suffix(".partial")
            .tempfile_in(parent)?;

        {
            let encoder = GzEncoder::new(partial.as_file(), Compression::default());
            let mut builder = tar::Builder::new(encoder);
            for name in Self::entries(descriptor) {
                builder.append_path_with_name(work_dir.join(&name), &name)?;
            }
            builder.into_inner()?.finish()?;
        }

        let file = partial.as_file();
        file.sync_all()?;
        let size = file.metadata()?.len();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }

        partial
            .persist(destination)
            .map_err(|e| PullerError::Io(e.error))?;
        Ok(size)
    }
}
