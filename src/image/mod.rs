//! Image-side types: references, registry manifests, digests and the output archive.
//!
//! [`ImageReference`] turns user input into registry coordinates, [`manifest`] holds
//! the documents a registry serves, and [`ImageArchive`] writes the `docker load`
//! compatible `.tar.gz` built from downloaded blobs.

pub mod archive;
pub mod digest;
pub mod manifest;
pub mod reference;

pub use archive::ImageArchive;
pub use digest::DigestUtils;
pub use manifest::{
    ArchiveDescriptor, Descriptor, Manifest, ManifestList, ManifestResponse, Platform, Tags,
};
pub use reference::ImageReference;
