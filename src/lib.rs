//! Docker Image Puller Library
//!
//! Pulls images from Docker Registry API v2 servers without a container daemon and
//! packages each one as a `docker load` compatible `.tar.gz`.

pub mod cli;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod pipeline;
pub mod registry;

pub use config::{AuthConfig, PullConfig};
pub use error::{PullerError, Result};
pub use image::ImageReference;
pub use logging::Logger;
pub use pipeline::{ImagePuller, PullOutcome, PullReport};
