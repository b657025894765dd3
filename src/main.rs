//! Docker Image Puller
//!
//! Command line entry point. Parses arguments, runs the requested command and
//! exits non-zero when anything failed.

use docker_image_puller::cli::{Args, Runner};
use std::process;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();
    let runner = Runner::new(args);

    if let Err(e) = runner.run().await {
        runner.output().error(&e.to_string());
        process::exit(1);
    }
}
