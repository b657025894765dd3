//! Command line interface module
//!
//! Argument parsing for the `pull` and `tags` commands and the runner that turns
//! them into registry calls.

pub mod args;
pub mod runner;

pub use args::{Args, Command, PullArgs, RegistryArgs, TagsArgs};
pub use runner::Runner;
