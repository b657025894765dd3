//! Registry module for Docker registry interactions
//!
//! This module provides the authentication handshake and client logic for pulling from
//! the Docker Registry HTTP API v2: challenge parsing, repository-scoped bearer tokens,
//! manifest and blob retrieval, and a per-run cache of clients keyed by domain.

pub mod auth;
pub mod cache;
pub mod challenge;
pub mod client;
pub mod token_manager;

pub use auth::Authenticator;
pub use cache::RegistryCache;
pub use challenge::{Challenge, parse_challenges};
pub use client::{RegistryClient, RegistryClientBuilder};
pub use token_manager::{BearerToken, TokenManager};
