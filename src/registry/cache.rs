//! Per-run cache of dialed registry clients, keyed by domain

use crate::error::Result;
use crate::registry::client::RegistryClient;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

#[derive(Default)]
pub struct RegistryCache {
    clients: HashMap<String, RegistryClient>,
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, domain: &str) -> Option<&mut RegistryClient> {
        self.clients.get_mut(domain)
    }

    pub fn put(&mut self, domain: &str, client: RegistryClient) {
        self.clients.insert(domain.to_string(), client);
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.clients.contains_key(domain)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Cached client for `domain`, or a new one from `build` that is dialed
    /// before being stored. A failed dial caches nothing.
    pub async fn get_or_dial<F>(&mut self, domain: &str, build: F) -> Result<&mut RegistryClient>
    where
        F: FnOnce() -> Result<RegistryClient>,
    {
        match self.clients.entry(domain.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut client = build()?;
                client.dial().await?;
                Ok(entry.insert(client))
            }
        }
    }
}
