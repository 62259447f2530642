//! RCON password lookup
//!
//! Passwords may be stored encrypted; implementations hand back the
//! plaintext ready for the control client.

use crate::config::RconSettings;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Source of RCON passwords, keyed by server address
#[async_trait]
pub trait SecretsStore: Send + Sync {
    /// Plaintext password for a server, if one is known
    async fn rcon_password(&self, host: &str, port: u16) -> Result<Option<String>>;
}

/// Passwords held in memory, loaded from the `[rcon.passwords]` table
#[derive(Debug, Clone, Default)]
pub struct StaticSecretsStore {
    passwords: HashMap<String, String>,
}

impl StaticSecretsStore {
    pub fn new(passwords: HashMap<String, String>) -> Self {
        let passwords = passwords
            .into_iter()
            .map(|(address, password)| (address.trim().to_lowercase(), password))
            .collect();
        Self { passwords }
    }

    pub fn from_settings(settings: &RconSettings) -> Self {
        Self::new(settings.passwords.clone())
    }

    pub fn insert(&mut self, host: &str, port: u16, password: impl Into<String>) {
        self.passwords
            .insert(Self::address_key(host, port), password.into());
    }

    fn address_key(host: &str, port: u16) -> String {
        format!("{}:{}", host.trim().to_lowercase(), port)
    }
}

#[async_trait]
impl SecretsStore for StaticSecretsStore {
    async fn rcon_password(&self, host: &str, port: u16) -> Result<Option<String>> {
        Ok(self.passwords.get(&Self::address_key(host, port)).cloned())
    }
}
