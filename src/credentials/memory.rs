//! In-process credential store.
//!
//! Used when no encryption key is configured (nothing survives a restart)
//! and by tests, which read [`MemoryCredentialStore::token_writes`] to check
//! how many rotations were persisted.

use super::{CredentialSet, CredentialStore, Token};
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<String, CredentialSet>>,
    token_writes: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful [`CredentialStore::store_token`] calls so far.
    pub fn token_writes(&self) -> usize {
        self.token_writes.load(Ordering::SeqCst)
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, CredentialSet>>> {
        self.records
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, user_id: &str) -> Result<Option<CredentialSet>> {
        Ok(self.records()?.get(user_id).cloned())
    }

    fn save(&self, user_id: &str, credentials: &CredentialSet) -> Result<()> {
        self.records()?
            .insert(user_id.to_string(), credentials.clone());
        Ok(())
    }

    fn store_token(&self, user_id: &str, token: &Token) -> Result<()> {
        let mut records = self.records()?;
        let Some(existing) = records.get_mut(user_id) else {
            bail!("No credentials linked for user '{}'", user_id);
        };
        *existing = existing.with_token(token.clone());
        self.token_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, user_id: &str) -> Result<bool> {
        Ok(self.records()?.remove(user_id).is_some())
    }
}
