use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::PreferenceBackend;
use crate::UserId;
use crate::preference::UserPreference;

/// Process-local backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    users: Mutex<HashMap<UserId, UserPreference>>,
    defaults: Mutex<Option<Vec<String>>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to simulate an unreachable store.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory backend is read-only");
        }
        Ok(())
    }
}

#[async_trait]
impl PreferenceBackend for MemoryBackend {
    async fn load_all(&self) -> Result<Vec<UserPreference>> {
        Ok(self.users.lock().await.values().cloned().collect())
    }

    async fn load_user(&self, user_id: UserId) -> Result<Option<UserPreference>> {
        Ok(self.users.lock().await.get(&user_id).cloned())
    }

    async fn upsert(&self, pref: &UserPreference) -> Result<()> {
        self.check_writable()?;
        self.users.lock().await.insert(pref.user_id, pref.clone());
        Ok(())
    }

    async fn load_defaults(&self) -> Result<Option<Vec<String>>> {
        Ok(self.defaults.lock().await.clone())
    }

    async fn store_defaults(&self, symbols: &[String]) -> Result<()> {
        self.check_writable()?;
        *self.defaults.lock().await = Some(symbols.to_vec());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
