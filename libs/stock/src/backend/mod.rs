//! Persistence for user preferences and the default ticker list.

mod json_file;
mod memory;
mod redis;

use std::{env, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::UserId;
use crate::preference::UserPreference;

pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;
pub use redis::RedisBackend;

#[async_trait]
pub trait PreferenceBackend: Send + Sync {
    /// Every stored record, read once at startup.
    async fn load_all(&self) -> Result<Vec<UserPreference>>;

    async fn load_user(&self, user_id: UserId) -> Result<Option<UserPreference>>;

    async fn upsert(&self, pref: &UserPreference) -> Result<()>;

    async fn load_defaults(&self) -> Result<Option<Vec<String>>>;

    async fn store_defaults(&self, symbols: &[String]) -> Result<()>;

    /// Make pending writes durable.
    async fn flush(&self) -> Result<()>;
}

/// Redis when `REDIS_URL` is set, otherwise the JSON file at `USER_DATA_FILE`.
pub async fn backend_from_env() -> Result<Arc<dyn PreferenceBackend>> {
    if let Ok(redis_url) = env::var("REDIS_URL") {
        let key_prefix = env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "stockbot".to_string());
        info!(key_prefix = %key_prefix, "using redis preference backend");
        return Ok(Arc::new(RedisBackend::new(&redis_url, key_prefix).await?));
    }

    let path = env::var("USER_DATA_FILE").unwrap_or_else(|_| "user_data.json".to_string());
    info!(path = %path, "using json file preference backend");
    Ok(Arc::new(JsonFileBackend::open(path).await?))
}
