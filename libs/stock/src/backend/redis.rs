use std::{collections::HashMap, time::Duration};

use anyhow::{Error, Result};
use async_trait::async_trait;
use fred::prelude::*;
use tracing::error;

use super::PreferenceBackend;
use crate::UserId;
use crate::preference::UserPreference;

/// Users live in one hash (field = user id, value = JSON record);
/// the default list is a JSON array under its own key.
#[derive(Clone)]
pub struct RedisBackend {
    client: Client,
    key_prefix: String,
}

impl RedisBackend {
    pub async fn new(redis_url: &str, key: impl Into<String>) -> Result<Self> {
        let config = Config::from_url(redis_url)?;

        let client = Builder::from_config(config)
            .with_connection_config(|config| {
                config.connection_timeout = Duration::from_secs(5);
                config.tcp = TcpConfig {
                    nodelay: Some(true),
                    ..Default::default()
                };
            })
            .build()?;

        client.on_error(|(error, server)| async move {
            error!(?server, ?error, "redis connection error");
            Ok(())
        });

        client.connect();
        client.wait_for_connect().await?;

        Ok(Self {
            client,
            key_prefix: key.into(),
        })
    }

    fn users_key(&self) -> String {
        format!("{}:users", self.key_prefix)
    }

    fn defaults_key(&self) -> String {
        format!("{}:default_tickers", self.key_prefix)
    }
}

#[async_trait]
impl PreferenceBackend for RedisBackend {
    async fn load_all(&self) -> Result<Vec<UserPreference>> {
        let raw: HashMap<String, String> = self.client.hgetall(self.users_key()).await?;

        raw.into_values()
            .map(|json| serde_json::from_str(&json).map_err(Error::from))
            .collect()
    }

    async fn load_user(&self, user_id: UserId) -> Result<Option<UserPreference>> {
        let raw: Option<String> = self
            .client
            .hget(self.users_key(), user_id.to_string())
            .await?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Error::from)
    }

    async fn upsert(&self, pref: &UserPreference) -> Result<()> {
        let json = serde_json::to_string(pref)?;
        let _: i64 = self
            .client
            .hset(self.users_key(), (pref.user_id.to_string(), json))
            .await?;

        Ok(())
    }

    async fn load_defaults(&self) -> Result<Option<Vec<String>>> {
        let raw: Option<String> = self.client.get(self.defaults_key()).await?;

        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Error::from)
    }

    async fn store_defaults(&self, symbols: &[String]) -> Result<()> {
        let json = serde_json::to_string(symbols)?;
        let _: () = self
            .client
            .set(self.defaults_key(), json, None, None, false)
            .await?;

        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // every write above is already acknowledged by the server
        Ok(())
    }
}
