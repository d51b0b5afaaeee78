use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::PreferenceBackend;
use crate::UserId;
use crate::preference::UserPreference;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct Document {
    #[serde(default)]
    pub default_tickers: Option<Vec<String>>,
    #[serde(default)]
    pub users: BTreeMap<UserId, UserPreference>,
}

/// Single JSON document on disk, rewritten on every change.
pub struct JsonFileBackend {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl JsonFileBackend {
    /// A missing file starts empty; so does a corrupt one, which is logged.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Document>(&bytes) {
                Ok(doc) => {
                    info!(path = %path.display(), users = doc.users.len(), "loaded user data");
                    doc
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "user data is corrupt, starting empty");
                    Document::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };

        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, doc: &Document) -> Result<()> {
        let json = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;

        debug!(path = %self.path.display(), users = doc.users.len(), "saved user data");
        Ok(())
    }
}

#[async_trait]
impl PreferenceBackend for JsonFileBackend {
    async fn load_all(&self) -> Result<Vec<UserPreference>> {
        Ok(self.doc.lock().await.users.values().cloned().collect())
    }

    async fn load_user(&self, user_id: UserId) -> Result<Option<UserPreference>> {
        Ok(self.doc.lock().await.users.get(&user_id).cloned())
    }

    async fn upsert(&self, pref: &UserPreference) -> Result<()> {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        next.users.insert(pref.user_id, pref.clone());

        self.write(&next).await?;
        *doc = next;
        Ok(())
    }

    async fn load_defaults(&self) -> Result<Option<Vec<String>>> {
        Ok(self.doc.lock().await.default_tickers.clone())
    }

    async fn store_defaults(&self, symbols: &[String]) -> Result<()> {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        next.default_tickers = Some(symbols.to_vec());

        self.write(&next).await?;
        *doc = next;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let doc = self.doc.lock().await;
        self.write(&doc).await
    }
}
