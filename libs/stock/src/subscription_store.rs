use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::UserId;
use crate::backend::{PreferenceBackend, backend_from_env};
use crate::error::StoreError;
use crate::preference::{MAX_FREQUENCY_HOURS, MIN_FREQUENCY_HOURS, UserPreference};
use crate::symbol::{DEFAULT_TICKERS, normalize_symbol, split_symbols};

struct State {
    users: HashMap<UserId, UserPreference>,
    default_tickers: Vec<String>,
}

/// Per-user subscriptions, cached in memory and written through to a backend.
///
/// Writers are serialized behind one lock and a change becomes visible only
/// once the backend accepted it, so a command racing a scheduler tick can't
/// lose either update.
pub struct SubscriptionStore {
    backend: Arc<dyn PreferenceBackend>,
    state: Mutex<State>,
}

impl SubscriptionStore {
    /// Load every user and the persisted default list.
    /// `fallback_defaults` applies only when nothing was persisted yet.
    pub async fn open(
        backend: Arc<dyn PreferenceBackend>,
        fallback_defaults: &[String],
    ) -> Result<Self, StoreError> {
        let users: HashMap<UserId, UserPreference> = backend
            .load_all()
            .await?
            .into_iter()
            .map(|pref| (pref.user_id, pref))
            .collect();

        let default_tickers = match backend.load_defaults().await? {
            Some(saved) => saved,
            None => normalize_all(fallback_defaults)?,
        };

        info!(
            users = users.len(),
            default_tickers = default_tickers.len(),
            "subscription store opened"
        );

        Ok(Self {
            backend,
            state: Mutex::new(State {
                users,
                default_tickers,
            }),
        })
    }

    /// Open with the backend chosen by `backend_from_env`.
    /// `DEFAULT_TICKERS` (comma or space separated) overrides the built-in list.
    pub async fn from_env() -> anyhow::Result<Self> {
        let backend = backend_from_env().await?;

        let defaults: Vec<String> = match std::env::var("DEFAULT_TICKERS") {
            Ok(raw) => split_symbols(&raw),
            Err(_) => DEFAULT_TICKERS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self::open(backend, &defaults).await?)
    }

    fn normalize(symbol: &str) -> Result<String, StoreError> {
        normalize_symbol(symbol).ok_or_else(|| StoreError::InvalidSymbol(symbol.to_string()))
    }

    /// Return the user's record, creating it with the default tickers on first contact.
    pub async fn get_or_create(&self, user_id: UserId) -> Result<UserPreference, StoreError> {
        self.update(user_id, |_| Ok(())).await.map(|(pref, _)| pref)
    }

    /// Read without creating.
    pub async fn get(&self, user_id: UserId) -> Result<UserPreference, StoreError> {
        self.state
            .lock()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound(user_id))
    }

    /// Returns true if it was newly added
    pub async fn add_ticker(&self, user_id: UserId, symbol: &str) -> Result<bool, StoreError> {
        let symbol = Self::normalize(symbol)?;
        let (_, added) = self
            .update(user_id, |pref| Ok(pref.tickers.insert(symbol.clone())))
            .await?;

        debug!(user_id, symbol = %symbol, added, "add_ticker");
        Ok(added)
    }

    /// Returns true if it was subscribed
    pub async fn remove_ticker(&self, user_id: UserId, symbol: &str) -> Result<bool, StoreError> {
        let symbol = Self::normalize(symbol)?;
        let (_, removed) = self
            .update(user_id, |pref| Ok(pref.tickers.remove(&symbol)))
            .await?;

        debug!(user_id, symbol = %symbol, removed, "remove_ticker");
        Ok(removed)
    }

    /// Replace the whole ticker set. An empty list is allowed.
    pub async fn set_tickers(
        &self,
        user_id: UserId,
        symbols: &[String],
    ) -> Result<UserPreference, StoreError> {
        let symbols = normalize_all(symbols)?;
        let (pref, _) = self
            .update(user_id, |pref| {
                pref.tickers = symbols.into_iter().collect();
                Ok(())
            })
            .await?;

        debug!(user_id, count = pref.tickers.len(), "set_tickers");
        Ok(pref)
    }

    pub async fn set_interval(&self, user_id: UserId, hours: u32) -> Result<(), StoreError> {
        if !(MIN_FREQUENCY_HOURS..=MAX_FREQUENCY_HOURS).contains(&hours) {
            return Err(StoreError::InvalidInterval(hours));
        }

        self.update(user_id, |pref| {
            pref.interval_hours = hours;
            Ok(())
        })
        .await?;

        debug!(user_id, hours, "set_interval");
        Ok(())
    }

    pub async fn list_all(&self) -> Vec<UserPreference> {
        let mut users: Vec<UserPreference> =
            self.state.lock().await.users.values().cloned().collect();
        users.sort_by_key(|pref| pref.user_id);
        users
    }

    /// Record a delivered notification. The user must already exist.
    pub async fn mark_notified(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        let mut pref = state
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound(user_id))?;
        pref.last_notified = Some(at);

        self.backend.upsert(&pref).await?;
        state.users.insert(user_id, pref);
        Ok(())
    }

    pub async fn default_tickers(&self) -> Vec<String> {
        self.state.lock().await.default_tickers.clone()
    }

    /// Replace the list handed to users created from now on.
    pub async fn set_default_tickers(&self, symbols: &[String]) -> Result<(), StoreError> {
        let symbols = normalize_all(symbols)?;
        let mut state = self.state.lock().await;

        self.backend.store_defaults(&symbols).await?;
        info!(tickers = %symbols.join(","), "default tickers replaced");
        state.default_tickers = symbols;
        Ok(())
    }

    /// Subscribe every known user to `symbols`, keeping what they already
    /// follow. Returns how many users gained at least one ticker.
    pub async fn add_tickers_to_all(&self, symbols: &[String]) -> Result<usize, StoreError> {
        let symbols = normalize_all(symbols)?;
        let mut state = self.state.lock().await;

        let mut user_ids: Vec<UserId> = state.users.keys().copied().collect();
        user_ids.sort_unstable();

        let mut changed = 0;
        for user_id in user_ids {
            let Some(existing) = state.users.get(&user_id) else {
                continue;
            };
            let mut pref = existing.clone();
            let before = pref.tickers.len();
            pref.tickers.extend(symbols.iter().cloned());
            if pref.tickers.len() == before {
                continue;
            }

            if let Err(e) = self.backend.upsert(&pref).await {
                warn!(user_id, error = %e, "persisting user preference failed");
                return Err(e.into());
            }
            state.users.insert(user_id, pref);
            changed += 1;
        }

        info!(tickers = %symbols.join(","), users = changed, "tickers added to every user");
        Ok(changed)
    }

    /// Write every cached record back, then flush the backend.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let state = self.state.lock().await;

        for pref in state.users.values() {
            self.backend.upsert(pref).await?;
        }
        self.backend.store_defaults(&state.default_tickers).await?;
        self.backend.flush().await?;

        info!(users = state.users.len(), "subscription store flushed");
        Ok(())
    }

    /// Apply `f` to a copy of the user's record (created if missing), persist,
    /// then publish it.
    async fn update<T, F>(&self, user_id: UserId, f: F) -> Result<(UserPreference, T), StoreError>
    where
        F: FnOnce(&mut UserPreference) -> Result<T, StoreError>,
    {
        let mut state = self.state.lock().await;

        let (mut pref, cached, created) = match state.users.get(&user_id) {
            Some(existing) => (existing.clone(), true, false),
            None => match self.backend.load_user(user_id).await? {
                Some(stored) => (stored, false, false),
                None => (
                    UserPreference::new(user_id, &state.default_tickers, Utc::now()),
                    false,
                    true,
                ),
            },
        };
        let before = pref.clone();

        let out = f(&mut pref)?;

        if !cached || pref != before {
            if let Err(e) = self.backend.upsert(&pref).await {
                warn!(user_id, error = %e, "persisting user preference failed");
                return Err(e.into());
            }
            if created {
                info!(user_id, "user created");
            }
            state.users.insert(user_id, pref.clone());
        }

        Ok((pref, out))
    }
}

fn normalize_all(symbols: &[String]) -> Result<Vec<String>, StoreError> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for raw in symbols {
        let symbol = SubscriptionStore::normalize(raw)?;
        if !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    Ok(out)
}
