// src/store/mod.rs

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

use crate::error::{BoxError, NilaSocialError};
use crate::model::Token;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// The host-provided key-value persistence boundary.
///
/// Values are opaque strings; the token store writes one JSON blob per account.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BoxError>;
    async fn set(&self, key: &str, value: String) -> Result<(), BoxError>;
    async fn delete(&self, key: &str) -> Result<(), BoxError>;
}

/// Returns `true` if the token should no longer be used at `now`.
///
/// A token is expired once `issued_at + expires_in <= now + skew`. A token
/// without a reported lifetime is never considered expired here; only a
/// rejected API call can reveal that it is stale.
pub fn is_expired_at(token: &Token, now: DateTime<Utc>, skew: Duration) -> bool {
    let Some(lifetime) = token.expires_in_seconds else {
        return false;
    };
    let elapsed = (now - token.issued_at).num_seconds();
    let skew = i64::try_from(skew.as_secs()).unwrap_or(i64::MAX);
    let lifetime = i64::try_from(lifetime).unwrap_or(i64::MAX);
    elapsed.saturating_add(skew) >= lifetime
}

/// `is_expired_at` evaluated against the current clock.
pub fn is_expired(token: &Token, skew: Duration) -> bool {
    is_expired_at(token, Utc::now(), skew)
}

#[derive(Default)]
struct Slot {
    loaded: bool,
    token: Option<Token>,
}

/// The in-memory holder of one account's token, backed by a `KeyValueStore`.
///
/// The persisted copy is read at most once per process, on the first `get`.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    slot: Arc<Mutex<Slot>>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the current token, loading the persisted copy on first use.
    ///
    /// A persisted blob that cannot be parsed is logged and treated as absent.
    pub async fn get(&self) -> Result<Option<Token>, NilaSocialError> {
        let mut slot = self.slot.lock().await;
        if !slot.loaded {
            slot.token = self.load().await?;
            slot.loaded = true;
        }
        Ok(slot.token.clone())
    }

    async fn load(&self) -> Result<Option<Token>, NilaSocialError> {
        let Some(blob) = self.backend.get(&self.key).await.map_err(|source| self.persistence(source))? else {
            debug!(key = %self.key, "No persisted token found.");
            return Ok(None);
        };
        match serde_json::from_str::<Token>(&blob) {
            Ok(token) if !token.access_token.is_empty() => {
                debug!(key = %self.key, "Loaded persisted token.");
                Ok(Some(token))
            }
            Ok(_) => {
                warn!(key = %self.key, "Persisted token has no access token; ignoring it.");
                Ok(None)
            }
            Err(e) => {
                warn!(key = %self.key, "Persisted token could not be parsed; ignoring it: {}", e);
                Ok(None)
            }
        }
    }

    /// Replaces the current token and writes it through to the backend.
    ///
    /// The in-memory value is kept even if the write fails; the failure is
    /// reported as `NilaSocialError::Persistence`.
    #[instrument(skip(self, token), fields(key = %self.key), err)]
    pub async fn set(&self, token: Token) -> Result<(), NilaSocialError> {
        if token.access_token.trim().is_empty() {
            return Err(NilaSocialError::InvalidToken("access token is empty".to_string()));
        }
        let blob = serde_json::to_string(&token)
            .map_err(|e| NilaSocialError::InvalidToken(format!("token could not be serialized: {e}")))?;

        {
            let mut slot = self.slot.lock().await;
            slot.token = Some(token);
            slot.loaded = true;
        }

        if let Err(source) = self.backend.set(&self.key, blob).await {
            warn!(key = %self.key, "Failed to persist token: {}", source);
            return Err(self.persistence(source));
        }
        debug!(key = %self.key, "Token persisted.");
        Ok(())
    }

    /// Forgets the token in memory and deletes the persisted copy.
    #[instrument(skip(self), fields(key = %self.key), err)]
    pub async fn clear(&self) -> Result<(), NilaSocialError> {
        {
            let mut slot = self.slot.lock().await;
            slot.token = None;
            slot.loaded = true;
        }
        self.backend.delete(&self.key).await.map_err(|source| self.persistence(source))
    }

    fn persistence(&self, source: BoxError) -> NilaSocialError {
        NilaSocialError::Persistence {
            key: self.key.clone(),
            source,
        }
    }
}
