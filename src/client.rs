// src/client.rs

use crate::config::Config;
use crate::error::NilaSocialError;
use crate::model::{ApiResponse, AuthorizationInput, AuthorizationRequest, Token, TokenResponse};
use crate::store::{self, KeyValueStore, TokenStore};
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::RngCore;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Bytes of entropy in each generated `state` value.
const STATE_BYTES: usize = 32;

/// An OAuth2 authorization-code client for one connected account, with
/// authenticated REST helpers on top of it.
#[derive(Clone)]
pub struct OAuth2RestClient {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    http_client: reqwest::Client,
    store: TokenStore,
    // Held for the whole duration of a refresh exchange.
    refresh_lock: Arc<Mutex<LastRefresh>>,
    // Bumped each time a refresh finishes, while the lock is still held.
    refresh_generation: AtomicU64,
}

/// The outcome of the most recent refresh, replayed to callers that queued
/// behind it.
#[derive(Default)]
struct LastRefresh {
    outcome: Option<Result<Token, NilaSocialError>>,
}

impl LastRefresh {
    fn replay(&self) -> Option<Result<Token, NilaSocialError>> {
        match self.outcome.as_ref()? {
            Ok(token) => Some(Ok(token.clone())),
            Err(e) => Some(Err(e.replay())),
        }
    }
}

impl OAuth2RestClient {
    /// Creates a client persisting its token in `backend` under the configured key.
    pub fn new(config: Config, backend: Arc<dyn KeyValueStore>) -> Result<Self, NilaSocialError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let store = TokenStore::new(backend, config.storage_key.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http_client,
                store,
                refresh_lock: Arc::new(Mutex::new(LastRefresh::default())),
                refresh_generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.inner.store
    }

    /// Whether `token` is past its expiry, less the configured skew.
    pub fn is_expired(&self, token: &Token) -> bool {
        store::is_expired(token, self.inner.config.expiry_skew)
    }

    /// Builds the provider consent URL with a fresh anti-CSRF `state`.
    ///
    /// The client does not remember the state; the caller checks it against
    /// the callback before exchanging the code.
    pub fn build_authorization_url(&self) -> AuthorizationRequest {
        let credentials = &self.inner.config.credentials;
        let state = generate_state();

        let mut url = credentials.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", credentials.redirect_uri.as_str())
            .append_pair("scope", &credentials.scope_string())
            .append_pair("state", &state);

        debug!("Built authorization URL for client {}", credentials.client_id);
        AuthorizationRequest { url, state }
    }

    /// Exchanges an authorization code for a token and stores it.
    ///
    /// `code` may be the bare code or the JSON payload delivered by the callback.
    #[instrument(skip(self, code), err)]
    pub async fn exchange_code_for_token(
        &self,
        code: impl Into<AuthorizationInput>,
    ) -> Result<Token, NilaSocialError> {
        let code = code.into().into_code()?;
        let credentials = &self.inner.config.credentials;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("redirect_uri", credentials.redirect_uri.as_str()),
        ];
        let (status, body) = self.post_form(&credentials.token_endpoint, &form).await?;

        if !status.is_success() {
            warn!("Authorization code exchange rejected with status {}", status);
            return Err(NilaSocialError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| NilaSocialError::MalformedTokenResponse(e.to_string()))?;
        let token = parsed
            .into_token(Utc::now())
            .ok_or_else(|| NilaSocialError::MalformedTokenResponse("response has no access_token".to_string()))?;

        self.persist(&token).await?;
        info!(
            "Authorization code exchanged. Refresh token present: {}, identity token present: {}",
            token.has_refresh_token(),
            token.identity_token.is_some()
        );
        Ok(token)
    }

    /// Exchanges the stored refresh token for a new token and stores it.
    ///
    /// Callers arriving while a refresh is in flight share its outcome,
    /// success or failure. Failures are never retried here.
    #[instrument(skip(self), err)]
    pub async fn refresh_token(&self) -> Result<Token, NilaSocialError> {
        self.refresh_coalesced(None).await
    }

    /// Runs a refresh unless one finished while waiting for the lock, or a
    /// sibling already replaced the token `observed`.
    async fn refresh_coalesced(&self, observed: Option<&str>) -> Result<Token, NilaSocialError> {
        let seen = self.inner.refresh_generation.load(Ordering::Acquire);
        let mut guard = self.inner.refresh_lock.clone().lock_owned().await;

        if self.inner.refresh_generation.load(Ordering::Acquire) != seen {
            if let Some(outcome) = guard.replay() {
                debug!("Sharing the outcome of the refresh that was in flight.");
                return outcome;
            }
        }

        if let Some(observed) = observed {
            if let Some(current) = self.inner.store.get().await? {
                if current.access_token != observed {
                    debug!("Token was already replaced by a concurrent request.");
                    return Ok(current);
                }
            }
        }

        // The exchange runs detached and owns the lock, so a caller that goes
        // away cannot lose a rotated refresh token or let a sibling start a
        // second exchange.
        let client = self.clone();
        let task = tokio::spawn(async move {
            let result = client.perform_refresh().await;
            guard.outcome = Some(match &result {
                Ok(token) => Ok(token.clone()),
                Err(e) => Err(e.replay()),
            });
            client.inner.refresh_generation.fetch_add(1, Ordering::Release);
            result
        });

        task.await.map_err(|e| NilaSocialError::TokenRefresh {
            status: None,
            body: format!("refresh task failed: {e}"),
        })?
    }

    async fn perform_refresh(&self) -> Result<Token, NilaSocialError> {
        let previous = self
            .inner
            .store
            .get()
            .await?
            .and_then(|t| t.refresh_token)
            .filter(|t| !t.is_empty())
            .ok_or(NilaSocialError::NoRefreshToken)?;

        let credentials = &self.inner.config.credentials;
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", previous.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ];
        let (status, body) = self.post_form(&credentials.token_endpoint, &form).await?;

        if !status.is_success() {
            error!("Token refresh rejected with status {}", status);
            return Err(NilaSocialError::TokenRefresh {
                status: Some(status.as_u16()),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| NilaSocialError::TokenRefresh {
            status: Some(status.as_u16()),
            body: format!("unparseable token response: {e}"),
        })?;
        let mut token = parsed.into_token(Utc::now()).ok_or_else(|| NilaSocialError::TokenRefresh {
            status: Some(status.as_u16()),
            body: "response has no access_token".to_string(),
        })?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(previous);
        }

        self.persist(&token).await?;
        info!("Access token refreshed.");
        Ok(token)
    }

    /// Stores a freshly issued token. A failed write is logged and tolerated,
    /// since the token is already usable from memory.
    async fn persist(&self, token: &Token) -> Result<(), NilaSocialError> {
        match self.inner.store.set(token.clone()).await {
            Ok(()) => Ok(()),
            Err(e @ NilaSocialError::Persistence { .. }) => {
                warn!("Token is held in memory only: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> Result<(StatusCode, String), NilaSocialError> {
        let timeout = self.inner.config.request_timeout;
        let response = self
            .inner
            .http_client
            .post(url.clone())
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| NilaSocialError::from_transport(e, timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NilaSocialError::from_transport(e, timeout))?;
        Ok((status, body))
    }

    /// Sends an authenticated GET to `path`, relative to the API base URL.
    #[instrument(skip(self, query), err)]
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse, NilaSocialError> {
        let url = self.resolve(path)?;
        self.execute(|http| http.get(url.clone()).query(query)).await
    }

    /// Sends an authenticated JSON POST to `path`, relative to the API base URL.
    #[instrument(skip(self, body), err)]
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<ApiResponse, NilaSocialError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.resolve(path)?;
        self.execute(|http| http.post(url.clone()).json(body)).await
    }

    /// Absolute URLs are used as given. Other paths are appended to the base
    /// URL, keeping any path prefix it carries.
    fn resolve(&self, path: &str) -> Result<Url, NilaSocialError> {
        if path.starts_with("https://") || path.starts_with("http://") {
            return Url::parse(path).map_err(|e| NilaSocialError::InvalidUrl(e.to_string()));
        }
        let mut base = self.inner.config.api.base_url.clone();
        if !base.path().ends_with('/') {
            let prefix = format!("{}/", base.path());
            base.set_path(&prefix);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| NilaSocialError::InvalidUrl(e.to_string()))
    }

    /// Sends a request with a usable token, refreshing and retrying exactly
    /// once if the provider answers 401.
    async fn execute<F>(&self, build: F) -> Result<ApiResponse, NilaSocialError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self.usable_token().await?;
        let response = self.send(&build, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return self.finish(response).await;
        }

        warn!("Request rejected with 401; refreshing the token and retrying once.");
        let token = self.refresh_coalesced(Some(token.access_token.as_str())).await?;
        let response = self.send(&build, &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            error!("Request rejected with 401 again after a token refresh.");
            return Err(NilaSocialError::AuthenticationExpired);
        }
        self.finish(response).await
    }

    async fn usable_token(&self) -> Result<Token, NilaSocialError> {
        let token = self.inner.store.get().await?.ok_or(NilaSocialError::NotConnected)?;
        if self.is_expired(&token) {
            debug!("Stored token is expired; refreshing before the request.");
            return self.refresh_coalesced(Some(token.access_token.as_str())).await;
        }
        Ok(token)
    }

    async fn send<F>(&self, build: &F, token: &Token) -> Result<Response, NilaSocialError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut request = build(&self.inner.http_client).bearer_auth(&token.access_token);
        for (name, value) in &self.inner.config.api.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
            .send()
            .await
            .map_err(|e| NilaSocialError::from_transport(e, self.inner.config.request_timeout))
    }

    async fn finish(&self, response: Response) -> Result<ApiResponse, NilaSocialError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| NilaSocialError::from_transport(e, self.inner.config.request_timeout))?;

        if !status.is_success() {
            warn!("API call failed with status {}", status);
            return Err(NilaSocialError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data = if body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            match serde_json::from_str(&body) {
                Ok(value) => value,
                Err(_) => serde_json::Value::String(body),
            }
        };
        Ok(ApiResponse {
            ok: true,
            status: status.as_u16(),
            data,
            headers,
        })
    }

    /// Revokes the token where the provider supports it, then forgets it.
    ///
    /// Revocation is best-effort; the local copy is always removed.
    #[instrument(skip(self), err)]
    pub async fn disconnect(&self) -> Result<(), NilaSocialError> {
        // Keeps an in-flight refresh from storing a token after it is cleared.
        let mut last_refresh = self.inner.refresh_lock.lock().await;
        last_refresh.outcome = None;
        let credentials = &self.inner.config.credentials;

        if let Some(endpoint) = &credentials.revocation_endpoint {
            match self.inner.store.get().await {
                Ok(Some(token)) => {
                    let form = [
                        ("token", token.access_token.as_str()),
                        ("client_id", credentials.client_id.as_str()),
                        ("client_secret", credentials.client_secret.as_str()),
                    ];
                    match self.post_form(endpoint, &form).await {
                        Ok((status, _)) if status.is_success() => info!("Token revoked at provider."),
                        Ok((status, body)) => warn!("Token revocation returned {}: {}", status, body),
                        Err(e) => warn!("Token revocation failed: {}", e),
                    }
                }
                Ok(None) => debug!("No token to revoke."),
                Err(e) => warn!("Could not read token for revocation: {}", e),
            }
        }

        self.inner.store.clear().await?;
        info!("Account disconnected.");
        Ok(())
    }
}

fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
