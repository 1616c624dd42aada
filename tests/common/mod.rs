#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use nila_social::error::BoxError;
use nila_social::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

pub const TOKEN_PATH: &str = "/oauth/v2/accessToken";
pub const REVOKE_PATH: &str = "/oauth/v2/revoke";
pub const REDIRECT_URI: &str = "https://callback.hub.local/oauth2/callback";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config_builder(server: &MockServer) -> ConfigBuilder {
    ConfigBuilder::new()
        .client_id("hub-client")
        .client_secret("hub-secret")
        .redirect_uri(REDIRECT_URI)
        .unwrap()
        .token_endpoint(&format!("{}{}", server.uri(), TOKEN_PATH))
        .unwrap()
        .api_base_url(&server.uri())
        .unwrap()
        .request_timeout(Duration::from_secs(5))
}

pub fn client_for(server: &MockServer) -> (OAuth2RestClient, Arc<MemoryStore>) {
    init_tracing();
    let backend = Arc::new(MemoryStore::new());
    let config = config_builder(server).build().unwrap();
    let client = OAuth2RestClient::new(config, backend.clone()).unwrap();
    (client, backend)
}

/// A valid, unexpiring token with a refresh token.
pub fn stored_token(access: &str) -> Token {
    let mut token = Token::new(access);
    token.refresh_token = Some("refresh-1".to_string());
    token
}

/// A token whose one-hour lifetime ran out an hour ago.
pub fn expired_token(access: &str) -> Token {
    let mut token = stored_token(access);
    token.expires_in_seconds = Some(3600);
    token.issued_at = Utc::now() - ChronoDuration::hours(2);
    token
}

pub fn mint_identity_token(claims: serde_json::Value) -> String {
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"provider-key")).unwrap()
}

/// A backend whose writes always fail.
pub struct ReadOnlyStore;

#[async_trait]
impl KeyValueStore for ReadOnlyStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, BoxError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), BoxError> {
        Err("storage is read-only".into())
    }

    async fn delete(&self, _key: &str) -> Result<(), BoxError> {
        Err("storage is read-only".into())
    }
}
