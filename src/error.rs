// src/error.rs

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by persistence backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The primary error type for the `nila-social` library.
#[derive(Debug, Error)]
pub enum NilaSocialError {
    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A token without an access token was offered to the token store.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The persistence backend failed to read, write or delete the token.
    #[error("Persistence error for key '{key}': {source}")]
    Persistence {
        key: String,
        #[source]
        source: BoxError,
    },

    /// No usable authorization code could be extracted from the callback input.
    #[error("Invalid authorization code: {0}")]
    InvalidAuthorizationCode(String),

    /// The token endpoint rejected the authorization-code exchange.
    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    /// The token endpoint answered with success but the body carried no access token.
    #[error("Malformed token response: {0}")]
    MalformedTokenResponse(String),

    /// A refresh was needed but the stored token has no refresh token.
    /// The authorization flow must be run again.
    #[error("No refresh token is available; re-authorization is required")]
    NoRefreshToken,

    /// The token endpoint rejected the refresh exchange.
    #[error("Token refresh failed (status {status:?}): {body}")]
    TokenRefresh { status: Option<u16>, body: String },

    /// An authenticated request was rejected with 401 even after a refresh.
    #[error("Authentication expired: the request was rejected after a token refresh")]
    AuthenticationExpired,

    /// An authenticated call was attempted before any token was stored.
    #[error("No token is stored for this account; run the authorization flow first")]
    NotConnected,

    /// The API answered with a non-success status other than 401.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// A successful API response was missing a field the operation must return.
    #[error("Unexpected API response: {0}")]
    UnexpectedResponse(String),

    /// Neither the identity token nor the profile lookup produced a member id.
    #[error("Profile unavailable: {0}")]
    ProfileUnavailable(String),

    /// Neither the identity token nor the email lookup produced an address.
    #[error("Email unavailable: {0}")]
    EmailUnavailable(String),

    /// The identity token could not be decoded into claims.
    #[error("Identity token could not be decoded: {0}")]
    IdentityToken(String),

    /// A caller-supplied argument is outside the accepted set.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A network call exceeded the configured request timeout.
    #[error("Network request timed out after {0:?}")]
    NetworkTimeout(Duration),

    /// An error occurred during an HTTP request.
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl NilaSocialError {
    /// Maps a transport error, separating timeouts from other failures.
    pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            NilaSocialError::NetworkTimeout(timeout)
        } else {
            NilaSocialError::HttpError(err)
        }
    }

    /// A copy of a refresh failure for callers that shared the exchange.
    /// Errors carrying a non-cloneable source are flattened to `TokenRefresh`.
    pub(crate) fn replay(&self) -> Self {
        match self {
            NilaSocialError::NoRefreshToken => NilaSocialError::NoRefreshToken,
            NilaSocialError::NotConnected => NilaSocialError::NotConnected,
            NilaSocialError::NetworkTimeout(timeout) => NilaSocialError::NetworkTimeout(*timeout),
            NilaSocialError::TokenRefresh { status, body } => NilaSocialError::TokenRefresh {
                status: *status,
                body: body.clone(),
            },
            other => NilaSocialError::TokenRefresh {
                status: None,
                body: other.to_string(),
            },
        }
    }
}
