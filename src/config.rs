// src/config.rs

use crate::error::NilaSocialError;
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://www.linkedin.com/oauth/v2/authorization";
const DEFAULT_TOKEN_ENDPOINT: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const DEFAULT_API_BASE_URL: &str = "https://api.linkedin.com";
const DEFAULT_SCOPES: [&str; 4] = ["openid", "profile", "email", "w_member_social"];

/// The OAuth2 client registration used for every exchange.
///
/// A `Credentials` value is immutable once built. Changing any of it means
/// building a new `Config` and a new client.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    /// Sent verbatim as `redirect_uri` in both the authorization URL and the
    /// code exchange. The provider rejects the exchange if the two differ.
    pub redirect_uri: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    /// Where tokens are revoked on disconnect, if the provider offers it.
    pub revocation_endpoint: Option<Url>,
    pub scopes: BTreeSet<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("authorization_endpoint", &self.authorization_endpoint.as_str())
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credentials {
    /// The scopes joined with single spaces, as the `scope` parameter expects.
    pub fn scope_string(&self) -> String {
        self.scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }
}

/// REST resource locations and protocol headers of the provider's API.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Resource paths are appended to this URL, after any path prefix it has.
    pub base_url: Url,
    pub profile_path: String,
    pub email_path: String,
    pub posts_path: String,
    pub organizations_path: String,
    /// Attached to every authenticated request after the bearer token.
    pub headers: Vec<(String, String)>,
}

impl ApiConfig {
    /// The provider's resource paths and protocol headers rooted at `base_url`.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            profile_path: "/v2/me".to_string(),
            email_path: "/v2/emailAddress".to_string(),
            posts_path: "/v2/ugcPosts".to_string(),
            organizations_path: "/v2/organizationAcls".to_string(),
            headers: vec![
                ("X-Restli-Protocol-Version".to_string(), "2.0.0".to_string()),
                ("LinkedIn-Version".to_string(), "202401".to_string()),
            ],
        }
    }
}

/// The main configuration for the `nila-social` client.
///
/// This struct should be constructed using the `ConfigBuilder`.
#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Credentials,
    pub api: ApiConfig,
    /// Upper bound for every network call made by the client.
    pub request_timeout: Duration,
    /// Safety margin subtracted from the token's computed expiry.
    pub expiry_skew: Duration,
    /// The account-scoped key the token is persisted under.
    pub storage_key: String,
}

/// A builder for creating a `Config` instance.
///
/// This builder provides a fluent API to ensure that the configuration is
/// constructed correctly and with all required fields.
#[derive(Default)]
pub struct ConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    authorization_endpoint: Option<Url>,
    token_endpoint: Option<Url>,
    revocation_endpoint: Option<Url>,
    scopes: BTreeSet<String>,
    api: Option<ApiConfig>,
    api_base_url: Option<Url>,
    request_timeout: Option<Duration>,
    expiry_skew: Option<Duration>,
    storage_key: Option<String>,
}

fn parse_url(url: &str) -> Result<Url, NilaSocialError> {
    Url::parse(url).map_err(|e| NilaSocialError::InvalidUrl(format!("{url}: {e}")))
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client ID issued by the provider. This is a required field.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the client secret issued by the provider. This is a required field.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Sets the OAuth callback URL registered by the host. This is a required field.
    ///
    /// The value must parse as a URL but is kept exactly as given.
    pub fn redirect_uri(mut self, url: &str) -> Result<Self, NilaSocialError> {
        parse_url(url)?;
        self.redirect_uri = Some(url.to_string());
        Ok(self)
    }

    /// Overrides the provider's authorization endpoint.
    pub fn authorization_endpoint(mut self, url: &str) -> Result<Self, NilaSocialError> {
        self.authorization_endpoint = Some(parse_url(url)?);
        Ok(self)
    }

    /// Overrides the provider's token endpoint.
    pub fn token_endpoint(mut self, url: &str) -> Result<Self, NilaSocialError> {
        self.token_endpoint = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets a token revocation endpoint used on disconnect. This is optional.
    pub fn revocation_endpoint(mut self, url: &str) -> Result<Self, NilaSocialError> {
        self.revocation_endpoint = Some(parse_url(url)?);
        Ok(self)
    }

    /// Adds a single scope to the requested set.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }

    /// Replaces the requested scope set.
    /// Defaults to `openid profile email w_member_social` if never set.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the whole REST API description.
    pub fn api(mut self, api: ApiConfig) -> Self {
        self.api = Some(api);
        self
    }

    /// Overrides only the REST base URL, keeping the default resource paths.
    pub fn api_base_url(mut self, url: &str) -> Result<Self, NilaSocialError> {
        self.api_base_url = Some(parse_url(url)?);
        Ok(self)
    }

    /// Sets the timeout applied to every network call. Defaults to 30 seconds.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the expiry skew. Defaults to 60 seconds.
    pub fn expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = Some(skew);
        self
    }

    /// Sets the persistence key for this account's token. Defaults to `oauth_token`.
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if `client_id`, `client_secret` or `redirect_uri`
    /// are missing or empty.
    pub fn build(self) -> Result<Config, NilaSocialError> {
        let client_id = required(self.client_id, "client_id")?;
        let client_secret = required(self.client_secret, "client_secret")?;
        let redirect_uri = required(self.redirect_uri, "redirect_uri")?;

        let authorization_endpoint = match self.authorization_endpoint {
            Some(url) => url,
            None => parse_url(DEFAULT_AUTHORIZATION_ENDPOINT)?,
        };
        let token_endpoint = match self.token_endpoint {
            Some(url) => url,
            None => parse_url(DEFAULT_TOKEN_ENDPOINT)?,
        };

        let scopes = if self.scopes.is_empty() {
            DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
        } else {
            self.scopes
        };

        let mut api = match self.api {
            Some(api) => api,
            None => ApiConfig::new(parse_url(DEFAULT_API_BASE_URL)?),
        };
        if let Some(base_url) = self.api_base_url {
            api.base_url = base_url;
        }

        let storage_key = self.storage_key.unwrap_or_else(|| "oauth_token".to_string());
        if storage_key.trim().is_empty() {
            return Err(NilaSocialError::MissingConfiguration("storage_key".to_string()));
        }

        Ok(Config {
            credentials: Credentials {
                client_id,
                client_secret,
                redirect_uri,
                authorization_endpoint,
                token_endpoint,
                revocation_endpoint: self.revocation_endpoint,
                scopes,
            },
            api,
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            expiry_skew: self.expiry_skew.unwrap_or(Duration::from_secs(60)),
            storage_key,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, NilaSocialError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(NilaSocialError::MissingConfiguration(field.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigBuilder {
        ConfigBuilder::new()
            .client_id("hub-client")
            .client_secret("hub-secret")
            .redirect_uri("https://callback.hub.local/oauth2/callback")
            .unwrap()
    }

    #[test]
    fn build_fills_provider_defaults() {
        let config = base().build().unwrap();
        assert_eq!(config.credentials.token_endpoint.as_str(), DEFAULT_TOKEN_ENDPOINT);
        assert_eq!(config.credentials.scope_string(), "email openid profile w_member_social");
        assert_eq!(config.expiry_skew, Duration::from_secs(60));
        assert_eq!(config.storage_key, "oauth_token");
    }

    #[test]
    fn missing_or_blank_credentials_are_rejected() {
        let missing_secret = ConfigBuilder::new()
            .client_id("hub-client")
            .redirect_uri("https://callback.hub.local/")
            .unwrap()
            .build();
        assert!(matches!(missing_secret, Err(NilaSocialError::MissingConfiguration(f)) if f == "client_secret"));

        let blank_id = base().client_id("  ").build();
        assert!(matches!(blank_id, Err(NilaSocialError::MissingConfiguration(f)) if f == "client_id"));

        let no_redirect = ConfigBuilder::new().client_id("a").client_secret("b").build();
        assert!(matches!(no_redirect, Err(NilaSocialError::MissingConfiguration(f)) if f == "redirect_uri"));
    }

    #[test]
    fn redirect_uri_is_kept_verbatim() {
        let config = base().redirect_uri("https://Callback.Hub.local").unwrap().build().unwrap();
        assert_eq!(config.credentials.redirect_uri, "https://Callback.Hub.local");
        assert!(matches!(
            ConfigBuilder::new().redirect_uri("callback"),
            Err(NilaSocialError::InvalidUrl(_))
        ));
    }

    #[test]
    fn malformed_urls_fail_early() {
        assert!(matches!(
            ConfigBuilder::new().token_endpoint("not a url"),
            Err(NilaSocialError::InvalidUrl(_))
        ));
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let config = base().build().unwrap();
        let rendered = format!("{:?}", config.credentials);
        assert!(!rendered.contains("hub-secret"));
    }
}
