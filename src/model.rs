// src/model.rs

use crate::error::NilaSocialError;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};
use url::Url;

/// The OAuth2 token held for one connected account.
///
/// A `Token` always carries a non-empty `access_token`; the store refuses
/// anything else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Encoded identity assertion returned when the `openid` scope is granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<u64>,
    /// When the token was received, used to compute absolute expiry.
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Token {
    /// A bare token with only an access token, issued now.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            identity_token: None,
            token_type: None,
            expires_in_seconds: None,
            issued_at: Utc::now(),
            scope: None,
        }
    }

    /// The absolute expiry instant, if the provider reported a lifetime.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expires_in_seconds?).ok()?;
        self.issued_at.checked_add_signed(chrono::Duration::try_seconds(secs)?)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// The token endpoint's JSON body, in the provider's field names.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Builds the internal `Token`, or `None` if the body carried no access token.
    pub fn into_token(self, issued_at: DateTime<Utc>) -> Option<Token> {
        let access_token = self.access_token.filter(|t| !t.trim().is_empty())?;
        Some(Token {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            identity_token: self.id_token.filter(|t| !t.is_empty()),
            token_type: self.token_type,
            expires_in_seconds: self.expires_in,
            issued_at,
            scope: self.scope,
        })
    }
}

/// Accepts `expires_in` as either a JSON number or a numeric string.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid expires_in value: {s}"))),
    }
}

/// Profile claims carried by the identity token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityClaims {
    pub subject_id: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub picture_url: Option<String>,
}

/// The normalized result of a profile lookup. `id` is never empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<IdentityClaims> for Profile {
    fn from(claims: IdentityClaims) -> Self {
        Self {
            id: claims.subject_id,
            first_name: claims.given_name,
            last_name: claims.family_name,
        }
    }
}

/// Who may see a created post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Public,
    Connections,
    Restricted,
}

/// The entity a post is published on behalf of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Author {
    Person(String),
    Organization(String),
    /// A fully qualified URN used verbatim.
    Urn(String),
}

impl Author {
    /// Interprets a bare id as a member, and anything starting with `urn:` as a URN.
    pub fn parse(subject: &str) -> Result<Self, NilaSocialError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(NilaSocialError::InvalidArgument("author id must not be empty".to_string()));
        }
        if subject.starts_with("urn:") {
            Ok(Author::Urn(subject.to_string()))
        } else {
            Ok(Author::Person(subject.to_string()))
        }
    }

    pub fn urn(&self) -> String {
        match self {
            Author::Person(id) => format!("urn:li:person:{id}"),
            Author::Organization(id) => format!("urn:li:organization:{id}"),
            Author::Urn(urn) => urn.clone(),
        }
    }
}

/// A successful, normalized API response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: u16,
    /// The JSON body, `Null` for an empty body, or a string for non-JSON text.
    pub data: serde_json::Value,
    pub headers: HeaderMap,
}

/// The outcome of a created post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostResult {
    pub id: String,
}

/// An authorization URL together with the `state` it embeds.
///
/// The caller keeps `state` and checks it against the callback.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

/// Callback input carrying an authorization code.
///
/// Some callback transports deliver the bare code, others a JSON object with
/// the code nested inside it.
#[derive(Clone, Debug)]
pub enum AuthorizationInput {
    Code(String),
    Payload(serde_json::Value),
}

const MAX_PAYLOAD_DEPTH: usize = 4;

impl AuthorizationInput {
    /// Extracts the code string.
    pub fn into_code(self) -> Result<String, NilaSocialError> {
        let code = match self {
            AuthorizationInput::Code(code) => Some(code),
            AuthorizationInput::Payload(value) => find_code(&value, 0),
        };
        code.map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                NilaSocialError::InvalidAuthorizationCode("no authorization code found in callback input".to_string())
            })
    }
}

fn find_code(value: &serde_json::Value, depth: usize) -> Option<String> {
    if depth > MAX_PAYLOAD_DEPTH {
        return None;
    }
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Object(map) => {
            if let Some(found) = map.get("code").and_then(|v| find_code(v, depth + 1)) {
                return Some(found);
            }
            map.iter()
                .filter(|(k, v)| k.as_str() != "code" && v.is_object())
                .find_map(|(_, v)| find_code(v, depth + 1))
        }
        _ => None,
    }
}

impl From<&str> for AuthorizationInput {
    fn from(code: &str) -> Self {
        AuthorizationInput::Code(code.to_string())
    }
}

impl From<String> for AuthorizationInput {
    fn from(code: String) -> Self {
        AuthorizationInput::Code(code)
    }
}

impl From<serde_json::Value> for AuthorizationInput {
    fn from(value: serde_json::Value) -> Self {
        AuthorizationInput::Payload(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn token_response_accepts_numeric_string_expiry() {
        let parsed: TokenResponse =
            serde_json::from_value(json!({"access_token": "a", "expires_in": "5184000"})).unwrap();
        assert_eq!(parsed.expires_in, Some(5_184_000));
    }

    #[test]
    fn token_response_without_access_token_yields_nothing() {
        let parsed: TokenResponse = serde_json::from_value(json!({"refresh_token": "r"})).unwrap();
        assert!(parsed.into_token(Utc::now()).is_none());

        let blank: TokenResponse = serde_json::from_value(json!({"access_token": "  "})).unwrap();
        assert!(blank.into_token(Utc::now()).is_none());
    }

    #[test]
    fn code_is_unwrapped_from_nested_payloads() {
        let flat = AuthorizationInput::from(json!({"code": "abc"}));
        assert_eq!(flat.into_code().unwrap(), "abc");

        let nested = AuthorizationInput::from(json!({"code": {"code": "xyz"}}));
        assert_eq!(nested.into_code().unwrap(), "xyz");

        let under_query = AuthorizationInput::from(json!({"query": {"code": "q1", "state": "s"}}));
        assert_eq!(under_query.into_code().unwrap(), "q1");
    }

    #[test]
    fn missing_code_is_rejected() {
        for input in [
            AuthorizationInput::from(""),
            AuthorizationInput::from(json!({"state": 5})),
            AuthorizationInput::from(json!({"code": 42})),
            AuthorizationInput::from(json!(null)),
        ] {
            assert!(matches!(input.into_code(), Err(NilaSocialError::InvalidAuthorizationCode(_))));
        }
    }

    #[test]
    fn visibility_parses_only_the_three_known_values() {
        assert_eq!(Visibility::from_str("PUBLIC").unwrap(), Visibility::Public);
        assert_eq!(Visibility::from_str("CONNECTIONS").unwrap(), Visibility::Connections);
        assert_eq!(Visibility::from_str("RESTRICTED").unwrap(), Visibility::Restricted);
        assert!(Visibility::from_str("INVALID_VALUE").is_err());
        assert!(Visibility::from_str("public").is_err());
        assert_eq!(Visibility::Connections.to_string(), "CONNECTIONS");
    }

    #[test]
    fn author_urns() {
        assert_eq!(Author::parse("abc").unwrap().urn(), "urn:li:person:abc");
        assert_eq!(Author::parse("urn:li:organization:9").unwrap().urn(), "urn:li:organization:9");
        assert_eq!(Author::Organization("9".into()).urn(), "urn:li:organization:9");
        assert!(Author::parse(" ").is_err());
    }

    #[test]
    fn expiry_instant_is_issue_time_plus_lifetime() {
        let mut token = Token::new("a");
        assert!(token.expires_at().is_none());
        token.expires_in_seconds = Some(3600);
        assert_eq!(token.expires_at().unwrap() - token.issued_at, chrono::Duration::seconds(3600));
    }
}
