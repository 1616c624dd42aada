// src/api.rs

use crate::client::OAuth2RestClient;
use crate::error::NilaSocialError;
use crate::identity::decode_identity_token;
use crate::model::{Author, IdentityClaims, PostResult, Profile, Visibility};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

const RESTLI_ID_HEADER: &str = "x-restli-id";
const ORGANIZATION_URN_PREFIX: &str = "urn:li:organization:";

/// Shapes accepted from the profile lookup: the member resource or an
/// OpenID userinfo document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProfileLookup {
    #[serde(rename_all = "camelCase")]
    Member {
        id: String,
        localized_first_name: Option<String>,
        localized_last_name: Option<String>,
    },
    UserInfo {
        sub: String,
        given_name: Option<String>,
        family_name: Option<String>,
    },
}

impl ProfileLookup {
    fn into_profile(self) -> Option<Profile> {
        let (id, first_name, last_name) = match self {
            ProfileLookup::Member {
                id,
                localized_first_name,
                localized_last_name,
            } => (id, localized_first_name, localized_last_name),
            ProfileLookup::UserInfo {
                sub,
                given_name,
                family_name,
            } => (sub, given_name, family_name),
        };
        let id = id.trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(Profile {
            id,
            first_name,
            last_name,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmailLookup {
    Elements { elements: Vec<EmailElement> },
    UserInfo { email: String },
}

#[derive(Debug, Deserialize)]
struct EmailElement {
    #[serde(rename = "handle~")]
    handle: Option<EmailHandle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailHandle {
    email_address: Option<String>,
}

impl EmailLookup {
    fn into_email(self) -> Option<String> {
        match self {
            EmailLookup::Elements { elements } => elements
                .into_iter()
                .filter_map(|e| e.handle.and_then(|h| h.email_address))
                .find(|email| !email.trim().is_empty()),
            EmailLookup::UserInfo { email } => Some(email).filter(|e| !e.trim().is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrganizationAcls {
    #[serde(default)]
    elements: Vec<OrganizationAcl>,
}

#[derive(Debug, Deserialize)]
struct OrganizationAcl {
    organization: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SharePayload<'a> {
    author: String,
    lifecycle_state: &'static str,
    specific_content: SpecificContent<'a>,
    visibility: MemberVisibility,
}

#[derive(Serialize)]
struct SpecificContent<'a> {
    #[serde(rename = "com.linkedin.ugc.ShareContent")]
    share_content: ShareContent<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareContent<'a> {
    share_commentary: Commentary<'a>,
    share_media_category: &'static str,
}

#[derive(Serialize)]
struct Commentary<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct MemberVisibility {
    #[serde(rename = "com.linkedin.ugc.MemberNetworkVisibility")]
    network: Visibility,
}

/// Keeps call failures as they are, but reports a refused lookup
/// (403 for a missing scope, 404, ...) as the data being unavailable.
fn refused_as(err: NilaSocialError, unavailable: fn(String) -> NilaSocialError) -> NilaSocialError {
    match err {
        NilaSocialError::Api { status, body } => unavailable(format!("lookup refused with status {status}: {body}")),
        other => other,
    }
}

impl OAuth2RestClient {
    /// Claims from the stored identity token, if one is present and decodable.
    pub async fn identity_claims(&self) -> Result<Option<IdentityClaims>, NilaSocialError> {
        let Some(token) = self.token_store().get().await? else {
            return Ok(None);
        };
        let Some(identity_token) = token.identity_token.as_deref() else {
            return Ok(None);
        };
        match decode_identity_token(identity_token) {
            Ok(claims) => Ok(Some(claims)),
            Err(e) => {
                warn!("Ignoring undecodable identity token: {}", e);
                Ok(None)
            }
        }
    }

    /// Resolves the connected member's profile.
    ///
    /// The identity token is preferred since it saves a request; the profile
    /// resource is only queried when it is missing or has no subject.
    #[instrument(skip(self), err)]
    pub async fn get_profile(&self) -> Result<Profile, NilaSocialError> {
        if let Some(claims) = self.identity_claims().await? {
            debug!("Profile resolved from identity token.");
            return Ok(claims.into());
        }

        let path = self.config().api.profile_path.clone();
        let response = self
            .get(&path, &[])
            .await
            .map_err(|e| refused_as(e, NilaSocialError::ProfileUnavailable))?;

        serde_json::from_value::<ProfileLookup>(response.data)
            .ok()
            .and_then(ProfileLookup::into_profile)
            .ok_or_else(|| NilaSocialError::ProfileUnavailable("profile response carried no member id".to_string()))
    }

    /// Resolves the connected member's primary email address.
    ///
    /// Never substitutes a placeholder: when neither the identity token nor
    /// the email lookup yields an address this fails with `EmailUnavailable`.
    #[instrument(skip(self), err)]
    pub async fn get_email(&self) -> Result<String, NilaSocialError> {
        if let Some(email) = self.identity_claims().await?.and_then(|c| c.email) {
            debug!("Email resolved from identity token.");
            return Ok(email);
        }

        let path = self.config().api.email_path.clone();
        let query = [("q", "members"), ("projection", "(elements*(handle~))")];
        let response = self
            .get(&path, &query)
            .await
            .map_err(|e| refused_as(e, NilaSocialError::EmailUnavailable))?;

        serde_json::from_value::<EmailLookup>(response.data)
            .ok()
            .and_then(EmailLookup::into_email)
            .ok_or_else(|| NilaSocialError::EmailUnavailable("email response carried no address".to_string()))
    }

    /// Publishes a text post on behalf of `author_subject_id`.
    ///
    /// `author_subject_id` is a member id or a full author URN; `visibility`
    /// must be one of `PUBLIC`, `CONNECTIONS` or `RESTRICTED`. Arguments are
    /// checked before any request is made.
    #[instrument(skip(self, text), err)]
    pub async fn create_post(
        &self,
        author_subject_id: &str,
        text: &str,
        visibility: &str,
    ) -> Result<PostResult, NilaSocialError> {
        let visibility = Visibility::from_str(visibility).map_err(|_| {
            NilaSocialError::InvalidArgument(format!(
                "unsupported visibility '{visibility}'; expected PUBLIC, CONNECTIONS or RESTRICTED"
            ))
        })?;
        let author = Author::parse(author_subject_id)?;
        self.create_post_as(&author, text, visibility).await
    }

    /// Publishes a text post on behalf of a typed `Author`.
    #[instrument(skip(self, text), err)]
    pub async fn create_post_as(
        &self,
        author: &Author,
        text: &str,
        visibility: Visibility,
    ) -> Result<PostResult, NilaSocialError> {
        if text.trim().is_empty() {
            return Err(NilaSocialError::InvalidArgument("post text must not be empty".to_string()));
        }

        let payload = SharePayload {
            author: author.urn(),
            lifecycle_state: "PUBLISHED",
            specific_content: SpecificContent {
                share_content: ShareContent {
                    share_commentary: Commentary { text },
                    share_media_category: "NONE",
                },
            },
            visibility: MemberVisibility { network: visibility },
        };

        let path = self.config().api.posts_path.clone();
        let response = self.post(&path, &payload).await?;

        let from_header = response
            .headers
            .get(RESTLI_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let id = match from_header {
            Some(id) if !id.is_empty() => id,
            _ => serde_json::from_value::<CreatedPost>(response.data)
                .ok()
                .and_then(|p| p.id)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| NilaSocialError::UnexpectedResponse("created post has no id".to_string()))?,
        };

        info!("Post {} created with visibility {}", id, visibility);
        Ok(PostResult { id })
    }

    /// Ids of the organizations the connected member administers.
    #[instrument(skip(self), err)]
    pub async fn administered_organizations(&self) -> Result<Vec<String>, NilaSocialError> {
        let path = self.config().api.organizations_path.clone();
        let query = [("q", "roleAssignee"), ("role", "ADMINISTRATOR"), ("state", "APPROVED")];
        let response = self.get(&path, &query).await?;

        let acls: OrganizationAcls = serde_json::from_value(response.data)
            .map_err(|e| NilaSocialError::UnexpectedResponse(format!("organization lookup: {e}")))?;
        Ok(acls
            .elements
            .into_iter()
            .filter_map(|acl| acl.organization)
            .map(|urn| urn.strip_prefix(ORGANIZATION_URN_PREFIX).map(str::to_string).unwrap_or(urn))
            .collect())
    }
}
