use std::collections::BTreeMap;
use std::fmt;

use http::Uri;
use serde::{Deserialize, Serialize};

use super::util::fetch_json;
use super::{HttpCli, RequestFailure};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: Option<String>,
    pub access_token: Option<String>,
    pub expires_in: Option<u64>,
    pub issued_at: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub token: String,
    pub expires_in: Option<u64>,
    pub issued_at: Option<String>,
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

impl AuthToken {
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl TryFrom<AuthResponse> for AuthToken {
    type Error = AnonymousReason;

    fn try_from(value: AuthResponse) -> Result<Self, Self::Error> {
        let token = value
            .token
            .or(value.access_token)
            .filter(|t| !t.is_empty())
            .ok_or(AnonymousReason::NoToken)?;
        Ok(AuthToken {
            token,
            expires_in: value.expires_in,
            issued_at: value.issued_at,
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnonymousReason {
    #[error("authentication has not been attempted")]
    NotAttempted,
    #[error("token request failed: {0}")]
    RequestFailed(String),
    #[error("token endpoint answered with status {0}")]
    Rejected(u16),
    #[error("token response was malformed: {0}")]
    MalformedResponse(String),
    #[error("token response carried no token")]
    NoToken,
}

impl From<RequestFailure> for AnonymousReason {
    fn from(e: RequestFailure) -> Self {
        match e {
            RequestFailure::Status { status, .. } => AnonymousReason::Rejected(status.as_u16()),
            RequestFailure::Decode(e) => AnonymousReason::MalformedResponse(e.to_string()),
            RequestFailure::Utf8(e) => AnonymousReason::MalformedResponse(e.to_string()),
            other => AnonymousReason::RequestFailed(other.to_string()),
        }
    }
}

/// Outcome of asking for a pull token. Anonymous requests still work against
/// public repositories, so callers decide whether `Anonymous` is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Authenticated(AuthToken),
    Anonymous(AnonymousReason),
}

impl Default for AuthState {
    fn default() -> Self {
        AuthState::Anonymous(AnonymousReason::NotAttempted)
    }
}

impl AuthState {
    pub fn token(&self) -> Option<&AuthToken> {
        match self {
            AuthState::Authenticated(token) => Some(token),
            AuthState::Anonymous(_) => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

pub(crate) fn token_uri(realm: &str, service: &str, repository: &str) -> Result<Uri, RequestFailure> {
    let query = format!("service={}&scope=repository:{}:pull", service, repository);
    let separator = if realm.contains('?') { '&' } else { '?' };
    Ok(format!("{}{}{}", realm, separator, query).parse::<Uri>()?)
}

/// Requests an anonymous, pull-scoped bearer token for `repository`.
pub async fn request_anonymous_token(
    client: &HttpCli,
    realm: &str,
    service: &str,
    repository: &str,
) -> AuthState {
    let result = async {
        let uri = token_uri(realm, service, repository)?;
        tracing::debug!("Requesting pull token from {}", uri);
        fetch_json::<AuthResponse>(client, &uri, &BTreeMap::new()).await
    }
    .await;

    let token = result
        .map_err(AnonymousReason::from)
        .and_then(AuthToken::try_from);

    match token {
        Ok(token) => AuthState::Authenticated(token),
        Err(reason) => {
            tracing::warn!(
                "Unable to authenticate for repository {}, continuing anonymously: {}",
                repository,
                reason
            );
            AuthState::Anonymous(reason)
        }
    }
}
