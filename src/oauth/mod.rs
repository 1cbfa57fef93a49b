//! OAuth2 token lifecycle and bearer-authenticated requests.

pub mod authority;
pub mod client;
pub mod clock;
pub mod token;

pub use self::{
    authority::{ProviderConfig, TokenAuthority},
    client::AuthenticatedRequestClient,
    clock::{Clock, FixedClock, SystemClock},
    token::{Token, TokenError},
};
pub use crate::utils::ServerError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("expected authorization code in OAuth redirect")]
    InvalidGrant,
    #[error("cannot update token: no refresh_token provided")]
    MissingRefreshToken,
    #[error("token endpoint: {0}")]
    UpstreamAuth(#[source] ServerError),
    #[error("upstream: {0}")]
    Upstream(#[source] ServerError),
    #[error("malformed token response: {0}")]
    MalformedTokenResponse(#[source] serde_json::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(#[source] serde_json::Error),
    #[error("encode token request: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}
