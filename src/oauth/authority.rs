//! Authorization-code and refresh-token grants against a single provider.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Deserialize;
use tracing::{debug, info};

use super::{
    clock::{Clock, SystemClock},
    token::Token,
    Error,
};
use crate::utils::check_status;

/// Static description of the OAuth2 provider and of this client's registration.
#[derive(Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub access_token_url: String,
    pub authorize_url: String,
    pub scope: String,
}

pub struct TokenAuthority {
    client: reqwest::Client,
    provider: ProviderConfig,
    clock: Arc<dyn Clock>,
    timeout: Option<Duration>,
}

/// Body of a successful token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    /// Lifetime of the access token in seconds.
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_token(self, created_at: i64) -> Token {
        Token::new(
            self.access_token,
            self.token_type,
            self.expires_in,
            self.refresh_token,
            created_at,
        )
    }
}

impl TokenAuthority {
    pub fn new(client: reqwest::Client, provider: ProviderConfig) -> Self {
        Self {
            client,
            provider,
            clock: Arc::new(SystemClock),
            timeout: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Where to send the browser to start the authorization-code flow.
    pub fn build_authorize_url(&self, redirect_uri: &str) -> Result<String, Error> {
        let mut url = reqwest::Url::parse(&self.provider.authorize_url)
            .map_err(|err| Error::InvalidUrl(err.to_string()))?;
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.provider.scope);
        Ok(url.into())
    }

    /// Trade the code delivered to the redirect endpoint for a token.
    pub async fn exchange_code(
        &self,
        redirect_params: &HashMap<String, String>,
        redirect_uri: &str,
    ) -> Result<Token, Error> {
        let code = redirect_params.get("code").ok_or(Error::InvalidGrant)?;
        let token = self
            .exchange(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri),
            ])
            .await?;
        info!(message = "Exchanged authorization code", token_expires_at = token.expires_at());
        Ok(token)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, Error> {
        let token = self
            .exchange(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        debug!(message = "Got refreshed token", token_expires_at = token.expires_at());
        Ok(token)
    }

    /// A replacement for `token` if it is expired, `None` if it is still good.
    pub async fn refresh_if_needed(&self, token: &Token) -> Result<Option<Token>, Error> {
        if !token.is_expired_at(self.clock.now()) {
            return Ok(None);
        }

        debug!(message = "Existing token expired, refreshing", token_expires_at = token.expires_at());

        let refresh_token = token.refresh_token().ok_or(Error::MissingRefreshToken)?;
        let token = self.refresh(refresh_token).await?;
        Ok(Some(token))
    }

    async fn exchange(&self, grant: &[(&str, &str)]) -> Result<Token, Error> {
        let mut params = grant.to_vec();
        params.push(("scope", self.provider.scope.as_str()));
        let params = serde_urlencoded::to_string(params)?;

        let builder = self
            .client
            .post(&self.provider.access_token_url)
            .basic_auth(&self.provider.client_id, Some(&self.provider.client_secret))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(params);
        let builder = match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };
        let req = builder
            .build()
            .map_err(|err| Error::UpstreamAuth(err.into()))?;

        let res = self
            .client
            .execute(req)
            .await
            .map_err(|err| Error::UpstreamAuth(err.into()))?;
        let res = check_status(res).await.map_err(Error::UpstreamAuth)?;
        let body = res
            .text()
            .await
            .map_err(|err| Error::UpstreamAuth(err.into()))?;

        let token_response: TokenResponse =
            serde_json::from_str(&body).map_err(Error::MalformedTokenResponse)?;
        Ok(token_response.into_token(self.clock.now()))
    }
}
