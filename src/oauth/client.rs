//! Bearer-authenticated requests that refresh the token first when needed.

use std::{sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, AUTHORIZATION},
    Method,
};
use serde_json::Value;
use tracing::info;

use super::{authority::TokenAuthority, token::Token, Error};
use crate::utils::check_status;

pub struct AuthenticatedRequestClient {
    client: reqwest::Client,
    authority: Arc<TokenAuthority>,
    timeout: Option<Duration>,
}

impl AuthenticatedRequestClient {
    pub fn new(client: reqwest::Client, authority: Arc<TokenAuthority>) -> Self {
        Self {
            client,
            authority,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Perform one request under `token`.
    ///
    /// An expired token is refreshed before the request is sent and the
    /// replacement is handed back next to the response body so the caller can
    /// store it. The request itself is never retried.
    pub async fn request(
        &self,
        token: &Token,
        method: Method,
        url: &str,
        headers: Option<HeaderMap>,
        body: Option<&Value>,
    ) -> Result<(Option<Value>, Option<Token>), Error> {
        let new_token = self.authority.refresh_if_needed(token).await?;
        if new_token.is_some() {
            info!(message = "Access token rotated", %method, url);
        }
        let active_token = new_token.as_ref().unwrap_or(token);

        let request = self.build_request(active_token, method, url, headers, body)?;
        let res = self.exec(request).await?;
        let body = Self::parse_json(res).await?;
        Ok((body, new_token))
    }

    pub async fn get(
        &self,
        token: &Token,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<(Option<Value>, Option<Token>), Error> {
        let url = if query.is_empty() {
            reqwest::Url::parse(url)
        } else {
            reqwest::Url::parse_with_params(url, query)
        };
        let url = url.map_err(|err| Error::InvalidUrl(err.to_string()))?;
        self.request(token, Method::GET, url.as_str(), None, None)
            .await
    }

    pub async fn put(
        &self,
        token: &Token,
        url: &str,
        body: &Value,
    ) -> Result<(Option<Value>, Option<Token>), Error> {
        self.request(token, Method::PUT, url, None, Some(body))
            .await
    }

    fn build_request(
        &self,
        token: &Token,
        method: Method,
        url: &str,
        headers: Option<HeaderMap>,
        body: Option<&Value>,
    ) -> Result<reqwest::Request, Error> {
        let mut headers = headers.unwrap_or_default();
        // Appending would keep a caller-supplied Authorization next to ours.
        headers.remove(AUTHORIZATION);

        let builder = self
            .client
            .request(method, url)
            .headers(headers)
            .bearer_auth(token.access_token());

        let builder = match body {
            Some(body) => builder.json(body),
            None => builder,
        };
        let builder = match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        };

        builder.build().map_err(|err| Error::Upstream(err.into()))
    }

    async fn exec(&self, request: reqwest::Request) -> Result<reqwest::Response, Error> {
        let res = self
            .client
            .execute(request)
            .await
            .map_err(|err| Error::Upstream(err.into()))?;
        check_status(res).await.map_err(Error::Upstream)
    }

    async fn parse_json(res: reqwest::Response) -> Result<Option<Value>, Error> {
        let text = res.text().await.map_err(|err| Error::Upstream(err.into()))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&text).map_err(Error::MalformedResponse)?;
        Ok(Some(value))
    }
}
