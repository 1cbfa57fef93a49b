use serde::Deserialize;
use serde_json::{Map, Value};

use super::clock::{Clock, SystemClock};

/// Seconds before the reported expiry at which a token already counts as expired.
pub const EXPIRY_MARGIN_SECS: i64 = 30;

/// One OAuth2 access token as issued by the token endpoint.
///
/// Tokens are never changed in place. A refresh yields a new value and the
/// holder decides whether to persist it.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    expires_in: i64,
    created_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("unable to construct token: {0}")]
    Construction(#[from] serde_json::Error),
}

/// Shape of a token as stored in a session. `created_at` is missing for
/// tokens that were stored without one.
#[derive(Deserialize)]
struct StoredToken {
    access_token: String,
    token_type: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    created_at: Option<i64>,
}

impl Token {
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        expires_in: i64,
        refresh_token: Option<String>,
        created_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            token_type: token_type.into(),
            expires_in,
            created_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_in(&self) -> i64 {
        self.expires_in
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// The instant the provider considers the token dead.
    pub fn expires_at(&self) -> i64 {
        self.created_at.saturating_add(self.expires_in)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at().saturating_sub(EXPIRY_MARGIN_SECS)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemClock.now())
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("access_token".into(), self.access_token.clone().into());
        map.insert(
            "refresh_token".into(),
            self.refresh_token.clone().map_or(Value::Null, Value::from),
        );
        map.insert("token_type".into(), self.token_type.clone().into());
        map.insert("expires_in".into(), self.expires_in.into());
        map.insert("created_at".into(), self.created_at.into());
        map
    }

    /// Rebuild a token from its stored mapping. A missing `created_at` is
    /// taken from `clock` at the time of the call.
    pub fn from_map(map: &Map<String, Value>, clock: &dyn Clock) -> Result<Self, TokenError> {
        let stored: StoredToken = serde_json::from_value(Value::Object(map.clone()))?;
        Ok(Self {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            token_type: stored.token_type,
            expires_in: stored.expires_in,
            created_at: stored.created_at.unwrap_or_else(|| clock.now()),
        })
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[censored]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[censored]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("created_at", &self.created_at)
            .finish()
    }
}
