//! Process configuration, read once from the environment at start-up.

use std::{net::SocketAddr, time::Duration};

use crate::{kroger, oauth::ProviderConfig};

pub const DEFAULT_AUTHORIZE_URL: &str = "https://api.kroger.com/v1/connect/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.kroger.com/v1/connect/oauth2/token";
pub const DEFAULT_SCOPE: &str = "profile.compact product.compact cart.basic:write";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8000";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct Config {
    pub kroger_client_id: String,
    pub kroger_client_secret: String,
    pub session_secret_key: String,
    pub mealie_url: String,
    pub mealie_api_token: String,
    pub kroger_api_url: String,
    pub kroger_authorize_url: String,
    pub kroger_token_url: String,
    pub kroger_scope: String,
    /// Externally visible origin of this service, used to build the OAuth redirect URI.
    pub public_url: String,
    pub bind_addr: SocketAddr,
    pub http_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("env var {0} is not set")]
    Missing(&'static str),
    #[error("env var {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let optional = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_owned());

        let bind_addr = optional("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr: SocketAddr = bind_addr.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_addr.clone(),
        })?;

        let http_timeout = match get("HTTP_TIMEOUT_SECS") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "HTTP_TIMEOUT_SECS",
                value,
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Config {
            kroger_client_id: required("KROGER_CLIENT_ID")?,
            kroger_client_secret: required("KROGER_CLIENT_SECRET")?,
            session_secret_key: required("SESSION_SECRET_KEY")?,
            mealie_url: required("MEALIE_URL")?,
            mealie_api_token: required("MEALIE_API_TOKEN")?,
            kroger_api_url: optional("KROGER_API_URL", kroger::DEFAULT_API_URL),
            kroger_authorize_url: optional("KROGER_AUTHORIZE_URL", DEFAULT_AUTHORIZE_URL),
            kroger_token_url: optional("KROGER_TOKEN_URL", DEFAULT_TOKEN_URL),
            kroger_scope: optional("KROGER_SCOPE", DEFAULT_SCOPE),
            public_url: optional("PUBLIC_URL", DEFAULT_PUBLIC_URL),
            bind_addr,
            http_timeout: Duration::from_secs(http_timeout),
        })
    }

    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig {
            client_id: self.kroger_client_id.clone(),
            client_secret: self.kroger_client_secret.clone(),
            access_token_url: self.kroger_token_url.clone(),
            authorize_url: self.kroger_authorize_url.clone(),
            scope: self.kroger_scope.clone(),
        }
    }

    /// Absolute URL for a path served by this process.
    pub fn public_url_for(&self, path: &str) -> String {
        format!("{}{}", self.public_url.trim_end_matches('/'), path)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("kroger_client_id", &self.kroger_client_id)
            .field("mealie_url", &self.mealie_url)
            .field("kroger_api_url", &self.kroger_api_url)
            .field("kroger_authorize_url", &self.kroger_authorize_url)
            .field("kroger_token_url", &self.kroger_token_url)
            .field("kroger_scope", &self.kroger_scope)
            .field("public_url", &self.public_url)
            .field("bind_addr", &self.bind_addr)
            .field("http_timeout", &self.http_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = [
            ("KROGER_CLIENT_ID", "client-id"),
            ("KROGER_CLIENT_SECRET", "client-secret"),
            ("SESSION_SECRET_KEY", "session-secret"),
            ("MEALIE_URL", "http://mealie.local"),
            ("MEALIE_API_TOKEN", "mealie-token"),
        ]
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        for (key, value) in pairs {
            env.insert(key.to_string(), value.to_string());
        }
        env
    }

    fn load(env: &HashMap<String, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config = load(&env(&[])).unwrap();
        assert_eq!(config.kroger_api_url, "https://api.kroger.com");
        assert_eq!(config.kroger_token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.kroger_authorize_url, DEFAULT_AUTHORIZE_URL);
        assert_eq!(config.kroger_scope, DEFAULT_SCOPE);
        assert_eq!(config.bind_addr, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(
            config.public_url_for("/auth/kroger"),
            "http://localhost:8000/auth/kroger"
        );

        let provider = config.provider();
        assert_eq!(provider.client_id, "client-id");
        assert_eq!(provider.client_secret, "client-secret");
    }

    #[test]
    fn overrides_are_used() {
        let config = load(&env(&[
            ("PUBLIC_URL", "https://groceries.example.com/"),
            ("HTTP_TIMEOUT_SECS", "5"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();
        assert_eq!(
            config.public_url_for("/auth/kroger"),
            "https://groceries.example.com/auth/kroger"
        );
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn missing_or_empty_required_values_fail() {
        let mut env = env(&[]);
        env.remove("MEALIE_URL");
        assert!(matches!(load(&env), Err(ConfigError::Missing("MEALIE_URL"))));

        env.insert("MEALIE_URL".into(), "http://mealie.local".into());
        env.insert("MEALIE_API_TOKEN".into(), String::new());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Missing("MEALIE_API_TOKEN"))
        ));
    }

    #[test]
    fn unparsable_values_fail() {
        let err = load(&env(&[("HTTP_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "HTTP_TIMEOUT_SECS",
                ..
            }
        ));
    }
}
