//! Per-browser key-value state.

pub mod store;

use serde_json::{Map, Value};

use crate::oauth::{Clock, Token, TokenError};

pub use self::store::{LoadedSession, SessionStore};

pub const TOKEN_KEY: &str = "token";
pub const NEXT_KEY: &str = "next";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session(Map<String, Value>);

impl Session {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The stored token, if any.
    pub fn token(&self, clock: &dyn Clock) -> Result<Option<Token>, TokenError> {
        let value = match self.0.get(TOKEN_KEY) {
            Some(value) => value,
            None => return Ok(None),
        };
        let map: Map<String, Value> = serde_json::from_value(value.clone())?;
        Token::from_map(&map, clock).map(Some)
    }

    pub fn set_token(&mut self, token: &Token) {
        self.0
            .insert(TOKEN_KEY.into(), Value::Object(token.to_map()));
    }

    pub fn remove_token(&mut self) {
        self.0.remove(TOKEN_KEY);
    }

    /// Remember where to send the browser once login completes.
    pub fn set_next(&mut self, next: impl Into<String>) {
        self.0.insert(NEXT_KEY.into(), Value::String(next.into()));
    }

    pub fn take_next(&mut self) -> Option<String> {
        match self.0.remove(NEXT_KEY)? {
            Value::String(next) => Some(next),
            _ => None,
        }
    }
}
