use async_graphql::ErrorExtensions;

use crate::api::http::LOGIN_PATH;

#[derive(Debug, thiserror::Error)]
#[error("Login required")]
pub struct LoginRequired;

impl ErrorExtensions for LoginRequired {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string())
            .extend_with(|_, extensions| extensions.set("loginUrl", LOGIN_PATH.to_owned()))
    }
}
