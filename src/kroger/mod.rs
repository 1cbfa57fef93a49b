//! Kroger cart and store locations.

use serde_json::Value;

use crate::{
    core::{CartItem, Location},
    oauth::{self, AuthenticatedRequestClient, Token},
};

pub const DEFAULT_API_URL: &str = "https://api.kroger.com";

pub struct KrogerApi {
    client: AuthenticatedRequestClient,
    base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kroger: {0}")]
    OAuth(#[from] oauth::Error),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("empty response body")]
    EmptyResponse,
}

impl KrogerApi {
    pub fn new(client: AuthenticatedRequestClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Put `items` into the user's cart.
    pub async fn add_to_cart(
        &self,
        token: &Token,
        items: &[CartItem],
    ) -> Result<Option<Token>, Error> {
        let body = serde_json::json!({ "items": items });
        let (_, new_token) = self
            .client
            .put(token, &self.build_url("/v1/cart/add"), &body)
            .await?;
        Ok(new_token)
    }

    pub async fn get_locations(
        &self,
        token: &Token,
        zip_code: &str,
    ) -> Result<(Vec<Location>, Option<Token>), Error> {
        let (body, new_token) = self
            .client
            .get(
                token,
                &self.build_url("/v1/locations"),
                &[("filter.zipCode.near", zip_code)],
            )
            .await?;
        let locations = Self::parse_locations(body.ok_or(Error::EmptyResponse)?)?;
        Ok((locations, new_token))
    }

    fn parse_locations(body: Value) -> Result<Vec<Location>, Error> {
        let locations: model::Locations = serde_json::from_value(body)?;
        Ok(locations.data.into_iter().map(Into::into).collect())
    }
}

mod model {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Locations {
        pub data: Vec<Location>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Location {
        pub location_id: String,
        pub name: String,
        pub address: Address,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Address {
        pub address_line1: String,
        pub city: String,
        pub state: String,
    }
}

impl From<model::Location> for Location {
    fn from(location: model::Location) -> Self {
        let model::Location {
            location_id,
            name,
            address,
        } = location;
        Self {
            id: location_id,
            name,
            address_line_1: address.address_line1,
            city: address.city,
            state: address.state,
        }
    }
}

#[async_trait::async_trait]
impl crate::core::CartProvider for KrogerApi {
    async fn add_to_cart(
        &self,
        token: &Token,
        items: &[CartItem],
    ) -> Result<Option<Token>, anyhow::Error> {
        let new_token = self.add_to_cart(token, items).await?;
        Ok(new_token)
    }

    async fn locations(
        &self,
        token: &Token,
        zip_code: &str,
    ) -> Result<(Vec<Location>, Option<Token>), anyhow::Error> {
        let locations = self.get_locations(token, zip_code).await?;
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::oauth::{FixedClock, ProviderConfig, ServerError, TokenAuthority};
    use mockito::Matcher;

    const T0: i64 = 1_700_000_000;

    fn api(base_url: &str, now: i64) -> KrogerApi {
        let provider = ProviderConfig {
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
            access_token_url: format!("{}/v1/connect/oauth2/token", base_url),
            authorize_url: format!("{}/v1/connect/oauth2/authorize", base_url),
            scope: "profile.compact product.compact cart.basic:write".into(),
        };
        let authority = TokenAuthority::new(reqwest::Client::new(), provider)
            .with_clock(Arc::new(FixedClock(now)));
        let client = AuthenticatedRequestClient::new(reqwest::Client::new(), Arc::new(authority));
        KrogerApi::new(client, format!("{}/", base_url))
    }

    fn token() -> Token {
        Token::new("a1", "bearer", 1800, Some("r1".into()), T0)
    }

    #[tokio::test]
    async fn add_to_cart_puts_items() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/v1/cart/add")
            .match_header("authorization", "Bearer a1")
            .match_body(Matcher::Json(serde_json::json!({
                "items": [
                    {"quantity": 1, "upc": "0001111041700"},
                    {"quantity": 1, "upc": "0007225003712"}
                ]
            })))
            .with_status(204)
            .create_async()
            .await;

        let items = vec![
            CartItem {
                quantity: 1,
                upc: "0001111041700".into(),
            },
            CartItem {
                quantity: 1,
                upc: "0007225003712".into(),
            },
        ];
        let new_token = api(&server.url(), T0)
            .add_to_cart(&token(), &items)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(new_token.is_none());
    }

    #[tokio::test]
    async fn rejected_refresh_surfaces_through_trait() {
        let mut server = mockito::Server::new_async().await;
        let _refresh = server
            .mock("POST", "/v1/connect/oauth2/token")
            .with_status(401)
            .with_body("nope")
            .create_async()
            .await;
        let cart = server
            .mock("PUT", "/v1/cart/add")
            .expect(0)
            .create_async()
            .await;

        let api = api(&server.url(), T0 + 1800);
        let err = crate::core::CartProvider::add_to_cart(&api, &token(), &[])
            .await
            .unwrap_err();

        cart.assert_async().await;
        let cause = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<oauth::Error>())
            .unwrap();
        assert!(
            matches!(
                cause,
                oauth::Error::UpstreamAuth(ServerError::Status {
                    status_code: 401,
                    ..
                })
            ),
            "{:?}",
            cause
        );
    }

    #[tokio::test]
    async fn locations_are_parsed_with_rotated_token() {
        let mut server = mockito::Server::new_async().await;
        let _refresh = server
            .mock("POST", "/v1/connect/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"a2","token_type":"bearer","expires_in":1800,"refresh_token":"r2"}"#)
            .create_async()
            .await;
        let mock = server
            .mock("GET", "/v1/locations")
            .match_header("authorization", "Bearer a2")
            .match_query(Matcher::UrlEncoded("filter.zipCode.near".into(), "45202".into()))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "data": [{
                        "locationId": "01400943",
                        "chain": "KROGER",
                        "name": "Kroger On the Rhine",
                        "address": {
                            "addressLine1": "100 E Court St",
                            "city": "Cincinnati",
                            "state": "OH",
                            "zipCode": "45202"
                        }
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (locations, new_token) = api(&server.url(), T0 + 1800)
            .get_locations(&token(), "45202")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            locations,
            vec![Location {
                id: "01400943".into(),
                name: "Kroger On the Rhine".into(),
                address_line_1: "100 E Court St".into(),
                city: "Cincinnati".into(),
                state: "OH".into(),
            }]
        );
        assert_eq!(new_token.unwrap().access_token(), "a2");
    }

    #[tokio::test]
    async fn empty_locations_body_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/locations")
            .match_query(Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let err = api(&server.url(), T0)
            .get_locations(&token(), "45202")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResponse), "{:?}", err);
    }
}
