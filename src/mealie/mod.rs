//! Mealie shopping lists and foods.

use std::time::Duration;

use reqwest::{header, Method, Url};
use serde_json::{Map, Value};

use crate::utils::{check_status, ServerError};

pub struct MealieApi {
    client: reqwest::Client,
    base_url: Url,
    api_token: String,
    timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("server: {0}")]
    Server(#[from] ServerError),
    #[error("invalid mealie url: {0}")]
    Url(String),
    #[error("must provide mealie API token")]
    MissingApiToken,
}

const LIST_QUERY: &[(&str, &str)] = &[
    ("page", "-1"),
    ("perPage", "-1"),
    ("orderDirection", "desc"),
];

impl MealieApi {
    pub fn new(client: reqwest::Client, base_url: &str, api_token: String) -> Result<Self, Error> {
        let base_url = Url::parse(base_url).map_err(|err| Error::Url(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Url(base_url.into()));
        }
        if api_token.is_empty() {
            return Err(Error::MissingApiToken);
        }
        Ok(Self {
            client,
            base_url,
            api_token,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Absolute path on the Mealie host; the base URL's own path is replaced.
    fn build_url(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.clear().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    fn build_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .bearer_auth(&self.api_token)
            .header(header::ACCEPT, "application/json");
        match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    async fn exec(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let res = self.client.execute(builder.build()?).await?;
        let res = check_status(res).await?;
        Ok(res)
    }

    async fn parse_json<T>(res: reqwest::Response) -> Result<T, Error>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        res.json().await.map_err(Error::Reqwest)
    }

    pub async fn get_shopping_lists(&self) -> Result<Vec<model::ShoppingList>, Error> {
        let url = self.build_url(&["api", "groups", "shopping", "lists"], LIST_QUERY);
        let res = self.exec(self.build_request(Method::GET, url)).await?;
        let page: model::Page<model::ShoppingList> = Self::parse_json(res).await?;
        Ok(page.items)
    }

    pub async fn get_shopping_list_items(
        &self,
        list_id: &str,
    ) -> Result<Vec<model::ShoppingListItem>, Error> {
        let url = self.build_url(&["api", "groups", "shopping", "lists", list_id], &[]);
        let res = self.exec(self.build_request(Method::GET, url)).await?;
        let list: model::ShoppingListDetail = Self::parse_json(res).await?;
        Ok(list.list_items)
    }

    pub async fn get_foods(&self) -> Result<Vec<model::Food>, Error> {
        let url = self.build_url(&["api", "foods"], LIST_QUERY);
        let res = self.exec(self.build_request(Method::GET, url)).await?;
        let page: model::Page<model::Food> = Self::parse_json(res).await?;
        Ok(page.items)
    }

    pub async fn update_food_extras(
        &self,
        food_id: &str,
        name: &str,
        extras: &Map<String, Value>,
    ) -> Result<(), Error> {
        let url = self.build_url(&["api", "foods", food_id], &[]);
        let body = serde_json::json!({
            "extras": extras,
            "name": name,
        });
        self.exec(self.build_request(Method::PUT, url).json(&body))
            .await?;
        Ok(())
    }
}

pub mod model {
    use serde::Deserialize;
    use serde_json::{Map, Value};

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    pub struct Page<T> {
        pub items: Vec<T>,
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ShoppingList {
        pub id: String,
        pub name: String,
        pub created_at: chrono::NaiveDateTime,
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ShoppingListDetail {
        pub list_items: Vec<ShoppingListItem>,
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    pub struct ShoppingListItem {
        pub quantity: f64,
        pub unit: Option<Unit>,
        pub food: Option<Food>,
        #[serde(default)]
        pub note: Option<String>,
        #[serde(default)]
        pub display: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    pub struct Unit {
        pub id: String,
        pub name: String,
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    pub struct Food {
        pub id: String,
        pub name: String,
        /// Free-form metadata; null on foods that never had any.
        #[serde(default)]
        pub extras: Option<Map<String, Value>>,
    }
}

impl From<model::ShoppingList> for crate::core::ShoppingList {
    fn from(list: model::ShoppingList) -> Self {
        Self {
            id: list.id,
            name: list.name,
            created_at: list.created_at,
        }
    }
}

impl From<model::Unit> for crate::core::Unit {
    fn from(unit: model::Unit) -> Self {
        Self {
            id: unit.id,
            name: unit.name,
        }
    }
}

impl From<model::Food> for crate::core::Food {
    fn from(food: model::Food) -> Self {
        Self {
            id: food.id,
            name: food.name,
            extras: food.extras.unwrap_or_default(),
        }
    }
}

impl From<model::ShoppingListItem> for crate::core::ShoppingListItem {
    fn from(item: model::ShoppingListItem) -> Self {
        Self {
            quantity: item.quantity,
            unit: item.unit.map(Into::into),
            food: item.food.map(Into::into),
            note: item.note.unwrap_or_default(),
            display: item.display.unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl crate::core::ShoppingListProvider for MealieApi {
    async fn shopping_lists(&self) -> Result<Vec<crate::core::ShoppingList>, anyhow::Error> {
        let lists = self.get_shopping_lists().await?;
        Ok(lists.into_iter().map(Into::into).collect())
    }

    async fn shopping_list_items(
        &self,
        list_id: &crate::core::ListIdRef,
    ) -> Result<Vec<crate::core::ShoppingListItem>, anyhow::Error> {
        let items = self.get_shopping_list_items(list_id).await?;
        Ok(items.into_iter().map(Into::into).collect())
    }

    async fn foods(&self) -> Result<Vec<crate::core::Food>, anyhow::Error> {
        let foods = self.get_foods().await?;
        Ok(foods.into_iter().map(Into::into).collect())
    }

    async fn update_food_extras(
        &self,
        food_id: &str,
        name: &str,
        extras: &Map<String, Value>,
    ) -> Result<(), anyhow::Error> {
        self.update_food_extras(food_id, name, extras).await?;
        Ok(())
    }
}
