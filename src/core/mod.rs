use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    oauth::{self, Token, TokenAuthority},
    session::Session,
};

/// Key under a food's extras that holds the retailer product code.
pub const KROGER_UPC_KEY: &str = "kroger_upc";

pub type ListId = String;
pub type ListIdRef = str;

/// Meal-planning side: shopping lists and foods.
#[async_trait::async_trait]
pub trait ShoppingListProvider: Send + Sync {
    async fn shopping_lists(&self) -> Result<Vec<ShoppingList>, anyhow::Error>;
    async fn shopping_list_items(
        &self,
        list_id: &ListIdRef,
    ) -> Result<Vec<ShoppingListItem>, anyhow::Error>;
    async fn foods(&self) -> Result<Vec<Food>, anyhow::Error>;
    async fn update_food_extras(
        &self,
        food_id: &str,
        name: &str,
        extras: &Map<String, Value>,
    ) -> Result<(), anyhow::Error>;
}

/// Retailer side. Every call may hand back a rotated token.
#[async_trait::async_trait]
pub trait CartProvider: Send + Sync {
    async fn add_to_cart(
        &self,
        token: &Token,
        items: &[CartItem],
    ) -> Result<Option<Token>, anyhow::Error>;
    async fn locations(
        &self,
        token: &Token,
        zip_code: &str,
    ) -> Result<(Vec<Location>, Option<Token>), anyhow::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingList {
    pub id: ListId,
    pub name: String,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingListItem {
    pub quantity: f64,
    pub unit: Option<Unit>,
    pub food: Option<Food>,
    pub note: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Food {
    pub id: String,
    pub name: String,
    pub extras: Map<String, Value>,
}

impl Food {
    pub fn kroger_upc(&self) -> Option<&str> {
        self.extras.get(KROGER_UPC_KEY).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub quantity: u32,
    pub upc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub address_line_1: String,
    pub city: String,
    pub state: String,
}

/// Result of an operation that needs the retailer token.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Done(T),
    /// No usable token; the browser has to go through the login flow.
    LoginRequired,
}

pub struct Core {
    pub shopping_lists: Box<dyn ShoppingListProvider>,
    pub cart: Box<dyn CartProvider>,
    pub authority: Arc<TokenAuthority>,
    /// Where the provider sends the browser back to after authorization.
    pub redirect_uri: String,
}

/// Page the browser should land on after logging in to add `list_id`.
pub fn add_to_cart_path(list_id: &ListIdRef) -> String {
    let query = serde_urlencoded::to_string([("list_id", list_id)]).unwrap_or_default();
    format!("/add-to-cart?{}", query)
}

/// One cart item per list item whose food is linked to a product code.
pub fn cart_items(items: &[ShoppingListItem]) -> Vec<CartItem> {
    items
        .iter()
        .filter_map(|item| item.food.as_ref()?.kroger_upc())
        .map(|upc| CartItem {
            quantity: 1,
            upc: upc.to_owned(),
        })
        .collect()
}

fn is_missing_refresh_token(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<oauth::Error>(),
            Some(oauth::Error::MissingRefreshToken)
        )
    })
}

impl Core {
    pub fn authorize_url(&self) -> Result<String, oauth::Error> {
        self.authority.build_authorize_url(&self.redirect_uri)
    }

    pub async fn shopping_lists(&self) -> Result<Vec<ShoppingList>, anyhow::Error> {
        self.shopping_lists.shopping_lists().await
    }

    pub async fn shopping_list_items(
        &self,
        list_id: &ListIdRef,
    ) -> Result<Vec<ShoppingListItem>, anyhow::Error> {
        self.shopping_lists.shopping_list_items(list_id).await
    }

    pub async fn foods(&self) -> Result<Vec<Food>, anyhow::Error> {
        self.shopping_lists.foods().await
    }

    /// Record `upc` as the product code for a food, keeping its other extras.
    pub async fn link_food(
        &self,
        food_id: &str,
        name: &str,
        mut extras: Map<String, Value>,
        upc: &str,
    ) -> Result<(), anyhow::Error> {
        extras.insert(KROGER_UPC_KEY.into(), Value::String(upc.to_owned()));
        self.shopping_lists
            .update_food_extras(food_id, name, &extras)
            .await?;
        info!(message = "Linked food to product", food_id, upc);
        Ok(())
    }

    /// Push every linked item of a shopping list into the retailer cart.
    pub async fn add_to_cart(
        &self,
        session: &mut Session,
        list_id: &ListIdRef,
    ) -> Result<Outcome<usize>, anyhow::Error> {
        let items = self.shopping_list_items(list_id).await?;
        let cart_items = cart_items(&items);
        let next = add_to_cart_path(list_id);

        let token = match self.session_token(session) {
            Some(token) => token,
            None => {
                session.set_next(next);
                return Ok(Outcome::LoginRequired);
            }
        };

        if cart_items.is_empty() {
            info!(message = "Nothing to add to cart", list_id);
            return Ok(Outcome::Done(0));
        }

        let count = cart_items.len();
        let result = self
            .cart
            .add_to_cart(&token, &cart_items)
            .await
            .map(|new_token| (count, new_token));
        let outcome = Self::settle(session, &next, result)?;
        if let Outcome::Done(count) = &outcome {
            info!(message = "Added items to cart", list_id, count);
        }
        Ok(outcome)
    }

    pub async fn locations(
        &self,
        session: &mut Session,
        zip_code: &str,
    ) -> Result<Outcome<Vec<Location>>, anyhow::Error> {
        let token = match self.session_token(session) {
            Some(token) => token,
            None => {
                session.set_next("/");
                return Ok(Outcome::LoginRequired);
            }
        };

        let result = self.cart.locations(&token, zip_code).await;
        Self::settle(session, "/", result)
    }

    /// Finish the authorization-code flow: store the token and tell the
    /// browser where to go next.
    pub async fn complete_login(
        &self,
        session: &mut Session,
        redirect_params: &HashMap<String, String>,
    ) -> Result<String, oauth::Error> {
        let token = self
            .authority
            .exchange_code(redirect_params, &self.redirect_uri)
            .await?;
        session.set_token(&token);
        Ok(session.take_next().unwrap_or_else(|| "/".to_owned()))
    }

    fn session_token(&self, session: &mut Session) -> Option<Token> {
        match session.token(self.authority.clock()) {
            Ok(token) => token,
            Err(err) => {
                warn!(message = "Discarding unreadable session token", error = %err);
                session.remove_token();
                None
            }
        }
    }

    /// Persist a rotated token, or send the browser back through login when
    /// the token can no longer be refreshed.
    fn settle<T>(
        session: &mut Session,
        next: &str,
        result: Result<(T, Option<Token>), anyhow::Error>,
    ) -> Result<Outcome<T>, anyhow::Error> {
        match result {
            Ok((value, new_token)) => {
                if let Some(new_token) = new_token {
                    session.set_token(&new_token);
                }
                Ok(Outcome::Done(value))
            }
            Err(err) if is_missing_refresh_token(&err) => {
                warn!(message = "Token expired without refresh token, login required");
                session.remove_token();
                session.set_next(next);
                Ok(Outcome::LoginRequired)
            }
            Err(err) => Err(err),
        }
    }
}
