use async_graphql::{ComplexObject, Context, ErrorExtensions, Json, Object, Result, SimpleObject, ID};
use serde_json::{Map, Value};

use super::{
    error,
    util::{load_core, load_session},
};
use crate::core::Outcome;

#[derive(SimpleObject, Clone)]
#[graphql(complex)]
pub struct ShoppingList {
    pub id: ID,
    pub name: String,
    pub created_at: String,
}

#[ComplexObject]
impl ShoppingList {
    async fn items(&self, ctx: &Context<'_>) -> Result<Vec<ShoppingListItem>> {
        let core = load_core(ctx);
        let items = core.shopping_list_items(&self.id).await?;
        let items = items.into_iter().map(Into::into).collect();
        Ok(items)
    }
}

impl From<crate::core::ShoppingList> for ShoppingList {
    fn from(val: crate::core::ShoppingList) -> Self {
        Self {
            id: val.id.into(),
            name: val.name,
            created_at: val.created_at.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct ShoppingListItem {
    pub quantity: f64,
    pub unit: Option<Unit>,
    pub food: Option<Food>,
    pub note: String,
    pub display: String,
}

impl From<crate::core::ShoppingListItem> for ShoppingListItem {
    fn from(val: crate::core::ShoppingListItem) -> Self {
        Self {
            quantity: val.quantity,
            unit: val.unit.map(Into::into),
            food: val.food.map(Into::into),
            note: val.note,
            display: val.display,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct Unit {
    pub id: ID,
    pub name: String,
}

impl From<crate::core::Unit> for Unit {
    fn from(val: crate::core::Unit) -> Self {
        Self {
            id: val.id.into(),
            name: val.name,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct Food {
    pub id: ID,
    pub name: String,
    pub extras: Json<Map<String, Value>>,
    pub kroger_upc: Option<String>,
}

impl From<crate::core::Food> for Food {
    fn from(val: crate::core::Food) -> Self {
        let kroger_upc = val.kroger_upc().map(ToOwned::to_owned);
        Self {
            id: val.id.into(),
            name: val.name,
            extras: Json(val.extras),
            kroger_upc,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct Location {
    pub id: ID,
    pub name: String,
    pub address_line_1: String,
    pub city: String,
    pub state: String,
}

impl From<crate::core::Location> for Location {
    fn from(val: crate::core::Location) -> Self {
        Self {
            id: val.id.into(),
            name: val.name,
            address_line_1: val.address_line_1,
            city: val.city,
            state: val.state,
        }
    }
}

#[derive(SimpleObject, Clone)]
pub struct CartResult {
    /// Number of list items sent to the cart.
    pub added: u32,
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn shopping_lists(&self, ctx: &Context<'_>) -> Result<Vec<ShoppingList>> {
        let core = load_core(ctx);
        let lists = core.shopping_lists().await?;
        let lists = lists.into_iter().map(Into::into).collect();
        Ok(lists)
    }

    async fn shopping_list(&self, ctx: &Context<'_>, id: ID) -> Result<Option<ShoppingList>> {
        let core = load_core(ctx);
        let lists = core.shopping_lists().await?;
        let list = lists
            .into_iter()
            .find(|list| list.id == id.as_str())
            .map(Into::into);
        Ok(list)
    }

    async fn foods(&self, ctx: &Context<'_>) -> Result<Vec<Food>> {
        let core = load_core(ctx);
        let foods = core.foods().await?;
        let foods = foods.into_iter().map(Into::into).collect();
        Ok(foods)
    }

    async fn kroger_locations(&self, ctx: &Context<'_>, zip_code: String) -> Result<Vec<Location>> {
        let core = load_core(ctx);
        let mut session = load_session(ctx).lock().await;
        match core.locations(&mut session, &zip_code).await? {
            Outcome::Done(locations) => Ok(locations.into_iter().map(Into::into).collect()),
            Outcome::LoginRequired => Err(error::LoginRequired.extend()),
        }
    }

    /// The provider's authorization page for this service.
    async fn login_url(&self, ctx: &Context<'_>) -> Result<String> {
        let core = load_core(ctx);
        let url = core.authorize_url()?;
        Ok(url)
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn link_food(
        &self,
        ctx: &Context<'_>,
        id: ID,
        name: String,
        extras: Option<Json<Map<String, Value>>>,
        upc: String,
    ) -> Result<bool> {
        let core = load_core(ctx);
        let extras = extras.map(|extras| extras.0).unwrap_or_default();
        core.link_food(&id, &name, extras, &upc).await?;
        Ok(true)
    }

    async fn add_to_cart(&self, ctx: &Context<'_>, list_id: ID) -> Result<CartResult> {
        let core = load_core(ctx);
        let mut session = load_session(ctx).lock().await;
        match core.add_to_cart(&mut session, &list_id).await? {
            Outcome::Done(added) => Ok(CartResult {
                added: added as u32,
            }),
            Outcome::LoginRequired => Err(error::LoginRequired.extend()),
        }
    }
}
