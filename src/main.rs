use std::sync::Arc;

use axum::{AddExtensionLayer, Router, Server};
use mealie_kroger::{
    api::http::{
        axum::{login_routes, GraphQL},
        graphql, AUTH_PATH,
    },
    config::Config,
    core::Core,
    kroger::KrogerApi,
    mealie::MealieApi,
    oauth::{AuthenticatedRequestClient, TokenAuthority},
    session::SessionStore,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    let reqwest_client = reqwest::Client::builder()
        .connection_verbose(true)
        .build()?;

    let authority = Arc::new(
        TokenAuthority::new(reqwest_client.clone(), config.provider())
            .with_timeout(config.http_timeout),
    );

    let kroger_client =
        AuthenticatedRequestClient::new(reqwest_client.clone(), Arc::clone(&authority))
            .with_timeout(config.http_timeout);
    let kroger = KrogerApi::new(kroger_client, config.kroger_api_url.clone());

    let mealie = MealieApi::new(
        reqwest_client,
        &config.mealie_url,
        config.mealie_api_token.clone(),
    )?
    .with_timeout(config.http_timeout);

    let core = Arc::new(Core {
        shopping_lists: Box::new(mealie),
        cart: Box::new(kroger),
        authority,
        redirect_uri: config.public_url_for(AUTH_PATH),
    });
    let sessions = Arc::new(SessionStore::new(config.session_secret_key.clone()));

    let schema = graphql::schema().data(Arc::clone(&core)).finish();

    let app = Router::new();
    let app = GraphQL::routes(app, schema);
    let app = login_routes(app)
        .layer(AddExtensionLayer::new(core))
        .layer(AddExtensionLayer::new(sessions));

    info!(message = "Playground", url = %config.public_url, bind_addr = %config.bind_addr);

    Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
