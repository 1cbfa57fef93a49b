//! Browser-facing routes for the OAuth redirect flow.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract,
    http::{HeaderMap, StatusCode, Uri},
    response::Redirect,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::warn;

use super::{cookie_header, session_headers};
use crate::{
    api::http::{ADD_TO_CART_PATH, AUTH_PATH, LOGIN_PATH},
    core::{Core, ShoppingListItem},
    oauth,
    session::SessionStore,
    utils::ServerError,
};

type ErrorResponse = (StatusCode, String);

pub fn routes(router: Router) -> Router {
    router
        .route(LOGIN_PATH, get(login))
        .route(AUTH_PATH, get(authorize))
        .route(ADD_TO_CART_PATH, get(add_to_cart))
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    next: Option<String>,
}

async fn login(
    core: extract::Extension<Arc<Core>>,
    sessions: extract::Extension<Arc<SessionStore>>,
    extract::Query(params): extract::Query<LoginParams>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Redirect), ErrorResponse> {
    let url = core.authorize_url().map_err(oauth_error)?;
    let url = parse_uri(&url)?;

    let mut loaded = sessions.load(cookie_header(&headers)).await;
    if let Some(next) = params.next.filter(|next| is_local_path(next)) {
        loaded.session.set_next(next);
    }
    let headers = session_headers(&sessions, &loaded);
    sessions.save(loaded).await;

    Ok((headers, Redirect::to(url)))
}

async fn authorize(
    core: extract::Extension<Arc<Core>>,
    sessions: extract::Extension<Arc<SessionStore>>,
    extract::Query(params): extract::Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Redirect), ErrorResponse> {
    let mut loaded = sessions.load(cookie_header(&headers)).await;
    let next = core
        .complete_login(&mut loaded.session, &params)
        .await
        .map_err(oauth_error)?;
    let next = parse_uri(&next)?;

    let headers = session_headers(&sessions, &loaded);
    sessions.save(loaded).await;

    Ok((headers, Redirect::to(next)))
}

/// Landing page after login: the items about to go into the cart.
async fn add_to_cart(
    core: extract::Extension<Arc<Core>>,
    extract::Query(params): extract::Query<HashMap<String, String>>,
) -> Result<Json<Vec<ShoppingListItem>>, ErrorResponse> {
    let list_id = params.get("list_id").ok_or_else(|| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Must provide list_id parameter".to_owned(),
        )
    })?;
    let items = core
        .shopping_list_items(list_id)
        .await
        .map_err(upstream_error)?;
    Ok(Json(items))
}

fn parse_uri(uri: &str) -> Result<Uri, ErrorResponse> {
    uri.parse()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, format!("invalid redirect {}", uri)))
}

// Browsers read `\` as `/` and drop tabs and newlines, so `/\host` and
// `/\t/host` leave this site just like `//host`.
fn is_local_path(path: &str) -> bool {
    if !path.starts_with('/') || path.starts_with("//") {
        return false;
    }
    if path.chars().any(|c| c == '\\' || c.is_control()) {
        return false;
    }
    matches!(path.parse::<Uri>(), Ok(uri) if uri.authority().is_none())
}

fn status_response(err: &ServerError) -> Option<ErrorResponse> {
    if err.is_timeout() {
        return Some((StatusCode::GATEWAY_TIMEOUT, err.to_string()));
    }
    let status = StatusCode::from_u16(err.status_code()?).ok()?;
    let body = match err {
        ServerError::Status { body, .. } => body.clone(),
        ServerError::Network(_) => err.to_string(),
    };
    Some((status, body))
}

fn oauth_error(err: oauth::Error) -> ErrorResponse {
    warn!(message = "OAuth flow failed", error = %err);
    let response = match &err {
        oauth::Error::InvalidGrant => Some((StatusCode::BAD_REQUEST, err.to_string())),
        oauth::Error::UpstreamAuth(server) | oauth::Error::Upstream(server) => {
            status_response(server)
        }
        _ => None,
    };
    response.unwrap_or_else(|| (StatusCode::BAD_GATEWAY, err.to_string()))
}

fn upstream_error(err: anyhow::Error) -> ErrorResponse {
    warn!(message = "Upstream request failed", error = %err);
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ServerError>())
        .and_then(status_response)
        .unwrap_or_else(|| (StatusCode::BAD_GATEWAY, err.to_string()))
}
