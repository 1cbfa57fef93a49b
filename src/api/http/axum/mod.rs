mod login;

use std::{convert::Infallible, marker::PhantomData, sync::Arc};

use async_graphql::{
    http::{playground_source, GraphQLPlaygroundConfig},
    ObjectType, Schema, SubscriptionType,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract,
    http::{header, HeaderMap, HeaderValue},
    response::{self, IntoResponse},
    routing::get,
    AddExtensionLayer, Router,
};

use super::graphql::RequestSession;
use crate::session::{LoadedSession, SessionStore};

pub use self::login::routes as login_routes;

pub struct GraphQL<Query, Mutation, Subscription>(
    PhantomData<(Query, Mutation, Subscription)>,
    Infallible,
);

impl<Query, Mutation, Subscription> GraphQL<Query, Mutation, Subscription>
where
    Query: ObjectType + 'static,
    Mutation: ObjectType + 'static,
    Subscription: SubscriptionType + 'static,
{
    async fn handler(
        schema: extract::Extension<Schema<Query, Mutation, Subscription>>,
        sessions: extract::Extension<Arc<SessionStore>>,
        req: GraphQLRequest,
        headers: HeaderMap,
    ) -> (HeaderMap, GraphQLResponse) {
        let mut loaded = sessions.load(cookie_header(&headers)).await;

        let request_session = Arc::new(RequestSession::new(loaded.session.clone()));
        let req = req.into_inner().data(Arc::clone(&request_session));
        let res = schema.execute(req).await;

        loaded.session = request_session.snapshot().await;
        let headers = session_headers(&sessions, &loaded);
        sessions.save(loaded).await;

        (headers, res.into())
    }

    async fn playground() -> impl IntoResponse {
        response::Html(playground_source(
            GraphQLPlaygroundConfig::new("/").with_setting("request.credentials", "include"),
        ))
    }

    pub fn routes(router: Router, schema: Schema<Query, Mutation, Subscription>) -> Router {
        router
            .route("/", get(Self::playground).post(Self::handler))
            .layer(AddExtensionLayer::new(schema))
    }
}

fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
}

/// Response headers that hand a freshly started session to the browser.
fn session_headers(sessions: &SessionStore, loaded: &LoadedSession) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if loaded.is_new {
        if let Ok(value) = HeaderValue::from_str(&sessions.set_cookie(&loaded.id)) {
            headers.insert(header::SET_COOKIE, value);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_sessions_get_a_cookie() {
        let sessions = SessionStore::new("secret");
        let loaded = sessions.load(None).await;

        let headers = session_headers(&sessions, &loaded);
        let cookie = headers[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("mealie_kroger_session="));
        assert!(cookie.contains("HttpOnly"));

        let value = cookie
            .trim_start_matches("mealie_kroger_session=")
            .split(';')
            .next()
            .unwrap();
        assert_eq!(sessions.verify(value), Some(loaded.id));
    }

    #[tokio::test]
    async fn known_sessions_keep_their_cookie() {
        let sessions = SessionStore::new("secret");
        let mut loaded = sessions.load(None).await;
        loaded.is_new = false;
        assert!(session_headers(&sessions, &loaded).is_empty());
    }

    #[test]
    fn cookie_header_is_read() {
        let mut headers = HeaderMap::new();
        assert_eq!(cookie_header(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("a=b"));
        assert_eq!(cookie_header(&headers), Some("a=b"));
    }
}
