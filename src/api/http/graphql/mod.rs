mod error;
mod model;
mod util;

use async_graphql::{EmptySubscription, SchemaBuilder};
use tokio::sync::{Mutex, MutexGuard};

use crate::session::Session;

use self::model::{MutationRoot, QueryRoot};

pub type Schema = async_graphql::Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn schema() -> SchemaBuilder<QueryRoot, MutationRoot, EmptySubscription> {
    async_graphql::Schema::build(QueryRoot, MutationRoot, EmptySubscription)
}

/// The caller's session, shared by the resolvers of one GraphQL request.
pub struct RequestSession(Mutex<Session>);

impl RequestSession {
    pub fn new(session: Session) -> Self {
        Self(Mutex::new(session))
    }

    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().await
    }

    pub async fn snapshot(&self) -> Session {
        self.0.lock().await.clone()
    }
}
