use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::session::SessionProvider;
use crate::config::Config;
use crate::graphql::FeedSchema;
use crate::store::DocumentStore;
use crate::visibility::VisibilityResolver;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub sessions: Arc<dyn SessionProvider>,
    pub resolver: VisibilityResolver,
    pub graphql_schema: FeedSchema,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        let resolver = VisibilityResolver::new(store.clone(), sessions.clone());
        let graphql_schema =
            crate::graphql::build_schema(resolver.clone(), store.clone(), config.feed.clone());
        Self {
            config,
            store,
            sessions,
            resolver,
            graphql_schema,
        }
    }
}
