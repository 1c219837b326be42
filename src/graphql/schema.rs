use async_graphql::{EmptyMutation, EmptySubscription, Schema};
use std::sync::Arc;

use super::queries::QueryRoot;
use crate::config::FeedConfig;
use crate::store::DocumentStore;
use crate::visibility::VisibilityResolver;

/// GraphQL Schema type
pub type FeedSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Build the GraphQL schema. The viewer is attached per request.
pub fn build_schema(
    resolver: VisibilityResolver,
    store: Arc<dyn DocumentStore>,
    feed: FeedConfig,
) -> FeedSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(resolver)
        .data(store)
        .data(feed)
        .finish()
}
