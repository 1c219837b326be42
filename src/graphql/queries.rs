use async_graphql::*;
use std::sync::Arc;

use crate::config::FeedConfig;
use crate::db::models::{PostId, UserId};
use crate::error::AppError;
use crate::graphql::types::{AuthorObject, PostObject, PostPageObject};
use crate::store::DocumentStore;
use crate::visibility::{OwnerView, PageRequest, Viewer, VisibilityResolver};

// Requests without a viewer attached are treated as anonymous
fn viewer(ctx: &Context<'_>) -> Viewer {
    ctx.data_opt::<Viewer>()
        .cloned()
        .unwrap_or(Viewer::Anonymous)
}

fn page(ctx: &Context<'_>, first: Option<u32>, after: Option<String>) -> Result<PageRequest> {
    let feed = ctx.data::<FeedConfig>()?;
    Ok(PageRequest {
        page_size: feed.page_size(first),
        cursor: after.filter(|c| !c.is_empty()).map(PostId),
    })
}

// Upstream failures are logged and hidden from clients
fn gql_error(err: AppError) -> Error {
    match err {
        AppError::Store(e) => {
            tracing::error!("Store error: {}", e);
            Error::new("Internal server error")
        }
        AppError::Internal(msg) => {
            tracing::error!("Internal error: {}", msg);
            Error::new("Internal server error")
        }
        other => Error::new(other.to_string()),
    }
}

/// GraphQL Query root
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Posts the current viewer may read, newest first
    async fn visible_posts(
        &self,
        ctx: &Context<'_>,
        first: Option<u32>,
        after: Option<String>,
    ) -> Result<PostPageObject> {
        let resolver = ctx.data::<VisibilityResolver>()?;
        let page = page(ctx, first, after)?;

        let posts = resolver
            .list_visible_posts(&viewer(ctx), &page)
            .await
            .map_err(gql_error)?;
        Ok(posts.into())
    }

    /// One profile tab of a user's posts
    async fn owner_posts(
        &self,
        ctx: &Context<'_>,
        owner_id: String,
        #[graphql(default_with = "OwnerView::Public")] view: OwnerView,
        first: Option<u32>,
        after: Option<String>,
    ) -> Result<PostPageObject> {
        let resolver = ctx.data::<VisibilityResolver>()?;
        let page = page(ctx, first, after)?;

        let posts = resolver
            .list_owner_posts(&viewer(ctx), &UserId(owner_id), view, &page)
            .await
            .map_err(gql_error)?;
        Ok(posts.into())
    }

    /// A single post, or null when it does not exist or is not readable
    async fn post(&self, ctx: &Context<'_>, id: String) -> Result<Option<PostObject>> {
        let resolver = ctx.data::<VisibilityResolver>()?;

        match resolver.get_post(&viewer(ctx), &PostId(id)).await {
            Ok(post) => Ok(Some(post.into())),
            Err(AppError::NotFound) => Ok(None),
            Err(e) => Err(gql_error(e)),
        }
    }

    /// Authors with the most published public posts
    async fn popular_authors(
        &self,
        ctx: &Context<'_>,
        limit: Option<u32>,
    ) -> Result<Vec<AuthorObject>> {
        let store = ctx.data::<Arc<dyn DocumentStore>>()?;
        let feed = ctx.data::<FeedConfig>()?;

        let authors = store
            .popular_authors(limit.unwrap_or(feed.popular_authors).min(feed.max_page_size))
            .await
            .map_err(|e| gql_error(e.into()))?;
        Ok(authors.into_iter().map(AuthorObject::from).collect())
    }
}
