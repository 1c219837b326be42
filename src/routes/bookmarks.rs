use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::db::models::{Bookmark, Post, PostId};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/bookmarks", get(list_bookmarks))
        .route(
            "/api/bookmarks/{post_id}",
            put(add_bookmark).delete(remove_bookmark),
        )
}

/// Bookmarked posts the caller can still read.
async fn list_bookmarks(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    let posts = state
        .store
        .bookmarked_posts(&user.identity.user_id)
        .await?;
    let posts = state.resolver.retain_readable(&user.viewer(), posts).await;
    Ok(Json(posts))
}

async fn add_bookmark(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Bookmark>> {
    let post = state
        .resolver
        .get_post(&user.viewer(), &PostId(post_id))
        .await?;
    let bookmark = state
        .store
        .add_bookmark(&user.identity.user_id, &post.id)
        .await?;
    Ok(Json(bookmark))
}

async fn remove_bookmark(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<StatusCode> {
    let removed = state
        .store
        .remove_bookmark(&user.identity.user_id, &PostId(post_id))
        .await?;
    if !removed {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
