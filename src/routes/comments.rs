use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::{Comment, CommentId, NewComment, PostId};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;

const MAX_COMMENT_CHARS: usize = 500;

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/posts/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/api/comments/{id}", delete(delete_comment))
}

async fn list_comments(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Vec<Comment>>> {
    let post = state
        .resolver
        .get_post(&viewer.viewer(), &PostId(post_id))
        .await?;
    let comments = state.store.list_comments(&post.id).await?;
    Ok(Json(comments))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<Response> {
    let body = req.body.trim().to_string();
    if body.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }
    if body.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::BadRequest(format!(
            "Comment must be {MAX_COMMENT_CHARS} characters or less"
        )));
    }

    let post = state
        .resolver
        .get_post(&user.viewer(), &PostId(post_id))
        .await?;

    let comment = state
        .store
        .create_comment(&NewComment {
            post_id: post.id,
            user_id: user.identity.user_id,
            user_name: user.identity.display_name,
            body,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(comment)).into_response())
}

/// Comment authors and the post's owner may delete.
async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let comment = state.store.get_comment(&CommentId(id)).await?;
    let me = &user.identity.user_id;

    if &comment.user_id != me {
        let post = state.store.get_post(&comment.post_id).await?;
        if &post.user_id != me {
            return Err(AppError::Forbidden);
        }
    }

    state.store.delete_comment(&comment.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
