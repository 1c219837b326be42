use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::config::FeedConfig;
use crate::db::models::{
    AuthorSummary, GroupId, NewPost, Post, PostCategory, PostId, PostPatch, PostStatus, UserId,
    Visibility,
};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;
use crate::visibility::{OwnerView, PageRequest, PostPage};

const MAX_TITLE_CHARS: usize = 200;
const MAX_LABEL_CHARS: usize = 40;

// --- Query params & bodies ---

#[derive(Deserialize, Default)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

impl PageParams {
    pub fn page(&self, feed: &FeedConfig) -> PageRequest {
        PageRequest {
            page_size: feed.page_size(self.limit),
            cursor: self.cursor.clone().filter(|c| !c.is_empty()).map(PostId),
        }
    }
}

#[derive(Deserialize)]
pub struct OwnerPostsParams {
    pub view: Option<OwnerView>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    #[serde(default)]
    pub content: serde_json::Value,
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub group_ids: Vec<GroupId>,
    pub status: Option<PostStatus>,
    pub category: Option<PostCategory>,
    pub label: Option<String>,
}

#[derive(Serialize)]
pub struct FeedResponse {
    #[serde(flatten)]
    pub page: PostPage,
    pub popular_authors: Vec<AuthorSummary>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/feed", get(feed))
        .route(
            "/api/posts/{id}",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/api/users/{id}/posts", get(owner_posts))
}

// --- Validation ---

fn clean_title(title: &str) -> AppResult<String> {
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title cannot be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::BadRequest(format!(
            "Title must be {MAX_TITLE_CHARS} characters or less"
        )));
    }
    Ok(title)
}

fn clean_label(label: Option<String>) -> AppResult<Option<String>> {
    let label = label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
    if let Some(l) = &label {
        if l.chars().count() > MAX_LABEL_CHARS {
            return Err(AppError::BadRequest(format!(
                "Label must be {MAX_LABEL_CHARS} characters or less"
            )));
        }
    }
    Ok(label)
}

/// Authors may only share with groups they belong to.
async fn check_group_targets(
    state: &AppState,
    author: &UserId,
    group_ids: &[GroupId],
) -> AppResult<()> {
    if group_ids.is_empty() {
        return Ok(());
    }
    let memberships = state.sessions.group_memberships(author).await?;
    match group_ids.iter().find(|g| !memberships.contains(g)) {
        Some(outsider) => Err(AppError::BadRequest(format!(
            "Not a member of group {outsider}"
        ))),
        None => Ok(()),
    }
}

/// The post, if the caller both can read it and owns it.
async fn owned_post(state: &AppState, user: &CurrentUser, id: &PostId) -> AppResult<Post> {
    let post = state.resolver.get_post(&user.viewer(), id).await?;
    if post.user_id != user.identity.user_id {
        return Err(AppError::Forbidden);
    }
    Ok(post)
}

// --- Handlers ---

async fn list_posts(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(params): Query<PageParams>,
) -> AppResult<Json<PostPage>> {
    let page = params.page(&state.config.feed);
    let posts = state
        .resolver
        .list_visible_posts(&viewer.viewer(), &page)
        .await?;
    Ok(Json(posts))
}

/// First feed page plus the sidebar authors, fetched concurrently.
async fn feed(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(params): Query<PageParams>,
) -> AppResult<Json<FeedResponse>> {
    let page = params.page(&state.config.feed);
    let viewer = viewer.viewer();

    let (page, popular_authors) = tokio::try_join!(
        state.resolver.list_visible_posts(&viewer, &page),
        async {
            state
                .store
                .popular_authors(state.config.feed.popular_authors)
                .await
                .map_err(AppError::from)
        }
    )?;

    Ok(Json(FeedResponse {
        page,
        popular_authors,
    }))
}

async fn owner_posts(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(owner): Path<String>,
    Query(params): Query<OwnerPostsParams>,
) -> AppResult<Json<PostPage>> {
    let page = PageParams {
        limit: params.limit,
        cursor: params.cursor,
    }
    .page(&state.config.feed);

    let posts = state
        .resolver
        .list_owner_posts(
            &viewer.viewer(),
            &UserId(owner),
            params.view.unwrap_or(OwnerView::Public),
            &page,
        )
        .await?;
    Ok(Json(posts))
}

async fn get_post(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let post = state.resolver.get_post(&viewer.viewer(), &PostId(id)).await?;
    Ok(Json(post))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<Response> {
    let title = clean_title(&req.title)?;
    let label = clean_label(req.label)?;
    check_group_targets(&state, &user.identity.user_id, &req.group_ids).await?;

    let post = state
        .store
        .create_post(&NewPost {
            user_id: user.identity.user_id.clone(),
            user_name: user.identity.display_name.clone(),
            title,
            content: req.content,
            visibility: req.visibility.unwrap_or(Visibility::Public),
            group_ids: req.group_ids,
            status: req.status.unwrap_or(PostStatus::Published),
            category: req.category.unwrap_or(PostCategory::Standard),
            label,
        })
        .await?;
    tracing::info!(post = %post.id, user = %post.user_id, "Created post");

    Ok((StatusCode::CREATED, Json(post)).into_response())
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(mut patch): Json<PostPatch>,
) -> AppResult<Json<Post>> {
    let id = PostId(id);
    owned_post(&state, &user, &id).await?;

    if let Some(title) = &patch.title {
        patch.title = Some(clean_title(title)?);
    }
    if let Some(label) = patch.label.take() {
        patch.label = Some(clean_label(label)?);
    }
    if let Some(groups) = &patch.group_ids {
        check_group_targets(&state, &user.identity.user_id, groups).await?;
    }

    let post = state.store.update_post(&id, &patch).await?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = PostId(id);
    owned_post(&state, &user, &id).await?;

    state.store.delete_post(&id).await?;
    tracing::info!(post = %id, "Deleted post");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(clean_title("  Hello  ").unwrap(), "Hello");
        assert!(clean_title("   ").is_err());
        assert!(clean_title(&"x".repeat(MAX_TITLE_CHARS + 1)).is_err());
        assert!(clean_title(&"é".repeat(MAX_TITLE_CHARS)).is_ok());
    }

    #[test]
    fn blank_label_becomes_none() {
        assert_eq!(clean_label(Some("   ".into())).unwrap(), None);
        assert_eq!(
            clean_label(Some(" travel ".into())).unwrap(),
            Some("travel".into())
        );
        assert!(clean_label(Some("x".repeat(MAX_LABEL_CHARS + 1))).is_err());
    }

    #[test]
    fn page_params_fall_back_to_feed_defaults() {
        let feed = FeedConfig::default();
        let page = PageParams::default().page(&feed);
        assert_eq!(page.page_size, feed.page_size);
        assert!(page.cursor.is_none());

        let page = PageParams {
            limit: Some(1000),
            cursor: Some("p9".into()),
        }
        .page(&feed);
        assert_eq!(page.page_size, feed.max_page_size);
        assert_eq!(page.cursor, Some(PostId::new("p9")));
    }
}
