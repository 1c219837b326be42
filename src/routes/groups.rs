use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::{Group, GroupId, GroupMembership, UserId};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub user_id: UserId,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/groups", get(my_groups).post(create_group))
        .route(
            "/api/groups/{id}/members",
            get(list_members).post(add_member),
        )
        .route(
            "/api/groups/{id}/members/{user_id}",
            delete(remove_member),
        )
}

async fn create_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateGroupRequest>,
) -> AppResult<Response> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(AppError::BadRequest(
            "Group name must be 1 to 64 characters".into(),
        ));
    }

    let group = state
        .store
        .create_group(name, &user.identity.user_id)
        .await?;
    tracing::info!(group = %group.id, admin = %group.admin_id, "Created group");

    Ok((StatusCode::CREATED, Json(group)).into_response())
}

async fn my_groups(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Group>>> {
    let groups = state.store.groups_for_user(&user.identity.user_id).await?;
    Ok(Json(groups))
}

async fn list_members(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<GroupMembership>>> {
    let group = state.store.get_group(&GroupId(id)).await?;
    let members = state.store.list_members(&group.id).await?;

    if !members.iter().any(|m| m.user_id == user.identity.user_id) {
        return Err(AppError::Forbidden);
    }
    Ok(Json(members))
}

async fn add_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<Response> {
    let group = state.store.get_group(&GroupId(id)).await?;
    if group.admin_id != user.identity.user_id {
        return Err(AppError::Forbidden);
    }

    let membership = state.store.add_member(&group.id, &req.user_id).await?;
    Ok((StatusCode::CREATED, Json(membership)).into_response())
}

/// The admin removes anyone else; members may remove themselves.
async fn remove_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, member)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let group = state.store.get_group(&GroupId(id)).await?;
    let member = UserId(member);
    let me = &user.identity.user_id;

    if member == group.admin_id {
        return Err(AppError::BadRequest(
            "The group admin cannot be removed".into(),
        ));
    }
    if &group.admin_id != me && &member != me {
        return Err(AppError::Forbidden);
    }

    if !state.store.remove_member(&group.id, &member).await? {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
