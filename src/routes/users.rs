use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::UserId;
use crate::error::AppResult;
use crate::state::AppState;

/// What other users may see of an account.
#[derive(Serialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/users/{id}", get(profile))
}

async fn profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Profile>> {
    let user = state.store.get_user(&UserId(id)).await?;
    Ok(Json(Profile {
        id: user.id,
        username: user.username,
        display_name: user.display_name,
        joined_at: user.created_at,
    }))
}
