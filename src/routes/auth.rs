use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::password;
use crate::db::models::{GroupId, NewUser, UserId};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub groups: Vec<GroupId>,
}

#[derive(Serialize)]
struct SessionResponse {
    user_id: UserId,
    username: String,
    display_name: String,
    token: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(AppError::BadRequest(
            "Username must be 3 to 32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(AppError::BadRequest(
            "Username may only contain a-z, 0-9 and _".into(),
        ));
    }
    Ok(())
}

fn session_cookie(state: &AppState, token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        state.config.auth.cookie_name,
        token,
        state.config.auth.session_hours * 3600
    )
}

async fn start_session(
    state: &AppState,
    user_id: UserId,
    username: String,
    display_name: String,
    status: StatusCode,
) -> AppResult<Response> {
    let token = state.sessions.start_session(&user_id).await?;
    let cookie = session_cookie(state, &token);

    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse {
            user_id,
            username,
            display_name,
            token,
        }),
    )
        .into_response())
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    let username = req.username.trim().to_lowercase();
    validate_username(&username)?;
    if req.password.chars().count() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }

    let display_name = req
        .display_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| username.clone());
    if display_name.chars().count() > 64 {
        return Err(AppError::BadRequest(
            "Display name must be 64 characters or less".into(),
        ));
    }

    let user = state
        .store
        .create_user(&NewUser {
            username,
            display_name,
            password_hash: password::hash(&req.password)?,
        })
        .await?;
    tracing::info!(user = %user.id, "Registered {}", user.username);

    start_session(
        &state,
        user.id,
        user.username,
        user.display_name,
        StatusCode::CREATED,
    )
    .await
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let username = req.username.trim().to_lowercase();
    let user = state
        .store
        .find_user_by_username(&username)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !password::verify(&req.password, &user.password_hash) {
        return Err(AppError::Unauthorized);
    }

    start_session(
        &state,
        user.id,
        user.username,
        user.display_name,
        StatusCode::OK,
    )
    .await
}

async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    state.sessions.end_session(&user.token).await?;

    let cookie = format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        state.config.auth.cookie_name
    );
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response())
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<MeResponse>> {
    let groups = state
        .sessions
        .group_memberships(&user.identity.user_id)
        .await?;

    Ok(Json(MeResponse {
        user_id: user.identity.user_id,
        username: user.identity.username,
        display_name: user.identity.display_name,
        groups,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_lowercase_word_characters() {
        assert!(validate_username("ada_99").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("Ada").is_err());
        assert!(validate_username("ada lovelace").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }
}
