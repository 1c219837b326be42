pub mod auth;
pub mod bookmarks;
pub mod comments;
pub mod graphql;
pub mod groups;
pub mod posts;
pub mod users;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Full application router with state attached.
pub fn build_router(state: AppState) -> Router {
    let mut app = Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(groups::router())
        .merge(bookmarks::router())
        .merge(users::router())
        .merge(graphql::router());

    if let Some(cors) = cors_layer(&state.config.server) {
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

// Same-origin only unless origins are configured
fn cors_layer(server: &ServerConfig) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::PUT,
                Method::DELETE,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_origins_means_no_cors_layer() {
        let server = ServerConfig::default();
        assert!(cors_layer(&server).is_none());
    }

    #[test]
    fn invalid_origins_are_skipped() {
        let server = ServerConfig {
            allowed_origins: vec!["bad\norigin".to_string()],
            ..ServerConfig::default()
        };
        assert!(cors_layer(&server).is_none());

        let server = ServerConfig {
            allowed_origins: vec!["https://zuckonit.example".to_string()],
            ..ServerConfig::default()
        };
        assert!(cors_layer(&server).is_some());
    }
}
