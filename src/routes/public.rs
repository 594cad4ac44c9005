use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: the read-only post pages and the
/// account gateway (signup, login).
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /?page=
        // The index: every post, newest first. Cached per page.
        .route("/", get(handlers::index))
        .route("/posts", get(handlers::index))
        // GET /groups
        .route("/groups", get(handlers::get_groups))
        // GET /group/{slug}?page=
        .route("/group/{slug}", get(handlers::group_posts))
        // GET /profile/{username}?page=
        // Reports `following` when the visitor is logged in.
        .route("/profile/{username}", get(handlers::profile))
        // GET /posts/{post_id}
        .route("/posts/{post_id}", get(handlers::post_detail))
        // POST /auth/signup, POST /auth/login
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/login", post(handlers::login))
}
