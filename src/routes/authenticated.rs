use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind the auth middleware, so anonymous requests get
/// 401 before reaching a handler. Author-only rules (editing a post) are enforced
/// inside the handlers against the resolved `AuthUser`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /create
        // Publishes a post as the requester.
        .route("/create", post(handlers::post_create))
        // PUT /posts/{post_id}/edit
        // Author-only; others get 403.
        .route("/posts/{post_id}/edit", put(handlers::post_edit))
        // POST /posts/{post_id}/comment
        .route("/posts/{post_id}/comment", post(handlers::add_comment))
        // GET /follow?page=
        // Feed of followed authors' posts.
        .route("/follow", get(handlers::follow_index))
        // POST /profile/{username}/follow, POST /profile/{username}/unfollow
        // Toggles; self-follow and repeats are no-ops.
        .route("/profile/{username}/follow", post(handlers::profile_follow))
        .route("/profile/{username}/unfollow", post(handlers::profile_unfollow))
        // GET /auth/me
        .route("/auth/me", get(handlers::get_me))
        // POST /auth/password_change
        .route("/auth/password_change", post(handlers::password_change))
        // POST /upload/presigned
        // Short-lived upload URL for a post image.
        .route("/upload/presigned", post(handlers::get_presigned_url))
}
