use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, put},
};

/// Admin Router Module
///
/// Nested under `/admin`. Group management, moderation of posts and comments, and
/// flushing the index cache.
/// Each handler rejects non-admin users with 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /admin/groups
        .route(
            "/groups",
            get(handlers::admin_groups).post(handlers::create_group),
        )
        // PUT/DELETE /admin/groups/{slug}
        // Deleting a group keeps its posts, with the group cleared.
        .route(
            "/groups/{slug}",
            put(handlers::update_group).delete(handlers::delete_group),
        )
        // GET /admin/posts?search=&page=
        .route("/posts", get(handlers::admin_posts))
        // PATCH /admin/posts/{post_id}/group
        .route("/posts/{post_id}/group", patch(handlers::assign_post_group))
        // DELETE /admin/posts/{post_id}
        // Cascades to the post's comments.
        .route("/posts/{post_id}", delete(handlers::admin_delete_post))
        // GET /admin/comments?search=&page=
        .route("/comments", get(handlers::admin_comments))
        // DELETE /admin/comments/{comment_id}
        .route("/comments/{comment_id}", delete(handlers::admin_delete_comment))
        // DELETE /admin/cache
        .route("/cache", delete(handlers::clear_index_cache))
}
