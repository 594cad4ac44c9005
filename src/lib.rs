use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod password;
pub mod repository;
pub mod storage;

// Routing segregated by access level (public, login required, admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use cache::{IndexCache, IndexCacheState};
pub use config::AppConfig;
pub use error::AppError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers, served at
/// `/api-docs/openapi.json` and browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::index, handlers::get_groups, handlers::group_posts, handlers::profile,
        handlers::post_detail, handlers::post_create, handlers::post_edit,
        handlers::add_comment, handlers::follow_index, handlers::profile_follow,
        handlers::profile_unfollow, handlers::signup, handlers::login, handlers::get_me,
        handlers::password_change, handlers::get_presigned_url, handlers::admin_groups,
        handlers::create_group, handlers::update_group, handlers::delete_group,
        handlers::admin_posts, handlers::assign_post_group, handlers::admin_delete_post,
        handlers::admin_comments, handlers::admin_delete_comment, handlers::clear_index_cache
    ),
    components(
        schemas(
            models::User, models::Author, models::Group, models::Post, models::PostView,
            models::Comment, models::PostForm, models::CommentForm, models::GroupForm,
            models::AssignGroupRequest, models::SignupForm, models::LoginRequest,
            models::PasswordChangeForm, models::PresignedUrlRequest,
            models::PresignedUrlResponse, models::AuthToken, models::GroupPage,
            models::ProfilePage, models::PostDetail,
        )
    ),
    tags(
        (name = "yatube", description = "Yatube blogging API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of services handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Persistence (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Object storage for post images.
    pub storage: StorageState,
    pub config: AppConfig,
    /// Short-lived cache of index pages.
    pub index_cache: IndexCacheState,
}

impl AppState {
    /// Assembles the state, sizing the index cache from `config.index_cache_ttl`.
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        let index_cache = std::sync::Arc::new(IndexCache::new(config.index_cache_ttl));
        Self {
            repo,
            storage,
            config,
            index_cache,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for IndexCacheState {
    fn from_ref(app_state: &AppState) -> IndexCacheState {
        app_state.index_cache.clone()
    }
}

/// auth_middleware
///
/// Guards the login-required and admin routers. Resolving `AuthUser` rejects
/// anonymous requests with 401; on success the identity is stored in the request
/// extensions so the handler's own `AuthUser` extraction does not hit the database again.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// create_router
///
/// Assembles all routes, the auth layers and the observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // The admin role itself is checked inside each handler.
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Request span carrying method, uri and the `x-request-id`, so every log line of
/// one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
