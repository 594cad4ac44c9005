mod common;

use axum::{
    extract::FromRequestParts,
    http::{Method, Request, header, request::Parts},
};
use common::{spawn_app, spawn_app_with};
use jsonwebtoken::{EncodingKey, Header, encode};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::{sync::Arc, time::{Duration, SystemTime}};
use yatube::{
    AppConfig, AppError, AppState, InMemoryRepository, MockStorageService,
    auth::{self, AuthUser, Claims, DEV_USER_HEADER, MaybeAuthUser},
    config::Env,
    models::{AuthToken, ROLE_ADMIN, ROLE_USER, User},
    password,
    repository::{NewUser, Repository, RepositoryState},
    storage::StorageState,
};

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_PASSWORD: &str = "correct-horse-battery";

fn now() -> usize {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

fn create_token(user_id: i64, secret: &str, exp: usize) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now(),
        exp,
    };
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn test_config(env: Env) -> AppConfig {
    AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    }
}

async fn create_app_state(env: Env) -> (AppState, User) {
    let repo = Arc::new(InMemoryRepository::new());
    let user = repo
        .create_user(NewUser {
            username: "leo".to_string(),
            role: ROLE_USER.to_string(),
            ..NewUser::default()
        })
        .await
        .unwrap();

    let state = AppState::new(
        repo as RepositoryState,
        Arc::new(MockStorageService::new()) as StorageState,
        test_config(env),
    );
    (state, user)
}

fn get_request_parts() -> Parts {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/")
        .body(())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

// --- Extractor ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let (app_state, user) = create_app_state(Env::Production).await;
    let token = create_token(user.id, TEST_JWT_SECRET, now() + 3600);

    let mut parts = get_request_parts();
    bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.username, "leo");
    assert_eq!(auth_user.role, ROLE_USER);
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let (app_state, _) = create_app_state(Env::Production).await;
    let mut parts = get_request_parts();

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let (app_state, user) = create_app_state(Env::Production).await;
    // Well past the default validation leeway.
    let token = create_token(user.id, TEST_JWT_SECRET, now() - 3600);

    let mut parts = get_request_parts();
    bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_with_foreign_signature() {
    let (app_state, user) = create_app_state(Env::Production).await;
    let token = create_token(user.id, "some-other-secret", now() + 3600);

    let mut parts = get_request_parts();
    bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_auth_failure_for_deleted_subject() {
    let (app_state, _) = create_app_state(Env::Production).await;
    let token = create_token(4242, TEST_JWT_SECRET, now() + 3600);

    let mut parts = get_request_parts();
    bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_local_bypass_success() {
    let (app_state, user) = create_app_state(Env::Local).await;

    let mut parts = get_request_parts();
    parts.headers.insert(
        DEV_USER_HEADER,
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.id, user.id);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let (app_state, user) = create_app_state(Env::Production).await;

    let mut parts = get_request_parts();
    // Provide ONLY the local bypass header
    parts.headers.insert(
        DEV_USER_HEADER,
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_maybe_auth_user_never_rejects() {
    let (app_state, user) = create_app_state(Env::Production).await;

    let mut parts = get_request_parts();
    bearer(&mut parts, "not-a-jwt");
    let MaybeAuthUser(anonymous) = MaybeAuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(anonymous.is_none());

    let mut parts = get_request_parts();
    bearer(&mut parts, &create_token(user.id, TEST_JWT_SECRET, now() + 3600));
    let MaybeAuthUser(visitor) = MaybeAuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(visitor.unwrap().id, user.id);
}

#[tokio::test]
async fn test_issued_token_round_trips() {
    let config = test_config(Env::Production);
    let user = User {
        id: 7,
        ..User::default()
    };

    let token = auth::issue_token(&config, &user).unwrap();
    assert_eq!(token.token_type, "Bearer");
    assert_eq!(token.expires_in, config.jwt_ttl.as_secs());
    assert_eq!(auth::decode_token(&config, &token.token).unwrap(), 7);

    let other = AppConfig {
        jwt_secret: "different".to_string(),
        ..config
    };
    assert!(auth::decode_token(&other, &token.token).is_err());
}

#[tokio::test]
async fn test_issue_token_with_huge_lifetime() {
    let config = AppConfig {
        jwt_ttl: Duration::from_secs(u64::MAX / 3600 * 3600),
        ..test_config(Env::Production)
    };
    let user = User {
        id: 7,
        ..User::default()
    };

    let token = auth::issue_token(&config, &user).unwrap();
    assert_eq!(token.expires_in, config.jwt_ttl.as_secs());
}

// --- Account endpoints ---

async fn signup(app: &common::TestApp, username: &str) -> reqwest::Response {
    app.client
        .post(app.url("/auth/signup"))
        .json(&json!({
            "first_name": "Leo",
            "last_name": "Tolstoy",
            "username": username,
            "email": format!("{username}@example.com"),
            "password": TEST_PASSWORD,
            "password_confirm": TEST_PASSWORD,
        }))
        .send()
        .await
        .expect("req fail")
}

async fn login(app: &common::TestApp, username: &str, password: &str) -> reqwest::Response {
    app.client
        .post(app.url("/auth/login"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("req fail")
}

#[tokio::test]
async fn test_signup_login_and_me() {
    let app = spawn_app_with(test_config(Env::Production)).await;

    let response = signup(&app, "leo").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["username"], "leo");
    assert_eq!(body["role"], ROLE_USER);
    assert!(body.get("password_hash").is_none());

    let stored = app.repo.get_user_by_username("leo").await.unwrap().unwrap();
    assert_ne!(stored.password_hash, TEST_PASSWORD);

    let response = login(&app, "leo", TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token: AuthToken = response.json().await.unwrap();

    let me: Value = app
        .get("/auth/me")
        .bearer_auth(&token.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["id"], stored.id);
    assert_eq!(me["email"], "leo@example.com");

    // The token opens login-required routes.
    let response = app
        .client
        .post(app.url("/create"))
        .bearer_auth(&token.token)
        .json(&json!({ "text": "Written with a token" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_signup_rejects_duplicates_and_bad_input() {
    let app = spawn_app().await;

    assert_eq!(signup(&app, "leo").await.status(), StatusCode::CREATED);
    assert_eq!(signup(&app, "leo").await.status(), StatusCode::CONFLICT);

    let response = app
        .client
        .post(app.url("/auth/signup"))
        .json(&json!({
            "username": "bad name!",
            "email": "not-an-email",
            "password": "12345678",
            "password_confirm": "87654321",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    for field in ["username", "email", "password", "password_confirm"] {
        assert!(body["fields"][field].is_array(), "missing error for {field}");
    }
}

#[tokio::test]
async fn test_login_with_wrong_credentials() {
    let app = spawn_app().await;
    signup(&app, "leo").await;

    assert_eq!(
        login(&app, "leo", "wrong-password").await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        login(&app, "nobody", TEST_PASSWORD).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_password_change() {
    let app = spawn_app().await;
    signup(&app, "leo").await;
    let token: AuthToken = login(&app, "leo", TEST_PASSWORD).await.json().await.unwrap();

    let response = app
        .client
        .post(app.url("/auth/password_change"))
        .bearer_auth(&token.token)
        .json(&json!({
            "old_password": "not-my-password",
            "new_password": "brand-new-secret",
            "new_password_confirm": "brand-new-secret",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .client
        .post(app.url("/auth/password_change"))
        .bearer_auth(&token.token)
        .json(&json!({
            "old_password": TEST_PASSWORD,
            "new_password": "brand-new-secret",
            "new_password_confirm": "brand-new-secret",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        login(&app, "leo", TEST_PASSWORD).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        login(&app, "leo", "brand-new-secret").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_garbage_token_is_rejected_over_http() {
    let app = spawn_app().await;

    let response = app
        .get("/follow")
        .bearer_auth("definitely.not.valid")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- Roles ---

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = spawn_app().await;
    let user = app.create_user("leo").await;
    let admin = app.create_admin("boss").await;
    assert_eq!(admin.role, ROLE_ADMIN);

    let response = app.get("/admin/groups").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .as_user(reqwest::Method::GET, "/admin/groups", &user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .as_user(reqwest::Method::GET, "/admin/groups", &admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
fn test_password_hash_verifies_only_the_original() {
    let hash = password::hash_password(TEST_PASSWORD).unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(password::verify_password(TEST_PASSWORD, &hash));
    assert!(!password::verify_password("something-else", &hash));
    assert!(!password::verify_password(TEST_PASSWORD, "not-a-hash"));
}
