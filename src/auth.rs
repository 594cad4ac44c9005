use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::{AuthToken, User},
    repository::RepositoryState,
};

/// Header accepted in `Env::Local` in place of a token: the numeric id of an existing user.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of the session token issued by POST /auth/login.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id, as a string.
    pub sub: String,
    /// Expiration time (seconds since the epoch).
    pub exp: usize,
    /// Issued at (seconds since the epoch).
    pub iat: usize,
}

/// issue_token
///
/// Signs an HS256 session token for `user` valid for `config.jwt_ttl`.
pub fn issue_token(config: &AppConfig, user: &User) -> Result<AuthToken, AppError> {
    let now = usize::try_from(Utc::now().timestamp()).unwrap_or(0);
    let ttl = config.jwt_ttl.as_secs();
    let claims = Claims {
        sub: user.id.to_string(),
        iat: now,
        // Saturates for absurd TTLs instead of wrapping into the past.
        exp: now.saturating_add(usize::try_from(ttl).unwrap_or(usize::MAX)),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))?;

    Ok(AuthToken {
        token,
        token_type: "Bearer".to_string(),
        expires_in: ttl,
    })
}

/// decode_token
///
/// Validates signature and expiry and returns the user id carried in `sub`.
pub fn decode_token(config: &AppConfig, token: &str) -> Result<i64, AppError> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
            other => tracing::debug!("rejected token: {:?}", other),
        }
        AppError::Unauthorized
    })?;

    data.claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::Unauthorized)
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Taking it as a handler argument
/// makes the route login-required: the extractor rejects with 401 before the handler runs.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    /// 'user' or 'admin'.
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == crate::models::ROLE_ADMIN
    }

    /// Rejects non-admins with 403.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        AuthUser {
            id: user.id,
            username: user.username,
            role: user.role,
        }
    }
}

/// Resolution order (after reusing an identity the auth middleware already stored):
/// 1. In `Env::Local`, an `x-user-id` header naming an existing user.
/// 2. An `Authorization: Bearer <jwt>` header, whose subject must still exist
///    (a deleted account loses access even with an unexpired token).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already resolved by the auth middleware for this request.
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let dev_id = parts
                .headers
                .get(DEV_USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<i64>().ok());
            if let Some(user_id) = dev_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(user.into());
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        let user_id = decode_token(&config, token.trim())?;

        let user = repo
            .get_user(user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(user.into())
    }
}

/// MaybeAuthUser
///
/// Optional identity for public pages that render differently for a logged-in
/// visitor (e.g. the `following` flag on profiles). Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(
            AuthUser::from_request_parts(parts, state).await.ok(),
        ))
    }
}
