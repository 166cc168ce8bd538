//! Access tokens, password hashing and the request extractors that gate every protected route.

use crate::api::helper;
use crate::errors::AppError;
use crate::model::user::Role;
use crate::state::AppState;
use anyhow::anyhow;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, lifetime_hours: i64) -> Self {
        TokenKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::hours(lifetime_hours),
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| {
            error!("Failed to sign access token for user {}: {:?}", user_id, e);
            AppError::InternalServerError(anyhow!("Failed to sign access token: {}", e))
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidKeyFormat | ErrorKind::Crypto(_) => {
                    error!("Access token verification failed on key material: {:?}", e);
                    AppError::InternalServerError(anyhow!("Token verification error: {}", e))
                }
                _ => {
                    debug!("Rejected access token: {:?}", e);
                    AppError::Unauthorized("Unauthorized!".to_string())
                }
            })
    }
}

pub fn hash_password(plain: &str) -> Result<String, AppError> {
    Ok(bcrypt::hash(plain, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, AppError> {
    Ok(bcrypt::verify(plain, hash)?)
}

/// The authenticated caller: id plus the full role set, never a single "primary" role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub roles: BTreeSet<Role>,
}

impl CurrentUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.has_role(role) {
            Ok(())
        } else {
            warn!("User {} lacks required role '{}'", self.id, role);
            Err(AppError::Forbidden(format!("Require {} Role!", role)))
        }
    }

    pub fn require_self_or_admin(&self, user_id: i64) -> Result<(), AppError> {
        if self.id == user_id || self.has_role(Role::Admin) {
            Ok(())
        } else {
            warn!(
                "User {} attempted to act on resources of user {}",
                self.id, user_id
            );
            Err(AppError::Forbidden(
                "You can only access your own resources.".to_string(),
            ))
        }
    }
}

fn token_from_parts(parts: &Parts) -> Option<&str> {
    if let Some(value) = parts.headers.get(ACCESS_TOKEN_HEADER) {
        return value.to_str().ok().map(str::trim).filter(|t| !t.is_empty());
    }
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let Some(token) = token_from_parts(parts) else {
            debug!("Request to {} without access token", parts.uri.path());
            return Err(AppError::Unauthorized("No token provided!".to_string()));
        };
        let claims = state.tokens.verify(token)?;
        let user_id = claims.sub;

        let roles = helper::run_query(&state.pool, move |conn| {
            helper::load_role_set(conn, user_id)
        })
        .await?;

        match roles {
            Some(roles) => Ok(CurrentUser { id: user_id, roles }),
            None => {
                warn!("Access token refers to missing user {}", user_id);
                Err(AppError::NotFound("User Not found.".to_string()))
            }
        }
    }
}

/// Caller holding the `admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

/// Caller holding the `enseignant` role.
#[derive(Debug, Clone)]
pub struct TeacherUser(pub CurrentUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        user.require(Role::Admin)?;
        Ok(AdminUser(user))
    }
}

impl<S> FromRequestParts<S> for TeacherUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        user.require(Role::Enseignant)?;
        Ok(TeacherUser(user))
    }
}
