use super::helper;
use crate::auth::{CurrentUser, TokenKeys, hash_password, verify_password};
use crate::errors::AppError;
use crate::model::user::{NewUser, Role, SigninResponse, User, UserResponse};
use crate::payloads::auth::{SigninPayload, SignupPayload, parse_roles};
use crate::response::ApiResponse;
use crate::schema::users::dsl as users_dsl;
use axum::Json;
use axum::extract::State;
use deadpool_diesel::postgres::Pool;
use diesel::dsl::exists;
use diesel::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Creates a user with its role memberships. Shared by `/auth/signup` and the admin user registry.
///
/// Only the registry passes `allow_roles`; without it the account is always a bare `stagiaire`.
pub(crate) async fn create_user_with_roles(
    pool: &Pool,
    payload: SignupPayload,
    allow_roles: bool,
) -> Result<UserResponse, AppError> {
    helper::require_non_empty("nom", &payload.nom)?;
    helper::require_non_empty("email", &payload.email)?;
    helper::require_non_empty("password", &payload.password)?;
    let roles = if allow_roles {
        parse_roles(&payload.roles).map_err(AppError::BadRequest)?
    } else {
        if !payload.roles.is_empty() {
            warn!(
                "Ignoring roles {:?} requested on public sign-up for '{}'",
                payload.roles, payload.email
            );
        }
        vec![Role::Stagiaire]
    };

    let email = payload.email.trim().to_lowercase();
    let password_hash = hash_password(&payload.password)?;

    let email_taken = helper::run_query(pool, {
        let email = email.clone();
        move |conn| {
            diesel::select(exists(users_dsl::users.filter(users_dsl::email.eq(email))))
                .get_result::<bool>(conn)
        }
    })
    .await?;
    if email_taken {
        warn!("Failed! Email '{}' is already in use", email);
        return Err(AppError::Conflict(
            "Failed! Email is already in use!".to_string(),
        ));
    }

    let new_user = NewUser {
        nom: payload.nom.trim().to_string(),
        email,
        password: password_hash,
        informations_supplementaires: helper::extra_info(payload.informations_supplementaires),
    };

    helper::run_transaction(pool, move |conn| {
        let user = diesel::insert_into(users_dsl::users)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result::<User>(conn)?;
        helper::replace_roles(conn, user.id, &roles)?;
        info!("Created user {} with roles {:?}", user.id, roles);
        Ok(UserResponse::from_user(user, roles.into_iter().collect()))
    })
    .await
}

/// Registers a new account.
///
/// Request Body: `SignupPayload` (`roles` is ignored, the account gets `stagiaire` only)
///
/// Returns (wrapped in `ApiResponse`)
/// * `UserResponse`: the created user (201 Created).
/// * `400 Bad Request`: If a required field is empty.
/// * `409 Conflict`: If the email is already registered.
#[instrument(skip(pool, payload))]
pub async fn signup(
    State(pool): State<Pool>,
    Json(payload): Json<SignupPayload>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    info!("Attempting to sign up user with email '{}'", payload.email);

    let user = create_user_with_roles(&pool, payload, false).await?;
    Ok(ApiResponse::created(user).with_message("User was registered successfully!"))
}

/// Verifies credentials and issues an access token.
///
/// Request Body: `SigninPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `SigninResponse`: user id, roles and `accessToken` (200 OK).
/// * `401 Unauthorized`: If the password is wrong.
/// * `404 Not Found`: If no user has this email.
#[instrument(skip(pool, tokens, payload))]
pub async fn signin(
    State(pool): State<Pool>,
    State(tokens): State<Arc<TokenKeys>>,
    Json(payload): Json<SigninPayload>,
) -> Result<ApiResponse<SigninResponse>, AppError> {
    let email = payload.email.trim().to_lowercase();
    info!("Sign in attempt for '{}'", email);

    let found = helper::run_query(&pool, {
        let email = email.clone();
        move |conn| {
            let user = users_dsl::users
                .filter(users_dsl::email.eq(email))
                .select(User::as_select())
                .first::<User>(conn)
                .optional()?;
            match user {
                Some(user) => {
                    let roles = helper::load_role_set(conn, user.id)?.unwrap_or_default();
                    Ok(Some((user, roles)))
                }
                None => Ok(None),
            }
        }
    })
    .await?;

    let Some((user, roles)) = found else {
        warn!("Sign in failed: no user with email '{}'", email);
        return Err(AppError::NotFound("User Not found.".to_string()));
    };

    if !verify_password(&payload.password, &user.password)? {
        warn!("Sign in failed: wrong password for user {}", user.id);
        return Err(AppError::Unauthorized("Invalid Password!".to_string()));
    }

    let access_token = tokens.issue(user.id)?;
    debug!("Issued access token for user {}", user.id);
    info!("User {} signed in", user.id);

    Ok(ApiResponse::ok(SigninResponse {
        id: user.id,
        nom: user.nom,
        email: user.email,
        roles,
        access_token,
    }))
}

/// Returns the caller's own user record and role set.
#[instrument(skip(pool))]
pub async fn me(
    State(pool): State<Pool>,
    user: CurrentUser,
) -> Result<ApiResponse<UserResponse>, AppError> {
    let user_id = user.id;
    let record = helper::run_query(&pool, move |conn| {
        users_dsl::users
            .find(user_id)
            .select(User::as_select())
            .first::<User>(conn)
    })
    .await?;

    Ok(ApiResponse::ok(UserResponse::from_user(record, user.roles)))
}
