use super::auth::create_user_with_roles;
use super::helper;
use crate::auth::{AdminUser, CurrentUser, hash_password};
use crate::blob::BlobStore;
use crate::errors::AppError;
use crate::model::user::{Role, User, UserChangeset, UserResponse};
use crate::payloads::auth::{SignupPayload, parse_roles};
use crate::payloads::user::UpdateUserPayload;
use crate::response::ApiResponse;
use crate::schema::{
    cours::dsl as cours_dsl, cours_fichiers::dsl as cf_dsl, profils::dsl as profils_dsl,
    roles::dsl as roles_dsl, user_roles::dsl as ur_dsl, users::dsl as users_dsl,
};
use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

fn to_responses(
    users: Vec<User>,
    mut roles: std::collections::HashMap<i64, std::collections::BTreeSet<Role>>,
) -> Vec<UserResponse> {
    users
        .into_iter()
        .map(|user| {
            let user_roles = roles.remove(&user.id).unwrap_or_default();
            UserResponse::from_user(user, user_roles)
        })
        .collect()
}

/// Lists every user with its roles. Admin only.
#[instrument(skip(pool, _admin))]
pub async fn list_users(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
) -> Result<ApiResponse<Vec<UserResponse>>, AppError> {
    info!("Fetching all users");

    let users = helper::run_query(&pool, |conn| {
        let users = users_dsl::users
            .select(User::as_select())
            .order(users_dsl::id.asc())
            .load::<User>(conn)?;
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        let roles = helper::load_role_sets(conn, &ids)?;
        Ok(to_responses(users, roles))
    })
    .await?;

    info!("Successfully fetched {} users", users.len());
    Ok(ApiResponse::ok(users))
}

/// Lists users holding `role`. Available to admins and teachers (e.g. to pick trainees).
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<UserResponse>` (200 OK).
/// * `400 Bad Request`: If the role name is unknown.
/// * `403 Forbidden`: If the caller is neither admin nor enseignant.
#[instrument(skip(pool, user))]
pub async fn list_users_by_role(
    State(pool): State<Pool>,
    user: CurrentUser,
    Path(role): Path<String>,
) -> Result<ApiResponse<Vec<UserResponse>>, AppError> {
    if !user.has_role(Role::Admin) && !user.has_role(Role::Enseignant) {
        warn!("User {} may not list users by role", user.id);
        return Err(AppError::Forbidden(
            "Require Admin or Enseignant Role!".to_string(),
        ));
    }
    let role = role.parse::<Role>().map_err(AppError::BadRequest)?;
    info!("Fetching users holding role '{}'", role);

    let users = helper::run_query(&pool, move |conn| {
        let holders = ur_dsl::user_roles
            .inner_join(roles_dsl::roles)
            .filter(roles_dsl::nom.eq(role.as_str()))
            .select(ur_dsl::user_id);
        let users = users_dsl::users
            .filter(users_dsl::id.eq_any(holders))
            .select(User::as_select())
            .order(users_dsl::nom.asc())
            .load::<User>(conn)?;
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        let roles = helper::load_role_sets(conn, &ids)?;
        Ok(to_responses(users, roles))
    })
    .await?;

    info!("Found {} users with role '{}'", users.len(), role);
    Ok(ApiResponse::ok(users))
}

/// Fetches one user. Admin only.
#[instrument(skip(pool, _admin))]
pub async fn get_user(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    let found = helper::run_query(&pool, move |conn| {
        let user = users_dsl::users
            .find(user_id)
            .select(User::as_select())
            .first::<User>(conn)
            .optional()?;
        match user {
            Some(user) => {
                let roles = helper::load_role_set(conn, user.id)?.unwrap_or_default();
                Ok(Some(UserResponse::from_user(user, roles)))
            }
            None => Ok(None),
        }
    })
    .await?;

    found.map(ApiResponse::ok).ok_or_else(|| {
        warn!("User {} not found", user_id);
        AppError::NotFound(format!("User with ID {} not found.", user_id))
    })
}

/// Creates a user on behalf of an admin, same rules as sign-up except that `roles` is honoured.
#[instrument(skip(pool, _admin, payload))]
pub async fn create_user(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<SignupPayload>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    info!("Admin creating user with email '{}'", payload.email);
    let user = create_user_with_roles(&pool, payload, true).await?;
    Ok(ApiResponse::created(user))
}

/// Updates name, email, password, extra info and optionally replaces the role set.
///
/// Returns (wrapped in `ApiResponse`)
/// * `UserResponse`: the updated user (200 OK).
/// * `400 Bad Request`: If a provided field is empty or a role is unknown.
/// * `404 Not Found`: If the user does not exist.
/// * `409 Conflict`: If the new email belongs to another user.
#[instrument(skip(pool, _admin, payload))]
pub async fn update_user(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateUserPayload>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    info!("Attempting to update user {}", user_id);

    if let Some(nom) = &payload.nom {
        helper::require_non_empty("nom", nom)?;
    }
    if let Some(email) = &payload.email {
        helper::require_non_empty("email", email)?;
    }
    let roles = match &payload.roles {
        Some(names) if names.is_empty() => {
            return Err(AppError::BadRequest(
                "A user must keep at least one role.".to_string(),
            ));
        }
        Some(names) => Some(parse_roles(names).map_err(AppError::BadRequest)?),
        None => None,
    };
    let password = match &payload.password {
        Some(p) => {
            helper::require_non_empty("password", p)?;
            Some(hash_password(p)?)
        }
        None => None,
    };

    let changeset = UserChangeset {
        nom: payload.nom.map(|n| n.trim().to_string()),
        email: payload.email.map(|e| e.trim().to_lowercase()),
        password,
        informations_supplementaires: payload.informations_supplementaires,
        updated_at: Some(Utc::now()),
    };

    let updated = helper::run_transaction(&pool, move |conn| {
        let user = diesel::update(users_dsl::users.find(user_id))
            .set(&changeset)
            .returning(User::as_returning())
            .get_result::<User>(conn)
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("User with ID {} not found.", user_id)))?;
        if let Some(roles) = &roles {
            helper::replace_roles(conn, user_id, roles)?;
        }
        let role_set = helper::load_role_set(conn, user_id)?.unwrap_or_default();
        Ok(UserResponse::from_user(user, role_set))
    })
    .await?;

    info!("Successfully updated user {}", user_id);
    Ok(ApiResponse::ok(updated))
}

/// Deletes a user. Role rows, assignments, courses, notes, notifications and profile
/// cascade at the database level; stored files of the user's courses and photo are removed first.
#[instrument(skip(pool, blobs, admin))]
pub async fn delete_user(
    State(pool): State<Pool>,
    State(blobs): State<Arc<dyn BlobStore>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Admin {} attempting to delete user {}", admin.id, user_id);
    if admin.id == user_id {
        warn!("Admin {} attempted to delete their own account", admin.id);
        return Err(AppError::BadRequest(
            "You cannot delete your own account.".to_string(),
        ));
    }

    let blob_ids = helper::run_query(&pool, move |conn| {
        let mut ids = cf_dsl::cours_fichiers
            .inner_join(cours_dsl::cours)
            .filter(cours_dsl::enseignant_id.eq(user_id))
            .select(cf_dsl::public_id)
            .load::<String>(conn)?;
        let photo = profils_dsl::profils
            .filter(profils_dsl::user_id.eq(user_id))
            .select(profils_dsl::photo_public_id)
            .first::<Option<String>>(conn)
            .optional()?
            .flatten();
        ids.extend(photo);
        Ok(ids)
    })
    .await?;

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::delete(users_dsl::users.find(user_id)).execute(conn)
    })
    .await?;

    if rows_affected == 0 {
        warn!("User {} not found, nothing deleted", user_id);
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    }

    debug!("Removing {} stored blobs of user {}", blob_ids.len(), user_id);
    helper::delete_blobs_best_effort(blobs.as_ref(), &blob_ids).await;

    info!("Successfully deleted user {}", user_id);
    Ok(ApiResponse::ok(true))
}
