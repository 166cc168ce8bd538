use super::helper;
use crate::auth::CurrentUser;
use crate::blob::BlobStore;
use crate::errors::AppError;
use crate::model::profile::{NewProfile, Profile, ProfileChangeset};
use crate::model::user::Role;
use crate::payloads::profile::ProfilePayload;
use crate::response::ApiResponse;
use crate::schema::profils::dsl as profils_dsl;
use axum::Json;
use axum::extract::{Multipart, Path, State};
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::PgConnection;
use diesel::prelude::*;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

fn find_profile(conn: &mut PgConnection, user_id: i64) -> QueryResult<Option<Profile>> {
    profils_dsl::profils
        .filter(profils_dsl::user_id.eq(user_id))
        .select(Profile::as_select())
        .first::<Profile>(conn)
        .optional()
}

fn profile_not_found(user_id: i64) -> AppError {
    warn!("Profile of user {} not found", user_id);
    AppError::NotFound(format!("Profile for user {} not found.", user_id))
}

/// Readable by the owner, admins and teachers.
#[instrument(skip(pool, user))]
pub async fn get_profile(
    State(pool): State<Pool>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<Profile>, AppError> {
    if user.id != user_id && !user.has_role(Role::Enseignant) {
        user.require_self_or_admin(user_id)?;
    }

    let profile = helper::run_query(&pool, move |conn| find_profile(conn, user_id)).await?;
    profile
        .map(ApiResponse::ok)
        .ok_or_else(|| profile_not_found(user_id))
}

/// Creates the profile of a user. One profile per user.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Profile` (201 Created).
/// * `403 Forbidden`: Unless the caller is the user or an admin.
/// * `404 Not Found`: If the user does not exist.
/// * `409 Conflict`: If the user already has a profile.
#[instrument(skip(pool, user, payload))]
pub async fn create_profile(
    State(pool): State<Pool>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<ProfilePayload>,
) -> Result<ApiResponse<Profile>, AppError> {
    user.require_self_or_admin(user_id)?;
    info!("Creating profile for user {}", user_id);
    debug!("Create profile payload: {:?}", payload);

    let new_profile = NewProfile {
        user_id,
        specialite: payload.specialite,
        numero_identite: payload.numero_identite,
        informations_supplementaires: helper::extra_info(payload.informations_supplementaires),
        ..Default::default()
    };

    let profile = helper::run_transaction(&pool, move |conn| {
        helper::ensure_user_exists(conn, user_id)?;
        if find_profile(conn, user_id)?.is_some() {
            warn!("User {} already has a profile", user_id);
            return Err(AppError::Conflict(format!(
                "User {} already has a profile.",
                user_id
            )));
        }
        Ok(diesel::insert_into(profils_dsl::profils)
            .values(&new_profile)
            .returning(Profile::as_returning())
            .get_result::<Profile>(conn)?)
    })
    .await?;

    info!("Successfully created profile {} for user {}", profile.id, user_id);
    Ok(ApiResponse::created(profile))
}

#[instrument(skip(pool, user, payload))]
pub async fn update_profile(
    State(pool): State<Pool>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<ProfilePayload>,
) -> Result<ApiResponse<Profile>, AppError> {
    user.require_self_or_admin(user_id)?;
    info!("Updating profile of user {}", user_id);
    debug!("Update profile payload: {:?}", payload);

    let changeset = ProfileChangeset {
        specialite: payload.specialite,
        numero_identite: payload.numero_identite,
        informations_supplementaires: payload.informations_supplementaires,
        updated_at: Some(Utc::now()),
    };

    let profile = helper::run_query(&pool, move |conn| {
        diesel::update(profils_dsl::profils.filter(profils_dsl::user_id.eq(user_id)))
            .set(&changeset)
            .returning(Profile::as_returning())
            .get_result::<Profile>(conn)
            .optional()
    })
    .await?;

    let profile = profile.ok_or_else(|| profile_not_found(user_id))?;
    info!("Successfully updated profile of user {}", user_id);
    Ok(ApiResponse::ok(profile))
}

/// Replaces the profile photo from the first file part of the body. The profile is
/// created when missing; the previous photo is removed from storage afterwards.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Profile`: with the new `photo_url` (200 OK).
/// * `400 Bad Request`: If the body carries no file.
/// * `403 Forbidden`: Unless the caller is the user or an admin.
/// * `404 Not Found`: If the user does not exist.
#[instrument(skip(pool, blobs, user, multipart))]
pub async fn upload_photo(
    State(pool): State<Pool>,
    State(blobs): State<Arc<dyn BlobStore>>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
    multipart: Multipart,
) -> Result<ApiResponse<Profile>, AppError> {
    user.require_self_or_admin(user_id)?;
    info!("Uploading profile photo for user {}", user_id);

    let form = helper::read_multipart(multipart).await?;
    let Some(file) = form.files.into_iter().next() else {
        warn!("No photo supplied for user {}", user_id);
        return Err(AppError::BadRequest("No file uploaded.".to_string()));
    };

    helper::run_transaction(&pool, move |conn| helper::ensure_user_exists(conn, user_id)).await?;

    let stored = blobs.upload(file).await.map_err(|e| {
        error!("Photo upload for user {} failed: {:?}", user_id, e);
        AppError::InternalServerError(e.context("Failed to upload profile photo"))
    })?;
    let new_public_id = stored.public_id.clone();

    let result = helper::run_transaction(&pool, move |conn| {
        let previous = find_profile(conn, user_id)?;
        let now = Utc::now();
        let profile = match &previous {
            Some(_) => diesel::update(profils_dsl::profils.filter(profils_dsl::user_id.eq(user_id)))
                .set((
                    profils_dsl::photo_url.eq(Some(stored.url.clone())),
                    profils_dsl::photo_public_id.eq(Some(stored.public_id.clone())),
                    profils_dsl::updated_at.eq(now),
                ))
                .returning(Profile::as_returning())
                .get_result::<Profile>(conn)?,
            None => diesel::insert_into(profils_dsl::profils)
                .values(&NewProfile {
                    user_id,
                    photo_url: Some(stored.url.clone()),
                    photo_public_id: Some(stored.public_id.clone()),
                    informations_supplementaires: helper::extra_info(None),
                    ..Default::default()
                })
                .returning(Profile::as_returning())
                .get_result::<Profile>(conn)?,
        };
        Ok((profile, previous.and_then(|p| p.photo_public_id)))
    })
    .await;

    match result {
        Ok((profile, old_photo)) => {
            if let Some(old) = old_photo {
                helper::delete_blobs_best_effort(blobs.as_ref(), &[old]).await;
            }
            info!("Successfully updated photo of user {}", user_id);
            Ok(ApiResponse::ok(profile))
        }
        Err(e) => {
            helper::delete_blobs_best_effort(blobs.as_ref(), &[new_public_id]).await;
            Err(e)
        }
    }
}

#[instrument(skip(pool, blobs, user))]
pub async fn delete_profile(
    State(pool): State<Pool>,
    State(blobs): State<Arc<dyn BlobStore>>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    user.require_self_or_admin(user_id)?;
    info!("Deleting profile of user {}", user_id);

    let photo = helper::run_transaction(&pool, move |conn| {
        let profile = find_profile(conn, user_id)?.ok_or_else(|| profile_not_found(user_id))?;
        diesel::delete(profils_dsl::profils.find(profile.id)).execute(conn)?;
        Ok(profile.photo_public_id)
    })
    .await?;

    if let Some(photo) = photo {
        helper::delete_blobs_best_effort(blobs.as_ref(), &[photo]).await;
    }
    info!("Successfully deleted profile of user {}", user_id);
    Ok(ApiResponse::ok(true))
}
