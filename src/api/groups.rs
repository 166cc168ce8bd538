use super::helper;
use crate::auth::{AdminUser, CurrentUser};
use crate::errors::AppError;
use crate::model::group::{Group, GroupChangeset, GroupResponse, NewGroup};
use crate::payloads::group::{CreateGroupPayload, UpdateGroupPayload};
use crate::response::ApiResponse;
use crate::schema::{groupes::dsl as groupes_dsl, user_groupes::dsl as ug_dsl};
use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::dsl::count_star;
use diesel::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

fn validate_capacity(capacite: Option<i32>) -> Result<(), AppError> {
    match capacite {
        Some(c) if c <= 0 => {
            warn!("Rejected group capacity {}", c);
            Err(AppError::BadRequest(
                "Field 'capacite' must be greater than 0.".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

/// Lists every group with its current enrollment count.
#[instrument(skip(pool, _user))]
pub async fn list_groups(
    State(pool): State<Pool>,
    _user: CurrentUser,
) -> Result<ApiResponse<Vec<GroupResponse>>, AppError> {
    info!("Fetching all groups");

    let groups = helper::run_query(&pool, |conn| {
        let groups = groupes_dsl::groupes
            .select(Group::as_select())
            .order(groupes_dsl::nom.asc())
            .load::<Group>(conn)?;
        let counts: HashMap<i64, i64> = ug_dsl::user_groupes
            .group_by(ug_dsl::groupe_id)
            .select((ug_dsl::groupe_id, count_star()))
            .load::<(i64, i64)>(conn)?
            .into_iter()
            .collect();
        Ok(groups
            .into_iter()
            .map(|group| {
                let effectif = counts.get(&group.id).copied().unwrap_or(0);
                GroupResponse { group, effectif }
            })
            .collect::<Vec<_>>())
    })
    .await?;

    info!("Successfully fetched {} groups", groups.len());
    Ok(ApiResponse::ok(groups))
}

#[instrument(skip(pool, _user))]
pub async fn get_group(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(group_id): Path<i64>,
) -> Result<ApiResponse<GroupResponse>, AppError> {
    let found = helper::run_query(&pool, move |conn| {
        let group = groupes_dsl::groupes
            .find(group_id)
            .select(Group::as_select())
            .first::<Group>(conn)
            .optional()?;
        match group {
            Some(group) => {
                let effectif = ug_dsl::user_groupes
                    .filter(ug_dsl::groupe_id.eq(group_id))
                    .count()
                    .get_result::<i64>(conn)?;
                Ok(Some(GroupResponse { group, effectif }))
            }
            None => Ok(None),
        }
    })
    .await?;

    found.map(ApiResponse::ok).ok_or_else(|| {
        warn!("Group {} not found", group_id);
        AppError::NotFound(format!("Group with ID {} not found.", group_id))
    })
}

/// Creates a group.
///
/// Request Body: `CreateGroupPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Group`: the created group (201 Created).
/// * `400 Bad Request`: If `nom` is empty or `capacite` is not positive.
/// * `403 Forbidden`: If the caller is not an admin.
#[instrument(skip(pool, _admin, payload))]
pub async fn create_group(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<CreateGroupPayload>,
) -> Result<ApiResponse<Group>, AppError> {
    info!("Attempting to create group '{}'", payload.nom);
    debug!("Create group payload: {:?}", payload);

    helper::require_non_empty("nom", &payload.nom)?;
    validate_capacity(payload.capacite)?;

    let new_group = NewGroup {
        nom: payload.nom.trim().to_string(),
        capacite: payload.capacite,
        statut: payload.statut,
        informations_supplementaires: helper::extra_info(payload.informations_supplementaires),
    };

    let group = helper::run_query(&pool, move |conn| {
        diesel::insert_into(groupes_dsl::groupes)
            .values(&new_group)
            .returning(Group::as_returning())
            .get_result::<Group>(conn)
    })
    .await?;

    info!("Successfully created group {} ('{}')", group.id, group.nom);
    Ok(ApiResponse::created(group))
}

/// Updates a group. Lowering `capacite` below the current enrollment is rejected;
/// an explicit `"capacite": null` makes the group unlimited.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Group`: the updated group (200 OK).
/// * `400 Bad Request`: If a provided field is invalid.
/// * `404 Not Found`: If the group does not exist.
/// * `409 Conflict`: If the new capacity is below the number of enrolled trainees.
#[instrument(skip(pool, _admin, payload))]
pub async fn update_group(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(group_id): Path<i64>,
    Json(payload): Json<UpdateGroupPayload>,
) -> Result<ApiResponse<Group>, AppError> {
    info!("Attempting to update group {}", group_id);
    debug!("Update group payload: {:?}", payload);

    if let Some(nom) = &payload.nom {
        helper::require_non_empty("nom", nom)?;
    }
    validate_capacity(payload.capacite.flatten())?;

    let changeset = GroupChangeset {
        nom: payload.nom.map(|n| n.trim().to_string()),
        capacite: payload.capacite,
        statut: payload.statut,
        informations_supplementaires: payload.informations_supplementaires,
        updated_at: Some(Utc::now()),
    };

    let group = helper::run_transaction(&pool, move |conn| {
        let locked = groupes_dsl::groupes
            .find(group_id)
            .select(groupes_dsl::id)
            .for_update()
            .first::<i64>(conn)
            .optional()?;
        if locked.is_none() {
            return Err(AppError::NotFound(format!(
                "Group with ID {} not found.",
                group_id
            )));
        }

        if let Some(Some(capacite)) = changeset.capacite {
            let effectif = ug_dsl::user_groupes
                .filter(ug_dsl::groupe_id.eq(group_id))
                .count()
                .get_result::<i64>(conn)?;
            if effectif > i64::from(capacite) {
                warn!(
                    "Cannot lower capacity of group {} to {}: {} trainees enrolled",
                    group_id, capacite, effectif
                );
                return Err(AppError::Conflict(format!(
                    "Group {} already has {} trainees, more than capacity {}.",
                    group_id, effectif, capacite
                )));
            }
        }

        Ok(diesel::update(groupes_dsl::groupes.find(group_id))
            .set(&changeset)
            .returning(Group::as_returning())
            .get_result::<Group>(conn)?)
    })
    .await?;

    info!("Successfully updated group {}", group_id);
    Ok(ApiResponse::ok(group))
}

/// Deletes a group. Trainee enrollments and teacher assignments of the group cascade.
#[instrument(skip(pool, _admin))]
pub async fn delete_group(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(group_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Attempting to delete group {}", group_id);

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::delete(groupes_dsl::groupes.find(group_id)).execute(conn)
    })
    .await?;

    match rows_affected {
        0 => {
            warn!("Group {} not found, nothing deleted", group_id);
            Err(AppError::NotFound(format!(
                "Group with ID {} not found.",
                group_id
            )))
        }
        _ => {
            info!("Successfully deleted group {}", group_id);
            Ok(ApiResponse::ok(true))
        }
    }
}
