use super::helper;
use crate::auth::{AdminUser, CurrentUser};
use crate::cli::TraineeGroupPolicy;
use crate::errors::AppError;
use crate::model::assignment::{
    NewTraineeGroupAssignment, TraineeGroupAssignment, TraineeGroupView,
};
use crate::model::user::Role;
use crate::payloads::assignment::AssignTraineePayload;
use crate::response::ApiResponse;
use crate::schema::{
    groupes::dsl as groupes_dsl, user_groupes::dsl as ug_dsl, users::dsl as users_dsl,
};
use crate::state::AssignmentPolicy;
use axum::Json;
use axum::extract::{Path, State};
use deadpool_diesel::postgres::Pool;
use diesel::PgConnection;
use diesel::prelude::*;
use tracing::{debug, info, instrument, warn};

/// Enrolls a trainee in a group.
///
/// Checked in one transaction with the trainee and group rows locked:
/// trainee exists (404) and is a stagiaire (403), group exists (404), pair not
/// already present (409), no other group under the `single` policy (409), and
/// group not full (409). The unique constraint on (user_id, groupe_id) backs the
/// duplicate check.
pub(crate) async fn enroll_trainee(
    pool: &Pool,
    policy: AssignmentPolicy,
    payload: AssignTraineePayload,
) -> Result<TraineeGroupAssignment, AppError> {
    let user_id = payload.user_id;
    let groupe_id = payload.groupe_id;
    info!(
        "Attempting to enroll trainee {} in group {}",
        user_id, groupe_id
    );
    debug!("Assign trainee payload: {:?}", payload);

    let new_row = NewTraineeGroupAssignment {
        user_id,
        groupe_id,
        informations_supplementaires: helper::extra_info(payload.informations_supplementaires),
    };

    let assignment = helper::run_transaction(pool, move |conn| {
        lock_user(conn, user_id)?;
        helper::ensure_user_has_role(conn, user_id, Role::Stagiaire)?;

        let capacite = groupes_dsl::groupes
            .find(groupe_id)
            .select(groupes_dsl::capacite)
            .for_update()
            .first::<Option<i32>>(conn)
            .optional()?
            .ok_or_else(|| {
                warn!("Group {} not found", groupe_id);
                AppError::NotFound(format!("Group with ID {} not found.", groupe_id))
            })?;

        let current_groups = ug_dsl::user_groupes
            .filter(ug_dsl::user_id.eq(user_id))
            .select(ug_dsl::groupe_id)
            .load::<i64>(conn)?;
        if current_groups.contains(&groupe_id) {
            warn!(
                "Trainee {} is already enrolled in group {}",
                user_id, groupe_id
            );
            return Err(AppError::Conflict(format!(
                "Trainee {} is already assigned to group {}.",
                user_id, groupe_id
            )));
        }
        if policy.trainee_groups == TraineeGroupPolicy::Single && !current_groups.is_empty() {
            warn!(
                "Trainee {} already belongs to group(s) {:?}; single-group policy",
                user_id, current_groups
            );
            return Err(AppError::Conflict(format!(
                "Trainee {} already belongs to group {}.",
                user_id, current_groups[0]
            )));
        }

        if let Some(capacite) = capacite {
            let effectif = ug_dsl::user_groupes
                .filter(ug_dsl::groupe_id.eq(groupe_id))
                .count()
                .get_result::<i64>(conn)?;
            if effectif >= i64::from(capacite) {
                warn!(
                    "Group {} is full ({} / {})",
                    groupe_id, effectif, capacite
                );
                return Err(AppError::Conflict(format!(
                    "Group {} is full ({} trainees).",
                    groupe_id, capacite
                )));
            }
        }

        Ok(diesel::insert_into(ug_dsl::user_groupes)
            .values(&new_row)
            .returning(TraineeGroupAssignment::as_returning())
            .get_result::<TraineeGroupAssignment>(conn)?)
    })
    .await?;

    info!(
        "Trainee {} enrolled in group {} (assignment {})",
        user_id, groupe_id, assignment.id
    );
    Ok(assignment)
}

fn lock_user(conn: &mut PgConnection, user_id: i64) -> Result<(), AppError> {
    users_dsl::users
        .find(user_id)
        .select(users_dsl::id)
        .for_update()
        .first::<i64>(conn)
        .optional()?
        .map(|_| ())
        .ok_or_else(|| {
            warn!("User {} not found", user_id);
            AppError::NotFound(format!("User with ID {} not found.", user_id))
        })
}

/// Enrolls a trainee in a group. Admin only.
///
/// Request Body: `AssignTraineePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `TraineeGroupAssignment`: the new enrollment (201 Created).
/// * `403 Forbidden`: If the caller is not an admin, or the user is not a stagiaire.
/// * `404 Not Found`: If the user or group does not exist.
/// * `409 Conflict`: If already enrolled, enrolled elsewhere (single policy), or the group is full.
#[instrument(skip(pool, policy, _admin, payload))]
pub async fn assign_trainee(
    State(pool): State<Pool>,
    State(policy): State<AssignmentPolicy>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<AssignTraineePayload>,
) -> Result<ApiResponse<TraineeGroupAssignment>, AppError> {
    let assignment = enroll_trainee(&pool, policy, payload).await?;
    Ok(ApiResponse::created(assignment))
}

/// Same as [`assign_trainee`] without any token check. Only routed when
/// `OPEN_TRAINEE_ENROLLMENT` is enabled.
#[instrument(skip(pool, policy, payload))]
pub async fn assign_trainee_unauthenticated(
    State(pool): State<Pool>,
    State(policy): State<AssignmentPolicy>,
    Json(payload): Json<AssignTraineePayload>,
) -> Result<ApiResponse<TraineeGroupAssignment>, AppError> {
    warn!(
        "Unauthenticated trainee enrollment for user {} in group {} (OPEN_TRAINEE_ENROLLMENT is on)",
        payload.user_id, payload.groupe_id
    );
    let assignment = enroll_trainee(&pool, policy, payload).await?;
    Ok(ApiResponse::created(assignment))
}

fn load_views(
    conn: &mut PgConnection,
    user_filter: Option<i64>,
    group_filter: Option<i64>,
) -> QueryResult<Vec<TraineeGroupView>> {
    let mut query = ug_dsl::user_groupes
        .inner_join(users_dsl::users)
        .inner_join(groupes_dsl::groupes)
        .select((
            ug_dsl::id,
            ug_dsl::user_id,
            ug_dsl::groupe_id,
            ug_dsl::informations_supplementaires,
            ug_dsl::created_at,
            users_dsl::nom,
            users_dsl::email,
            groupes_dsl::nom,
        ))
        .order((groupes_dsl::nom.asc(), users_dsl::nom.asc()))
        .into_boxed();

    if let Some(user_id) = user_filter {
        query = query.filter(ug_dsl::user_id.eq(user_id));
    }
    if let Some(groupe_id) = group_filter {
        query = query.filter(ug_dsl::groupe_id.eq(groupe_id));
    }
    query.load::<TraineeGroupView>(conn)
}

#[instrument(skip(pool, _user))]
pub async fn list_trainee_groups(
    State(pool): State<Pool>,
    _user: CurrentUser,
) -> Result<ApiResponse<Vec<TraineeGroupView>>, AppError> {
    info!("Fetching all trainee enrollments");
    let rows = helper::run_query(&pool, |conn| load_views(conn, None, None)).await?;
    info!("Successfully fetched {} enrollments", rows.len());
    Ok(ApiResponse::ok(rows))
}

/// Groups a user is enrolled in.
#[instrument(skip(pool, _user))]
pub async fn list_groups_of_user(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<ApiResponse<Vec<TraineeGroupView>>, AppError> {
    info!("Fetching enrollments of user {}", user_id);
    let rows = helper::run_transaction(&pool, move |conn| {
        helper::ensure_user_exists(conn, user_id)?;
        Ok(load_views(conn, Some(user_id), None)?)
    })
    .await?;
    info!("User {} has {} enrollments", user_id, rows.len());
    Ok(ApiResponse::ok(rows))
}

/// Trainees enrolled in a group.
#[instrument(skip(pool, _user))]
pub async fn list_trainees_of_group(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(groupe_id): Path<i64>,
) -> Result<ApiResponse<Vec<TraineeGroupView>>, AppError> {
    info!("Fetching enrollments of group {}", groupe_id);
    let rows = helper::run_transaction(&pool, move |conn| {
        helper::ensure_group_exists(conn, groupe_id)?;
        Ok(load_views(conn, None, Some(groupe_id))?)
    })
    .await?;
    info!("Group {} has {} trainees", groupe_id, rows.len());
    Ok(ApiResponse::ok(rows))
}

/// Removes an enrollment by its id.
#[instrument(skip(pool, _admin))]
pub async fn remove_trainee_group(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(assignment_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Attempting to remove enrollment {}", assignment_id);

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::delete(ug_dsl::user_groupes.find(assignment_id)).execute(conn)
    })
    .await?;

    match rows_affected {
        0 => {
            warn!("Enrollment {} not found", assignment_id);
            Err(AppError::NotFound(format!(
                "Assignment with ID {} not found.",
                assignment_id
            )))
        }
        _ => {
            info!("Successfully removed enrollment {}", assignment_id);
            Ok(ApiResponse::ok(true))
        }
    }
}

/// Removes an enrollment by its (user, group) key.
#[instrument(skip(pool, _admin))]
pub async fn remove_trainee_from_group(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path((user_id, groupe_id)): Path<(i64, i64)>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Attempting to remove trainee {} from group {}",
        user_id, groupe_id
    );

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::delete(
            ug_dsl::user_groupes
                .filter(ug_dsl::user_id.eq(user_id))
                .filter(ug_dsl::groupe_id.eq(groupe_id)),
        )
        .execute(conn)
    })
    .await?;

    match rows_affected {
        0 => {
            warn!(
                "Trainee {} is not enrolled in group {}. No record removed.",
                user_id, groupe_id
            );
            Err(AppError::NotFound(format!(
                "Trainee {} is not assigned to group {}.",
                user_id, groupe_id
            )))
        }
        _ => {
            info!(
                "Successfully removed trainee {} from group {}",
                user_id, groupe_id
            );
            Ok(ApiResponse::ok(true))
        }
    }
}
