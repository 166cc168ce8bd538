use super::helper;
use crate::auth::{AdminUser, CurrentUser};
use crate::errors::AppError;
use crate::model::assignment::{
    ModuleStudent, NewTeacherModuleAssignment, TeacherModuleAssignment, TeacherModuleView,
};
use crate::model::user::Role;
use crate::payloads::assignment::AssignTeacherPayload;
use crate::response::ApiResponse;
use crate::schema::{
    groupes::dsl as groupes_dsl, modules::dsl as modules_dsl, user_modules::dsl as um_dsl,
    users::dsl as users_dsl,
};
use axum::Json;
use axum::extract::{Path, State};
use deadpool_diesel::postgres::Pool;
use diesel::PgConnection;
use diesel::dsl::exists;
use diesel::prelude::*;
use tracing::{debug, info, instrument, warn};

/// Assigns a teacher to teach a module for a group.
///
/// Request Body: `AssignTeacherPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `TeacherModuleAssignment`: the new assignment (201 Created).
/// * `403 Forbidden`: If the caller is not an admin, or the user is not an enseignant.
/// * `404 Not Found`: If the user, module or group does not exist.
/// * `409 Conflict`: If the (teacher, module, group) triple already exists.
#[instrument(skip(pool, _admin, payload))]
pub async fn assign_teacher(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<AssignTeacherPayload>,
) -> Result<ApiResponse<TeacherModuleAssignment>, AppError> {
    info!(
        "Attempting to assign teacher {} to module {} for group {}",
        payload.user_id, payload.module_id, payload.groupe_id
    );
    debug!("Assign teacher payload: {:?}", payload);

    let (user_id, module_id, groupe_id) = (payload.user_id, payload.module_id, payload.groupe_id);
    let new_row = NewTeacherModuleAssignment {
        user_id,
        module_id,
        groupe_id,
        informations_supplementaires: helper::extra_info(payload.informations_supplementaires),
    };

    let assignment = helper::run_transaction(&pool, move |conn| {
        helper::ensure_user_has_role(conn, user_id, Role::Enseignant)?;
        helper::ensure_module_exists(conn, module_id)?;
        helper::ensure_group_exists(conn, groupe_id)?;

        let duplicate = diesel::select(exists(
            um_dsl::user_modules
                .filter(um_dsl::user_id.eq(user_id))
                .filter(um_dsl::module_id.eq(module_id))
                .filter(um_dsl::groupe_id.eq(groupe_id)),
        ))
        .get_result::<bool>(conn)?;
        if duplicate {
            warn!(
                "Teacher {} already assigned to module {} for group {}",
                user_id, module_id, groupe_id
            );
            return Err(AppError::Conflict(format!(
                "Teacher {} is already assigned to module {} for group {}.",
                user_id, module_id, groupe_id
            )));
        }

        Ok(diesel::insert_into(um_dsl::user_modules)
            .values(&new_row)
            .returning(TeacherModuleAssignment::as_returning())
            .get_result::<TeacherModuleAssignment>(conn)?)
    })
    .await?;

    info!(
        "Successfully created teacher assignment {} ({} / {} / {})",
        assignment.id, user_id, module_id, groupe_id
    );
    Ok(ApiResponse::created(assignment))
}

#[derive(Debug, Clone, Copy)]
enum ViewFilter {
    All,
    Teacher(i64),
    Module(i64),
    Group(i64),
}

fn load_views(conn: &mut PgConnection, filter: ViewFilter) -> QueryResult<Vec<TeacherModuleView>> {
    let mut query = um_dsl::user_modules
        .inner_join(users_dsl::users)
        .inner_join(modules_dsl::modules)
        .inner_join(groupes_dsl::groupes)
        .select((
            um_dsl::id,
            um_dsl::user_id,
            um_dsl::module_id,
            um_dsl::groupe_id,
            um_dsl::informations_supplementaires,
            um_dsl::created_at,
            users_dsl::nom,
            modules_dsl::nom,
            groupes_dsl::nom,
        ))
        .order((modules_dsl::nom.asc(), groupes_dsl::nom.asc(), users_dsl::nom.asc()))
        .into_boxed();

    query = match filter {
        ViewFilter::All => query,
        ViewFilter::Teacher(id) => query.filter(um_dsl::user_id.eq(id)),
        ViewFilter::Module(id) => query.filter(um_dsl::module_id.eq(id)),
        ViewFilter::Group(id) => query.filter(um_dsl::groupe_id.eq(id)),
    };
    query.load::<TeacherModuleView>(conn)
}

#[instrument(skip(pool, _user))]
pub async fn list_teacher_modules(
    State(pool): State<Pool>,
    _user: CurrentUser,
) -> Result<ApiResponse<Vec<TeacherModuleView>>, AppError> {
    info!("Fetching all teacher assignments");
    let rows = helper::run_query(&pool, |conn| load_views(conn, ViewFilter::All)).await?;
    info!("Successfully fetched {} teacher assignments", rows.len());
    Ok(ApiResponse::ok(rows))
}

/// Module/group pairs a teacher is assigned to.
#[instrument(skip(pool, _user))]
pub async fn list_by_teacher(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(teacher_id): Path<i64>,
) -> Result<ApiResponse<Vec<TeacherModuleView>>, AppError> {
    info!("Fetching assignments of teacher {}", teacher_id);
    let rows = helper::run_transaction(&pool, move |conn| {
        helper::ensure_user_exists(conn, teacher_id)?;
        Ok(load_views(conn, ViewFilter::Teacher(teacher_id))?)
    })
    .await?;
    info!("Teacher {} has {} assignments", teacher_id, rows.len());
    Ok(ApiResponse::ok(rows))
}

#[instrument(skip(pool, _user))]
pub async fn list_by_module(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(module_id): Path<i64>,
) -> Result<ApiResponse<Vec<TeacherModuleView>>, AppError> {
    info!("Fetching teacher assignments of module {}", module_id);
    let rows = helper::run_transaction(&pool, move |conn| {
        helper::ensure_module_exists(conn, module_id)?;
        Ok(load_views(conn, ViewFilter::Module(module_id))?)
    })
    .await?;
    Ok(ApiResponse::ok(rows))
}

#[instrument(skip(pool, _user))]
pub async fn list_by_group(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(groupe_id): Path<i64>,
) -> Result<ApiResponse<Vec<TeacherModuleView>>, AppError> {
    info!("Fetching teacher assignments of group {}", groupe_id);
    let rows = helper::run_transaction(&pool, move |conn| {
        helper::ensure_group_exists(conn, groupe_id)?;
        Ok(load_views(conn, ViewFilter::Group(groupe_id))?)
    })
    .await?;
    Ok(ApiResponse::ok(rows))
}

/// Trainees entitled to a module: members of any group the module is taught to.
/// Each trainee appears once even when reachable through several groups.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<ModuleStudent>` ordered by name (200 OK).
/// * `404 Not Found`: If the module does not exist.
#[instrument(skip(pool, _user))]
pub async fn list_students_by_module(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(module_id): Path<i64>,
) -> Result<ApiResponse<Vec<ModuleStudent>>, AppError> {
    info!("Fetching trainees of module {}", module_id);
    let students = helper::run_transaction(&pool, move |conn| {
        helper::ensure_module_exists(conn, module_id)?;
        Ok(helper::students_for_module(conn, module_id)?)
    })
    .await?;
    info!("Module {} has {} trainees", module_id, students.len());
    Ok(ApiResponse::ok(students))
}

#[instrument(skip(pool, _admin))]
pub async fn remove_teacher_module(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(assignment_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Attempting to remove teacher assignment {}", assignment_id);

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::delete(um_dsl::user_modules.find(assignment_id)).execute(conn)
    })
    .await?;

    match rows_affected {
        0 => {
            warn!("Teacher assignment {} not found", assignment_id);
            Err(AppError::NotFound(format!(
                "Assignment with ID {} not found.",
                assignment_id
            )))
        }
        _ => {
            info!("Successfully removed teacher assignment {}", assignment_id);
            Ok(ApiResponse::ok(true))
        }
    }
}

/// Removes the assignment addressed by its (teacher, module, group) triple.
#[instrument(skip(pool, _admin))]
pub async fn remove_teacher_from_module_group(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path((user_id, module_id, groupe_id)): Path<(i64, i64, i64)>,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Attempting to remove teacher {} from module {} for group {}",
        user_id, module_id, groupe_id
    );

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::delete(
            um_dsl::user_modules
                .filter(um_dsl::user_id.eq(user_id))
                .filter(um_dsl::module_id.eq(module_id))
                .filter(um_dsl::groupe_id.eq(groupe_id)),
        )
        .execute(conn)
    })
    .await?;

    match rows_affected {
        0 => {
            warn!(
                "Teacher {} is not assigned to module {} for group {}",
                user_id, module_id, groupe_id
            );
            Err(AppError::NotFound(format!(
                "Teacher {} is not assigned to module {} for group {}.",
                user_id, module_id, groupe_id
            )))
        }
        _ => {
            info!(
                "Successfully removed teacher {} from module {} for group {}",
                user_id, module_id, groupe_id
            );
            Ok(ApiResponse::ok(true))
        }
    }
}
