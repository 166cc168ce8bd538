use super::helper;
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::model::dashboard::{AdminStats, DashboardResponse, TeacherStats, TraineeStats};
use crate::model::user::Role;
use crate::response::ApiResponse;
use crate::schema::{
    cours::dsl as cours_dsl, groupes::dsl as groupes_dsl, modules::dsl as modules_dsl,
    notes::dsl as notes_dsl, notifications::dsl as notif_dsl, roles::dsl as roles_dsl,
    user_groupes::dsl as ug_dsl, user_modules::dsl as um_dsl, user_roles::dsl as ur_dsl,
};
use axum::extract::State;
use bigdecimal::{BigDecimal, ToPrimitive};
use deadpool_diesel::postgres::Pool;
use diesel::PgConnection;
use diesel::dsl::{avg, count};
use diesel::prelude::*;
use tracing::{debug, info, instrument};

fn role_holders(conn: &mut PgConnection, role: Role) -> QueryResult<i64> {
    ur_dsl::user_roles
        .inner_join(roles_dsl::roles)
        .filter(roles_dsl::nom.eq(role.as_str()))
        .count()
        .get_result::<i64>(conn)
}

fn admin_stats(conn: &mut PgConnection) -> QueryResult<AdminStats> {
    Ok(AdminStats {
        stagiaires: role_holders(conn, Role::Stagiaire)?,
        enseignants: role_holders(conn, Role::Enseignant)?,
        admins: role_holders(conn, Role::Admin)?,
        groupes: groupes_dsl::groupes.count().get_result(conn)?,
        modules: modules_dsl::modules.count().get_result(conn)?,
        cours: cours_dsl::cours.count().get_result(conn)?,
        inscriptions: ug_dsl::user_groupes.count().get_result(conn)?,
        affectations: um_dsl::user_modules.count().get_result(conn)?,
    })
}

fn teacher_stats(conn: &mut PgConnection, teacher_id: i64) -> QueryResult<TeacherStats> {
    let modules = um_dsl::user_modules
        .filter(um_dsl::user_id.eq(teacher_id))
        .select(count(um_dsl::module_id).aggregate_distinct())
        .get_result::<i64>(conn)?;
    let groupes = um_dsl::user_modules
        .filter(um_dsl::user_id.eq(teacher_id))
        .select(count(um_dsl::groupe_id).aggregate_distinct())
        .get_result::<i64>(conn)?;
    let cours = cours_dsl::cours
        .filter(cours_dsl::enseignant_id.eq(teacher_id))
        .count()
        .get_result::<i64>(conn)?;
    let notes_donnees = notes_dsl::notes
        .filter(notes_dsl::enseignant_id.eq(teacher_id))
        .count()
        .get_result::<i64>(conn)?;

    let taught_groups = um_dsl::user_modules
        .filter(um_dsl::user_id.eq(teacher_id))
        .select(um_dsl::groupe_id);
    let stagiaires = ug_dsl::user_groupes
        .filter(ug_dsl::groupe_id.eq_any(taught_groups))
        .select(count(ug_dsl::user_id).aggregate_distinct())
        .get_result::<i64>(conn)?;

    Ok(TeacherStats {
        modules,
        groupes,
        cours,
        notes_donnees,
        stagiaires,
    })
}

fn trainee_stats(conn: &mut PgConnection, trainee_id: i64) -> QueryResult<TraineeStats> {
    let groupes = ug_dsl::user_groupes
        .filter(ug_dsl::user_id.eq(trainee_id))
        .count()
        .get_result::<i64>(conn)?;
    let modules = helper::modules_for_trainee(conn, trainee_id)?.len() as i64;
    let notes = notes_dsl::notes
        .filter(notes_dsl::stagiaire_id.eq(trainee_id))
        .count()
        .get_result::<i64>(conn)?;
    let moyenne = notes_dsl::notes
        .filter(notes_dsl::stagiaire_id.eq(trainee_id))
        .select(avg(notes_dsl::valeur))
        .get_result::<Option<BigDecimal>>(conn)?
        .and_then(|mean| mean.round(2).to_f64());
    let notifications_non_lues = notif_dsl::notifications
        .filter(notif_dsl::user_id.eq(trainee_id))
        .filter(notif_dsl::lu.eq(false))
        .count()
        .get_result::<i64>(conn)?;

    Ok(TraineeStats {
        groupes,
        modules,
        notes,
        moyenne,
        notifications_non_lues,
    })
}

/// Counters for every role the caller holds.
///
/// Returns (wrapped in `ApiResponse`)
/// * `DashboardResponse`: `admin`, `enseignant` and `stagiaire` sections, each present
///   only when the caller holds that role (200 OK).
#[instrument(skip(pool, user))]
pub async fn get_dashboard(
    State(pool): State<Pool>,
    user: CurrentUser,
) -> Result<ApiResponse<DashboardResponse>, AppError> {
    info!("Building dashboard for user {} ({:?})", user.id, user.roles);
    let user_id = user.id;
    let roles = user.roles.clone();

    let dashboard = helper::run_query(&pool, move |conn| {
        let mut dashboard = DashboardResponse::default();
        if roles.contains(&Role::Admin) {
            dashboard.admin = Some(admin_stats(conn)?);
        }
        if roles.contains(&Role::Enseignant) {
            dashboard.enseignant = Some(teacher_stats(conn, user_id)?);
        }
        if roles.contains(&Role::Stagiaire) {
            dashboard.stagiaire = Some(trainee_stats(conn, user_id)?);
        }
        Ok(dashboard)
    })
    .await?;

    debug!("Dashboard for user {}: {:?}", user.id, dashboard);
    Ok(ApiResponse::ok(dashboard))
}
