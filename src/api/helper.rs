use crate::blob::{BlobStore, UploadedFile};
use crate::errors::AppError;
use crate::model::assignment::ModuleStudent;
use crate::model::user::{NewRole, NewUserRole, Role, role_set_from_names};
use crate::schema::{
    groupes::dsl as groupes_dsl, modules::dsl as modules_dsl, roles::dsl as roles_dsl,
    user_groupes::dsl as ug_dsl, user_modules::dsl as um_dsl, user_roles::dsl as ur_dsl,
    users::dsl as users_dsl,
};
use axum::extract::Multipart;
use deadpool_diesel::postgres::Pool;
use diesel::PgConnection;
use diesel::dsl::exists;
use diesel::prelude::*;
use serde_json::{Value as JsonValue, json};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, info, warn};

pub(crate) async fn run_query<T, F>(pool: &Pool, query: F) -> Result<T, AppError>
where
    F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool.get().await.map_err(|pool_err| {
        error!(
            "Failed to get DB connection object from pool: {:?}",
            pool_err
        );
        AppError::from(pool_err)
    })?;
    debug!("DB connection object obtained from pool for interaction");

    let res = conn.interact(query).await;

    match res {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(diesel_err)) => {
            debug!("Diesel query failed within interaction: {:?}", diesel_err);
            Err(AppError::from(diesel_err))
        }
        Err(interact_err) => {
            error!("Deadpool interact error: {:?}", interact_err);
            Err(AppError::from(interact_err))
        }
    }
}

/// Runs `work` inside one database transaction; any `Err` rolls the whole unit back.
pub(crate) async fn run_transaction<T, F>(pool: &Pool, work: F) -> Result<T, AppError>
where
    F: FnOnce(&mut PgConnection) -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool.get().await?;
    debug!("DB connection object obtained from pool for transaction");
    conn.interact(move |conn_sync| conn_sync.transaction(work))
        .await?
}

/// Empty `informations_supplementaires` is stored as `{}` rather than NULL.
pub(crate) fn extra_info(value: Option<JsonValue>) -> JsonValue {
    match value {
        None | Some(JsonValue::Null) => json!({}),
        Some(v) => v,
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        warn!("Validation failed: '{}' is empty", field);
        Err(AppError::BadRequest(format!("Field '{}' is required.", field)))
    } else {
        Ok(())
    }
}

/// `None` when the user does not exist, otherwise the set of known roles it holds.
pub(crate) fn load_role_set(
    conn: &mut PgConnection,
    user_id: i64,
) -> QueryResult<Option<BTreeSet<Role>>> {
    let exists_ = diesel::select(exists(users_dsl::users.find(user_id))).get_result::<bool>(conn)?;
    if !exists_ {
        return Ok(None);
    }
    let names = ur_dsl::user_roles
        .inner_join(roles_dsl::roles)
        .filter(ur_dsl::user_id.eq(user_id))
        .select(roles_dsl::nom)
        .load::<String>(conn)?;
    Ok(Some(role_set_from_names(names)))
}

pub(crate) fn load_role_sets(
    conn: &mut PgConnection,
    user_ids: &[i64],
) -> QueryResult<HashMap<i64, BTreeSet<Role>>> {
    let rows = ur_dsl::user_roles
        .inner_join(roles_dsl::roles)
        .filter(ur_dsl::user_id.eq_any(user_ids))
        .select((ur_dsl::user_id, roles_dsl::nom))
        .load::<(i64, String)>(conn)?;

    let mut sets: HashMap<i64, BTreeSet<Role>> =
        user_ids.iter().map(|id| (*id, BTreeSet::new())).collect();
    for (user_id, name) in rows {
        if let Ok(role) = name.parse::<Role>() {
            sets.entry(user_id).or_default().insert(role);
        }
    }
    Ok(sets)
}

/// Inserts any missing rows of the fixed role set. Returns how many were created.
pub fn seed_roles(conn: &mut PgConnection) -> QueryResult<usize> {
    let existing = roles_dsl::roles.count().get_result::<i64>(conn)?;
    if existing > 0 {
        debug!("Role table already holds {} rows, skipping seed", existing);
        return Ok(0);
    }
    let new_roles: Vec<NewRole> = Role::ALL
        .iter()
        .map(|role| NewRole { nom: role.as_str() })
        .collect();
    let inserted = diesel::insert_into(roles_dsl::roles)
        .values(&new_roles)
        .on_conflict(roles_dsl::nom)
        .do_nothing()
        .execute(conn)?;
    info!("Seeded {} roles", inserted);
    Ok(inserted)
}

fn role_id(conn: &mut PgConnection, role: Role) -> Result<i32, AppError> {
    roles_dsl::roles
        .filter(roles_dsl::nom.eq(role.as_str()))
        .select(roles_dsl::id)
        .first::<i32>(conn)
        .optional()?
        .ok_or_else(|| {
            error!("Role '{}' missing from the roles table", role);
            AppError::InternalServerError(anyhow::anyhow!(
                "Role '{}' is not seeded in the database",
                role
            ))
        })
}

/// Replaces every role membership of `user_id` with `roles`.
pub(crate) fn replace_roles(
    conn: &mut PgConnection,
    user_id: i64,
    roles: &[Role],
) -> Result<(), AppError> {
    diesel::delete(ur_dsl::user_roles.filter(ur_dsl::user_id.eq(user_id))).execute(conn)?;

    let mut rows = Vec::with_capacity(roles.len());
    for role in roles {
        rows.push(NewUserRole {
            user_id,
            role_id: role_id(conn, *role)?,
            informations_supplementaires: json!({}),
        });
    }
    diesel::insert_into(ur_dsl::user_roles)
        .values(&rows)
        .execute(conn)?;
    debug!("User {} now holds roles {:?}", user_id, roles);
    Ok(())
}

/// 404 when the user is absent, 403 when it does not currently hold `role`.
pub(crate) fn ensure_user_has_role(
    conn: &mut PgConnection,
    user_id: i64,
    role: Role,
) -> Result<(), AppError> {
    let Some(roles) = load_role_set(conn, user_id)? else {
        warn!("User {} not found", user_id);
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    };
    if !roles.contains(&role) {
        warn!("User {} does not hold role '{}'", user_id, role);
        return Err(AppError::Forbidden(format!(
            "User {} is not a {}.",
            user_id, role
        )));
    }
    Ok(())
}

pub(crate) fn ensure_user_exists(conn: &mut PgConnection, user_id: i64) -> Result<(), AppError> {
    let found = diesel::select(exists(users_dsl::users.find(user_id))).get_result::<bool>(conn)?;
    if found {
        Ok(())
    } else {
        warn!("User {} not found", user_id);
        Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )))
    }
}

pub(crate) fn ensure_group_exists(conn: &mut PgConnection, group_id: i64) -> Result<(), AppError> {
    let found =
        diesel::select(exists(groupes_dsl::groupes.find(group_id))).get_result::<bool>(conn)?;
    if found {
        Ok(())
    } else {
        warn!("Group {} not found", group_id);
        Err(AppError::NotFound(format!(
            "Group with ID {} not found.",
            group_id
        )))
    }
}

pub(crate) fn ensure_module_exists(
    conn: &mut PgConnection,
    module_id: i64,
) -> Result<(), AppError> {
    let found =
        diesel::select(exists(modules_dsl::modules.find(module_id))).get_result::<bool>(conn)?;
    if found {
        Ok(())
    } else {
        warn!("Module {} not found", module_id);
        Err(AppError::NotFound(format!(
            "Module with ID {} not found.",
            module_id
        )))
    }
}

pub(crate) fn teacher_teaches_module(
    conn: &mut PgConnection,
    teacher_id: i64,
    module_id: i64,
) -> QueryResult<bool> {
    diesel::select(exists(
        um_dsl::user_modules
            .filter(um_dsl::user_id.eq(teacher_id))
            .filter(um_dsl::module_id.eq(module_id)),
    ))
    .get_result::<bool>(conn)
}

/// 403 unless `teacher_id` has at least one current assignment row for `module_id`.
pub(crate) fn ensure_teacher_assigned(
    conn: &mut PgConnection,
    teacher_id: i64,
    module_id: i64,
) -> Result<(), AppError> {
    if teacher_teaches_module(conn, teacher_id, module_id)? {
        Ok(())
    } else {
        warn!(
            "Teacher {} is not assigned to module {}",
            teacher_id, module_id
        );
        Err(AppError::Forbidden(format!(
            "You are not assigned to module {}.",
            module_id
        )))
    }
}

/// 403 unless `trainee_id` is enrolled in a group the module is taught to.
pub(crate) fn ensure_trainee_on_roster(
    conn: &mut PgConnection,
    trainee_id: i64,
    module_id: i64,
) -> Result<(), AppError> {
    let groups_teaching_module = um_dsl::user_modules
        .filter(um_dsl::module_id.eq(module_id))
        .select(um_dsl::groupe_id);
    let on_roster = diesel::select(exists(
        ug_dsl::user_groupes
            .filter(ug_dsl::user_id.eq(trainee_id))
            .filter(ug_dsl::groupe_id.eq_any(groups_teaching_module)),
    ))
    .get_result::<bool>(conn)?;

    if on_roster {
        Ok(())
    } else {
        warn!(
            "Trainee {} is not on the roster of module {}",
            trainee_id, module_id
        );
        Err(AppError::Forbidden(format!(
            "Trainee {} is not enrolled in module {}.",
            trainee_id, module_id
        )))
    }
}

/// Trainees enrolled in any group that has a teacher assignment for `module_id`.
pub(crate) fn students_for_module(
    conn: &mut PgConnection,
    module_id: i64,
) -> QueryResult<Vec<ModuleStudent>> {
    let groups_teaching_module = um_dsl::user_modules
        .filter(um_dsl::module_id.eq(module_id))
        .select(um_dsl::groupe_id);

    ug_dsl::user_groupes
        .inner_join(users_dsl::users)
        .filter(ug_dsl::groupe_id.eq_any(groups_teaching_module))
        .select((users_dsl::id, users_dsl::nom, users_dsl::email))
        .distinct()
        .order(users_dsl::nom.asc())
        .load::<ModuleStudent>(conn)
}

/// Modules reachable by a trainee through the groups it is enrolled in.
pub(crate) fn modules_for_trainee(
    conn: &mut PgConnection,
    trainee_id: i64,
) -> QueryResult<Vec<i64>> {
    let trainee_groups = ug_dsl::user_groupes
        .filter(ug_dsl::user_id.eq(trainee_id))
        .select(ug_dsl::groupe_id);

    um_dsl::user_modules
        .filter(um_dsl::groupe_id.eq_any(trainee_groups))
        .select(um_dsl::module_id)
        .distinct()
        .load::<i64>(conn)
}

/// Deletes stored blobs, logging failures instead of returning them.
pub(crate) async fn delete_blobs_best_effort(blobs: &dyn BlobStore, public_ids: &[String]) {
    for public_id in public_ids {
        match blobs.delete(public_id).await {
            Ok(()) => debug!("Deleted blob {}", public_id),
            Err(e) => warn!(
                "Failed to delete blob {} (database delete proceeds): {:?}",
                public_id, e
            ),
        }
    }
}

/// Text fields and file parts of a multipart body.
#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn parse_i64(&self, name: &str) -> Result<i64, AppError> {
        let raw = self
            .text(name)
            .ok_or_else(|| AppError::BadRequest(format!("Field '{}' is required.", name)))?;
        raw.trim()
            .parse::<i64>()
            .map_err(|_| AppError::BadRequest(format!("Field '{}' must be an integer.", name)))
    }

    pub fn json(&self, name: &str) -> Result<Option<JsonValue>, AppError> {
        match self.text(name) {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| AppError::BadRequest(format!("Field '{}' is not JSON: {}", name, e))),
        }
    }
}

/// Reads the whole multipart body: parts with a file name become files, the rest text fields.
pub(crate) async fn read_multipart(mut multipart: Multipart) -> Result<MultipartForm, AppError> {
    let mut form = MultipartForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    debug!("Skipping empty file part '{}'", name);
                    continue;
                }
                form.files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            None => {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
    }

    debug!(
        "Multipart body read: {} fields, {} files",
        form.fields.len(),
        form.files.len()
    );
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_null_extra_info_becomes_empty_object() {
        assert_eq!(extra_info(None), json!({}));
        assert_eq!(extra_info(Some(JsonValue::Null)), json!({}));
        assert_eq!(extra_info(Some(json!({"a": 1}))), json!({"a": 1}));
    }

    #[test]
    fn blank_required_field_is_bad_request() {
        assert!(matches!(
            require_non_empty("nom", "   "),
            Err(AppError::BadRequest(_))
        ));
        assert!(require_non_empty("nom", "G1").is_ok());
    }

    #[test]
    fn multipart_form_parses_typed_fields() {
        let mut form = MultipartForm::default();
        form.fields.insert("module_id".into(), " 12 ".into());
        form.fields.insert("bad".into(), "x".into());
        form.fields.insert("info".into(), "{\"k\":true}".into());

        assert_eq!(form.parse_i64("module_id").unwrap(), 12);
        assert!(matches!(form.parse_i64("bad"), Err(AppError::BadRequest(_))));
        assert!(matches!(
            form.parse_i64("missing"),
            Err(AppError::BadRequest(_))
        ));
        assert_eq!(form.json("info").unwrap(), Some(json!({"k": true})));
        assert_eq!(form.json("missing").unwrap(), None);
    }
}
