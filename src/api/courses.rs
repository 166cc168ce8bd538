use super::helper;
use crate::auth::{CurrentUser, TeacherUser};
use crate::blob::{BlobStore, StoredBlob, UploadedFile};
use crate::errors::AppError;
use crate::model::course::{
    Course, CourseChangeset, CourseFile, CourseResponse, NewCourse, NewCourseFile,
};
use crate::payloads::course::UpdateCoursePayload;
use crate::response::ApiResponse;
use crate::schema::{
    cours::dsl as cours_dsl, cours_fichiers::dsl as cf_dsl, modules::dsl as modules_dsl,
};
use axum::Json;
use axum::extract::{Multipart, Path, State};
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::PgConnection;
use diesel::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// A file already pushed to blob storage, waiting for its database row.
struct Uploaded {
    blob: StoredBlob,
    nom: String,
    type_fichier: String,
}

impl Uploaded {
    fn into_row(self, cours_id: i64) -> NewCourseFile {
        NewCourseFile {
            cours_id,
            url: self.blob.url,
            public_id: self.blob.public_id,
            type_fichier: self.type_fichier,
            nom: self.nom,
        }
    }
}

fn public_ids(uploaded: &[Uploaded]) -> Vec<String> {
    uploaded.iter().map(|u| u.blob.public_id.clone()).collect()
}

/// Uploads every file; on the first failure the ones already stored are removed again.
async fn upload_all(
    blobs: &dyn BlobStore,
    files: Vec<UploadedFile>,
) -> Result<Vec<Uploaded>, AppError> {
    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        let nom = file.file_name.clone();
        let type_fichier = file.content_type.clone();
        match blobs.upload(file).await {
            Ok(blob) => {
                debug!("Uploaded '{}' as {}", nom, blob.public_id);
                uploaded.push(Uploaded {
                    blob,
                    nom,
                    type_fichier,
                });
            }
            Err(e) => {
                error!("Upload of '{}' failed: {:?}", nom, e);
                helper::delete_blobs_best_effort(blobs, &public_ids(&uploaded)).await;
                return Err(AppError::InternalServerError(
                    e.context(format!("Failed to upload file '{}'", nom)),
                ));
            }
        }
    }
    Ok(uploaded)
}

fn find_course(conn: &mut PgConnection, course_id: i64) -> Result<Course, AppError> {
    cours_dsl::cours
        .find(course_id)
        .select(Course::as_select())
        .first::<Course>(conn)
        .optional()?
        .ok_or_else(|| {
            warn!("Course {} not found", course_id);
            AppError::NotFound(format!("Course with ID {} not found.", course_id))
        })
}

fn ensure_owner(course: &Course, teacher_id: i64) -> Result<(), AppError> {
    if course.enseignant_id == teacher_id {
        Ok(())
    } else {
        warn!(
            "Teacher {} does not own course {} (owner {})",
            teacher_id, course.id, course.enseignant_id
        );
        Err(AppError::Forbidden(
            "You can only modify your own courses.".to_string(),
        ))
    }
}

/// Courses with their module name and files, keeping the input order.
fn with_files(conn: &mut PgConnection, courses: Vec<Course>) -> QueryResult<Vec<CourseResponse>> {
    let files = CourseFile::belonging_to(&courses)
        .select(CourseFile::as_select())
        .order(cf_dsl::id.asc())
        .load::<CourseFile>(conn)?
        .grouped_by(&courses);

    let module_ids: Vec<i64> = courses.iter().map(|c| c.module_id).collect();
    let module_names: HashMap<i64, String> = modules_dsl::modules
        .filter(modules_dsl::id.eq_any(module_ids))
        .select((modules_dsl::id, modules_dsl::nom))
        .load::<(i64, String)>(conn)?
        .into_iter()
        .collect();

    Ok(courses
        .into_iter()
        .zip(files)
        .map(|(course, fichiers)| CourseResponse {
            module_nom: module_names.get(&course.module_id).cloned(),
            course,
            fichiers,
        })
        .collect())
}

fn single_response(
    conn: &mut PgConnection,
    course: Course,
) -> Result<CourseResponse, AppError> {
    with_files(conn, vec![course])?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::InternalServerError(anyhow::anyhow!("Course row vanished")))
}

/// Creates a course for a module the caller teaches. Multipart fields:
/// `module_id`, `titre`, optional `description`, `informations_supplementaires`
/// (JSON text) and any number of file parts.
///
/// Returns (wrapped in `ApiResponse`)
/// * `CourseResponse`: the course with its files (201 Created).
/// * `400 Bad Request`: If `titre` is empty or `module_id` is not an integer.
/// * `403 Forbidden`: If the caller is not assigned to the module.
/// * `404 Not Found`: If the module does not exist.
#[instrument(skip(pool, blobs, teacher, multipart))]
pub async fn create_course(
    State(pool): State<Pool>,
    State(blobs): State<Arc<dyn BlobStore>>,
    TeacherUser(teacher): TeacherUser,
    multipart: Multipart,
) -> Result<ApiResponse<CourseResponse>, AppError> {
    let mut form = helper::read_multipart(multipart).await?;
    let files = std::mem::take(&mut form.files);
    let module_id = form.parse_i64("module_id")?;
    let titre = form.text("titre").unwrap_or_default().trim().to_string();
    helper::require_non_empty("titre", &titre)?;
    let description = form.text("description").unwrap_or_default().to_string();
    let informations_supplementaires = helper::extra_info(form.json("informations_supplementaires")?);

    info!(
        "Teacher {} creating course '{}' in module {} with {} files",
        teacher.id,
        titre,
        module_id,
        files.len()
    );

    let teacher_id = teacher.id;
    helper::run_transaction(&pool, move |conn| {
        helper::ensure_module_exists(conn, module_id)?;
        helper::ensure_teacher_assigned(conn, teacher_id, module_id)
    })
    .await?;

    let uploaded = if files.is_empty() {
        Vec::new()
    } else {
        upload_all(blobs.as_ref(), files).await?
    };
    let uploaded_ids = public_ids(&uploaded);

    let new_course = NewCourse {
        module_id,
        enseignant_id: teacher_id,
        titre,
        description,
        informations_supplementaires,
    };

    let result = helper::run_transaction(&pool, move |conn| {
        let course = diesel::insert_into(cours_dsl::cours)
            .values(&new_course)
            .returning(Course::as_returning())
            .get_result::<Course>(conn)?;
        let rows: Vec<NewCourseFile> = uploaded
            .into_iter()
            .map(|u| u.into_row(course.id))
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(cf_dsl::cours_fichiers)
                .values(&rows)
                .execute(conn)?;
        }
        single_response(conn, course)
    })
    .await;

    match result {
        Ok(course) => {
            info!("Successfully created course {}", course.course.id);
            Ok(ApiResponse::created(course))
        }
        Err(e) => {
            warn!(
                "Course insert failed, removing {} uploaded files",
                uploaded_ids.len()
            );
            helper::delete_blobs_best_effort(blobs.as_ref(), &uploaded_ids).await;
            Err(e)
        }
    }
}

/// Attaches one or more files to a course owned by the caller.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<CourseFile>`: the new file rows (201 Created).
/// * `400 Bad Request`: If the body carries no file.
/// * `403 Forbidden`: If the caller does not own the course.
/// * `404 Not Found`: If the course does not exist.
#[instrument(skip(pool, blobs, teacher, multipart))]
pub async fn add_course_file(
    State(pool): State<Pool>,
    State(blobs): State<Arc<dyn BlobStore>>,
    TeacherUser(teacher): TeacherUser,
    Path(course_id): Path<i64>,
    multipart: Multipart,
) -> Result<ApiResponse<Vec<CourseFile>>, AppError> {
    info!("Teacher {} adding files to course {}", teacher.id, course_id);
    let form = helper::read_multipart(multipart).await?;
    if form.files.is_empty() {
        warn!("No file supplied for course {}", course_id);
        return Err(AppError::BadRequest("No file uploaded.".to_string()));
    }

    let teacher_id = teacher.id;
    helper::run_transaction(&pool, move |conn| {
        let course = find_course(conn, course_id)?;
        ensure_owner(&course, teacher_id)
    })
    .await?;

    let uploaded = upload_all(blobs.as_ref(), form.files).await?;
    let uploaded_ids = public_ids(&uploaded);

    let result = helper::run_query(&pool, move |conn| {
        let rows: Vec<NewCourseFile> = uploaded
            .into_iter()
            .map(|u| u.into_row(course_id))
            .collect();
        diesel::insert_into(cf_dsl::cours_fichiers)
            .values(&rows)
            .returning(CourseFile::as_returning())
            .get_results::<CourseFile>(conn)
    })
    .await;

    match result {
        Ok(files) => {
            info!("Added {} files to course {}", files.len(), course_id);
            Ok(ApiResponse::created(files))
        }
        Err(e) => {
            helper::delete_blobs_best_effort(blobs.as_ref(), &uploaded_ids).await;
            Err(e)
        }
    }
}

#[instrument(skip(pool, teacher, payload))]
pub async fn update_course(
    State(pool): State<Pool>,
    TeacherUser(teacher): TeacherUser,
    Path(course_id): Path<i64>,
    Json(payload): Json<UpdateCoursePayload>,
) -> Result<ApiResponse<CourseResponse>, AppError> {
    info!("Teacher {} attempting to update course {}", teacher.id, course_id);
    debug!("Update course payload: {:?}", payload);

    if let Some(titre) = &payload.titre {
        helper::require_non_empty("titre", titre)?;
    }
    let changeset = CourseChangeset {
        titre: payload.titre.map(|t| t.trim().to_string()),
        description: payload.description,
        informations_supplementaires: payload.informations_supplementaires,
        updated_at: Some(Utc::now()),
    };

    let teacher_id = teacher.id;
    let course = helper::run_transaction(&pool, move |conn| {
        let existing = find_course(conn, course_id)?;
        ensure_owner(&existing, teacher_id)?;
        let course = diesel::update(cours_dsl::cours.find(course_id))
            .set(&changeset)
            .returning(Course::as_returning())
            .get_result::<Course>(conn)?;
        single_response(conn, course)
    })
    .await?;

    info!("Successfully updated course {}", course_id);
    Ok(ApiResponse::ok(course))
}

/// Deletes a course owned by the caller together with its files.
#[instrument(skip(pool, blobs, teacher))]
pub async fn delete_course(
    State(pool): State<Pool>,
    State(blobs): State<Arc<dyn BlobStore>>,
    TeacherUser(teacher): TeacherUser,
    Path(course_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Teacher {} attempting to delete course {}", teacher.id, course_id);

    let teacher_id = teacher.id;
    let blob_ids = helper::run_transaction(&pool, move |conn| {
        let existing = find_course(conn, course_id)?;
        ensure_owner(&existing, teacher_id)?;
        let ids = cf_dsl::cours_fichiers
            .filter(cf_dsl::cours_id.eq(course_id))
            .select(cf_dsl::public_id)
            .load::<String>(conn)?;
        diesel::delete(cours_dsl::cours.find(course_id)).execute(conn)?;
        Ok(ids)
    })
    .await?;

    helper::delete_blobs_best_effort(blobs.as_ref(), &blob_ids).await;
    info!(
        "Successfully deleted course {} and {} files",
        course_id,
        blob_ids.len()
    );
    Ok(ApiResponse::ok(true))
}

/// Deletes one file of a course owned by the caller.
#[instrument(skip(pool, blobs, teacher))]
pub async fn delete_course_file(
    State(pool): State<Pool>,
    State(blobs): State<Arc<dyn BlobStore>>,
    TeacherUser(teacher): TeacherUser,
    Path(file_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Teacher {} attempting to delete course file {}", teacher.id, file_id);

    let teacher_id = teacher.id;
    let public_id = helper::run_transaction(&pool, move |conn| {
        let file = cf_dsl::cours_fichiers
            .find(file_id)
            .select(CourseFile::as_select())
            .first::<CourseFile>(conn)
            .optional()?
            .ok_or_else(|| {
                warn!("Course file {} not found", file_id);
                AppError::NotFound(format!("File with ID {} not found.", file_id))
            })?;
        let course = find_course(conn, file.cours_id)?;
        ensure_owner(&course, teacher_id)?;
        diesel::delete(cf_dsl::cours_fichiers.find(file_id)).execute(conn)?;
        Ok(file.public_id)
    })
    .await?;

    helper::delete_blobs_best_effort(blobs.as_ref(), std::slice::from_ref(&public_id)).await;
    info!("Successfully deleted course file {}", file_id);
    Ok(ApiResponse::ok(true))
}

#[instrument(skip(pool, _user))]
pub async fn get_course(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(course_id): Path<i64>,
) -> Result<ApiResponse<CourseResponse>, AppError> {
    let course = helper::run_transaction(&pool, move |conn| {
        let course = find_course(conn, course_id)?;
        single_response(conn, course)
    })
    .await?;
    Ok(ApiResponse::ok(course))
}

#[instrument(skip(pool, _user))]
pub async fn list_courses_by_module(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(module_id): Path<i64>,
) -> Result<ApiResponse<Vec<CourseResponse>>, AppError> {
    info!("Fetching courses of module {}", module_id);
    let courses = helper::run_transaction(&pool, move |conn| {
        helper::ensure_module_exists(conn, module_id)?;
        let courses = cours_dsl::cours
            .filter(cours_dsl::module_id.eq(module_id))
            .select(Course::as_select())
            .order(cours_dsl::created_at.desc())
            .load::<Course>(conn)?;
        Ok(with_files(conn, courses)?)
    })
    .await?;
    info!("Module {} has {} courses", module_id, courses.len());
    Ok(ApiResponse::ok(courses))
}

/// Courses created by the calling teacher.
#[instrument(skip(pool, teacher))]
pub async fn list_my_courses(
    State(pool): State<Pool>,
    TeacherUser(teacher): TeacherUser,
) -> Result<ApiResponse<Vec<CourseResponse>>, AppError> {
    info!("Fetching courses of teacher {}", teacher.id);
    let teacher_id = teacher.id;
    let courses = helper::run_query(&pool, move |conn| {
        let courses = cours_dsl::cours
            .filter(cours_dsl::enseignant_id.eq(teacher_id))
            .select(Course::as_select())
            .order(cours_dsl::created_at.desc())
            .load::<Course>(conn)?;
        with_files(conn, courses)
    })
    .await?;
    info!("Teacher {} has {} courses", teacher_id, courses.len());
    Ok(ApiResponse::ok(courses))
}

/// Courses of every module the caller reaches through its groups.
#[instrument(skip(pool, user))]
pub async fn list_trainee_courses(
    State(pool): State<Pool>,
    user: CurrentUser,
) -> Result<ApiResponse<Vec<CourseResponse>>, AppError> {
    info!("Fetching courses available to user {}", user.id);
    let user_id = user.id;
    let courses = helper::run_query(&pool, move |conn| {
        let module_ids = helper::modules_for_trainee(conn, user_id)?;
        let courses = cours_dsl::cours
            .filter(cours_dsl::module_id.eq_any(module_ids))
            .select(Course::as_select())
            .order(cours_dsl::created_at.desc())
            .load::<Course>(conn)?;
        with_files(conn, courses)
    })
    .await?;
    info!("User {} can see {} courses", user_id, courses.len());
    Ok(ApiResponse::ok(courses))
}
