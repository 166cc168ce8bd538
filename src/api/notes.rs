use super::helper;
use crate::auth::{CurrentUser, TeacherUser};
use crate::errors::AppError;
use crate::model::note::{
    EvaluationKind, MAX_SCORE, MIN_SCORE, NewNote, Note, NoteChangeset, NoteResponse,
};
use crate::model::notification::NewNotification;
use crate::model::user::Role;
use crate::payloads::note::{CreateNotePayload, UpdateNotePayload};
use crate::response::ApiResponse;
use crate::schema::{
    modules::dsl as modules_dsl, notes::dsl as notes_dsl, notifications::dsl as notif_dsl,
    users::dsl as users_dsl,
};
use axum::Json;
use axum::extract::{Path, State};
use bigdecimal::BigDecimal;
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::PgConnection;
use diesel::prelude::*;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

pub(crate) const NOTE_NOTIFICATION_TYPE: &str = "note";

/// Scores are kept with two decimals, inclusive bounds.
fn score_to_decimal(valeur: f64) -> Result<BigDecimal, AppError> {
    if !valeur.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&valeur) {
        warn!("Rejected score {}", valeur);
        return Err(AppError::BadRequest(format!(
            "Field 'valeur' must be between {} and {}.",
            MIN_SCORE, MAX_SCORE
        )));
    }
    BigDecimal::from_str(&format!("{:.2}", valeur))
        .map_err(|e| AppError::BadRequest(format!("Invalid score {}: {}", valeur, e)))
}

/// Attaches module, trainee and teacher names to the notes.
fn with_names(conn: &mut PgConnection, notes: Vec<Note>) -> QueryResult<Vec<NoteResponse>> {
    let module_ids: BTreeSet<i64> = notes.iter().map(|n| n.module_id).collect();
    let user_ids: BTreeSet<i64> = notes
        .iter()
        .flat_map(|n| [n.stagiaire_id, n.enseignant_id])
        .collect();

    let module_names: HashMap<i64, String> = modules_dsl::modules
        .filter(modules_dsl::id.eq_any(module_ids))
        .select((modules_dsl::id, modules_dsl::nom))
        .load::<(i64, String)>(conn)?
        .into_iter()
        .collect();
    let user_names: HashMap<i64, String> = users_dsl::users
        .filter(users_dsl::id.eq_any(user_ids))
        .select((users_dsl::id, users_dsl::nom))
        .load::<(i64, String)>(conn)?
        .into_iter()
        .collect();

    Ok(notes
        .into_iter()
        .map(|note| {
            let module_nom = module_names.get(&note.module_id).cloned();
            let stagiaire_nom = user_names.get(&note.stagiaire_id).cloned();
            let enseignant_nom = user_names.get(&note.enseignant_id).cloned();
            NoteResponse {
                module_nom,
                stagiaire_nom,
                enseignant_nom,
                ..NoteResponse::from_note(note)
            }
        })
        .collect())
}

fn find_note(conn: &mut PgConnection, note_id: i64) -> Result<Note, AppError> {
    notes_dsl::notes
        .find(note_id)
        .select(Note::as_select())
        .first::<Note>(conn)
        .optional()?
        .ok_or_else(|| {
            warn!("Note {} not found", note_id);
            AppError::NotFound(format!("Note with ID {} not found.", note_id))
        })
}

/// Grades a trainee in a module and notifies the trainee.
///
/// Request Body: `CreateNotePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `NoteResponse`: the stored note (201 Created).
/// * `400 Bad Request`: If `valeur` is outside 0..=20.
/// * `403 Forbidden`: If the caller is not assigned to the module, or the target is not a stagiaire
///   enrolled in a group the module is taught to.
/// * `404 Not Found`: If the trainee or module does not exist.
#[instrument(skip(pool, teacher, payload))]
pub async fn create_note(
    State(pool): State<Pool>,
    TeacherUser(teacher): TeacherUser,
    Json(payload): Json<CreateNotePayload>,
) -> Result<ApiResponse<NoteResponse>, AppError> {
    info!(
        "Teacher {} grading trainee {} in module {}",
        teacher.id, payload.stagiaire_id, payload.module_id
    );
    debug!("Create note payload: {:?}", payload);

    let valeur = score_to_decimal(payload.valeur)?;
    let kind = payload.type_evaluation;
    let new_note = NewNote {
        stagiaire_id: payload.stagiaire_id,
        module_id: payload.module_id,
        enseignant_id: teacher.id,
        valeur,
        type_evaluation: kind.as_str().to_string(),
        informations_supplementaires: helper::extra_info(payload.informations_supplementaires),
    };
    let score = payload.valeur;

    let note = helper::run_transaction(&pool, move |conn| {
        helper::ensure_user_has_role(conn, new_note.stagiaire_id, Role::Stagiaire)?;
        helper::ensure_module_exists(conn, new_note.module_id)?;
        helper::ensure_teacher_assigned(conn, teacher.id, new_note.module_id)?;
        helper::ensure_trainee_on_roster(conn, new_note.stagiaire_id, new_note.module_id)?;

        let note = diesel::insert_into(notes_dsl::notes)
            .values(&new_note)
            .returning(Note::as_returning())
            .get_result::<Note>(conn)?;

        let module_nom = modules_dsl::modules
            .find(note.module_id)
            .select(modules_dsl::nom)
            .first::<String>(conn)?;
        let notification = NewNotification {
            user_id: note.stagiaire_id,
            type_: NOTE_NOTIFICATION_TYPE.to_string(),
            titre: format!("Nouvelle note en {}", module_nom),
            message: format!(
                "Vous avez reçu {:.2}/{} ({}) en {}.",
                score,
                MAX_SCORE,
                kind.label(),
                module_nom
            ),
            informations_supplementaires: json!({
                "note_id": note.id,
                "module_id": note.module_id,
            }),
        };
        diesel::insert_into(notif_dsl::notifications)
            .values(&notification)
            .execute(conn)?;
        debug!("Notification queued for trainee {}", note.stagiaire_id);

        Ok(with_names(conn, vec![note])?)
    })
    .await?
    .into_iter()
    .next()
    .ok_or_else(|| AppError::InternalServerError(anyhow::anyhow!("Inserted note vanished")))?;

    info!("Successfully created note {}", note.id);
    Ok(ApiResponse::created(note))
}

/// Updates a note. Allowed for any teacher currently assigned to the note's module.
#[instrument(skip(pool, teacher, payload))]
pub async fn update_note(
    State(pool): State<Pool>,
    TeacherUser(teacher): TeacherUser,
    Path(note_id): Path<i64>,
    Json(payload): Json<UpdateNotePayload>,
) -> Result<ApiResponse<NoteResponse>, AppError> {
    info!("Teacher {} attempting to update note {}", teacher.id, note_id);
    debug!("Update note payload: {:?}", payload);

    let valeur = payload.valeur.map(score_to_decimal).transpose()?;
    let changeset = NoteChangeset {
        valeur,
        type_evaluation: payload
            .type_evaluation
            .map(|kind: EvaluationKind| kind.as_str().to_string()),
        informations_supplementaires: payload.informations_supplementaires,
        updated_at: Some(Utc::now()),
    };

    let note = helper::run_transaction(&pool, move |conn| {
        let existing = find_note(conn, note_id)?;
        helper::ensure_teacher_assigned(conn, teacher.id, existing.module_id)?;

        let note = diesel::update(notes_dsl::notes.find(note_id))
            .set(&changeset)
            .returning(Note::as_returning())
            .get_result::<Note>(conn)?;
        Ok(with_names(conn, vec![note])?)
    })
    .await?
    .into_iter()
    .next()
    .ok_or_else(|| AppError::InternalServerError(anyhow::anyhow!("Updated note vanished")))?;

    info!("Successfully updated note {}", note_id);
    Ok(ApiResponse::ok(note))
}

#[instrument(skip(pool, teacher))]
pub async fn delete_note(
    State(pool): State<Pool>,
    TeacherUser(teacher): TeacherUser,
    Path(note_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Teacher {} attempting to delete note {}", teacher.id, note_id);

    helper::run_transaction(&pool, move |conn| {
        let existing = find_note(conn, note_id)?;
        helper::ensure_teacher_assigned(conn, teacher.id, existing.module_id)?;
        diesel::delete(notes_dsl::notes.find(note_id)).execute(conn)?;
        Ok(())
    })
    .await?;

    info!("Successfully deleted note {}", note_id);
    Ok(ApiResponse::ok(true))
}

/// Notes of one trainee, newest first.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<NoteResponse>` (200 OK).
/// * `403 Forbidden`: Unless the caller is that trainee, an enseignant or an admin.
/// * `404 Not Found`: If the trainee does not exist.
#[instrument(skip(pool, user))]
pub async fn list_notes_by_trainee(
    State(pool): State<Pool>,
    user: CurrentUser,
    Path(trainee_id): Path<i64>,
) -> Result<ApiResponse<Vec<NoteResponse>>, AppError> {
    if user.id != trainee_id && !user.has_role(Role::Enseignant) && !user.has_role(Role::Admin) {
        warn!(
            "User {} may not read the notes of trainee {}",
            user.id, trainee_id
        );
        return Err(AppError::Forbidden(
            "You can only view your own notes.".to_string(),
        ));
    }
    info!("Fetching notes of trainee {}", trainee_id);

    let notes = helper::run_transaction(&pool, move |conn| {
        helper::ensure_user_exists(conn, trainee_id)?;
        let notes = notes_dsl::notes
            .filter(notes_dsl::stagiaire_id.eq(trainee_id))
            .select(Note::as_select())
            .order((notes_dsl::created_at.desc(), notes_dsl::id.desc()))
            .load::<Note>(conn)?;
        Ok(with_names(conn, notes)?)
    })
    .await?;

    info!("Trainee {} has {} notes", trainee_id, notes.len());
    Ok(ApiResponse::ok(notes))
}

#[instrument(skip(pool, _user))]
pub async fn list_notes_by_module(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(module_id): Path<i64>,
) -> Result<ApiResponse<Vec<NoteResponse>>, AppError> {
    info!("Fetching notes of module {}", module_id);

    let notes = helper::run_transaction(&pool, move |conn| {
        helper::ensure_module_exists(conn, module_id)?;
        let notes = notes_dsl::notes
            .filter(notes_dsl::module_id.eq(module_id))
            .select(Note::as_select())
            .order((notes_dsl::created_at.desc(), notes_dsl::id.desc()))
            .load::<Note>(conn)?;
        Ok(with_names(conn, notes)?)
    })
    .await?;

    info!("Module {} has {} notes", module_id, notes.len());
    Ok(ApiResponse::ok(notes))
}
