use super::helper;
use crate::auth::{AdminUser, CurrentUser};
use crate::blob::BlobStore;
use crate::errors::AppError;
use crate::model::module::{Module, ModuleChangeset, NewModule};
use crate::payloads::module::{CreateModulePayload, UpdateModulePayload};
use crate::response::ApiResponse;
use crate::schema::{
    cours::dsl as cours_dsl, cours_fichiers::dsl as cf_dsl, modules::dsl as modules_dsl,
};
use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[instrument(skip(pool, _user))]
pub async fn list_modules(
    State(pool): State<Pool>,
    _user: CurrentUser,
) -> Result<ApiResponse<Vec<Module>>, AppError> {
    info!("Fetching all modules");

    let modules = helper::run_query(&pool, |conn| {
        modules_dsl::modules
            .select(Module::as_select())
            .order(modules_dsl::nom.asc())
            .load::<Module>(conn)
    })
    .await?;

    info!("Successfully fetched {} modules", modules.len());
    Ok(ApiResponse::ok(modules))
}

#[instrument(skip(pool, _user))]
pub async fn get_module(
    State(pool): State<Pool>,
    _user: CurrentUser,
    Path(module_id): Path<i64>,
) -> Result<ApiResponse<Module>, AppError> {
    let module = helper::run_query(&pool, move |conn| {
        modules_dsl::modules
            .find(module_id)
            .select(Module::as_select())
            .first::<Module>(conn)
            .optional()
    })
    .await?;

    module.map(ApiResponse::ok).ok_or_else(|| {
        warn!("Module {} not found", module_id);
        AppError::NotFound(format!("Module with ID {} not found.", module_id))
    })
}

/// Creates a module.
///
/// Request Body: `CreateModulePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Module`: the created module (201 Created).
/// * `400 Bad Request`: If `nom` is empty.
/// * `403 Forbidden`: If the caller is not an admin.
#[instrument(skip(pool, _admin, payload))]
pub async fn create_module(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<CreateModulePayload>,
) -> Result<ApiResponse<Module>, AppError> {
    info!("Attempting to create module '{}'", payload.nom);
    debug!("Create module payload: {:?}", payload);

    helper::require_non_empty("nom", &payload.nom)?;
    let new_module = NewModule {
        nom: payload.nom.trim().to_string(),
        informations_supplementaires: helper::extra_info(payload.informations_supplementaires),
    };

    let module = helper::run_query(&pool, move |conn| {
        diesel::insert_into(modules_dsl::modules)
            .values(&new_module)
            .returning(Module::as_returning())
            .get_result::<Module>(conn)
    })
    .await?;

    info!("Successfully created module {} ('{}')", module.id, module.nom);
    Ok(ApiResponse::created(module))
}

#[instrument(skip(pool, _admin, payload))]
pub async fn update_module(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Path(module_id): Path<i64>,
    Json(payload): Json<UpdateModulePayload>,
) -> Result<ApiResponse<Module>, AppError> {
    info!("Attempting to update module {}", module_id);
    debug!("Update module payload: {:?}", payload);

    if let Some(nom) = &payload.nom {
        helper::require_non_empty("nom", nom)?;
    }
    let changeset = ModuleChangeset {
        nom: payload.nom.map(|n| n.trim().to_string()),
        informations_supplementaires: payload.informations_supplementaires,
        updated_at: Some(Utc::now()),
    };

    let module = helper::run_query(&pool, move |conn| {
        diesel::update(modules_dsl::modules.find(module_id))
            .set(&changeset)
            .returning(Module::as_returning())
            .get_result::<Module>(conn)
            .optional()
    })
    .await?;

    match module {
        Some(module) => {
            info!("Successfully updated module {}", module_id);
            Ok(ApiResponse::ok(module))
        }
        None => {
            warn!("Module {} not found, nothing updated", module_id);
            Err(AppError::NotFound(format!(
                "Module with ID {} not found.",
                module_id
            )))
        }
    }
}

/// Deletes a module. Assignments, courses (with their files) and notes cascade;
/// stored course files are removed from blob storage after the row delete.
#[instrument(skip(pool, blobs, _admin))]
pub async fn delete_module(
    State(pool): State<Pool>,
    State(blobs): State<Arc<dyn BlobStore>>,
    AdminUser(_admin): AdminUser,
    Path(module_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Attempting to delete module {}", module_id);

    let (rows_affected, blob_ids) = helper::run_transaction(&pool, move |conn| {
        let blob_ids = cf_dsl::cours_fichiers
            .inner_join(cours_dsl::cours)
            .filter(cours_dsl::module_id.eq(module_id))
            .select(cf_dsl::public_id)
            .load::<String>(conn)?;
        let rows = diesel::delete(modules_dsl::modules.find(module_id)).execute(conn)?;
        Ok((rows, blob_ids))
    })
    .await?;

    if rows_affected == 0 {
        warn!("Module {} not found, nothing deleted", module_id);
        return Err(AppError::NotFound(format!(
            "Module with ID {} not found.",
            module_id
        )));
    }

    helper::delete_blobs_best_effort(blobs.as_ref(), &blob_ids).await;
    info!(
        "Successfully deleted module {} and {} stored files",
        module_id,
        blob_ids.len()
    );
    Ok(ApiResponse::ok(true))
}
