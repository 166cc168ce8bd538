use crate::auth::TokenKeys;
use crate::blob::{BlobStore, CloudinaryConfig, CloudinaryStore, LocalStore};
use crate::cli::{Args, BlobBackend};
use crate::state::{AppState, AssignmentPolicy};
use anyhow::{Context, anyhow};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use deadpool_diesel::Runtime;
use deadpool_diesel::postgres::{Manager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod auth;
pub mod blob;
pub mod cli;
pub mod errors;
pub mod model;
pub mod payloads;
pub mod response;
pub mod schema;
pub mod state;

mod api;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Request body limit used when no explicit one is configured.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 20 * 1024 * 1024;

pub async fn init_router(args: &Args) -> anyhow::Result<Router> {
    info!("Initializing database pool...");
    let pool = init_pool(&args.connection_str, args.db_pool_max_size)
        .context("Failed to initialize database pool")?;

    info!("Preparing database...");
    prepare_database(&pool, args.run_migrations)
        .await
        .context("Failed to prepare database")?;

    info!("Initializing blob storage ({:?})...", args.blob_backend);
    let blobs = init_blob_store(args).context("Failed to initialize blob storage")?;

    let policy = AssignmentPolicy {
        trainee_groups: args.trainee_group_policy,
        open_trainee_enrollment: args.open_trainee_enrollment,
    };
    if policy.open_trainee_enrollment {
        warn!("OPEN_TRAINEE_ENROLLMENT is on: /api/groupes/assigner-stagiaire accepts unauthenticated calls");
    }

    let state = AppState {
        pool,
        tokens: Arc::new(TokenKeys::new(&args.jwt_secret, args.jwt_expiry_hours)),
        blobs,
        policy,
    };

    info!("Initializing router...");
    let mut router = init_router_internal(state, args.max_upload_mb * 1024 * 1024);
    let served_path = args.blob_public_base_url.trim_end_matches('/');
    if args.blob_backend == BlobBackend::Local && served_path.starts_with('/') && served_path.len() > 1 {
        info!(
            "Serving {} under {}",
            args.blob_local_dir.display(),
            served_path
        );
        router = router.nest_service(served_path, ServeDir::new(&args.blob_local_dir));
    }

    Ok(router.layer(TraceLayer::new_for_http()))
}

pub fn init_test_router(state: AppState) -> Router {
    init_router_internal(state, DEFAULT_BODY_LIMIT_BYTES)
}

/// Applies pending migrations (when asked to) and seeds the role table.
pub async fn prepare_database(pool: &Pool, run_migrations: bool) -> anyhow::Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get a database connection")?;

    conn.interact(move |conn| -> anyhow::Result<()> {
        if run_migrations {
            let applied = conn
                .run_pending_migrations(MIGRATIONS)
                .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;
            info!("Applied {} pending migrations", applied.len());
        }
        api::helper::seed_roles(conn).context("Failed to seed roles")?;
        Ok(())
    })
    .await
    .map_err(|e| anyhow!("Database interaction failed: {:?}", e))?
}

pub fn init_pool(conn_str: &str, max_size: u32) -> anyhow::Result<Pool> {
    let manager = Manager::new(conn_str, Runtime::Tokio1);
    let pool = Pool::builder(manager).max_size(max_size as usize).build()?;
    Ok(pool)
}

fn init_blob_store(args: &Args) -> anyhow::Result<Arc<dyn BlobStore>> {
    match args.blob_backend {
        BlobBackend::Local => {
            std::fs::create_dir_all(&args.blob_local_dir).with_context(|| {
                format!(
                    "Failed to create upload directory {}",
                    args.blob_local_dir.display()
                )
            })?;
            Ok(Arc::new(LocalStore::new(
                args.blob_local_dir.clone(),
                args.blob_public_base_url.trim_end_matches('/'),
            )))
        }
        BlobBackend::Cloudinary => {
            let config = CloudinaryConfig {
                base_url: args.cloudinary_base_url.clone(),
                cloud_name: args
                    .cloudinary_cloud_name
                    .clone()
                    .context("CLOUDINARY_CLOUD_NAME is required for the cloudinary backend")?,
                api_key: args
                    .cloudinary_api_key
                    .clone()
                    .context("CLOUDINARY_API_KEY is required for the cloudinary backend")?,
                api_secret: args
                    .cloudinary_api_secret
                    .clone()
                    .context("CLOUDINARY_API_SECRET is required for the cloudinary backend")?,
                folder: args.cloudinary_folder.clone(),
            };
            Ok(Arc::new(CloudinaryStore::new(config)))
        }
    }
}

fn init_router_internal(state: AppState, body_limit: usize) -> Router {
    let open_enrollment = state.policy.open_trainee_enrollment;

    let api_routes = Router::new()
        .nest("/auth", auth_routes())
        .nest("/groupes", group_routes(open_enrollment))
        .nest("/modules", module_routes())
        .nest("/utilisateurs", user_routes())
        .nest("/utilisateur-modules", teacher_module_routes())
        .nest("/utilisateur-groupes", trainee_group_routes())
        .nest("/notes", note_routes())
        .nest("/cours", course_routes())
        .nest("/profil", profile_routes())
        .nest("/notifications", notification_routes())
        .route("/dashboard", get(api::dashboard::get_dashboard));

    Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        // public routes go here
        .route("/signup", post(api::auth::signup))
        .route("/signin", post(api::auth::signin))
        // protected routes go here
        .route("/me", get(api::auth::me))
}

fn group_routes(open_enrollment: bool) -> Router<AppState> {
    let assign = if open_enrollment {
        post(api::trainee_groups::assign_trainee_unauthenticated)
    } else {
        post(api::trainee_groups::assign_trainee)
    };

    Router::new()
        .route(
            "/",
            get(api::groups::list_groups).post(api::groups::create_group),
        )
        .route("/assigner-stagiaire", assign)
        .route(
            "/{id}",
            get(api::groups::get_group)
                .put(api::groups::update_group)
                .delete(api::groups::delete_group),
        )
}

fn module_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(api::modules::list_modules).post(api::modules::create_module),
        )
        .route("/assign", post(api::teacher_modules::assign_teacher))
        .route(
            "/{id}",
            get(api::modules::get_module)
                .put(api::modules::update_module)
                .delete(api::modules::delete_module),
        )
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route("/role/{role}", get(api::users::list_users_by_role))
        .route(
            "/{id}",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::delete_user),
        )
}

fn teacher_module_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(api::teacher_modules::list_teacher_modules)
                .post(api::teacher_modules::assign_teacher),
        )
        .route(
            "/{id}",
            delete(api::teacher_modules::remove_teacher_module),
        )
        .route(
            "/enseignant/{id}",
            get(api::teacher_modules::list_by_teacher),
        )
        .route("/module/{id}", get(api::teacher_modules::list_by_module))
        .route("/groupe/{id}", get(api::teacher_modules::list_by_group))
        .route(
            "/module/{id}/stagiaires",
            get(api::teacher_modules::list_students_by_module),
        )
        .route(
            "/enseignant/{id}/module/{module_id}/groupe/{groupe_id}",
            delete(api::teacher_modules::remove_teacher_from_module_group),
        )
}

fn trainee_group_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(api::trainee_groups::list_trainee_groups)
                .post(api::trainee_groups::assign_trainee),
        )
        .route(
            "/{id}",
            delete(api::trainee_groups::remove_trainee_group),
        )
        .route(
            "/utilisateur/{id}",
            get(api::trainee_groups::list_groups_of_user),
        )
        .route(
            "/groupe/{id}",
            get(api::trainee_groups::list_trainees_of_group),
        )
        .route(
            "/utilisateur/{id}/groupe/{groupe_id}",
            delete(api::trainee_groups::remove_trainee_from_group),
        )
}

fn note_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(api::notes::create_note))
        .route(
            "/{id}",
            put(api::notes::update_note).delete(api::notes::delete_note),
        )
        .route("/stagiaire/{id}", get(api::notes::list_notes_by_trainee))
        .route("/module/{id}", get(api::notes::list_notes_by_module))
}

fn course_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(api::courses::create_course))
        .route("/mes-cours", get(api::courses::list_my_courses))
        .route("/stagiaire", get(api::courses::list_trainee_courses))
        .route("/module/{id}", get(api::courses::list_courses_by_module))
        .route(
            "/{id}",
            get(api::courses::get_course)
                .put(api::courses::update_course)
                .delete(api::courses::delete_course),
        )
        .route("/{id}/files", post(api::courses::add_course_file))
        .route(
            "/files/{file_id}",
            delete(api::courses::delete_course_file),
        )
}

fn profile_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/{user_id}",
            get(api::profiles::get_profile)
                .post(api::profiles::create_profile)
                .put(api::profiles::update_profile)
                .delete(api::profiles::delete_profile),
        )
        .route("/{user_id}/photo", put(api::profiles::upload_photo))
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(api::notifications::list_my_notifications)
                .post(api::notifications::create_notification),
        )
        .route("/unread-count", get(api::notifications::unread_count))
        .route("/read-all", put(api::notifications::mark_all_read))
        .route("/{id}/read", put(api::notifications::mark_read))
        .route(
            "/{id}",
            delete(api::notifications::delete_notification),
        )
}
