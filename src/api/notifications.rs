use super::helper;
use crate::auth::{AdminUser, CurrentUser};
use crate::errors::AppError;
use crate::model::notification::{NewNotification, Notification, UnreadCountResponse};
use crate::payloads::notification::CreateNotificationPayload;
use crate::response::ApiResponse;
use crate::schema::notifications::dsl as notif_dsl;
use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

/// The caller's notifications, newest first.
#[instrument(skip(pool, user))]
pub async fn list_my_notifications(
    State(pool): State<Pool>,
    user: CurrentUser,
) -> Result<ApiResponse<Vec<Notification>>, AppError> {
    let user_id = user.id;
    info!("Fetching notifications of user {}", user_id);

    let notifications = helper::run_query(&pool, move |conn| {
        notif_dsl::notifications
            .filter(notif_dsl::user_id.eq(user_id))
            .select(Notification::as_select())
            .order((notif_dsl::created_at.desc(), notif_dsl::id.desc()))
            .load::<Notification>(conn)
    })
    .await?;

    info!(
        "User {} has {} notifications",
        user_id,
        notifications.len()
    );
    Ok(ApiResponse::ok(notifications))
}

#[instrument(skip(pool, user))]
pub async fn unread_count(
    State(pool): State<Pool>,
    user: CurrentUser,
) -> Result<ApiResponse<UnreadCountResponse>, AppError> {
    let user_id = user.id;
    let count = helper::run_query(&pool, move |conn| {
        notif_dsl::notifications
            .filter(notif_dsl::user_id.eq(user_id))
            .filter(notif_dsl::lu.eq(false))
            .count()
            .get_result::<i64>(conn)
    })
    .await?;

    debug!("User {} has {} unread notifications", user_id, count);
    Ok(ApiResponse::ok(UnreadCountResponse { count }))
}

/// Marks one of the caller's notifications as read. Someone else's id is reported as not found.
#[instrument(skip(pool, user))]
pub async fn mark_read(
    State(pool): State<Pool>,
    user: CurrentUser,
    Path(notification_id): Path<i64>,
) -> Result<ApiResponse<Notification>, AppError> {
    let user_id = user.id;
    info!(
        "User {} marking notification {} as read",
        user_id, notification_id
    );

    let updated = helper::run_query(&pool, move |conn| {
        diesel::update(
            notif_dsl::notifications
                .filter(notif_dsl::id.eq(notification_id))
                .filter(notif_dsl::user_id.eq(user_id)),
        )
        .set((notif_dsl::lu.eq(true), notif_dsl::updated_at.eq(Utc::now())))
        .returning(Notification::as_returning())
        .get_result::<Notification>(conn)
        .optional()
    })
    .await?;

    updated.map(ApiResponse::ok).ok_or_else(|| {
        warn!(
            "Notification {} not found for user {}",
            notification_id, user_id
        );
        AppError::NotFound(format!(
            "Notification with ID {} not found.",
            notification_id
        ))
    })
}

/// Marks every unread notification of the caller as read. Returns how many changed.
#[instrument(skip(pool, user))]
pub async fn mark_all_read(
    State(pool): State<Pool>,
    user: CurrentUser,
) -> Result<ApiResponse<usize>, AppError> {
    let user_id = user.id;
    let changed = helper::run_query(&pool, move |conn| {
        diesel::update(
            notif_dsl::notifications
                .filter(notif_dsl::user_id.eq(user_id))
                .filter(notif_dsl::lu.eq(false)),
        )
        .set((notif_dsl::lu.eq(true), notif_dsl::updated_at.eq(Utc::now())))
        .execute(conn)
    })
    .await?;

    info!("Marked {} notifications of user {} as read", changed, user_id);
    Ok(ApiResponse::ok(changed))
}

#[instrument(skip(pool, user))]
pub async fn delete_notification(
    State(pool): State<Pool>,
    user: CurrentUser,
    Path(notification_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    let user_id = user.id;
    info!(
        "User {} attempting to delete notification {}",
        user_id, notification_id
    );

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::delete(
            notif_dsl::notifications
                .filter(notif_dsl::id.eq(notification_id))
                .filter(notif_dsl::user_id.eq(user_id)),
        )
        .execute(conn)
    })
    .await?;

    match rows_affected {
        0 => {
            warn!(
                "Notification {} not found for user {}",
                notification_id, user_id
            );
            Err(AppError::NotFound(format!(
                "Notification with ID {} not found.",
                notification_id
            )))
        }
        _ => {
            info!("Successfully deleted notification {}", notification_id);
            Ok(ApiResponse::ok(true))
        }
    }
}

/// Sends a notification to one user. Admin only.
///
/// Request Body: `CreateNotificationPayload` (`type` defaults to `info`)
///
/// Returns (wrapped in `ApiResponse`)
/// * `Notification`: the stored notification (201 Created).
/// * `400 Bad Request`: If `titre` or `message` is empty.
/// * `404 Not Found`: If the recipient does not exist.
#[instrument(skip(pool, _admin, payload))]
pub async fn create_notification(
    State(pool): State<Pool>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<CreateNotificationPayload>,
) -> Result<ApiResponse<Notification>, AppError> {
    info!("Creating notification for user {}", payload.user_id);
    debug!("Create notification payload: {:?}", payload);

    helper::require_non_empty("titre", &payload.titre)?;
    helper::require_non_empty("message", &payload.message)?;
    helper::require_non_empty("type", &payload.type_)?;

    let new_notification = NewNotification {
        user_id: payload.user_id,
        type_: payload.type_.trim().to_string(),
        titre: payload.titre.trim().to_string(),
        message: payload.message,
        informations_supplementaires: json!({}),
    };

    let notification = helper::run_transaction(&pool, move |conn| {
        helper::ensure_user_exists(conn, new_notification.user_id)?;
        Ok(diesel::insert_into(notif_dsl::notifications)
            .values(&new_notification)
            .returning(Notification::as_returning())
            .get_result::<Notification>(conn)?)
    })
    .await?;

    info!(
        "Successfully created notification {} for user {}",
        notification.id, notification.user_id
    );
    Ok(ApiResponse::created(notification))
}
