use axum::http::StatusCode;
use cfpa_server::model::notification::{Notification, UnreadCountResponse};
use cfpa_server::response::ApiResponse;
use serde_json::json;

mod helpers;
use helpers::{
    count_notifications, create_test_admin, create_test_trainee, insert_test_notification,
    setup_test_environment, token_for,
};

#[tokio::test]
async fn test_list_only_own_notifications_newest_first() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;
    let other = create_test_trainee(&pool, "S2", "s2@test.com").await;
    let older = insert_test_notification(&pool, trainee, "Bienvenue").await;
    let newer = insert_test_notification(&pool, trainee, "Rappel").await;
    insert_test_notification(&pool, other, "Autre").await;

    let response = server
        .get("/api/notifications")
        .authorization_bearer(token_for(trainee))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let inbox = response
        .json::<ApiResponse<Vec<Notification>>>()
        .data
        .unwrap();
    let ids: Vec<i64> = inbox.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![newer, older]);
    assert!(inbox.iter().all(|n| n.user_id == trainee));
}

#[tokio::test]
async fn test_unread_count_and_mark_read() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;
    let first = insert_test_notification(&pool, trainee, "Un").await;
    insert_test_notification(&pool, trainee, "Deux").await;

    let count = server
        .get("/api/notifications/unread-count")
        .authorization_bearer(token_for(trainee))
        .await
        .json::<ApiResponse<UnreadCountResponse>>()
        .data
        .unwrap();
    assert_eq!(count.count, 2);

    let marked = server
        .put(&format!("/api/notifications/{}/read", first))
        .authorization_bearer(token_for(trainee))
        .await;
    assert_eq!(marked.status_code(), StatusCode::OK);
    assert!(marked.json::<ApiResponse<Notification>>().data.unwrap().lu);

    let count = server
        .get("/api/notifications/unread-count")
        .authorization_bearer(token_for(trainee))
        .await
        .json::<ApiResponse<UnreadCountResponse>>()
        .data
        .unwrap();
    assert_eq!(count.count, 1);
}

#[tokio::test]
async fn test_mark_all_read() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;
    for titre in ["Un", "Deux", "Trois"] {
        insert_test_notification(&pool, trainee, titre).await;
    }

    let response = server
        .put("/api/notifications/read-all")
        .authorization_bearer(token_for(trainee))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<ApiResponse<usize>>().data, Some(3));

    let again = server
        .put("/api/notifications/read-all")
        .authorization_bearer(token_for(trainee))
        .await;
    assert_eq!(again.json::<ApiResponse<usize>>().data, Some(0));
}

#[tokio::test]
async fn test_cannot_touch_someone_elses_notification() {
    let (server, pool) = setup_test_environment().await;
    let owner = create_test_trainee(&pool, "S1", "s1@test.com").await;
    let intruder = create_test_trainee(&pool, "S2", "s2@test.com").await;
    let notification = insert_test_notification(&pool, owner, "Privé").await;

    let read = server
        .put(&format!("/api/notifications/{}/read", notification))
        .authorization_bearer(token_for(intruder))
        .await;
    assert_eq!(read.status_code(), StatusCode::NOT_FOUND);

    let delete = server
        .delete(&format!("/api/notifications/{}", notification))
        .authorization_bearer(token_for(intruder))
        .await;
    assert_eq!(delete.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(count_notifications(&pool, owner, "info").await, 1);
}

#[tokio::test]
async fn test_delete_notification() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;
    let notification = insert_test_notification(&pool, trainee, "A effacer").await;

    let response = server
        .delete(&format!("/api/notifications/{}", notification))
        .authorization_bearer(token_for(trainee))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(count_notifications(&pool, trainee, "info").await, 0);
}

#[tokio::test]
async fn test_admin_sends_notification() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_admin(&pool, "admin@test.com").await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;

    let response = server
        .post("/api/notifications")
        .authorization_bearer(token_for(admin))
        .json(&json!({
            "user_id": trainee,
            "titre": "Réunion",
            "message": "Réunion lundi à 9h"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let notification = response.json::<ApiResponse<Notification>>().data.unwrap();
    assert_eq!(notification.type_, "info");
    assert!(!notification.lu);
    assert_eq!(count_notifications(&pool, trainee, "info").await, 1);

    let unknown = server
        .post("/api/notifications")
        .authorization_bearer(token_for(admin))
        .json(&json!({"user_id": 999_999, "titre": "x", "message": "y"}))
        .await;
    assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_trainee_cannot_send_notification() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;

    let response = server
        .post("/api/notifications")
        .authorization_bearer(token_for(trainee))
        .json(&json!({"user_id": trainee, "titre": "x", "message": "y"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}
