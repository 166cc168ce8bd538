use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use cfpa_server::model::profile::Profile;
use cfpa_server::response::ApiResponse;
use serde_json::json;

mod helpers;
use helpers::{
    create_test_admin, create_test_teacher, create_test_trainee, setup_test_environment,
    test_upload_dir, token_for,
};

fn photo(name: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "photo",
        Part::bytes(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a])
            .file_name(name.to_string())
            .mime_type("image/png"),
    )
}

#[tokio::test]
async fn test_create_and_read_own_profile() {
    let (server, pool) = setup_test_environment().await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let path = format!("/api/profil/{}", teacher);

    let created = server
        .post(&path)
        .authorization_bearer(token_for(teacher))
        .json(&json!({"specialite": "Électrotechnique", "numero_identite": "AB123456"}))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let profile = created.json::<ApiResponse<Profile>>().data.unwrap();
    assert_eq!(profile.user_id, teacher);
    assert_eq!(profile.specialite.as_deref(), Some("Électrotechnique"));
    assert!(profile.photo_url.is_none());

    let duplicate = server
        .post(&path)
        .authorization_bearer(token_for(teacher))
        .json(&json!({}))
        .await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);

    let fetched = server
        .get(&path)
        .authorization_bearer(token_for(teacher))
        .await;
    assert_eq!(fetched.status_code(), StatusCode::OK);
    assert_eq!(fetched.json::<ApiResponse<Profile>>().data.unwrap().id, profile.id);
}

#[tokio::test]
async fn test_profile_visibility() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;
    let other = create_test_trainee(&pool, "S2", "s2@test.com").await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let path = format!("/api/profil/{}", trainee);

    server
        .post(&path)
        .authorization_bearer(token_for(trainee))
        .json(&json!({"numero_identite": "CD987654"}))
        .await
        .assert_status(StatusCode::CREATED);

    let by_teacher = server.get(&path).authorization_bearer(token_for(teacher)).await;
    assert_eq!(by_teacher.status_code(), StatusCode::OK);

    let by_other = server.get(&path).authorization_bearer(token_for(other)).await;
    assert_eq!(by_other.status_code(), StatusCode::FORBIDDEN);

    let edit_by_teacher = server
        .put(&path)
        .authorization_bearer(token_for(teacher))
        .json(&json!({"specialite": "x"}))
        .await;
    assert_eq!(edit_by_teacher.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_update_profile() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_admin(&pool, "admin@test.com").await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;
    let path = format!("/api/profil/{}", trainee);

    let missing = server
        .put(&path)
        .authorization_bearer(token_for(admin))
        .json(&json!({"specialite": "Soudure"}))
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

    server
        .post(&path)
        .authorization_bearer(token_for(admin))
        .json(&json!({"specialite": "Plomberie", "numero_identite": "EF111"}))
        .await
        .assert_status(StatusCode::CREATED);

    let updated = server
        .put(&path)
        .authorization_bearer(token_for(admin))
        .json(&json!({"specialite": "Soudure"}))
        .await;
    assert_eq!(updated.status_code(), StatusCode::OK);
    let profile = updated.json::<ApiResponse<Profile>>().data.unwrap();
    assert_eq!(profile.specialite.as_deref(), Some("Soudure"));
    assert_eq!(profile.numero_identite.as_deref(), Some("EF111"));
}

#[tokio::test]
async fn test_upload_photo_creates_profile_and_replaces_old_photo() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;
    let path = format!("/api/profil/{}/photo", trainee);

    let first = server
        .put(&path)
        .authorization_bearer(token_for(trainee))
        .multipart(photo("moi.png"))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let first = first.json::<ApiResponse<Profile>>().data.unwrap();
    let first_id = first.photo_public_id.clone().unwrap();
    assert!(first.photo_url.unwrap().starts_with("/uploads/"));
    assert!(test_upload_dir().join(&first_id).exists());

    let second = server
        .put(&path)
        .authorization_bearer(token_for(trainee))
        .multipart(photo("moi2.png"))
        .await;
    assert_eq!(second.status_code(), StatusCode::OK);
    let second = second.json::<ApiResponse<Profile>>().data.unwrap();
    assert_eq!(second.id, first.id);
    let second_id = second.photo_public_id.unwrap();
    assert_ne!(second_id, first_id);
    assert!(!test_upload_dir().join(&first_id).exists());
    assert!(test_upload_dir().join(&second_id).exists());
}

#[tokio::test]
async fn test_upload_photo_without_file_bad_request() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;

    let response = server
        .put(&format!("/api/profil/{}/photo", trainee))
        .authorization_bearer(token_for(trainee))
        .multipart(MultipartForm::new().add_text("legende", "moi"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_profile_removes_photo() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "S1", "s1@test.com").await;

    let profile = server
        .put(&format!("/api/profil/{}/photo", trainee))
        .authorization_bearer(token_for(trainee))
        .multipart(photo("moi.png"))
        .await
        .json::<ApiResponse<Profile>>()
        .data
        .unwrap();
    let photo_id = profile.photo_public_id.unwrap();

    let path = format!("/api/profil/{}", trainee);
    let deleted = server
        .delete(&path)
        .authorization_bearer(token_for(trainee))
        .await;
    assert_eq!(deleted.status_code(), StatusCode::OK);
    assert!(!test_upload_dir().join(&photo_id).exists());

    let gone = server.get(&path).authorization_bearer(token_for(trainee)).await;
    assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);
}
