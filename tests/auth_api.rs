use axum::http::{HeaderName, HeaderValue, StatusCode};
use cfpa_server::model::user::{Role, SigninResponse, UserResponse};
use cfpa_server::response::ApiResponse;
use serde_json::{Value, json};

mod helpers;
use helpers::{
    TEST_PASSWORD, create_test_admin, create_test_trainee, create_test_user,
    setup_test_environment, token_for,
};

// signup

#[tokio::test]
async fn test_signup_defaults_to_stagiaire_role() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .post("/api/auth/signup")
        .json(&json!({
            "nom": "Sara Trainee",
            "email": "Sara@Test.com",
            "password": "secret-pass"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: ApiResponse<UserResponse> = response.json();
    assert_eq!(body.message, "User was registered successfully!");
    let user = body.data.unwrap();
    assert_eq!(user.email, "sara@test.com");
    assert_eq!(user.roles.into_iter().collect::<Vec<_>>(), vec![Role::Stagiaire]);
}

#[tokio::test]
async fn test_signup_ignores_requested_roles() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .post("/api/auth/signup")
        .json(&json!({
            "nom": "Stranger",
            "email": "stranger@test.com",
            "password": "secret-pass",
            "roles": ["admin", "enseignant"]
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let user = response.json::<ApiResponse<UserResponse>>().data.unwrap();
    assert_eq!(user.roles.into_iter().collect::<Vec<_>>(), vec![Role::Stagiaire]);

    let signin = server
        .post("/api/auth/signin")
        .json(&json!({"email": "stranger@test.com", "password": "secret-pass"}))
        .await
        .json::<ApiResponse<SigninResponse>>()
        .data
        .unwrap();
    let create_group = server
        .post("/api/groupes")
        .authorization_bearer(&signin.access_token)
        .json(&json!({"nom": "G-intrus"}))
        .await;
    assert_eq!(create_group.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_creates_user_with_several_roles() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_admin(&pool, "admin@test.com").await;

    let response = server
        .post("/api/utilisateurs")
        .authorization_bearer(token_for(admin))
        .json(&json!({
            "nom": "Multi",
            "email": "multi@test.com",
            "password": "secret-pass",
            "roles": ["enseignant", "admin"]
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let user = response.json::<ApiResponse<UserResponse>>().data.unwrap();
    assert!(user.roles.contains(&Role::Enseignant));
    assert!(user.roles.contains(&Role::Admin));
    assert!(!user.roles.contains(&Role::Stagiaire));
}

#[tokio::test]
async fn test_signup_duplicate_email_conflict() {
    let (server, pool) = setup_test_environment().await;
    create_test_trainee(&pool, "Existing", "taken@test.com").await;

    let response = server
        .post("/api/auth/signup")
        .json(&json!({
            "nom": "Other",
            "email": "taken@test.com",
            "password": "secret-pass"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: ApiResponse<Value> = response.json();
    assert_eq!(body.message, "Failed! Email is already in use!");
    assert!(body.data.is_none());
}

#[tokio::test]
async fn test_create_user_unknown_role_bad_request() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_admin(&pool, "admin@test.com").await;

    let response = server
        .post("/api/utilisateurs")
        .authorization_bearer(token_for(admin))
        .json(&json!({
            "nom": "Bad",
            "email": "bad@test.com",
            "password": "secret-pass",
            "roles": ["directeur"]
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signup_empty_password_bad_request() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .post("/api/auth/signup")
        .json(&json!({"nom": "X", "email": "x@test.com", "password": "  "}))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

// signin

#[tokio::test]
async fn test_signin_success_returns_usable_token() {
    let (server, pool) = setup_test_environment().await;
    let user_id = create_test_user(
        &pool,
        "Teacher Admin",
        "ta@test.com",
        &[Role::Enseignant, Role::Admin],
    )
    .await;

    let response = server
        .post("/api/auth/signin")
        .json(&json!({"email": "TA@test.com", "password": TEST_PASSWORD}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let raw: Value = response.json();
    assert!(raw["data"]["accessToken"].is_string());

    let signin = response.json::<ApiResponse<SigninResponse>>().data.unwrap();
    assert_eq!(signin.id, user_id);
    assert_eq!(signin.roles.len(), 2);

    let me = server
        .get("/api/auth/me")
        .add_header(
            HeaderName::from_static("x-access-token"),
            HeaderValue::from_str(&signin.access_token).unwrap(),
        )
        .await;
    assert_eq!(me.status_code(), StatusCode::OK);
    let me = me.json::<ApiResponse<UserResponse>>().data.unwrap();
    assert_eq!(me.id, user_id);
    assert_eq!(me.email, "ta@test.com");
}

#[tokio::test]
async fn test_signin_wrong_password_unauthorized() {
    let (server, pool) = setup_test_environment().await;
    create_test_trainee(&pool, "Sara", "sara@test.com").await;

    let response = server
        .post("/api/auth/signin")
        .json(&json!({"email": "sara@test.com", "password": "wrong"}))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.json::<ApiResponse<Value>>().message,
        "Invalid Password!"
    );
}

#[tokio::test]
async fn test_signin_unknown_email_not_found() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .post("/api/auth/signin")
        .json(&json!({"email": "ghost@test.com", "password": TEST_PASSWORD}))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.json::<ApiResponse<Value>>().message,
        "User Not found."
    );
}

// authentication gate

#[tokio::test]
async fn test_missing_token_unauthorized() {
    let (server, _pool) = setup_test_environment().await;

    let response = server.get("/api/auth/me").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.json::<ApiResponse<Value>>().message,
        "No token provided!"
    );
}

#[tokio::test]
async fn test_malformed_token_unauthorized() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .get("/api/auth/me")
        .authorization_bearer("not-a-jwt")
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_of_deleted_user_not_found() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .get("/api/auth/me")
        .authorization_bearer(token_for(987_654))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.json::<ApiResponse<Value>>().message,
        "User Not found."
    );
}

#[tokio::test]
async fn test_admin_route_forbidden_for_trainee() {
    let (server, pool) = setup_test_environment().await;
    let trainee = create_test_trainee(&pool, "Sara", "sara@test.com").await;

    let response = server
        .get("/api/utilisateurs")
        .authorization_bearer(token_for(trainee))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.json::<ApiResponse<Value>>().message,
        "Require admin Role!"
    );
}

#[tokio::test]
async fn test_admin_route_allowed_for_admin() {
    let (server, pool) = setup_test_environment().await;
    let admin = create_test_admin(&pool, "admin@test.com").await;

    let response = server
        .get("/api/utilisateurs")
        .authorization_bearer(token_for(admin))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let users = response
        .json::<ApiResponse<Vec<UserResponse>>>()
        .data
        .unwrap();
    assert_eq!(users.len(), 1);
}
