use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use cfpa_server::model::course::{CourseFile, CourseResponse};
use cfpa_server::response::ApiResponse;
use serde_json::json;

mod helpers;
use helpers::{
    TestServer, assign_test_teacher, count_course_files, create_test_group, create_test_module,
    create_test_teacher, create_test_trainee, enroll_test_trainee, setup_test_environment,
    test_upload_dir, token_for,
};

fn pdf_part(name: &str) -> Part {
    Part::bytes(b"%PDF-1.4 test".to_vec())
        .file_name(name.to_string())
        .mime_type("application/pdf")
}

async fn create_course(
    server: &TestServer,
    teacher: i64,
    module: i64,
    titre: &str,
    form: MultipartForm,
) -> CourseResponse {
    let form = form
        .add_text("module_id", module.to_string())
        .add_text("titre", titre.to_string());
    let response = server
        .post("/api/cours")
        .authorization_bearer(token_for(teacher))
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<ApiResponse<CourseResponse>>().data.unwrap()
}

#[tokio::test]
async fn test_create_course_without_files_then_add_files() {
    let (server, pool) = setup_test_environment().await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let module = create_test_module(&pool, "M1").await;
    let group = create_test_group(&pool, "G1", None).await;
    assign_test_teacher(&pool, teacher, module, group).await;

    let course = create_course(
        &server,
        teacher,
        module,
        "Introduction",
        MultipartForm::new()
            .add_text("description", "Premier cours")
            .add_text("informations_supplementaires", r#"{"niveau": 1}"#),
    )
    .await;
    assert!(course.fichiers.is_empty());
    assert_eq!(course.course.description, "Premier cours");
    assert_eq!(course.course.informations_supplementaires, json!({"niveau": 1}));
    assert_eq!(course.module_nom.as_deref(), Some("M1"));

    for name in ["chapitre1.pdf", "chapitre2.pdf"] {
        let response = server
            .post(&format!("/api/cours/{}/files", course.course.id))
            .authorization_bearer(token_for(teacher))
            .multipart(MultipartForm::new().add_part("fichiers", pdf_part(name)))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        let files = response.json::<ApiResponse<Vec<CourseFile>>>().data.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].nom, name);
        assert_eq!(files[0].type_fichier, "application/pdf");
    }
    assert_eq!(count_course_files(&pool, course.course.id).await, 2);

    let fetched = server
        .get(&format!("/api/cours/{}", course.course.id))
        .authorization_bearer(token_for(teacher))
        .await
        .json::<ApiResponse<CourseResponse>>()
        .data
        .unwrap();
    assert_eq!(fetched.fichiers.len(), 2);
    assert!(fetched.course.fichier_url.is_none());
    assert!(fetched.course.fichier_public_id.is_none());
    assert!(fetched.course.fichier_type.is_none());
}

#[tokio::test]
async fn test_create_course_with_file_stores_blob() {
    let (server, pool) = setup_test_environment().await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let module = create_test_module(&pool, "M1").await;
    let group = create_test_group(&pool, "G1", None).await;
    assign_test_teacher(&pool, teacher, module, group).await;

    let course = create_course(
        &server,
        teacher,
        module,
        "Avec support",
        MultipartForm::new().add_part("fichiers", pdf_part("support.pdf")),
    )
    .await;

    assert_eq!(course.fichiers.len(), 1);
    let file = &course.fichiers[0];
    assert!(file.url.starts_with("/uploads/"));
    assert!(file.url.ends_with("/support.pdf"));
    let on_disk = test_upload_dir().join(&file.public_id).join("support.pdf");
    assert!(on_disk.exists());
}

#[tokio::test]
async fn test_create_course_unassigned_teacher_forbidden() {
    let (server, pool) = setup_test_environment().await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let module = create_test_module(&pool, "M1").await;

    let response = server
        .post("/api/cours")
        .authorization_bearer(token_for(teacher))
        .multipart(
            MultipartForm::new()
                .add_text("module_id", module.to_string())
                .add_text("titre", "Hors module"),
        )
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_course_missing_title_bad_request() {
    let (server, pool) = setup_test_environment().await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let module = create_test_module(&pool, "M1").await;
    let group = create_test_group(&pool, "G1", None).await;
    assign_test_teacher(&pool, teacher, module, group).await;

    let response = server
        .post("/api/cours")
        .authorization_bearer(token_for(teacher))
        .multipart(MultipartForm::new().add_text("module_id", module.to_string()))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_owner_cannot_modify_course() {
    let (server, pool) = setup_test_environment().await;
    let owner = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let colleague = create_test_teacher(&pool, "E2", "e2@test.com").await;
    let module = create_test_module(&pool, "M1").await;
    let group = create_test_group(&pool, "G1", None).await;
    assign_test_teacher(&pool, owner, module, group).await;
    assign_test_teacher(&pool, colleague, module, group).await;

    let course = create_course(&server, owner, module, "Cours E1", MultipartForm::new()).await;

    let update = server
        .put(&format!("/api/cours/{}", course.course.id))
        .authorization_bearer(token_for(colleague))
        .json(&json!({"titre": "Pris"}))
        .await;
    assert_eq!(update.status_code(), StatusCode::FORBIDDEN);

    let add_file = server
        .post(&format!("/api/cours/{}/files", course.course.id))
        .authorization_bearer(token_for(colleague))
        .multipart(MultipartForm::new().add_part("fichiers", pdf_part("x.pdf")))
        .await;
    assert_eq!(add_file.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(count_course_files(&pool, course.course.id).await, 0);

    let delete = server
        .delete(&format!("/api/cours/{}", course.course.id))
        .authorization_bearer(token_for(colleague))
        .await;
    assert_eq!(delete.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_add_file_without_file_bad_request() {
    let (server, pool) = setup_test_environment().await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let module = create_test_module(&pool, "M1").await;
    let group = create_test_group(&pool, "G1", None).await;
    assign_test_teacher(&pool, teacher, module, group).await;
    let course = create_course(&server, teacher, module, "Vide", MultipartForm::new()).await;

    let response = server
        .post(&format!("/api/cours/{}/files", course.course.id))
        .authorization_bearer(token_for(teacher))
        .multipart(MultipartForm::new().add_text("note", "rien"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_course_and_delete_file() {
    let (server, pool) = setup_test_environment().await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let module = create_test_module(&pool, "M1").await;
    let group = create_test_group(&pool, "G1", None).await;
    assign_test_teacher(&pool, teacher, module, group).await;
    let course = create_course(
        &server,
        teacher,
        module,
        "Ancien titre",
        MultipartForm::new().add_part("fichiers", pdf_part("a.pdf")),
    )
    .await;

    let updated = server
        .put(&format!("/api/cours/{}", course.course.id))
        .authorization_bearer(token_for(teacher))
        .json(&json!({"titre": "Nouveau titre"}))
        .await;
    assert_eq!(updated.status_code(), StatusCode::OK);
    let updated = updated.json::<ApiResponse<CourseResponse>>().data.unwrap();
    assert_eq!(updated.course.titre, "Nouveau titre");
    assert_eq!(updated.fichiers.len(), 1);

    let file = &course.fichiers[0];
    let deleted = server
        .delete(&format!("/api/cours/files/{}", file.id))
        .authorization_bearer(token_for(teacher))
        .await;
    assert_eq!(deleted.status_code(), StatusCode::OK);
    assert_eq!(count_course_files(&pool, course.course.id).await, 0);
    assert!(!test_upload_dir().join(&file.public_id).exists());

    let missing = server
        .delete(&format!("/api/cours/files/{}", file.id))
        .authorization_bearer(token_for(teacher))
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_course_removes_files() {
    let (server, pool) = setup_test_environment().await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let module = create_test_module(&pool, "M1").await;
    let group = create_test_group(&pool, "G1", None).await;
    assign_test_teacher(&pool, teacher, module, group).await;
    let course = create_course(
        &server,
        teacher,
        module,
        "A supprimer",
        MultipartForm::new()
            .add_part("fichiers", pdf_part("a.pdf"))
            .add_part("fichiers", pdf_part("b.pdf")),
    )
    .await;
    assert_eq!(course.fichiers.len(), 2);

    let response = server
        .delete(&format!("/api/cours/{}", course.course.id))
        .authorization_bearer(token_for(teacher))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(count_course_files(&pool, course.course.id).await, 0);
    for file in &course.fichiers {
        assert!(!test_upload_dir().join(&file.public_id).exists());
    }

    let gone = server
        .get(&format!("/api/cours/{}", course.course.id))
        .authorization_bearer(token_for(teacher))
        .await;
    assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_course_listings() {
    let (server, pool) = setup_test_environment().await;
    let teacher = create_test_teacher(&pool, "E1", "e1@test.com").await;
    let enrolled = create_test_trainee(&pool, "S1", "s1@test.com").await;
    let outsider = create_test_trainee(&pool, "S2", "s2@test.com").await;
    let m1 = create_test_module(&pool, "M1").await;
    let m2 = create_test_module(&pool, "M2").await;
    let g1 = create_test_group(&pool, "G1", None).await;
    let g2 = create_test_group(&pool, "G2", None).await;
    assign_test_teacher(&pool, teacher, m1, g1).await;
    assign_test_teacher(&pool, teacher, m2, g2).await;
    enroll_test_trainee(&pool, enrolled, g1).await;

    create_course(&server, teacher, m1, "Cours M1", MultipartForm::new()).await;
    create_course(&server, teacher, m2, "Cours M2", MultipartForm::new()).await;

    let mine = server
        .get("/api/cours/mes-cours")
        .authorization_bearer(token_for(teacher))
        .await
        .json::<ApiResponse<Vec<CourseResponse>>>()
        .data
        .unwrap();
    assert_eq!(mine.len(), 2);

    let by_module = server
        .get(&format!("/api/cours/module/{}", m2))
        .authorization_bearer(token_for(enrolled))
        .await
        .json::<ApiResponse<Vec<CourseResponse>>>()
        .data
        .unwrap();
    assert_eq!(by_module.len(), 1);
    assert_eq!(by_module[0].course.titre, "Cours M2");

    let trainee_view = server
        .get("/api/cours/stagiaire")
        .authorization_bearer(token_for(enrolled))
        .await
        .json::<ApiResponse<Vec<CourseResponse>>>()
        .data
        .unwrap();
    assert_eq!(trainee_view.len(), 1);
    assert_eq!(trainee_view[0].course.module_id, m1);

    let nothing = server
        .get("/api/cours/stagiaire")
        .authorization_bearer(token_for(outsider))
        .await
        .json::<ApiResponse<Vec<CourseResponse>>>()
        .data
        .unwrap();
    assert!(nothing.is_empty());

    let forbidden = server
        .get("/api/cours/mes-cours")
        .authorization_bearer(token_for(enrolled))
        .await;
    assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
}
