mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{
    ADMIN_ID, DOCTOR_ID, DOCTOR_USER_ID, MockRepo, PATIENT_ID, USER_ID, create_test_state,
    sign_token,
};
use health_dashboard::{config::Env, create_router, query::Collection};
use std::{collections::HashMap, io::Read, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceExt;

pub struct TestApp {
    pub address: String,
    pub repo: Arc<MockRepo>,
}

/// Serves the full router over a real socket, backed by the in-memory repository.
async fn spawn_app(repo: MockRepo) -> TestApp {
    let repo = Arc::new(repo);
    let router = create_router(create_test_state(repo.clone(), Env::Production));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address, repo }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app(MockRepo::default()).await;
    let response = reqwest::Client::new()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_unauthenticated_requests_never_reach_the_database() {
    let app = spawn_app(MockRepo::default().with_admin()).await;
    let client = reqwest::Client::new();

    for path in ["/me", "/data/patients", "/admin/stats", "/admin/appointments"] {
        let response = client
            .get(format!("{}{}", app.address, path))
            .send()
            .await
            .expect("req fail");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", path);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Unauthorized");
    }

    let response = client
        .post(format!("{}/cases", app.address))
        .json(&serde_json::json!({ "case_title": "x" }))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(app.repo.call_count(), 0);
}

#[tokio::test]
async fn test_admin_endpoint_forbidden_for_non_admin() {
    let app = spawn_app(MockRepo::default().with_profile(USER_ID, false)).await;
    let token = sign_token(USER_ID, "patient@example.com", 3600);

    let response = reqwest::Client::new()
        .get(format!("{}/admin/stats", app.address))
        .bearer_auth(token)
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Admin access required");
    // Only the profile lookup ran; no count was issued.
    assert_eq!(app.repo.call_count(), 1);
}

#[tokio::test]
async fn test_admin_stats_for_admin() {
    let app = spawn_app(MockRepo {
        counts: HashMap::from([(Collection::Predictions, 2), (Collection::RiskPredictions, 5)]),
        ..MockRepo::default().with_admin()
    })
    .await;
    let token = sign_token(ADMIN_ID, "admin@localhost", 3600);

    let response = reqwest::Client::new()
        .get(format!("{}/admin/stats", app.address))
        .bearer_auth(token)
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "metrics": 0, "appointments": 0, "predictions": 7, "imaging": 0 })
    );
}

#[tokio::test]
async fn test_pagination_query_is_lenient() {
    let router = create_router(create_test_state(
        Arc::new(MockRepo::default().with_admin()),
        Env::Production,
    ));
    let token = sign_token(ADMIN_ID, "admin@localhost", 3600);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/admin/patients?page=abc&limit=")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body["pagination"],
        serde_json::json!({ "total": 0, "page": 1, "limit": 20, "pages": 0 })
    );
}

#[tokio::test]
async fn test_malformed_path_id_uses_error_envelope() {
    let router = create_router(create_test_state(
        Arc::new(MockRepo::default().with_admin()),
        Env::Production,
    ));
    let token = sign_token(ADMIN_ID, "admin@localhost", 3600);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/admin/cases/not-a-uuid")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_document_upload_stores_data_uri() {
    let app = spawn_app(MockRepo::default()).await;
    let token = sign_token(USER_ID, "patient@example.com", 3600);
    let case_id = uuid::Uuid::from_u128(77);

    let form = reqwest::multipart::Form::new()
        .text("case_id", case_id.to_string())
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"%PDF-1.4".to_vec())
                .file_name("report.pdf")
                .mime_str("application/pdf")
                .unwrap(),
        );

    let response = reqwest::Client::new()
        .post(format!("{}/documents", app.address))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::OK);
    let stored = app.repo.artifacts.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].case_id, case_id);
    assert_eq!(stored[0].artifact_type.as_deref(), Some("pdf"));
    assert_eq!(stored[0].file_url, "data:application/pdf;base64,JVBERi0xLjQ=");
    assert_eq!(stored[0].file_size_bytes, 8);
    assert_eq!(stored[0].uploaded_by, Some(USER_ID));
    assert_eq!(stored[0].upload_notes.as_deref(), Some("Uploaded via dashboard"));
}

#[tokio::test]
async fn test_imaging_upload_requires_fields() {
    let app = spawn_app(MockRepo::default()).await;
    let token = sign_token(USER_ID, "patient@example.com", 3600);

    let form = reqwest::multipart::Form::new()
        .text("image_type", "xray")
        .part(
            "file",
            reqwest::multipart::Part::bytes(vec![0u8; 4])
                .file_name("chest.png")
                .mime_str("image/png")
                .unwrap(),
        );

    let response = reqwest::Client::new()
        .post(format!("{}/imaging", app.address))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.repo.saved_images.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app(MockRepo::default()).await;
    let response = reqwest::get(format!("{}/api-docs/openapi.json", app.address))
        .await
        .expect("req fail");

    assert!(response.status().is_success());
    let doc: serde_json::Value = response.json().await.unwrap();
    assert!(doc["paths"]["/admin/stats"].is_object());
    assert!(doc["paths"]["/cases"].is_object());
}

fn pdf_part(name: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(b"%PDF-1.4".to_vec())
        .file_name(name.to_string())
        .mime_str("application/pdf")
        .unwrap()
}

fn csv_part(body: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(body.as_bytes().to_vec())
        .file_name("import.csv")
        .mime_str("text/csv")
        .unwrap()
}

// --- CASE ARTIFACTS ---

#[tokio::test]
async fn test_artifact_upload_records_audit_entry() {
    let app = spawn_app(MockRepo::default().with_doctor()).await;
    let token = sign_token(DOCTOR_USER_ID, "dr@clinic.test", 3600);
    let case_id = uuid::Uuid::from_u128(0xCA5E);

    let form = reqwest::multipart::Form::new()
        .text("artifactType", "lab_report")
        .part("file", pdf_part("cbc.pdf"));
    let response = reqwest::Client::new()
        .post(format!("{}/cases/{}/artifacts", app.address, case_id))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["artifact_name"], "cbc.pdf");

    let stored = app.repo.artifacts.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].uploaded_by, Some(DOCTOR_ID));
    assert_eq!(stored[0].artifact_type.as_deref(), Some("lab_report"));

    let audit = app.repo.audit.lock().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].case_id, case_id);
    assert_eq!(audit[0].action, "artifact_added");
    assert_eq!(audit[0].actor_id, Some(DOCTOR_ID));
    assert_eq!(audit[0].actor_role, "doctor");
    assert_eq!(audit[0].details["file_name"], "cbc.pdf");
}

#[tokio::test]
async fn test_artifact_upload_survives_audit_failure() {
    let app = spawn_app(MockRepo {
        fail_audit: true,
        ..MockRepo::default().with_doctor()
    })
    .await;
    let token = sign_token(DOCTOR_USER_ID, "dr@clinic.test", 3600);

    let form = reqwest::multipart::Form::new().part("file", pdf_part("xray-notes.pdf"));
    let response = reqwest::Client::new()
        .post(format!(
            "{}/cases/{}/artifacts",
            app.address,
            uuid::Uuid::from_u128(0xCA5F)
        ))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.repo.artifacts.lock().unwrap().len(), 1);
    assert!(app.repo.audit.lock().unwrap().is_empty());
}

// --- EXPORT ---

#[tokio::test]
async fn test_export_zip_contains_one_csv_per_collection() {
    let patients = vec![
        serde_json::json!({ "id": PATIENT_ID, "gender": "female", "blood_type": "O+" }),
        serde_json::json!({ "id": USER_ID, "gender": null, "blood_type": "A-" }),
    ];
    let app = spawn_app(MockRepo {
        exports: HashMap::from([(Collection::Patients, patients)]),
        ..MockRepo::default().with_admin()
    })
    .await;
    let token = sign_token(ADMIN_ID, "admin@localhost", 3600);

    let response = reqwest::Client::new()
        .get(format!("{}/admin/export-zip", app.address))
        .bearer_auth(token)
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"healthcare-export.zip\""
    );

    let bytes = response.bytes().await.unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "appointments.csv",
            "health_metrics.csv",
            "medical_imaging.csv",
            "patients.csv",
            "predictions.csv",
        ]
    );

    let mut csv = String::new();
    archive
        .by_name("patients.csv")
        .unwrap()
        .read_to_string(&mut csv)
        .unwrap();
    // serde_json objects iterate their keys in sorted order.
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("blood_type,gender,id"));
    assert_eq!(lines.next(), Some(format!("O+,female,{}", PATIENT_ID).as_str()));
    assert_eq!(lines.next(), Some(format!("A-,,{}", USER_ID).as_str()));

    let mut appointments = String::new();
    archive
        .by_name("appointments.csv")
        .unwrap()
        .read_to_string(&mut appointments)
        .unwrap();
    assert!(appointments.is_empty());
}

#[tokio::test]
async fn test_export_zip_failure_is_internal_and_admin_only() {
    let app = spawn_app(MockRepo {
        fail_export: true,
        ..MockRepo::default().with_admin().with_profile(USER_ID, false)
    })
    .await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/admin/export-zip", app.address))
        .bearer_auth(sign_token(USER_ID, "patient@example.com", 3600))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get(format!("{}/admin/export-zip", app.address))
        .bearer_auth(sign_token(ADMIN_ID, "admin@localhost", 3600))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Failed to export data" }));
}

// --- CSV INGEST ---

async fn post_ingest(
    app: &TestApp,
    user: uuid::Uuid,
    form: reqwest::multipart::Form,
) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/data/csv-ingest", app.address))
        .bearer_auth(sign_token(user, "admin@localhost", 3600))
        .multipart(form)
        .send()
        .await
        .expect("req fail")
}

#[tokio::test]
async fn test_csv_ingest_upserts_health_metrics() {
    let app = spawn_app(MockRepo::default().with_admin()).await;
    let body = format!(
        "patient_id,metric_type,value,unit,recorded_at\n\
         {p},heart_rate,72,bpm,2024-04-30T08:00:00Z\n\
         {p},spo2,97,%,2024-04-30T08:00:00Z\n",
        p = PATIENT_ID
    );
    let form = reqwest::multipart::Form::new()
        .text("datasetType", "health-metrics")
        .part("file", csv_part(&body));

    let response = post_ingest(&app, ADMIN_ID, form).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "success": true, "ingested": 2, "dataset": "health-metrics" })
    );
    let imported = app.repo.imported_metrics.lock().unwrap();
    assert_eq!(imported.len(), 2);
    assert_eq!(imported[0].patient_id, PATIENT_ID);
    assert_eq!(imported[1].metric_type, "spo2");
}

#[tokio::test]
async fn test_csv_ingest_rejects_unknown_dataset() {
    let app = spawn_app(MockRepo::default().with_admin()).await;
    let form = reqwest::multipart::Form::new()
        .text("dataset_type", "billing")
        .part("file", csv_part("a,b\n1,2\n"));

    let response = post_ingest(&app, ADMIN_ID, form).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Unknown datasetType: billing");
}

#[tokio::test]
async fn test_csv_ingest_bad_row_writes_nothing() {
    let app = spawn_app(MockRepo::default().with_admin()).await;
    let body = format!(
        "user_id,aqi_index,recorded_at\n{},88,2024-04-30\n{},not-a-number,2024-04-30\n",
        USER_ID, USER_ID
    );
    let form = reqwest::multipart::Form::new()
        .text("datasetType", "environmental-data")
        .part("file", csv_part(&body));

    let response = post_ingest(&app, ADMIN_ID, form).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid row on line 3")
    );
    assert!(app.repo.imported_environmental.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_csv_ingest_requires_file_and_dataset() {
    let app = spawn_app(MockRepo::default().with_admin()).await;
    let form = reqwest::multipart::Form::new().part("file", csv_part("user_id\n"));

    let response = post_ingest(&app, ADMIN_ID, form).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "File and datasetType required");
}

#[tokio::test]
async fn test_csv_ingest_is_admin_only() {
    let app = spawn_app(MockRepo::default().with_profile(USER_ID, false)).await;
    let form = reqwest::multipart::Form::new()
        .text("datasetType", "patient-data")
        .part("file", csv_part(&format!("user_id,gender\n{},female\n", USER_ID)));

    let response = post_ingest(&app, USER_ID, form).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.repo.imported_patients.lock().unwrap().is_empty());
}

// --- DATA FEEDS ---

#[tokio::test]
async fn test_data_feed_accepts_camel_case_patient_id_and_caps_limit() {
    let metric = |n: u128, patient_id: uuid::Uuid| health_dashboard::models::HealthMetric {
        id: uuid::Uuid::from_u128(n),
        patient_id: Some(patient_id),
        metric_type: "heart_rate".to_string(),
        value: 70.0,
        recorded_at: chrono::Utc::now(),
        ..Default::default()
    };
    let app = spawn_app(MockRepo {
        metrics: vec![metric(1, PATIENT_ID), metric(2, USER_ID), metric(3, PATIENT_ID)],
        ..MockRepo::default()
    })
    .await;

    let response = reqwest::Client::new()
        .get(format!(
            "{}/data/metrics?patientId={}&limit=200",
            app.address, PATIENT_ID
        ))
        .bearer_auth(sign_token(USER_ID, "patient@example.com", 3600))
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["limit"], 100);
    assert!(
        body["metrics"]
            .as_array()
            .unwrap()
            .iter()
            .all(|m| m["patient_id"] == serde_json::json!(PATIENT_ID))
    );
}
