//! HTTP client tests against an in-process backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use refadmin::envelope::{self, EnvelopeShape};
use refadmin::{
    ApiError, AuthService, Backend, DeleteMode, EntityApi, EntityRegistry, FetchOutcome,
    FormDialogController, PaginatedListController, SubmitError, SubmitOutcome,
};

// =============================================================================
// Test backend
// =============================================================================

#[derive(Clone, Default)]
struct Recorded {
    calls: Arc<Mutex<Vec<String>>>,
    auth: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl Recorded {
    fn note(&self, call: String, headers: &HeaderMap) {
        self.calls.lock().unwrap().push(call);
        if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            self.auth.lock().unwrap().push(value.to_string());
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

async fn list_skills(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let page = query.get("pageNumber").cloned().unwrap_or_default();
    let size = query.get("pageSize").cloned().unwrap_or_default();
    rec.note(format!("list {} {}", page, size), &headers);
    Json(json!({
        "code": 200,
        "data": {
            "content": [
                {"skillId": 1, "skillName": "Rust", "isActive": true, "insertedDate": "2024-03-05T10:00:00"},
                {"skillId": 2, "skillName": "Welding", "isDelete": true}
            ],
            "totalElements": 12
        }
    }))
}

async fn all_skills(State(rec): State<Recorded>, headers: HeaderMap) -> Json<Value> {
    rec.note("all".to_string(), &headers);
    Json(json!({"skills": [{"skillId": 1, "skillName": "Rust"}]}))
}

async fn count_skills(State(rec): State<Recorded>, headers: HeaderMap) -> Json<Value> {
    rec.note("count".to_string(), &headers);
    Json(json!({"code": 200, "data": 12}))
}

async fn get_skill(State(rec): State<Recorded>, headers: HeaderMap, Path(id): Path<i64>) -> Json<Value> {
    rec.note(format!("get {}", id), &headers);
    Json(json!({"code": 200, "data": {"skillId": id, "skillName": "Rust", "isActive": true}}))
}

async fn delete_skill(State(rec): State<Recorded>, headers: HeaderMap, Path(id): Path<i64>) -> StatusCode {
    rec.note(format!("delete {}", id), &headers);
    StatusCode::NO_CONTENT
}

async fn create_skill(State(rec): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    rec.note("create".to_string(), &headers);
    rec.bodies.lock().unwrap().push(body);
    Json(json!({"code": 200, "message": "Skill created"}))
}

async fn update_skill(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.note(format!("update {}", id), &headers);
    rec.bodies.lock().unwrap().push(body);
    // transport succeeds, the envelope says no
    Json(json!({"code": 409, "status": "CONFLICT", "message": "Duplicate skill"}))
}

async fn toggle_skill(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Path((id, action)): Path<(i64, String)>,
) -> Json<Value> {
    rec.note(format!("{} {}", action, id), &headers);
    Json(json!({"code": 200}))
}

async fn countries_unauthorized() -> StatusCode {
    StatusCode::UNAUTHORIZED
}

async fn languages_broken() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "database unavailable"})),
    )
}

fn router(rec: Recorded) -> Router {
    Router::new()
        .route("/skill/v1/list", get(list_skills))
        .route("/skill/v1/all", get(all_skills))
        .route("/skill/v1/count", get(count_skills))
        .route("/skill/v1/create", post(create_skill))
        .route("/skill/v1/update/{id}", put(update_skill))
        .route("/skill/v1/{id}", get(get_skill).delete(delete_skill))
        .route("/skill/v1/{id}/{action}", put(toggle_skill))
        .route("/country/v1/list", get(countries_unauthorized))
        .route("/language/v1/list", get(languages_broken))
        .with_state(rec)
}

async fn spawn_backend() -> (String, Recorded) {
    let rec = Recorded::default();
    let app = router(rec.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    (format!("http://{}", addr), rec)
}

fn registry() -> EntityRegistry {
    EntityRegistry::builtin()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_list_sends_bearer_and_page_query() {
    let (base, rec) = spawn_backend().await;
    let registry = registry();
    let spec = registry.get("skill").unwrap();
    let backend = Backend::new(&base, AuthService::with_token("abc123"));
    let api = backend.client(spec);

    let mut list = PaginatedListController::new(spec.clone(), 5);
    let outcome = list.sync(&api).await.unwrap();
    assert_eq!(outcome, Some(FetchOutcome::Applied { rows: 2, total: 12 }));
    assert_eq!(list.page_count(), 3);

    let rows = list.rows();
    assert_eq!(rows[0].view.get("skillName"), Some("Rust"));
    assert_eq!(rows[0].view.get("status"), Some("Active"));
    assert_eq!(rows[0].view.get("insertedDate"), Some("2024-03-05"));
    assert_eq!(rows[1].view.get("status"), Some("Inactive"));
    assert_eq!(rows[1].view.get("updatedDate"), Some("N/A"));

    assert_eq!(rec.calls(), vec!["list 0 5".to_string()]);
    assert_eq!(rec.auth.lock().unwrap().as_slice(), ["Bearer abc123".to_string()]);
}

#[tokio::test]
async fn test_create_through_dialog_posts_without_id() {
    let (base, rec) = spawn_backend().await;
    let registry = registry();
    let spec = registry.get("skill").unwrap();
    let backend = Backend::new(&base, AuthService::with_token("abc123"));
    let api = backend.client(spec);

    let list = PaginatedListController::new(spec.clone(), 10);
    let mut dialog = FormDialogController::new(spec.clone(), list.refresh_handle());
    dialog.open_add();
    dialog.set_field_text("skillName", "Soldering");

    let outcome = dialog.submit(&api).await.unwrap();
    match outcome {
        SubmitOutcome::Created(reply) => assert_eq!(reply.message.as_deref(), Some("Skill created")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!dialog.is_open());
    assert_eq!(list.refresh_generation(), 1);

    let bodies = rec.bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["skillName"], json!("Soldering"));
    assert!(bodies[0].get("skillId").is_none());
}

#[tokio::test]
async fn test_update_rejected_by_envelope_code_keeps_dialog_open() {
    let (base, rec) = spawn_backend().await;
    let registry = registry();
    let spec = registry.get("skill").unwrap();
    let backend = Backend::new(&base, AuthService::with_token("abc123"));
    let api = backend.client(spec);

    let list = PaginatedListController::new(spec.clone(), 10);
    let mut dialog = FormDialogController::new(spec.clone(), list.refresh_handle());
    dialog.open_edit(&api, 7).await.unwrap();
    dialog.set_field_text("skillName", "Rust 2024");

    let err = dialog.submit(&api).await.unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Api(ApiError::Rejected { code: 409, .. })
    ));
    assert!(dialog.is_open());
    assert_eq!(dialog.feedback(), Some("Duplicate skill"));
    assert_eq!(dialog.record()["skillName"], json!("Rust 2024"));
    assert_eq!(list.refresh_generation(), 0);

    assert_eq!(rec.calls(), vec!["get 7".to_string(), "update 7".to_string()]);
    let bodies = rec.bodies.lock().unwrap().clone();
    assert_eq!(bodies[0]["skillId"], json!(7));
}

#[tokio::test]
async fn test_unauthorized_logs_out() {
    let (base, _rec) = spawn_backend().await;
    let registry = registry();
    let auth = AuthService::with_token("expired");
    let backend = Backend::new(&base, auth.clone());
    let api = backend.client(registry.get("country").unwrap());

    let err = api.list(0, 10).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { status: 401 }));
    assert!(!auth.is_logged_in());

    // the next call never leaves the process
    let err = api.list(0, 10).await.unwrap_err();
    assert!(matches!(err, ApiError::MissingToken));
}

#[tokio::test]
async fn test_server_error_message_is_surfaced() {
    let (base, _rec) = spawn_backend().await;
    let registry = registry();
    let spec = registry.get("language").unwrap();
    let backend = Backend::new(&base, AuthService::with_token("abc123"));
    let api = backend.client(spec);

    let mut list = PaginatedListController::new(spec.clone(), 10);
    let err = list.fetch_page(&api).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 500, .. }));
    assert_eq!(err.user_message(), "database unavailable");
    assert!(list.rows().is_empty());
}

#[tokio::test]
async fn test_soft_and_hard_delete_hit_their_endpoints() {
    let (base, rec) = spawn_backend().await;
    let registry = registry();
    let spec = registry.get("skill").unwrap();
    let backend = Backend::new(&base, AuthService::with_token("abc123"));
    let api = backend.client(spec);

    let mut list = PaginatedListController::new(spec.clone(), 10);
    list.remove(&api, 3, DeleteMode::Soft).await.unwrap();
    let reply = list.remove(&api, 4, DeleteMode::Hard).await.unwrap();
    assert!(reply.is_success());
    list.set_active(&api, 3, true).await.unwrap();

    assert_eq!(
        rec.calls(),
        vec![
            "deactivate 3".to_string(),
            "delete 4".to_string(),
            "activate 3".to_string(),
        ]
    );
    assert_eq!(list.refresh_generation(), 3);
}

#[tokio::test]
async fn test_all_and_count() {
    let (base, _rec) = spawn_backend().await;
    let registry = registry();
    let spec = registry.get("skill").unwrap();
    let backend = Backend::new(&base, AuthService::with_token("abc123"));
    let api = backend.client(spec);

    assert_eq!(api.count().await.unwrap(), 12);
    let all = api.all().await.unwrap();
    let page = envelope::normalize(&all, &spec.plural_keys);
    assert_eq!(page.shape, EnvelopeShape::PluralField("skills".to_string()));
    assert_eq!(page.total, 1);
}
