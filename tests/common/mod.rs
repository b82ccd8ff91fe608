#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};

use matslot::materials::types::Material;

/// A recorded request: query string pairs plus a few headers of interest.
#[derive(Debug, Clone, Default)]
pub struct Seen {
    pub query: HashMap<String, String>,
    pub cache_control: Option<String>,
    pub apikey: Option<String>,
    pub authorization: Option<String>,
}

impl Seen {
    fn from_parts(query: HashMap<String, String>, headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        Self {
            query,
            cache_control: header("cache-control"),
            apikey: header("apikey"),
            authorization: header("authorization"),
        }
    }
}

/// In-memory stand-in for the portal backend and the hosted table API.
#[derive(Default)]
pub struct FakePortal {
    pub base_url: Mutex<String>,
    pub materials: Mutex<Vec<Material>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub table_rows: Mutex<Vec<Material>>,
    pub courses: Mutex<Value>,

    pub uploads: Mutex<Vec<Value>>,
    pub deletes: Mutex<Vec<Value>>,
    pub list_requests: Mutex<Vec<Seen>>,
    pub table_requests: Mutex<Vec<Seen>>,
    pub course_requests: Mutex<Vec<Seen>>,

    pub fail_list: AtomicBool,
    pub reject_uploads: AtomicBool,
}

impl FakePortal {
    pub fn seed(&self, material: Material, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(material.storage_path.clone(), bytes.to_vec());
        self.materials.lock().unwrap().push(material);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn reject_uploads(&self, reject: bool) {
        self.reject_uploads.store(reject, Ordering::SeqCst);
    }
}

type Shared = Arc<FakePortal>;

async fn upload(State(portal): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    portal.uploads.lock().unwrap().push(body.clone());
    if portal.reject_uploads.load(Ordering::SeqCst) {
        return Json(json!({"success": false, "message": "Storage quota exceeded"}));
    }

    let field = |name: &str| body[name].as_str().unwrap_or_default().to_string();
    let bytes = BASE64.decode(field("file_base64")).unwrap_or_default();
    let storage_path = format!("{}/{}", field("course"), field("filename"));
    let material = Material {
        storage_path: storage_path.clone(),
        material_name: Some(field("title")),
        filename: Some(field("filename")),
        size_bytes: Some(bytes.len() as f64),
        programme: Some(field("programme")),
        level: Some(field("level")),
        course_code: Some(field("course")),
    };
    portal.files.lock().unwrap().insert(storage_path, bytes);
    portal.materials.lock().unwrap().push(material);
    Json(json!({"success": true}))
}

async fn list(
    State(portal): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let course = query.get("course_code").cloned();
    portal
        .list_requests
        .lock()
        .unwrap()
        .push(Seen::from_parts(query, &headers));
    if portal.fail_list.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "database unavailable"})),
        )
            .into_response();
    }
    let rows: Vec<Material> = portal
        .materials
        .lock()
        .unwrap()
        .iter()
        .filter(|m| course.is_none() || m.course_code == course)
        .cloned()
        .collect();
    Json(rows).into_response()
}

async fn delete(State(portal): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    portal.deletes.lock().unwrap().push(body.clone());
    let path = body["storage_path"].as_str().unwrap_or_default().to_string();
    let mut materials = portal.materials.lock().unwrap();
    let before = materials.len();
    materials.retain(|m| m.storage_path != path);
    if materials.len() == before {
        return Json(json!({"success": false, "message": "Material not found"}));
    }
    Json(json!({"success": true}))
}

async fn view(State(portal): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let path = body["storage_path"].as_str().unwrap_or_default().to_string();
    if !portal.files.lock().unwrap().contains_key(&path) {
        return Json(json!({"success": false, "message": "Object not found"}));
    }
    let base = portal.base_url.lock().unwrap().clone();
    Json(json!({"success": true, "signedURL": format!("{}/files/{}", base, path)}))
}

async fn file(State(portal): State<Shared>, Path(path): Path<String>) -> Response {
    match portal.files.lock().unwrap().get(&path) {
        Some(bytes) => bytes.clone().into_response(),
        None => (StatusCode::NOT_FOUND, "missing").into_response(),
    }
}

async fn courses(
    State(portal): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    portal
        .course_requests
        .lock()
        .unwrap()
        .push(Seen::from_parts(query, &headers));
    Json(portal.courses.lock().unwrap().clone())
}

async fn table(
    State(portal): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let seen = Seen::from_parts(query, &headers);
    let authorized = seen.apikey.as_deref().is_some_and(|k| !k.is_empty());
    portal.table_requests.lock().unwrap().push(seen);
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "No API key found in request"})),
        )
            .into_response();
    }
    Json(portal.table_rows.lock().unwrap().clone()).into_response()
}

/// Serve the fake portal on an ephemeral port. Returns its base URL.
pub async fn spawn_portal() -> (String, Arc<FakePortal>) {
    let portal = Arc::new(FakePortal::default());
    let app = Router::new()
        .route("/api/admin/materials", post(upload).delete(delete))
        .route("/api/materials", get(list))
        .route("/api/student/materials/view", post(view))
        .route("/api/admin/courses", get(courses))
        .route("/files/{*path}", get(file))
        .route("/rest/v1/materials", get(table))
        .with_state(Arc::clone(&portal));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve app");
    });

    let base = format!("http://{}", addr);
    *portal.base_url.lock().unwrap() = base.clone();
    (base, portal)
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
