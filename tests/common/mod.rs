#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use image::{Rgb, RgbImage};
use serde_json::Value;
use smartclass_backend::api::router;
use smartclass_backend::db::{ClassroomStore, SqliteClassroomStore};
use smartclass_backend::detect::{BoundingBox, DetectError, Detection, DetectionParams, Detector};
use smartclass_backend::error::AppError;
use smartclass_backend::models::{Classroom, ClassroomPatch, CreateClassroomRequest};
use smartclass_backend::render::encode_jpeg;
use smartclass_backend::state::AppState;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

pub const BOUNDARY: &str = "smartclass-test-boundary";

pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub async fn sqlite_store() -> Arc<SqliteClassroomStore> {
    Arc::new(SqliteClassroomStore::new(setup_test_db().await, 1000))
}

pub fn app(store: Arc<dyn ClassroomStore>, detector: Arc<dyn Detector>) -> Router {
    router(AppState::new(store, detector))
}

pub fn app_with_upload_limit(
    store: Arc<dyn ClassroomStore>,
    detector: Arc<dyn Detector>,
    max_upload_bytes: usize,
) -> Router {
    router(AppState::new(store, detector).with_max_upload_bytes(max_upload_bytes))
}

/// Returns a fixed set of detections for every image.
pub struct StubDetector {
    pub detections: Vec<Detection>,
}

impl StubDetector {
    pub fn with_people(people: usize, others: usize) -> Self {
        let mut detections = Vec::new();
        for i in 0..people {
            detections.push(detection("person", i));
        }
        for i in 0..others {
            detections.push(detection("chair", i));
        }
        Self { detections }
    }
}

fn detection(label: &str, i: usize) -> Detection {
    let x = (i % 6) as f32 * 10.0;
    let y = (i / 6) as f32 * 20.0;
    Detection {
        label: label.to_string(),
        confidence: 0.8,
        bbox: BoundingBox {
            x1: x,
            y1: y,
            x2: x + 8.0,
            y2: y + 16.0,
        },
    }
}

#[async_trait]
impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn detect(
        &self,
        _image: &RgbImage,
        _params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectError> {
        Ok(self.detections.clone())
    }
}

pub struct FailingDetector;

#[async_trait]
impl Detector for FailingDetector {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn detect(
        &self,
        _image: &RgbImage,
        _params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectError> {
        Err(DetectError::Model("inference exploded".to_string()))
    }
}

/// Delegates to SQLite but refuses every partial update.
pub struct ReadOnlyStore {
    pub inner: Arc<SqliteClassroomStore>,
}

#[async_trait]
impl ClassroomStore for ReadOnlyStore {
    async fn create(&self, req: &CreateClassroomRequest) -> Result<String, AppError> {
        self.inner.create(req).await
    }

    async fn get_by_class_id(&self, class_id: &str) -> Result<Option<Classroom>, AppError> {
        self.inner.get_by_class_id(class_id).await
    }

    async fn list(&self) -> Result<Vec<Classroom>, AppError> {
        self.inner.list().await
    }

    async fn update_partial(
        &self,
        _class_id: &str,
        _patch: &ClassroomPatch,
    ) -> Result<Option<Classroom>, AppError> {
        Err(AppError::StoreUnavailable)
    }

    async fn delete(&self, class_id: &str) -> Result<bool, AppError> {
        self.inner.delete(class_id).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }
}

/// Every operation fails as if the database were unreachable.
pub struct DownStore;

#[async_trait]
impl ClassroomStore for DownStore {
    async fn create(&self, _req: &CreateClassroomRequest) -> Result<String, AppError> {
        Err(AppError::StoreUnavailable)
    }

    async fn get_by_class_id(&self, _class_id: &str) -> Result<Option<Classroom>, AppError> {
        Err(AppError::StoreUnavailable)
    }

    async fn list(&self) -> Result<Vec<Classroom>, AppError> {
        Err(AppError::StoreUnavailable)
    }

    async fn update_partial(
        &self,
        _class_id: &str,
        _patch: &ClassroomPatch,
    ) -> Result<Option<Classroom>, AppError> {
        Err(AppError::StoreUnavailable)
    }

    async fn delete(&self, _class_id: &str) -> Result<bool, AppError> {
        Err(AppError::StoreUnavailable)
    }

    async fn ping(&self) -> Result<(), AppError> {
        Err(AppError::StoreUnavailable)
    }
}

pub const STORE_UNAVAILABLE_MESSAGE: &str =
    "Record store unavailable. Check the database connection and try again.";

pub async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("Failed to build request");

    let response = app.clone().oneshot(request).await.expect("Request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Body was not JSON")
    };
    (status, json)
}

pub async fn create_classroom(app: &Router, class_id: &str, device_id: &str, capacity: i64) {
    let (status, body) = send_json(
        app,
        "POST",
        "/classrooms",
        Some(serde_json::json!({
            "classId": class_id,
            "deviceId": device_id,
            "capacity": capacity,
            "occupancy": 0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create failed: {}", body);
}

pub async fn stored_occupancy(app: &Router, class_id: &str) -> i64 {
    let (status, body) = send_json(app, "GET", &format!("/classrooms/{}", class_id), None).await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["classroom"]["occupancy"]
        .as_i64()
        .expect("occupancy missing")
}

pub fn sample_jpeg() -> Vec<u8> {
    let image = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
    encode_jpeg(&image).expect("Failed to encode test image")
}

pub fn multipart_body(device_id: Option<&str>, file: Option<(&[u8], &str)>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(device_id) = device_id {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"deviceId\"\r\n\r\n{}\r\n",
                BOUNDARY, device_id
            )
            .as_bytes(),
        );
    }
    if let Some((bytes, content_type)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"frame.jpg\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn upload(app: &Router, class_id: &str, body: Vec<u8>) -> axum::response::Response {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/classrooms/{}/image", class_id))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .expect("Failed to build request");

    app.clone().oneshot(request).await.expect("Request failed")
}
