use axum::extract::{DefaultBodyLimit, Multipart, Path};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use tracing::info;

use crate::error::{AppError, AppJson};
use crate::models::*;
use crate::services::{ImageUpload, OccupancyPipeline, PipelineOutcome};
use crate::state::AppState;

const X_DETECTED_PERSONS: &str = "x-detected-persons";
const X_OCCUPANCY: &str = "x-occupancy";

#[derive(Serialize)]
struct CreatedData {
    id: String,
}

#[derive(Serialize)]
struct ClassroomData {
    classroom: Classroom,
}

#[derive(Serialize)]
struct ClassroomListData {
    classrooms: Vec<Classroom>,
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/classrooms", get(list_classrooms).post(create_classroom))
        .route(
            "/classrooms/{class_id}",
            get(get_classroom)
                .put(update_classroom)
                .delete(delete_classroom),
        )
        .route(
            "/classrooms/{class_id}/image",
            post(upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<ApiResponse<()>>, AppError> {
    state.store.ping().await?;
    Ok(Json(ApiResponse::ok_empty("ok")))
}

async fn create_classroom(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateClassroomRequest>,
) -> Result<Json<ApiResponse<CreatedData>>, AppError> {
    req.validate()?;

    if state.store.get_by_class_id(&req.class_id).await?.is_some() {
        return Err(AppError::Conflict("classId already exists".to_string()));
    }

    let id = state.store.create(&req).await?;
    info!("created classroom {} ({})", req.class_id, id);

    Ok(Json(ApiResponse::ok("classroom created", CreatedData { id })))
}

async fn list_classrooms(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ClassroomListData>>, AppError> {
    let classrooms = state.store.list().await?;
    Ok(Json(ApiResponse::ok("ok", ClassroomListData { classrooms })))
}

async fn get_classroom(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
) -> Result<Json<ApiResponse<ClassroomData>>, AppError> {
    let classroom = state
        .store
        .get_by_class_id(&class_id)
        .await?
        .ok_or_else(AppError::classroom_not_found)?;
    Ok(Json(ApiResponse::ok("ok", ClassroomData { classroom })))
}

async fn update_classroom(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    AppJson(req): AppJson<UpdateClassroomRequest>,
) -> Result<Json<ApiResponse<ClassroomData>>, AppError> {
    req.validate()?;

    if req.touches_limits() {
        let current = state
            .store
            .get_by_class_id(&class_id)
            .await?
            .ok_or_else(AppError::classroom_not_found)?;
        req.check_against(&current)?;
    }

    let classroom = state
        .store
        .update_partial(&class_id, &ClassroomPatch::from(req))
        .await?
        .ok_or_else(AppError::classroom_not_found)?;
    Ok(Json(ApiResponse::ok("updated", ClassroomData { classroom })))
}

async fn delete_classroom(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    if !state.store.delete(&class_id).await? {
        return Err(AppError::classroom_not_found());
    }
    info!("deleted classroom {}", class_id);
    Ok(Json(ApiResponse::ok_empty("deleted")))
}

async fn upload_image(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let upload = read_upload(multipart).await?;
    let pipeline = OccupancyPipeline::new(
        state.store.clone(),
        state.detector.clone(),
        state.detection,
    );

    let response = match pipeline.process(&class_id, upload).await? {
        PipelineOutcome::Annotated {
            jpeg,
            detected,
            occupancy,
            ..
        } => (
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg")),
                (HeaderName::from_static(X_DETECTED_PERSONS), HeaderValue::from(detected)),
                (HeaderName::from_static(X_OCCUPANCY), HeaderValue::from(occupancy)),
            ],
            jpeg,
        )
            .into_response(),
        PipelineOutcome::Fallback {
            original,
            content_type,
        } => {
            let content_type = content_type
                .and_then(|ct| HeaderValue::from_str(&ct).ok())
                .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
            ([(header::CONTENT_TYPE, content_type)], original).into_response()
        }
    };

    Ok(response)
}

/// Pulls the `deviceId` text field and the image file part out of the form.
async fn read_upload(mut multipart: Multipart) -> Result<ImageUpload, AppError> {
    let mut device_id = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("deviceId") => device_id = Some(field.text().await?),
            Some("file") => {
                let content_type = field.content_type().map(str::to_string);
                file = Some((field.bytes().await?, content_type));
            }
            _ => {}
        }
    }

    let device_id =
        device_id.ok_or_else(|| AppError::BadRequest("deviceId is required".to_string()))?;
    let (bytes, content_type) =
        file.ok_or_else(|| AppError::BadRequest("file is required".to_string()))?;

    Ok(ImageUpload {
        device_id,
        bytes,
        content_type,
    })
}
