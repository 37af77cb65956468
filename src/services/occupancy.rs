use std::sync::Arc;

use axum::body::Bytes;
use image::RgbImage;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::db::ClassroomStore;
use crate::detect::{BoundingBox, DetectError, DetectionParams, Detector};
use crate::error::AppError;
use crate::models::{Classroom, ClassroomPatch};
use crate::render::{annotate, encode_jpeg, overlay_label};

/// Image submitted by a classroom camera.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub device_id: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Annotated {
        jpeg: Vec<u8>,
        detected: usize,
        occupancy: i64,
        capacity: i64,
    },
    /// Decoding, detection or encoding failed. The upload is echoed back
    /// untouched and occupancy is not updated.
    Fallback {
        original: Bytes,
        content_type: Option<String>,
    },
}

#[derive(Debug, Error)]
enum PipelineFault {
    #[error("image decode failed: {0}")]
    Decode(image::ImageError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("image encode failed: {0}")]
    Encode(image::ImageError),

    #[error("blocking task failed: {0}")]
    Task(#[from] JoinError),
}

/// Caps a detected head count at the classroom capacity.
pub fn clamp_occupancy(detected: usize, capacity: i64) -> i64 {
    i64::try_from(detected)
        .unwrap_or(i64::MAX)
        .min(capacity)
        .max(0)
}

pub struct OccupancyPipeline {
    store: Arc<dyn ClassroomStore>,
    detector: Arc<dyn Detector>,
    params: DetectionParams,
}

impl OccupancyPipeline {
    pub fn new(
        store: Arc<dyn ClassroomStore>,
        detector: Arc<dyn Detector>,
        params: DetectionParams,
    ) -> Self {
        Self {
            store,
            detector,
            params,
        }
    }

    /// Validates the device binding, then counts people in the upload and
    /// stores the clamped count as the new occupancy.
    ///
    /// Only lookup and device checks produce errors. Every later failure
    /// degrades to [`PipelineOutcome::Fallback`].
    pub async fn process(
        &self,
        class_id: &str,
        upload: ImageUpload,
    ) -> Result<PipelineOutcome, AppError> {
        let classroom = self
            .store
            .get_by_class_id(class_id)
            .await?
            .ok_or_else(AppError::classroom_not_found)?;

        if classroom.device_id != upload.device_id {
            return Err(AppError::BadRequest(
                "deviceId does not match classroom".to_string(),
            ));
        }

        match self.detect_and_render(classroom, upload.bytes.clone()).await {
            Ok(outcome) => Ok(outcome),
            Err(fault) => {
                warn!(
                    "occupancy update skipped for {} ({}), returning original image",
                    class_id, fault
                );
                Ok(PipelineOutcome::Fallback {
                    original: upload.bytes,
                    content_type: upload.content_type,
                })
            }
        }
    }

    async fn detect_and_render(
        &self,
        classroom: Classroom,
        bytes: Bytes,
    ) -> Result<PipelineOutcome, PipelineFault> {
        let mut image = tokio::task::spawn_blocking(move || decode(&bytes))
            .await?
            .map_err(PipelineFault::Decode)?;

        let detections = self.detector.detect(&image, &self.params).await?;
        let persons: Vec<BoundingBox> = detections
            .iter()
            .filter(|d| d.is_person())
            .map(|d| d.bbox)
            .collect();
        let detected = persons.len();
        debug!(
            "{} returned {} detections, {} persons for {}",
            self.detector.name(),
            detections.len(),
            detected,
            classroom.class_id
        );

        let occupancy = clamp_occupancy(detected, classroom.capacity);
        if occupancy < detected as i64 {
            warn!(
                "{} detected {} persons but capacity is {}; storing {}",
                classroom.class_id, detected, classroom.capacity, occupancy
            );
        }

        let current = self.persist(classroom, occupancy).await;
        let label = overlay_label(detected, current.occupancy, current.capacity);

        let jpeg = tokio::task::spawn_blocking(move || {
            annotate(&mut image, &persons, &label);
            encode_jpeg(&image)
        })
        .await?
        .map_err(PipelineFault::Encode)?;

        Ok(PipelineOutcome::Annotated {
            jpeg,
            detected,
            occupancy: current.occupancy,
            capacity: current.capacity,
        })
    }

    /// Writes the new occupancy and re-reads the record. Store failures are
    /// logged and the last readable record is returned instead.
    async fn persist(&self, classroom: Classroom, occupancy: i64) -> Classroom {
        let class_id = classroom.class_id.clone();

        match self
            .store
            .update_partial(&class_id, &ClassroomPatch::occupancy(occupancy))
            .await
        {
            Ok(Some(_)) => info!("occupancy of {} set to {}", class_id, occupancy),
            Ok(None) => warn!("{} vanished before occupancy could be stored", class_id),
            Err(e) => warn!("failed to store occupancy for {}: {}", class_id, e),
        }

        match self.store.get_by_class_id(&class_id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) | Err(_) => classroom,
        }
    }
}

fn decode(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.into_rgb8())
}
