use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgb, RgbImage, imageops};
use tract_onnx::prelude::*;

use crate::detect::{
    BoundingBox, COCO_CLASSES, DetectError, Detection, DetectionParams, Detector,
    non_max_suppression,
};

type Plan = TypedRunnableModel<TypedModel>;

const LETTERBOX_FILL: Rgb<u8> = Rgb([114, 114, 114]);

/// Local YOLOv8 ONNX inference through tract.
///
/// The model is loaded and optimized once for a square `input_size` input and
/// shared by every request. Inference runs on the blocking pool.
pub struct TractDetector {
    model: Arc<Plan>,
    input_size: u32,
}

impl TractDetector {
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self, DetectError> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| {
                DetectError::Model(format!(
                    "failed to load ONNX model from {}: {}",
                    model_path.display(),
                    e
                ))
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| DetectError::Model(format!("failed to prepare ONNX model: {}", e)))?;

        Ok(Self {
            model: Arc::new(model),
            input_size,
        })
    }
}

#[async_trait]
impl Detector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    async fn detect(
        &self,
        image: &RgbImage,
        params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectError> {
        if params.image_size != self.input_size {
            tracing::debug!(
                "requested input size {} differs from loaded model size {}",
                params.image_size,
                self.input_size
            );
        }

        let model = Arc::clone(&self.model);
        let input_size = self.input_size;
        let image = image.clone();
        let params = *params;

        tokio::task::spawn_blocking(move || run_detection(&model, input_size, &image, &params))
            .await
            .map_err(|e| DetectError::Model(format!("inference task failed: {}", e)))?
    }
}

fn run_detection(
    model: &Plan,
    input_size: u32,
    image: &RgbImage,
    params: &DetectionParams,
) -> Result<Vec<Detection>, DetectError> {
    let mut detections = infer(model, input_size, image, params.confidence)?;

    if params.augment {
        let flipped = imageops::flip_horizontal(image);
        let width = image.width() as f32;
        detections.extend(
            infer(model, input_size, &flipped, params.confidence)?
                .into_iter()
                .map(|mut d| {
                    let (x1, x2) = (width - d.bbox.x2, width - d.bbox.x1);
                    d.bbox.x1 = x1;
                    d.bbox.x2 = x2;
                    d
                }),
        );
    }

    Ok(non_max_suppression(detections, params.iou))
}

struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let (w, h) = image.dimensions();
    let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);
    let resized = imageops::resize(image, new_w, new_h, imageops::FilterType::Triangle);

    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, LETTERBOX_FILL);
    imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

fn infer(
    model: &Plan,
    input_size: u32,
    image: &RgbImage,
    confidence: f32,
) -> Result<Vec<Detection>, DetectError> {
    let (canvas, lb) = letterbox(image, input_size);
    let size = input_size as usize;
    let input: Tensor = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
    .into();

    let outputs = model
        .run(tvec!(input.into()))
        .map_err(|e| DetectError::Model(format!("ONNX inference failed: {}", e)))?;
    let output = outputs
        .first()
        .ok_or_else(|| DetectError::Model("model produced no outputs".to_string()))?;
    let view = output
        .to_array_view::<f32>()
        .map_err(|e| DetectError::Model(format!("model output tensor was not f32: {}", e)))?
        .into_dimensionality::<tract_ndarray::Ix3>()
        .map_err(|e| DetectError::Model(format!("unexpected output rank: {}", e)))?;

    // [1, 4 + classes, anchors]: cx, cy, w, h then one score per class.
    let (_, rows, anchors) = view.dim();
    if rows <= 4 {
        return Err(DetectError::Model(format!(
            "unexpected output shape {:?}",
            view.shape()
        )));
    }
    let classes = rows - 4;
    let (img_w, img_h) = (image.width() as f32, image.height() as f32);

    let mut detections = Vec::new();
    for i in 0..anchors {
        let (class_idx, score) = (0..classes)
            .map(|c| (c, view[[0, 4 + c, i]]))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < confidence {
            continue;
        }

        let cx = view[[0, 0, i]];
        let cy = view[[0, 1, i]];
        let bw = view[[0, 2, i]];
        let bh = view[[0, 3, i]];
        let unmap_x = |v: f32| ((v - lb.pad_x) / lb.scale).clamp(0.0, img_w);
        let unmap_y = |v: f32| ((v - lb.pad_y) / lb.scale).clamp(0.0, img_h);

        detections.push(Detection {
            label: COCO_CLASSES
                .get(class_idx)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("class_{}", class_idx)),
            confidence: score,
            bbox: BoundingBox {
                x1: unmap_x(cx - bw / 2.0),
                y1: unmap_y(cy - bh / 2.0),
                x2: unmap_x(cx + bw / 2.0),
                y2: unmap_y(cy + bh / 2.0),
            },
        });
    }

    Ok(detections)
}
