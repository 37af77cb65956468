use async_trait::async_trait;
use image::RgbImage;
use reqwest::{Client, Url, header::CONTENT_TYPE};
use serde::Deserialize;

use crate::detect::{BoundingBox, DetectError, Detection, DetectionParams, Detector};
use crate::error::AppError;
use crate::render::encode_jpeg;

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<RemoteDetection>,
}

#[derive(Debug, Deserialize)]
struct RemoteDetection {
    label: String,
    confidence: f32,
    #[serde(rename = "box")]
    bbox: [f32; 4],
}

impl From<RemoteDetection> for Detection {
    fn from(d: RemoteDetection) -> Self {
        let [x1, y1, x2, y2] = d.bbox;
        Detection {
            label: d.label,
            confidence: d.confidence,
            bbox: BoundingBox { x1, y1, x2, y2 },
        }
    }
}

/// Sends JPEG-encoded frames to a remote inference service.
///
/// `POST {base}/detect?imgsz=&conf=&iou=&augment=` with an `image/jpeg` body,
/// answered by `{"detections": [{"label", "confidence", "box": [x1, y1, x2, y2]}]}`.
pub struct HttpDetector {
    client: Client,
    endpoint: Url,
}

impl HttpDetector {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let endpoint = Url::parse(&format!("{}/detect", base_url.trim_end_matches('/')))
            .map_err(|e| AppError::Config(format!("invalid DETECTOR_URL {}: {}", base_url, e)))?;
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, endpoint })
    }

    fn request_url(&self, params: &DetectionParams) -> Result<Url, DetectError> {
        Url::parse_with_params(
            self.endpoint.as_str(),
            &[
                ("imgsz", params.image_size.to_string()),
                ("conf", params.confidence.to_string()),
                ("iou", params.iou.to_string()),
                ("augment", params.augment.to_string()),
            ],
        )
        .map_err(|e| DetectError::InvalidResponse(format!("bad request url: {}", e)))
    }
}

#[async_trait]
impl Detector for HttpDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn detect(
        &self,
        image: &RgbImage,
        params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectError> {
        let body = encode_jpeg(image)?;
        let url = self.request_url(params)?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DetectError::InvalidResponse(format!(
                "detector returned {}: {}",
                status, text
            )));
        }

        let parsed: DetectResponse = response.json().await?;
        tracing::debug!("remote detector returned {} detections", parsed.detections.len());
        Ok(parsed.detections.into_iter().map(Detection::from).collect())
    }
}
