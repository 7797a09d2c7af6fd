//! DeepStack-compatible HTTP inference client.
//!
//! Speaks the DeepStack vision API (also served by CodeProject.AI and
//! Blue Candle):
//! - `POST /v1/vision/detection` for object detection
//! - `POST /v1/vision/face/recognize` for face recognition
//!
//! Both endpoints take a multipart form with an `image` file part and a
//! `min_confidence` text part, and answer with
//! `{ "success": bool, "predictions": [...], "error": "..." }`.
//!
//! Every request is bounded by the client timeout; a timeout surfaces as an
//! ordinary error and is absorbed by [`ObjectDetector::detect`].

use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use crate::detect::backend::ObjectDetector;
use crate::detect::classes::class_index;
use crate::detect::result::{Detection, DetectionBox};

const DETECTION_PATH: &str = "/v1/vision/detection";
const FACE_RECOGNIZE_PATH: &str = "/v1/vision/face/recognize";
const MAX_RESPONSE_BYTES: u64 = 4 * 1024 * 1024;

/// Connection settings for the inference service.
#[derive(Clone, Debug)]
pub struct DeepStackSettings {
    /// Base URL without port, e.g. `http://127.0.0.1`.
    pub server_url: String,
    pub server_port: u16,
    pub api_key: Option<String>,
    /// Minimum confidence for object detection requests.
    pub od_min_confidence: f32,
    /// Minimum confidence for face recognition requests.
    pub fr_min_confidence: f32,
    pub timeout: Duration,
}

/// Raw face prediction returned by the recognition endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct FacePrediction {
    pub user_id: String,
    pub confidence: f32,
    pub bbox: DetectionBox,
}

#[derive(Debug, Deserialize)]
struct VisionResponse<P> {
    #[serde(default)]
    success: bool,
    #[serde(default = "Vec::new")]
    predictions: Vec<P>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectPrediction {
    label: String,
    confidence: f32,
    x_min: u32,
    y_min: u32,
    x_max: u32,
    y_max: u32,
}

#[derive(Debug, Deserialize)]
struct FaceRecognition {
    userid: String,
    confidence: f32,
    x_min: u32,
    y_min: u32,
    x_max: u32,
    y_max: u32,
}

pub struct DeepStackClient {
    client: Client,
    base: Url,
    api_key: Option<String>,
    od_min_confidence: f32,
    fr_min_confidence: f32,
}

impl DeepStackClient {
    pub fn new(settings: &DeepStackSettings) -> Result<Self> {
        let mut base = Url::parse(&settings.server_url)
            .with_context(|| format!("parse inference server url '{}'", settings.server_url))?;
        base.set_port(Some(settings.server_port))
            .map_err(|_| anyhow!("inference server url cannot carry a port"))?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build inference http client")?;
        Ok(Self {
            client,
            base,
            api_key: settings.api_key.clone(),
            od_min_confidence: settings.od_min_confidence,
            fr_min_confidence: settings.fr_min_confidence,
        })
    }

    pub fn detection_url(&self) -> Result<Url> {
        self.base.join(DETECTION_PATH).context("build detection url")
    }

    pub fn face_recognize_url(&self) -> Result<Url> {
        self.base
            .join(FACE_RECOGNIZE_PATH)
            .context("build face recognition url")
    }

    /// Call the face recognition endpoint.
    pub fn recognize_faces(&self, image: &[u8]) -> Result<Vec<FacePrediction>> {
        let url = self.face_recognize_url()?;
        let response: VisionResponse<FaceRecognition> =
            self.post_image(url, image, self.fr_min_confidence)?;
        let predictions = check_success(response)?;
        let mut faces = Vec::with_capacity(predictions.len());
        for p in predictions {
            match DetectionBox::new(p.x_min, p.y_min, p.x_max, p.y_max) {
                Ok(bbox) => faces.push(FacePrediction {
                    user_id: p.userid,
                    confidence: p.confidence,
                    bbox,
                }),
                Err(e) => log::warn!("dropping face prediction for {}: {}", p.userid, e),
            }
        }
        Ok(faces)
    }

    fn post_image<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        image: &[u8],
        min_confidence: f32,
    ) -> Result<T> {
        let image_part = Part::bytes(image.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .context("build image part")?;
        let mut form = Form::new()
            .part("image", image_part)
            .text("min_confidence", min_confidence.to_string());
        if let Some(key) = &self.api_key {
            form = form.text("api_key", key.clone());
        }

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .map_err(|e| anyhow!("inference transport error: {}", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("inference service returned HTTP {}", status));
        }

        let reader = response.take(MAX_RESPONSE_BYTES);
        serde_json::from_reader(reader).context("decode inference response JSON")
    }
}

impl ObjectDetector for DeepStackClient {
    fn name(&self) -> &'static str {
        "deepstack"
    }

    fn try_detect(&self, image: &[u8]) -> Result<Vec<Detection>> {
        let url = self.detection_url()?;
        let response: VisionResponse<ObjectPrediction> =
            self.post_image(url, image, self.od_min_confidence)?;
        Ok(predictions_to_detections(check_success(response)?))
    }
}

fn check_success<P>(response: VisionResponse<P>) -> Result<Vec<P>> {
    if !response.success {
        return Err(anyhow!(
            "inference service reported failure: {}",
            response.error.as_deref().unwrap_or("no error message")
        ));
    }
    Ok(response.predictions)
}

fn predictions_to_detections(predictions: Vec<ObjectPrediction>) -> Vec<Detection> {
    let mut detections = Vec::with_capacity(predictions.len());
    for p in predictions {
        let Some(class_idx) = class_index(&p.label) else {
            log::warn!("dropping prediction with unknown label '{}'", p.label);
            continue;
        };
        match DetectionBox::new(p.x_min, p.y_min, p.x_max, p.y_max) {
            Ok(bbox) => detections.push(Detection {
                class_name: p.label,
                class_idx,
                confidence: p.confidence.clamp(0.0, 1.0),
                bbox,
            }),
            Err(e) => log::warn!("dropping {} prediction: {}", p.label, e),
        }
    }
    detections
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    fn settings() -> DeepStackSettings {
        DeepStackSettings {
            server_url: "http://127.0.0.1".to_string(),
            server_port: 5000,
            api_key: None,
            od_min_confidence: 0.4,
            fr_min_confidence: 0.7,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn builds_endpoint_urls_with_port() -> Result<()> {
        let client = DeepStackClient::new(&settings())?;
        assert_eq!(
            client.detection_url()?.as_str(),
            "http://127.0.0.1:5000/v1/vision/detection"
        );
        assert_eq!(
            client.face_recognize_url()?.as_str(),
            "http://127.0.0.1:5000/v1/vision/face/recognize"
        );
        Ok(())
    }

    #[test]
    fn rejects_malformed_server_url() {
        let mut s = settings();
        s.server_url = "not a url".to_string();
        assert!(DeepStackClient::new(&s).is_err());
    }

    #[test]
    fn maps_predictions_and_drops_unknown_or_degenerate() -> Result<()> {
        let raw = r#"{
            "success": true,
            "predictions": [
                {"label": "person", "confidence": 0.91, "x_min": 10, "y_min": 20, "x_max": 50, "y_max": 90},
                {"label": "gremlin", "confidence": 0.99, "x_min": 0, "y_min": 0, "x_max": 5, "y_max": 5},
                {"label": "car", "confidence": 0.75, "x_min": 30, "y_min": 30, "x_max": 30, "y_max": 40}
            ]
        }"#;
        let response: VisionResponse<ObjectPrediction> = serde_json::from_str(raw)?;
        let detections = predictions_to_detections(check_success(response)?);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_name, "person");
        assert_eq!(detections[0].class_idx, 0);
        assert_eq!(detections[0].bbox, DetectionBox::new(10, 20, 50, 90)?);
        Ok(())
    }

    #[test]
    fn unsuccessful_response_is_an_error() -> Result<()> {
        let raw = r#"{"success": false, "error": "invalid image"}"#;
        let response: VisionResponse<ObjectPrediction> = serde_json::from_str(raw)?;
        let err = check_success(response).unwrap_err();
        assert!(err.to_string().contains("invalid image"));
        Ok(())
    }

    #[test]
    fn unreachable_service_yields_no_detections() -> Result<()> {
        let mut s = settings();
        // Port 9 (discard) on loopback is closed in test environments.
        s.server_port = 9;
        s.timeout = Duration::from_millis(200);
        let client = DeepStackClient::new(&s)?;
        assert!(client.detect(b"not an image", "cam-1").is_empty());
        Ok(())
    }

    #[test]
    fn silent_service_times_out_with_no_detections() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let (release, hold) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            // Accept and never answer; hold the socket open until released.
            let accepted = listener.accept();
            let _ = hold.recv();
            drop(accepted);
        });

        let mut s = settings();
        s.server_port = port;
        s.timeout = Duration::from_millis(500);
        let client = DeepStackClient::new(&s)?;

        let started = Instant::now();
        let detections = client.detect(b"\xff\xd8 not really a jpeg", "cam-1");
        let elapsed = started.elapsed();

        assert!(detections.is_empty());
        assert!(elapsed >= Duration::from_millis(400), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);

        let _ = release.send(());
        let _ = server.join();
        Ok(())
    }
}
