//! Face recognition over the snapshot stream.
//!
//! Runs beside the object-detection handler on the same inbound events. Faces
//! below the recognition threshold are dropped; the rest are published with a
//! JPEG crop of each face.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapter::{EventHandler, EventPublisher, SnapshotEvent};
use crate::detect::{DeepStackClient, FacePrediction};
use crate::error::ProcessError;
use crate::frame::{encode_jpeg_base64, SnapshotFrame};

/// Face recognition seam; mirrors [`crate::detect::ObjectDetector`].
pub trait FaceRecognizer: Send + Sync {
    fn try_recognize(&self, image: &[u8]) -> Result<Vec<FacePrediction>>;

    /// Recognize, absorbing every failure into an empty list.
    fn recognize(&self, image: &[u8], source_id: &str) -> Vec<FacePrediction> {
        match self.try_recognize(image) {
            Ok(faces) => faces,
            Err(e) => {
                log::error!(
                    "an error occurred while face recognition api call, source: {}, err: {:#}",
                    source_id,
                    e
                );
                Vec::new()
            }
        }
    }
}

impl FaceRecognizer for DeepStackClient {
    fn try_recognize(&self, image: &[u8]) -> Result<Vec<FacePrediction>> {
        self.recognize_faces(image)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub pred_score: f32,
    /// Position of the face in the recognition response.
    pub pred_cls_idx: u32,
    /// Recognized user id, `unknown` when the face is not registered.
    pub pred_cls_name: String,
    pub crop_base64_image: String,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceEvent {
    pub id: String,
    pub source_id: String,
    /// RFC 3339, UTC.
    pub created_at: String,
    pub detected_faces: Vec<DetectedFace>,
    pub base64_image: String,
    pub ai_clip_enabled: bool,
}

pub struct FaceHandler {
    recognizer: Arc<dyn FaceRecognizer>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
    threshold: f32,
}

impl FaceHandler {
    pub fn new(
        recognizer: Arc<dyn FaceRecognizer>,
        publisher: Arc<dyn EventPublisher>,
        topic: &str,
        threshold: f32,
    ) -> Self {
        Self {
            recognizer,
            publisher,
            topic: topic.to_string(),
            threshold,
        }
    }

    pub fn handle_event(&self, event: &SnapshotEvent) -> Result<Option<FaceEvent>, ProcessError> {
        let frame = SnapshotFrame::from_base64(&event.base64_image)
            .map_err(|e| ProcessError::malformed(format!("{:#}", e)))?;

        let faces = self.recognizer.recognize(frame.encoded(), &event.source_id);
        if faces.is_empty() {
            log::info!("image contains no face for camera: {}", event.name);
            return Ok(None);
        }

        let mut detected = Vec::with_capacity(faces.len());
        for (idx, face) in faces.into_iter().enumerate() {
            if face.confidence < self.threshold {
                log::info!(
                    "(camera {}) face score {} is lower than threshold {} for {}",
                    event.name,
                    face.confidence,
                    self.threshold,
                    face.user_id
                );
                continue;
            }
            let crop = match frame.crop(&face.bbox) {
                Ok(crop) => crop,
                Err(e) => {
                    log::warn!(
                        "(camera {}) skipping face {}: {:#}",
                        event.name,
                        face.user_id,
                        e
                    );
                    continue;
                }
            };
            detected.push(DetectedFace {
                pred_score: face.confidence,
                pred_cls_idx: idx as u32,
                pred_cls_name: face.user_id,
                crop_base64_image: encode_jpeg_base64(&crop)?,
                x1: face.bbox.x1,
                y1: face.bbox.y1,
                x2: face.bbox.x2,
                y2: face.bbox.y2,
            });
        }
        if detected.is_empty() {
            log::info!(
                "(camera {}) no face scored above the threshold, nothing published",
                event.name
            );
            return Ok(None);
        }

        let outbound = FaceEvent {
            id: Uuid::new_v4().simple().to_string(),
            source_id: event.source_id.clone(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            detected_faces: detected,
            base64_image: event.base64_image.clone(),
            ai_clip_enabled: event.ai_clip_enabled,
        };
        let payload = serde_json::to_vec(&outbound).context("serialize face event")?;
        self.publisher
            .publish(&self.topic, payload)
            .map_err(|e| ProcessError::remote(format!("publish to {}: {:#}", self.topic, e)))?;

        let names: Vec<&str> = outbound
            .detected_faces
            .iter()
            .map(|f| f.pred_cls_name.as_str())
            .collect();
        log::info!("(camera {}) face: detected {}", event.name, names.join(", "));
        Ok(Some(outbound))
    }
}

impl EventHandler for FaceHandler {
    fn name(&self) -> &'static str {
        "fr"
    }

    fn handle_payload(&self, payload: &[u8]) -> Result<(), ProcessError> {
        let event = SnapshotEvent::from_slice(payload)?;
        self.handle_event(&event)?;
        Ok(())
    }
}
