//! Wire schemas for the snapshot stream.

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::error::ProcessError;

/// Channel tag carried by every outbound detection event.
pub const DETECTION_CHANNEL: &str = "od_service";
/// Logical downstream queue for detection events.
pub const DETECTION_LIST_NAME: &str = "detected_objects";

/// Inbound snapshot event.
///
/// Producers disagree on field names, so `source` is accepted for
/// `source_id` and `img` for `base64_image`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SnapshotEvent {
    /// Camera display name.
    pub name: String,
    /// Camera identifier; the policy store is keyed by it.
    #[serde(alias = "source")]
    pub source_id: String,
    #[serde(alias = "img")]
    pub base64_image: String,
    #[serde(default)]
    pub ai_clip_enabled: bool,
}

impl SnapshotEvent {
    pub fn from_slice(payload: &[u8]) -> Result<Self, ProcessError> {
        serde_json::from_slice(payload).map_err(ProcessError::malformed)
    }
}

/// Outbound detection event published for a non-empty filtered batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub name: String,
    pub source: String,
    /// The inbound base64 image, unmodified.
    pub img: String,
    pub ai_clip_enabled: bool,
    pub detections: Vec<Detection>,
    pub channel: String,
    pub list_name: String,
}

impl DetectionEvent {
    pub fn new(snapshot: &SnapshotEvent, detections: Vec<Detection>) -> Self {
        Self {
            name: snapshot.name.clone(),
            source: snapshot.source_id.clone(),
            img: snapshot.base64_image.clone(),
            ai_clip_enabled: snapshot.ai_clip_enabled,
            detections,
            channel: DETECTION_CHANNEL.to_string(),
            list_name: DETECTION_LIST_NAME.to_string(),
        }
    }
}

/// Best-effort camera name from a payload that may not decode fully.
pub(crate) fn peek_camera_name(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value.get("name")?.as_str().map(str::to_string)
}
