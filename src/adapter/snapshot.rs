use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveTime};

use super::{DetectionEvent, EventHandler, EventPublisher, SnapshotEvent};
use crate::detect::ObjectDetector;
use crate::error::ProcessError;
use crate::frame::SnapshotFrame;
use crate::pipeline::FilterPipeline;

/// Object-detection handler for the snapshot stream.
pub struct SnapshotHandler {
    detector: Arc<dyn ObjectDetector>,
    pipeline: Arc<FilterPipeline>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl SnapshotHandler {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        pipeline: Arc<FilterPipeline>,
        publisher: Arc<dyn EventPublisher>,
        topic: &str,
    ) -> Self {
        Self {
            detector,
            pipeline,
            publisher,
            topic: topic.to_string(),
        }
    }

    pub fn pipeline(&self) -> &Arc<FilterPipeline> {
        &self.pipeline
    }

    /// Detect, filter and publish for one decoded event.
    ///
    /// Returns the published event, or `None` when nothing survived the
    /// pipeline.
    pub fn handle_event(
        &self,
        event: &SnapshotEvent,
        now: NaiveTime,
    ) -> Result<Option<DetectionEvent>, ProcessError> {
        let frame = SnapshotFrame::from_base64(&event.base64_image)
            .map_err(|e| ProcessError::malformed(format!("{:#}", e)))?;

        let raw = self.detector.detect(frame.encoded(), &event.source_id);
        let accepted = self.pipeline.filter(raw, &event.source_id, &frame, now);
        if accepted.is_empty() {
            log::info!("(camera {}) detected nothing", event.name);
            return Ok(None);
        }

        let outbound = DetectionEvent::new(event, accepted);
        let payload = serde_json::to_vec(&outbound).context("serialize detection event")?;
        self.publisher
            .publish(&self.topic, payload)
            .map_err(|e| ProcessError::remote(format!("publish to {}: {:#}", self.topic, e)))?;

        let summary: Vec<String> = outbound
            .detections
            .iter()
            .map(|d| format!("{}:{:.2}", d.class_name, d.confidence))
            .collect();
        log::info!(
            "(camera {}) published {} detections to {}: {}",
            event.name,
            outbound.detections.len(),
            self.topic,
            summary.join(", ")
        );
        Ok(Some(outbound))
    }
}

impl EventHandler for SnapshotHandler {
    fn name(&self) -> &'static str {
        "od"
    }

    fn handle_payload(&self, payload: &[u8]) -> Result<(), ProcessError> {
        let event = SnapshotEvent::from_slice(payload)?;
        self.handle_event(&event, Local::now().time())?;
        Ok(())
    }
}
