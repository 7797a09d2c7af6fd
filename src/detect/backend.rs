use anyhow::Result;

use crate::detect::result::Detection;

/// Object detector seam between the pipeline and an inference service.
///
/// Implementations only provide [`ObjectDetector::try_detect`]. Callers use
/// [`ObjectDetector::detect`], which owns the failure contract: any error is
/// logged with the source id and turned into zero detections for this cycle.
/// There is no retry; the next snapshot from the camera is the retry.
pub trait ObjectDetector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on an encoded image.
    fn try_detect(&self, image: &[u8]) -> Result<Vec<Detection>>;

    /// Run detection, absorbing every failure into an empty list.
    fn detect(&self, image: &[u8], source_id: &str) -> Vec<Detection> {
        match self.try_detect(image) {
            Ok(detections) => detections,
            Err(e) => {
                log::error!(
                    "an error occurred while detection api call, backend: {}, source: {}, err: {:#}",
                    self.name(),
                    source_id,
                    e
                );
                Vec::new()
            }
        }
    }
}
