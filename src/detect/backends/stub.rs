use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::detect::backend::ObjectDetector;
use crate::detect::result::Detection;

/// Scripted detector for tests and dry runs.
///
/// Each call pops the next scripted response. Once the script is exhausted the
/// fallback response is returned for every further call.
pub struct StubDetector {
    script: Mutex<VecDeque<StubResponse>>,
    fallback: Vec<Detection>,
}

#[derive(Clone, Debug)]
pub enum StubResponse {
    Detections(Vec<Detection>),
    Failure(String),
}

impl StubDetector {
    /// A detector that returns the same detections on every call.
    pub fn fixed(detections: Vec<Detection>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: detections,
        }
    }

    /// A detector that replays `responses` in order, then returns nothing.
    pub fn scripted(responses: Vec<StubResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            fallback: Vec::new(),
        }
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::fixed(Vec::new())
    }
}

impl ObjectDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn try_detect(&self, _image: &[u8]) -> Result<Vec<Detection>> {
        let next = self
            .script
            .lock()
            .map_err(|_| anyhow!("stub script lock poisoned"))?
            .pop_front();
        match next {
            Some(StubResponse::Detections(detections)) => Ok(detections),
            Some(StubResponse::Failure(msg)) => Err(anyhow!(msg)),
            None => Ok(self.fallback.clone()),
        }
    }
}
