mod backend;
mod backends;
pub mod classes;
mod result;

pub use backend::ObjectDetector;
pub use backends::{DeepStackClient, DeepStackSettings, FacePrediction, StubDetector, StubResponse};
pub use result::{Detection, DetectionBox};
