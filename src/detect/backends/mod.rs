pub mod deepstack;
pub mod stub;

pub use deepstack::{DeepStackClient, DeepStackSettings, FacePrediction};
pub use stub::{StubDetector, StubResponse};
