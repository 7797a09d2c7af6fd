//! Object Detection Sentinel
//!
//! Post-processing for a camera snapshot stream: raw detections from a
//! DeepStack-compatible inference service are filtered against per-camera
//! policy, repeats of an unchanged object are suppressed, and what remains is
//! published back onto the bus as a detection event.
//!
//! # Architecture
//!
//! ```text
//! snapshot event -> adapter decode -> detector -> pipeline -> adapter encode -> publish
//!                                                 (policy store + dedup cache)
//! ```
//!
//! The service favours availability over reporting: a failed inference call
//! yields zero detections, a malformed event is logged and dropped, and a
//! failure in one camera's unit of work never reaches the subscriber loop.
//!
//! # Module Structure
//!
//! - `detect`: Detection model, COCO-80 class table, detector backends
//! - `policy`: CameraPolicy predicates, polygons, time windows, PolicyStore
//! - `dedup`: Perceptual descriptors and the repeat-suppression cache
//! - `pipeline`: FilterPipeline combining policy and dedup
//! - `adapter`: Wire schemas, per-event dispatch, topic routing
//! - `face`: Face recognition handler
//! - `transport`: MQTT endpoint parsing, subscriber loop, publisher
//! - `config`: Service configuration loading

pub mod adapter;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod error;
pub mod face;
pub mod frame;
pub mod pipeline;
pub mod policy;
pub mod transport;

pub use adapter::{
    on_snapshot_event, BusFrame, DetectionEvent, EventHandler, EventPublisher, EventRouter,
    MemoryPublisher, SnapshotEvent, SnapshotHandler,
};
pub use dedup::{AlgorithmKind, DedupCache, DedupDecision, Descriptor, SimilarityAlgorithm};
pub use detect::{DeepStackClient, Detection, DetectionBox, ObjectDetector, StubDetector};
pub use error::ProcessError;
pub use face::{FaceEvent, FaceHandler, FaceRecognizer};
pub use frame::SnapshotFrame;
pub use pipeline::FilterPipeline;
pub use policy::{CameraPolicy, PolicyStore, RejectReason};
