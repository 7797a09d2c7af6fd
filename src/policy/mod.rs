//! Per-camera detection policy.
//!
//! A `CameraPolicy` answers five independent questions about a detection:
//! is the class selected, does it meet the class threshold, is the camera
//! inside its active time window, is the box inside an inclusion zone, and
//! is it clear of every exclusion mask. A detection is policy-eligible only
//! when all five hold.
//!
//! Zone and mask membership is decided by the box center point.

mod file;
mod geometry;
mod store;
mod window;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use chrono::NaiveTime;

use crate::detect::{Detection, DetectionBox};

pub use file::{parse_policy_file, read_policy_file};
pub use geometry::Polygon;
pub use store::PolicyStore;
pub use window::TimeWindow;

#[derive(Clone, Debug, PartialEq)]
pub struct CameraPolicy {
    pub camera_id: String,
    /// Selected COCO-80 class indices.
    pub selected: BTreeSet<u32>,
    /// Threshold used for selected classes without an override.
    pub default_threshold: f32,
    /// Per-class minimum confidence overrides.
    pub thresholds: HashMap<u32, f32>,
    pub active_window: Option<TimeWindow>,
    /// Inclusion zones. Empty means the whole frame.
    pub zones: Vec<Polygon>,
    /// Exclusion masks. Empty means nothing is masked.
    pub masks: Vec<Polygon>,
}

/// Why a detection was not policy-eligible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    ClassNotSelected,
    BelowConfidence,
    OutsideTimeWindow,
    OutsideZones,
    InsideMask,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassNotSelected => write!(f, "class not selected"),
            Self::BelowConfidence => write!(f, "below confidence threshold"),
            Self::OutsideTimeWindow => write!(f, "outside active time window"),
            Self::OutsideZones => write!(f, "outside every zone"),
            Self::InsideMask => write!(f, "inside a mask"),
        }
    }
}

impl CameraPolicy {
    /// A policy selecting nothing; every detection is rejected.
    pub fn new(camera_id: &str) -> Result<Self> {
        validate_camera_id(camera_id)?;
        Ok(Self {
            camera_id: camera_id.to_string(),
            selected: BTreeSet::new(),
            default_threshold: 0.0,
            thresholds: HashMap::new(),
            active_window: None,
            zones: Vec::new(),
            masks: Vec::new(),
        })
    }

    pub fn select(mut self, class_idx: u32, threshold: Option<f32>) -> Result<Self> {
        self.selected.insert(class_idx);
        if let Some(threshold) = threshold {
            validate_threshold(threshold)?;
            self.thresholds.insert(class_idx, threshold);
        }
        Ok(self)
    }

    pub fn with_default_threshold(mut self, threshold: f32) -> Result<Self> {
        validate_threshold(threshold)?;
        self.default_threshold = threshold;
        Ok(self)
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.active_window = Some(window);
        self
    }

    pub fn with_zone(mut self, zone: Polygon) -> Self {
        self.zones.push(zone);
        self
    }

    pub fn with_mask(mut self, mask: Polygon) -> Self {
        self.masks.push(mask);
        self
    }

    pub fn class_selected(&self, class_idx: u32) -> bool {
        self.selected.contains(&class_idx)
    }

    pub fn threshold_for(&self, class_idx: u32) -> f32 {
        self.thresholds
            .get(&class_idx)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    /// `confidence >= threshold`; equality passes.
    pub fn meets_confidence(&self, class_idx: u32, confidence: f32) -> bool {
        confidence >= self.threshold_for(class_idx)
    }

    pub fn in_active_window(&self, now: NaiveTime) -> bool {
        self.active_window
            .map_or(true, |window| window.contains(now))
    }

    pub fn inside_zones(&self, bbox: &DetectionBox) -> bool {
        if self.zones.is_empty() {
            return true;
        }
        let center = bbox.center();
        self.zones.iter().any(|zone| zone.contains(center))
    }

    pub fn outside_masks(&self, bbox: &DetectionBox) -> bool {
        let center = bbox.center();
        !self.masks.iter().any(|mask| mask.contains(center))
    }

    /// Evaluate all predicates, cheapest first, stopping at the first failure.
    pub fn check(&self, detection: &Detection, now: NaiveTime) -> Result<(), RejectReason> {
        if !self.class_selected(detection.class_idx) {
            return Err(RejectReason::ClassNotSelected);
        }
        if !self.meets_confidence(detection.class_idx, detection.confidence) {
            return Err(RejectReason::BelowConfidence);
        }
        if !self.in_active_window(now) {
            return Err(RejectReason::OutsideTimeWindow);
        }
        if !self.inside_zones(&detection.bbox) {
            return Err(RejectReason::OutsideZones);
        }
        if !self.outside_masks(&detection.bbox) {
            return Err(RejectReason::InsideMask);
        }
        Ok(())
    }

    pub fn is_eligible(&self, detection: &Detection, now: NaiveTime) -> bool {
        self.check(detection, now).is_ok()
    }
}

/// Camera ids are opaque bus identifiers; keep them to a safe charset.
pub fn validate_camera_id(camera_id: &str) -> Result<()> {
    static CAMERA_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = CAMERA_ID_RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9_.:-]{1,64}$").expect("camera id pattern is valid")
    });
    if !re.is_match(camera_id) {
        return Err(anyhow!(
            "camera id '{}' must match ^[A-Za-z0-9_.:-]{{1,64}}$",
            camera_id
        ));
    }
    Ok(())
}

fn validate_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(anyhow!("threshold {} out of range [0, 1]", threshold));
    }
    Ok(())
}
