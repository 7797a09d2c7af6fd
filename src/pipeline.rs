//! Filtering pipeline: policy checks, then repeat suppression.

use std::sync::Arc;

use chrono::NaiveTime;

use crate::dedup::DedupCache;
use crate::detect::Detection;
use crate::frame::SnapshotFrame;
use crate::policy::{PolicyStore, RejectReason};

pub struct FilterPipeline {
    policies: Arc<PolicyStore>,
    dedup: DedupCache,
}

impl FilterPipeline {
    pub fn new(policies: Arc<PolicyStore>, dedup: DedupCache) -> Self {
        Self { policies, dedup }
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Keep the detections that are policy-eligible and not repeats,
    /// in their original order. An empty result is a normal outcome.
    pub fn filter(
        &self,
        raw: Vec<Detection>,
        camera_id: &str,
        frame: &SnapshotFrame,
        now: NaiveTime,
    ) -> Vec<Detection> {
        let Some(policy) = self.policies.get_policy(camera_id) else {
            if !raw.is_empty() {
                log::debug!(
                    "(camera {}) has no policy; dropping {} detections",
                    camera_id,
                    raw.len()
                );
            }
            return Vec::new();
        };

        let mut accepted = Vec::with_capacity(raw.len());
        for detection in raw {
            if let Err(reason) = policy.check(&detection, now) {
                let threshold = policy.threshold_for(detection.class_idx);
                log_rejection(camera_id, &detection, reason, threshold);
                continue;
            }

            let crop = match frame.crop(&detection.bbox) {
                Ok(crop) => crop,
                Err(e) => {
                    log::warn!(
                        "(camera {}) a {} object could not be cropped: {}",
                        camera_id,
                        detection.class_name,
                        e
                    );
                    continue;
                }
            };
            if self.dedup.is_repeat(camera_id, detection.class_idx, &crop) {
                continue;
            }
            accepted.push(detection);
        }
        accepted
    }
}

fn log_rejection(camera_id: &str, d: &Detection, reason: RejectReason, threshold: f32) {
    match reason {
        RejectReason::ClassNotSelected => log::warn!(
            "(camera {}) class {} is not selected, conf:{}",
            camera_id,
            d.class_name,
            d.confidence
        ),
        RejectReason::BelowConfidence => log::warn!(
            "(camera {}) confidence is lower than expected for {} ({} < {})",
            camera_id,
            d.class_name,
            d.confidence,
            threshold
        ),
        RejectReason::OutsideTimeWindow => log::warn!(
            "(camera {}) a detected object ({}, conf:{}) was not in the active time window",
            camera_id,
            d.class_name,
            d.confidence
        ),
        RejectReason::OutsideZones => log::warn!(
            "(camera {}) a {} object was outside every zone, conf:{}",
            camera_id,
            d.class_name,
            d.confidence
        ),
        RejectReason::InsideMask => log::warn!(
            "(camera {}) a {} object was detected in a mask area, conf:{}",
            camera_id,
            d.class_name,
            d.confidence
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::AverageHash;
    use crate::detect::DetectionBox;
    use crate::policy::{CameraPolicy, Polygon};
    use image::{Rgb, RgbImage};

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).expect("time")
    }

    fn pipeline(policies: Vec<CameraPolicy>) -> FilterPipeline {
        let algo = AverageHash::new(8, 10.0).expect("algorithm");
        FilterPipeline::new(
            Arc::new(PolicyStore::new(policies)),
            DedupCache::new(Box::new(algo)),
        )
    }

    fn frame() -> SnapshotFrame {
        let pixels = RgbImage::from_fn(200, 100, |x, y| Rgb([(x ^ y) as u8, x as u8, y as u8]));
        SnapshotFrame::from_pixels(pixels).expect("frame")
    }

    fn det(name: &str, idx: u32, conf: f32, x1: u32, y1: u32, x2: u32, y2: u32) -> Detection {
        Detection::new(name, idx, conf, DetectionBox::new(x1, y1, x2, y2).expect("box"))
    }

    #[test]
    fn unknown_camera_passes_nothing() {
        let p = pipeline(vec![]);
        let out = p.filter(vec![det("person", 0, 0.99, 0, 0, 50, 50)], "ghost", &frame(), noon());
        assert!(out.is_empty());
        assert!(p.dedup().is_empty());
    }

    #[test]
    fn keeps_order_and_drops_ineligible() -> anyhow::Result<()> {
        let policy = CameraPolicy::new("cam")?
            .select(0, Some(0.5))?
            .select(16, Some(0.5))?
            .with_mask(Polygon::new(vec![(150.0, 0.0), (200.0, 0.0), (200.0, 100.0), (150.0, 100.0)])?);
        let p = pipeline(vec![policy]);
        let raw = vec![
            det("dog", 16, 0.9, 0, 0, 40, 40),
            det("car", 2, 0.9, 40, 0, 80, 40),
            det("person", 0, 0.4, 0, 50, 40, 90),
            det("person", 0, 0.6, 160, 10, 190, 90),
            det("person", 0, 0.6, 60, 40, 100, 100),
        ];
        let out = p.filter(raw, "cam", &frame(), noon());
        let names: Vec<_> = out.iter().map(|d| (d.class_name.as_str(), d.bbox.x1)).collect();
        assert_eq!(names, vec![("dog", 0), ("person", 60)]);
        // ineligible detections never touch the cache
        assert_eq!(p.dedup().len(), 2);
        Ok(())
    }

    #[test]
    fn second_identical_frame_is_suppressed() -> anyhow::Result<()> {
        let p = pipeline(vec![CameraPolicy::new("cam")?.select(0, Some(0.5))?]);
        let raw = vec![det("person", 0, 0.8, 10, 10, 90, 90)];
        assert_eq!(p.filter(raw.clone(), "cam", &frame(), noon()).len(), 1);
        assert!(p.filter(raw, "cam", &frame(), noon()).is_empty());
        Ok(())
    }

    #[test]
    fn box_outside_frame_is_dropped() -> anyhow::Result<()> {
        let p = pipeline(vec![CameraPolicy::new("cam")?.select(0, None)?]);
        let out = p.filter(vec![det("person", 0, 0.8, 300, 300, 400, 400)], "cam", &frame(), noon());
        assert!(out.is_empty());
        Ok(())
    }
}
