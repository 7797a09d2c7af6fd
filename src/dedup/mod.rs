//! Repeat suppression ("once" detection).
//!
//! The cache remembers, per (camera, class), the descriptor of the last crop
//! that was let through. A new crop is a repeat when its loss against that
//! descriptor is at or below the algorithm threshold. First sightings always
//! pass. Entries are never evicted.
//!
//! The lookup, comparison and conditional update run under one lock, so two
//! workers racing on the same key see a consistent map: the second one
//! compares against whatever the first stored.

mod algorithm;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use image::RgbImage;

pub use algorithm::{
    AlgorithmKind, AverageHash, Descriptor, DifferenceHash, SimilarityAlgorithm,
};

use crate::detect::classes::class_name;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct DedupKey {
    camera_id: String,
    class_idx: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DedupEntry {
    pub descriptor: Descriptor,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of one cache observation.
#[derive(Clone, Debug, PartialEq)]
pub enum DedupDecision {
    FirstSighting,
    Changed { loss: f64 },
    Repeat { loss: f64 },
}

impl DedupDecision {
    pub fn is_repeat(&self) -> bool {
        matches!(self, Self::Repeat { .. })
    }
}

pub struct DedupCache {
    algorithm: Box<dyn SimilarityAlgorithm>,
    entries: Mutex<HashMap<DedupKey, DedupEntry>>,
}

impl DedupCache {
    pub fn new(algorithm: Box<dyn SimilarityAlgorithm>) -> Self {
        Self {
            algorithm,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn algorithm(&self) -> &dyn SimilarityAlgorithm {
        self.algorithm.as_ref()
    }

    /// True when `crop` should be suppressed as a repeat.
    pub fn is_repeat(&self, camera_id: &str, class_idx: u32, crop: &RgbImage) -> bool {
        self.observe(camera_id, class_idx, crop).is_repeat()
    }

    /// Compare `crop` with the stored descriptor and update the entry when
    /// the crop is new or changed.
    pub fn observe(&self, camera_id: &str, class_idx: u32, crop: &RgbImage) -> DedupDecision {
        let descriptor = self.algorithm.process_crop(crop);
        self.observe_descriptor(camera_id, class_idx, descriptor)
    }

    pub fn observe_descriptor(
        &self,
        camera_id: &str,
        class_idx: u32,
        descriptor: Descriptor,
    ) -> DedupDecision {
        let key = DedupKey {
            camera_id: camera_id.to_string(),
            class_idx,
        };
        let threshold = self.algorithm.threshold();
        let class = class_name(class_idx).unwrap_or("unknown");

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let decision = match entries.get(&key) {
            None => DedupDecision::FirstSighting,
            Some(prev) => {
                let loss = self.algorithm.compute_loss(&descriptor, &prev.descriptor);
                if loss > threshold {
                    DedupDecision::Changed { loss }
                } else {
                    DedupDecision::Repeat { loss }
                }
            }
        };

        match &decision {
            DedupDecision::FirstSighting => {
                log::info!(
                    "{} (camera {}) - (class {}) detected first time",
                    self.algorithm.name(),
                    camera_id,
                    class
                );
            }
            DedupDecision::Changed { loss } => {
                log::info!(
                    "{} (camera {}) - (class {}) switched prev image, the loss is {}, the threshold {}",
                    self.algorithm.name(),
                    camera_id,
                    class,
                    loss,
                    threshold
                );
            }
            DedupDecision::Repeat { loss } => {
                log::info!(
                    "{} (camera {}) - (class {}) same image detected, the loss is {}, the threshold {}",
                    self.algorithm.name(),
                    camera_id,
                    class,
                    loss,
                    threshold
                );
            }
        }

        if !decision.is_repeat() {
            entries.insert(
                key,
                DedupEntry {
                    descriptor,
                    recorded_at: Utc::now(),
                },
            );
        }
        decision
    }

    /// Snapshot of the stored entry for (camera, class).
    pub fn entry(&self, camera_id: &str, class_idx: u32) -> Option<DedupEntry> {
        let key = DedupKey {
            camera_id: camera_id.to_string(),
            class_idx,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Test algorithm whose descriptor is the crop's first pixel, bit by bit,
    /// so tests pick exact losses.
    struct FirstPixelBits {
        threshold: f64,
    }

    impl SimilarityAlgorithm for FirstPixelBits {
        fn name(&self) -> &'static str {
            "first_pixel_bits"
        }

        fn process_crop(&self, crop: &RgbImage) -> Descriptor {
            let v = crop.get_pixel(0, 0).0[0];
            Descriptor::from_bits((0..8).map(|i| v & (1 << i) != 0))
        }

        fn compute_loss(&self, current: &Descriptor, previous: &Descriptor) -> f64 {
            current.hamming(previous) as f64
        }

        fn threshold(&self) -> f64 {
            self.threshold
        }
    }

    fn cache(threshold: f64) -> DedupCache {
        DedupCache::new(Box::new(FirstPixelBits { threshold }))
    }

    fn crop(value: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, image::Rgb([value, 0, 0]))
    }

    #[test]
    fn first_sighting_is_never_a_repeat() {
        let cache = cache(0.0);
        for (camera, class) in [("a", 0), ("a", 2), ("b", 0)] {
            assert_eq!(cache.observe(camera, class, &crop(7)), DedupDecision::FirstSighting);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn loss_at_or_below_threshold_is_suppressed_without_update() {
        let cache = cache(2.0);
        assert!(!cache.is_repeat("cam", 0, &crop(0b0000_0000)));
        let stored = cache.entry("cam", 0).expect("entry");

        // two bits differ: loss == threshold
        assert_eq!(
            cache.observe("cam", 0, &crop(0b0000_0011)),
            DedupDecision::Repeat { loss: 2.0 }
        );
        assert_eq!(cache.entry("cam", 0).expect("entry").descriptor, stored.descriptor);
    }

    #[test]
    fn loss_above_threshold_passes_and_replaces_descriptor() {
        let cache = cache(2.0);
        assert!(!cache.is_repeat("cam", 0, &crop(0b0000_0000)));
        assert_eq!(
            cache.observe("cam", 0, &crop(0b0000_0111)),
            DedupDecision::Changed { loss: 3.0 }
        );
        let algo = FirstPixelBits { threshold: 2.0 };
        assert_eq!(
            cache.entry("cam", 0).expect("entry").descriptor,
            algo.process_crop(&crop(0b0000_0111))
        );
        // the next near-identical crop is now compared with the new descriptor
        assert!(cache.is_repeat("cam", 0, &crop(0b0000_0111)));
    }

    #[test]
    fn keys_are_independent_per_camera_and_class() {
        let cache = cache(0.0);
        assert!(!cache.is_repeat("cam", 0, &crop(1)));
        assert!(!cache.is_repeat("cam", 2, &crop(1)));
        assert!(!cache.is_repeat("other", 0, &crop(1)));
        assert!(cache.is_repeat("cam", 0, &crop(1)));
    }

    #[test]
    fn concurrent_first_sightings_create_one_entry_per_key() {
        let cache = Arc::new(cache(0.0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.is_repeat("cam", 0, &crop(9)))
            })
            .collect();
        let repeats = handles
            .into_iter()
            .map(|h| h.join().expect("worker"))
            .filter(|repeat| *repeat)
            .count();
        assert_eq!(cache.len(), 1);
        assert_eq!(repeats, 15);
    }
}
