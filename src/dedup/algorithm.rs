//! Perceptual descriptors for repeat suppression.
//!
//! An algorithm turns a crop into a fixed-size [`Descriptor`] and measures the
//! loss between two descriptors. The loss scale is algorithm-specific; for
//! both hashes here it is the Hamming distance in bits, so with the default
//! 8x8 hash the loss lies in `0..=64`.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

/// Packed bit fingerprint of an image crop.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Descriptor {
    words: Vec<u64>,
    bits: usize,
}

impl Descriptor {
    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        let mut words = Vec::new();
        let mut len = 0usize;
        for bit in bits {
            if len % 64 == 0 {
                words.push(0u64);
            }
            if bit {
                if let Some(word) = words.last_mut() {
                    *word |= 1u64 << (len % 64);
                }
            }
            len += 1;
        }
        Self { words, bits: len }
    }

    pub fn len(&self) -> usize {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Number of differing bits. Descriptors of different lengths differ in
    /// every bit of the longer one.
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        if self.bits != other.bits {
            return self.bits.max(other.bits) as u32;
        }
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in &self.words {
            write!(f, "{:016x}", word)?;
        }
        Ok(())
    }
}

/// Similarity capability used by the dedup cache.
pub trait SimilarityAlgorithm: Send + Sync {
    /// Algorithm identifier, used in logs.
    fn name(&self) -> &'static str;

    /// Reduce a crop to its descriptor. Must be deterministic.
    fn process_crop(&self, crop: &RgbImage) -> Descriptor;

    /// Non-negative symmetric distance between two descriptors.
    fn compute_loss(&self, current: &Descriptor, previous: &Descriptor) -> f64;

    /// Losses strictly above this count as a changed observation.
    fn threshold(&self) -> f64;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlgorithmKind {
    #[default]
    AverageHash,
    DifferenceHash,
}

impl FromStr for AlgorithmKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "average_hash" | "ahash" | "average" => Ok(Self::AverageHash),
            "difference_hash" | "dhash" | "difference" => Ok(Self::DifferenceHash),
            other => Err(anyhow!(
                "unknown dedup algorithm '{}': expected 'average_hash' or 'difference_hash'",
                other
            )),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AverageHash => write!(f, "average_hash"),
            Self::DifferenceHash => write!(f, "difference_hash"),
        }
    }
}

impl AlgorithmKind {
    pub fn build(self, hash_size: u32, threshold: f64) -> Result<Box<dyn SimilarityAlgorithm>> {
        Ok(match self {
            Self::AverageHash => Box::new(AverageHash::new(hash_size, threshold)?),
            Self::DifferenceHash => Box::new(DifferenceHash::new(hash_size, threshold)?),
        })
    }
}

fn validate_params(hash_size: u32, threshold: f64) -> Result<()> {
    if !(2..=64).contains(&hash_size) {
        return Err(anyhow!("hash size {} out of range 2..=64", hash_size));
    }
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(anyhow!("dedup threshold must be a non-negative number"));
    }
    Ok(())
}

fn shrink(crop: &RgbImage, width: u32, height: u32) -> GrayImage {
    let gray = imageops::grayscale(crop);
    imageops::resize(&gray, width, height, FilterType::Lanczos3)
}

/// Average hash: shrink to `size x size` grayscale, one bit per pixel set
/// when the pixel is brighter than the mean.
pub struct AverageHash {
    hash_size: u32,
    threshold: f64,
}

impl AverageHash {
    pub fn new(hash_size: u32, threshold: f64) -> Result<Self> {
        validate_params(hash_size, threshold)?;
        Ok(Self {
            hash_size,
            threshold,
        })
    }
}

impl SimilarityAlgorithm for AverageHash {
    fn name(&self) -> &'static str {
        "average_hash"
    }

    fn process_crop(&self, crop: &RgbImage) -> Descriptor {
        let small = shrink(crop, self.hash_size, self.hash_size);
        let total: u64 = small.pixels().map(|p| p.0[0] as u64).sum();
        let count = (self.hash_size * self.hash_size) as f64;
        let mean = total as f64 / count;
        Descriptor::from_bits(small.pixels().map(|p| p.0[0] as f64 > mean))
    }

    fn compute_loss(&self, current: &Descriptor, previous: &Descriptor) -> f64 {
        current.hamming(previous) as f64
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Difference hash: shrink to `(size + 1) x size` grayscale, one bit per
/// horizontally adjacent pair set when brightness increases to the right.
pub struct DifferenceHash {
    hash_size: u32,
    threshold: f64,
}

impl DifferenceHash {
    pub fn new(hash_size: u32, threshold: f64) -> Result<Self> {
        validate_params(hash_size, threshold)?;
        Ok(Self {
            hash_size,
            threshold,
        })
    }
}

impl SimilarityAlgorithm for DifferenceHash {
    fn name(&self) -> &'static str {
        "difference_hash"
    }

    fn process_crop(&self, crop: &RgbImage) -> Descriptor {
        let small = shrink(crop, self.hash_size + 1, self.hash_size);
        let bits = (0..self.hash_size).flat_map(|y| {
            let small = &small;
            (0..self.hash_size)
                .map(move |x| small.get_pixel(x + 1, y).0[0] > small.get_pixel(x, y).0[0])
        });
        Descriptor::from_bits(bits)
    }

    fn compute_loss(&self, current: &Descriptor, previous: &Descriptor) -> f64 {
        current.hamming(previous) as f64
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Left half dark, right half bright.
    fn split(width: u32, height: u32, dark: u8, bright: u8) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([dark; 3])
            } else {
                Rgb([bright; 3])
            }
        })
    }

    /// Top half dark, bottom half bright.
    fn split_vertical(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |_, y| {
            if y < height / 2 {
                Rgb([20; 3])
            } else {
                Rgb([230; 3])
            }
        })
    }

    #[test]
    fn descriptor_packs_bits_across_words() {
        let d = Descriptor::from_bits((0..70).map(|i| i % 3 == 0));
        assert_eq!(d.len(), 70);
        let same = Descriptor::from_bits((0..70).map(|i| i % 3 == 0));
        assert_eq!(d.hamming(&same), 0);
        let flipped = Descriptor::from_bits((0..70).map(|i| i % 3 == 0 || i == 68));
        assert_eq!(d.hamming(&flipped), 1);
    }

    #[test]
    fn hamming_is_symmetric_and_length_aware() {
        let a = Descriptor::from_bits([true, false, true, true]);
        let b = Descriptor::from_bits([false, false, true, false]);
        assert_eq!(a.hamming(&b), 2);
        assert_eq!(b.hamming(&a), 2);
        let longer = Descriptor::from_bits([true; 8]);
        assert_eq!(a.hamming(&longer), 8);
    }

    #[test]
    fn average_hash_is_deterministic_with_expected_size() -> Result<()> {
        let algo = AverageHash::new(8, 10.0)?;
        let img = split(64, 48, 10, 240);
        let d1 = algo.process_crop(&img);
        let d2 = algo.process_crop(&img);
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        Ok(())
    }

    #[test]
    fn average_hash_tolerates_photometric_noise() -> Result<()> {
        let algo = AverageHash::new(8, 10.0)?;
        let base = algo.process_crop(&split(64, 48, 10, 240));
        let noisy = algo.process_crop(&split(64, 48, 18, 232));
        assert!(algo.compute_loss(&noisy, &base) <= algo.threshold());
        Ok(())
    }

    #[test]
    fn average_hash_separates_different_structure() -> Result<()> {
        let algo = AverageHash::new(8, 10.0)?;
        let horizontal = algo.process_crop(&split(64, 64, 20, 230));
        let vertical = algo.process_crop(&split_vertical(64, 64));
        assert!(algo.compute_loss(&horizontal, &vertical) > algo.threshold());
        Ok(())
    }

    #[test]
    fn difference_hash_detects_gradient_direction() -> Result<()> {
        let algo = DifferenceHash::new(8, 10.0)?;
        let rising = RgbImage::from_fn(90, 80, |x, _| Rgb([(x * 2) as u8; 3]));
        let falling = RgbImage::from_fn(90, 80, |x, _| Rgb([(255 - x * 2) as u8; 3]));
        let d_rising = algo.process_crop(&rising);
        let d_falling = algo.process_crop(&falling);
        assert_eq!(d_rising.len(), 64);
        assert_eq!(algo.compute_loss(&d_rising, &d_falling), 64.0);
        Ok(())
    }

    #[test]
    fn kind_parses_aliases_and_builds() -> Result<()> {
        assert_eq!("ahash".parse::<AlgorithmKind>()?, AlgorithmKind::AverageHash);
        assert_eq!(
            "Difference_Hash".parse::<AlgorithmKind>()?,
            AlgorithmKind::DifferenceHash
        );
        assert!("phash".parse::<AlgorithmKind>().is_err());
        let algo = AlgorithmKind::DifferenceHash.build(8, 5.0)?;
        assert_eq!(algo.name(), "difference_hash");
        assert_eq!(algo.threshold(), 5.0);
        Ok(())
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(AverageHash::new(1, 10.0).is_err());
        assert!(AverageHash::new(8, -1.0).is_err());
        assert!(DifferenceHash::new(8, f64::NAN).is_err());
    }
}
