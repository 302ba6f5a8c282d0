//! Local feature descriptors used for fine verification.
//!
//! A [`Descriptor`] is a 256-bit binary feature vector with the geometry of
//! the keypoint it was computed at. Only the bits take part in matching; the
//! keypoint is carried along for drawing and debugging.

pub mod brief;

pub use brief::{BriefConfig, BriefExtractor};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Descriptor size in bytes (256 bits).
pub const DESCRIPTOR_SIZE: usize = 32;

/// Geometric metadata of a detected keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the described patch in pixels
    pub size: f32,
    /// Orientation in degrees, -1 when not computed
    pub angle: f32,
    /// Detector response, higher is stronger
    pub response: f32,
    pub octave: i32,
}

/// Binary feature vector plus the keypoint it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub keypoint: Keypoint,
    pub bits: [u8; DESCRIPTOR_SIZE],
}

impl Descriptor {
    pub fn new(keypoint: Keypoint, bits: [u8; DESCRIPTOR_SIZE]) -> Self {
        Self { keypoint, bits }
    }

    /// Descriptor with default keypoint metadata.
    pub fn from_bits(bits: [u8; DESCRIPTOR_SIZE]) -> Self {
        Self::new(Keypoint::default(), bits)
    }

    /// Hamming distance between two descriptors.
    #[inline]
    pub fn distance(&self, other: &Descriptor) -> u32 {
        self.bits
            .iter()
            .zip(other.bits.iter())
            .map(|(&x, &y)| (x ^ y).count_ones())
            .sum()
    }
}

/// Extracts local descriptors from an image region.
pub trait DescriptorExtractor: Send + Sync {
    fn descriptors(&self, region: &DynamicImage) -> Result<Vec<Descriptor>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_distance_identical() {
        let d = Descriptor::from_bits([0xA5; DESCRIPTOR_SIZE]);
        assert_eq!(d.distance(&d), 0);
    }

    #[test]
    fn test_descriptor_distance_all_bits() {
        let a = Descriptor::from_bits([0x00; DESCRIPTOR_SIZE]);
        let b = Descriptor::from_bits([0xFF; DESCRIPTOR_SIZE]);
        assert_eq!(a.distance(&b), 256);
        assert_eq!(b.distance(&a), 256);
    }

    #[test]
    fn test_descriptor_distance_ignores_keypoint() {
        let bits = [0x0F; DESCRIPTOR_SIZE];
        let a = Descriptor::new(
            Keypoint {
                x: 10.0,
                y: 20.0,
                ..Keypoint::default()
            },
            bits,
        );
        let b = Descriptor::from_bits(bits);
        assert_eq!(a.distance(&b), 0);
    }
}
