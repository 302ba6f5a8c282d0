//! Grid-sampled BRIEF descriptors.
//!
//! Keypoints are placed at the centres of a regular grid of cells and ranked
//! by local contrast, so flat card borders produce no keypoints while
//! textured art produces many. Each keypoint is described by 256 pairwise
//! intensity comparisons inside a 31x31 patch of the smoothed image. The
//! sampling pattern is derived from SHA3-256 and is identical on every run
//! and every machine, which keeps stored catalog descriptors comparable with
//! freshly extracted ones.

use image::imageops;
use image::{DynamicImage, GrayImage};
use sha3::{Digest, Sha3_256};
use tracing::debug;

use super::{Descriptor, DescriptorExtractor, Keypoint, DESCRIPTOR_SIZE};
use crate::error::{CardError, Result};

/// Half size of the described patch.
const PATCH_RADIUS: i32 = 15;

/// Number of binary tests per descriptor.
const TEST_COUNT: usize = DESCRIPTOR_SIZE * 8;

/// Domain separator for the sampling pattern.
const PATTERN_SEED: &[u8] = b"cardsnake-brief-pattern-v1";

/// Grid BRIEF configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BriefConfig {
    /// Grid cell size in pixels
    pub cell: u32,
    /// Maximum number of descriptors per region
    pub max_keypoints: usize,
    /// Minimum intensity standard deviation of a cell to place a keypoint
    pub min_contrast: f32,
    /// Gaussian smoothing sigma applied before the binary tests
    pub blur_sigma: f32,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            cell: 12,
            max_keypoints: 400,
            min_contrast: 6.0,
            blur_sigma: 2.0,
        }
    }
}

/// Descriptor extractor producing 256-bit BRIEF descriptors on a grid.
#[derive(Debug, Clone)]
pub struct BriefExtractor {
    config: BriefConfig,
    pattern: Vec<[i32; 4]>,
}

impl Default for BriefExtractor {
    fn default() -> Self {
        Self::new(BriefConfig::default())
    }
}

impl BriefExtractor {
    pub fn new(config: BriefConfig) -> Self {
        Self {
            config,
            pattern: sampling_pattern(),
        }
    }

    pub fn config(&self) -> &BriefConfig {
        &self.config
    }

    /// Describe a grayscale image.
    pub fn describe(&self, gray: &GrayImage) -> Vec<Descriptor> {
        let smooth = imageops::blur(gray, self.config.blur_sigma);
        let (width, height) = smooth.dimensions();
        let margin = PATCH_RADIUS as u32 + 1;
        if width <= 2 * margin || height <= 2 * margin {
            return Vec::new();
        }

        let cell = self.config.cell.max(2);
        let mut scored: Vec<(f32, u32, u32)> = Vec::new();
        let mut top = margin;
        while top + cell <= height - margin {
            let mut left = margin;
            while left + cell <= width - margin {
                let contrast = cell_contrast(&smooth, left, top, cell);
                if contrast >= self.config.min_contrast {
                    scored.push((contrast, left + cell / 2, top + cell / 2));
                }
                left += cell;
            }
            top += cell;
        }

        // Strongest first; grid order breaks ties so the output is deterministic.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(self.config.max_keypoints);

        let descriptors: Vec<Descriptor> = scored
            .into_iter()
            .map(|(contrast, x, y)| {
                let keypoint = Keypoint {
                    x: x as f32,
                    y: y as f32,
                    size: (2 * PATCH_RADIUS + 1) as f32,
                    angle: -1.0,
                    response: contrast,
                    octave: 0,
                };
                Descriptor::new(keypoint, self.binary_tests(&smooth, x as i32, y as i32))
            })
            .collect();

        debug!(
            width,
            height,
            descriptors = descriptors.len(),
            "Extracted BRIEF descriptors"
        );
        descriptors
    }

    fn binary_tests(&self, smooth: &GrayImage, cx: i32, cy: i32) -> [u8; DESCRIPTOR_SIZE] {
        let mut bits = [0u8; DESCRIPTOR_SIZE];
        for (i, &[dx1, dy1, dx2, dy2]) in self.pattern.iter().enumerate() {
            let a = smooth.get_pixel((cx + dx1) as u32, (cy + dy1) as u32).0[0];
            let b = smooth.get_pixel((cx + dx2) as u32, (cy + dy2) as u32).0[0];
            if a < b {
                bits[i / 8] |= 1 << (i % 8);
            }
        }
        bits
    }
}

impl DescriptorExtractor for BriefExtractor {
    fn descriptors(&self, region: &DynamicImage) -> Result<Vec<Descriptor>> {
        if region.width() == 0 || region.height() == 0 {
            return Err(CardError::MalformedInput(format!(
                "Cannot describe a {}x{} region",
                region.width(),
                region.height()
            )));
        }
        Ok(self.describe(&region.to_luma8()))
    }
}

/// Standard deviation of the intensities in one grid cell.
fn cell_contrast(image: &GrayImage, left: u32, top: u32, cell: u32) -> f32 {
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    for y in top..top + cell {
        for x in left..left + cell {
            let v = image.get_pixel(x, y).0[0] as f64;
            sum += v;
            sum_sq += v * v;
        }
    }
    let n = (cell * cell) as f64;
    let mean = sum / n;
    ((sum_sq / n - mean * mean).max(0.0)).sqrt() as f32
}

/// 256 point pairs `(dx1, dy1, dx2, dy2)` with offsets in `[-15, 15]`.
fn sampling_pattern() -> Vec<[i32; 4]> {
    let span = (2 * PATCH_RADIUS + 1) as u8;
    let mut pattern = Vec::with_capacity(TEST_COUNT);
    let mut block = 0u32;
    while pattern.len() < TEST_COUNT {
        let mut hasher = Sha3_256::new();
        hasher.update(PATTERN_SEED);
        hasher.update(block.to_le_bytes());
        let digest = hasher.finalize();

        for chunk in digest.chunks_exact(4) {
            if pattern.len() == TEST_COUNT {
                break;
            }
            let offset = |b: u8| (b % span) as i32 - PATCH_RADIUS;
            let pair = [
                offset(chunk[0]),
                offset(chunk[1]),
                offset(chunk[2]),
                offset(chunk[3]),
            ];
            // A pair comparing a pixel with itself carries no information.
            if pair[0] != pair[2] || pair[1] != pair[3] {
                pattern.push(pair);
            }
        }
        block += 1;
    }
    pattern
}
