//! Perceptual hashing of card art.
//!
//! # Algorithm
//!
//! Only the art box is hashed: the top `art_ratio * width` rows of the
//! region, which on a portrait card ends close to the art line. The region is
//! converted to grayscale and histogram-equalized first so that camera
//! exposure has little effect on the result.
//!
//! - [`HashAlgorithm::Dct64`] resizes the art box to 32x32, takes its 2-D
//!   DCT-II and keeps the 8x8 block of low frequencies just right of the DC
//!   column. Each bit says whether a coefficient is above the block mean.
//! - [`HashAlgorithm::Blockhash64`] runs the Blockhash algorithm on the same
//!   art box (requires the `blockhash` feature).
//!
//! # Usage
//!
//! ```no_run
//! use cardsnake_core::fingerprint::{FingerprintExtractor, HashAlgorithm, PerceptualHasher};
//!
//! let image_data = std::fs::read("card.jpg").unwrap();
//! let hasher = PerceptualHasher::new(HashAlgorithm::Dct64);
//! let image = image::load_from_memory(&image_data).unwrap();
//! let pair = hasher.fingerprint_pair(&image).unwrap();
//! let upside_down_gap = pair.primary.hamming_distance(pair.mirrored);
//! ```

use std::f32::consts::PI;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use super::{Fingerprint, FingerprintExtractor};
use crate::error::{CardError, Result};

/// Default art box height as a fraction of the region width.
pub const DEFAULT_ART_RATIO: f32 = 0.80;

/// Side length of the image fed to the DCT.
const DCT_SIZE: usize = 32;

/// Side length of the low-frequency block kept from the DCT.
const DCT_BLOCK: usize = 8;

/// Perceptual hash algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// 64-bit DCT hash over the equalized art box.
    #[default]
    Dct64,
    /// Blockhash64 - grid-based 64-bit hash.
    Blockhash64,
}

/// Perceptual hasher configuration and computation.
#[derive(Debug, Clone)]
pub struct PerceptualHasher {
    algorithm: HashAlgorithm,
    art_ratio: f32,
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl PerceptualHasher {
    /// Create a new perceptual hasher with the specified algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            art_ratio: DEFAULT_ART_RATIO,
        }
    }

    /// Override the art box height ratio.
    pub fn with_art_ratio(mut self, art_ratio: f32) -> Self {
        self.art_ratio = art_ratio;
        self
    }

    /// Compute a fingerprint from raw image bytes.
    ///
    /// Supports JPEG, PNG, GIF, and WebP formats.
    pub fn hash_bytes(&self, image_data: &[u8]) -> Result<Fingerprint> {
        let image = image::load_from_memory(image_data).map_err(|e| {
            CardError::MalformedInput(format!("Failed to decode image: {}", e))
        })?;

        self.hash_image(&image)
    }

    /// Compute a fingerprint from a DynamicImage.
    pub fn hash_image(&self, image: &DynamicImage) -> Result<Fingerprint> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CardError::MalformedInput(format!(
                "Cannot hash a {}x{} region",
                image.width(),
                image.height()
            )));
        }

        let art = self.art_box(image);
        match self.algorithm {
            HashAlgorithm::Dct64 => Ok(dct_hash(&art)),
            HashAlgorithm::Blockhash64 => blockhash_art(art),
        }
    }

    /// Check if the provided bytes appear to be a supported image format.
    pub fn is_supported_format(data: &[u8]) -> bool {
        image::guess_format(data).is_ok()
    }

    /// Get the algorithm used by this hasher.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn art_ratio(&self) -> f32 {
        self.art_ratio
    }

    /// Equalized grayscale crop of the top `art_ratio * width` rows.
    fn art_box(&self, image: &DynamicImage) -> GrayImage {
        let gray = equalize_histogram(&image.to_luma8());
        let (width, height) = gray.dimensions();
        let art_height = ((width as f32 * self.art_ratio).round() as u32).clamp(1, height);
        imageops::crop_imm(&gray, 0, 0, width, art_height).to_image()
    }
}

impl FingerprintExtractor for PerceptualHasher {
    fn fingerprint(&self, region: &DynamicImage) -> Result<Fingerprint> {
        self.hash_image(region)
    }
}

#[cfg(feature = "blockhash")]
fn blockhash_art(art: GrayImage) -> Result<Fingerprint> {
    use blockhash::{blockhash64, Blockhash64};

    let hash: Blockhash64 = blockhash64(&DynamicImage::ImageLuma8(art));
    let hash_bytes: [u8; 8] = hash.into();
    Ok(Fingerprint::new(u64::from_be_bytes(hash_bytes)))
}

#[cfg(not(feature = "blockhash"))]
fn blockhash_art(_art: GrayImage) -> Result<Fingerprint> {
    Err(CardError::ConfigError(
        "Blockhash64 requires the `blockhash` feature".into(),
    ))
}

/// Histogram equalization of an 8-bit grayscale image.
///
/// A constant image is returned unchanged.
pub fn equalize_histogram(gray: &GrayImage) -> GrayImage {
    let mut histogram = [0u32; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total: u32 = gray.width() * gray.height();
    let mut cdf = [0u32; 256];
    let mut running = 0u32;
    for (value, count) in histogram.iter().enumerate() {
        running += count;
        cdf[value] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        return gray.clone();
    }

    let span = (total - cdf_min) as f32;
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let shifted = cdf[value].saturating_sub(cdf_min) as f32;
        *slot = (shifted * 255.0 / span).round().clamp(0.0, 255.0) as u8;
    }

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([lut[gray.get_pixel(x, y).0[0] as usize]])
    })
}

/// Orthonormal DCT-II basis: `basis[k][n] = a(k) * cos(pi * (2n + 1) * k / 2N)`.
fn dct_basis() -> Vec<[f32; DCT_SIZE]> {
    let n = DCT_SIZE as f32;
    (0..DCT_SIZE)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            let mut row = [0f32; DCT_SIZE];
            for (i, slot) in row.iter_mut().enumerate() {
                *slot = scale * (PI * (2.0 * i as f32 + 1.0) * k as f32 / (2.0 * n)).cos();
            }
            row
        })
        .collect()
}

/// 64-bit DCT hash of an (already equalized) art box.
fn dct_hash(art: &GrayImage) -> Fingerprint {
    let small = imageops::resize(art, DCT_SIZE as u32, DCT_SIZE as u32, FilterType::Triangle);
    let basis = dct_basis();

    // Row pass: rows[y][u] = sum_x basis[u][x] * f(x, y)
    let mut rows = vec![[0f32; DCT_SIZE]; DCT_SIZE];
    for (y, row) in rows.iter_mut().enumerate() {
        for (u, out) in row.iter_mut().enumerate() {
            *out = (0..DCT_SIZE)
                .map(|x| basis[u][x] * small.get_pixel(x as u32, y as u32).0[0] as f32)
                .sum();
        }
    }

    // Column pass, only for the block we keep: rows 0..8, columns 1..9.
    let mut block = [0f32; DCT_BLOCK * DCT_BLOCK];
    for v in 0..DCT_BLOCK {
        for u in 1..=DCT_BLOCK {
            block[v * DCT_BLOCK + (u - 1)] = (0..DCT_SIZE).map(|y| basis[v][y] * rows[y][u]).sum();
        }
    }

    let mean = block.iter().sum::<f32>() / block.len() as f32;
    let bits = block
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c > mean)
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i));

    Fingerprint::new(bits)
}
