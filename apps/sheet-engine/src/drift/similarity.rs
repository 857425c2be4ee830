//! Pixel-level similarity primitives.
//!
//! `LumaSimilarity` is the native implementation: images are fetched by
//! reference, decoded with the `image` crate, reduced to 8-bit luma and
//! compared on a common grid.
//!
//! - similarity: mean SSIM over non-overlapping 8×8 windows, clamped to [0,1]
//! - perceptual hash: 64-bit difference hash over a 9×8 grid
//! - hash distance: Hamming distance

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::GrayImage;
use moka::future::Cache;
use thiserror::Error;

use crate::layout::Rect;

/// Decoded images kept per `LumaSimilarity`.
pub const DECODE_CACHE_CAPACITY: u64 = 64;

const WINDOW: u32 = 8;
const MAX_GRID: u32 = 256;
const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriftError {
    #[error("could not fetch image '{image_ref}': {message}")]
    Fetch { image_ref: String, message: String },

    #[error("could not decode image '{image_ref}': {message}")]
    Decode { image_ref: String, message: String },
}

#[async_trait]
pub trait SimilarityPrimitives: Send + Sync {
    /// Structural similarity in [0,1]; `region` restricts the comparison to a
    /// normalized rectangle of both images.
    async fn similarity(&self, a: &str, b: &str, region: Option<Rect>) -> Result<f64, DriftError>;

    async fn perceptual_hash(&self, image: &str) -> Result<u64, DriftError>;

    fn hash_distance(&self, h1: u64, h2: u64) -> u32 {
        (h1 ^ h2).count_ones()
    }
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, image_ref: &str) -> Result<Bytes, DriftError>;
}

/// Resolves `http(s)://` refs over HTTP and everything else (`file://` or a
/// bare path) from the local filesystem.
#[derive(Clone)]
pub struct RefImageFetcher {
    client: reqwest::Client,
}

impl RefImageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for RefImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for RefImageFetcher {
    async fn fetch(&self, image_ref: &str) -> Result<Bytes, DriftError> {
        let fail = |message: String| DriftError::Fetch {
            image_ref: image_ref.to_string(),
            message,
        };
        if image_ref.starts_with("http://") || image_ref.starts_with("https://") {
            let response = self
                .client
                .get(image_ref)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| fail(e.to_string()))?;
            return response.bytes().await.map_err(|e| fail(e.to_string()));
        }
        let path = image_ref.strip_prefix("file://").unwrap_or(image_ref);
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| fail(e.to_string()))
    }
}

pub struct LumaSimilarity {
    fetcher: Arc<dyn ImageFetcher>,
    decoded: Cache<String, Arc<GrayImage>>,
}

impl LumaSimilarity {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self::with_cache_capacity(fetcher, DECODE_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(fetcher: Arc<dyn ImageFetcher>, capacity: u64) -> Self {
        Self {
            fetcher,
            decoded: Cache::new(capacity),
        }
    }

    async fn load(&self, image_ref: &str) -> Result<Arc<GrayImage>, DriftError> {
        if let Some(hit) = self.decoded.get(image_ref).await {
            return Ok(hit);
        }
        let bytes = self.fetcher.fetch(image_ref).await?;
        let img = image::load_from_memory(&bytes).map_err(|e| DriftError::Decode {
            image_ref: image_ref.to_string(),
            message: e.to_string(),
        })?;
        let luma = Arc::new(img.to_luma8());
        self.decoded.insert(image_ref.to_string(), luma.clone()).await;
        Ok(luma)
    }
}

#[async_trait]
impl SimilarityPrimitives for LumaSimilarity {
    async fn similarity(&self, a: &str, b: &str, region: Option<Rect>) -> Result<f64, DriftError> {
        let img_a = self.load(a).await?;
        let img_b = self.load(b).await?;
        let (img_a, img_b) = match region {
            Some(r) => (crop(&img_a, r), crop(&img_b, r)),
            None => ((*img_a).clone(), (*img_b).clone()),
        };
        Ok(ssim(&img_a, &img_b))
    }

    async fn perceptual_hash(&self, image: &str) -> Result<u64, DriftError> {
        Ok(dhash(&*self.load(image).await?))
    }
}

fn crop(img: &GrayImage, r: Rect) -> GrayImage {
    let (w, h) = img.dimensions();
    let x = ((r.x * w as f64).round() as u32).min(w.saturating_sub(1));
    let y = ((r.y * h as f64).round() as u32).min(h.saturating_sub(1));
    let cw = ((r.w * w as f64).round() as u32).clamp(1, w - x);
    let ch = ((r.h * h as f64).round() as u32).clamp(1, h - y);
    imageops::crop_imm(img, x, y, cw, ch).to_image()
}

/// Mean SSIM of two luma images after resampling both to a common grid.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> f64 {
    let w = a.width().min(b.width()).clamp(WINDOW, MAX_GRID);
    let h = a.height().min(b.height()).clamp(WINDOW, MAX_GRID);
    let a = fit(a, w, h);
    let b = fit(b, w, h);

    let mut total = 0.0;
    let mut windows = 0u32;
    for y in (0..=h - WINDOW).step_by(WINDOW as usize) {
        for x in (0..=w - WINDOW).step_by(WINDOW as usize) {
            total += window_ssim(&a, &b, x, y);
            windows += 1;
        }
    }
    (total / windows as f64).clamp(0.0, 1.0)
}

fn fit(img: &GrayImage, w: u32, h: u32) -> GrayImage {
    if img.dimensions() == (w, h) {
        img.clone()
    } else {
        imageops::resize(img, w, h, FilterType::Triangle)
    }
}

fn window_ssim(a: &GrayImage, b: &GrayImage, x0: u32, y0: u32) -> f64 {
    let n = (WINDOW * WINDOW) as f64;
    let mut sum_a = 0.0;
    let mut sum_b = 0.0;
    for y in y0..y0 + WINDOW {
        for x in x0..x0 + WINDOW {
            sum_a += a.get_pixel(x, y)[0] as f64;
            sum_b += b.get_pixel(x, y)[0] as f64;
        }
    }
    let mean_a = sum_a / n;
    let mean_b = sum_b / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut cov = 0.0;
    for y in y0..y0 + WINDOW {
        for x in x0..x0 + WINDOW {
            let da = a.get_pixel(x, y)[0] as f64 - mean_a;
            let db = b.get_pixel(x, y)[0] as f64 - mean_b;
            var_a += da * da;
            var_b += db * db;
            cov += da * db;
        }
    }
    var_a /= n;
    var_b /= n;
    cov /= n;

    ((2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2))
        / ((mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2))
}

/// 64-bit difference hash: bit set where a pixel is darker than its right neighbour.
pub fn dhash(img: &GrayImage) -> u64 {
    let small = imageops::resize(img, 9, 8, FilterType::Triangle);
    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            hash <<= 1;
            if small.get_pixel(x, y)[0] < small.get_pixel(x + 1, y)[0] {
                hash |= 1;
            }
        }
    }
    hash
}
