//! Visual diff of screenshots against stored baselines

use std::path::{Path, PathBuf};
use image::{GenericImageView, Pixel, Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Per-channel difference tolerated before a pixel counts as changed
const CHANNEL_TOLERANCE: i32 = 5;

/// Outcome of comparing one screenshot with its baseline
#[derive(Debug, Clone)]
pub struct VisualDiff {
    /// `diff_percent` is at or under the threshold
    pub matches: bool,

    /// Changed pixels as a percentage of the larger image area
    pub diff_percent: f64,

    pub diff_pixels: u64,
    pub total_pixels: u64,

    /// Red-marked diff, written only when some pixel changed
    pub diff_image_path: Option<PathBuf>,

    pub actual_hash: String,
    pub baseline_hash: String,
}

/// Compares screenshots to baselines stored as `<baseline_dir>/<key>.png`
pub struct VisualTester {
    baseline_dir: PathBuf,
    diff_dir: PathBuf,

    /// Used when a scenario sets no threshold of its own, in percent
    threshold: f64,
}

impl VisualTester {
    pub fn new(config: VisualConfig) -> E2eResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;

        Ok(Self {
            baseline_dir: config.baseline_dir,
            diff_dir: config.diff_dir,
            threshold: config.threshold,
        })
    }

    pub fn baseline_path(&self, key: &str) -> PathBuf {
        self.baseline_dir.join(format!("{}.png", key))
    }

    /// Compare the screenshot at `actual_path` with the baseline for `key`
    pub fn compare(&self, actual_path: &Path, key: &str, threshold: Option<f64>) -> E2eResult<VisualDiff> {
        let threshold = threshold.unwrap_or(self.threshold);
        let baseline_path = self.baseline_path(key);

        if !actual_path.exists() {
            return Err(E2eError::VisualRegression(format!(
                "Screenshot not found: {}",
                actual_path.display()
            )));
        }
        if !baseline_path.exists() {
            return Err(E2eError::BaselineNotFound(
                baseline_path.to_string_lossy().into_owned(),
            ));
        }

        let actual_hash = hash_file(actual_path)?;
        let baseline_hash = hash_file(&baseline_path)?;
        let actual_img = image::open(actual_path)?;

        if actual_hash == baseline_hash {
            debug!("Screenshots match exactly (same hash)");
            return Ok(VisualDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels: actual_img.width() as u64 * actual_img.height() as u64,
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            });
        }

        let baseline_img = image::open(&baseline_path)?;
        if actual_img.dimensions() != baseline_img.dimensions() {
            warn!(
                "Screenshot dimensions differ for '{}': actual {:?} vs baseline {:?}",
                key,
                actual_img.dimensions(),
                baseline_img.dimensions()
            );
        }

        // Pixels outside the overlapping region count as different
        let (width, height) = (
            actual_img.width().max(baseline_img.width()),
            actual_img.height().max(baseline_img.height()),
        );
        let actual_rgba = actual_img.to_rgba8();
        let baseline_rgba = baseline_img.to_rgba8();

        let mut diff_img = RgbaImage::new(width, height);
        let mut diff_pixels = 0u64;
        let total_pixels = width as u64 * height as u64;

        for y in 0..height {
            for x in 0..width {
                let actual = pixel_at(&actual_rgba, x, y);
                let baseline = pixel_at(&baseline_rgba, x, y);

                match (actual, baseline) {
                    (Some(a), Some(b)) if !pixels_differ(a, b) => {
                        let c = a.channels();
                        diff_img.put_pixel(x, y, Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128]));
                    }
                    _ => {
                        diff_pixels += 1;
                        diff_img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
                    }
                }
            }
        }

        let diff_percent = if total_pixels == 0 {
            0.0
        } else {
            diff_pixels as f64 / total_pixels as f64 * 100.0
        };
        let matches = diff_percent <= threshold;

        let diff_image_path = if diff_pixels > 0 {
            let path = self.diff_dir.join(format!("{}-diff.png", key));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            diff_img.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "Visual difference in '{}': {:.2}% pixels differ (threshold: {:.2}%)",
                key, diff_percent, threshold
            );
        }

        Ok(VisualDiff {
            matches,
            diff_percent,
            diff_pixels,
            total_pixels,
            diff_image_path,
            actual_hash,
            baseline_hash,
        })
    }

    /// Replace the baseline for `key` with the screenshot at `actual_path`
    pub fn update_baseline(&self, actual_path: &Path, key: &str) -> E2eResult<()> {
        if !actual_path.exists() {
            return Err(E2eError::VisualRegression(format!(
                "Cannot update baseline: screenshot not found: {}",
                actual_path.display()
            )));
        }

        let baseline_path = self.baseline_path(key);
        if let Some(parent) = baseline_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(actual_path, &baseline_path)?;
        info!("Updated baseline for '{}'", key);

        Ok(())
    }
}

fn pixel_at(img: &RgbaImage, x: u32, y: u32) -> Option<&Rgba<u8>> {
    (x < img.width() && y < img.height()).then(|| img.get_pixel(x, y))
}

fn pixels_differ(a: &Rgba<u8>, b: &Rgba<u8>) -> bool {
    a.channels()
        .iter()
        .zip(b.channels())
        .any(|(x, y)| (*x as i32 - *y as i32).abs() > CHANNEL_TOLERANCE)
}

fn hash_file(path: &Path) -> E2eResult<String> {
    let data = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&data)))
}

/// Configuration for visual comparison
#[derive(Debug, Clone)]
pub struct VisualConfig {
    pub baseline_dir: PathBuf,
    pub diff_dir: PathBuf,
    pub threshold: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("test-results/baselines"),
            diff_dir: PathBuf::from("test-results/diffs"),
            threshold: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visual_config_default() {
        let config = VisualConfig::default();
        assert_eq!(config.threshold, 0.5);
    }

    #[test]
    fn test_pixels_differ_tolerance() {
        assert!(!pixels_differ(&Rgba([10, 10, 10, 255]), &Rgba([15, 5, 10, 255])));
        assert!(pixels_differ(&Rgba([10, 10, 10, 255]), &Rgba([16, 10, 10, 255])));
    }
}
