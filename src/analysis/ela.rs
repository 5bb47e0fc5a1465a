use std::io::Cursor;

use image::{RgbImage, codecs::jpeg::JpegEncoder};

use crate::{
    detection::{Detector, DetectorKind, DetectorReport},
    error::{ForensicsError, Result},
    report::visualization::scale_brightness,
};

pub const DEFAULT_QUALITY: u8 = 90;
pub const DEFAULT_THRESHOLD: f64 = 30.0;

pub const HIGH_ARTIFACTS_VERDICT: &str = "High recompression artifacts, possible tampering";
pub const MINIMAL_ARTIFACTS_VERDICT: &str = "Minimal differences, likely untampered";

#[derive(Debug, Clone)]
pub struct ElaResult {
    /// Residual stretched so the brightest value maps to 255.
    pub visualization: RgbImage,
    pub residual: RgbImage,
    pub max_difference: f64,
    pub mean_difference: f64,
    pub scale: f64,
    pub suspicious: bool,
}

impl ElaResult {
    pub fn verdict(&self) -> &'static str {
        if self.suspicious {
            HIGH_ARTIFACTS_VERDICT
        } else {
            MINIMAL_ARTIFACTS_VERDICT
        }
    }
}

pub struct ElaAnalyzer {
    quality: u8,
    threshold: f64,
}

impl ElaAnalyzer {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn analyze(&self, image: &RgbImage) -> Result<ElaResult> {
        if !(1..=100).contains(&self.quality) {
            return Err(ForensicsError::InvalidParameter(format!(
                "ELA quality must be between 1 and 100, got {}",
                self.quality
            )));
        }

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ForensicsError::AnalysisFailed(
                "Cannot recompress an empty image".into(),
            ));
        }

        let recompressed = recompress_jpeg(image, self.quality)?;

        let mut residual = RgbImage::new(width, height);
        let mut max_difference = 0u8;
        let mut total = 0u64;

        for ((x, y, orig), recomp) in image.enumerate_pixels().zip(recompressed.pixels()) {
            let mut diff = [0u8; 3];
            for c in 0..3 {
                diff[c] = orig[c].abs_diff(recomp[c]);
                max_difference = max_difference.max(diff[c]);
                total += diff[c] as u64;
            }
            residual.put_pixel(x, y, image::Rgb(diff));
        }

        let samples = (width as u64 * height as u64 * 3).max(1);
        let mean_difference = total as f64 / samples as f64;
        let scale = normalization_scale(max_difference);
        let visualization = scale_brightness(&residual, scale);
        let suspicious = max_difference as f64 > self.threshold;

        log::debug!(
            "ELA at quality {}: max residual {}, mean {:.3}",
            self.quality,
            max_difference,
            mean_difference
        );

        Ok(ElaResult {
            visualization,
            residual,
            max_difference: max_difference as f64,
            mean_difference,
            scale,
            suspicious,
        })
    }
}

impl Default for ElaAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl Detector for ElaAnalyzer {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Ela
    }

    fn run(&self, image: &RgbImage) -> Result<DetectorReport> {
        let result = self.analyze(image)?;
        Ok(DetectorReport::completed(Some(result.visualization.clone()), result.verdict())
            .with_score(result.max_difference))
    }
}

pub fn ela(image: &RgbImage, quality: u8) -> Result<ElaResult> {
    ElaAnalyzer::new(quality).analyze(image)
}

pub fn normalization_scale(max_difference: u8) -> f64 {
    if max_difference == 0 {
        1.0
    } else {
        255.0 / max_difference as f64
    }
}

pub fn recompress_jpeg(image: &RgbImage, quality: u8) -> Result<RgbImage> {
    let mut buffer = Cursor::new(Vec::new());

    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image.write_with_encoder(encoder)?;

    let recompressed = image::load_from_memory(buffer.get_ref())?;
    Ok(recompressed.to_rgb8())
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn noise_image(width: u32, height: u32, mut seed: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |_, _| {
            let mut next = || {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 24) as u8
            };
            Rgb([next(), next(), next()])
        })
    }

    #[test]
    fn test_ela_analyzer_creation() {
        let analyzer = ElaAnalyzer::new(95);
        assert_eq!(analyzer.quality, 95);
        assert_eq!(analyzer.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn zero_residual_uses_unit_scale() {
        assert_eq!(normalization_scale(0), 1.0);
        assert_eq!(normalization_scale(51), 5.0);
    }

    #[test]
    fn flat_image_survives_recompression() {
        let image = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        let result = ElaAnalyzer::default().analyze(&image).unwrap();

        assert!(result.max_difference <= 1.0);
        assert!(!result.suspicious);
        assert_eq!(result.verdict(), MINIMAL_ARTIFACTS_VERDICT);
    }

    #[test]
    fn visualization_stretches_to_full_range() {
        let image = noise_image(48, 48, 7);
        let result = ElaAnalyzer::default().analyze(&image).unwrap();

        assert!(result.max_difference > 0.0);
        let brightest = result
            .visualization
            .pixels()
            .flat_map(|p| p.0)
            .max()
            .unwrap();
        assert_eq!(brightest, 255);
    }

    #[test]
    fn threshold_decides_verdict() {
        let image = noise_image(48, 48, 11);
        let strict = ElaAnalyzer::default().with_threshold(0.0).analyze(&image).unwrap();
        let lenient = ElaAnalyzer::default().with_threshold(255.0).analyze(&image).unwrap();

        assert_eq!(strict.verdict(), HIGH_ARTIFACTS_VERDICT);
        assert_eq!(lenient.verdict(), MINIMAL_ARTIFACTS_VERDICT);
    }

    #[test]
    fn repeated_recompression_does_not_grow_residual() {
        let image = noise_image(64, 64, 3);
        let analyzer = ElaAnalyzer::default();
        let first = analyzer.analyze(&image).unwrap();

        let mut settled = image.clone();
        for _ in 0..4 {
            settled = recompress_jpeg(&settled, DEFAULT_QUALITY).unwrap();
        }
        let later = analyzer.analyze(&settled).unwrap();

        assert!(later.max_difference <= first.max_difference);
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        let image = RgbImage::new(8, 8);
        assert!(matches!(
            ElaAnalyzer::new(0).analyze(&image),
            Err(ForensicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn input_buffer_is_not_modified() {
        let image = noise_image(16, 16, 5);
        let copy = image.clone();
        let _ = ElaAnalyzer::default().analyze(&image).unwrap();
        assert_eq!(image, copy);
    }
}
