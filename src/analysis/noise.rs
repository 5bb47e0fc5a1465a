use image::RgbImage;
use ndarray::Array2;
use statrs::statistics::Statistics;

use crate::{
    detection::{Detector, DetectorKind, DetectorReport, DetectorStatus},
    error::{ForensicsError, Result},
    image_utils::{array_to_gray, gray_to_array, gray_to_rgb, reflect_101, rgb_to_gray},
};

pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 1000.0;

/// Centre 9, neighbours -1: unit DC gain, strong high-frequency boost.
pub const HIGH_PASS_KERNEL: [[f64; 3]; 3] = [
    [-1.0, -1.0, -1.0],
    [-1.0, 9.0, -1.0],
    [-1.0, -1.0, -1.0],
];

pub const HIGH_NOISE_VERDICT: &str =
    "High noise variance, may indicate tampering or inconsistent compression";
pub const LOW_NOISE_VERDICT: &str = "Low noise variance, consistent with a natural capture";

#[derive(Debug, Clone)]
pub struct NoiseResult {
    pub visualization: RgbImage,
    pub residual: Array2<f64>,
    pub variance: f64,
    pub high_variance: bool,
}

impl NoiseResult {
    pub fn verdict(&self) -> &'static str {
        if self.high_variance {
            HIGH_NOISE_VERDICT
        } else {
            LOW_NOISE_VERDICT
        }
    }

    pub fn is_uniform(&self) -> bool {
        self.variance == 0.0
    }
}

pub struct NoiseAnalyzer {
    variance_threshold: f64,
}

impl NoiseAnalyzer {
    pub fn new() -> Self {
        Self {
            variance_threshold: DEFAULT_VARIANCE_THRESHOLD,
        }
    }

    pub fn with_variance_threshold(mut self, threshold: f64) -> Self {
        self.variance_threshold = threshold;
        self
    }

    pub fn analyze(&self, image: &RgbImage) -> Result<NoiseResult> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ForensicsError::AnalysisFailed(
                "Cannot measure noise of an empty image".into(),
            ));
        }

        let gray = gray_to_array(&rgb_to_gray(image));
        let residual = high_pass(&gray);
        let variance = residual.iter().population_variance();

        log::debug!("Noise residual variance {:.2}", variance);

        Ok(NoiseResult {
            visualization: gray_to_rgb(&array_to_gray(&residual)),
            residual,
            variance,
            high_variance: variance > self.variance_threshold,
        })
    }
}

impl Default for NoiseAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for NoiseAnalyzer {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Noise
    }

    fn run(&self, image: &RgbImage) -> Result<DetectorReport> {
        let result = self.analyze(image)?;

        let mut report = DetectorReport::completed(Some(result.visualization.clone()), result.verdict())
            .with_score(result.variance);
        if result.is_uniform() {
            report.status = DetectorStatus::Degenerate;
            report.verdict = format!("{} (uniform image, no noise signal)", result.verdict());
        }

        Ok(report)
    }
}

pub fn noise_residual(image: &RgbImage) -> Result<NoiseResult> {
    NoiseAnalyzer::new().analyze(image)
}

// Mirrored borders, saturated to [0, 255] like an 8-bit filter output.
pub fn high_pass(gray: &Array2<f64>) -> Array2<f64> {
    let (height, width) = gray.dim();

    Array2::from_shape_fn((height, width), |(y, x)| {
        let mut sum = 0.0;

        for (ky, row) in HIGH_PASS_KERNEL.iter().enumerate() {
            for (kx, weight) in row.iter().enumerate() {
                let sy = reflect_101(y as i64 + ky as i64 - 1, height);
                let sx = reflect_101(x as i64 + kx as i64 - 1, width);
                sum += gray[[sy, sx]] * weight;
            }
        }

        sum.round().clamp(0.0, 255.0)
    })
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn jittered(width: u32, height: u32, base: u8, amplitude: u32, mut seed: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |_, _| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let offset = (seed >> 16) % (2 * amplitude + 1);
            let v = (base as u32 + offset).saturating_sub(amplitude).min(255) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn flat_image_has_zero_variance() {
        let image = RgbImage::from_pixel(20, 20, Rgb([90, 90, 90]));
        let result = NoiseAnalyzer::new().analyze(&image).unwrap();

        assert_eq!(result.variance, 0.0);
        assert!(result.is_uniform());
        assert_eq!(result.verdict(), LOW_NOISE_VERDICT);
    }

    #[test]
    fn uniform_image_is_reported_as_degenerate() {
        let image = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        let report = NoiseAnalyzer::new().run(&image).unwrap();
        assert_eq!(report.status, DetectorStatus::Degenerate);
        assert!(report.artifact.is_some());
    }

    #[test]
    fn kernel_preserves_flat_level() {
        let gray = Array2::from_elem((5, 5), 77.0);
        assert!(high_pass(&gray).iter().all(|&v| v == 77.0));
    }

    #[test]
    fn isolated_spike_is_amplified_and_saturated() {
        let mut gray = Array2::from_elem((5, 5), 10.0);
        gray[[2, 2]] = 20.0;
        let filtered = high_pass(&gray);
        assert_eq!(filtered[[2, 2]], 9.0 * 20.0 - 8.0 * 10.0);
        assert_eq!(filtered[[1, 1]], 0.0);

        gray[[2, 2]] = 40.0;
        assert_eq!(high_pass(&gray)[[2, 2]], 255.0);
    }

    #[test]
    fn faint_sensor_noise_is_low_variance() {
        let image = jittered(64, 64, 128, 2, 9);
        let result = NoiseAnalyzer::new().analyze(&image).unwrap();

        assert!(result.variance > 0.0);
        assert!(result.variance < DEFAULT_VARIANCE_THRESHOLD);
        assert_eq!(result.verdict(), LOW_NOISE_VERDICT);
    }

    #[test]
    fn strong_noise_is_high_variance() {
        let image = jittered(64, 64, 128, 127, 21);
        let result = NoiseAnalyzer::new().analyze(&image).unwrap();

        assert!(result.high_variance);
        assert_eq!(result.verdict(), HIGH_NOISE_VERDICT);
    }

    #[test]
    fn visualization_keeps_dimensions() {
        let image = jittered(31, 17, 100, 10, 1);
        let result = NoiseAnalyzer::new().analyze(&image).unwrap();
        assert_eq!(result.visualization.dimensions(), (31, 17));
        assert_eq!(result.residual.dim(), (17, 31));
    }
}
