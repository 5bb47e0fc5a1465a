use image::RgbImage;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{copy_move::CopyMoveDetector, ela::ElaAnalyzer, noise::NoiseAnalyzer},
    detection::{Detector, DetectorStatus, tampering::DifferenceDetector},
    error::{ForensicsError, Result},
    image_utils::{normalize_pair, prepare_image},
};

pub mod analysis;
pub mod detection;
pub mod error;
pub mod image_utils;
pub mod metadata;
pub mod report;

pub use crate::{
    analysis::{copy_move::copy_move, ela::ela, noise::noise_residual},
    detection::{
        AnalysisResult, DetectorKind, DetectorReport,
        signature::{SignatureKey, place_signature},
        tampering::detect_differences,
    },
    metadata::{MetadataResult, extract_metadata},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Per-pixel energy above which a pixel counts as changed.
    pub threshold: u32,
    pub padding: u32,
    pub ela_quality: u8,
    pub ela_threshold: f64,
    pub noise_variance_threshold: f64,
    pub max_keypoints: usize,
    pub min_match_distance: f64,
    pub discard_exact_matches: bool,
    /// Longest side allowed before analysis; 0 keeps the input size.
    pub max_dimension: u32,
    /// Empty runs every check.
    pub selected_detectors: Vec<DetectorKind>,
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold: detection::tampering::DEFAULT_THRESHOLD,
            padding: detection::tampering::DEFAULT_PADDING,
            ela_quality: analysis::ela::DEFAULT_QUALITY,
            ela_threshold: analysis::ela::DEFAULT_THRESHOLD,
            noise_variance_threshold: analysis::noise::DEFAULT_VARIANCE_THRESHOLD,
            max_keypoints: analysis::copy_move::DEFAULT_MAX_KEYPOINTS,
            min_match_distance: analysis::copy_move::DEFAULT_MIN_DISTANCE,
            discard_exact_matches: false,
            max_dimension: 1024,
            selected_detectors: Vec::new(),
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_detectors(mut self, detectors: &[DetectorKind]) -> Self {
        self.selected_detectors = detectors.to_vec();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.ela_quality) {
            return Err(ForensicsError::InvalidParameter(format!(
                "ela_quality must be between 1 and 100, got {}",
                self.ela_quality
            )));
        }
        if !self.ela_threshold.is_finite() || self.ela_threshold < 0.0 {
            return Err(ForensicsError::InvalidParameter(
                "ela_threshold must be a non-negative number".into(),
            ));
        }
        if !self.noise_variance_threshold.is_finite() || self.noise_variance_threshold < 0.0 {
            return Err(ForensicsError::InvalidParameter(
                "noise_variance_threshold must be a non-negative number".into(),
            ));
        }
        if self.max_keypoints < 2 {
            return Err(ForensicsError::InvalidParameter(
                "max_keypoints must be at least 2".into(),
            ));
        }
        if !self.min_match_distance.is_finite() || self.min_match_distance < 0.0 {
            return Err(ForensicsError::InvalidParameter(
                "min_match_distance must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    /// The checks to run, in their canonical order.
    pub fn detectors(&self) -> Vec<DetectorKind> {
        DetectorKind::ALL
            .into_iter()
            .filter(|k| self.selected_detectors.is_empty() || self.selected_detectors.contains(k))
            .collect()
    }
}

/// Axis-aligned box with exclusive upper bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x_start: u32,
    pub y_start: u32,
    pub x_stop: u32,
    pub y_stop: u32,
}

impl Region {
    pub fn width(&self) -> u32 {
        self.x_stop - self.x_start
    }

    pub fn height(&self) -> u32 {
        self.y_stop - self.y_start
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn padded(&self, padding: u32, width: u32, height: u32) -> Region {
        Region {
            x_start: self.x_start.saturating_sub(padding),
            y_start: self.y_start.saturating_sub(padding),
            x_stop: self.x_stop.saturating_add(padding).min(width),
            y_stop: self.y_stop.saturating_add(padding).min(height),
        }
    }

    pub fn contains(&self, other: &Region) -> bool {
        self.x_start <= other.x_start
            && self.y_start <= other.y_start
            && self.x_stop >= other.x_stop
            && self.y_stop >= other.y_stop
    }
}

#[derive(Debug, Clone)]
pub struct SuspectImage {
    pub id: String,
    pub image: RgbImage,
    pub encoded: Option<Vec<u8>>,
}

impl SuspectImage {
    pub fn new(id: impl Into<String>, image: RgbImage) -> Self {
        Self {
            id: id.into(),
            image,
            encoded: None,
        }
    }

    pub fn from_bytes(id: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let image = image::load_from_memory(&bytes)?.to_rgb8();
        Ok(Self {
            id: id.into(),
            image,
            encoded: Some(bytes),
        })
    }

    pub fn with_encoded(mut self, bytes: Vec<u8>) -> Self {
        self.encoded = Some(bytes);
        self
    }
}

pub struct ForensicsAnalyzer {
    config: AnalysisConfig,
}

impl ForensicsAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Pairwise checks that were explicitly selected come back degenerate.
    pub fn analyze_single(&self, image: &RgbImage, encoded: Option<&[u8]>) -> AnalysisResult {
        let prepared = prepare_image(image, self.config.max_dimension);
        let mut result = AnalysisResult::new();

        for kind in self.config.selected_detectors.iter().filter(|k| k.is_pairwise()) {
            result.insert(
                *kind,
                DetectorReport::degenerate(format!("The {} check needs an original image", kind)),
            );
        }

        self.run_single_image_checks(&prepared, encoded, &mut result);
        result
    }

    pub fn analyze_pair(
        &self,
        original: &RgbImage,
        suspect: &SuspectImage,
        key: &SignatureKey,
    ) -> AnalysisResult {
        let original = prepare_image(original, self.config.max_dimension);
        let suspect_image = normalize_pair(
            &original,
            &prepare_image(&suspect.image, self.config.max_dimension),
        );
        let mut result = AnalysisResult::new();

        if self.config.detectors().contains(&DetectorKind::Diff) {
            let report = isolate(DetectorKind::Diff, || {
                self.run_difference(&original, &suspect_image, key)
            });
            result.insert(DetectorKind::Diff, report);
        }

        self.run_single_image_checks(&suspect_image, suspect.encoded.as_deref(), &mut result);

        log::info!(
            "Suspect '{}' analysed with {} check(s), {} failure(s)",
            suspect.id,
            result.reports.len(),
            result.failures().count()
        );
        result
    }

    /// Analyses every suspect against the same original. Suspects are
    /// independent and run on the rayon pool when `parallel` is set; the
    /// returned list is ordered by suspect id.
    pub fn analyze_suspects(
        &self,
        original: &RgbImage,
        suspects: &[SuspectImage],
        key: &SignatureKey,
    ) -> Vec<(String, AnalysisResult)> {
        let mut results = if self.config.parallel {
            suspects
                .par_iter()
                .map(|s| (s.id.clone(), self.analyze_pair(original, s, key)))
                .collect::<Vec<_>>()
        } else {
            suspects
                .iter()
                .map(|s| (s.id.clone(), self.analyze_pair(original, s, key)))
                .collect::<Vec<_>>()
        };

        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    fn run_difference(
        &self,
        original: &RgbImage,
        suspect: &RgbImage,
        key: &SignatureKey,
    ) -> Result<DetectorReport> {
        let detector = DifferenceDetector::new(self.config.threshold).with_padding(self.config.padding);
        let diff = detector.detect(original, suspect, key)?;
        let verdict = diff.verdict();
        let score = diff.max_energy as f64;

        let artifact = if diff.tampered { Some(diff.annotated) } else { None };
        Ok(DetectorReport::completed(artifact, verdict).with_score(score))
    }

    fn run_single_image_checks(
        &self,
        image: &RgbImage,
        encoded: Option<&[u8]>,
        result: &mut AnalysisResult,
    ) {
        for kind in self.config.detectors() {
            if kind.is_pairwise() || kind == DetectorKind::Metadata {
                continue;
            }
            let report = isolate(kind, || {
                let detector = self.build_detector(kind)?;
                log::debug!("Running {} check", detector.kind());
                detector.run(image)
            });
            result.insert(kind, report);
        }

        if self.config.detectors().contains(&DetectorKind::Metadata) {
            let metadata = extract_metadata(encoded);
            let report = DetectorReport {
                artifact: None,
                verdict: metadata.verdict(),
                status: if metadata.has_metadata() {
                    DetectorStatus::Completed
                } else {
                    DetectorStatus::Degenerate
                },
                score: None,
                metadata: Some(metadata),
            };
            result.insert(DetectorKind::Metadata, report);
        }
    }

    fn build_detector(&self, kind: DetectorKind) -> Result<Box<dyn Detector>> {
        let config = &self.config;

        match kind {
            DetectorKind::Ela => Ok(Box::new(
                ElaAnalyzer::new(config.ela_quality).with_threshold(config.ela_threshold),
            )),
            DetectorKind::Noise => Ok(Box::new(
                NoiseAnalyzer::new().with_variance_threshold(config.noise_variance_threshold),
            )),
            DetectorKind::CopyMove => Ok(Box::new(
                CopyMoveDetector::new(config.max_keypoints, config.min_match_distance)?
                    .with_discard_exact(config.discard_exact_matches),
            )),
            DetectorKind::Diff | DetectorKind::Metadata => Err(ForensicsError::AnalysisFailed(
                format!("{} is not a single-image check", kind),
            )),
        }
    }
}

impl Default for ForensicsAnalyzer {
    fn default() -> Self {
        Self {
            config: AnalysisConfig::default(),
        }
    }
}

fn isolate<F>(kind: DetectorKind, run: F) -> DetectorReport
where
    F: FnOnce() -> Result<DetectorReport>,
{
    match run() {
        Ok(report) => report,
        Err(e) => {
            log::warn!("{} check failed: {}", kind, e);
            DetectorReport::failed(&e)
        }
    }
}
