use image::{GrayImage, RgbImage};
use imageproc::{corners::corners_fast9, filter::gaussian_blur_f32};
use rayon::iter::{IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::{
    detection::{Detector, DetectorKind, DetectorReport},
    error::{ForensicsError, Result},
    image_utils::rgb_to_gray,
    report::visualization::Visualizer,
};

pub const DEFAULT_MAX_KEYPOINTS: usize = 1000;
pub const DEFAULT_FAST_THRESHOLD: u8 = 20;
pub const DEFAULT_MAX_HAMMING: u32 = 48;
pub const DEFAULT_MIN_DISTANCE: f64 = 10.0;
pub const MAX_DRAWN_MATCHES: usize = 20;

const DESCRIPTOR_WORDS: usize = 4;
const DESCRIPTOR_BITS: usize = DESCRIPTOR_WORDS * 64;
const SAMPLE_RADIUS: i32 = 13;
const MOMENT_RADIUS: i32 = 15;
const BORDER: u32 = 16;
const BLUR_SIGMA: f32 = 2.0;
const PATTERN_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: u32,
    pub y: u32,
    pub score: f32,
    pub angle: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor([u64; DESCRIPTOR_WORDS]);

impl Descriptor {
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeypointMatch {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
    pub source: (u32, u32),
    pub target: (u32, u32),
}

impl KeypointMatch {
    pub fn spatial_distance(&self) -> f64 {
        let dx = self.source.0 as f64 - self.target.0 as f64;
        let dy = self.source.1 as f64 - self.target.1 as f64;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self) -> (i64, i64) {
        (
            self.target.0 as i64 - self.source.0 as i64,
            self.target.1 as i64 - self.source.1 as i64,
        )
    }
}

#[derive(Debug, Clone)]
pub struct CopyMoveResult {
    pub visualization: Option<RgbImage>,
    pub keypoint_count: usize,
    pub matches: Vec<KeypointMatch>,
}

impl CopyMoveResult {
    pub fn is_degenerate(&self) -> bool {
        self.keypoint_count < 2
    }

    pub fn verdict(&self) -> String {
        if self.is_degenerate() {
            format!(
                "Insufficient texture for copy-move analysis ({} keypoint(s) detected)",
                self.keypoint_count
            )
        } else {
            format!(
                "{} matching keypoint pair(s) found among {} keypoints; \
                 repetitive textures can also produce matches, review visually",
                self.matches.len(),
                self.keypoint_count
            )
        }
    }
}

type SamplePair = ((i32, i32), (i32, i32));

pub struct CopyMoveDetector {
    max_keypoints: usize,
    min_distance: f64,
    discard_exact: bool,
    visualizer: Visualizer,
}

impl CopyMoveDetector {
    pub fn new(max_keypoints: usize, min_distance: f64) -> Result<Self> {
        if max_keypoints < 2 {
            return Err(ForensicsError::InvalidParameter(
                "At least 2 keypoints are needed for self-matching".into(),
            ));
        }
        if min_distance.is_nan() || min_distance < 0.0 {
            return Err(ForensicsError::InvalidParameter(
                "Minimum match distance must be non-negative".into(),
            ));
        }

        Ok(Self {
            max_keypoints,
            min_distance,
            discard_exact: false,
            visualizer: Visualizer::new(),
        })
    }

    /// Drops pairs whose descriptors are identical. Off by default.
    pub fn with_discard_exact(mut self, discard: bool) -> Self {
        self.discard_exact = discard;
        self
    }

    pub fn detect(&self, image: &RgbImage) -> Result<CopyMoveResult> {
        let (width, height) = image.dimensions();
        let gray = rgb_to_gray(image);
        let (smoothed, keypoints) = if width > 2 * BORDER && height > 2 * BORDER {
            let smoothed = gaussian_blur_f32(&gray, BLUR_SIGMA);
            let keypoints = self.extract_keypoints(&gray, &smoothed);
            (smoothed, keypoints)
        } else {
            (gray, Vec::new())
        };

        if keypoints.len() < 2 {
            log::debug!("Copy-move: only {} keypoint(s), skipping", keypoints.len());
            return Ok(CopyMoveResult {
                visualization: None,
                keypoint_count: keypoints.len(),
                matches: Vec::new(),
            });
        }

        let pattern = sampling_pattern();
        let descriptors = keypoints
            .par_iter()
            .map(|kp| describe(&smoothed, kp, &pattern))
            .collect::<Vec<_>>();

        let matches = self.match_descriptors(&keypoints, &descriptors);
        let visualization = self.create_visualization(image, &matches);

        log::info!(
            "Copy-move: {} keypoints, {} surviving match(es)",
            keypoints.len(),
            matches.len()
        );

        Ok(CopyMoveResult {
            visualization: Some(visualization),
            keypoint_count: keypoints.len(),
            matches,
        })
    }

    // Caller guarantees the image is larger than 2 * BORDER both ways.
    fn extract_keypoints(&self, gray: &GrayImage, smoothed: &GrayImage) -> Vec<Keypoint> {
        let (width, height) = gray.dimensions();
        let mut corners = corners_fast9(gray, DEFAULT_FAST_THRESHOLD)
            .into_iter()
            .filter(|c| {
                c.x >= BORDER && c.y >= BORDER && c.x < width - BORDER && c.y < height - BORDER
            })
            .collect::<Vec<_>>();

        corners.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        corners.truncate(self.max_keypoints);

        corners
            .into_iter()
            .map(|c| Keypoint {
                x: c.x,
                y: c.y,
                score: c.score,
                angle: intensity_centroid_angle(smoothed, c.x, c.y),
            })
            .collect()
    }

    // Candidates closer than min_distance, the keypoint itself included, are
    // skipped before the mutual check.
    fn match_descriptors(&self, keypoints: &[Keypoint], descriptors: &[Descriptor]) -> Vec<KeypointMatch> {
        let min_sq = self.min_distance * self.min_distance;

        let best = (0..keypoints.len())
            .into_par_iter()
            .map(|i| {
                let mut best: Option<(u32, usize)> = None;

                for j in 0..keypoints.len() {
                    if j == i || squared_distance(&keypoints[i], &keypoints[j]) < min_sq {
                        continue;
                    }

                    let distance = descriptors[i].hamming(&descriptors[j]);
                    if best.is_none_or(|(d, _)| distance < d) {
                        best = Some((distance, j));
                    }
                }

                best
            })
            .collect::<Vec<_>>();

        let mut matches = best
            .iter()
            .enumerate()
            .filter_map(|(i, candidate)| {
                let (distance, j) = (*candidate)?;
                let mutual = matches!(best[j], Some((_, back)) if back == i);

                if !mutual || i > j {
                    return None;
                }
                if distance > DEFAULT_MAX_HAMMING || (self.discard_exact && distance == 0) {
                    return None;
                }

                Some(KeypointMatch {
                    query: i,
                    train: j,
                    distance,
                    source: (keypoints[i].x, keypoints[i].y),
                    target: (keypoints[j].x, keypoints[j].y),
                })
            })
            .collect::<Vec<_>>();

        matches.sort_by_key(|m| (m.distance, m.query, m.train));
        matches
    }

    fn create_visualization(&self, original: &RgbImage, matches: &[KeypointMatch]) -> RgbImage {
        let mut vis = original.clone();

        for (i, m) in matches.iter().take(MAX_DRAWN_MATCHES).enumerate() {
            let color = self.visualizer.palette_color(i);
            self.visualizer.draw_match(&mut vis, m.source, m.target, color);
        }

        vis
    }
}

impl Default for CopyMoveDetector {
    fn default() -> Self {
        Self {
            max_keypoints: DEFAULT_MAX_KEYPOINTS,
            min_distance: DEFAULT_MIN_DISTANCE,
            discard_exact: false,
            visualizer: Visualizer::new(),
        }
    }
}

impl Detector for CopyMoveDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::CopyMove
    }

    fn run(&self, image: &RgbImage) -> Result<DetectorReport> {
        let result = self.detect(image)?;

        if result.is_degenerate() {
            return Ok(DetectorReport::degenerate(result.verdict()));
        }

        let verdict = result.verdict();
        Ok(DetectorReport::completed(result.visualization, verdict)
            .with_score(result.matches.len() as f64))
    }
}

pub fn copy_move(image: &RgbImage) -> Result<CopyMoveResult> {
    CopyMoveDetector::default().detect(image)
}

fn squared_distance(a: &Keypoint, b: &Keypoint) -> f64 {
    let dx = a.x as f64 - b.x as f64;
    let dy = a.y as f64 - b.y as f64;
    dx * dx + dy * dy
}

fn intensity_centroid_angle(gray: &GrayImage, cx: u32, cy: u32) -> f32 {
    let mut m10 = 0.0f64;
    let mut m01 = 0.0f64;

    for dy in -MOMENT_RADIUS..=MOMENT_RADIUS {
        for dx in -MOMENT_RADIUS..=MOMENT_RADIUS {
            if dx * dx + dy * dy > MOMENT_RADIUS * MOMENT_RADIUS {
                continue;
            }
            let x = (cx as i32 + dx) as u32;
            let y = (cy as i32 + dy) as u32;
            let intensity = gray.get_pixel(x, y)[0] as f64;
            m10 += dx as f64 * intensity;
            m01 += dy as f64 * intensity;
        }
    }

    m01.atan2(m10) as f32
}

fn describe(smoothed: &GrayImage, keypoint: &Keypoint, pattern: &[SamplePair]) -> Descriptor {
    let (sin, cos) = keypoint.angle.sin_cos();
    let sample = |(dx, dy): (i32, i32)| {
        let rx = (dx as f32 * cos - dy as f32 * sin).round() as i32;
        let ry = (dx as f32 * sin + dy as f32 * cos).round() as i32;
        let x = (keypoint.x as i32 + rx) as u32;
        let y = (keypoint.y as i32 + ry) as u32;
        smoothed.get_pixel(x, y)[0]
    };

    let mut words = [0u64; DESCRIPTOR_WORDS];
    for (bit, &(p, q)) in pattern.iter().enumerate() {
        if sample(p) < sample(q) {
            words[bit / 64] |= 1u64 << (bit % 64);
        }
    }

    Descriptor(words)
}

fn sampling_pattern() -> Vec<SamplePair> {
    let mut state = PATTERN_SEED;
    let mut next_offset = || loop {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;

        let span = (2 * SAMPLE_RADIUS + 1) as u64;
        let dx = (state % span) as i32 - SAMPLE_RADIUS;
        let dy = ((state >> 32) % span) as i32 - SAMPLE_RADIUS;
        if dx * dx + dy * dy <= SAMPLE_RADIUS * SAMPLE_RADIUS {
            return (dx, dy);
        }
    };

    let mut pattern = Vec::with_capacity(DESCRIPTOR_BITS);
    while pattern.len() < DESCRIPTOR_BITS {
        let p = next_offset();
        let q = next_offset();
        if p != q {
            pattern.push((p, q));
        }
    }

    pattern
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn lcg(mut seed: u32) -> impl FnMut() -> u8 {
        move || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 24) as u8
        }
    }

    fn noise_image(width: u32, height: u32, seed: u32) -> RgbImage {
        let mut next = lcg(seed);
        RgbImage::from_fn(width, height, |_, _| {
            let v = next();
            Rgb([v, v, v])
        })
    }

    fn duplicated_patch() -> RgbImage {
        let patch = noise_image(80, 80, 42);
        let mut image = RgbImage::from_pixel(240, 130, Rgb([128, 128, 128]));

        for (x, y, pixel) in patch.enumerate_pixels() {
            image.put_pixel(25 + x, 25 + y, *pixel);
            image.put_pixel(135 + x, 25 + y, *pixel);
        }

        image
    }

    #[test]
    fn pattern_is_stable_and_inside_disc() {
        let a = sampling_pattern();
        let b = sampling_pattern();

        assert_eq!(a.len(), DESCRIPTOR_BITS);
        assert_eq!(a, b);
        for ((px, py), (qx, qy)) in a {
            assert!(px * px + py * py <= SAMPLE_RADIUS * SAMPLE_RADIUS);
            assert!(qx * qx + qy * qy <= SAMPLE_RADIUS * SAMPLE_RADIUS);
        }
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let a = Descriptor([0b1011, 0, 0, u64::MAX]);
        let b = Descriptor([0b0001, 0, 0, 0]);
        assert_eq!(a.hamming(&b), 2 + 64);
        assert_eq!(a.hamming(&a), 0);
    }

    #[test]
    fn rejects_too_few_keypoints() {
        assert!(CopyMoveDetector::new(1, 10.0).is_err());
        assert!(CopyMoveDetector::new(100, -1.0).is_err());
        assert!(CopyMoveDetector::new(100, 10.0).is_ok());
    }

    #[test]
    fn flat_image_is_degenerate() {
        let image = RgbImage::from_pixel(100, 100, Rgb([60, 60, 60]));
        let detector = CopyMoveDetector::default();
        let result = detector.detect(&image).unwrap();

        assert!(result.is_degenerate());
        assert!(result.visualization.is_none());
        assert!(result.verdict().starts_with("Insufficient texture"));

        let report = detector.run(&image).unwrap();
        assert_eq!(report.status, crate::detection::DetectorStatus::Degenerate);
        assert!(report.artifact.is_none());
    }

    #[test]
    fn tiny_image_is_degenerate() {
        let image = noise_image(20, 20, 1);
        assert!(CopyMoveDetector::default().detect(&image).unwrap().is_degenerate());
    }

    #[test]
    fn random_noise_has_no_duplicates() {
        let image = noise_image(128, 128, 1234);
        let result = CopyMoveDetector::default().detect(&image).unwrap();

        assert!(result.keypoint_count >= 2);
        assert!(result.matches.len() <= 2, "got {} matches", result.matches.len());
    }

    fn shifted_by_copy(result: &CopyMoveResult) -> usize {
        result
            .matches
            .iter()
            .filter(|m| {
                let (dx, dy) = m.offset();
                dx.abs() == 110 && dy == 0
            })
            .count()
    }

    #[test]
    fn exact_copy_is_found_with_defaults() {
        let result = copy_move(&duplicated_patch()).unwrap();

        assert_eq!(result.keypoint_count, DEFAULT_MAX_KEYPOINTS);
        assert!(shifted_by_copy(&result) > 0);
        assert!(result.matches.iter().any(|m| m.distance == 0));
        assert!(result.matches.iter().all(|m| m.spatial_distance() >= DEFAULT_MIN_DISTANCE));
        assert!(result.verdict().starts_with(&format!("{} matching", result.matches.len())));
        assert!(result.visualization.is_some());
    }

    #[test]
    fn discarding_identical_descriptors_is_opt_in() {
        let image = duplicated_patch();
        let kept = CopyMoveDetector::default().detect(&image).unwrap();
        let dropped = CopyMoveDetector::default()
            .with_discard_exact(true)
            .detect(&image)
            .unwrap();

        let exact = kept.matches.iter().filter(|m| m.distance == 0).count();
        assert!(exact > 0);
        assert!(dropped.matches.iter().all(|m| m.distance > 0));
        assert_eq!(dropped.matches.len(), kept.matches.len() - exact);
    }

    #[test]
    fn matching_is_deterministic() {
        let image = duplicated_patch();
        let detector = CopyMoveDetector::default();

        let first = detector.detect(&image).unwrap();
        let second = detector.detect(&image).unwrap();
        assert_eq!(first.matches, second.matches);
        assert_eq!(first.visualization, second.visualization);
    }

    #[test]
    fn matches_are_unique_pairs() {
        let image = duplicated_patch();
        let result = CopyMoveDetector::default().detect(&image).unwrap();

        for m in &result.matches {
            assert!(m.query < m.train);
            assert!(m.distance <= DEFAULT_MAX_HAMMING);
        }
    }
}
