pub mod signature;
pub mod tampering;

use std::{collections::BTreeMap, fmt, fs, io::Cursor, path::Path, str::FromStr};

use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{ForensicsError, Result},
    metadata::MetadataResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Diff,
    Ela,
    Noise,
    CopyMove,
    Metadata,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 5] = [
        DetectorKind::Diff,
        DetectorKind::Ela,
        DetectorKind::Noise,
        DetectorKind::CopyMove,
        DetectorKind::Metadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Diff => "diff",
            DetectorKind::Ela => "ela",
            DetectorKind::Noise => "noise",
            DetectorKind::CopyMove => "copy_move",
            DetectorKind::Metadata => "metadata",
        }
    }

    pub fn is_pairwise(&self) -> bool {
        matches!(self, DetectorKind::Diff)
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorKind {
    type Err = ForensicsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "diff" | "difference" => Ok(DetectorKind::Diff),
            "ela" => Ok(DetectorKind::Ela),
            "noise" => Ok(DetectorKind::Noise),
            "copy_move" | "copymove" | "copy-move" => Ok(DetectorKind::CopyMove),
            "metadata" | "exif" => Ok(DetectorKind::Metadata),
            other => Err(ForensicsError::UnknownDetector(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for DetectorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses a comma separated method list such as `"ela, noise,copymove"`.
/// Blank entries are skipped; an empty list selects nothing.
pub fn parse_selection(raw: &str) -> Result<Vec<DetectorKind>> {
    let mut kinds = Vec::new();

    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let kind = part.parse::<DetectorKind>()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    Ok(kinds)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStatus {
    Completed,
    /// The input carried too little signal; the verdict explains why.
    Degenerate,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DetectorReport {
    pub artifact: Option<RgbImage>,
    pub verdict: String,
    pub status: DetectorStatus,
    pub score: Option<f64>,
    pub metadata: Option<MetadataResult>,
}

impl DetectorReport {
    pub fn completed(artifact: Option<RgbImage>, verdict: impl Into<String>) -> Self {
        Self {
            artifact,
            verdict: verdict.into(),
            status: DetectorStatus::Completed,
            score: None,
            metadata: None,
        }
    }

    pub fn degenerate(verdict: impl Into<String>) -> Self {
        Self {
            artifact: None,
            verdict: verdict.into(),
            status: DetectorStatus::Degenerate,
            score: None,
            metadata: None,
        }
    }

    pub fn failed(error: &ForensicsError) -> Self {
        Self {
            artifact: None,
            verdict: format!("Analysis failed: {}", error),
            status: DetectorStatus::Failed,
            score: None,
            metadata: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn artifact_png(&self) -> Result<Option<Vec<u8>>> {
        match &self.artifact {
            Some(image) => Ok(Some(encode_png(image)?)),
            None => Ok(None),
        }
    }
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub reports: BTreeMap<DetectorKind, DetectorReport>,
}

impl AnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: DetectorKind, report: DetectorReport) {
        self.reports.insert(kind, report);
    }

    pub fn get(&self, kind: DetectorKind) -> Option<&DetectorReport> {
        self.reports.get(&kind)
    }

    pub fn verdict(&self, kind: DetectorKind) -> Option<&str> {
        self.reports.get(&kind).map(|r| r.verdict.as_str())
    }

    pub fn artifact_png(&self, kind: DetectorKind) -> Result<Option<Vec<u8>>> {
        match self.reports.get(&kind) {
            Some(report) => report.artifact_png(),
            None => Ok(None),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&DetectorKind, &DetectorReport)> {
        self.reports
            .iter()
            .filter(|(_, r)| r.status == DetectorStatus::Failed)
    }

    /// Writes every artifact as `<stem>_<detector>.png` into `directory` and
    /// returns the written paths.
    pub fn save_artifacts<P: AsRef<Path>>(&self, directory: P, stem: &str) -> Result<Vec<String>> {
        fs::create_dir_all(&directory)?;
        let mut written = Vec::new();

        for (kind, report) in &self.reports {
            if let Some(ref artifact) = report.artifact {
                let path = directory.as_ref().join(format!("{}_{}.png", stem, kind));
                artifact.save(&path)?;
                written.push(path.to_string_lossy().to_string());
            }
        }

        Ok(written)
    }
}

pub trait Detector: Sync {
    fn kind(&self) -> DetectorKind;

    fn run(&self, image: &RgbImage) -> Result<DetectorReport>;
}
