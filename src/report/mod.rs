pub mod visualization;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    detection::{AnalysisResult, DetectorKind, DetectorStatus},
    error::Result,
};

#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub suspect: Option<String>,
    pub tampering_suspected: bool,
    pub detectors: BTreeMap<DetectorKind, DetectorSection>,
}

#[derive(Debug, Serialize)]
pub struct DetectorSection {
    pub status: DetectorStatus,
    pub verdict: String,
    pub has_artifact: bool,
    pub score: Option<f64>,
    pub metadata: Option<MetadataReportSection>,
}

#[derive(Debug, Serialize)]
pub struct MetadataReportSection {
    pub camera_info: Option<String>,
    pub software: Option<String>,
    pub date_time: Option<String>,
    pub gps_coordinates: Option<(f64, f64)>,
    pub suspicious_indicators: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl From<&AnalysisResult> for JsonReport {
    fn from(result: &AnalysisResult) -> Self {
        let detectors = result
            .reports
            .iter()
            .map(|(kind, report)| {
                let section = DetectorSection {
                    status: report.status,
                    verdict: report.verdict.clone(),
                    has_artifact: report.artifact.is_some(),
                    score: report.score,
                    metadata: report.metadata.as_ref().map(|m| MetadataReportSection {
                        camera_info: m.camera_model.clone().or_else(|| m.camera_make.clone()),
                        software: m.software.clone(),
                        date_time: m.date_time.clone(),
                        gps_coordinates: m.gps_coordinates,
                        suspicious_indicators: m.suspicious_indicators.clone(),
                        tags: m.tags.clone(),
                    }),
                };
                (*kind, section)
            })
            .collect();

        Self {
            suspect: None,
            tampering_suspected: tampering_suspected(result),
            detectors,
        }
    }
}

// Only the difference check sets this; the others are indicators.
fn tampering_suspected(result: &AnalysisResult) -> bool {
    result
        .get(DetectorKind::Diff)
        .is_some_and(|r| r.status == DetectorStatus::Completed && r.artifact.is_some())
}

impl JsonReport {
    pub fn for_suspect(id: impl Into<String>, result: &AnalysisResult) -> Self {
        let mut report = Self::from(result);
        report.suspect = Some(id.into());
        report
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;
    use crate::{detection::DetectorReport, metadata::MetadataResult};

    #[test]
    fn json_lists_every_detector() {
        let mut result = AnalysisResult::new();
        result.insert(
            DetectorKind::Diff,
            DetectorReport::completed(Some(RgbImage::new(2, 2)), "Tampering detected").with_score(90.0),
        );
        result.insert(DetectorKind::CopyMove, DetectorReport::degenerate("no texture"));
        result.insert(
            DetectorKind::Metadata,
            DetectorReport {
                artifact: None,
                verdict: "none".into(),
                status: DetectorStatus::Degenerate,
                score: None,
                metadata: Some(MetadataResult::diagnostic("Info", "No metadata found")),
            },
        );

        let report = JsonReport::for_suspect("a.png", &result);
        assert!(report.tampering_suspected);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["suspect"], "a.png");
        assert_eq!(json["detectors"]["diff"]["has_artifact"], true);
        assert_eq!(json["detectors"]["diff"]["score"], 90.0);
        assert_eq!(json["detectors"]["copy_move"]["status"], "degenerate");
        assert_eq!(
            json["detectors"]["metadata"]["metadata"]["tags"]["Info"],
            "No metadata found"
        );
    }

    #[test]
    fn untampered_diff_is_not_suspected() {
        let mut result = AnalysisResult::new();
        result.insert(DetectorKind::Diff, DetectorReport::completed(None, "No tampering detected"));
        assert!(!JsonReport::from(&result).tampering_suspected);
    }
}
