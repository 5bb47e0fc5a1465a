pub mod exif;

use std::collections::BTreeMap;

use serde::Serialize;

pub use self::exif::{ExifExtractor, extract_metadata};

pub const INFO_KEY: &str = "Info";
pub const ERROR_KEY: &str = "Error";

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataResult {
    /// Every tag by name. When nothing could be read this holds a single
    /// `Info` or `Error` diagnostic entry instead.
    pub tags: BTreeMap<String, String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub software: Option<String>,
    pub date_time: Option<String>,
    pub orientation: Option<String>,
    pub gps_coordinates: Option<(f64, f64)>,
    pub suspicious_indicators: Vec<String>,
    pub diagnostic: Option<String>,
}

impl MetadataResult {
    pub fn diagnostic(key: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut tags = BTreeMap::new();
        tags.insert(key.to_string(), message.clone());

        Self {
            tags,
            diagnostic: Some(message),
            ..Default::default()
        }
    }

    pub fn has_metadata(&self) -> bool {
        self.diagnostic.is_none() && !self.tags.is_empty()
    }

    pub fn verdict(&self) -> String {
        if let Some(ref diagnostic) = self.diagnostic {
            return diagnostic.clone();
        }

        let mut verdict = format!("{} metadata tag(s) found", self.tags.len());
        if !self.suspicious_indicators.is_empty() {
            verdict.push_str(&format!("; {}", self.suspicious_indicators.join("; ")));
        }
        verdict
    }
}
