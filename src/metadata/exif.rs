use std::{collections::BTreeMap, io::Cursor};

use exif::{Exif, Field, In, Rational, Tag, Value};

use crate::metadata::{ERROR_KEY, INFO_KEY, MetadataResult};

const EDITING_SOFTWARE: [&str; 5] = ["photoshop", "paint", "gimp", "lightroom", "snapseed"];

pub struct ExifExtractor;

impl ExifExtractor {
    /// Reads embedded EXIF from encoded image bytes. Absence or corruption of
    /// metadata is reported as a diagnostic entry, never as an error.
    pub fn extract(bytes: &[u8]) -> MetadataResult {
        let mut reader = Cursor::new(bytes);

        match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif_data) => Self::parse_exif(&exif_data),
            Err(exif::Error::NotFound(_)) => {
                log::debug!("No EXIF block present");
                MetadataResult::diagnostic(INFO_KEY, "No metadata found (image may lack EXIF)")
            }
            Err(exif::Error::InvalidFormat(reason)) if reason.contains("Unknown image format") => {
                MetadataResult::diagnostic(
                    INFO_KEY,
                    "No metadata found (format has no EXIF container)",
                )
            }
            Err(e) => {
                log::warn!("Unreadable EXIF block: {}", e);
                MetadataResult::diagnostic(ERROR_KEY, format!("Unreadable metadata: {}", e))
            }
        }
    }

    fn parse_exif(exif: &Exif) -> MetadataResult {
        let mut tags = BTreeMap::new();
        let mut suspicious_indicators = Vec::new();

        for field in exif.fields() {
            let name = if field.ifd_num == In::PRIMARY {
                field.tag.to_string()
            } else {
                format!("Thumbnail{}", field.tag)
            };
            tags.entry(name).or_insert_with(|| Self::field_value(field, exif));
        }

        let primary = |tag: Tag| {
            exif.get_field(tag, In::PRIMARY)
                .map(|f| Self::field_value(f, exif))
        };

        let camera_make = primary(Tag::Make);
        let camera_model = primary(Tag::Model);
        let software = primary(Tag::Software);
        let date_time = primary(Tag::DateTime);
        let orientation = primary(Tag::Orientation);
        let gps_coordinates = Self::extract_gps(exif);

        if let Some(ref sw) = software {
            let sw_lower = sw.to_lowercase();
            if EDITING_SOFTWARE.iter().any(|name| sw_lower.contains(name)) {
                suspicious_indicators.push(format!("Edited with: {}", sw));
            }
        }

        let datetime_original = primary(Tag::DateTimeOriginal);
        let datetime_digitized = primary(Tag::DateTimeDigitized);

        if datetime_original.is_none() && date_time.is_some() {
            suspicious_indicators.push("Original datetime missing (may be stripped)".into());
        }

        if let (Some(orig), Some(digi)) = (&datetime_original, &datetime_digitized) {
            if orig != digi {
                suspicious_indicators.push("Inconsistent date time values".into());
            }
        }

        if tags.is_empty() {
            return MetadataResult::diagnostic(INFO_KEY, "EXIF block present but empty");
        }

        MetadataResult {
            tags,
            camera_make,
            camera_model,
            software,
            date_time,
            orientation,
            gps_coordinates,
            suspicious_indicators,
            diagnostic: None,
        }
    }

    // ASCII verbatim, everything else through display_value.
    fn field_value(field: &Field, exif: &Exif) -> String {
        match field.value {
            Value::Ascii(ref parts) => parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
                .collect::<Vec<_>>()
                .join(", "),
            _ => field.display_value().with_unit(exif).to_string(),
        }
    }

    fn extract_gps(exif: &Exif) -> Option<(f64, f64)> {
        let lat = exif.get_field(Tag::GPSLatitude, In::PRIMARY)?;
        let lat_ref = exif.get_field(Tag::GPSLatitudeRef, In::PRIMARY)?;
        let lon = exif.get_field(Tag::GPSLongitude, In::PRIMARY)?;
        let lon_ref = exif.get_field(Tag::GPSLongitudeRef, In::PRIMARY)?;

        let lat_val = match lat.value {
            Value::Rational(ref dms) => dms_to_decimal(dms)?,
            _ => return None,
        };
        let lon_val = match lon.value {
            Value::Rational(ref dms) => dms_to_decimal(dms)?,
            _ => return None,
        };

        let lat_sign = if Self::field_value(lat_ref, exif).contains('S') { -1.0 } else { 1.0 };
        let lon_sign = if Self::field_value(lon_ref, exif).contains('W') { -1.0 } else { 1.0 };

        Some((lat_val * lat_sign, lon_val * lon_sign))
    }
}

/// Degrees, minutes, seconds to decimal degrees. Seconds may be omitted.
pub fn dms_to_decimal(dms: &[Rational]) -> Option<f64> {
    let part = |i: usize| -> Option<f64> {
        let r = dms.get(i)?;
        if r.denom == 0 { None } else { Some(r.to_f64()) }
    };

    let degrees = part(0)?;
    let minutes = part(1)?;
    let seconds = part(2).unwrap_or(0.0);

    Some(degrees + minutes / 60.0 + seconds / 3600.0)
}

pub fn extract_metadata(encoded: Option<&[u8]>) -> MetadataResult {
    match encoded {
        Some(bytes) => ExifExtractor::extract(bytes),
        None => MetadataResult::diagnostic(
            INFO_KEY,
            "No encoded image bytes available for metadata extraction",
        ),
    }
}
