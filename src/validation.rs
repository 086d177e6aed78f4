//! Boundary validation for caller-supplied settings
//!
//! Everything that could become a contract violation further down (unknown
//! device names, out-of-range quality, malformed extension filters) is
//! rejected here, before a conversion starts.

use crate::converter::QualityMode;
use crate::error::{OptimError, Result};
use crate::policy::DeviceClass;

/// Parse an optional device hint. `None` means no device adjustment.
pub fn parse_device(device: Option<&str>) -> Result<DeviceClass> {
    match device {
        None => Ok(DeviceClass::Unspecified),
        Some(name) => name.parse(),
    }
}

/// Resolve the quality setting. `0` requests automatic selection.
pub fn quality_mode(quality: u32, device: DeviceClass) -> Result<QualityMode> {
    match quality {
        0 => Ok(QualityMode::Auto(device)),
        1..=100 => Ok(QualityMode::Fixed(quality as u8)),
        _ => Err(OptimError::InvalidQuality(quality)),
    }
}

/// Lowercase extensions without a leading dot; defaults to `dng` when empty.
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    normalized.sort();
    normalized.dedup();

    if normalized.is_empty() {
        normalized.push("dng".to_string());
    }
    normalized
}
