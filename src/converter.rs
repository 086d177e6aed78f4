//! RAW -> JPEG conversion
//!
//! One call converts one file:
//!
//! 1. `QualityMode::Auto` only: half-resolution decode, complexity score,
//!    quality policy. The analysis buffer is dropped before the next step.
//! 2. Full-resolution decode with the fixed `RawOptions::full_resolution` preset.
//! 3. JPEG encode at the resolved quality (atomic write, nothing left on failure).
//! 4. Size statistics from the filesystem.
//!
//! Decoder and encoder are injected so the pipeline can run against test doubles.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::analyzer::complexity_score;
use crate::error::{OptimError, Result};
use crate::jpeg::JpegEncoder;
use crate::policy::{select_quality, DeviceClass};
use crate::raw::{RawDecoder, RawOptions};

/// How the JPEG quality factor is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityMode {
    /// Analyze the image and pick a quality for the given viewing device
    Auto(DeviceClass),
    /// Use this quality (1-100) as-is; anything else is `InvalidQuality`
    Fixed(u8),
}

impl Default for QualityMode {
    fn default() -> Self {
        QualityMode::Auto(DeviceClass::Unspecified)
    }
}

/// Outcome of one successful conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub original_path: PathBuf,
    pub output_path: PathBuf,
    pub original_size: u64,
    pub output_size: u64,
    /// `(1 - output/original) * 100`
    pub reduction_rate: f64,
    pub quality: u8,
}

impl ConversionResult {
    pub fn new(
        original_path: PathBuf,
        output_path: PathBuf,
        original_size: u64,
        output_size: u64,
        quality: u8,
    ) -> Self {
        Self {
            original_path,
            output_path,
            original_size,
            output_size,
            reduction_rate: reduction_rate(original_size, output_size),
            quality,
        }
    }
}

/// Percentage saved going from `original` to `output` bytes. Zero for an empty original.
pub fn reduction_rate(original: u64, output: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - output as f64 / original as f64) * 100.0
}

/// Signed size change for logs: a 75% reduction reads `-75.0%`, growth reads `+5.0%`
pub fn size_change(reduction_rate: f64) -> String {
    // `0.0 - x` keeps an unchanged size at "+0.0%" rather than "-0.0%"
    format!("{:+.1}%", 0.0 - reduction_rate)
}

/// Drives a single file's conversion
pub struct Converter<D, E> {
    decoder: D,
    encoder: E,
}

impl<D: RawDecoder, E: JpegEncoder> Converter<D, E> {
    pub fn new(decoder: D, encoder: E) -> Self {
        Self { decoder, encoder }
    }

    /// Decide the quality factor for `raw_path` without producing any output.
    pub fn resolve_quality(&self, raw_path: &Path, mode: QualityMode) -> Result<u8> {
        match mode {
            QualityMode::Fixed(quality @ 1..=100) => Ok(quality),
            QualityMode::Fixed(quality) => Err(OptimError::InvalidQuality(quality.into())),
            QualityMode::Auto(device) => {
                let preview = self.decoder.decode(raw_path, &RawOptions::analysis())?;
                let score = complexity_score(&preview);
                let quality = select_quality(score, device);
                debug!(
                    path = %raw_path.display(),
                    score,
                    %device,
                    quality,
                    "Quality selected"
                );
                Ok(quality)
            }
        }
    }

    /// Convert `raw_path` to a JPEG at `output_path`.
    pub fn convert(
        &self,
        raw_path: &Path,
        output_path: &Path,
        mode: QualityMode,
    ) -> Result<ConversionResult> {
        let quality = self.resolve_quality(raw_path, mode)?;

        let pixels = self.decoder.decode(raw_path, &RawOptions::full_resolution())?;
        self.encoder.encode(&pixels, output_path, quality)?;
        drop(pixels);

        let original_size = std::fs::metadata(raw_path)?.len();
        let output_size = std::fs::metadata(output_path)?.len();

        let result = ConversionResult::new(
            raw_path.to_path_buf(),
            output_path.to_path_buf(),
            original_size,
            output_size,
            quality,
        );

        debug!(
            "✓ {} → {} (q{}, {} → {} bytes, {})",
            raw_path.display(),
            output_path.display(),
            quality,
            original_size,
            output_size,
            size_change(result.reduction_rate)
        );

        Ok(result)
    }
}
