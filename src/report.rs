//! Batch statistics and summary reporting

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Instant;

use crate::converter::{reduction_rate, ConversionResult};

/// A file the batch skipped, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything a batch run produced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub output_dir: PathBuf,
    pub total_files: usize,
    pub conversions: Vec<ConversionResult>,
    pub failures: Vec<FileFailure>,
    /// Converted files whose metadata could not be written (still counted as converted)
    pub metadata_failures: usize,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn successful(&self) -> usize {
        self.conversions.len()
    }

    pub fn total_original_size(&self) -> u64 {
        self.conversions.iter().map(|r| r.original_size).sum()
    }

    pub fn total_output_size(&self) -> u64 {
        self.conversions.iter().map(|r| r.output_size).sum()
    }

    /// Aggregate reduction over all successful conversions
    pub fn reduction_rate(&self) -> f64 {
        reduction_rate(self.total_original_size(), self.total_output_size())
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            processed: self.successful(),
            total_files: self.total_files,
            failed: self.failures.len(),
            metadata_failures: self.metadata_failures,
            total_original_size: self.total_original_size(),
            total_output_size: self.total_output_size(),
            reduction_rate: self.reduction_rate(),
            elapsed_ms: self.elapsed_ms,
            output_dir: self.output_dir.clone(),
            conversions: self.conversions.clone(),
            failures: self.failures.clone(),
        }
    }

    /// Human-readable end-of-run summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "===== Conversion complete =====");
        let _ = writeln!(out, "Processed files: {}/{}", self.successful(), self.total_files);
        let _ = writeln!(out, "Total original size: {:.2}MB", megabytes(self.total_original_size()));
        let _ = writeln!(out, "Total output size: {:.2}MB", megabytes(self.total_output_size()));
        let _ = writeln!(out, "Overall reduction: {:.2}%", self.reduction_rate());
        if self.metadata_failures > 0 {
            let _ = writeln!(out, "Metadata not preserved: {} file(s)", self.metadata_failures);
        }
        for failure in &self.failures {
            let _ = writeln!(out, "Failed: {} - {}", failure.path.display(), failure.reason);
        }
        let _ = write!(out, "Files saved to {}", self.output_dir.display());
        out
    }
}

/// Serializable view of a `BatchReport` with the aggregates filled in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub processed: usize,
    pub total_files: usize,
    pub failed: usize,
    pub metadata_failures: usize,
    pub total_original_size: u64,
    pub total_output_size: u64,
    pub reduction_rate: f64,
    pub elapsed_ms: u64,
    pub output_dir: PathBuf,
    pub conversions: Vec<ConversionResult>,
    pub failures: Vec<FileFailure>,
}

pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Timer for tracking batch latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(original: u64, output: u64, quality: u8) -> ConversionResult {
        ConversionResult::new(
            PathBuf::from("in.dng"),
            PathBuf::from("out.jpg"),
            original,
            output,
            quality,
        )
    }

    fn report() -> BatchReport {
        BatchReport {
            output_dir: PathBuf::from("/out"),
            total_files: 3,
            conversions: vec![result(3 * 1024 * 1024, 512 * 1024, 80), result(1024 * 1024, 512 * 1024, 90)],
            failures: vec![FileFailure {
                path: PathBuf::from("bad.dng"),
                reason: "Decode failed: corrupt".into(),
            }],
            metadata_failures: 0,
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_aggregates() {
        let report = report();
        assert_eq!(report.successful(), 2);
        assert_eq!(report.total_original_size(), 4 * 1024 * 1024);
        assert_eq!(report.total_output_size(), 1024 * 1024);
        assert!((report.reduction_rate() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_report() {
        let report = BatchReport::default();
        assert_eq!(report.successful(), 0);
        assert_eq!(report.reduction_rate(), 0.0);
    }

    #[test]
    fn test_render_text() {
        let text = report().render_text();
        assert!(text.contains("Processed files: 2/3"));
        assert!(text.contains("Total original size: 4.00MB"));
        assert!(text.contains("Total output size: 1.00MB"));
        assert!(text.contains("Overall reduction: 75.00%"));
        assert!(text.contains("Failed: bad.dng - Decode failed: corrupt"));
        assert!(text.ends_with("Files saved to /out"));
        assert!(!text.contains("Metadata not preserved"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(report().snapshot()).unwrap();
        assert_eq!(json["processed"], 2);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["total_output_size"], 1024 * 1024);
        assert_eq!(json["conversions"].as_array().unwrap().len(), 2);
    }
}
