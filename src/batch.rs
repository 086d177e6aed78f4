//! Batch driver: discover RAW files, convert each, aggregate results
//!
//! Files are independent. With `jobs == 1` they are processed strictly in
//! order on the calling thread; with more, each rayon worker runs its own
//! conversion over the shared (stateless) converter and bridge. A failing
//! file is logged and skipped; only a caller contract violation stops the run.
//! Files that would write the same `<stem>.jpg` are caught before any work
//! starts and all but the first are reported as failures.

use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info, warn};

use crate::converter::{size_change, ConversionResult, Converter, QualityMode};
use crate::error::{OptimError, Result};
use crate::jpeg::JpegEncoder;
use crate::metadata::{ExifWriter, MetadataBridge, MetadataReader};
use crate::raw::RawDecoder;
use crate::report::{BatchReport, FileFailure, Timer};
use crate::validation::normalize_extensions;

/// Batch run settings
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub quality: QualityMode,
    pub preserve_metadata: bool,
    /// Lowercase extensions without a dot
    pub extensions: Vec<String>,
    pub jobs: usize,
}

impl BatchConfig {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            quality: QualityMode::default(),
            preserve_metadata: false,
            extensions: normalize_extensions(&[]),
            jobs: 1,
        }
    }
}

/// RAW files directly inside `dir` (non-recursive) whose extension matches
/// one of `extensions`, case-insensitively. Sorted by path.
pub fn find_raw_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// `<output_dir>/<raw stem>.jpg`
pub fn output_path_for(raw_path: &Path, output_dir: &Path) -> PathBuf {
    let stem = raw_path.file_stem().unwrap_or(raw_path.as_os_str());
    let mut name = stem.to_os_string();
    name.push(".jpg");
    output_dir.join(name)
}

/// Create `dir` if needed. Returns whether it already existed.
pub fn ensure_directory(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        return Ok(true);
    }
    std::fs::create_dir_all(dir)?;
    Ok(false)
}

enum Outcome {
    Converted {
        result: ConversionResult,
        metadata_ok: bool,
    },
    Failed(FileFailure),
}

/// Pair each RAW file with its output path. Files whose output path is
/// already taken by an earlier file (same stem, different extension) are
/// split off as failures so no JPEG is written twice.
fn plan_outputs(files: &[PathBuf], output_dir: &Path) -> (Vec<(PathBuf, PathBuf)>, Vec<FileFailure>) {
    let mut claimed: HashMap<PathBuf, &PathBuf> = HashMap::new();
    let mut planned = Vec::with_capacity(files.len());
    let mut collisions = Vec::new();

    for raw_path in files {
        let output_path = output_path_for(raw_path, output_dir);
        if let Some(first) = claimed.get(&output_path) {
            let reason = format!(
                "Output {} is already produced from {}",
                output_path.display(),
                file_name(first)
            );
            warn!("✗ {}: {}", file_name(raw_path), reason);
            collisions.push(FileFailure {
                path: raw_path.clone(),
                reason,
            });
            continue;
        }
        claimed.insert(output_path.clone(), raw_path);
        planned.push((raw_path.clone(), output_path));
    }

    (planned, collisions)
}

/// Run a whole batch. Fails with `NoRawFiles` when discovery finds nothing
/// (no output directory is created) and with `AllFailed` when every file failed.
/// A contract violation (e.g. an out-of-range fixed quality) stops the batch.
pub fn run_batch<D, E, R, W>(
    config: &BatchConfig,
    converter: &Converter<D, E>,
    bridge: &MetadataBridge<R, W>,
) -> Result<BatchReport>
where
    D: RawDecoder,
    E: JpegEncoder,
    R: MetadataReader,
    W: ExifWriter,
{
    let timer = Timer::new();

    let files = find_raw_files(&config.source_dir, &config.extensions)?;
    if files.is_empty() {
        return Err(OptimError::NoRawFiles(config.source_dir.clone()));
    }

    ensure_directory(&config.output_dir)?;
    info!("Found {} RAW file(s), starting conversion", files.len());

    let (planned, collisions) = plan_outputs(&files, &config.output_dir);
    let total = files.len();
    let finished = AtomicUsize::new(collisions.len());

    let process = |(raw_path, output_path): &(PathBuf, PathBuf)| -> Result<Outcome> {
        let converted = converter.convert(raw_path, output_path, config.quality);
        let done = finished.fetch_add(1, Ordering::Relaxed) + 1;

        match converted {
            Ok(result) => {
                info!(
                    "[{}/{}] ✓ {} (q{}, {})",
                    done,
                    total,
                    file_name(raw_path),
                    result.quality,
                    size_change(result.reduction_rate)
                );
                let metadata_ok = !config.preserve_metadata || bridge.preserve(raw_path, output_path);
                Ok(Outcome::Converted { result, metadata_ok })
            }
            Err(e) if e.is_contract_violation() => Err(e),
            Err(e) => {
                error!("[{}/{}] ✗ {}: {}", done, total, file_name(raw_path), e);
                Ok(Outcome::Failed(FileFailure {
                    path: raw_path.clone(),
                    reason: e.to_string(),
                }))
            }
        }
    };

    let outcomes: Vec<Outcome> = if config.jobs > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(config.jobs).build() {
            Ok(pool) => pool.install(|| planned.par_iter().map(process).collect::<Result<Vec<_>>>())?,
            Err(e) => {
                warn!("Worker pool unavailable ({}), converting sequentially", e);
                planned.iter().map(process).collect::<Result<Vec<_>>>()?
            }
        }
    } else {
        planned.iter().map(process).collect::<Result<Vec<_>>>()?
    };

    let mut report = BatchReport {
        output_dir: config.output_dir.clone(),
        total_files: total,
        failures: collisions,
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome {
            Outcome::Converted { result, metadata_ok } => {
                if !metadata_ok {
                    report.metadata_failures += 1;
                }
                report.conversions.push(result);
            }
            Outcome::Failed(failure) => report.failures.push(failure),
        }
    }
    report.elapsed_ms = timer.elapsed_ms();

    if report.successful() == 0 {
        return Err(OptimError::AllFailed(report.total_files));
    }

    info!(
        "Converted {}/{} file(s) in {}ms",
        report.successful(),
        report.total_files,
        report.elapsed_ms
    );
    Ok(report)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"raw").unwrap();
    }

    #[test]
    fn test_find_raw_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.dng");
        touch(dir.path(), "a.DNG");
        touch(dir.path(), "c.jpg");
        touch(dir.path(), "d.cr2");
        std::fs::create_dir(dir.path().join("nested.dng")).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        touch(&dir.path().join("sub"), "e.dng");

        let files = find_raw_files(dir.path(), &["dng".to_string()]).unwrap();
        let names: Vec<_> = files.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.DNG", "b.dng"]);

        let files = find_raw_files(dir.path(), &["dng".to_string(), "cr2".to_string()]).unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_find_raw_files_missing_dir() {
        assert!(find_raw_files(Path::new("/nonexistent/raws"), &["dng".into()]).is_err());
    }

    #[test]
    fn test_output_path_for() {
        assert_eq!(
            output_path_for(Path::new("/in/IMG_0001.DNG"), Path::new("/out")),
            PathBuf::from("/out/IMG_0001.jpg")
        );
        assert_eq!(
            output_path_for(Path::new("/in/shot.v2.dng"), Path::new("out")),
            PathBuf::from("out/shot.v2.jpg")
        );
    }

    #[test]
    fn test_plan_outputs_splits_stem_collisions() {
        let files = vec![
            PathBuf::from("/in/a.dng"),
            PathBuf::from("/in/shot.cr2"),
            PathBuf::from("/in/shot.dng"),
        ];
        let (planned, collisions) = plan_outputs(&files, Path::new("/out"));

        assert_eq!(
            planned,
            vec![
                (PathBuf::from("/in/a.dng"), PathBuf::from("/out/a.jpg")),
                (PathBuf::from("/in/shot.cr2"), PathBuf::from("/out/shot.jpg")),
            ]
        );
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].path, PathBuf::from("/in/shot.dng"));
        assert!(collisions[0].reason.contains("shot.cr2"));
    }

    #[test]
    fn test_ensure_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a").join("b");
        assert!(!ensure_directory(&target).unwrap());
        assert!(target.is_dir());
        assert!(ensure_directory(&target).unwrap());
    }

    #[test]
    fn test_config_defaults() {
        let config = BatchConfig::new("in", "out");
        assert_eq!(config.extensions, vec!["dng"]);
        assert_eq!(config.jobs, 1);
        assert!(!config.preserve_metadata);
        assert_eq!(config.quality, QualityMode::default());
    }
}
