// raw_optim - batch RAW -> JPEG converter

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use raw_optim::batch::{run_batch, BatchConfig};
use raw_optim::validation::{normalize_extensions, parse_device, quality_mode};
use raw_optim::{Converter, DeviceClass, JpegFileEncoder, LibRawDecoder, MetadataBridge, OptimError};

#[derive(Parser)]
#[command(name = "raw_optim", version, about = "Convert RAW photos to size-optimized JPEGs")]
struct Args {
    /// Directory containing RAW files (not searched recursively)
    source_dir: PathBuf,

    /// Directory for the JPEG output (created if missing)
    output_dir: PathBuf,

    /// JPEG quality 1-100, or 0 to choose automatically per image
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=100))]
    quality: u32,

    /// Target viewing device for automatic quality: iphone, ipad or display
    #[arg(short, long, value_parser = device_arg)]
    device: Option<DeviceClass>,

    /// Copy camera metadata from the RAW file into the JPEG's EXIF block
    #[arg(long)]
    preserve_metadata: bool,

    /// RAW file extension to pick up (repeatable)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Number of files converted in parallel
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    jobs: u32,

    /// Print the batch report as JSON instead of the text summary
    #[arg(long)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn device_arg(value: &str) -> std::result::Result<DeviceClass, OptimError> {
    parse_device(Some(value))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let quality = quality_mode(args.quality, args.device.unwrap_or_default())?;

    let config = BatchConfig {
        source_dir: args.source_dir,
        output_dir: args.output_dir,
        quality,
        preserve_metadata: args.preserve_metadata,
        extensions: normalize_extensions(&args.extensions),
        jobs: args.jobs as usize,
    };

    info!("🎞  raw_optim {}", env!("CARGO_PKG_VERSION"));
    info!("   Source: {}", config.source_dir.display());
    info!("   Output: {}", config.output_dir.display());
    info!("   Quality: {:?}", config.quality);

    let converter = Converter::new(LibRawDecoder::new(), JpegFileEncoder::new());
    let bridge = MetadataBridge::default();

    let report = run_batch(&config, &converter, &bridge)
        .with_context(|| format!("Batch conversion of {} failed", config.source_dir.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&report.snapshot())
            .context("Failed to serialize batch report")?;
        println!("{}", json);
    } else {
        println!("{}", report.render_text());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["raw_optim", "in", "out"]).unwrap();
        assert_eq!(args.quality, 0);
        assert_eq!(args.jobs, 1);
        assert!(args.device.is_none());
        assert!(args.extensions.is_empty());
        assert!(!args.preserve_metadata);
    }

    #[test]
    fn test_quality_range_enforced() {
        assert!(Args::try_parse_from(["raw_optim", "in", "out", "--quality", "101"]).is_err());
        assert!(Args::try_parse_from(["raw_optim", "in", "out", "-q", "100"]).is_ok());
        assert!(Args::try_parse_from(["raw_optim", "in", "out", "--jobs", "0"]).is_err());
    }

    #[test]
    fn test_device_parsed_at_startup() {
        let args = Args::try_parse_from(["raw_optim", "in", "out", "--device", "iPad"]).unwrap();
        assert_eq!(args.device, Some(DeviceClass::IPad));
        assert!(Args::try_parse_from(["raw_optim", "in", "out", "-d", "watch"]).is_err());
    }

    #[test]
    fn test_repeated_extensions() {
        let args =
            Args::try_parse_from(["raw_optim", "in", "out", "--ext", "DNG", "--ext", ".cr2"]).unwrap();
        assert_eq!(normalize_extensions(&args.extensions), vec!["cr2", "dng"]);
    }
}
