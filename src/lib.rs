//! raw_optim - batch RAW to JPEG conversion with content-aware quality
//!
//! Each RAW file is decoded through LibRaw, scored by tonal complexity at
//! half resolution, and re-encoded as a JPEG whose quality factor follows
//! the score and an optional target-device hint. Camera metadata can be
//! carried over into the JPEG's EXIF block.

pub mod analyzer;
pub mod batch;
pub mod converter;
pub mod error;
pub mod jpeg;
pub mod metadata;
pub mod pixels;
pub mod policy;
pub mod raw;
pub mod report;
pub mod validation;

pub use analyzer::complexity_score;
pub use batch::{find_raw_files, output_path_for, run_batch, BatchConfig};
pub use converter::{ConversionResult, Converter, QualityMode};
pub use error::{OptimError, Result};
pub use jpeg::{JpegEncoder, JpegFileEncoder};
pub use metadata::{
    ExifWriter, KamadakExifWriter, LibRawMetadataReader, MetadataBridge, MetadataReader,
    RawMetadata,
};
pub use pixels::PixelBuffer;
pub use policy::{select_quality, DeviceClass};
pub use raw::{LibRawDecoder, RawDecoder, RawOptions};
pub use report::{BatchReport, BatchSnapshot, FileFailure};
