//! RAW metadata propagation
//!
//! Reads a few descriptive fields from the RAW container (LibRaw) and writes
//! them into the converted JPEG's EXIF block (kamadak-exif).
//!
//! ## Field mapping
//!
//! | RawMetadata    | EXIF tag          | IFD  |
//! |----------------|-------------------|------|
//! | `camera_make`  | Make              | 0th  |
//! | `camera_model` | Model             | 0th  |
//! | `raw_width`    | PixelXDimension   | Exif |
//! | `raw_height`   | PixelYDimension   | Exif |
//! | `captured_at`  | DateTimeOriginal  | Exif |
//! | `raw_type`     | Software          | 0th  |
//!
//! Everything here is best-effort. [`MetadataBridge`] turns failures into an
//! empty `RawMetadata` or a `false` so a finished pixel conversion is never
//! marked failed because of metadata.

use exif::{Field, In, Tag, Value};
use serde::{Deserialize, Serialize};
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{OptimError, Result};
use crate::jpeg::{find_exif, replace_exif, write_atomic};
use crate::raw::libraw_handle;

/// Descriptive fields read from a RAW file. Unavailable fields are `None`
/// and left out of serialized output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    /// Upper-cased file extension, e.g. "DNG"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_height: Option<u32>,

    /// EXIF datetime format, `YYYY:MM:DD HH:MM:SS`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,
}

impl RawMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Format tag derived from the file extension
    pub fn raw_type_of(path: &Path) -> Option<String> {
        path.extension()
            .map(|e| e.to_string_lossy().to_uppercase())
            .filter(|e| !e.is_empty())
    }

    /// EXIF fields this metadata maps to. `Software` is always present.
    pub fn exif_fields(&self) -> Vec<Field> {
        let ascii = |tag: Tag, ifd_num: In, s: &str| Field {
            tag,
            ifd_num,
            value: Value::Ascii(vec![s.as_bytes().to_vec()]),
        };
        let long = |tag: Tag, n: u32| Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Long(vec![n]),
        };

        let mut fields = Vec::new();

        if let Some(make) = &self.camera_make {
            fields.push(ascii(Tag::Make, In::PRIMARY, make.as_str()));
        }
        if let Some(model) = &self.camera_model {
            fields.push(ascii(Tag::Model, In::PRIMARY, model.as_str()));
        }
        if let Some(width) = self.raw_width {
            fields.push(long(Tag::PixelXDimension, width));
        }
        if let Some(height) = self.raw_height {
            fields.push(long(Tag::PixelYDimension, height));
        }
        if let Some(captured_at) = &self.captured_at {
            fields.push(ascii(Tag::DateTimeOriginal, In::PRIMARY, captured_at.as_str()));
        }

        let software = match &self.raw_type {
            Some(raw_type) => format!(
                "{} {} ({} source)",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                raw_type
            ),
            None => format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };
        fields.push(ascii(Tag::Software, In::PRIMARY, software.as_str()));

        fields
    }
}

/// Reads descriptive fields from a RAW container
pub trait MetadataReader: Send + Sync {
    fn read(&self, raw_path: &Path) -> Result<RawMetadata>;
}

/// Writes metadata into an existing JPEG file's EXIF block
pub trait ExifWriter: Send + Sync {
    fn write(&self, jpeg_path: &Path, metadata: &RawMetadata) -> Result<()>;
}

// ============================================================================
// LibRaw Reader
// ============================================================================

/// Reads RAW metadata through LibRaw without unpacking sensor data
#[derive(Debug, Default, Clone, Copy)]
pub struct LibRawMetadataReader;

impl MetadataReader for LibRawMetadataReader {
    fn read(&self, raw_path: &Path) -> Result<RawMetadata> {
        use rsraw::RawImage;

        let file_data = std::fs::read(raw_path)?;
        let raw = RawImage::open(&file_data)
            .map_err(|e| OptimError::Metadata(format!("LibRaw error: {:?}", e)))?;

        let handle = libraw_handle(&raw);

        let cstr = |chars: &[std::os::raw::c_char]| -> Option<String> {
            let s = unsafe { CStr::from_ptr(chars.as_ptr()) }
                .to_string_lossy()
                .trim()
                .to_string();
            if s.is_empty() { None } else { Some(s) }
        };
        let nonzero = |n: u32| if n > 0 { Some(n) } else { None };

        let metadata = unsafe {
            let idata = &(*handle).idata;
            let sizes = &(*handle).sizes;
            let other = &(*handle).other;

            RawMetadata {
                camera_make: cstr(&idata.make[..]),
                camera_model: cstr(&idata.model[..]),
                raw_type: RawMetadata::raw_type_of(raw_path),
                raw_width: nonzero(sizes.raw_width as u32),
                raw_height: nonzero(sizes.raw_height as u32),
                captured_at: if other.timestamp > 0 {
                    format_exif_datetime(other.timestamp as i64)
                } else {
                    None
                },
            }
        };

        debug!(path = %raw_path.display(), ?metadata, "RAW metadata read");
        Ok(metadata)
    }
}

/// Format a Unix timestamp as an EXIF datetime
fn format_exif_datetime(ts: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.format("%Y:%m:%d %H:%M:%S").to_string())
}

// ============================================================================
// kamadak-exif Writer
// ============================================================================

/// EXIF writer built on kamadak-exif's TIFF writer plus APP1 splicing
#[derive(Debug, Default, Clone, Copy)]
pub struct KamadakExifWriter;

/// Tags the writer regenerates itself, or that point into data we don't carry over
const REGENERATED_TAGS: &[Tag] = &[
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
];

impl ExifWriter for KamadakExifWriter {
    fn write(&self, jpeg_path: &Path, metadata: &RawMetadata) -> Result<()> {
        let jpeg = std::fs::read(jpeg_path)?;

        let ours = metadata.exif_fields();
        let mut merged: Vec<Field> = existing_fields(&jpeg)
            .into_iter()
            .filter(|f| !ours.iter().any(|o| o.tag == f.tag))
            .collect();
        merged.extend(ours);

        let mut writer = exif::experimental::Writer::new();
        for field in &merged {
            writer.push_field(field);
        }

        let mut tiff = Cursor::new(Vec::new());
        writer
            .write(&mut tiff, false)
            .map_err(|e| OptimError::Metadata(format!("EXIF write error: {}", e)))?;

        let updated = replace_exif(&jpeg, &tiff.into_inner())?;
        write_atomic(jpeg_path, &updated)?;

        debug!(path = %jpeg_path.display(), fields = merged.len(), "EXIF written");
        Ok(())
    }
}

/// Primary-IFD fields of the JPEG's current EXIF block. A missing or corrupt
/// block yields an empty list.
fn existing_fields(jpeg: &[u8]) -> Vec<Field> {
    let Some(tiff) = find_exif(jpeg) else {
        return Vec::new();
    };

    match exif::Reader::new().read_raw(tiff.to_vec()) {
        Ok(exif) => exif
            .fields()
            .filter(|f| f.ifd_num == In::PRIMARY)
            .filter(|f| !REGENERATED_TAGS.contains(&f.tag))
            .filter(|f| !matches!(f.value, Value::Unknown(..)))
            .cloned()
            .collect(),
        Err(e) => {
            debug!("Ignoring unreadable EXIF block: {}", e);
            Vec::new()
        }
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Best-effort metadata propagation from RAW to JPEG
pub struct MetadataBridge<R, W> {
    reader: R,
    writer: W,
}

impl<R: MetadataReader, W: ExifWriter> MetadataBridge<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read RAW metadata; any failure gives an empty `RawMetadata`.
    pub fn extract(&self, raw_path: &Path) -> RawMetadata {
        match self.reader.read(raw_path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Metadata extraction failed for {}: {}", raw_path.display(), e);
                RawMetadata::default()
            }
        }
    }

    /// Write `metadata` into the JPEG. Returns whether it succeeded.
    pub fn apply(&self, jpeg_path: &Path, metadata: &RawMetadata) -> bool {
        match self.writer.write(jpeg_path, metadata) {
            Ok(()) => true,
            Err(e) => {
                warn!("Metadata application failed for {}: {}", jpeg_path.display(), e);
                false
            }
        }
    }

    /// Extract from `raw_path` and apply to `jpeg_path`
    pub fn preserve(&self, raw_path: &Path, jpeg_path: &Path) -> bool {
        let metadata = self.extract(raw_path);
        self.apply(jpeg_path, &metadata)
    }
}

impl Default for MetadataBridge<LibRawMetadataReader, KamadakExifWriter> {
    fn default() -> Self {
        Self::new(LibRawMetadataReader, KamadakExifWriter)
    }
}
