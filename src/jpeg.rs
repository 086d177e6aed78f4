//! JPEG output: encoding, atomic file writes and EXIF segment splicing

use crate::error::{OptimError, Result};
use crate::pixels::PixelBuffer;
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::io::{Cursor, Write};
use std::path::Path;

/// Encodes a pixel buffer as a JPEG file
pub trait JpegEncoder: Send + Sync {
    /// Write `pixels` to `output` at `quality`. On failure no file is left at `output`.
    fn encode(&self, pixels: &PixelBuffer, output: &Path, quality: u8) -> Result<()>;
}

/// JPEG encoder backed by the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegFileEncoder;

impl JpegFileEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl JpegEncoder for JpegFileEncoder {
    fn encode(&self, pixels: &PixelBuffer, output: &Path, quality: u8) -> Result<()> {
        let bytes = encode_jpeg(pixels, quality)?;
        write_atomic(output, &bytes)
            .map_err(|e| OptimError::Encode(format!("Failed to write {}: {}", output.display(), e)))
    }
}

/// Encode to in-memory JPEG bytes. Quality is clamped to 1-100.
pub fn encode_jpeg(pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>> {
    let quality = quality.clamp(1, 100);
    let mut buffer = Cursor::new(Vec::new());

    ImageJpegEncoder::new_with_quality(&mut buffer, quality)
        .write_image(
            pixels.samples(),
            pixels.width(),
            pixels.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| OptimError::Encode(format!("JPEG encoding failed: {}", e)))?;

    Ok(buffer.into_inner())
}

/// Write `bytes` to a temp file next to `path`, then rename it into place.
/// The temp file is removed if anything fails before the rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".raw_optim_")
        .suffix(".part")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Largest APP1 payload: the 16-bit segment length includes its own two bytes
const MAX_SEGMENT_PAYLOAD: usize = 0xFFFF - 2;

/// Return the TIFF body of the first EXIF APP1 segment, if any
pub fn find_exif(jpeg: &[u8]) -> Option<&[u8]> {
    let segments = split_segments(jpeg).ok()?;
    segments
        .headers
        .iter()
        .filter(|(marker, _)| *marker == APP1)
        .find_map(|&(_, segment)| segment[4..].strip_prefix(EXIF_HEADER))
}

/// Replace (or insert) the EXIF APP1 segment. `tiff` is the TIFF-structured
/// EXIF body without the `Exif\0\0` prefix. The new segment goes right after
/// SOI, or after the JFIF APP0 segment when there is one.
pub fn replace_exif(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>> {
    let payload_len = EXIF_HEADER.len() + tiff.len();
    if payload_len > MAX_SEGMENT_PAYLOAD {
        return Err(OptimError::Metadata(format!(
            "EXIF block too large for one APP1 segment ({} bytes)",
            payload_len
        )));
    }

    let segments = split_segments(jpeg)?;

    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 4);
    out.extend_from_slice(&SOI);

    let mut kept = segments
        .headers
        .iter()
        .filter(|(marker, segment)| !(*marker == APP1 && segment[4..].starts_with(EXIF_HEADER)))
        .peekable();

    if let Some((_, jfif)) = kept.next_if(|(marker, _)| *marker == APP0) {
        out.extend_from_slice(jfif);
    }

    out.extend_from_slice(&[0xFF, APP1]);
    out.extend_from_slice(&((payload_len + 2) as u16).to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);

    for (_, segment) in kept {
        out.extend_from_slice(segment);
    }
    out.extend_from_slice(segments.rest);

    Ok(out)
}

struct Segments<'a> {
    /// (marker, full segment bytes including the 0xFF marker prefix)
    headers: Vec<(u8, &'a [u8])>,
    /// Everything from the start-of-scan marker on
    rest: &'a [u8],
}

fn split_segments(jpeg: &[u8]) -> Result<Segments<'_>> {
    let invalid = |msg: &str| OptimError::Metadata(format!("Invalid JPEG: {}", msg));

    if !jpeg.starts_with(&SOI) {
        return Err(invalid("missing SOI marker"));
    }

    let mut headers = Vec::new();
    let mut pos = 2;
    loop {
        if pos + 1 >= jpeg.len() || jpeg[pos] != 0xFF {
            return Err(invalid("expected a marker"));
        }
        // Fill bytes before a marker
        while pos + 1 < jpeg.len() && jpeg[pos + 1] == 0xFF {
            pos += 1;
        }
        let marker = jpeg[pos + 1];

        match marker {
            SOS | EOI => return Ok(Segments { headers, rest: &jpeg[pos..] }),
            0x01 | 0xD0..=0xD7 => {
                headers.push((marker, &jpeg[pos..pos + 2]));
                pos += 2;
            }
            _ => {
                let len_bytes = jpeg
                    .get(pos + 2..pos + 4)
                    .ok_or_else(|| invalid("truncated segment length"))?;
                let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
                if len < 2 {
                    return Err(invalid("bad segment length"));
                }
                let end = pos + 2 + len;
                let segment = jpeg.get(pos..end).ok_or_else(|| invalid("truncated segment"))?;
                headers.push((marker, segment));
                pos = end;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gray(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::filled(width, height, 128).unwrap()
    }

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 255 / width) as u8);
                data.push((y * 255 / height) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        PixelBuffer::from_rgb(width, height, data).unwrap()
    }

    #[test]
    fn test_encode_jpeg_markers() {
        let jpeg = encode_jpeg(&gray(100, 100), 90).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_quality_zero_is_clamped() {
        assert!(encode_jpeg(&gray(10, 10), 0).is_ok());
    }

    #[test]
    fn test_higher_quality_is_larger() {
        let pixels = gradient(64, 64);
        let low = encode_jpeg(&pixels, 20).unwrap();
        let high = encode_jpeg(&pixels, 95).unwrap();
        assert!(high.len() > low.len(), "low={} high={}", low.len(), high.len());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let pixels = gradient(32, 32);
        assert_eq!(encode_jpeg(&pixels, 85).unwrap(), encode_jpeg(&pixels, 85).unwrap());
    }

    #[test]
    fn test_file_encoder_writes_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.jpg");

        JpegFileEncoder::new().encode(&gray(20, 20), &out, 80).unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        // No temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_file_encoder_missing_dir_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("missing").join("out.jpg");

        let err = JpegFileEncoder::new().encode(&gray(4, 4), &out, 80).unwrap_err();
        assert!(matches!(err, OptimError::Encode(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_replace_exif_inserts_after_jfif() {
        let jpeg = encode_jpeg(&gray(8, 8), 80).unwrap();
        assert!(find_exif(&jpeg).is_none());

        let tiff = b"MM\0*\0\0\0\x08\0\0\0\0\0\0".to_vec();
        let with_exif = replace_exif(&jpeg, &tiff).unwrap();

        assert_eq!(find_exif(&with_exif), Some(&tiff[..]));
        assert_eq!(&with_exif[0..2], &SOI);
        assert_eq!(with_exif.len(), jpeg.len() + 4 + EXIF_HEADER.len() + tiff.len());
        if jpeg[3] == APP0 {
            assert_eq!(with_exif[3], APP0);
        }
    }

    #[test]
    fn test_replace_exif_replaces_existing() {
        let jpeg = encode_jpeg(&gray(8, 8), 80).unwrap();
        let first = replace_exif(&jpeg, b"II*\0first").unwrap();
        let second = replace_exif(&first, b"II*\0second!").unwrap();

        assert_eq!(find_exif(&second), Some(&b"II*\0second!"[..]));
        assert_eq!(second.len(), first.len() + 1);
    }

    #[test]
    fn test_replace_exif_rejects_non_jpeg() {
        assert!(replace_exif(b"\x89PNG\r\n", b"II*\0").is_err());
        assert!(find_exif(b"not a jpeg").is_none());
    }

    #[test]
    fn test_replace_exif_rejects_oversized_block() {
        let jpeg = encode_jpeg(&gray(8, 8), 80).unwrap();
        let huge = vec![0u8; 70_000];
        assert!(matches!(replace_exif(&jpeg, &huge), Err(OptimError::Metadata(_))));
    }
}
