//! RAW decoding through LibRaw (via the `rsraw` FFI bindings)

use crate::error::{OptimError, Result};
use crate::pixels::PixelBuffer;
use rsraw::RawImage;
use rsraw_sys as sys;
use std::ffi::CString;
use std::path::Path;
use tracing::debug;

/// Decodes a RAW file into an RGB8 pixel buffer
pub trait RawDecoder: Send + Sync {
    fn decode(&self, path: &Path, options: &RawOptions) -> Result<PixelBuffer>;
}

/// LibRaw `output_color` code for sRGB (D65)
const OUTPUT_COLOR_SRGB: i32 = 1;

/// RAW processing options. The rendering itself is fixed (camera white
/// balance, no auto-brightness, sRGB, 8 bits per sample) so outputs are
/// reproducible; only the decode resolution varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawOptions {
    /// Half-size color image (2x2 binning instead of demosaicing)
    pub half_size: bool,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self::full_resolution()
    }
}

impl RawOptions {
    /// Final output decode at full size
    pub fn full_resolution() -> Self {
        Self { half_size: false }
    }

    /// Analysis decode: same rendering as the final decode at half resolution
    pub fn analysis() -> Self {
        Self { half_size: true }
    }
}

/// RAW decoder backed by LibRaw (FFI-based, no external binary needed)
#[derive(Debug, Default, Clone, Copy)]
pub struct LibRawDecoder;

impl LibRawDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode RAW data already in memory
    pub fn decode_bytes(&self, file_data: &[u8], options: &RawOptions) -> Result<PixelBuffer> {
        let mut raw = RawImage::open(file_data)
            .map_err(|e| OptimError::Decode(format!("Failed to open RAW file: {:?}", e)))?;

        let handle = libraw_handle(&raw);

        unsafe {
            let params = &mut (*handle).params;

            params.use_camera_wb = 1;
            params.use_auto_wb = 0;
            params.no_auto_bright = 1;
            params.output_color = OUTPUT_COLOR_SRGB;
            params.output_bps = 8;
            params.half_size = if options.half_size { 1 } else { 0 };
        }

        raw.unpack()
            .map_err(|e| OptimError::Decode(format!("Failed to unpack RAW: {:?}", e)))?;

        let ret = unsafe { sys::libraw_dcraw_process(handle) };
        if ret != 0 {
            return Err(OptimError::Decode(format!(
                "libraw_dcraw_process failed with code {}",
                ret
            )));
        }

        // dcraw_make_mem_image has wrong format, go through LibRaw's own PPM writer.
        // The temp path is removed when `ppm_path` drops, on every exit path.
        let ppm_path = tempfile::Builder::new()
            .prefix("raw_optim_")
            .suffix(".ppm")
            .tempfile()?
            .into_temp_path();
        let c_path = ppm_path
            .to_str()
            .and_then(|p| CString::new(p).ok())
            .ok_or_else(|| OptimError::Decode("Temp path is not valid UTF-8".to_string()))?;

        let write_ret = unsafe { sys::libraw_dcraw_ppm_tiff_writer(handle, c_path.as_ptr()) };
        if write_ret != 0 {
            return Err(OptimError::Decode(format!(
                "libraw_dcraw_ppm_tiff_writer failed with code {}",
                write_ret
            )));
        }

        let ppm_data = std::fs::read(&ppm_path)?;
        let (width, height, samples) = parse_ppm(&ppm_data)?;

        debug!(width, height, half_size = options.half_size, "RAW decoded");

        // A zero-sized render is a bad file, not a caller error
        PixelBuffer::from_rgb(width, height, samples.to_vec())
            .map_err(|e| OptimError::Decode(format!("LibRaw produced an unusable image: {}", e)))
    }
}

impl RawDecoder for LibRawDecoder {
    fn decode(&self, path: &Path, options: &RawOptions) -> Result<PixelBuffer> {
        let file_data = std::fs::read(path).map_err(|e| {
            OptimError::Decode(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.decode_bytes(&file_data, options)
    }
}

/// rsraw doesn't expose the underlying `libraw_data_t`; the handle is the first
/// (and only pointer) field of `RawImage`, so we copy it out.
pub(crate) fn libraw_handle(raw: &RawImage) -> *mut sys::libraw_data_t {
    unsafe { std::mem::transmute_copy(raw) }
}

/// Split a binary PPM (`P6\nWIDTH HEIGHT\nMAXVAL\n<data>`) into dimensions and RGB8 samples
fn parse_ppm(data: &[u8]) -> Result<(u32, u32, &[u8])> {
    let invalid = |msg: &str| OptimError::Decode(format!("Invalid PPM output: {}", msg));

    let mut pos = 0;
    let mut tokens: Vec<&[u8]> = Vec::with_capacity(4);
    while tokens.len() < 4 {
        while pos < data.len() && data[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let start = pos;
        while pos < data.len() && !data[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if start == pos {
            return Err(invalid("truncated header"));
        }
        tokens.push(&data[start..pos]);
    }
    // Exactly one whitespace byte separates MAXVAL from the samples
    pos += 1;

    if tokens[0] != b"P6" {
        return Err(invalid("not a P6 image"));
    }

    let number = |token: &[u8]| -> Option<u32> { std::str::from_utf8(token).ok()?.parse().ok() };
    let width = number(tokens[1]).ok_or_else(|| invalid("bad width"))?;
    let height = number(tokens[2]).ok_or_else(|| invalid("bad height"))?;
    let maxval = number(tokens[3]).ok_or_else(|| invalid("bad maxval"))?;
    if maxval != 255 {
        return Err(invalid("expected 8-bit samples"));
    }

    let len = width as usize * height as usize * PixelBuffer::CHANNELS;
    let samples = data
        .get(pos..pos + len)
        .ok_or_else(|| invalid("truncated pixel data"))?;

    Ok((width, height, samples))
}
