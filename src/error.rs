use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimError {
    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Unknown device class: {0:?} (expected iphone, ipad or display)")]
    UnknownDevice(String),

    #[error("Invalid quality {0}: must be within 0-100")]
    InvalidQuality(u32),

    #[error("Pixel buffer is empty")]
    EmptyBuffer,

    #[error("Invalid pixel buffer: expected {expected} bytes (width * height * 3), got {actual}")]
    InvalidBuffer { expected: usize, actual: usize },

    #[error("No RAW files found in {}", .0.display())]
    NoRawFiles(PathBuf),

    #[error("All {0} conversions failed")]
    AllFailed(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OptimError {
    /// Caller contract violations that boundary validation should have caught.
    /// A batch stops on these instead of skipping the file.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            OptimError::UnknownDevice(_)
                | OptimError::InvalidQuality(_)
                | OptimError::EmptyBuffer
                | OptimError::InvalidBuffer { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OptimError>;
