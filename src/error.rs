//! ALAC codec error types.

use thiserror::Error;

/// ALAC codec error.
#[derive(Debug, Error)]
pub enum AlacError {
    /// Invalid argument to an entry point.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bit depth outside the supported set.
    #[error("Unsupported bits per sample: {0} (must be 16 or 24)")]
    UnsupportedBitDepth(u32),

    /// Frame channel count not 1 or 2.
    #[error("Frame channel count not 1 or 2")]
    InvalidFrameChannelCount,

    /// Frameset carries more channels than the stream declares.
    #[error("Frameset channels too large")]
    ExcessiveFramesetChannels,

    /// Frames within one frameset disagree on block size.
    #[error("All frames not the same block size")]
    FrameBlockSizeMismatch,

    /// Frame block size greater than the stream's maximum block size.
    #[error("Frame block size greater than maximum block size")]
    InvalidBlockSize,

    /// Subframe header's prediction type is not 0.
    #[error("Invalid prediction type")]
    InvalidPredictionType,

    /// Underlying I/O failure, including bitstream underrun.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// ALAC result type.
pub type Result<T> = std::result::Result<T, AlacError>;
