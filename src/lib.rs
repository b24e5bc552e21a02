//! Apple Lossless Audio Codec (ALAC) encoder and decoder.
//!
//! This crate implements the compressed-payload core of ALAC: adaptive
//! linear prediction, an adaptive Rice-style residual coder, stereo
//! decorrelation, and frameset framing. It consumes raw signed integer
//! samples and produces a byte-aligned bitstream plus per-frameset byte
//! sizes; the QuickTime atom container around that payload is left to the
//! caller.
//!
//! ## Example
//!
//! ```
//! use std::io::Cursor;
//! use alac_codec::{encode, Decoder, DecoderParameters, EncoderOptions, InterleavedSource};
//!
//! let samples: Vec<i32> = (0..4096).map(|i| (i % 256) - 128).collect();
//! let mut source = InterleavedSource::new(samples.clone(), 1, 16);
//! let mut output = Cursor::new(Vec::new());
//!
//! let options = EncoderOptions::default();
//! let sizes = encode(&mut output, &mut source, &options).unwrap();
//! assert_eq!(sizes.len(), 1);
//!
//! let bytes = output.into_inner();
//! let params = DecoderParameters::from_options(&options, 16, 1);
//! let decoded = Decoder::new(&bytes[8..], params) // skip the mdat header
//!     .next()
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(decoded.samples, samples);
//! ```

#![warn(missing_docs)]

pub mod bitstream;
pub mod correlation;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod lpc;
pub mod pcm;
pub mod predictor;
pub mod residual;

pub use decoder::{Decoder, Frameset};
pub use encoder::{encode, Encoder};
pub use error::{AlacError, Result};
pub use pcm::{InterleavedSource, PcmSource};

/// Highest LPC order the encoder evaluates.
pub const MAX_LPC_ORDER: usize = 8;

/// Maximum coefficient count a subframe header's 5-bit field can carry.
pub const MAX_COEFFICIENTS: usize = 31;

/// Interlacing shift used by the encoder's decorrelation search.
pub const INTERLACING_SHIFT: u32 = 2;

/// Per-stream encoding options.
///
/// The residual-coder parameters (`initial_history`, `history_multiplier`,
/// `maximum_k`) are carried in the container's `alac` atom and must match
/// between encoder and decoder.
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    /// Maximum PCM frames per frame (block).
    pub block_size: u32,
    /// Starting value of the residual coder's history register.
    pub initial_history: u32,
    /// Scale applied to the history update.
    pub history_multiplier: u32,
    /// Upper bound on the Rice parameter.
    pub maximum_k: u32,
    /// Smallest interlacing leftweight tried by the stereo search.
    pub min_leftweight: u32,
    /// Largest interlacing leftweight tried by the stereo search.
    pub max_leftweight: u32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            block_size: 4096,
            initial_history: 10,
            history_multiplier: 40,
            maximum_k: 14,
            min_leftweight: 0,
            max_leftweight: 4,
        }
    }
}

/// Stream parameters the decoder needs; normally read from the `alac` atom.
#[derive(Debug, Clone)]
pub struct DecoderParameters {
    /// Maximum PCM frames per frame (block).
    pub block_size: u32,
    /// Bits per decoded sample.
    pub bits_per_sample: u32,
    /// Scale applied to the history update.
    pub history_multiplier: u32,
    /// Starting value of the residual coder's history register.
    pub initial_history: u32,
    /// Upper bound on the Rice parameter.
    pub maximum_k: u32,
    /// Channel count of the stream.
    pub channels: u32,
}

impl DecoderParameters {
    /// Build decoder parameters matching a set of encoder options.
    pub fn from_options(options: &EncoderOptions, bits_per_sample: u32, channels: u32) -> Self {
        Self {
            block_size: options.block_size,
            bits_per_sample,
            history_multiplier: options.history_multiplier,
            initial_history: options.initial_history,
            maximum_k: options.maximum_k,
            channels,
        }
    }
}

/// Byte size and PCM frame count of one emitted frameset, in stream order.
///
/// A container layer populates `stsz`/`stco` from these without reparsing
/// the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramesetSize {
    /// Bytes occupied by the frameset (mdat header excluded).
    pub byte_size: u32,
    /// PCM frames decoded from the frameset.
    pub pcm_frames: u32,
}

/// Frame groups a frameset emits for a given channel count, each group one
/// or two source-channel indices.
///
/// Channel counts outside 1..=8 fall back to one single-channel frame per
/// channel.
pub fn channel_layout(channels: usize) -> Vec<Vec<usize>> {
    match channels {
        1 => vec![vec![0]],
        2 => vec![vec![0, 1]],
        3 => vec![vec![2], vec![0, 1]],
        4 => vec![vec![2], vec![0, 1], vec![3]],
        5 => vec![vec![2], vec![0, 1], vec![3, 4]],
        6 => vec![vec![2], vec![0, 1], vec![4, 5], vec![3]],
        7 => vec![vec![2], vec![0, 1], vec![4, 5], vec![6], vec![3]],
        8 => vec![vec![2], vec![6, 7], vec![0, 1], vec![4, 5], vec![3]],
        n => (0..n).map(|c| vec![c]).collect(),
    }
}
