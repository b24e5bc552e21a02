//! PCM input surface for the encoder.

use std::io;

/// Source of interleaved signed PCM samples.
///
/// `read_block` fills `out` with up to `max_frames * channels()` samples
/// and reports the number of PCM frames delivered; 0 means end of stream.
/// A short count is not an error: the encoder marks the resulting frameset
/// with an explicit sample count.
pub trait PcmSource {
    /// Channel count of the stream.
    fn channels(&self) -> usize;

    /// Bits per sample of the stream.
    fn bits_per_sample(&self) -> u32;

    /// Read up to `max_frames` PCM frames of interleaved samples.
    fn read_block(&mut self, max_frames: usize, out: &mut Vec<i32>) -> io::Result<usize>;
}

/// In-memory [`PcmSource`] over a complete interleaved signal.
#[derive(Debug, Clone)]
pub struct InterleavedSource {
    samples: Vec<i32>,
    channels: usize,
    bits_per_sample: u32,
    position: usize,
}

impl InterleavedSource {
    /// Wrap an interleaved signal. `samples.len()` must be a multiple of
    /// `channels`.
    pub fn new(samples: Vec<i32>, channels: usize, bits_per_sample: u32) -> Self {
        assert!(channels > 0);
        assert_eq!(samples.len() % channels, 0);
        Self {
            samples,
            channels,
            bits_per_sample,
            position: 0,
        }
    }
}

impl PcmSource for InterleavedSource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    fn read_block(&mut self, max_frames: usize, out: &mut Vec<i32>) -> io::Result<usize> {
        out.clear();
        let total_frames = self.samples.len() / self.channels;
        let frames = max_frames.min(total_frames - self.position);
        let start = self.position * self.channels;
        out.extend_from_slice(&self.samples[start..start + frames * self.channels]);
        self.position += frames;
        Ok(frames)
    }
}
