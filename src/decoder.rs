//! ALAC decoder: walks framesets out of an mdat payload.

use crate::bitstream::BitReader;
use crate::error::{AlacError, Result};
use crate::residual::{self, CoderParams};
use crate::{channel_layout, correlation, predictor, DecoderParameters, MAX_COEFFICIENTS};

/// One decoded frameset: interleaved samples in source channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frameset {
    /// Interleaved samples, `pcm_frames * channels` long.
    pub samples: Vec<i32>,
    /// PCM frames decoded from the frameset.
    pub pcm_frames: usize,
}

struct SubframeHeader {
    shift_needed: u32,
    coefficients: Vec<i32>,
}

/// ALAC decoder over one mdat payload.
///
/// Yields one [`Frameset`] per call until the payload is exhausted. A
/// structural error aborts the current read and leaves the reader at an
/// unspecified offset; resuming is not supported.
pub struct Decoder<'a> {
    reader: BitReader<'a>,
    params: DecoderParameters,
    coder: CoderParams,
    residuals: Vec<i32>,
}

impl<'a> Decoder<'a> {
    /// Create a decoder positioned at the start of the mdat payload.
    pub fn new(payload: &'a [u8], params: DecoderParameters) -> Self {
        let coder = CoderParams::from(&params);
        Self {
            reader: BitReader::new(payload),
            params,
            coder,
            residuals: Vec::new(),
        }
    }

    /// Decode the next frameset, or `None` once the payload is exhausted.
    pub fn read_frameset(&mut self) -> Result<Option<Frameset>> {
        if self.reader.is_empty() {
            return Ok(None);
        }

        let stream_channels = self.params.channels as usize;
        let mut decoded: Vec<Vec<i32>> = Vec::with_capacity(stream_channels);
        let mut block_size: Option<usize> = None;

        loop {
            let tag = self.reader.read_bits(3)?;
            if tag == 7 {
                break;
            }
            let frame_channels = tag as usize + 1;
            if frame_channels > 2 {
                return Err(AlacError::InvalidFrameChannelCount);
            }
            if decoded.len() + frame_channels > stream_channels {
                return Err(AlacError::ExcessiveFramesetChannels);
            }

            let (channel0, channel1, frame_block_size) = self.decode_frame(frame_channels)?;
            match block_size {
                None => block_size = Some(frame_block_size),
                Some(size) if size != frame_block_size => {
                    return Err(AlacError::FrameBlockSizeMismatch)
                }
                Some(_) => {}
            }

            decoded.push(channel0);
            if let Some(channel1) = channel1 {
                decoded.push(channel1);
            }
        }
        self.reader.byte_align();

        let pcm_frames = block_size.unwrap_or(0);
        tracing::debug!(pcm_frames, channels = decoded.len(), "read frameset");

        // Frames arrive in layout order; map each back to its source
        // channel so output order matches the encoder's input.
        let order: Vec<usize> = if decoded.len() == stream_channels {
            channel_layout(stream_channels).into_iter().flatten().collect()
        } else {
            (0..decoded.len()).collect()
        };

        let mut samples = vec![0i32; pcm_frames * stream_channels];
        for (written, channel) in decoded.iter().enumerate() {
            let source = order[written];
            for (i, &sample) in channel.iter().enumerate() {
                samples[i * stream_channels + source] = sample;
            }
        }

        Ok(Some(Frameset {
            samples,
            pcm_frames,
        }))
    }

    fn decode_frame(
        &mut self,
        frame_channels: usize,
    ) -> Result<(Vec<i32>, Option<Vec<i32>>, usize)> {
        self.reader.skip(16)?; // reserved
        let has_sample_count = self.reader.read_bits(1)?;
        let uncompressed_lsbs = self.reader.read_bits(2)?;
        let not_uncompressed = self.reader.read_bits(1)?;

        let block_size = if has_sample_count == 0 {
            self.params.block_size as usize
        } else {
            let block_size = self.reader.read_bits(32)? as usize;
            if block_size > self.params.block_size as usize {
                return Err(AlacError::InvalidBlockSize);
            }
            block_size
        };

        if not_uncompressed == 0 {
            self.decode_compressed_frame(uncompressed_lsbs, block_size, frame_channels)
        } else {
            self.decode_uncompressed_frame(block_size, frame_channels)
        }
    }

    fn decode_uncompressed_frame(
        &mut self,
        block_size: usize,
        frame_channels: usize,
    ) -> Result<(Vec<i32>, Option<Vec<i32>>, usize)> {
        let bits = self.params.bits_per_sample;
        let mut channel0 = Vec::with_capacity(block_size);
        let mut channel1 = (frame_channels == 2).then(|| Vec::with_capacity(block_size));

        for _ in 0..block_size {
            channel0.push(self.reader.read_signed(bits)?);
            if let Some(channel1) = channel1.as_mut() {
                channel1.push(self.reader.read_signed(bits)?);
            }
        }

        Ok((channel0, channel1, block_size))
    }

    fn decode_compressed_frame(
        &mut self,
        uncompressed_lsbs: u32,
        block_size: usize,
        frame_channels: usize,
    ) -> Result<(Vec<i32>, Option<Vec<i32>>, usize)> {
        let lsb_bits = uncompressed_lsbs * 8;
        if lsb_bits >= self.params.bits_per_sample {
            return Err(AlacError::InvalidArgument(
                "uncompressed LSBs exceed the stream bit depth".into(),
            ));
        }
        let sample_size =
            self.params.bits_per_sample - lsb_bits + (frame_channels as u32 - 1);

        let interlacing_shift = self.reader.read_bits(8)?;
        let interlacing_leftweight = self.reader.read_bits(8)?;

        let mut headers = Vec::with_capacity(frame_channels);
        for _ in 0..frame_channels {
            headers.push(self.read_subframe_header()?);
        }

        let mut lsbs: Vec<Vec<u32>> = vec![Vec::with_capacity(block_size); frame_channels];
        if lsb_bits > 0 {
            for _ in 0..block_size {
                for channel_lsbs in lsbs.iter_mut() {
                    channel_lsbs.push(self.reader.read_bits(lsb_bits)?);
                }
            }
        }

        let mut subframes: Vec<Vec<i32>> = Vec::with_capacity(frame_channels);
        for header in headers.iter_mut() {
            residual::read_residual_block(
                &mut self.reader,
                &self.coder,
                sample_size,
                block_size,
                &mut self.residuals,
            )?;
            let mut subframe = Vec::with_capacity(block_size);
            predictor::decode_subframe(
                &self.residuals,
                &mut header.coefficients,
                header.shift_needed,
                &mut subframe,
            );
            subframes.push(subframe);
        }

        let mut channel1 = None;
        let mut channel0 = if frame_channels == 2 {
            let mut left = vec![0i32; block_size];
            let mut right = vec![0i32; block_size];
            if interlacing_leftweight > 0 {
                correlation::decorrelate(
                    &subframes[0],
                    &subframes[1],
                    interlacing_shift,
                    interlacing_leftweight,
                    &mut left,
                    &mut right,
                );
            } else {
                left.copy_from_slice(&subframes[0]);
                right.copy_from_slice(&subframes[1]);
            }
            channel1 = Some(right);
            left
        } else {
            subframes.pop().unwrap_or_default()
        };

        if lsb_bits > 0 {
            for (i, &lsb) in lsbs[0].iter().enumerate() {
                channel0[i] = channel0[i].wrapping_shl(lsb_bits) | lsb as i32;
            }
            if let Some(channel1) = channel1.as_mut() {
                for (i, &lsb) in lsbs[1].iter().enumerate() {
                    channel1[i] = channel1[i].wrapping_shl(lsb_bits) | lsb as i32;
                }
            }
        }

        Ok((channel0, channel1, block_size))
    }

    fn read_subframe_header(&mut self) -> Result<SubframeHeader> {
        let prediction_type = self.reader.read_bits(4)?;
        if prediction_type != 0 {
            return Err(AlacError::InvalidPredictionType);
        }
        let shift_needed = self.reader.read_bits(4)?;
        let _rice_modifier = self.reader.read_bits(3)?;
        let coeff_count = self.reader.read_bits(5)? as usize;
        debug_assert!(coeff_count <= MAX_COEFFICIENTS);

        let mut coefficients = Vec::with_capacity(coeff_count);
        for _ in 0..coeff_count {
            coefficients.push(self.reader.read_signed(16)?);
        }

        Ok(SubframeHeader {
            shift_needed,
            coefficients,
        })
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Frameset>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frameset().transpose()
    }
}
