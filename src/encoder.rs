//! ALAC encoder: frame and frameset writing plus the top-level encode loop.

use std::io::{Seek, SeekFrom, Write};

use crate::bitstream::BitWriter;
use crate::error::{AlacError, Result};
use crate::lpc::{self, QLP_SHIFT};
use crate::residual::{self, CodeResult, CoderParams, ResidualOverflow};
use crate::{
    channel_layout, correlation, predictor, EncoderOptions, FramesetSize, PcmSource,
    INTERLACING_SHIFT, MAX_LPC_ORDER,
};

/// Samples below this count are always stored uncompressed.
const MIN_COMPRESSIBLE_SAMPLES: usize = 10;

/// Rice modifier advertised in every subframe header.
const RICE_MODIFIER: u32 = 4;

/// LPC analysis scratch: windowing through residual-block encoding at
/// orders 4 and 8, sized once per encoder and reused for every subframe.
struct LpcScratch {
    window: Vec<f64>,
    windowed: Vec<f64>,
    autocorrelated: [f64; MAX_LPC_ORDER + 1],
    lp_coeff: [[f64; MAX_LPC_ORDER]; MAX_LPC_ORDER],
    qlp4: [i32; 4],
    qlp8: [i32; 8],
    residuals4: Vec<i32>,
    residuals8: Vec<i32>,
    block4: BitWriter,
    block8: BitWriter,
    coder: CoderParams,
}

impl LpcScratch {
    fn new(block_size: usize, coder: CoderParams) -> Self {
        Self {
            window: lpc::tukey_window(0.5, block_size),
            windowed: Vec::with_capacity(block_size),
            autocorrelated: [0.0; MAX_LPC_ORDER + 1],
            lp_coeff: [[0.0; MAX_LPC_ORDER]; MAX_LPC_ORDER],
            qlp4: [0; 4],
            qlp8: [0; 8],
            residuals4: Vec::with_capacity(block_size),
            residuals8: Vec::with_capacity(block_size),
            block4: BitWriter::new(),
            block8: BitWriter::new(),
            coder,
        }
    }

    /// Analyse one subframe: produce quantised coefficients and append the
    /// coded residual block to `residual`. Returns the chosen order.
    ///
    /// Orders 4 and 8 compete on coded size, with 64 bits added to the
    /// order-8 side for its longer coefficient header. An all-zero block
    /// short-circuits to order 4 with zero coefficients.
    fn compute_coefficients(
        &mut self,
        samples: &[i32],
        sample_size: u32,
        qlp_coefficients: &mut [i32; MAX_LPC_ORDER],
        residual: &mut BitWriter,
    ) -> CodeResult<usize> {
        lpc::window_signal(samples, &self.window, &mut self.windowed);
        lpc::autocorrelate(&self.windowed, &mut self.autocorrelated);

        if self.autocorrelated[0] != 0.0 {
            lpc::compute_lp_coefficients(&self.autocorrelated, &mut self.lp_coeff);
            lpc::quantize_coefficients(4, &self.lp_coeff, &mut self.qlp4);
            lpc::quantize_coefficients(8, &self.lp_coeff, &mut self.qlp8);

            predictor::compute_residuals(sample_size, samples, 4, &self.qlp4, &mut self.residuals4)?;
            predictor::compute_residuals(sample_size, samples, 8, &self.qlp8, &mut self.residuals8)?;

            self.block4.clear();
            residual::encode_residuals(&mut self.block4, &self.coder, sample_size, &self.residuals4)?;
            self.block8.clear();
            residual::encode_residuals(&mut self.block8, &self.coder, sample_size, &self.residuals8)?;

            if self.block4.bit_count() < self.block8.bit_count() + 64 {
                qlp_coefficients[..4].copy_from_slice(&self.qlp4);
                self.block4.copy_into(residual);
                Ok(4)
            } else {
                qlp_coefficients[..8].copy_from_slice(&self.qlp8);
                self.block8.copy_into(residual);
                Ok(8)
            }
        } else {
            qlp_coefficients[..4].fill(0);
            predictor::compute_residuals(sample_size, samples, 4, &[0; 4], &mut self.residuals4)?;
            residual::encode_residuals(residual, &self.coder, sample_size, &self.residuals4)?;
            Ok(4)
        }
    }
}

fn write_frame_header(
    bs: &mut BitWriter,
    sample_count: usize,
    block_size: usize,
    uncompressed_lsbs: u32,
    compressed: bool,
) {
    bs.write_bits(0, 16);
    bs.write_bits((sample_count != block_size) as u32, 1);
    bs.write_bits(uncompressed_lsbs, 2);
    bs.write_bits(!compressed as u32, 1);
    if sample_count != block_size {
        bs.write_bits(sample_count as u32, 32);
    }
}

fn write_subframe_header(bs: &mut BitWriter, order: usize, qlp_coefficients: &[i32]) {
    bs.write_bits(0, 4); // prediction type
    bs.write_bits(QLP_SHIFT, 4);
    bs.write_bits(RICE_MODIFIER, 3);
    bs.write_bits(order as u32, 5);
    for &coefficient in &qlp_coefficients[..order] {
        bs.write_signed(coefficient, 16);
    }
}

/// ALAC encoder for one stream.
///
/// Owns every scratch buffer the per-frame pipeline needs; buffers are
/// sized from `block_size` at construction and reused for every block.
pub struct Encoder {
    options: EncoderOptions,
    bits_per_sample: u32,
    lpc: LpcScratch,
    correlated0: Vec<i32>,
    correlated1: Vec<i32>,
    lsbs: Vec<i32>,
    msb0: Vec<i32>,
    msb1: Vec<i32>,
    residual0: BitWriter,
    residual1: BitWriter,
    compressed_frame: BitWriter,
    interlaced_frame: BitWriter,
    best_interlaced_frame: BitWriter,
}

impl Encoder {
    /// Create an encoder for a stream of `bits_per_sample`-bit samples.
    pub fn new(options: &EncoderOptions, bits_per_sample: u32) -> Result<Self> {
        if bits_per_sample != 16 && bits_per_sample != 24 {
            return Err(AlacError::UnsupportedBitDepth(bits_per_sample));
        }
        if options.block_size == 0 {
            return Err(AlacError::InvalidArgument("block size must be positive".into()));
        }
        if options.min_leftweight > options.max_leftweight {
            return Err(AlacError::InvalidArgument(
                "leftweight range is empty".into(),
            ));
        }
        if options.max_leftweight > 255 {
            return Err(AlacError::InvalidArgument(
                "leftweight must fit its 8-bit header field".into(),
            ));
        }
        let block_size = options.block_size as usize;
        Ok(Self {
            options: options.clone(),
            bits_per_sample,
            lpc: LpcScratch::new(block_size, CoderParams::from(options)),
            correlated0: Vec::with_capacity(block_size),
            correlated1: Vec::with_capacity(block_size),
            lsbs: Vec::with_capacity(block_size * 2),
            msb0: Vec::with_capacity(block_size),
            msb1: Vec::with_capacity(block_size),
            residual0: BitWriter::new(),
            residual1: BitWriter::new(),
            compressed_frame: BitWriter::new(),
            interlaced_frame: BitWriter::new(),
            best_interlaced_frame: BitWriter::new(),
        })
    }

    /// Encode one block of per-channel sample buffers as a frameset.
    ///
    /// All channels must share one length, at most `block_size`. The
    /// frameset is byte-aligned when this returns.
    pub fn write_frameset(&mut self, bs: &mut BitWriter, channels: &[Vec<i32>]) {
        debug_assert!(channels.iter().all(|ch| ch.len() == channels[0].len()));

        for group in channel_layout(channels.len()) {
            match group.as_slice() {
                [c] => self.write_frame(bs, &[channels[*c].as_slice()]),
                [c0, c1] => {
                    self.write_frame(bs, &[channels[*c0].as_slice(), channels[*c1].as_slice()])
                }
                _ => unreachable!("layout groups carry one or two channels"),
            }
        }

        bs.write_bits(7, 3);
        bs.byte_align();
    }

    fn write_frame(&mut self, bs: &mut BitWriter, channels: &[&[i32]]) {
        bs.write_bits(channels.len() as u32 - 1, 3);

        if channels[0].len() >= MIN_COMPRESSIBLE_SAMPLES {
            let mut compressed = std::mem::take(&mut self.compressed_frame);
            compressed.clear();
            match self.write_compressed_frame(&mut compressed, channels) {
                Ok(()) => compressed.copy_into(bs),
                Err(ResidualOverflow) => {
                    tracing::debug!(
                        samples = channels[0].len(),
                        "residual overflow, writing uncompressed frame"
                    );
                    self.write_uncompressed_frame(bs, channels);
                }
            }
            self.compressed_frame = compressed;
        } else {
            self.write_uncompressed_frame(bs, channels);
        }
    }

    fn write_uncompressed_frame(&self, bs: &mut BitWriter, channels: &[&[i32]]) {
        write_frame_header(
            bs,
            channels[0].len(),
            self.options.block_size as usize,
            0,
            false,
        );
        for i in 0..channels[0].len() {
            for channel in channels {
                bs.write_signed(channel[i], self.bits_per_sample);
            }
        }
    }

    fn write_compressed_frame(
        &mut self,
        bs: &mut BitWriter,
        channels: &[&[i32]],
    ) -> CodeResult<()> {
        if self.bits_per_sample <= 16 {
            if channels.len() == 1 {
                self.write_non_interlaced_frame(bs, 0, &[], channels[0])
            } else {
                self.write_best_interlaced_frame(bs, 0, &[], channels[0], channels[1])
            }
        } else {
            // Split off the uncompressed least-significant bits; the
            // predictor sees only the remaining MSBs.
            let lsb_count = (self.bits_per_sample - 16) / 8;
            let lsb_mask = (1 << (self.bits_per_sample - 16)) - 1;

            let mut lsbs = std::mem::take(&mut self.lsbs);
            let mut msb0 = std::mem::take(&mut self.msb0);
            let mut msb1 = std::mem::take(&mut self.msb1);
            lsbs.clear();
            msb0.clear();
            msb1.clear();

            for i in 0..channels[0].len() {
                for (c, channel) in channels.iter().enumerate() {
                    lsbs.push(channel[i] & lsb_mask);
                    let msb = channel[i] >> (self.bits_per_sample - 16);
                    if c == 0 {
                        msb0.push(msb);
                    } else {
                        msb1.push(msb);
                    }
                }
            }

            let result = if channels.len() == 1 {
                self.write_non_interlaced_frame(bs, lsb_count, &lsbs, &msb0)
            } else {
                self.write_best_interlaced_frame(bs, lsb_count, &lsbs, &msb0, &msb1)
            };

            self.lsbs = lsbs;
            self.msb0 = msb0;
            self.msb1 = msb1;
            result
        }
    }

    fn write_non_interlaced_frame(
        &mut self,
        bs: &mut BitWriter,
        lsb_count: u32,
        lsbs: &[i32],
        samples: &[i32],
    ) -> CodeResult<()> {
        write_frame_header(
            bs,
            samples.len(),
            self.options.block_size as usize,
            lsb_count,
            true,
        );
        bs.write_bits(0, 8); // no interlacing shift
        bs.write_bits(0, 8); // no interlacing leftweight

        let sample_size = self.bits_per_sample - lsb_count * 8;
        let mut qlp_coefficients = [0i32; MAX_LPC_ORDER];
        self.residual0.clear();
        let order = self.lpc.compute_coefficients(
            samples,
            sample_size,
            &mut qlp_coefficients,
            &mut self.residual0,
        )?;

        write_subframe_header(bs, order, &qlp_coefficients);

        if lsb_count > 0 {
            for &lsb in lsbs {
                bs.write_bits(lsb as u32, lsb_count * 8);
            }
        }

        self.residual0.copy_into(bs);
        Ok(())
    }

    /// Try every leftweight in the configured range and keep the candidate
    /// with the fewest bits, ties resolved toward the earliest.
    fn write_best_interlaced_frame(
        &mut self,
        bs: &mut BitWriter,
        lsb_count: u32,
        lsbs: &[i32],
        channel0: &[i32],
        channel1: &[i32],
    ) -> CodeResult<()> {
        let mut interlaced = std::mem::take(&mut self.interlaced_frame);
        let mut best = std::mem::take(&mut self.best_interlaced_frame);
        let mut best_bits = usize::MAX;
        let mut best_leftweight = 0;
        let mut result = Ok(());

        for leftweight in self.options.min_leftweight..=self.options.max_leftweight {
            interlaced.clear();
            if let Err(overflow) = self.write_interlaced_frame(
                &mut interlaced,
                lsb_count,
                lsbs,
                INTERLACING_SHIFT,
                leftweight,
                channel0,
                channel1,
            ) {
                result = Err(overflow);
                break;
            }
            if interlaced.bit_count() < best_bits {
                best_bits = interlaced.bit_count();
                best_leftweight = leftweight;
                std::mem::swap(&mut best, &mut interlaced);
            }
        }

        if result.is_ok() {
            tracing::trace!(
                leftweight = best_leftweight,
                bits = best_bits,
                "selected interlaced frame"
            );
            best.copy_into(bs);
        }

        self.interlaced_frame = interlaced;
        self.best_interlaced_frame = best;
        result
    }

    fn write_interlaced_frame(
        &mut self,
        bs: &mut BitWriter,
        lsb_count: u32,
        lsbs: &[i32],
        shift: u32,
        leftweight: u32,
        channel0: &[i32],
        channel1: &[i32],
    ) -> CodeResult<()> {
        let mut correlated0 = std::mem::take(&mut self.correlated0);
        let mut correlated1 = std::mem::take(&mut self.correlated1);
        correlation::correlate(
            channel0,
            channel1,
            shift,
            leftweight,
            &mut correlated0,
            &mut correlated1,
        );
        let result = self.write_correlated_frame(
            bs,
            lsb_count,
            lsbs,
            shift,
            leftweight,
            &correlated0,
            &correlated1,
        );
        self.correlated0 = correlated0;
        self.correlated1 = correlated1;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn write_correlated_frame(
        &mut self,
        bs: &mut BitWriter,
        lsb_count: u32,
        lsbs: &[i32],
        shift: u32,
        leftweight: u32,
        correlated0: &[i32],
        correlated1: &[i32],
    ) -> CodeResult<()> {
        write_frame_header(
            bs,
            correlated0.len(),
            self.options.block_size as usize,
            lsb_count,
            true,
        );
        bs.write_bits(shift, 8);
        bs.write_bits(leftweight, 8);

        // The correlated difference channel needs one extra bit.
        let sample_size = self.bits_per_sample - lsb_count * 8 + 1;

        let mut qlp0 = [0i32; MAX_LPC_ORDER];
        let mut qlp1 = [0i32; MAX_LPC_ORDER];
        self.residual0.clear();
        let order0 =
            self.lpc
                .compute_coefficients(correlated0, sample_size, &mut qlp0, &mut self.residual0)?;
        self.residual1.clear();
        let order1 =
            self.lpc
                .compute_coefficients(correlated1, sample_size, &mut qlp1, &mut self.residual1)?;

        write_subframe_header(bs, order0, &qlp0);
        write_subframe_header(bs, order1, &qlp1);

        if lsb_count > 0 {
            for &lsb in lsbs {
                bs.write_bits(lsb as u32, lsb_count * 8);
            }
        }

        self.residual0.copy_into(bs);
        self.residual1.copy_into(bs);
        Ok(())
    }
}

/// Encode a whole PCM stream.
///
/// Writes the 4-byte mdat size placeholder and `mdat` tag, streams one
/// frameset per block, then patches the size once the source is exhausted.
/// Returns the byte size and PCM frame count of every frameset in stream
/// order; sizes exclude the 8-byte mdat header.
pub fn encode<W, S>(output: &mut W, source: &mut S, options: &EncoderOptions) -> Result<Vec<FramesetSize>>
where
    W: Write + Seek,
    S: PcmSource,
{
    let channel_count = source.channels();
    if channel_count == 0 {
        return Err(AlacError::InvalidArgument("source has no channels".into()));
    }
    let mut encoder = Encoder::new(options, source.bits_per_sample())?;
    let block_size = options.block_size as usize;

    let mdat_start = output.stream_position()?;
    output.write_all(&[0, 0, 0, 0])?;
    output.write_all(b"mdat")?;

    let mut frame_sizes = Vec::new();
    let mut interleaved = Vec::with_capacity(block_size * channel_count);
    let mut channels: Vec<Vec<i32>> = vec![Vec::with_capacity(block_size); channel_count];
    let mut frameset = BitWriter::new();

    loop {
        let frames = source.read_block(block_size, &mut interleaved)?;
        if frames == 0 {
            break;
        }

        for (c, channel) in channels.iter_mut().enumerate() {
            channel.clear();
            channel.extend(
                interleaved[c..frames * channel_count]
                    .iter()
                    .step_by(channel_count),
            );
        }

        frameset.clear();
        encoder.write_frameset(&mut frameset, &channels);
        let bytes = frameset.as_bytes();
        output.write_all(bytes)?;
        tracing::debug!(bytes = bytes.len(), frames, "wrote frameset");

        frame_sizes.push(FramesetSize {
            byte_size: bytes.len() as u32,
            pcm_frames: frames as u32,
        });
    }

    let total_mdat_size = 8 + frame_sizes.iter().map(|s| s.byte_size).sum::<u32>();
    let end = output.stream_position()?;
    output.seek(SeekFrom::Start(mdat_start))?;
    output.write_all(&total_mdat_size.to_be_bytes())?;
    output.seek(SeekFrom::Start(end))?;

    Ok(frame_sizes)
}
