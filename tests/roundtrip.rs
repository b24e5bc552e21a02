//! End-to-end encode/decode tests for alac-codec.

use std::io::Cursor;

use alac_codec::bitstream::BitReader;
use alac_codec::{
    encode, Decoder, DecoderParameters, EncoderOptions, FramesetSize, InterleavedSource,
};

fn encode_signal(
    samples: &[i32],
    channels: usize,
    bits: u32,
    options: &EncoderOptions,
) -> (Vec<u8>, Vec<FramesetSize>) {
    let mut source = InterleavedSource::new(samples.to_vec(), channels, bits);
    let mut output = Cursor::new(Vec::new());
    let sizes = encode(&mut output, &mut source, options).unwrap();
    (output.into_inner(), sizes)
}

fn decode_all(payload: &[u8], bits: u32, channels: u32, options: &EncoderOptions) -> Vec<i32> {
    let params = DecoderParameters::from_options(options, bits, channels);
    let mut samples = Vec::new();
    for frameset in Decoder::new(payload, params) {
        samples.extend(frameset.unwrap().samples);
    }
    samples
}

fn assert_roundtrip(samples: &[i32], channels: usize, bits: u32, options: &EncoderOptions) {
    let (bytes, _) = encode_signal(samples, channels, bits, options);
    let decoded = decode_all(&bytes[8..], bits, channels as u32, options);
    assert_eq!(decoded, samples);
}

/// Deterministic pseudo-random sample generator (xorshift), bounded to
/// `bits`-bit signed range.
fn noise(len: usize, bits: u32, seed: u64) -> Vec<i32> {
    let mut state = seed | 1;
    let half = 1i64 << (bits - 1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            ((state as i64).rem_euclid(2 * half) - half) as i32
        })
        .collect()
}

fn sine(len: usize, amplitude: f64, step: f64) -> Vec<i32> {
    (0..len)
        .map(|i| ((i as f64 * step).sin() * amplitude) as i32)
        .collect()
}

#[test]
fn roundtrip_16bit_mono_sine() {
    let options = EncoderOptions::default();
    let samples = sine(10000, 14000.0, 0.07);
    assert_roundtrip(&samples, 1, 16, &options);
}

#[test]
fn roundtrip_16bit_stereo_distinct_channels() {
    let options = EncoderOptions::default();
    let left = sine(8192, 12000.0, 0.05);
    let right = sine(8192, 9000.0, 0.11);
    let mut interleaved = Vec::with_capacity(left.len() * 2);
    for i in 0..left.len() {
        interleaved.push(left[i]);
        interleaved.push(right[i]);
    }
    assert_roundtrip(&interleaved, 2, 16, &options);
}

#[test]
fn roundtrip_16bit_noise_every_channel_count() {
    // 14-bit amplitudes keep every residual representable, so all channel
    // counts run through the compressed path.
    let options = EncoderOptions {
        block_size: 512,
        ..EncoderOptions::default()
    };
    for channels in 1..=8usize {
        let samples = noise(channels * 1200, 14, channels as u64 * 7919);
        assert_roundtrip(&samples, channels, 16, &options);
    }
}

#[test]
fn roundtrip_full_range_noise_every_channel_count() {
    // Full-scale noise makes sample-to-sample jumps that cannot be coded,
    // exercising the uncompressed fallback for every layout.
    let options = EncoderOptions {
        block_size: 512,
        ..EncoderOptions::default()
    };
    for channels in 1..=8usize {
        let samples = noise(channels * 1200, 16, channels as u64 * 104729);
        assert_roundtrip(&samples, channels, 16, &options);
    }
}

#[test]
fn roundtrip_24bit_stereo_noise() {
    let options = EncoderOptions::default();
    let samples = noise(2 * 4096, 24, 42);
    assert_roundtrip(&samples, 2, 24, &options);
}

#[test]
fn roundtrip_24bit_mono_quiet_signal() {
    let options = EncoderOptions::default();
    let samples = sine(5000, 300000.0, 0.003);
    assert_roundtrip(&samples, 1, 24, &options);
}

#[test]
fn encode_is_deterministic() {
    let options = EncoderOptions::default();
    let samples = noise(2 * 4096, 16, 1234);
    let (first, first_sizes) = encode_signal(&samples, 2, 16, &options);
    let (second, second_sizes) = encode_signal(&samples, 2, 16, &options);
    assert_eq!(first, second);
    assert_eq!(first_sizes, second_sizes);
}

#[test]
fn frameset_sizes_index_the_payload() {
    // Each size must point exactly at the next frameset so a container
    // can build its sample-size table without reparsing.
    let options = EncoderOptions::default();
    let samples = sine(3 * 4096 + 100, 8000.0, 0.2);
    let (bytes, sizes) = encode_signal(&samples, 1, 16, &options);
    assert_eq!(sizes.len(), 4);

    let params = DecoderParameters::from_options(&options, 16, 1);
    let mut offset = 8;
    for size in &sizes {
        let end = offset + size.byte_size as usize;
        let frameset = Decoder::new(&bytes[offset..end], params.clone())
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(frameset.pcm_frames, size.pcm_frames as usize);
        offset = end;
    }
    assert_eq!(offset, bytes.len());
}

// Scenario S1: an all-zero mono block decodes to all zeroes through the
// order-4, zero-coefficient path.
#[test]
fn scenario_all_zero_block() {
    let options = EncoderOptions::default();
    let samples = vec![0i32; 4096];
    let (bytes, _) = encode_signal(&samples, 1, 16, &options);

    let mut reader = BitReader::new(&bytes[8..]);
    assert_eq!(reader.read_bits(3).unwrap(), 0); // single channel
    assert_eq!(reader.read_bits(16).unwrap(), 0);
    assert_eq!(reader.read_bits(1).unwrap(), 0);
    assert_eq!(reader.read_bits(2).unwrap(), 0);
    assert_eq!(reader.read_bits(1).unwrap(), 0);
    assert_eq!(reader.read_bits(8).unwrap(), 0); // interlacing shift
    assert_eq!(reader.read_bits(8).unwrap(), 0); // interlacing leftweight
    assert_eq!(reader.read_bits(4).unwrap(), 0); // prediction type
    assert_eq!(reader.read_bits(4).unwrap(), 9); // shift needed
    assert_eq!(reader.read_bits(3).unwrap(), 4); // rice modifier
    assert_eq!(reader.read_bits(5).unwrap(), 4); // coefficient count
    for _ in 0..4 {
        assert_eq!(reader.read_signed(16).unwrap(), 0);
    }

    assert_eq!(decode_all(&bytes[8..], 16, 1, &options), samples);
}

// Scenario S2: identical stereo channels leave the difference channel
// identically zero and round-trip exactly.
#[test]
fn scenario_identical_stereo_channels() {
    let options = EncoderOptions::default();
    let mut interleaved = Vec::with_capacity(8192);
    for i in 0..4096 {
        interleaved.push(i % 256);
        interleaved.push(i % 256);
    }
    assert_roundtrip(&interleaved, 2, 16, &options);
}

// Scenario S3: 24-bit stereo random data carries one byte of raw LSBs per
// sample and channel.
#[test]
fn scenario_24bit_lsb_split() {
    let options = EncoderOptions::default();
    // Random content in the low 22 bits: the LSB byte is fully random
    // while the predictor's MSB slice stays codeable.
    let samples = noise(2 * 4096, 22, 99);
    let (bytes, _) = encode_signal(&samples, 2, 24, &options);

    let mut reader = BitReader::new(&bytes[8..]);
    assert_eq!(reader.read_bits(3).unwrap(), 1); // channel pair
    reader.skip(16).unwrap();
    assert_eq!(reader.read_bits(1).unwrap(), 0);
    assert_eq!(reader.read_bits(2).unwrap(), 1); // one byte of raw LSBs
    assert_eq!(reader.read_bits(1).unwrap(), 0); // still compressed

    assert_eq!(decode_all(&bytes[8..], 24, 2, &options), samples);
}

// Scenario S4: a five-sample block is stored uncompressed with an explicit
// sample count.
#[test]
fn scenario_tiny_block_uncompressed() {
    let options = EncoderOptions::default();
    let samples = vec![17, -17, 1000, -1000, 12345];
    let (bytes, sizes) = encode_signal(&samples, 1, 16, &options);
    assert_eq!(sizes[0].pcm_frames, 5);

    let mut reader = BitReader::new(&bytes[8..]);
    assert_eq!(reader.read_bits(3).unwrap(), 0);
    reader.skip(16).unwrap();
    assert_eq!(reader.read_bits(1).unwrap(), 1); // explicit sample count
    assert_eq!(reader.read_bits(2).unwrap(), 0);
    assert_eq!(reader.read_bits(1).unwrap(), 1); // uncompressed
    assert_eq!(reader.read_bits(32).unwrap(), 5);
    for &expected in &samples {
        assert_eq!(reader.read_signed(16).unwrap(), expected);
    }

    assert_eq!(decode_all(&bytes[8..], 16, 1, &options), samples);
}

// Scenario S5: a residual overflow during the compressed attempt forces an
// uncompressed frame, and the stream still round-trips.
#[test]
fn scenario_residual_overflow_falls_back_to_uncompressed() {
    // A widened leftweight search lets the correlated channel's verbatim
    // first sample exceed the folded sample_size range.
    let options = EncoderOptions {
        max_leftweight: 8,
        ..EncoderOptions::default()
    };
    let mut samples = noise(2 * 4096, 12, 7);
    samples[0] = 32767; // s0[0]
    samples[1] = -32768; // s1[0]
    let (bytes, _) = encode_signal(&samples, 2, 16, &options);

    let mut reader = BitReader::new(&bytes[8..]);
    assert_eq!(reader.read_bits(3).unwrap(), 1);
    reader.skip(16).unwrap();
    assert_eq!(reader.read_bits(1).unwrap(), 0);
    assert_eq!(reader.read_bits(2).unwrap(), 0);
    assert_eq!(reader.read_bits(1).unwrap(), 1); // fell back to uncompressed

    assert_eq!(decode_all(&bytes[8..], 16, 2, &options), samples);
}

// Scenario S6: six channels are regrouped as [c2], (c0,c1), (c4,c5), [c3]
// on the wire and restored to source order on decode.
#[test]
fn scenario_six_channel_layout() {
    let options = EncoderOptions::default();
    let channels = 6usize;
    let mut interleaved = Vec::with_capacity(channels * 4096);
    for i in 0..4096i32 {
        for c in 0..channels as i32 {
            // Distinct per-channel content so any misordering shows up.
            interleaved.push((i % 97) * (c + 1) - 300 * c);
        }
    }
    let (bytes, _) = encode_signal(&interleaved, channels, 16, &options);

    let mut reader = BitReader::new(&bytes[8..]);
    assert_eq!(reader.read_bits(3).unwrap(), 0); // [c2] leads the frameset

    assert_eq!(decode_all(&bytes[8..], 16, 6, &options), interleaved);
}

#[test]
fn short_final_block_carries_sample_count() {
    let options = EncoderOptions::default();
    let samples = sine(4096 + 50, 6000.0, 0.13);
    let (bytes, sizes) = encode_signal(&samples, 1, 16, &options);
    assert_eq!(sizes[1].pcm_frames, 50);

    // Parse the second frameset's frame header.
    let offset = 8 + sizes[0].byte_size as usize;
    let mut reader = BitReader::new(&bytes[offset..]);
    reader.skip(3).unwrap();
    reader.skip(16).unwrap();
    assert_eq!(reader.read_bits(1).unwrap(), 1); // explicit sample count
    reader.skip(2).unwrap();
    reader.skip(1).unwrap();
    assert_eq!(reader.read_bits(32).unwrap(), 50);

    assert_eq!(decode_all(&bytes[8..], 16, 1, &options), samples);
}

#[test]
fn unsupported_bit_depth_is_rejected() {
    let mut source = InterleavedSource::new(vec![0; 64], 1, 20);
    let mut output = Cursor::new(Vec::new());
    assert!(encode(&mut output, &mut source, &EncoderOptions::default()).is_err());
}

#[test]
fn empty_leftweight_range_is_rejected() {
    let options = EncoderOptions {
        min_leftweight: 5,
        max_leftweight: 4,
        ..EncoderOptions::default()
    };
    let mut source = InterleavedSource::new(vec![0; 64], 2, 16);
    let mut output = Cursor::new(Vec::new());
    assert!(encode(&mut output, &mut source, &options).is_err());
}

#[test]
fn leftweight_beyond_header_field_is_rejected() {
    let options = EncoderOptions {
        max_leftweight: 300,
        ..EncoderOptions::default()
    };
    let mut source = InterleavedSource::new(vec![0; 64], 2, 16);
    let mut output = Cursor::new(Vec::new());
    assert!(encode(&mut output, &mut source, &options).is_err());
}

#[test]
fn widest_valid_leftweight_range_roundtrips() {
    // 255 is the largest weight the 8-bit header field can carry; the
    // whole search range must still produce a decodable stream.
    let options = EncoderOptions {
        block_size: 256,
        max_leftweight: 255,
        ..EncoderOptions::default()
    };
    let left = sine(600, 9000.0, 0.09);
    let right = sine(600, 7000.0, 0.04);
    let mut interleaved = Vec::with_capacity(left.len() * 2);
    for i in 0..left.len() {
        interleaved.push(left[i]);
        interleaved.push(right[i]);
    }
    assert_roundtrip(&interleaved, 2, 16, &options);
}

#[test]
fn impulse_train_roundtrip() {
    // Long zero runs punctuated by spikes exercise the zero-run coder.
    let options = EncoderOptions::default();
    let mut samples = vec![0i32; 4096];
    for i in (0..4096).step_by(97) {
        samples[i] = if i % 2 == 0 { 20000 } else { -20000 };
    }
    assert_roundtrip(&samples, 1, 16, &options);
}

#[test]
fn full_scale_extremes_roundtrip() {
    let options = EncoderOptions::default();
    let mut samples = Vec::with_capacity(4096);
    for i in 0..4096 {
        samples.push(if i % 2 == 0 { 32767 } else { -32768 });
    }
    assert_roundtrip(&samples, 1, 16, &options);
}
