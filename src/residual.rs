//! Adaptive Rice-style residual coder.
//!
//! Each residual is folded to unsigned by sign-magnitude interleaving and
//! coded with a parameter derived from a running `history` register. A
//! history below 128 switches to a zero-run code; a folded value that does
//! not fit `sample_size` bits aborts the whole compressed-frame attempt.

use crate::bitstream::{BitReader, BitWriter};
use crate::error::Result;
use crate::{DecoderParameters, EncoderOptions};

/// A folded residual exceeded `2^sample_size` during compressed-frame
/// coding. Strictly frame-local: the frame writer catches it and re-emits
/// the frame uncompressed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResidualOverflow;

pub(crate) type CodeResult<T> = std::result::Result<T, ResidualOverflow>;

/// Residual-coder tuning shared by both directions.
#[derive(Debug, Clone)]
pub struct CoderParams {
    /// Starting value of the history register per residual block.
    pub initial_history: u32,
    /// Scale applied to the history update.
    pub history_multiplier: u32,
    /// Upper bound on the Rice parameter.
    pub maximum_k: u32,
}

impl From<&EncoderOptions> for CoderParams {
    fn from(options: &EncoderOptions) -> Self {
        Self {
            initial_history: options.initial_history,
            history_multiplier: options.history_multiplier,
            maximum_k: options.maximum_k,
        }
    }
}

impl From<&DecoderParameters> for CoderParams {
    fn from(params: &DecoderParameters) -> Self {
        Self {
            initial_history: params.initial_history,
            history_multiplier: params.history_multiplier,
            maximum_k: params.maximum_k,
        }
    }
}

/// Position of the highest set bit; -1 for 0.
fn log2(value: i32) -> i32 {
    debug_assert!(value >= 0);
    31 - (value as u32).leading_zeros() as i32
}

/// Rice parameter for the next value given the current history.
fn rice_k(history: i32, maximum_k: u32) -> u32 {
    (log2((history >> 9) + 3) as u32).min(maximum_k)
}

/// Rice parameter for a zero-run length given a history below 128.
fn zero_run_k(history: i32, maximum_k: u32) -> u32 {
    let k = 7 - log2(history) + ((history + 16) >> 6);
    (k as u32).min(maximum_k)
}

/// Code one folded value at parameter `k`, escaping to `escape_width` raw
/// bits when the quotient exceeds 8.
fn write_residual(block: &mut BitWriter, value: u32, k: u32, escape_width: u32) {
    let divisor = (1u32 << k).wrapping_sub(1).max(1);
    let msb = value / divisor;
    let lsb = value % divisor;
    if msb > 8 {
        block.write_bits(0x1FF, 9);
        block.write_bits(value, escape_width);
    } else {
        block.write_unary(msb);
        if k > 1 {
            if lsb > 0 {
                block.write_bits(lsb + 1, k);
            } else {
                block.write_bits(0, k - 1);
            }
        }
    }
}

/// Read one folded value coded by [`write_residual`].
fn read_residual(reader: &mut BitReader<'_>, k: u32, escape_width: u32) -> Result<u32> {
    let msb = match reader.read_capped_unary()? {
        None => return reader.read_bits(escape_width),
        Some(msb) => msb,
    };
    if k == 0 {
        return Ok(msb);
    }
    let lsb = reader.read_bits(k - 1)?;
    if lsb == 0 {
        Ok(msb * ((1 << k) - 1))
    } else {
        let lsb = (lsb << 1) | reader.read_bits(1)?;
        Ok(msb * ((1 << k) - 1) + lsb - 1)
    }
}

/// Encode a block of residuals.
pub(crate) fn encode_residuals(
    block: &mut BitWriter,
    params: &CoderParams,
    sample_size: u32,
    residuals: &[i32],
) -> CodeResult<()> {
    let max_unsigned = 1u32 << sample_size;
    let multiplier = params.history_multiplier as i32;
    let mut history = params.initial_history as i32;
    let mut sign_modifier = 0u32;
    let mut i = 0;

    while i < residuals.len() {
        let residual = residuals[i];
        let unsigned = if residual >= 0 {
            (residual as u32) << 1
        } else {
            (((-residual) as u32) << 1) - 1
        };

        if unsigned >= max_unsigned {
            return Err(ResidualOverflow);
        }

        let k = rice_k(history, params.maximum_k);
        write_residual(block, unsigned.wrapping_sub(sign_modifier), k, sample_size);
        sign_modifier = 0;

        if unsigned <= 0xFFFF {
            history += unsigned as i32 * multiplier - ((history * multiplier) >> 9);
            i += 1;

            if history < 128 && i < residuals.len() {
                let k = zero_run_k(history, params.maximum_k);
                let mut zeroes = 0u32;
                while i < residuals.len() && residuals[i] == 0 {
                    zeroes += 1;
                    i += 1;
                }
                write_residual(block, zeroes, k, 16);
                if zeroes < 0xFFFF {
                    sign_modifier = 1;
                }
                history = 0;
            }
        } else {
            i += 1;
            history = 0xFFFF;
        }
    }

    Ok(())
}

/// Decode a block of `block_size` residuals.
pub(crate) fn read_residual_block(
    reader: &mut BitReader<'_>,
    params: &CoderParams,
    sample_size: u32,
    block_size: usize,
    residuals: &mut Vec<i32>,
) -> Result<()> {
    let multiplier = params.history_multiplier as i32;
    let mut history = params.initial_history as i32;
    let mut sign_modifier = 0u32;

    residuals.clear();
    while residuals.len() < block_size {
        let k = rice_k(history, params.maximum_k);
        let unsigned = read_residual(reader, k, sample_size)?.wrapping_add(sign_modifier);
        sign_modifier = 0;

        if unsigned & 1 != 0 {
            residuals.push(-(((unsigned.wrapping_add(1)) >> 1) as i32));
        } else {
            residuals.push((unsigned >> 1) as i32);
        }

        if unsigned > 0xFFFF {
            history = 0xFFFF;
        } else {
            history += unsigned as i32 * multiplier - ((history * multiplier) >> 9);
        }

        if history < 128 && residuals.len() < block_size {
            let k = zero_run_k(history, params.maximum_k);
            let run = read_residual(reader, k, 16)?;
            let run_len = (run as usize).min(block_size - residuals.len());
            for _ in 0..run_len {
                residuals.push(0);
            }
            history = 0;
            if run < 0xFFFF {
                sign_modifier = 1;
            }
        }
    }

    Ok(())
}
