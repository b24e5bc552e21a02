//! Adaptive linear predictor shared by the encoder and decoder.
//!
//! Both directions must walk identical coefficient trajectories, so the
//! sign-driven adaptation lives in one function: the encoder feeds it the
//! residual it just computed, the decoder the residual it just consumed.

use crate::residual::{CodeResult, ResidualOverflow};
use crate::MAX_LPC_ORDER;

/// Mask `value` to its low `bits` and sign-extend from bit `bits - 1`.
pub fn truncate_bits(value: i32, bits: u32) -> i32 {
    debug_assert!(bits >= 1 && bits < 32);
    let truncated = value & ((1i32 << bits) - 1);
    if truncated & (1 << (bits - 1)) != 0 {
        truncated - (1 << bits)
    } else {
        truncated
    }
}

/// Truncate a residual, raising the overflow condition when truncation
/// would actually change the value: a residual that does not fit
/// `sample_size` bits cannot be reconstructed, so the frame falls back to
/// uncompressed storage.
fn fit_bits(value: i32, bits: u32) -> CodeResult<i32> {
    let truncated = truncate_bits(value, bits);
    if truncated == value {
        Ok(truncated)
    } else {
        Err(ResidualOverflow)
    }
}

/// Nudge the coefficients toward the sign of `error`.
///
/// `samples[i - order .. i]` must hold the already-known sample window:
/// input samples on encode, reconstructed samples on decode.
fn adapt(
    coefficients: &mut [i32],
    samples: &[i32],
    i: usize,
    base: i32,
    mut error: i64,
    shift: u32,
) {
    let order = coefficients.len();
    if error > 0 {
        for j in 0..order {
            let diff = base as i64 - samples[i - order + j] as i64;
            let sign = diff.signum();
            coefficients[order - j - 1] -= sign as i32;
            error -= ((diff * sign) >> shift) * (j as i64 + 1);
            if error <= 0 {
                break;
            }
        }
    } else if error < 0 {
        for j in 0..order {
            let diff = base as i64 - samples[i - order + j] as i64;
            let sign = diff.signum();
            coefficients[order - j - 1] += sign as i32;
            error -= ((diff * -sign) >> shift) * (j as i64 + 1);
            if error >= 0 {
                break;
            }
        }
    }
}

/// Compute residuals for `samples` with the given quantised coefficients.
///
/// The first sample passes through verbatim, the next `order` are coded as
/// first differences, and the rest run through the adaptive predictor with
/// its fixed 9-bit shift.
pub fn compute_residuals(
    sample_size: u32,
    samples: &[i32],
    order: usize,
    qlp_coefficients: &[i32],
    residuals: &mut Vec<i32>,
) -> CodeResult<()> {
    debug_assert!(order >= 1 && order <= MAX_LPC_ORDER);
    let mut coefficients = [0i32; MAX_LPC_ORDER];
    coefficients[..order].copy_from_slice(&qlp_coefficients[..order]);
    let coefficients = &mut coefficients[..order];

    residuals.clear();
    residuals.push(samples[0]);

    for i in 1..(order + 1).min(samples.len()) {
        residuals.push(fit_bits(samples[i] - samples[i - 1], sample_size)?);
    }

    for i in (order + 1)..samples.len() {
        let base = samples[i - order - 1];
        let mut lpc_sum: i64 = 1 << 8;
        for j in 0..order {
            lpc_sum += coefficients[j] as i64 * (samples[i - j - 1] - base) as i64;
        }
        lpc_sum >>= 9;

        let error = fit_bits(
            (samples[i] as i64 - base as i64 - lpc_sum) as i32,
            sample_size,
        )?;
        residuals.push(error);

        adapt(coefficients, samples, i, base, error as i64, 9);
    }

    Ok(())
}

/// Reconstruct a subframe from residuals, mirroring [`compute_residuals`].
///
/// `coefficients` is mutated by the adaptation. `shift` comes from the
/// subframe header; a shift of 0 skips the rounding bias. With an empty
/// coefficient list the output is the prefix sum of the residuals.
pub fn decode_subframe(
    residuals: &[i32],
    coefficients: &mut [i32],
    shift: u32,
    subframe: &mut Vec<i32>,
) {
    let order = coefficients.len();
    subframe.clear();
    if residuals.is_empty() {
        return;
    }
    subframe.push(residuals[0]);

    for i in 1..(order + 1).min(residuals.len()) {
        let value = residuals[i].wrapping_add(subframe[i - 1]);
        subframe.push(value);
    }

    for i in (order + 1)..residuals.len() {
        let residual = residuals[i];
        let base = subframe[i - order - 1];
        let mut qlp_sum: i64 = 0;
        for j in 0..order {
            qlp_sum += coefficients[j] as i64 * (subframe[i - j - 1] as i64 - base as i64);
        }
        if shift > 0 {
            qlp_sum += 1 << (shift - 1);
            qlp_sum >>= shift;
        }

        let value = (qlp_sum as i32).wrapping_add(residual).wrapping_add(base);
        subframe.push(value);

        adapt(coefficients, subframe, i, base, residual as i64, shift);
    }
}
