//! Windowing, autocorrelation, Levinson–Durbin recursion, and coefficient
//! quantisation for the encoder's LPC stage.

use crate::MAX_LPC_ORDER;

/// Fractional shift embedded in quantised coefficients.
pub const QLP_SHIFT: u32 = 9;

/// Bit width of a quantised coefficient.
pub const QLP_PRECISION: u32 = 16;

/// Precompute a Tukey window over `block_size` samples.
pub fn tukey_window(alpha: f64, block_size: usize) -> Vec<f64> {
    let np = (alpha / 2.0 * block_size as f64 - 1.0) as usize;
    let mut window = vec![1.0; block_size];
    for (i, w) in window.iter_mut().enumerate() {
        if i <= np {
            *w = (1.0 - (std::f64::consts::PI * i as f64 / np as f64).cos()) / 2.0;
        } else if i >= block_size - np - 1 {
            *w = (1.0
                - (std::f64::consts::PI * (block_size - i - 1) as f64 / np as f64).cos())
                / 2.0;
        }
    }
    window
}

/// Apply the window to a block of samples.
pub fn window_signal(samples: &[i32], window: &[f64], windowed: &mut Vec<f64>) {
    windowed.clear();
    windowed.extend(
        samples
            .iter()
            .zip(window)
            .map(|(&sample, &w)| sample as f64 * w),
    );
}

/// Autocorrelation of the windowed signal at lags `0..=MAX_LPC_ORDER`.
pub fn autocorrelate(windowed: &[f64], autocorrelated: &mut [f64; MAX_LPC_ORDER + 1]) {
    for (lag, value) in autocorrelated.iter_mut().enumerate() {
        let mut sum = 0.0;
        for j in 0..windowed.len() - lag {
            sum += windowed[j] * windowed[j + lag];
        }
        *value = sum;
    }
}

/// Levinson–Durbin recursion. Row `i` of the result holds the LP
/// coefficients for order `i + 1`.
///
/// The caller must have rejected the all-zero block (`autocorrelated[0] == 0`)
/// beforehand.
pub fn compute_lp_coefficients(
    autocorrelated: &[f64; MAX_LPC_ORDER + 1],
    lp_coeff: &mut [[f64; MAX_LPC_ORDER]; MAX_LPC_ORDER],
) {
    let mut error = [0.0; MAX_LPC_ORDER];

    let mut k = autocorrelated[1] / autocorrelated[0];
    lp_coeff[0][0] = k;
    error[0] = autocorrelated[0] * (1.0 - k * k);

    for i in 1..MAX_LPC_ORDER {
        let mut sum = 0.0;
        for j in 0..i {
            sum += lp_coeff[i - 1][j] * autocorrelated[i - j];
        }
        let q = autocorrelated[i + 1] - sum;
        k = q / error[i - 1];
        for j in 0..i {
            lp_coeff[i][j] = lp_coeff[i - 1][j] - k * lp_coeff[i - 1][i - j - 1];
        }
        lp_coeff[i][i] = k;
        error[i] = error[i - 1] * (1.0 - k * k);
    }
}

/// Quantise the order-`order` row of LP coefficients to signed 16-bit with
/// the 9-bit fractional shift folded in.
///
/// The running error is kept in an unsigned integer; the saturating
/// truncation toward zero is load-bearing for byte-identical output.
pub fn quantize_coefficients(
    order: usize,
    lp_coeff: &[[f64; MAX_LPC_ORDER]; MAX_LPC_ORDER],
    qlp_coefficients: &mut [i32],
) {
    let max_coeff = (1i64 << (QLP_PRECISION - 1)) - 1;
    let min_coeff = -(1i64 << (QLP_PRECISION - 1));
    let mut error = 0u32;

    for i in 0..order {
        let sum = error as f64 + lp_coeff[order - 1][i] * (1u32 << QLP_SHIFT) as f64;
        let rounded = sum.round().clamp(min_coeff as f64, max_coeff as f64) as i32;
        qlp_coefficients[i] = rounded;
        error = (sum - rounded as f64) as u32;
    }
}
