//! Integer Goertzel bank ("GDFT").
//!
//! Each bin runs the second-order recursion `q0 = coeff*q1 - q2 + x` over the
//! newest `window_len_optimized` samples of history. Coefficients are Q2.14,
//! state and products are i64.
//!
//! On target the state stays below `N * 2^13 / sin(w)`: about 5e9 for the
//! 55 Hz bin at 48 kHz with a 4096-sample window. That is past i32, so the
//! state is i64. The energy term squares it, so it is evaluated in i128.

use super::bins::{BinTable, COEFF_FRAC_BITS, NUM_FREQS};
use super::history::SampleHistory;

/// Input samples are pre-shifted by this much to keep the recursion in range.
const HEADROOM_SHIFT: u32 = 2;

#[inline]
fn step(q1: i64, q2: i64, coeff: i64, x: i32) -> i64 {
    ((coeff * q1) >> COEFF_FRAC_BITS) - q2 + x as i64
}

/// Final recursion state `(q1, q2)` after running `samples` through one bin.
pub fn run_recursion(samples: &[i16], coeff_q14: i32) -> (i64, i64) {
    let coeff = coeff_q14 as i64;
    let mut q1 = 0i64;
    let mut q2 = 0i64;

    let mut quads = samples.chunks_exact(4);
    for quad in &mut quads {
        let q0 = step(q1, q2, coeff, (quad[0] as i32) >> HEADROOM_SHIFT);
        let q3 = step(q0, q1, coeff, (quad[1] as i32) >> HEADROOM_SHIFT);
        let q4 = step(q3, q0, coeff, (quad[2] as i32) >> HEADROOM_SHIFT);
        let q5 = step(q4, q3, coeff, (quad[3] as i32) >> HEADROOM_SHIFT);
        q2 = q4;
        q1 = q5;
    }
    for &s in quads.remainder() {
        let q0 = step(q1, q2, coeff, (s as i32) >> HEADROOM_SHIFT);
        q2 = q1;
        q1 = q0;
    }
    (q1, q2)
}

/// `q1^2 + q2^2 - q1*q2*coeff`, never negative.
pub fn magnitude_squared(q1: i64, q2: i64, coeff_q14: i32) -> i64 {
    let q1 = q1 as i128;
    let q2 = q2 as i128;
    let cross = (q1 * q2 * coeff_q14 as i128) >> COEFF_FRAC_BITS;
    (q1 * q1 + q2 * q2 - cross).clamp(0, i64::MAX as i128) as i64
}

/// Bit-trick reciprocal square root with one Newton step.
#[inline]
pub fn fast_inv_sqrt(x: f32) -> f32 {
    let half = 0.5 * x;
    let y = f32::from_bits(0x5f37_59df - (x.to_bits() >> 1));
    y * (1.5 - half * y * y)
}

#[inline]
pub fn fast_sqrt(x: f32) -> f32 {
    if x <= 0.0 {
        0.0
    } else {
        x * fast_inv_sqrt(x)
    }
}

/// Unnormalized magnitude of one bin over `samples`.
pub fn magnitude(samples: &[i16], coeff_q14: i32) -> f32 {
    let (q1, q2) = run_recursion(samples, coeff_q14);
    fast_sqrt(magnitude_squared(q1, q2, coeff_q14) as f32)
}

/// Run every bin against the history. Bins at or above Nyquist report zero.
pub fn process_bank(
    table: &BinTable,
    history: &SampleHistory,
    raw: &mut [f32; NUM_FREQS],
    normalized: &mut [f32; NUM_FREQS],
) {
    for (i, bin) in table.bins().iter().enumerate() {
        if bin.above_nyquist || bin.window_len_optimized == 0 {
            raw[i] = 0.0;
            normalized[i] = 0.0;
            continue;
        }
        let window = history.latest(bin.window_len_optimized);
        let mag = magnitude(window, bin.coeff_q14);
        raw[i] = mag;
        normalized[i] = mag * bin.norm_factor;
    }
}
