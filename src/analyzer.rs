//! Image complexity analysis
//!
//! The complexity score is the population standard deviation of every sample
//! in the buffer, all channels pooled into one population. It is a cheap,
//! resolution-insensitive proxy for detail and noise used only to pick a
//! compression level.

use crate::pixels::PixelBuffer;

/// Population standard deviation of all samples in `pixels`.
///
/// Samples are binned into a 256-entry histogram first, so the moments are
/// computed from exact integer sums regardless of buffer size.
pub fn complexity_score(pixels: &PixelBuffer) -> f64 {
    let mut histogram = [0u64; 256];
    for &sample in pixels.samples() {
        histogram[sample as usize] += 1;
    }

    let (mut count, mut sum, mut sum_sq) = (0u64, 0u128, 0u128);
    for (value, &n) in histogram.iter().enumerate() {
        let v = value as u128;
        count += n;
        sum += v * n as u128;
        sum_sq += v * v * n as u128;
    }

    // PixelBuffer is never empty, count > 0
    let n = count as f64;
    let mean = sum as f64 / n;
    let variance = (sum_sq as f64 / n - mean * mean).max(0.0);
    variance.sqrt()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Score never exceeds half the sample range.
        #[test]
        fn prop_score_is_bounded(
            (width, height) in (1u32..=16, 1u32..=16),
            seed in any::<u64>(),
        ) {
            let len = (width * height * 3) as usize;
            let data: Vec<u8> = (0..len)
                .map(|i| (seed.wrapping_mul(6364136223846793005).wrapping_add(i as u64 * 1442695040888963407) >> 56) as u8)
                .collect();
            let score = complexity_score(&PixelBuffer::from_rgb(width, height, data).unwrap());
            prop_assert!(score >= 0.0);
            prop_assert!(score <= 127.5 + 1e-9);
        }

        /// Constant buffers score zero at any size.
        #[test]
        fn prop_constant_buffer_scores_zero(
            (width, height) in (1u32..=32, 1u32..=32),
            value in any::<u8>(),
        ) {
            let buf = PixelBuffer::filled(width, height, value).unwrap();
            prop_assert!(complexity_score(&buf).abs() < 1e-9);
        }
    }
}
