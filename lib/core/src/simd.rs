// SIMD kernels for the similarity hot path.
// Index vectors are unit length, so cosine similarity reduces to a dot product.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

// CLIP embeddings are 512 or 768 wide; below this the scalar path wins.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
const MIN_DIM_SIZE_SIMD: usize = 16;

/// Dot product of two equally sized slices.
///
/// Returns 0.0 when lengths differ; callers that care about the mismatch
/// validate dimensions before reaching this function.
#[inline]
pub fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    #[cfg(target_arch = "x86_64")]
    {
        if a.len() >= MIN_DIM_SIZE_SIMD
            && is_x86_feature_detected!("avx2")
            && is_x86_feature_detected!("fma")
        {
            return unsafe { dot_product_avx2(a, b) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        if a.len() >= MIN_DIM_SIZE_SIMD && std::arch::is_aarch64_feature_detected!("neon") {
            return unsafe { dot_product_neon(a, b) };
        }
    }

    dot_product_scalar(a, b)
}

/// AVX2 dot product, 16 lanes per iteration over two accumulators
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    let dim = a.len();
    let mut i = 0;

    let mut acc_lo = _mm256_setzero_ps();
    let mut acc_hi = _mm256_setzero_ps();

    while i + 16 <= dim {
        let xa = _mm256_loadu_ps(a.as_ptr().add(i));
        let xb = _mm256_loadu_ps(b.as_ptr().add(i));
        let ya = _mm256_loadu_ps(a.as_ptr().add(i + 8));
        let yb = _mm256_loadu_ps(b.as_ptr().add(i + 8));

        acc_lo = _mm256_fmadd_ps(xa, xb, acc_lo);
        acc_hi = _mm256_fmadd_ps(ya, yb, acc_hi);

        i += 16;
    }

    let acc = _mm256_add_ps(acc_lo, acc_hi);
    let upper = _mm256_extractf128_ps(acc, 1);
    let lower = _mm256_castps256_ps128(acc);
    let mut quad = _mm_add_ps(upper, lower);
    quad = _mm_hadd_ps(quad, quad);
    quad = _mm_hadd_ps(quad, quad);

    let mut dot = _mm_cvtss_f32(quad);
    while i < dim {
        dot += a[i] * b[i];
        i += 1;
    }
    dot
}

/// NEON dot product for ARM64 / Apple Silicon
#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
unsafe fn dot_product_neon(a: &[f32], b: &[f32]) -> f32 {
    let dim = a.len();
    let mut i = 0;

    let mut acc_lo = vdupq_n_f32(0.0);
    let mut acc_hi = vdupq_n_f32(0.0);

    while i + 8 <= dim {
        let xa = vld1q_f32(a.as_ptr().add(i));
        let xb = vld1q_f32(b.as_ptr().add(i));
        let ya = vld1q_f32(a.as_ptr().add(i + 4));
        let yb = vld1q_f32(b.as_ptr().add(i + 4));

        acc_lo = vfmaq_f32(acc_lo, xa, xb);
        acc_hi = vfmaq_f32(acc_hi, ya, yb);

        i += 8;
    }

    let mut dot = vaddvq_f32(vaddq_f32(acc_lo, acc_hi));
    while i < dim {
        dot += a[i] * b[i];
        i += 1;
    }
    dot
}

#[inline]
fn dot_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut even = 0.0f32;
    let mut odd = 0.0f32;

    let a_pairs = a.chunks_exact(2);
    let tail = a_pairs.remainder();
    for (pa, pb) in a_pairs.zip(b.chunks_exact(2)) {
        even += pa[0] * pb[0];
        odd += pa[1] * pb[1];
    }
    if let (Some(x), Some(y)) = (tail.first(), b.last()) {
        even += x * y;
    }

    even + odd
}

/// Euclidean length
#[inline]
pub fn norm_simd(v: &[f32]) -> f32 {
    dot_product_simd(v, v).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_dot_product_matches_naive() {
        for dim in [1usize, 3, 7, 16, 33, 512] {
            let a: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.37).sin()).collect();
            let b: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.11).cos()).collect();
            let expected = naive_dot(&a, &b);
            let actual = dot_product_simd(&a, &b);
            assert!(
                (expected - actual).abs() < 1e-3,
                "dim {}: expected {}, got {}",
                dim,
                expected,
                actual
            );
        }
    }

    #[test]
    fn test_dot_product_length_mismatch() {
        assert_eq!(dot_product_simd(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_norm() {
        assert!((norm_simd(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(norm_simd(&[]), 0.0);
    }
}
