//! Q64.64 fixed-point arithmetic
//!
//! Binary and decimal logarithms over unsigned Q64.64 values, plus the
//! wide multiply-divide and decimal-scale conversions the accounting core
//! is built on. Everything here is exact integer arithmetic with
//! truncation toward zero; intermediate products that would exceed 128
//! bits are computed through explicit high/low splits.

use crate::error::{MathError, Result};

/// 1.0 in Q64.64
pub const Q64_ONE: u128 = 1 << 64;

/// 1.0 in the 1e18 decimal fixed-point scale used for token amounts
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// log2(10) in Q64.64, truncated: floor(log2(10) * 2^64).
///
/// This is exactly the value [`log2`] itself produces for `10 << 64`,
/// which makes `log10(10^k) == k` hold without correction terms.
pub const LOG2_10: u128 = 61_278_757_397_652_712_441;

const FRAC_MASK: u128 = Q64_ONE - 1;

/// Exact `(m * m) >> 64` for mantissas below 2^65.
///
/// The full 256-bit square is never materialized; the high limb of `m`
/// is at most one bit so the split terms all fit in 128 bits.
fn sqr_shift64(m: u128) -> u128 {
    let hi = m >> 64;
    let lo = m & FRAC_MASK;
    ((hi * hi) << 64) + 2 * hi * lo + ((lo * lo) >> 64)
}

/// Binary logarithm of a strictly positive Q64.64 value, in Q64.64.
///
/// The integer part comes from the argument's bit length (negative for
/// arguments below 1.0). The mantissa is then normalized to `[1, 2)` and
/// squared 64 times, extracting one fractional bit per iteration. The
/// result is accurate to within a few ulps of 2^-64.
///
/// Errors with [`MathError::LogDomain`] on zero; callers are expected to
/// guard the zero case before reaching this primitive.
pub fn log2(x: u128) -> Result<i128> {
    if x == 0 {
        return Err(MathError::LogDomain);
    }

    let msb = 127 - x.leading_zeros() as i32;
    let mut result = ((msb as i128) - 64) << 64;

    // normalize mantissa into [1, 2) as Q64.64
    let mut m = if msb >= 64 {
        x >> (msb - 64)
    } else {
        x << (64 - msb)
    };

    let mut bit: i128 = 1 << 63;
    for _ in 0..64 {
        m = sqr_shift64(m);
        if m >= 2 * Q64_ONE {
            result += bit;
            m >>= 1;
        }
        bit >>= 1;
    }

    Ok(result)
}

/// Decimal logarithm of a strictly positive Q64.64 value, in Q64.64.
///
/// Computed as `log2(x) / log2(10)` with the division truncating toward
/// zero. Exact at integer powers of ten: `log10((10^k) << 64) == k << 64`
/// for `k` in `0..=20`.
pub fn log10(x: u128) -> Result<i128> {
    let l2 = log2(x)?;
    if l2 >= 0 {
        Ok(div_shift64(l2 as u128, LOG2_10) as i128)
    } else {
        Ok(-(div_shift64(l2.unsigned_abs(), LOG2_10) as i128))
    }
}

/// Exact `floor((a << 64) / b)` without a 192-bit intermediate.
///
/// Base-2^32 long division. Requires `a < 2^96` and `b < 2^96`, which
/// holds for every call site (logarithm magnitudes are below 2^71).
fn div_shift64(a: u128, b: u128) -> u128 {
    let hi = a / b;
    let mut rem = a % b;
    let q1 = (rem << 32) / b;
    rem = (rem << 32) % b;
    let q2 = (rem << 32) / b;
    (hi << 64) + (q1 << 32) + q2
}

/// Full 128x128 -> 256-bit multiply, returned as `(high, low)` limbs.
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & FRAC_MASK);
    let (b_hi, b_lo) = (b >> 64, b & FRAC_MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & FRAC_MASK) + (hl & FRAC_MASK);
    let lo = (mid << 64) | (ll & FRAC_MASK);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// Exact `floor(a * b / c)` with a 256-bit intermediate product.
///
/// The workhorse behind proportional payouts, where both factors can be
/// near the 128-bit ceiling (share-seconds times reward pool). Restoring
/// bitwise division; the quotient must fit in 128 bits.
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(MathError::DivideByZero);
    }
    let (hi, lo) = mul_wide(a, b);
    if hi == 0 {
        return Ok(lo / c);
    }
    if hi >= c {
        return Err(MathError::Overflow);
    }

    let mut quotient: u128 = 0;
    let mut rem: u128 = 0;
    for i in (0..256).rev() {
        let next = if i >= 128 {
            (hi >> (i - 128)) & 1
        } else {
            (lo >> i) & 1
        };
        // rem < c before the shift, so the true value fits in 129 bits;
        // the carry bit stands in for bit 128
        let carry = rem >> 127;
        rem = (rem << 1) | next;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quotient |= 1 << i;
        }
    }
    Ok(quotient)
}

/// Convert a 1e18-scaled decimal amount to Q64.64.
///
/// Requires the whole-unit part to fit in 64 bits (amounts below
/// ~1.8e19 whole tokens), which every accounting path satisfies.
pub fn to_q64(dec: u128) -> u128 {
    ((dec / UNIT) << 64) + ((dec % UNIT) << 64) / UNIT
}

/// Convert a non-negative Q64.64 value to the 1e18 decimal scale,
/// truncating below 1e-18.
pub fn from_q64(q: u128) -> u128 {
    (q >> 64) * UNIT + ((q & FRAC_MASK) * UNIT >> 64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn q64_to_f64(q: i128) -> f64 {
        q as f64 / Q64_ONE as f64
    }

    #[test]
    fn test_log2_of_zero_rejected() {
        assert_eq!(log2(0), Err(MathError::LogDomain));
        assert_eq!(log10(0), Err(MathError::LogDomain));
    }

    #[test]
    fn test_log2_exact_powers_of_two() {
        for k in 0..60i128 {
            let x = Q64_ONE << k;
            assert_eq!(log2(x).unwrap(), k << 64);
        }
        // fractional powers: log2(2^-k) == -k
        for k in 1..60i128 {
            let x = Q64_ONE >> k;
            assert_eq!(log2(x).unwrap(), -(k << 64));
        }
    }

    #[test]
    fn test_log10_exact_powers_of_ten() {
        for k in 0..=20u32 {
            let x = 10u128.pow(k) << 64;
            assert_eq!(log10(x).unwrap(), (k as i128) << 64, "k = {}", k);
        }
    }

    #[test]
    fn test_log2_10_constant_matches_recurrence() {
        assert_eq!(log2(10 << 64).unwrap() as u128, LOG2_10);
    }

    #[test]
    fn test_log_fractional_arguments() {
        // log2(1/2) == -1
        assert_eq!(log2(Q64_ONE / 2).unwrap(), -(1i128 << 64));
        // log10(1/10) is within one ulp of -1 and truncated toward zero
        let l = log10(Q64_ONE / 10).unwrap();
        assert!(l <= 0);
        assert!((q64_to_f64(l) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_decimal_round_trip() {
        for dec in [0u128, 1, UNIT, 5 * UNIT / 2, 1_000_000 * UNIT] {
            let back = from_q64(to_q64(dec));
            assert!(dec - back <= 1, "dec {} back {}", dec, back);
        }
    }

    #[test]
    fn test_mul_div_basics() {
        assert_eq!(mul_div(6, 7, 3).unwrap(), 14);
        assert_eq!(mul_div(u128::MAX, 1, 1).unwrap(), u128::MAX);
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX).unwrap(), u128::MAX);
        assert_eq!(mul_div(1, 1, 0), Err(MathError::DivideByZero));
        assert_eq!(mul_div(u128::MAX, u128::MAX, 2), Err(MathError::Overflow));
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 2^100 * 2^100 / 2^100 == 2^100 even though the product is 200 bits
        let big = 1u128 << 100;
        assert_eq!(mul_div(big, big, big).unwrap(), big);
        // share-seconds scale payout: pool * weighted / denom
        let pool = 1_000 * UNIT;
        let weighted = 3_000_000 * UNIT * 86_400;
        let denom = 9_000_000 * UNIT * 86_400;
        assert_eq!(mul_div(pool, weighted, denom).unwrap(), pool / 3);
    }

    proptest! {
        #[test]
        fn prop_log2_accuracy(x in 1u128..u128::MAX >> 2) {
            let got = q64_to_f64(log2(x).unwrap());
            let want = (x as f64 / Q64_ONE as f64).log2();
            prop_assert!((got - want).abs() < 1e-6);
        }

        #[test]
        fn prop_log10_accuracy(x in 1u128..u128::MAX >> 2) {
            let got = q64_to_f64(log10(x).unwrap());
            let want = (x as f64 / Q64_ONE as f64).log10();
            prop_assert!((got - want).abs() < 1e-6);
        }

        #[test]
        fn prop_log2_monotone(x in 1u128..u128::MAX >> 2, y in 1u128..u128::MAX >> 2) {
            let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
            prop_assert!(log2(lo).unwrap() <= log2(hi).unwrap());
        }

        #[test]
        fn prop_mul_div_exact_small(a in 0u128..u64::MAX as u128, b in 0u128..u64::MAX as u128, c in 1u128..u64::MAX as u128) {
            prop_assert_eq!(mul_div(a, b, c).unwrap(), a * b / c);
        }

        #[test]
        fn prop_mul_div_cancellation(a: u128, b in 1u128..u128::MAX) {
            // a * b / b == a for any magnitudes
            prop_assert_eq!(mul_div(a, b, b).unwrap(), a);
        }
    }
}
