//! Fixed-point helpers shared by the OCV model, reconciler, and convergence
//! engine.
//!
//! All gauge arithmetic runs on `i32` milli-units. The [`ab_div_c`] primitive is
//! the only place where a scaled multiply-divide happens on untrusted inputs, so
//! it carries the overflow policy for the whole crate: magnitudes saturate at
//! [`SATURATED`] instead of wrapping.

/// Saturation sentinel returned by [`ab_div_c`] when the result does not fit.
pub const SATURATED: i32 = 0x7fff;

/// Full scale of the interpolation fraction (1000 == 100 %).
pub const FRACTION_SCALE: i32 = 1000;

/// Percent scale used for SOC values.
pub const PERCENT_SCALE: i32 = 100;

/// Replaces a zero denominator with `1`.
#[must_use]
pub const fn nonzero(value: i32) -> i32 {
    if value == 0 { 1 } else { value }
}

/// Returns `a * b / c` rounded half away from zero.
///
/// The sign is the XOR of the operand signs. The product is formed on 32-bit
/// magnitudes; a product that does not fit a signed 32-bit value, or a
/// quotient at or above [`SATURATED`], yields [`SATURATED`] with the computed
/// sign. `c == 0` yields the signed sentinel as well.
#[must_use]
pub fn ab_div_c(a: i32, b: i32, c: i32) -> i32 {
    let negative = (a ^ b ^ c) < 0;

    let magnitude = if c == 0 {
        SATURATED
    } else {
        let divisor = c.unsigned_abs();
        match a.unsigned_abs().checked_mul(b.unsigned_abs()) {
            Some(product) if product <= i32::MAX.unsigned_abs() => {
                let quotient = (product + divisor / 2) / divisor;
                if quotient < SATURATED.unsigned_abs() {
                    quotient as i32
                } else {
                    SATURATED
                }
            }
            _ => SATURATED,
        }
    };

    if negative { -magnitude } else { magnitude }
}

/// Narrows a wide intermediate back to `i32`, saturating at the bounds.
#[must_use]
pub const fn saturate_i32(value: i64) -> i32 {
    if value > i32::MAX as i64 {
        i32::MAX
    } else if value < i32::MIN as i64 {
        i32::MIN
    } else {
        value as i32
    }
}

/// Converts a remaining capacity into a rounded SOC percentage.
///
/// Half a percent of `fcc` is added before dividing so 99.5 % reads as 100.
/// The result is not clamped; callers clamp at observation points.
#[must_use]
pub fn soc_from_capacity(remain_cap: i32, fcc: i32) -> i32 {
    let scaled = (i64::from(remain_cap) + i64::from(fcc / 200)) * i64::from(PERCENT_SCALE);
    saturate_i32(scaled / i64::from(nonzero(fcc)))
}

/// Clamps a SOC value into the reportable `0..=100` range.
#[must_use]
pub const fn clamp_percent(value: i32) -> i32 {
    if value < 0 {
        0
    } else if value > PERCENT_SCALE {
        PERCENT_SCALE
    } else {
        value
    }
}
