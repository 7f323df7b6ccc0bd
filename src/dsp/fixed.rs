use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

const FRAC_BITS: u32 = 16;
const ONE_BITS: i32 = 1 << FRAC_BITS;
const HALF_LSB: i64 = 1 << (FRAC_BITS - 1);

/// Signed Q16.16 fixed-point number.
///
/// All arithmetic saturates at `Fixed::MIN` / `Fixed::MAX` instead of
/// wrapping. Products and conversions round to nearest, ties toward
/// positive infinity (add half an LSB, then arithmetic shift). Conversions
/// from `f32` map NaN to zero.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(ONE_BITS);
    pub const MAX: Fixed = Fixed(i32::MAX);
    pub const MIN: Fixed = Fixed(i32::MIN);

    /// 1/32768, used to map i16 samples onto [-1, 1] without dividing.
    pub const RECIP_32768: Fixed = Fixed(ONE_BITS >> 15);

    pub const fn to_bits(self) -> i32 {
        self.0
    }

    pub fn from_int(value: i32) -> Self {
        Fixed(saturate((value as i64) << FRAC_BITS))
    }

    pub fn from_f32(value: f32) -> Self {
        if value.is_nan() {
            return Fixed::ZERO;
        }
        let scaled = (value as f64 * ONE_BITS as f64).round();
        if scaled >= i32::MAX as f64 {
            Fixed::MAX
        } else if scaled <= i32::MIN as f64 {
            Fixed::MIN
        } else {
            Fixed(scaled as i32)
        }
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / ONE_BITS as f32
    }

    /// Multiply an integer sample by this factor, rounded and saturated to i32.
    #[inline]
    pub fn scale(self, value: i32) -> i32 {
        saturate((value as i64 * self.0 as i64 + HALF_LSB) >> FRAC_BITS)
    }

    #[inline]
    pub fn saturating_mul(self, rhs: Fixed) -> Fixed {
        Fixed(saturate((self.0 as i64 * rhs.0 as i64 + HALF_LSB) >> FRAC_BITS))
    }

    #[inline]
    pub fn saturating_add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_sub(rhs.0))
    }
}

#[inline]
fn saturate(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        self.saturating_add(rhs)
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        self.saturating_sub(rhs)
    }
}

impl Mul for Fixed {
    type Output = Fixed;
    fn mul(self, rhs: Fixed) -> Fixed {
        self.saturating_mul(rhs)
    }
}

impl Neg for Fixed {
    type Output = Fixed;
    fn neg(self) -> Fixed {
        Fixed(self.0.saturating_neg())
    }
}

impl From<f32> for Fixed {
    fn from(value: f32) -> Self {
        Fixed::from_f32(value)
    }
}

impl From<Fixed> for f32 {
    fn from(value: Fixed) -> Self {
        value.to_f32()
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({})", self.to_f32())
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_f32(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn reciprocal_maps_full_scale_to_one() {
        let sample = Fixed::from_int(32767).saturating_mul(Fixed::RECIP_32768);
        assert_relative_eq!(sample.to_f32(), 32767.0 / 32768.0, epsilon = 1e-4);
        let neg = Fixed::from_int(-32768).saturating_mul(Fixed::RECIP_32768);
        assert_eq!(neg, -Fixed::ONE);
    }

    #[test]
    fn scale_rounds_and_saturates() {
        let gain = Fixed::from_f32(0.4);
        assert_eq!(gain.scale(1000), 400);
        assert_eq!(Fixed::from_f32(8.0).scale(i32::MAX), i32::MAX);
        assert_eq!(Fixed::from_f32(8.0).scale(i32::MIN), i32::MIN);
    }

    #[test]
    fn arithmetic_saturates_instead_of_wrapping() {
        assert_eq!(Fixed::MAX + Fixed::ONE, Fixed::MAX);
        assert_eq!(Fixed::MIN - Fixed::ONE, Fixed::MIN);
        assert_eq!(Fixed::from_int(40000), Fixed::MAX);
        assert_eq!(Fixed::from_f32(1.0e9), Fixed::MAX);
        assert_eq!(Fixed::from_f32(f32::NAN), Fixed::ZERO);
    }

    #[test]
    fn float_conversion_is_exact_for_representable_values() {
        for v in [0.0f32, 1.0, -1.0, 0.5, 100.25, -32000.75] {
            assert_eq!(Fixed::from_f32(v).to_f32(), v);
        }
    }
}
