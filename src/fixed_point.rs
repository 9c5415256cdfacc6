//! Signed 17.14 fixed-point arithmetic.
//!
//! The scheduler's MLFQS mode must never touch floating-point hardware, so
//! `load_avg` and `recent_cpu` are carried as [`Fixed`] values: a 32-bit
//! signed integer with the low 14 bits treated as a fraction. Intermediate
//! products and quotients widen to 64 bits before truncating back down so
//! that `mul`/`div` don't lose precision they don't have to.

const FRACTION_BITS: u32 = 14;
const FRACTION: i64 = 1 << FRACTION_BITS;

/// A 17.14 signed fixed-point number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    /// Convert an integer to fixed-point.
    pub const fn from_int(n: i32) -> Self {
        Fixed(n * FRACTION as i32)
    }

    /// Truncate toward zero.
    pub const fn to_int_trunc(self) -> i32 {
        self.0 / FRACTION as i32
    }

    /// Round to the nearest integer (ties away from zero).
    pub const fn to_int_round(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + FRACTION as i32 / 2) / FRACTION as i32
        } else {
            (self.0 - FRACTION as i32 / 2) / FRACTION as i32
        }
    }

    pub const fn add(self, other: Fixed) -> Fixed {
        Fixed(self.0 + other.0)
    }

    pub const fn sub(self, other: Fixed) -> Fixed {
        Fixed(self.0 - other.0)
    }

    pub const fn add_int(self, n: i32) -> Fixed {
        Fixed(self.0 + n * FRACTION as i32)
    }

    pub const fn sub_int(self, n: i32) -> Fixed {
        Fixed(self.0 - n * FRACTION as i32)
    }

    pub fn mul(self, other: Fixed) -> Fixed {
        let product = (self.0 as i64) * (other.0 as i64) / FRACTION;
        Fixed(product as i32)
    }

    pub const fn mul_int(self, n: i32) -> Fixed {
        Fixed(self.0 * n)
    }

    pub fn div(self, other: Fixed) -> Fixed {
        let quotient = (self.0 as i64) * FRACTION / (other.0 as i64);
        Fixed(quotient as i32)
    }

    pub const fn div_int(self, n: i32) -> Fixed {
        Fixed(self.0 / n)
    }

    /// Raw 17.14 bit pattern, for diagnostics.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl core::ops::Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed::add(self, rhs)
    }
}

impl core::ops::Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed::sub(self, rhs)
    }
}

impl core::ops::Mul for Fixed {
    type Output = Fixed;
    fn mul(self, rhs: Fixed) -> Fixed {
        Fixed::mul(self, rhs)
    }
}

impl core::ops::Div for Fixed {
    type Output = Fixed;
    fn div(self, rhs: Fixed) -> Fixed {
        Fixed::div(self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip_truncates() {
        let f = Fixed::from_int(5);
        assert_eq!(f.to_int_trunc(), 5);
        assert_eq!(f.to_int_round(), 5);
    }

    #[test]
    fn rounding_matches_nearest() {
        let half = Fixed(FRACTION as i32 / 2);
        assert_eq!(half.to_int_trunc(), 0);
        assert_eq!(half.to_int_round(), 1);

        let neg_half = Fixed(-(FRACTION as i32) / 2);
        assert_eq!(neg_half.to_int_round(), -1);
    }

    #[test]
    fn add_sub_are_exact() {
        let a = Fixed::from_int(3);
        let b = Fixed::from_int(2);
        assert_eq!((a + b).to_int_trunc(), 5);
        assert_eq!((a - b).to_int_trunc(), 1);
    }

    #[test]
    fn mul_div_widen_through_i64() {
        let a = Fixed::from_int(1000);
        let b = Fixed::from_int(1000);
        // 1000 * 1000 overflows i32 in the raw 17.14 representation's
        // intermediate product; must route through i64.
        let product = a.mul(b);
        assert_eq!(product.to_int_round(), 1_000_000);

        let c = Fixed::from_int(7);
        let d = Fixed::from_int(2);
        let quotient = c.div(d);
        assert_eq!(quotient.to_int_trunc(), 3);
    }

    #[test]
    fn load_avg_formula_shape() {
        // load_avg := (59/60)*load_avg + (1/60)*ready_threads, starting at 0
        // with one ready thread, should converge toward 1 but stay below it.
        let fifty_nine_sixtieths = Fixed::from_int(59).div(Fixed::from_int(60));
        let one_sixtieth = Fixed::from_int(1).div(Fixed::from_int(60));
        let mut load_avg = Fixed::ZERO;
        for _ in 0..60 {
            load_avg = fifty_nine_sixtieths.mul(load_avg) + one_sixtieth.mul(Fixed::from_int(1));
        }
        assert!(load_avg.to_int_trunc() == 0);
        assert!(load_avg.raw() > 0);
    }
}
