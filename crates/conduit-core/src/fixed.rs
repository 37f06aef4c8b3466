use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// A quantity of the routed resource. Signed so that negative requests can be
/// detected and rejected instead of wrapping.
pub type Units = i64;

/// Fraction `part / whole` as a Fixed64 in `[0, 1]`.
///
/// Works on the raw bits so large unit counts never overflow the 32 integer
/// bits of the fixed-point type. A non-positive `whole` yields zero.
pub fn ratio(part: Units, whole: Units) -> Fixed64 {
    if whole <= 0 || part <= 0 {
        return Fixed64::ZERO;
    }
    let part = part.min(whole) as i128;
    let bits = (part << 32) / whole as i128;
    Fixed64::from_bits(bits as i64)
}

/// Convert Fixed64 to f64. Use only for display, never in the sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_of_half() {
        assert_eq!(ratio(50, 100), Fixed64::from_num(0.5));
    }

    #[test]
    fn ratio_clamps_to_one() {
        assert_eq!(ratio(150, 100), Fixed64::from_num(1));
    }

    #[test]
    fn ratio_zero_whole_is_zero() {
        assert_eq!(ratio(10, 0), Fixed64::ZERO);
        assert_eq!(ratio(-5, 10), Fixed64::ZERO);
    }

    #[test]
    fn ratio_handles_huge_counts() {
        let whole = 1i64 << 60;
        assert_eq!(ratio(whole, whole), Fixed64::from_num(1));
        assert_eq!(fixed64_to_f64(ratio(whole / 4, whole)), 0.25);
    }
}
