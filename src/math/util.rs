/// Pushes a denominator away from zero, keeping its sign.
///
/// Values with magnitude below `eps` are replaced by `eps` (or `-eps` when negative),
/// so a division by the result is always finite.
#[inline(always)]
pub fn guard(den: f64, eps: f64) -> f64 {
    if den.abs() >= eps {
        den
    } else if den < 0.0 {
        -eps
    } else {
        eps
    }
}

/// The Heaviside step function, with `heaviside(0) == 1`.
#[inline(always)]
pub fn heaviside(x: f64) -> f64 {
    if x >= 0.0 {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn guard_keeps_sign() {
        assert_eq!(guard(2.0, 1e-6), 2.0);
        assert_eq!(guard(-2.0, 1e-6), -2.0);
        assert_eq!(guard(0.0, 1e-6), 1e-6);
        assert_eq!(guard(-1e-9, 1e-6), -1e-6);
        assert!((1.0 / guard(0.0, 1e-6)).is_finite());
    }

    #[test]
    fn step_function() {
        assert_eq!(heaviside(0.0), 1.0);
        assert_eq!(heaviside(3.0), 1.0);
        assert_eq!(heaviside(-0.1), 0.0);
    }
}
