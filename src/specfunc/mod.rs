//! Special functions with error estimates.
//!
//! Every function returns an [`SfResult`] holding the value and an estimate
//! of its absolute error. Arguments outside the domain of a function give
//! [`MultifitError::Domain`](crate::error::MultifitError::Domain) and results
//! that do not fit in an `f64` give
//! [`MultifitError::Overflow`](crate::error::MultifitError::Overflow).

use std::fmt;

pub mod bessel;
pub mod gamma;

pub use bessel::{bessel_knu, bessel_knu_scaled, bessel_ln_knu};
pub use gamma::{choose, fact, gamma, lnchoose, lnfact, lngamma, lngamma_complex, lngamma_int};

/// A function value with its absolute error estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SfResult {
    /// Value
    pub val: f64,

    /// Absolute error estimate
    pub err: f64,
}

impl SfResult {
    /// Creates a result.
    pub fn new(val: f64, err: f64) -> Self {
        Self { val, err }
    }
}

impl fmt::Display for SfResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.16e} +/- {:.3e}", self.val, self.err)
    }
}

/// `ln(f64::MAX)`
pub(crate) const LN_DBL_MAX: f64 = 7.0978271289338397e+02;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let r = SfResult::new(1.5, 1e-16);
        assert!(format!("{}", r).starts_with("1.5"));
        assert!((LN_DBL_MAX - f64::MAX.ln()).abs() < 1e-12);
    }
}
