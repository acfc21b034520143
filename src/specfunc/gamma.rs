//! Gamma function family: `ln Gamma` (real and complex), `Gamma`,
//! factorials and binomial coefficients.
//!
//! `ln Gamma` uses the Lanczos approximation with `g = 7` truncated after the
//! `1 / (z + 8)` term (C. Lanczos, J. SIAM Numer. Anal. Ser. B 1 (1964) 86).
//! The left half of the complex plane is reached through the reflection
//! formula `Gamma(z) Gamma(1 - z) = pi / sin(pi z)`.

use std::f64::consts::{LN_2, PI};

use num_complex::Complex64;

use super::{SfResult, LN_DBL_MAX};
use crate::error::{MultifitError, Result};

/// `ln(sqrt(2 pi))`
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// `ln(pi)`
const LN_PI: f64 = 1.144_729_885_849_400_2;

/// Largest `n` with a finite `n!`.
pub const FACT_MAX: u32 = 170;

const LANCZOS_7: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_13,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

/// `ln Gamma(x)` for `x > 0`.
///
/// Arguments below `1/2` go through `ln Gamma(x + 1) - ln x` so the Lanczos
/// sum is never evaluated near its pole at `x = 0`.
pub fn lngamma(x: f64) -> Result<SfResult> {
    if !(x > 0.0) || !x.is_finite() {
        return Err(MultifitError::Domain(format!(
            "lngamma requires a positive finite argument, got {}",
            x
        )));
    }

    if x < 0.5 {
        let shifted = lngamma(x + 1.0)?;
        let ln_x = x.ln();
        let val = shifted.val - ln_x;
        let err = shifted.err + f64::EPSILON * (ln_x.abs() + val.abs());
        return Ok(SfResult::new(val, err));
    }

    let (lg, scale) = lanczos(Complex64::new(x, 0.0));
    let val = lg.re;
    Ok(SfResult::new(val, lanczos_err(val, scale)))
}

/// `Gamma(x)` for `x > 0`.
pub fn gamma(x: f64) -> Result<SfResult> {
    let lg = lngamma(x)?;
    if lg.val >= LN_DBL_MAX {
        return Err(MultifitError::Overflow(format!("Gamma({}) exceeds f64::MAX", x)));
    }
    let val = lg.val.exp();
    let err = val * (lg.err + 2.0 * f64::EPSILON);
    Ok(SfResult::new(val, err))
}

/// `ln Gamma(n)` for integer `n >= 1`.
pub fn lngamma_int(n: u32) -> Result<SfResult> {
    if n == 0 {
        return Err(MultifitError::Domain("lngamma_int requires n >= 1".to_string()));
    }
    lnfact(n - 1)
}

/// Lanczos approximation of `ln Gamma(z)` for `Re(z) >= 1/2`.
///
/// Also returns the magnitude of the terms that were summed, which sets the
/// rounding error of the result.
fn lanczos(z: Complex64) -> (Complex64, f64) {
    let z = z - 1.0;
    let mut ag = Complex64::new(LANCZOS_7[0], 0.0);
    let mut abs_sum = LANCZOS_7[0].abs();
    for (k, c) in LANCZOS_7[1..].iter().enumerate() {
        let term = *c / (z + (k + 1) as f64);
        ag += term;
        abs_sum += term.norm();
    }

    let power = (z + 0.5) * (z + 7.5).ln();
    let shift = z + 7.5;
    let ln_ag = ag.ln();
    let val = power - shift + LN_SQRT_2PI + ln_ag;
    // cancellation inside the sum shows up as abs_sum / |ag|
    let scale = power.norm() + shift.norm() + ln_ag.norm() + abs_sum / ag.norm();
    (val, scale)
}

/// Truncation error of the 9-term `g = 7` series plus rounding on `scale`.
fn lanczos_err(val: f64, scale: f64) -> f64 {
    1e-15 * (val.abs() + 1.0) + 4.0 * f64::EPSILON * scale
}

/// `ln sin(z)` without overflow for large `|Im z|`.
fn complex_logsin(z: Complex64) -> Result<Complex64> {
    if z.im.abs() > 60.0 {
        // sin(z) ~ -i/2 e^{-iz} for Im z >> 0, conjugate below
        return Ok(if z.im > 0.0 {
            Complex64::new(-LN_2 + z.im, 0.5 * PI - z.re)
        } else {
            Complex64::new(-LN_2 - z.im, z.re - 0.5 * PI)
        });
    }

    let s = z.sin();
    if s.re == 0.0 && s.im == 0.0 {
        return Err(MultifitError::Domain(format!("sin vanishes at {}", z)));
    }
    Ok(s.ln())
}

/// Maps an angle into `(-pi, pi]`.
fn restrict_angle(theta: f64) -> f64 {
    let two_pi = 2.0 * PI;
    let mut r = theta - two_pi * (theta / two_pi).round();
    if r <= -PI {
        r += two_pi;
    } else if r > PI {
        r -= two_pi;
    }
    r
}

/// `ln Gamma(z)` for complex `z = zr + i zi`.
///
/// Returns `(ln |Gamma(z)|, arg Gamma(z))` with the argument in `(-pi, pi]`.
/// The poles at the non-positive integers are domain errors.
pub fn lngamma_complex(zr: f64, zi: f64) -> Result<(SfResult, SfResult)> {
    if !(zr.is_finite() && zi.is_finite()) {
        return Err(MultifitError::Domain(format!(
            "lngamma_complex requires a finite argument, got ({}, {})",
            zr, zi
        )));
    }

    let z = Complex64::new(zr, zi);
    let (lnr, arg, scale) = if zr <= 0.5 {
        if zi == 0.0 && zr == zr.floor() {
            return Err(MultifitError::Domain(format!("Gamma has a pole at {}", zr)));
        }
        let (lg, scale) = lanczos(1.0 - z);
        let pi_z = PI * z;
        let lnsin = complex_logsin(pi_z)?;
        (
            LN_PI - lnsin.re - lg.re,
            -lnsin.im - lg.im,
            scale + lnsin.norm() + pi_z.norm(),
        )
    } else {
        let (lg, scale) = lanczos(z);
        (lg.re, lg.im, scale)
    };

    let lnr_err = lanczos_err(lnr, scale);
    let arg_err = lanczos_err(arg, scale);
    let arg = restrict_angle(arg);
    Ok((SfResult::new(lnr, lnr_err), SfResult::new(arg, arg_err)))
}

/// `n!` for `n <= 170`.
pub fn fact(n: u32) -> Result<SfResult> {
    if n > FACT_MAX {
        return Err(MultifitError::Overflow(format!("{}! exceeds f64::MAX", n)));
    }
    let val = (2..=n).fold(1.0, |acc, k| acc * k as f64);
    // exact while the product fits in the mantissa
    let err = if n <= 20 {
        0.0
    } else {
        n as f64 * f64::EPSILON * val
    };
    Ok(SfResult::new(val, err))
}

/// `ln n!`
pub fn lnfact(n: u32) -> Result<SfResult> {
    if n <= FACT_MAX {
        let f = fact(n)?;
        let val = f.val.ln();
        let err = 2.0 * f64::EPSILON * val.abs() + f.err / f.val;
        Ok(SfResult::new(val, err))
    } else {
        lngamma(n as f64 + 1.0)
    }
}

/// `ln (n choose m)` for `m <= n`.
pub fn lnchoose(n: u32, m: u32) -> Result<SfResult> {
    if m > n {
        return Err(MultifitError::Domain(format!(
            "choose requires m <= n, got n = {}, m = {}",
            n, m
        )));
    }
    if m == 0 || m == n {
        return Ok(SfResult::new(0.0, 0.0));
    }

    let m = m.min(n - m);
    let nf = lnfact(n)?;
    let mf = lnfact(m)?;
    let nmmf = lnfact(n - m)?;
    let val = nf.val - mf.val - nmmf.val;
    let err = nf.err + mf.err + nmmf.err + 2.0 * f64::EPSILON * val.abs();
    Ok(SfResult::new(val, err))
}

/// Binomial coefficient `n choose m` for `m <= n`.
pub fn choose(n: u32, m: u32) -> Result<SfResult> {
    let ln = lnchoose(n, m)?;
    if ln.val >= LN_DBL_MAX {
        return Err(MultifitError::Overflow(format!(
            "{} choose {} exceeds f64::MAX",
            n, m
        )));
    }

    let m = m.min(n - m);
    // running product stays integral: prod_{k=1}^{m} (n - m + k) / k
    let val = (1..=m).fold(1.0, |acc, k| acc * (n - m + k) as f64 / k as f64);
    let err = 2.0 * f64::EPSILON * m as f64 * val.abs();
    Ok(SfResult::new(val, err))
}
