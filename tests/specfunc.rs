//! Integration tests for the special functions through their identities.

use std::f64::consts::PI;

use approx::assert_relative_eq;
use multifit_rs::specfunc::{
    bessel_knu, bessel_knu_scaled, bessel_ln_knu, choose, fact, gamma, lnchoose, lnfact, lngamma,
    lngamma_complex, lngamma_int,
};
use multifit_rs::MultifitError;

#[test]
fn test_gamma_recurrence() {
    for x in [0.1, 0.7, 1.3, 4.2, 17.5, 60.0] {
        let g = gamma(x).unwrap().val;
        let g1 = gamma(x + 1.0).unwrap().val;
        assert_relative_eq!(g1, x * g, max_relative = 1e-12);
    }
}

#[test]
fn test_gamma_overflow() {
    assert!(gamma(171.0).is_ok());
    assert!(matches!(gamma(172.0), Err(MultifitError::Overflow(_))));
    // ln Gamma keeps working past the overflow point
    assert!(lngamma(1000.0).unwrap().val > 5000.0);
}

#[test]
fn test_factorials_agree_with_lngamma() {
    for n in [1u32, 5, 20, 50, 170] {
        let lf = lnfact(n).unwrap();
        let lg = lngamma(n as f64 + 1.0).unwrap();
        assert_relative_eq!(lf.val, lg.val, max_relative = 1e-12, epsilon = 1e-13);
        assert_relative_eq!(lngamma_int(n + 1).unwrap().val, lf.val);
    }
    assert_eq!(fact(10).unwrap().val, 3_628_800.0);
    assert!(fact(171).is_err());
    assert_relative_eq!(lnfact(200).unwrap().val, lngamma(201.0).unwrap().val);
}

#[test]
fn test_binomial_coefficients() {
    assert_eq!(choose(10, 3).unwrap().val, 120.0);
    assert_eq!(choose(10, 7).unwrap().val, 120.0);
    assert_eq!(choose(52, 5).unwrap().val, 2_598_960.0);
    assert_eq!(choose(7, 0).unwrap().val, 1.0);
    assert_eq!(choose(7, 7).unwrap().val, 1.0);

    // Pascal's rule
    for m in 1..30 {
        let lhs = choose(30, m).unwrap().val;
        let rhs = choose(29, m - 1).unwrap().val + choose(29, m).unwrap().val;
        assert_relative_eq!(lhs, rhs, max_relative = 1e-14);
    }

    assert_relative_eq!(
        lnchoose(1000, 500).unwrap().val,
        689.467_261_567_851,
        max_relative = 1e-12
    );
    assert!(matches!(choose(3, 4), Err(MultifitError::Domain(_))));
    assert!(matches!(choose(2000, 1000), Err(MultifitError::Overflow(_))));
}

#[test]
fn test_lngamma_error_estimate_bounds_the_error() {
    // 30-digit references
    let real = [
        (1e-8, 18.420_680_738_180_208_905),
        (0.3, 1.095_797_994_818_075_521_7),
        (1.5, -0.120_782_237_635_245_222_35),
        (2.5, 0.284_682_870_472_919_159_63),
        (10.0, 12.801_827_480_081_469_611),
        (171.5, 709.143_163_030_928_242_27),
    ];
    for (x, expected) in real {
        let r = lngamma(x).unwrap();
        assert!(
            (r.val - expected).abs() <= r.err,
            "lngamma({}): |{} - {}| > {}",
            x,
            r.val,
            expected,
            r.err
        );
        assert!(r.err < 1e-12 * (expected.abs() + 1.0));
    }

    let complex = [
        ((10.0, -20.0), (-1.702_980_443_956_511_060_3, -2.395_177_968_148_027_666_3)),
        ((-2.5, 3.0), (-7.478_236_042_050_314_970_4, 0.557_081_035_269_199_634_68)),
        ((0.5, 100.0), (-156.160_694_146_284_989_18, 2.375_872_758_670_006_731_9)),
        ((-10.5, 0.3), (-15.533_870_630_497_043_015, -2.422_083_809_357_464_824_3)),
    ];
    for ((zr, zi), (lnr_expected, arg_expected)) in complex {
        let (lnr, arg) = lngamma_complex(zr, zi).unwrap();
        assert!(
            (lnr.val - lnr_expected).abs() <= lnr.err,
            "ln|Gamma({}, {})|: |{} - {}| > {}",
            zr,
            zi,
            lnr.val,
            lnr_expected,
            lnr.err
        );
        assert!(
            (arg.val - arg_expected).abs() <= arg.err,
            "arg Gamma({}, {}): |{} - {}| > {}",
            zr,
            zi,
            arg.val,
            arg_expected,
            arg.err
        );
    }
}

#[test]
fn test_complex_lngamma_on_real_axis() {
    for x in [0.3, 1.0, 2.5, 10.0] {
        let (lnr, arg) = lngamma_complex(x, 0.0).unwrap();
        assert_relative_eq!(lnr.val, lngamma(x).unwrap().val, epsilon = 1e-12);
        assert_relative_eq!(arg.val, 0.0, epsilon = 1e-12);
    }

    // Gamma(-0.5) = -2 sqrt(pi)
    let (lnr, arg) = lngamma_complex(-0.5, 0.0).unwrap();
    assert_relative_eq!(lnr.val, (2.0 * PI.sqrt()).ln(), max_relative = 1e-12);
    assert_relative_eq!(arg.val.abs(), PI, max_relative = 1e-12);
}

#[test]
fn test_complex_lngamma_reflection() {
    // |Gamma(1/2 + iy)|^2 = pi / cosh(pi y)
    for y in [0.5, 2.0, 10.0, 80.0] {
        let (lnr, _) = lngamma_complex(0.5, y).unwrap();
        let expected = 0.5 * (PI.ln() - (PI * y).cosh().ln());
        assert_relative_eq!(lnr.val, expected, max_relative = 1e-10);
    }

    // conjugate symmetry
    let (lnr_up, arg_up) = lngamma_complex(-1.3, 2.1).unwrap();
    let (lnr_dn, arg_dn) = lngamma_complex(-1.3, -2.1).unwrap();
    assert_relative_eq!(lnr_up.val, lnr_dn.val, max_relative = 1e-13);
    assert_relative_eq!(arg_up.val, -arg_dn.val, max_relative = 1e-12);

    for pole in [0.0, -1.0, -7.0] {
        assert!(matches!(
            lngamma_complex(pole, 0.0),
            Err(MultifitError::Domain(_))
        ));
    }
}

#[test]
fn test_bessel_k_recurrence() {
    // K_{nu+1}(x) = K_{nu-1}(x) + (2 nu / x) K_nu(x)
    for x in [0.3, 1.5, 2.5, 8.0, 30.0] {
        for nu in [1.0, 1.25, 2.7, 6.5] {
            let km = bessel_knu(nu - 1.0, x).unwrap().val;
            let k = bessel_knu(nu, x).unwrap().val;
            let kp = bessel_knu(nu + 1.0, x).unwrap().val;
            assert_relative_eq!(kp, km + 2.0 * nu / x * k, max_relative = 1e-12);
        }
    }
}

#[test]
fn test_bessel_k_is_continuous_across_methods() {
    // small and large x use different expansions
    for nu in [0.0, 0.3, 1.7] {
        let below = bessel_knu_scaled(nu, 2.0 - 1e-9).unwrap().val;
        let above = bessel_knu_scaled(nu, 2.0).unwrap().val;
        assert_relative_eq!(below, above, max_relative = 1e-8);
    }
}

#[test]
fn test_bessel_k_large_argument() {
    // e^x K_nu(x) ~ sqrt(pi / 2x) (1 + (4 nu^2 - 1) / 8x)
    let x = 500.0;
    let nu: f64 = 1.0;
    let scaled = bessel_knu_scaled(nu, x).unwrap().val;
    let mu = 4.0 * nu * nu;
    let asymptotic = (PI / (2.0 * x)).sqrt()
        * (1.0 + (mu - 1.0) / (8.0 * x) + (mu - 1.0) * (mu - 9.0) / (2.0 * (8.0 * x).powi(2)));
    assert_relative_eq!(scaled, asymptotic, max_relative = 1e-8);

    // K itself underflows long before the scaled form does
    assert_eq!(bessel_knu(nu, 1000.0).unwrap().val, 0.0);
    assert!(bessel_knu_scaled(nu, 1000.0).unwrap().val > 0.0);
}

#[test]
fn test_ln_bessel_k_matches_log() {
    for (nu, x) in [(0.0, 0.5), (0.5, 3.0), (2.2, 1.0), (10.0, 20.0)] {
        let k = bessel_knu(nu, x).unwrap().val;
        let ln_k = bessel_ln_knu(nu, x).unwrap();
        assert_relative_eq!(ln_k.val, k.ln(), max_relative = 1e-12, epsilon = 1e-13);
        assert!(ln_k.err >= 0.0);
    }

    // K_nu(1e-4) for nu = 200 is far beyond f64::MAX
    let ln_k = bessel_ln_knu(200.0, 1e-4).unwrap();
    assert!(ln_k.val > 1000.0 && ln_k.val.is_finite());
}
