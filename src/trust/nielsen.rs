//! Nielsen's strategy for the Levenberg-Marquardt damping parameter.
//!
//! The damping value `mu` shrinks smoothly with the quality of accepted steps
//! and grows geometrically (`mu *= nu`, `nu *= 2`) over consecutive
//! rejections. See H. B. Nielsen, "Damping Parameter in Marquardt's Method",
//! IMM-REP-1999-05.

use ndarray::{Array1, Array2};

/// Scale applied to the largest scaled diagonal entry of `J^T J`.
pub const MU0: f64 = 1.0e-3;

const ONE_THIRD: f64 = 1.0 / 3.0;

/// Initial `(mu, nu)`: `mu = mu0 * max_j JTJ_jj / D_j^2`, `nu = 2`.
///
/// Without a normal matrix, or when every scaled diagonal entry is zero,
/// `mu = mu0` so the damping value stays positive.
pub fn init(jtj: Option<&Array2<f64>>, diag: &Array1<f64>) -> (f64, i64) {
    let max = jtj
        .map(|jtj| {
            diag.iter()
                .enumerate()
                .map(|(j, dj)| jtj[[j, j]] / (dj * dj))
                .fold(0.0, f64::max)
        })
        .unwrap_or(0.0);

    let mu = if max > 0.0 && max.is_finite() {
        MU0 * max
    } else {
        MU0
    };
    (mu, 2)
}

/// Step accepted with ratio `rho`: `mu *= max(1/3, 1 - (2 rho - 1)^3)`, `nu = 2`.
pub fn accept(rho: f64, mu: &mut f64, nu: &mut i64) {
    *nu = 2;
    let b = 2.0 * rho - 1.0;
    let b = 1.0 - b * b * b;
    *mu *= ONE_THIRD.max(b);
}

/// Step rejected: `mu *= nu`, `nu *= 2`.
pub fn reject(mu: &mut f64, nu: &mut i64) {
    *mu *= *nu as f64;
    *nu = nu.saturating_mul(2);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_init_uses_scaled_diagonal() {
        let jtj = array![[4.0, 1.0], [1.0, 9.0]];
        let (mu, nu) = init(Some(&jtj), &array![2.0, 1.0]);
        assert_relative_eq!(mu, MU0 * 9.0);
        assert_eq!(nu, 2);

        let (mu, _) = init(None, &array![1.0, 1.0]);
        assert_relative_eq!(mu, MU0);

        let (mu, _) = init(Some(&Array2::zeros((2, 2))), &array![1.0, 1.0]);
        assert!(mu > 0.0);
    }

    #[test]
    fn test_accept_and_reject() {
        let mut mu = 1.0;
        let mut nu = 2;

        reject(&mut mu, &mut nu);
        reject(&mut mu, &mut nu);
        assert_relative_eq!(mu, 8.0);
        assert_eq!(nu, 8);

        // rho = 1/2 gives b = 1, mu unchanged
        accept(0.5, &mut mu, &mut nu);
        assert_relative_eq!(mu, 8.0);
        assert_eq!(nu, 2);

        // a perfect step shrinks by three at most
        accept(1.0, &mut mu, &mut nu);
        assert_relative_eq!(mu, 8.0 / 3.0);

        // barely accepted step nearly doubles mu
        let mut mu = 1.0;
        accept(1e-12, &mut mu, &mut nu);
        assert_relative_eq!(mu, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reject_saturates() {
        let mut mu = 1.0;
        let mut nu = i64::MAX / 2 + 1;
        reject(&mut mu, &mut nu);
        assert_eq!(nu, i64::MAX);
        assert!(mu > 0.0);
    }
}
