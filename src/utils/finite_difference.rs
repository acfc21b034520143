//! Finite difference methods for numerical differentiation.
//!
//! These functions approximate the weighted Jacobian and directional
//! derivatives of a [`Problem`] from residual evaluations only. All of them
//! work on the weighted residual `sqrt(W) (model(x) - y)` as produced by
//! [`eval_f`].

use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::evaluation::eval_f;
use crate::problem::Problem;
use crate::trust::config::FdType;

/// Per-parameter step: `h |x_j|`, or `h` itself when `x_j` is zero.
fn column_step(h: f64, xj: f64) -> f64 {
    let hj = h * xj.abs();
    if hj == 0.0 {
        h
    } else {
        hj
    }
}

/// Compute the weighted Jacobian matrix by finite differences.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `x` - The parameter values at which to evaluate the Jacobian
/// * `f` - The weighted residuals at `x`
/// * `sqrt_wts` - Square roots of the data weights, if any
/// * `h` - The relative step size
/// * `fdtype` - Forward or central differences
/// * `workn` - Scratch vector of length `n`
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The `n x p` Jacobian matrix
pub fn jacobian(
    problem: &dyn Problem,
    x: &Array1<f64>,
    f: &Array1<f64>,
    sqrt_wts: Option<&Array1<f64>>,
    h: f64,
    fdtype: FdType,
    workn: &mut Array1<f64>,
) -> Result<Array2<f64>> {
    let n = f.len();
    let p = x.len();
    let mut jac = Array2::zeros((n, p));
    let mut x_perturbed = x.clone();

    match fdtype {
        FdType::Forward => {
            for j in 0..p {
                let hj = column_step(h, x[j]);
                x_perturbed[j] = x[j] + hj;
                eval_f(problem, &x_perturbed, sqrt_wts, workn)?;
                x_perturbed[j] = x[j];

                let inv = 1.0 / hj;
                for i in 0..n {
                    jac[[i, j]] = (workn[i] - f[i]) * inv;
                }
            }
        }
        FdType::Central => {
            let mut f_minus = Array1::zeros(n);
            for j in 0..p {
                let hj = column_step(h, x[j]);
                x_perturbed[j] = x[j] + 0.5 * hj;
                eval_f(problem, &x_perturbed, sqrt_wts, workn)?;
                x_perturbed[j] = x[j] - 0.5 * hj;
                eval_f(problem, &x_perturbed, sqrt_wts, &mut f_minus)?;
                x_perturbed[j] = x[j];

                let inv = 1.0 / hj;
                for i in 0..n {
                    jac[[i, j]] = (workn[i] - f_minus[i]) * inv;
                }
            }
        }
    }

    Ok(jac)
}

/// Approximate `J v` with a forward directional difference.
///
/// The step is scaled so that `t |v|` is `h (1 + |x|)`.
pub fn jacobian_vector(
    problem: &dyn Problem,
    x: &Array1<f64>,
    v: &Array1<f64>,
    f: &Array1<f64>,
    sqrt_wts: Option<&Array1<f64>>,
    h: f64,
) -> Result<Array1<f64>> {
    let vnorm = v.dot(v).sqrt();
    if vnorm == 0.0 {
        return Ok(Array1::zeros(f.len()));
    }

    let t = h * (1.0 + x.dot(x).sqrt()) / vnorm;
    let x_step = x + &(v * t);
    let mut f_step = Array1::zeros(f.len());
    eval_f(problem, &x_step, sqrt_wts, &mut f_step)?;

    Ok((f_step - f) / t)
}

/// Approximate the second directional derivative `fvv = sum_ij v_i v_j d2f/dx_i dx_j`.
///
/// Uses the symmetric difference `(f(x + h v) - 2 f(x) + f(x - h v)) / h^2`.
pub fn second_directional(
    problem: &dyn Problem,
    x: &Array1<f64>,
    v: &Array1<f64>,
    f: &Array1<f64>,
    sqrt_wts: Option<&Array1<f64>>,
    h: f64,
) -> Result<Array1<f64>> {
    let n = f.len();
    let mut f_plus = Array1::zeros(n);
    let mut f_minus = Array1::zeros(n);

    eval_f(problem, &(x + &(v * h)), sqrt_wts, &mut f_plus)?;
    eval_f(problem, &(x - &(v * h)), sqrt_wts, &mut f_minus)?;

    let inv_h2 = 1.0 / (h * h);
    Ok((f_plus - f * 2.0 + f_minus) * inv_h2)
}
