//! Residual and Jacobian evaluation.
//!
//! The driver never calls a [`Problem`] directly; it goes through these
//! functions, which apply the data weights, pick between analytic and finite
//! difference derivatives, and reject malformed callback output. Outputs are
//! written into caller-owned buffers so a fit loop does not reallocate.

use ndarray::{Array1, Array2};

use crate::error::{MultifitError, Result};
use crate::problem::Problem;
use crate::trust::config::FdType;
use crate::utils::finite_difference;

fn check_finite(what: &str, values: impl IntoIterator<Item = f64>) -> Result<()> {
    if values.into_iter().all(f64::is_finite) {
        Ok(())
    } else {
        Err(MultifitError::FunctionEvaluation(format!(
            "{} contains non-finite values",
            what
        )))
    }
}

fn check_len(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(MultifitError::FunctionEvaluation(format!(
            "{} has length {}, expected {}",
            what, actual, expected
        )))
    }
}

/// Evaluate the weighted residual `f = sqrt(W) (model(x) - y)` into `f`.
pub fn eval_f(
    problem: &dyn Problem,
    x: &Array1<f64>,
    sqrt_wts: Option<&Array1<f64>>,
    f: &mut Array1<f64>,
) -> Result<()> {
    let residuals = problem.eval(x)?;
    check_len("residual vector", f.len(), residuals.len())?;
    check_finite("residual vector", residuals.iter().copied())?;

    match sqrt_wts {
        Some(sw) => f.assign(&(&residuals * sw)),
        None => f.assign(&residuals),
    }
    Ok(())
}

/// Weighted Jacobian `sqrt(W) J` from the analytic Jacobian or finite differences.
pub fn eval_jacobian(
    problem: &dyn Problem,
    x: &Array1<f64>,
    f: &Array1<f64>,
    sqrt_wts: Option<&Array1<f64>>,
    h_df: f64,
    fdtype: FdType,
    workn: &mut Array1<f64>,
) -> Result<Array2<f64>> {
    let n = f.len();
    let p = x.len();

    if !problem.has_custom_jacobian() {
        return finite_difference::jacobian(problem, x, f, sqrt_wts, h_df, fdtype, workn);
    }

    let mut jac = problem.jacobian(x)?;
    if jac.dim() != (n, p) {
        return Err(MultifitError::FunctionEvaluation(format!(
            "Jacobian has shape {:?}, expected ({}, {})",
            jac.dim(),
            n,
            p
        )));
    }
    check_finite("Jacobian", jac.iter().copied())?;

    if let Some(sw) = sqrt_wts {
        for (mut row, w) in jac.rows_mut().into_iter().zip(sw.iter()) {
            row *= *w;
        }
    }
    Ok(jac)
}

/// Evaluate `g = J^T f` and, when `jtj` is given, `J^T J` at `x`.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `x` - Current parameters
/// * `f` - Weighted residuals at `x`
/// * `sqrt_wts` - Square roots of the data weights, if any
/// * `h_df` - Finite difference step
/// * `fdtype` - Finite difference scheme
/// * `g` - (output) gradient, length `p`
/// * `jtj` - (output) normal matrix, `p x p`
/// * `workn` - Scratch vector of length `n`
#[allow(clippy::too_many_arguments)]
pub fn eval_df(
    problem: &dyn Problem,
    x: &Array1<f64>,
    f: &Array1<f64>,
    sqrt_wts: Option<&Array1<f64>>,
    h_df: f64,
    fdtype: FdType,
    g: &mut Array1<f64>,
    jtj: Option<&mut Array2<f64>>,
    workn: &mut Array1<f64>,
) -> Result<()> {
    let p = x.len();

    if problem.has_normal_equations() {
        let (g_new, jtj_new) = problem.normal_equations(x, sqrt_wts, f)?;
        check_len("gradient", p, g_new.len())?;
        if jtj_new.dim() != (p, p) {
            return Err(MultifitError::FunctionEvaluation(format!(
                "J^T J has shape {:?}, expected ({}, {})",
                jtj_new.dim(),
                p,
                p
            )));
        }
        check_finite("gradient", g_new.iter().copied())?;
        check_finite("J^T J", jtj_new.iter().copied())?;

        g.assign(&g_new);
        if let Some(jtj) = jtj {
            jtj.assign(&jtj_new);
        }
        return Ok(());
    }

    let jac = eval_jacobian(problem, x, f, sqrt_wts, h_df, fdtype, workn)?;
    g.assign(&jac.t().dot(f));
    if let Some(jtj) = jtj {
        jtj.assign(&jac.t().dot(&jac));
    }
    Ok(())
}

/// Weighted `J^T u` at `x`, where `f` is the weighted residual at `x`.
#[allow(clippy::too_many_arguments)]
pub fn eval_jtu(
    problem: &dyn Problem,
    x: &Array1<f64>,
    f: &Array1<f64>,
    u: &Array1<f64>,
    sqrt_wts: Option<&Array1<f64>>,
    h_df: f64,
    fdtype: FdType,
    workn: &mut Array1<f64>,
) -> Result<Array1<f64>> {
    if problem.has_normal_equations() {
        let (jtu, _) = problem.normal_equations(x, sqrt_wts, u)?;
        check_len("J^T u", x.len(), jtu.len())?;
        check_finite("J^T u", jtu.iter().copied())?;
        return Ok(jtu);
    }
    let jac = eval_jacobian(problem, x, f, sqrt_wts, h_df, fdtype, workn)?;
    Ok(jac.t().dot(u))
}

/// Weighted `J v`, from the analytic Jacobian when available.
pub fn eval_jv(
    problem: &dyn Problem,
    x: &Array1<f64>,
    v: &Array1<f64>,
    f: &Array1<f64>,
    sqrt_wts: Option<&Array1<f64>>,
    h_df: f64,
) -> Result<Array1<f64>> {
    if problem.has_custom_jacobian() && !problem.has_normal_equations() {
        let mut workn = Array1::zeros(f.len());
        let jac = eval_jacobian(problem, x, f, sqrt_wts, h_df, FdType::Forward, &mut workn)?;
        return Ok(jac.dot(v));
    }
    finite_difference::jacobian_vector(problem, x, v, f, sqrt_wts, h_df)
}

/// Weighted second directional derivative of the residuals along `v`.
pub fn eval_fvv(
    problem: &dyn Problem,
    x: &Array1<f64>,
    v: &Array1<f64>,
    f: &Array1<f64>,
    sqrt_wts: Option<&Array1<f64>>,
    h_fvv: f64,
) -> Result<Array1<f64>> {
    if !problem.has_custom_fvv() {
        return finite_difference::second_directional(problem, x, v, f, sqrt_wts, h_fvv);
    }

    let fvv = problem.fvv(x, v)?;
    check_len("fvv", f.len(), fvv.len())?;
    check_finite("fvv", fvv.iter().copied())?;
    Ok(match sqrt_wts {
        Some(sw) => fvv * sw,
        None => fvv,
    })
}
