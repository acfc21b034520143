//! Problem definition trait.
//!
//! This module defines the `Problem` trait, which represents a nonlinear
//! least squares problem handed to the trust region driver. Only `eval` is
//! required; derivative information is optional and falls back to finite
//! differences inside the [`evaluation`](crate::evaluation) module.

use crate::error::{MultifitError, Result};
use ndarray::{Array1, Array2};

/// A trait representing a nonlinear least squares problem.
///
/// The trait is object safe so strategies can receive the problem as
/// `&dyn Problem` without knowing the concrete type.
pub trait Problem {
    /// Evaluate the residuals `model(x) - y` at the given parameters.
    ///
    /// Weights are applied by the caller; this function returns the unweighted
    /// residual vector of length [`residual_count`](Problem::residual_count).
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the (unweighted) Jacobian matrix at the given parameters.
    ///
    /// Only called when [`has_custom_jacobian`](Problem::has_custom_jacobian)
    /// returns true.
    fn jacobian(&self, _params: &Array1<f64>) -> Result<Array2<f64>> {
        Err(MultifitError::InvalidInput(
            "problem does not provide an analytic Jacobian".to_string(),
        ))
    }

    /// Check if this problem provides a custom Jacobian implementation.
    fn has_custom_jacobian(&self) -> bool {
        false
    }

    /// Accumulate `g = J^T f` and `J^T J` without materializing `J`.
    ///
    /// `f` is normally the weighted residual vector, but any vector of length
    /// `n` may be passed to form `J^T f`. `sqrt_wts` holds the square roots of
    /// the data weights, which the implementation must apply to the rows of
    /// `J`. Only called when
    /// [`has_normal_equations`](Problem::has_normal_equations) returns true.
    fn normal_equations(
        &self,
        _params: &Array1<f64>,
        _sqrt_wts: Option<&Array1<f64>>,
        _f: &Array1<f64>,
    ) -> Result<(Array1<f64>, Array2<f64>)> {
        Err(MultifitError::InvalidInput(
            "problem does not accumulate normal equations".to_string(),
        ))
    }

    /// Check if this problem accumulates the normal equations itself.
    fn has_normal_equations(&self) -> bool {
        false
    }

    /// Second directional derivative of the residuals along `v`.
    ///
    /// Used by geodesic acceleration. Only called when
    /// [`has_custom_fvv`](Problem::has_custom_fvv) returns true.
    fn fvv(&self, _params: &Array1<f64>, _v: &Array1<f64>) -> Result<Array1<f64>> {
        Err(MultifitError::InvalidInput(
            "problem does not provide second directional derivatives".to_string(),
        ))
    }

    /// Check if this problem provides `fvv`.
    fn has_custom_fvv(&self) -> bool {
        false
    }
}
