//! Stopping criteria for the outer fit loop.
//!
//! The driver itself never decides when a fit is done; [`Workspace`]
//! evaluates these tests after every accepted iteration.
//!
//! [`Workspace`]: super::workspace::Workspace

use ndarray::Array1;

use crate::utils::norms::scaled_infnorm;

/// Possible states of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// The fit is still running.
    Running,

    /// Every step component is below `xtol^2 + xtol |x_i|`.
    SmallStep,

    /// The scaled gradient is below `gtol max(phi, 1)`.
    SmallGradient,

    /// The cost changed by less than `ftol max(phi, 1)`.
    SmallCostChange,

    /// The iteration limit was reached.
    MaxIterationsReached,

    /// The driver could not find an acceptable step.
    NoProgress,
}

impl ConvergenceStatus {
    /// Returns true if the fit has stopped, converged or not.
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Returns true if one of the tolerance tests was satisfied.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::SmallStep
                | ConvergenceStatus::SmallGradient
                | ConvergenceStatus::SmallCostChange
        )
    }

    /// Returns a description of the status.
    pub fn description(&self) -> &'static str {
        match self {
            ConvergenceStatus::Running => "Fit is still running",
            ConvergenceStatus::SmallStep => "Converged: small step size",
            ConvergenceStatus::SmallGradient => "Converged: small gradient",
            ConvergenceStatus::SmallCostChange => "Converged: small change in cost",
            ConvergenceStatus::MaxIterationsReached => "Terminated: maximum iterations reached",
            ConvergenceStatus::NoProgress => "Terminated: no acceptable step found",
        }
    }
}

/// Tolerances of the outer fit loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceCriteria {
    /// Tolerance on the step size.
    pub xtol: f64,

    /// Tolerance on the scaled gradient.
    pub gtol: f64,

    /// Tolerance on the change in cost.
    pub ftol: f64,

    /// Maximum number of outer iterations.
    pub max_iterations: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            xtol: 1e-8,
            gtol: 1e-8,
            ftol: 1e-8,
            max_iterations: 100,
        }
    }
}

impl ConvergenceCriteria {
    /// Creates a new set of criteria.
    pub fn new(xtol: f64, gtol: f64, ftol: f64, max_iterations: usize) -> Self {
        Self {
            xtol,
            gtol,
            ftol,
            max_iterations,
        }
    }

    /// Tests the state after an accepted step.
    ///
    /// `phi` is `||f||^2 / 2` at `x`, `phi_prev` the same before the step.
    pub fn check(
        &self,
        x: &Array1<f64>,
        dx: &Array1<f64>,
        g: &Array1<f64>,
        phi: f64,
        phi_prev: f64,
        iterations: usize,
    ) -> ConvergenceStatus {
        if small_step(x, dx, self.xtol) {
            return ConvergenceStatus::SmallStep;
        }

        if scaled_infnorm(x, g) <= self.gtol * phi.max(1.0) {
            return ConvergenceStatus::SmallGradient;
        }

        if (phi_prev - phi).abs() <= self.ftol * phi.max(1.0) {
            return ConvergenceStatus::SmallCostChange;
        }

        if iterations >= self.max_iterations {
            return ConvergenceStatus::MaxIterationsReached;
        }

        ConvergenceStatus::Running
    }
}

fn small_step(x: &Array1<f64>, dx: &Array1<f64>, xtol: f64) -> bool {
    x.iter()
        .zip(dx.iter())
        .all(|(xi, dxi)| dxi.abs() < xtol * (xtol + xi.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_status_flags() {
        assert!(!ConvergenceStatus::Running.is_terminated());
        assert!(ConvergenceStatus::SmallStep.is_converged());
        assert!(ConvergenceStatus::NoProgress.is_terminated());
        assert!(!ConvergenceStatus::NoProgress.is_converged());
        assert!(!ConvergenceStatus::MaxIterationsReached.is_converged());
    }

    #[test]
    fn test_check_order() {
        let criteria = ConvergenceCriteria::new(1e-6, 1e-6, 1e-6, 10);
        let x = array![1.0, 100.0];

        // tolerance is 1e-12 + 1e-6 |x_i|
        let status = criteria.check(&x, &array![5e-7, 5e-5], &array![1.0, 1.0], 1.0, 2.0, 1);
        assert_eq!(status, ConvergenceStatus::SmallStep);

        let status = criteria.check(&x, &array![1.0, 1.0], &array![1e-9, 1e-9], 1.0, 2.0, 1);
        assert_eq!(status, ConvergenceStatus::SmallGradient);

        let status = criteria.check(&x, &array![1.0, 1.0], &array![1.0, 1.0], 2.0, 2.0, 1);
        assert_eq!(status, ConvergenceStatus::SmallCostChange);

        let status = criteria.check(&x, &array![1.0, 1.0], &array![1.0, 1.0], 1.0, 2.0, 10);
        assert_eq!(status, ConvergenceStatus::MaxIterationsReached);

        let status = criteria.check(&x, &array![1.0, 1.0], &array![1.0, 1.0], 1.0, 2.0, 3);
        assert_eq!(status, ConvergenceStatus::Running);
    }
}
