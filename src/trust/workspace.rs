//! Outer fit loop around the trust region driver.
//!
//! [`Workspace`] owns the vectors the driver mutates in place (`x`, `f`,
//! `g`, `J^T J`, `dx`), calls [`TrustRegion::iterate`] until a
//! [`ConvergenceCriteria`] test passes, and reports the result as a
//! [`FitReport`].

use std::fmt;

use log::{debug, info, warn};
use ndarray::{Array1, Array2};

use super::config::Parameters;
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};
use super::driver::TrustRegion;
use crate::error::{MultifitError, Result};
use crate::problem::Problem;
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};

/// Result of a complete fit.
#[derive(Debug, Clone)]
pub struct FitReport {
    /// Parameters at the end of the fit
    pub params: Array1<f64>,

    /// Weighted residuals at `params`
    pub residuals: Array1<f64>,

    /// `||f||^2`
    pub chi_squared: f64,

    /// Number of accepted iterations
    pub iterations: usize,

    /// Number of iterations that ended without an acceptable step
    pub stalled_iterations: usize,

    /// Why the fit stopped
    pub status: ConvergenceStatus,

    /// Name of the subproblem strategy
    pub method: &'static str,
}

impl FitReport {
    /// Returns true if a tolerance test was satisfied.
    pub fn success(&self) -> bool {
        self.status.is_converged()
    }
}

impl fmt::Display for FitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fit Result ({}):", self.method)?;
        writeln!(f, "  Status: {}", self.status.description())?;
        writeln!(f, "  Chi-squared: {:.6e}", self.chi_squared)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        if self.stalled_iterations > 0 {
            writeln!(f, "  Stalled iterations: {}", self.stalled_iterations)?;
        }
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// State of one nonlinear least squares fit.
#[derive(Debug)]
pub struct Workspace {
    driver: TrustRegion,

    /// Current parameters
    x: Array1<f64>,

    /// Weighted residuals at `x`
    f: Array1<f64>,

    /// Gradient `J^T f`
    g: Array1<f64>,

    /// Normal matrix, absent for matrix-free subproblem methods
    jtj: Option<Array2<f64>>,

    /// Last accepted step
    dx: Array1<f64>,

    /// Square roots of the data weights
    sqrt_wts: Option<Array1<f64>>,

    niter: usize,
    initialized: bool,
}

impl Workspace {
    /// Allocates a workspace for `n` residuals and `p` parameters.
    pub fn new(params: &Parameters, n: usize, p: usize) -> Result<Self> {
        let driver = TrustRegion::new(params, n, p)?;
        let jtj = if params.trs.needs_jtj() {
            Some(Array2::zeros((p, p)))
        } else {
            None
        };

        Ok(Self {
            driver,
            x: Array1::zeros(p),
            f: Array1::zeros(n),
            g: Array1::zeros(p),
            jtj,
            dx: Array1::zeros(p),
            sqrt_wts: None,
            niter: 0,
            initialized: false,
        })
    }

    /// Starts a fit at `x0`.
    ///
    /// `weights` are the data weights `W`, typically `1 / sigma^2`.
    pub fn init(
        &mut self,
        problem: &dyn Problem,
        x0: &Array1<f64>,
        weights: Option<&Array1<f64>>,
    ) -> Result<()> {
        if x0.len() != self.x.len() {
            return Err(MultifitError::DimensionMismatch(format!(
                "expected {} parameters, got {}",
                self.x.len(),
                x0.len()
            )));
        }
        if problem.parameter_count() != self.x.len() || problem.residual_count() != self.f.len() {
            return Err(MultifitError::DimensionMismatch(format!(
                "workspace is n = {}, p = {}; problem is n = {}, p = {}",
                self.f.len(),
                self.x.len(),
                problem.residual_count(),
                problem.parameter_count()
            )));
        }

        self.sqrt_wts = match weights {
            Some(w) => {
                if w.len() != self.f.len() {
                    return Err(MultifitError::DimensionMismatch(format!(
                        "expected {} weights, got {}",
                        self.f.len(),
                        w.len()
                    )));
                }
                if w.iter().any(|wi| !(wi.is_finite() && *wi >= 0.0)) {
                    return Err(MultifitError::InvalidInput(
                        "weights must be finite and non-negative".to_string(),
                    ));
                }
                Some(w.mapv(f64::sqrt))
            }
            None => None,
        };

        self.x.assign(x0);
        self.dx.fill(0.0);
        self.niter = 0;
        self.initialized = false;

        self.driver.init(
            self.sqrt_wts.as_ref(),
            problem,
            &self.x,
            &mut self.f,
            &mut self.g,
            self.jtj.as_mut(),
        )?;
        self.initialized = true;
        Ok(())
    }

    /// Performs one outer iteration of the driver.
    pub fn iterate(&mut self, problem: &dyn Problem) -> Result<()> {
        if !self.initialized {
            return Err(MultifitError::InvalidInput(
                "workspace must be initialized before iterating".to_string(),
            ));
        }
        self.driver.iterate(
            self.sqrt_wts.as_ref(),
            problem,
            &mut self.x,
            &mut self.f,
            &mut self.g,
            self.jtj.as_mut(),
            &mut self.dx,
        )?;
        self.niter += 1;
        Ok(())
    }

    /// Iterates until convergence or the iteration limit.
    pub fn solve(
        &mut self,
        problem: &dyn Problem,
        criteria: &ConvergenceCriteria,
    ) -> Result<FitReport> {
        self.solve_with_callback(problem, criteria, |_, _| {})
    }

    /// Iterates until convergence, calling `callback(iteration, self)` after
    /// every accepted iteration.
    ///
    /// A stall on the first iteration is returned as
    /// [`MultifitError::NoProgress`]; later stalls are counted and the loop
    /// continues with the reduced radius.
    pub fn solve_with_callback<F>(
        &mut self,
        problem: &dyn Problem,
        criteria: &ConvergenceCriteria,
        mut callback: F,
    ) -> Result<FitReport>
    where
        F: FnMut(usize, &Workspace),
    {
        let mut phi = 0.5 * self.chi_squared();
        let mut stalled = 0;
        let mut last_stalled = false;
        let mut iter = 0;

        let status = loop {
            if iter >= criteria.max_iterations {
                break if last_stalled {
                    ConvergenceStatus::NoProgress
                } else {
                    ConvergenceStatus::MaxIterationsReached
                };
            }
            iter += 1;

            match self.iterate(problem) {
                Ok(()) => last_stalled = false,
                Err(err) if err.is_no_progress() => {
                    if iter == 1 {
                        warn!("no acceptable step from the starting point");
                        return Err(err);
                    }
                    debug!("iteration {}: {}", iter, err);
                    stalled += 1;
                    last_stalled = true;
                    continue;
                }
                Err(err) => return Err(err),
            }

            callback(iter, self);

            let phi_prev = phi;
            phi = 0.5 * self.chi_squared();
            debug!(
                "iteration {}: cost = {:.6e}, delta = {:.6e}, mu = {:.6e}",
                iter,
                2.0 * phi,
                self.driver.delta(),
                self.driver.mu()
            );

            let status = criteria.check(&self.x, &self.dx, &self.g, phi, phi_prev, iter);
            if status.is_terminated() {
                break status;
            }
        };

        info!(
            "fit finished after {} iterations: {}",
            self.niter,
            status.description()
        );

        Ok(FitReport {
            params: self.x.clone(),
            residuals: self.f.clone(),
            chi_squared: self.chi_squared(),
            iterations: self.niter,
            stalled_iterations: stalled,
            status,
            method: self.driver.strategy_name(),
        })
    }

    /// Number of accepted iterations since [`init`](Workspace::init).
    pub fn niter(&self) -> usize {
        self.niter
    }

    /// Current parameters.
    pub fn position(&self) -> &Array1<f64> {
        &self.x
    }

    /// Weighted residuals at the current parameters.
    pub fn residual(&self) -> &Array1<f64> {
        &self.f
    }

    /// Gradient `J^T f` at the current parameters.
    pub fn gradient(&self) -> &Array1<f64> {
        &self.g
    }

    /// Last accepted step.
    pub fn step(&self) -> &Array1<f64> {
        &self.dx
    }

    /// Normal matrix, if the subproblem method keeps one.
    pub fn jtj(&self) -> Option<&Array2<f64>> {
        self.jtj.as_ref()
    }

    /// `||f||^2` at the current parameters.
    pub fn chi_squared(&self) -> f64 {
        self.f.dot(&self.f)
    }

    /// Last acceleration to velocity ratio.
    pub fn avratio(&self) -> f64 {
        self.driver.avratio()
    }

    /// The underlying driver.
    pub fn driver(&self) -> &TrustRegion {
        &self.driver
    }

    /// Reciprocal condition number of `J^T J`.
    pub fn rcond(&self) -> Result<f64> {
        let jtj = self.jtj.as_ref().ok_or_else(no_jtj)?;
        self.driver.rcond(jtj)
    }

    /// Covariance of the parameters, `(J^T J)^-1`.
    ///
    /// Multiply by `chi_squared / (n - p)` for unweighted data.
    pub fn covariance(&self) -> Result<Array2<f64>> {
        let jtj = self.jtj.as_ref().ok_or_else(no_jtj)?;
        let cholesky = ndarray_to_nalgebra(jtj)
            .cholesky()
            .ok_or(MultifitError::SingularMatrix)?;
        Ok(nalgebra_to_ndarray(&cholesky.inverse()))
    }
}

fn no_jtj() -> MultifitError {
    MultifitError::InvalidInput("J^T J is not stored for matrix-free subproblem methods".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::config::{SolverMethod, SubproblemMethod};
    use approx::assert_relative_eq;
    use ndarray::array;

    /// model(x) = a x + b at x = 0..4, y = 2 x + 1
    struct Line;

    impl Problem for Line {
        fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_iter(
                (0..5).map(|i| params[0] * i as f64 + params[1] - (2.0 * i as f64 + 1.0)),
            ))
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            5
        }
    }

    #[test]
    fn test_solve_line() {
        let mut ws = Workspace::new(&Parameters::default(), 5, 2).unwrap();
        ws.init(&Line, &array![0.0, 0.0], None).unwrap();

        let mut calls = 0;
        let report = ws
            .solve_with_callback(&Line, &ConvergenceCriteria::default(), |_, _| calls += 1)
            .unwrap();

        assert!(report.success(), "{}", report);
        assert_eq!(calls, report.iterations);
        assert_relative_eq!(report.params[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(report.params[1], 1.0, epsilon = 1e-6);
        assert!(report.chi_squared < 1e-10);

        // J^T J = [[30, 10], [10, 5]], det = 50
        let cov = ws.covariance().unwrap();
        assert_relative_eq!(cov[[0, 0]], 0.1, epsilon = 1e-5);
        assert_relative_eq!(cov[[1, 1]], 0.6, epsilon = 1e-5);
        assert!(ws.rcond().unwrap() > 0.0);
    }

    #[test]
    fn test_matrix_free_has_no_covariance() {
        let params = Parameters::default()
            .with_trs(SubproblemMethod::Cgst)
            .with_solver(SolverMethod::None);
        let mut ws = Workspace::new(&params, 5, 2).unwrap();
        assert!(ws.jtj().is_none());
        ws.init(&Line, &array![0.0, 0.0], None).unwrap();
        assert!(ws.covariance().is_err());
        assert!(ws.rcond().is_err());
    }

    #[test]
    fn test_init_validation() {
        let mut ws = Workspace::new(&Parameters::default(), 5, 2).unwrap();
        assert!(ws.iterate(&Line).is_err());
        assert!(ws.init(&Line, &array![0.0], None).is_err());
        assert!(ws
            .init(&Line, &array![0.0, 0.0], Some(&array![1.0, 1.0, -1.0, 1.0, 1.0]))
            .is_err());
        assert!(ws.init(&Line, &array![0.0, 0.0], Some(&Array1::ones(5))).is_ok());
    }

    #[test]
    fn test_weights_scale_residuals() {
        let mut ws = Workspace::new(&Parameters::default(), 5, 2).unwrap();
        ws.init(&Line, &array![0.0, 0.0], Some(&array![4.0, 4.0, 4.0, 4.0, 4.0]))
            .unwrap();
        // unweighted residual at the origin is -(2 i + 1)
        assert_relative_eq!(ws.residual()[0], -2.0);
        assert_relative_eq!(ws.residual()[4], -18.0);
    }
}
