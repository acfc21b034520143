//! Trust region subproblem strategies.
//!
//! A strategy proposes a step `dx` for the current radius and estimates the
//! reduction its local model predicts for that step. The driver owns one
//! strategy workspace per fit and talks to it only through
//! [`TrustRegionSubproblem`].

use std::fmt;

use ndarray::{Array1, Array2};

use super::config::{Parameters, SubproblemMethod};
use super::solver::LinearSolver;
use crate::error::{MultifitError, Result};
use crate::evaluation::{eval_jtu, eval_jv};
use crate::problem::Problem;
use crate::utils::norms::enorm;

pub mod cgst;
pub mod dogleg;
pub mod lm;

pub use cgst::SteihaugCg;
pub use dogleg::Dogleg;
pub use lm::LevenbergMarquardtStep;

/// Read-only snapshot of the fit handed to every strategy call.
///
/// `mu` is copied in when the view is built, so a strategy always sees the
/// damping value in effect for the current attempt.
#[derive(Clone, Copy)]
pub struct TrustView<'a> {
    /// Current parameters
    pub x: &'a Array1<f64>,

    /// Weighted residuals at `x`
    pub f: &'a Array1<f64>,

    /// Gradient `J^T f`
    pub g: &'a Array1<f64>,

    /// Normal matrix `J^T J`, absent for matrix-free fits
    pub jtj: Option<&'a Array2<f64>>,

    /// Scaling diagonal `D`
    pub diag: &'a Array1<f64>,

    /// Square roots of the data weights
    pub sqrt_wts: Option<&'a Array1<f64>>,

    /// Current damping value
    pub mu: f64,

    /// Driver configuration
    pub params: &'a Parameters,

    /// Residual and Jacobian callbacks
    pub problem: &'a dyn Problem,
}

impl<'a> TrustView<'a> {
    /// The normal matrix, or an error naming the strategy that needs it.
    pub fn require_jtj(&self, strategy: &str) -> Result<&'a Array2<f64>> {
        self.jtj.ok_or_else(|| {
            MultifitError::InvalidInput(format!("{} requires the J^T J matrix", strategy))
        })
    }

    /// `J^T J w`, from the stored matrix or from Jacobian products.
    pub fn jtj_times(&self, w: &Array1<f64>) -> Result<Array1<f64>> {
        if let Some(jtj) = self.jtj {
            return Ok(jtj.dot(w));
        }
        let jw = eval_jv(
            self.problem,
            self.x,
            w,
            self.f,
            self.sqrt_wts,
            self.params.h_df,
        )?;
        let mut workn = Array1::zeros(self.f.len());
        eval_jtu(
            self.problem,
            self.x,
            self.f,
            &jw,
            self.sqrt_wts,
            self.params.h_df,
            self.params.fdtype,
            &mut workn,
        )
    }

    /// `||J w||^2`.
    pub fn jacobian_norm2(&self, w: &Array1<f64>) -> Result<f64> {
        match self.jtj {
            Some(jtj) => Ok(w.dot(&jtj.dot(w))),
            None => {
                let jw = eval_jv(
                    self.problem,
                    self.x,
                    w,
                    self.f,
                    self.sqrt_wts,
                    self.params.h_df,
                )?;
                Ok(jw.dot(&jw))
            }
        }
    }

    /// Reduction predicted by the Gauss-Newton model
    /// `m(dx) = ||f + J dx||^2`, relative to `||f||^2`:
    /// `(-2 g^T dx - ||J dx||^2) / ||f||^2`.
    pub fn quadratic_preduction(&self, dx: &Array1<f64>) -> Result<f64> {
        let normf = enorm(self.f);
        if normf == 0.0 {
            return Err(MultifitError::StepFailure(
                "zero residual, predicted reduction undefined".to_string(),
            ));
        }
        let jdx2 = self.jacobian_norm2(dx)?;
        Ok((-2.0 * self.g.dot(dx) - jdx2) / (normf * normf))
    }
}

/// Capability set of a trust region subproblem strategy.
///
/// Construction plays the role of `alloc` and dropping the box releases the
/// workspace. Any error from [`step`](TrustRegionSubproblem::step) or
/// [`preduction`](TrustRegionSubproblem::preduction) is treated by the driver
/// as a rejected step, not as a failure of the iteration.
pub trait TrustRegionSubproblem: fmt::Debug {
    /// Name of the strategy.
    fn name(&self) -> &'static str;

    /// Called once when the fit is initialized.
    fn init(
        &mut self,
        view: &TrustView<'_>,
        solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<()>;

    /// Called at the start of every outer iteration, before any step is proposed.
    fn preloop(
        &mut self,
        view: &TrustView<'_>,
        solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<()>;

    /// Propose a step for radius `delta` into `dx`.
    ///
    /// Acceleration-aware strategies report `|a| / |v|` through `avratio`.
    fn step(
        &mut self,
        view: &TrustView<'_>,
        delta: f64,
        solver: &mut Option<Box<dyn LinearSolver>>,
        dx: &mut Array1<f64>,
        avratio: &mut f64,
    ) -> Result<()>;

    /// Reduction of the normalized cost predicted by the strategy's model for `dx`.
    fn preduction(
        &mut self,
        view: &TrustView<'_>,
        dx: &Array1<f64>,
        solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<f64>;

    /// Extra rejection predicate checked before the reduction ratio.
    fn reject_step(&self, _avratio: f64, _params: &Parameters) -> bool {
        false
    }
}

/// The solver workspace, or an error naming the strategy that needs it.
pub(crate) fn require_solver<'s>(
    solver: &'s mut Option<Box<dyn LinearSolver>>,
    strategy: &str,
) -> Result<&'s mut Box<dyn LinearSolver>> {
    solver.as_mut().ok_or_else(|| {
        MultifitError::InvalidInput(format!("{} requires a linear solver", strategy))
    })
}

impl SubproblemMethod {
    /// Allocates the strategy workspace for `n` residuals and `p` parameters.
    pub fn alloc(
        &self,
        params: &Parameters,
        n: usize,
        p: usize,
    ) -> Result<Box<dyn TrustRegionSubproblem>> {
        if p == 0 || n == 0 {
            return Err(MultifitError::Allocation(format!(
                "cannot allocate a {:?} workspace for n = {}, p = {}",
                self, n, p
            )));
        }
        Ok(match self {
            SubproblemMethod::Lm => Box::new(LevenbergMarquardtStep::new(params, n, p, false)),
            SubproblemMethod::LmAccel => Box::new(LevenbergMarquardtStep::new(params, n, p, true)),
            SubproblemMethod::Dogleg => Box::new(Dogleg::new(n, p)),
            SubproblemMethod::Cgst => Box::new(SteihaugCg::new(n, p)),
        })
    }
}
