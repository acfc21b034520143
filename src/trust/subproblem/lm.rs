//! Levenberg-Marquardt step, optionally with geodesic acceleration.
//!
//! The velocity solves `(J^T J + mu D^T D) v = -g`. With acceleration the
//! second-order correction solves `(J^T J + mu D^T D) a = -J^T fvv` where
//! `fvv` is the second directional derivative of the residuals along `v`,
//! and the step is `v + a / 2` (Transtrum and Sethna, 2012). The radius is
//! not used: the damping value alone controls the step length.

use ndarray::Array1;

use super::{require_solver, TrustRegionSubproblem, TrustView};
use crate::error::{MultifitError, Result};
use crate::evaluation::{eval_fvv, eval_jtu};
use crate::trust::config::Parameters;
use crate::trust::solver::LinearSolver;
use crate::utils::norms::{enorm, scaled_norm};

/// Workspace of the Levenberg-Marquardt strategies.
#[derive(Debug)]
pub struct LevenbergMarquardtStep {
    accel: bool,
    /// Geodesic velocity of the last step
    vel: Array1<f64>,
    /// Geodesic acceleration of the last step
    acc: Array1<f64>,
    workn: Array1<f64>,
}

impl LevenbergMarquardtStep {
    /// Allocates the workspace; `accel` enables geodesic acceleration.
    pub fn new(_params: &Parameters, n: usize, p: usize, accel: bool) -> Self {
        Self {
            accel,
            vel: Array1::zeros(p),
            acc: Array1::zeros(p),
            workn: Array1::zeros(n),
        }
    }

    /// Velocity `v` of the last computed step.
    pub fn velocity(&self) -> &Array1<f64> {
        &self.vel
    }

    /// Acceleration `a` of the last computed step (zero without acceleration).
    pub fn acceleration(&self) -> &Array1<f64> {
        &self.acc
    }
}

impl TrustRegionSubproblem for LevenbergMarquardtStep {
    fn name(&self) -> &'static str {
        if self.accel {
            "lm-accel"
        } else {
            "lm"
        }
    }

    fn init(
        &mut self,
        view: &TrustView<'_>,
        solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<()> {
        view.require_jtj(self.name())?;
        require_solver(solver, self.name())?;
        self.vel.fill(0.0);
        self.acc.fill(0.0);
        Ok(())
    }

    fn preloop(
        &mut self,
        _view: &TrustView<'_>,
        _solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<()> {
        Ok(())
    }

    fn step(
        &mut self,
        view: &TrustView<'_>,
        _delta: f64,
        solver: &mut Option<Box<dyn LinearSolver>>,
        dx: &mut Array1<f64>,
        avratio: &mut f64,
    ) -> Result<()> {
        let name = self.name();
        let jtj = view.require_jtj(name)?;
        let solver = require_solver(solver, name)?;

        // (J^T J + mu D^T D) v = -g
        solver.presolve(view.mu, jtj, view.diag)?;
        self.vel = solver.solve(&-view.g)?;

        if !self.accel {
            dx.assign(&self.vel);
            return Ok(());
        }

        let fvv = eval_fvv(
            view.problem,
            view.x,
            &self.vel,
            view.f,
            view.sqrt_wts,
            view.params.h_fvv,
        )?;
        let jt_fvv = eval_jtu(
            view.problem,
            view.x,
            view.f,
            &fvv,
            view.sqrt_wts,
            view.params.h_df,
            view.params.fdtype,
            &mut self.workn,
        )?;

        // (J^T J + mu D^T D) a = -J^T fvv
        self.acc = solver.solve(&-&jt_fvv)?;

        let vnorm = enorm(&self.vel);
        *avratio = if vnorm > 0.0 {
            enorm(&self.acc) / vnorm
        } else {
            0.0
        };

        dx.assign(&(&self.vel + &(&self.acc * 0.5)));
        Ok(())
    }

    /// `(||J dx||^2 + 2 mu ||D dx||^2) / ||f||^2`, the reduction of the damped model.
    fn preduction(
        &mut self,
        view: &TrustView<'_>,
        dx: &Array1<f64>,
        _solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<f64> {
        let normf = enorm(view.f);
        if normf == 0.0 {
            return Err(MultifitError::StepFailure(
                "zero residual, predicted reduction undefined".to_string(),
            ));
        }
        let u2 = view.jacobian_norm2(dx)? / (normf * normf);
        let v = scaled_norm(view.diag, dx) / normf;
        Ok(u2 + 2.0 * view.mu * v * v)
    }

    fn reject_step(&self, avratio: f64, params: &Parameters) -> bool {
        self.accel && avratio > params.avmax
    }
}
