//! Steihaug-Toint truncated conjugate gradient.
//!
//! Minimizes the Gauss-Newton model in the scaled variables `z = D dx`,
//! where the model Hessian is `D^-1 J^T J D^-1` and the gradient `D^-1 g`.
//! Only products with `J^T J` are needed, so the strategy works without a
//! stored normal matrix and without a linear solver.

use log::trace;
use ndarray::Array1;

use super::{TrustRegionSubproblem, TrustView};
use crate::error::{MultifitError, Result};
use crate::trust::solver::LinearSolver;
use crate::utils::norms::enorm;

/// Workspace of the truncated CG strategy.
#[derive(Debug)]
pub struct SteihaugCg {
    z: Array1<f64>,
    r: Array1<f64>,
    d: Array1<f64>,
    /// Iteration cap for one step
    max_iter: usize,
}

impl SteihaugCg {
    /// Allocates the workspace for `p` parameters.
    pub fn new(_n: usize, p: usize) -> Self {
        Self {
            z: Array1::zeros(p),
            r: Array1::zeros(p),
            d: Array1::zeros(p),
            max_iter: 2 * p.max(1),
        }
    }

    /// `D^-1 J^T J D^-1 w`
    fn scaled_hessian_times(view: &TrustView<'_>, w: &Array1<f64>) -> Result<Array1<f64>> {
        let unscaled = w / view.diag;
        Ok(view.jtj_times(&unscaled)? / view.diag)
    }
}

/// Largest `t >= 0` with `||z + t d|| = delta`.
fn boundary_step(z: &Array1<f64>, d: &Array1<f64>, delta: f64) -> f64 {
    let a = d.dot(d);
    let b = 2.0 * z.dot(d);
    let c = z.dot(z) - delta * delta;
    if a == 0.0 {
        return 0.0;
    }
    let disc = (b * b - 4.0 * a * c).max(0.0);
    (-b + disc.sqrt()) / (2.0 * a)
}

impl TrustRegionSubproblem for SteihaugCg {
    fn name(&self) -> &'static str {
        "cgst"
    }

    fn init(
        &mut self,
        _view: &TrustView<'_>,
        _solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<()> {
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
        delta: f64,
        _solver: &mut Option<Box<dyn LinearSolver>>,
        dx: &mut Array1<f64>,
        _avratio: &mut f64,
    ) -> Result<()> {
        let gscaled = view.g / view.diag;
        let norm_g = enorm(&gscaled);
        if norm_g == 0.0 {
            return Err(MultifitError::StepFailure(
                "cgst: zero gradient".to_string(),
            ));
        }
        let eps = norm_g.sqrt().min(0.5) * norm_g;

        self.z.fill(0.0);
        self.r.assign(&-&gscaled);
        self.d.assign(&self.r);

        for iter in 0..self.max_iter {
            let bd = Self::scaled_hessian_times(view, &self.d)?;
            let kappa = self.d.dot(&bd);
            let rr = self.r.dot(&self.r);

            if kappa <= 0.0 {
                // negative curvature: follow d to the boundary
                let tau = boundary_step(&self.z, &self.d, delta);
                self.z.scaled_add(tau, &self.d);
                trace!("cgst: negative curvature after {} iterations", iter);
                dx.assign(&(&self.z / view.diag));
                return Ok(());
            }

            let alpha = rr / kappa;
            let z_next = &self.z + &(&self.d * alpha);
            if enorm(&z_next) >= delta {
                let tau = boundary_step(&self.z, &self.d, delta);
                self.z.scaled_add(tau, &self.d);
                trace!("cgst: hit the boundary after {} iterations", iter);
                dx.assign(&(&self.z / view.diag));
                return Ok(());
            }

            self.z = z_next;
            self.r.scaled_add(-alpha, &bd);
            let rr_next = self.r.dot(&self.r);
            if rr_next.sqrt() < eps {
                trace!("cgst: converged after {} iterations", iter + 1);
                dx.assign(&(&self.z / view.diag));
                return Ok(());
            }

            let beta = rr_next / rr;
            self.d = &self.r + &(&self.d * beta);
        }

        Err(MultifitError::StepFailure(format!(
            "cgst: no convergence in {} iterations",
            self.max_iter
        )))
    }

    fn preduction(
        &mut self,
        view: &TrustView<'_>,
        dx: &Array1<f64>,
        _solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<f64> {
        view.quadratic_preduction(dx)
    }
}
