//! Powell's dogleg in the scaled variables `D dx`.
//!
//! The path runs from the origin to the Cauchy point (the model minimizer
//! along the scaled steepest descent direction) and on to the Gauss-Newton
//! point; the step is where it leaves the trust region.

use log::debug;
use ndarray::Array1;

use super::{require_solver, TrustRegionSubproblem, TrustView};
use crate::error::{MultifitError, Result};
use crate::trust::solver::LinearSolver;
use crate::utils::norms::scaled_norm;

/// Workspace of the dogleg strategy.
#[derive(Debug)]
pub struct Dogleg {
    /// Cauchy point `-t D^-2 g`
    dx_sd: Array1<f64>,
    /// Gauss-Newton point, solved lazily once per outer iteration
    dx_gn: Option<Array1<f64>>,
    gn_attempted: bool,
}

impl Dogleg {
    /// Allocates the workspace for `p` parameters.
    pub fn new(_n: usize, p: usize) -> Self {
        Self {
            dx_sd: Array1::zeros(p),
            dx_gn: None,
            gn_attempted: false,
        }
    }

    fn gauss_newton(
        &mut self,
        view: &TrustView<'_>,
        solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Option<&Array1<f64>> {
        if !self.gn_attempted {
            self.gn_attempted = true;
            let result = view.require_jtj("dogleg").and_then(|jtj| {
                let solver = require_solver(solver, "dogleg")?;
                solver.presolve(0.0, jtj, view.diag)?;
                solver.solve(&-view.g)
            });
            match result {
                Ok(gn) => self.dx_gn = Some(gn),
                Err(err) => debug!("dogleg: Gauss-Newton step unavailable ({}), using Cauchy point", err),
            }
        }
        self.dx_gn.as_ref()
    }
}

/// Largest `t >= 0` with `||D (a + t b)|| = delta`, given `||D a|| <= delta`.
fn boundary_intersection(diag: &Array1<f64>, a: &Array1<f64>, b: &Array1<f64>, delta: f64) -> f64 {
    let da = a * diag;
    let db = b * diag;
    let qa = db.dot(&db);
    let qb = 2.0 * da.dot(&db);
    let qc = da.dot(&da) - delta * delta;
    if qa == 0.0 {
        return 0.0;
    }
    let disc = (qb * qb - 4.0 * qa * qc).max(0.0);
    (-qb + disc.sqrt()) / (2.0 * qa)
}

impl TrustRegionSubproblem for Dogleg {
    fn name(&self) -> &'static str {
        "dogleg"
    }

    fn init(
        &mut self,
        view: &TrustView<'_>,
        solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<()> {
        view.require_jtj(self.name())?;
        require_solver(solver, self.name())?;
        Ok(())
    }

    fn preloop(
        &mut self,
        view: &TrustView<'_>,
        _solver: &mut Option<Box<dyn LinearSolver>>,
    ) -> Result<()> {
        // steepest descent direction in unscaled variables: -D^-2 g
        let sd = -(view.g / &(view.diag * view.diag));
        let gscaled = view.g / view.diag;
        let num = gscaled.dot(&gscaled);
        let den = view.jacobian_norm2(&sd)?;

        self.dx_sd = if den > 0.0 {
            sd * (num / den)
        } else {
            Array1::zeros(view.g.len())
        };
        self.dx_gn = None;
        self.gn_attempted = false;
        Ok(())
    }

    fn step(
        &mut self,
        view: &TrustView<'_>,
        delta: f64,
        solver: &mut Option<Box<dyn LinearSolver>>,
        dx: &mut Array1<f64>,
        _avratio: &mut f64,
    ) -> Result<()> {
        let norm_sd = scaled_norm(view.diag, &self.dx_sd);

        let Some(gn) = self.gauss_newton(view, solver).cloned() else {
            if norm_sd == 0.0 {
                return Err(MultifitError::StepFailure(
                    "dogleg: no descent direction".to_string(),
                ));
            }
            let t = (delta / norm_sd).min(1.0);
            dx.assign(&(&self.dx_sd * t));
            return Ok(());
        };

        if scaled_norm(view.diag, &gn) <= delta {
            // Gauss-Newton point inside the region
            dx.assign(&gn);
        } else if norm_sd >= delta {
            // truncated steepest descent
            dx.assign(&(&self.dx_sd * (delta / norm_sd)));
        } else {
            let leg = &gn - &self.dx_sd;
            let t = boundary_intersection(view.diag, &self.dx_sd, &leg, delta);
            dx.assign(&(&self.dx_sd + &(leg * t)));
        }
        Ok(())
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
