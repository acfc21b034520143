//! The trust region driver.
//!
//! [`TrustRegion`] owns the per-fit workspace: radius, damping state, scaling
//! diagonal, scratch vectors and the two strategy workspaces. The caller owns
//! `x`, `f`, `g` and `J^T J`; [`TrustRegion::iterate`] mutates them in place,
//! and only when a step is accepted.

use log::{debug, trace};
use ndarray::{Array1, Array2};

use super::config::{Parameters, SolverMethod};
use super::nielsen;
use super::solver::LinearSolver;
use super::subproblem::{TrustRegionSubproblem, TrustView};
use crate::error::{MultifitError, Result};
use crate::evaluation::{eval_df, eval_f};
use crate::problem::Problem;
use crate::utils::norms::{enorm, scaled_norm};

/// Consecutive rejected attempts allowed in one outer iteration.
pub const MAX_BAD_STEPS: usize = 15;

/// Ratio above which the radius grows.
const RHO_GROW: f64 = 0.75;

/// Ratio below which the radius shrinks.
const RHO_SHRINK: f64 = 0.25;

/// Persistent state of one trust region fit.
#[derive(Debug)]
pub struct TrustRegion {
    /// Number of residuals
    n: usize,

    /// Number of parameters
    p: usize,

    /// Trust region radius
    delta: f64,

    /// Levenberg-Marquardt damping value
    mu: f64,

    /// Damping growth factor on rejection
    nu: i64,

    /// Scaling diagonal `D`
    diag: Array1<f64>,

    /// Trial parameters `x + dx`
    x_trial: Array1<f64>,

    /// Weighted residuals at `x_trial`
    f_trial: Array1<f64>,

    /// Scratch for Jacobian evaluations
    workn: Array1<f64>,

    trs: Box<dyn TrustRegionSubproblem>,
    solver: Option<Box<dyn LinearSolver>>,

    /// Last |a| / |v| reported by the subproblem strategy
    avratio: f64,

    params: Parameters,
}

impl TrustRegion {
    /// Creates the driver for `n` residuals and `p` parameters.
    ///
    /// The parameters are copied; the strategy and solver workspaces are
    /// allocated from the methods they name.
    pub fn new(params: &Parameters, n: usize, p: usize) -> Result<Self> {
        if params.trs.needs_solver() && params.solver == SolverMethod::None {
            return Err(MultifitError::Allocation(format!(
                "subproblem method {:?} requires a linear solver",
                params.trs
            )));
        }
        params.validate()?;

        let trs = params.trs.alloc(params, n, p)?;
        let solver = params.solver.alloc(n, p)?;
        Self::with_strategies(params, n, p, trs, solver)
    }

    /// Creates the driver around caller-provided strategy workspaces.
    pub fn with_strategies(
        params: &Parameters,
        n: usize,
        p: usize,
        trs: Box<dyn TrustRegionSubproblem>,
        solver: Option<Box<dyn LinearSolver>>,
    ) -> Result<Self> {
        if n == 0 || p == 0 {
            return Err(MultifitError::Allocation(format!(
                "cannot allocate a trust region workspace for n = {}, p = {}",
                n, p
            )));
        }

        Ok(Self {
            n,
            p,
            delta: 0.0,
            mu: 0.0,
            nu: 0,
            diag: Array1::ones(p),
            x_trial: Array1::zeros(p),
            f_trial: Array1::zeros(n),
            workn: Array1::zeros(n),
            trs,
            solver,
            avratio: 0.0,
            params: params.clone(),
        })
    }

    /// Evaluates the starting point and initializes radius, damping and strategy.
    ///
    /// On return `f`, `g` and `jtj` (when given) hold the values at `x`.
    pub fn init(
        &mut self,
        sqrt_wts: Option<&Array1<f64>>,
        problem: &dyn Problem,
        x: &Array1<f64>,
        f: &mut Array1<f64>,
        g: &mut Array1<f64>,
        mut jtj: Option<&mut Array2<f64>>,
    ) -> Result<()> {
        self.check_sizes(x, f, g)?;

        eval_f(problem, x, sqrt_wts, f)?;
        eval_df(
            problem,
            x,
            f,
            sqrt_wts,
            self.params.h_df,
            self.params.fdtype,
            g,
            jtj.as_deref_mut(),
            &mut self.workn,
        )?;

        match jtj.as_deref() {
            Some(jtj) => self.params.scale.policy().init(jtj, &mut self.diag),
            None => self.diag.fill(1.0),
        }

        self.delta = 0.3 * scaled_norm(&self.diag, x).max(1.0);

        let (mu, nu) = nielsen::init(jtj.as_deref(), &self.diag);
        self.mu = mu;
        self.nu = nu;

        let view = TrustView {
            x,
            f: &*f,
            g: &*g,
            jtj: jtj.as_deref(),
            diag: &self.diag,
            sqrt_wts,
            mu: self.mu,
            params: &self.params,
            problem,
        };
        self.trs.init(&view, &mut self.solver)?;

        self.avratio = 0.0;

        debug!(
            "trust region init ({}): delta = {:.6e}, mu = {:.6e}, |f| = {:.6e}",
            self.trs.name(),
            self.delta,
            self.mu,
            enorm(f)
        );
        Ok(())
    }

    /// Performs one outer iteration.
    ///
    /// Candidate steps are proposed until one is accepted or
    /// [`MAX_BAD_STEPS`] consecutive attempts are rejected. On success `x`,
    /// `f`, `g`, `jtj` and `dx` describe the accepted step. On
    /// [`MultifitError::NoProgress`] `x`, `f`, `g` and `jtj` are unchanged and
    /// `dx` is unspecified. Evaluation errors at a trial point are returned
    /// immediately.
    #[allow(clippy::too_many_arguments)]
    pub fn iterate(
        &mut self,
        sqrt_wts: Option<&Array1<f64>>,
        problem: &dyn Problem,
        x: &mut Array1<f64>,
        f: &mut Array1<f64>,
        g: &mut Array1<f64>,
        mut jtj: Option<&mut Array2<f64>>,
        dx: &mut Array1<f64>,
    ) -> Result<()> {
        self.check_sizes(x, f, g)?;

        {
            let view = TrustView {
                x: &*x,
                f: &*f,
                g: &*g,
                jtj: jtj.as_deref(),
                diag: &self.diag,
                sqrt_wts,
                mu: self.mu,
                params: &self.params,
                problem,
            };
            self.trs.preloop(&view, &mut self.solver)?;
        }

        let mut bad_steps = 0;
        loop {
            let view = TrustView {
                x: &*x,
                f: &*f,
                g: &*g,
                jtj: jtj.as_deref(),
                diag: &self.diag,
                sqrt_wts,
                mu: self.mu,
                params: &self.params,
                problem,
            };

            let mut rejected = false;
            let rho = match self
                .trs
                .step(&view, self.delta, &mut self.solver, dx, &mut self.avratio)
            {
                Ok(()) => {
                    self.x_trial.assign(&(&*view.x + &*dx));
                    eval_f(problem, &self.x_trial, sqrt_wts, &mut self.f_trial)?;

                    rejected = self.trs.reject_step(self.avratio, &self.params);
                    calc_rho(
                        self.trs.as_mut(),
                        &view,
                        &self.f_trial,
                        dx,
                        &mut self.solver,
                    )
                }
                Err(err) => {
                    trace!("{}: no step proposed ({})", self.trs.name(), err);
                    -1.0
                }
            };

            // the radius responds to every attempt, accepted or not
            if rho > RHO_GROW {
                self.delta *= self.params.factor_up;
            } else if rho < RHO_SHRINK {
                self.delta /= self.params.factor_down;
            }

            let accepted = rho > 0.0 && !rejected;
            trace!(
                "attempt {}: rho = {:.6e}, avratio = {:.6e}, delta = {:.6e}, accepted = {}",
                bad_steps + 1,
                rho,
                self.avratio,
                self.delta,
                accepted
            );

            if accepted {
                x.assign(&self.x_trial);
                f.assign(&self.f_trial);

                eval_df(
                    problem,
                    x,
                    f,
                    sqrt_wts,
                    self.params.h_df,
                    self.params.fdtype,
                    g,
                    jtj.as_deref_mut(),
                    &mut self.workn,
                )?;

                if let Some(jtj) = jtj.as_deref() {
                    self.params.scale.policy().update(jtj, &mut self.diag);
                }
                nielsen::accept(rho, &mut self.mu, &mut self.nu);
                return Ok(());
            }

            nielsen::reject(&mut self.mu, &mut self.nu);
            bad_steps += 1;
            if bad_steps >= MAX_BAD_STEPS {
                debug!(
                    "{}: no progress after {} attempts, delta = {:.6e}, mu = {:.6e}",
                    self.trs.name(),
                    bad_steps,
                    self.delta,
                    self.mu
                );
                return Err(MultifitError::NoProgress {
                    attempts: bad_steps,
                });
            }
        }
    }

    /// Reciprocal condition number of `jtj`, from the linear solver.
    pub fn rcond(&self, jtj: &Array2<f64>) -> Result<f64> {
        match self.solver.as_deref() {
            Some(solver) => solver.rcond(jtj),
            None => Err(MultifitError::InvalidInput(
                "no linear solver configured".to_string(),
            )),
        }
    }

    /// Last acceleration to velocity ratio, 0 for strategies without acceleration.
    pub fn avratio(&self) -> f64 {
        self.avratio
    }

    /// Current trust region radius.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Current damping value.
    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Current damping growth factor.
    pub fn nu(&self) -> i64 {
        self.nu
    }

    /// Current scaling diagonal.
    pub fn diag(&self) -> &Array1<f64> {
        &self.diag
    }

    /// Name of the subproblem strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.trs.name()
    }

    /// The parameter snapshot this driver was created with.
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    fn check_sizes(&self, x: &Array1<f64>, f: &Array1<f64>, g: &Array1<f64>) -> Result<()> {
        if x.len() != self.p || g.len() != self.p || f.len() != self.n {
            return Err(MultifitError::DimensionMismatch(format!(
                "workspace is n = {}, p = {}; got x: {}, f: {}, g: {}",
                self.n,
                self.p,
                x.len(),
                f.len(),
                g.len()
            )));
        }
        Ok(())
    }
}

/// Ratio of actual to predicted reduction of `||f||^2`, or -1 when the step
/// does not reduce the residual norm or the model predicts no reduction.
fn calc_rho(
    trs: &mut dyn TrustRegionSubproblem,
    view: &TrustView<'_>,
    f_trial: &Array1<f64>,
    dx: &Array1<f64>,
    solver: &mut Option<Box<dyn LinearSolver>>,
) -> f64 {
    let normf = enorm(view.f);
    let normf_trial = enorm(f_trial);

    if normf_trial >= normf {
        return -1.0;
    }

    let u = normf_trial / normf;
    let actual_reduction = 1.0 - u * u;

    match trs.preduction(view, dx, solver) {
        Ok(pred) if pred > 0.0 => actual_reduction / pred,
        Ok(_) => -1.0,
        Err(err) => {
            trace!("{}: predicted reduction unavailable ({})", trs.name(), err);
            -1.0
        }
    }
}
