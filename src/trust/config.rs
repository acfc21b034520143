//! Configuration of the trust region driver.
//!
//! [`Parameters`] is copied into every driver at creation time, so changing a
//! shared configuration afterwards never affects a fit that is already
//! running. Strategy choices are tagged enums resolved once, when the driver
//! allocates its workspaces.

use serde::{Deserialize, Serialize};

use crate::error::{MultifitError, Result};

/// Method used to solve the trust region subproblem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubproblemMethod {
    /// Levenberg-Marquardt step
    Lm,

    /// Levenberg-Marquardt step with geodesic acceleration
    LmAccel,

    /// Powell's dogleg between the Cauchy and Gauss-Newton points
    Dogleg,

    /// Steihaug-Toint truncated conjugate gradient
    Cgst,
}

impl Default for SubproblemMethod {
    fn default() -> Self {
        SubproblemMethod::Lm
    }
}

impl SubproblemMethod {
    /// Whether the method works on the materialized `J^T J` matrix.
    pub fn needs_jtj(&self) -> bool {
        !matches!(self, SubproblemMethod::Cgst)
    }

    /// Whether the method factorizes through a linear solver.
    pub fn needs_solver(&self) -> bool {
        !matches!(self, SubproblemMethod::Cgst)
    }
}

/// Linear least squares back end for the damped normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    /// No solver; only matrix-free subproblem methods can be used
    None,

    /// Cholesky factorization (fastest, needs a positive definite matrix)
    Cholesky,

    /// QR factorization (slower, tolerates a nearly singular matrix)
    Qr,
}

impl Default for SolverMethod {
    fn default() -> Self {
        SolverMethod::Cholesky
    }
}

/// Policy maintaining the diagonal scaling matrix `D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMethod {
    /// `D = I`
    Levenberg,

    /// `D = sqrt(diag(J^T J))`, recomputed on every accepted step
    Marquardt,

    /// `D = sqrt(diag(J^T J))`, never decreasing
    More,
}

impl Default for ScaleMethod {
    fn default() -> Self {
        ScaleMethod::More
    }
}

/// Finite difference scheme for approximated Jacobians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FdType {
    /// `(f(x + h e_j) - f(x)) / h`
    Forward,

    /// `(f(x + h/2 e_j) - f(x - h/2 e_j)) / h`
    Central,
}

impl Default for FdType {
    fn default() -> Self {
        FdType::Forward
    }
}

/// Tunable parameters of the trust region driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Trust region subproblem method. Default: Lm
    pub trs: SubproblemMethod,

    /// Scaling policy. Default: More
    pub scale: ScaleMethod,

    /// Linear solver. Default: Cholesky
    pub solver: SolverMethod,

    /// Finite difference scheme for the Jacobian. Default: Forward
    pub fdtype: FdType,

    /// Factor by which the radius grows after a very good step. Default: 3.0
    pub factor_up: f64,

    /// Factor by which the radius shrinks after a poor step. Default: 2.0
    pub factor_down: f64,

    /// Maximum allowed |a| / |v| for geodesic acceleration. Default: 0.75
    pub avmax: f64,

    /// Relative step for finite difference Jacobians. Default: sqrt(eps)
    pub h_df: f64,

    /// Step for finite difference second directional derivatives. Default: 0.02
    pub h_fvv: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            trs: SubproblemMethod::default(),
            scale: ScaleMethod::default(),
            solver: SolverMethod::default(),
            fdtype: FdType::default(),
            factor_up: 3.0,
            factor_down: 2.0,
            avmax: 0.75,
            h_df: f64::EPSILON.sqrt(),
            h_fvv: 0.02,
        }
    }
}

impl Parameters {
    /// Creates the default parameter set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the trust region subproblem method.
    pub fn with_trs(mut self, trs: SubproblemMethod) -> Self {
        self.trs = trs;
        self
    }

    /// Set the scaling policy.
    pub fn with_scale(mut self, scale: ScaleMethod) -> Self {
        self.scale = scale;
        self
    }

    /// Set the linear solver.
    pub fn with_solver(mut self, solver: SolverMethod) -> Self {
        self.solver = solver;
        self
    }

    /// Set the finite difference scheme.
    pub fn with_fdtype(mut self, fdtype: FdType) -> Self {
        self.fdtype = fdtype;
        self
    }

    /// Set the radius growth and shrink factors.
    pub fn with_factors(mut self, factor_up: f64, factor_down: f64) -> Self {
        self.factor_up = factor_up;
        self.factor_down = factor_down;
        self
    }

    /// Set the acceleration ratio ceiling.
    pub fn with_avmax(mut self, avmax: f64) -> Self {
        self.avmax = avmax;
        self
    }

    /// Set the finite difference step for Jacobians.
    pub fn with_h_df(mut self, h_df: f64) -> Self {
        self.h_df = h_df;
        self
    }

    /// Set the finite difference step for second directional derivatives.
    pub fn with_h_fvv(mut self, h_fvv: f64) -> Self {
        self.h_fvv = h_fvv;
        self
    }

    /// Checks that the numeric settings are usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("factor_up", self.factor_up),
            ("factor_down", self.factor_down),
            ("avmax", self.avmax),
            ("h_df", self.h_df),
            ("h_fvv", self.h_fvv),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(MultifitError::InvalidInput(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        if self.trs.needs_solver() && self.solver == SolverMethod::None {
            return Err(MultifitError::InvalidInput(format!(
                "subproblem method {:?} requires a linear solver",
                self.trs
            )));
        }
        Ok(())
    }

    /// Parses parameters from JSON; missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: Parameters = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Serializes the parameters to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
