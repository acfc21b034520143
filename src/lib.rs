//! # multifit-rs
//!
//! `multifit-rs` fits parameterized models to data by nonlinear least
//! squares with a trust region method, and provides the Gamma and Bessel K
//! special functions commonly needed by such models.
//!
//! The library provides:
//! - A trust region driver with pluggable subproblem strategies
//!   (Levenberg-Marquardt, geodesic acceleration, dogleg, truncated CG)
//! - Cholesky and QR back ends for the damped normal equations
//! - Analytic, user-accumulated or finite difference derivatives
//! - `Gamma`, `ln Gamma` (real and complex), factorials, binomial
//!   coefficients and `K_nu` with error estimates
//!
//! ## Basic Usage
//!
//! ```
//! use multifit_rs::{ConvergenceCriteria, Parameters, Problem, Result, Workspace};
//! use ndarray::{array, Array1};
//!
//! // y = a exp(-b t)
//! struct Decay {
//!     t: Array1<f64>,
//!     y: Array1<f64>,
//! }
//!
//! impl Problem for Decay {
//!     fn eval(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
//!         Ok(self.t.mapv(|t| x[0] * (-x[1] * t).exp()) - &self.y)
//!     }
//!
//!     fn parameter_count(&self) -> usize {
//!         2
//!     }
//!
//!     fn residual_count(&self) -> usize {
//!         self.t.len()
//!     }
//! }
//!
//! let t = array![0.0, 1.0, 2.0, 3.0, 4.0];
//! let y = t.mapv(|t: f64| 3.0 * (-0.5 * t).exp());
//! let problem = Decay { t, y };
//!
//! let mut ws = Workspace::new(&Parameters::default(), 5, 2)?;
//! ws.init(&problem, &array![1.0, 1.0], None)?;
//! let report = ws.solve(&problem, &ConvergenceCriteria::default())?;
//! assert!((report.params[0] - 3.0).abs() < 1e-6);
//! # Ok::<(), multifit_rs::MultifitError>(())
//! ```

pub mod error;
pub mod evaluation;
pub mod problem;
pub mod specfunc;
pub mod trust;
pub mod utils;

// Re-exports for convenience
pub use error::{MultifitError, Result};
pub use problem::Problem;
pub use specfunc::SfResult;
pub use trust::{
    ConvergenceCriteria, ConvergenceStatus, FitReport, Parameters, TrustRegion, Workspace,
};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
