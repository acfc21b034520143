//! Trust region method for nonlinear least squares.
//!
//! The [`TrustRegion`] driver runs one outer iteration at a time and is
//! parameterized by three pluggable pieces chosen in [`Parameters`]:
//!
//! - a subproblem strategy ([`subproblem`]) that proposes steps,
//! - a linear solver ([`solver`]) for the damped normal equations,
//! - a scaling policy ([`scale`]) for the diagonal matrix `D`.
//!
//! The damping value follows Nielsen's rule ([`nielsen`]). [`Workspace`]
//! wraps the driver in a complete fit loop with convergence tests.

pub mod config;
pub mod convergence;
pub mod driver;
pub mod nielsen;
pub mod scale;
pub mod solver;
pub mod subproblem;
pub mod workspace;

pub use config::{FdType, Parameters, ScaleMethod, SolverMethod, SubproblemMethod};
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
pub use driver::{TrustRegion, MAX_BAD_STEPS};
pub use scale::ScalingPolicy;
pub use solver::LinearSolver;
pub use subproblem::{TrustRegionSubproblem, TrustView};
pub use workspace::{FitReport, Workspace};
