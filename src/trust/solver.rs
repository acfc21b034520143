//! Linear least squares back ends for the damped normal equations.
//!
//! Subproblem strategies factorize `JTJ + mu D^2` through the solver owned by
//! the driver and solve against it, possibly several times per factorization.
//! The driver itself only asks the solver for the conditioning of `J^T J`.

use std::fmt;

use nalgebra::linalg::{Cholesky, QR};
use nalgebra::{DMatrix, Dyn};
use ndarray::{Array1, Array2};

use super::config::SolverMethod;
use crate::error::{MultifitError, Result};
use crate::utils::matrix_convert::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

/// Capability set of a linear solver workspace.
///
/// Construction plays the role of `alloc` and dropping the value releases it.
pub trait LinearSolver: fmt::Debug {
    /// Name of the solver.
    fn name(&self) -> &'static str;

    /// Factorize `JTJ + mu diag(D)^2`.
    fn presolve(&mut self, mu: f64, jtj: &Array2<f64>, diag: &Array1<f64>) -> Result<()>;

    /// Solve `(JTJ + mu D^2) x = b` with the last factorization.
    fn solve(&self, b: &Array1<f64>) -> Result<Array1<f64>>;

    /// Reciprocal condition number of `JTJ` in the 1-norm.
    fn rcond(&self, jtj: &Array2<f64>) -> Result<f64>;
}

fn damped_matrix(mu: f64, jtj: &Array2<f64>, diag: &Array1<f64>) -> DMatrix<f64> {
    let mut a = ndarray_to_nalgebra(jtj);
    for (j, dj) in diag.iter().enumerate() {
        a[(j, j)] += mu * dj * dj;
    }
    a
}

fn norm1(a: &DMatrix<f64>) -> f64 {
    a.column_iter()
        .map(|c| c.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

fn rcond_from_inverse(a: &DMatrix<f64>, inverse: &DMatrix<f64>) -> f64 {
    let anorm = norm1(a);
    let ainv_norm = norm1(inverse);
    if anorm == 0.0 || !ainv_norm.is_finite() || ainv_norm == 0.0 {
        0.0
    } else {
        1.0 / (anorm * ainv_norm)
    }
}

fn check_size(p: usize, jtj: &Array2<f64>) -> Result<()> {
    if jtj.dim() != (p, p) {
        return Err(MultifitError::DimensionMismatch(format!(
            "expected a {}x{} normal matrix, got {:?}",
            p,
            p,
            jtj.dim()
        )));
    }
    Ok(())
}

fn not_factorized() -> MultifitError {
    MultifitError::LinearAlgebraError("solve called before presolve".to_string())
}

/// Cholesky factorization of the damped normal matrix.
#[derive(Debug)]
pub struct CholeskySolver {
    p: usize,
    factor: Option<Cholesky<f64, Dyn>>,
}

impl CholeskySolver {
    /// Allocates a solver for `p` parameters.
    pub fn new(_n: usize, p: usize) -> Self {
        Self { p, factor: None }
    }
}

impl LinearSolver for CholeskySolver {
    fn name(&self) -> &'static str {
        "cholesky"
    }

    fn presolve(&mut self, mu: f64, jtj: &Array2<f64>, diag: &Array1<f64>) -> Result<()> {
        check_size(self.p, jtj)?;
        self.factor = damped_matrix(mu, jtj, diag).cholesky();
        if self.factor.is_none() {
            return Err(MultifitError::SingularMatrix);
        }
        Ok(())
    }

    fn solve(&self, b: &Array1<f64>) -> Result<Array1<f64>> {
        let factor = self.factor.as_ref().ok_or_else(not_factorized)?;
        let x = factor.solve(&ndarray_vec_to_nalgebra(b));
        Ok(nalgebra_vec_to_ndarray(&x))
    }

    fn rcond(&self, jtj: &Array2<f64>) -> Result<f64> {
        check_size(self.p, jtj)?;
        let a = ndarray_to_nalgebra(jtj);
        let inverse = a
            .clone()
            .cholesky()
            .ok_or(MultifitError::SingularMatrix)?
            .inverse();
        Ok(rcond_from_inverse(&a, &inverse))
    }
}

/// QR factorization of the damped normal matrix.
#[derive(Debug)]
pub struct QrSolver {
    p: usize,
    factor: Option<QR<f64, Dyn, Dyn>>,
}

impl QrSolver {
    /// Allocates a solver for `p` parameters.
    pub fn new(_n: usize, p: usize) -> Self {
        Self { p, factor: None }
    }
}

impl LinearSolver for QrSolver {
    fn name(&self) -> &'static str {
        "qr"
    }

    fn presolve(&mut self, mu: f64, jtj: &Array2<f64>, diag: &Array1<f64>) -> Result<()> {
        check_size(self.p, jtj)?;
        self.factor = Some(damped_matrix(mu, jtj, diag).qr());
        Ok(())
    }

    fn solve(&self, b: &Array1<f64>) -> Result<Array1<f64>> {
        let factor = self.factor.as_ref().ok_or_else(not_factorized)?;
        let x = factor
            .solve(&ndarray_vec_to_nalgebra(b))
            .ok_or(MultifitError::SingularMatrix)?;
        Ok(nalgebra_vec_to_ndarray(&x))
    }

    fn rcond(&self, jtj: &Array2<f64>) -> Result<f64> {
        check_size(self.p, jtj)?;
        let a = ndarray_to_nalgebra(jtj);
        let inverse = a
            .clone()
            .qr()
            .try_inverse()
            .ok_or(MultifitError::SingularMatrix)?;
        Ok(rcond_from_inverse(&a, &inverse))
    }
}

impl SolverMethod {
    /// Allocates the solver workspace, or `None` when no solver is configured.
    pub fn alloc(&self, n: usize, p: usize) -> Result<Option<Box<dyn LinearSolver>>> {
        if p == 0 {
            return Err(MultifitError::Allocation(
                "linear solver needs at least one parameter".to_string(),
            ));
        }
        Ok(match self {
            SolverMethod::None => None,
            SolverMethod::Cholesky => Some(Box::new(CholeskySolver::new(n, p))),
            SolverMethod::Qr => Some(Box::new(QrSolver::new(n, p))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn solvers() -> Vec<Box<dyn LinearSolver>> {
        vec![
            Box::new(CholeskySolver::new(3, 2)),
            Box::new(QrSolver::new(3, 2)),
        ]
    }

    #[test]
    fn test_damped_solve() {
        let jtj = array![[2.0, 1.0], [1.0, 3.0]];
        let diag = array![1.0, 2.0];
        // A = [[2 + 0.5, 1], [1, 3 + 2]] = [[2.5, 1], [1, 5]]
        let b = array![3.5, 6.0];

        for mut solver in solvers() {
            solver.presolve(0.5, &jtj, &diag).unwrap();
            let x = solver.solve(&b).unwrap();
            assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
            assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rcond() {
        let jtj = array![[4.0, 0.0], [0.0, 1.0]];
        for solver in solvers() {
            // ||A||_1 = 4, ||A^-1||_1 = 1
            assert_relative_eq!(solver.rcond(&jtj).unwrap(), 0.25, epsilon = 1e-12);
        }

        let singular = array![[1.0, 1.0], [1.0, 1.0]];
        let chol = CholeskySolver::new(3, 2);
        assert!(chol.rcond(&singular).is_err());
    }

    #[test]
    fn test_errors() {
        let solver = CholeskySolver::new(3, 2);
        assert!(solver.solve(&array![1.0, 1.0]).is_err());

        let mut solver = CholeskySolver::new(3, 2);
        assert!(matches!(
            solver.presolve(0.0, &array![[1.0, 2.0], [2.0, 1.0]], &array![1.0, 1.0]),
            Err(MultifitError::SingularMatrix)
        ));
        assert!(solver.rcond(&Array2::zeros((3, 3))).is_err());

        assert!(SolverMethod::None.alloc(3, 2).unwrap().is_none());
        assert!(SolverMethod::Cholesky.alloc(3, 0).is_err());
        assert_eq!(SolverMethod::Qr.alloc(3, 2).unwrap().unwrap().name(), "qr");
    }
}
