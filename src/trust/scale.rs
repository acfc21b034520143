//! Scaling policies for the diagonal matrix `D`.
//!
//! `D` makes the trust region `||D dx|| <= delta` invariant to the units of the
//! individual parameters. Every policy keeps `D_j > 0`.

use ndarray::{Array1, Array2};

use super::config::ScaleMethod;

/// Capability set of a scaling policy: `init` and `update` mutate `D` in place.
pub trait ScalingPolicy {
    /// Name of the policy.
    fn name(&self) -> &'static str;

    /// Initialize `diag` from `J^T J`.
    fn init(&self, jtj: &Array2<f64>, diag: &mut Array1<f64>);

    /// Update `diag` after an accepted step.
    fn update(&self, jtj: &Array2<f64>, diag: &mut Array1<f64>);
}

/// `sqrt(JTJ_jj)`, with 1 standing in for a zero column.
fn column_scale(jtj: &Array2<f64>, j: usize) -> f64 {
    let d = jtj[[j, j]].max(0.0).sqrt();
    if d > 0.0 {
        d
    } else {
        1.0
    }
}

/// `D = I`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenberg;

impl ScalingPolicy for Levenberg {
    fn name(&self) -> &'static str {
        "levenberg"
    }

    fn init(&self, _jtj: &Array2<f64>, diag: &mut Array1<f64>) {
        diag.fill(1.0);
    }

    fn update(&self, _jtj: &Array2<f64>, _diag: &mut Array1<f64>) {}
}

/// `D_j = sqrt(JTJ_jj)` on every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct Marquardt;

impl ScalingPolicy for Marquardt {
    fn name(&self) -> &'static str {
        "marquardt"
    }

    fn init(&self, jtj: &Array2<f64>, diag: &mut Array1<f64>) {
        self.update(jtj, diag);
    }

    fn update(&self, jtj: &Array2<f64>, diag: &mut Array1<f64>) {
        for (j, d) in diag.iter_mut().enumerate() {
            *d = column_scale(jtj, j);
        }
    }
}

/// Moré's rule: start from `sqrt(JTJ_jj)` and never decrease.
#[derive(Debug, Clone, Copy, Default)]
pub struct More;

impl ScalingPolicy for More {
    fn name(&self) -> &'static str {
        "more"
    }

    fn init(&self, jtj: &Array2<f64>, diag: &mut Array1<f64>) {
        Marquardt.update(jtj, diag);
    }

    fn update(&self, jtj: &Array2<f64>, diag: &mut Array1<f64>) {
        for (j, d) in diag.iter_mut().enumerate() {
            *d = d.max(column_scale(jtj, j));
        }
    }
}

impl ScaleMethod {
    /// The policy implementing this method.
    pub fn policy(&self) -> &'static dyn ScalingPolicy {
        match self {
            ScaleMethod::Levenberg => &Levenberg,
            ScaleMethod::Marquardt => &Marquardt,
            ScaleMethod::More => &More,
        }
    }
}
