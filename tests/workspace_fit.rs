//! Integration tests for complete fits through the workspace.

use approx::assert_relative_eq;
use multifit_rs::trust::{ScaleMethod, SolverMethod, SubproblemMethod};
use multifit_rs::{
    ConvergenceCriteria, ConvergenceStatus, MultifitError, Parameters, Problem, Result, Workspace,
};
use ndarray::{array, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// y = a exp(-lambda t) + b
struct ExpDecay {
    t: Array1<f64>,
    y: Array1<f64>,
}

impl ExpDecay {
    const TRUE: [f64; 3] = [5.0, 1.5, 1.0];

    fn noisy(n: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let t = Array1::linspace(0.0, 3.0, n);
        let [a, lambda, b] = Self::TRUE;
        let y = t.mapv(|ti: f64| a * (-lambda * ti).exp() + b + rng.gen_range(-0.1..0.1));
        Self { t, y }
    }
}

impl Problem for ExpDecay {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let (a, lambda, b) = (params[0], params[1], params[2]);
        Ok(self.t.mapv(|ti| a * (-lambda * ti).exp() + b) - &self.y)
    }

    fn parameter_count(&self) -> usize {
        3
    }

    fn residual_count(&self) -> usize {
        self.t.len()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let (a, lambda) = (params[0], params[1]);
        let mut jac = Array2::zeros((self.t.len(), 3));
        for (i, ti) in self.t.iter().enumerate() {
            let e = (-lambda * ti).exp();
            jac[[i, 0]] = e;
            jac[[i, 1]] = -ti * a * e;
            jac[[i, 2]] = 1.0;
        }
        Ok(jac)
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}

/// Residual `x - 1` with a Jacobian of the wrong sign.
struct WrongSign;

impl Problem for WrongSign {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(array![params[0] - 1.0])
    }

    fn parameter_count(&self) -> usize {
        1
    }

    fn residual_count(&self) -> usize {
        1
    }

    fn jacobian(&self, _params: &Array1<f64>) -> Result<Array2<f64>> {
        Ok(array![[-1.0]])
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}

fn fit(problem: &ExpDecay, params: &Parameters) -> multifit_rs::FitReport {
    let mut ws = Workspace::new(params, problem.residual_count(), 3).unwrap();
    ws.init(problem, &array![1.0, 1.0, 0.0], None).unwrap();
    let criteria = ConvergenceCriteria {
        max_iterations: 500,
        ..ConvergenceCriteria::default()
    };
    ws.solve(problem, &criteria).unwrap()
}

#[test]
fn test_exponential_fit_all_methods() {
    let problem = ExpDecay::noisy(40, 7);
    let reference = fit(&problem, &Parameters::default());
    assert!(reference.success(), "{}", reference);

    let [a, lambda, b] = ExpDecay::TRUE;
    assert!((reference.params[0] - a).abs() < 0.2);
    assert!((reference.params[1] - lambda).abs() < 0.15);
    assert!((reference.params[2] - b).abs() < 0.1);

    for method in [
        SubproblemMethod::LmAccel,
        SubproblemMethod::Dogleg,
        SubproblemMethod::Cgst,
    ] {
        let report = fit(&problem, &Parameters::new().with_trs(method));
        assert!(report.status.is_terminated());
        assert!(report.iterations > 0);
        assert_relative_eq!(report.params, reference.params, epsilon = 1e-3);
        assert_relative_eq!(
            report.chi_squared,
            reference.chi_squared,
            max_relative = 1e-5
        );
    }
}

#[test]
fn test_qr_matches_cholesky() {
    let problem = ExpDecay::noisy(25, 11);
    for scale in [ScaleMethod::Levenberg, ScaleMethod::Marquardt, ScaleMethod::More] {
        let chol = fit(
            &problem,
            &Parameters::new()
                .with_scale(scale)
                .with_solver(SolverMethod::Cholesky),
        );
        let qr = fit(
            &problem,
            &Parameters::new().with_scale(scale).with_solver(SolverMethod::Qr),
        );
        assert!(chol.success() && qr.success());
        assert_relative_eq!(chol.params, qr.params, epsilon = 1e-6);
    }
}

#[test]
fn test_weighted_fit() {
    let problem = ExpDecay::noisy(30, 3);
    let n = problem.residual_count();
    let weights = Array1::from_shape_fn(n, |i| if i % 2 == 0 { 4.0 } else { 1.0 });

    let mut ws = Workspace::new(&Parameters::default(), n, 3).unwrap();
    ws.init(&problem, &array![1.0, 1.0, 0.0], Some(&weights)).unwrap();
    let report = ws.solve(&problem, &ConvergenceCriteria::default()).unwrap();
    assert!(report.success());

    let raw = problem.eval(&report.params).unwrap();
    let expected = &raw * &weights.mapv(f64::sqrt);
    assert_relative_eq!(report.residuals, expected, epsilon = 1e-12);
    assert_relative_eq!(
        report.chi_squared,
        (&raw * &raw * &weights).sum(),
        max_relative = 1e-12
    );

    let cov = ws.covariance().unwrap();
    for i in 0..3 {
        assert!(cov[[i, i]] > 0.0);
        for j in 0..3 {
            assert_relative_eq!(cov[[i, j]], cov[[j, i]], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_callback_sees_every_iteration() {
    let problem = ExpDecay::noisy(20, 5);
    let mut ws = Workspace::new(&Parameters::default(), 20, 3).unwrap();
    ws.init(&problem, &array![1.0, 1.0, 0.0], None).unwrap();

    let mut seen = Vec::new();
    let report = ws
        .solve_with_callback(&problem, &ConvergenceCriteria::default(), |iter, w| {
            seen.push((iter, w.chi_squared()));
        })
        .unwrap();

    assert_eq!(report.stalled_iterations, 0);
    assert_eq!(seen.len(), report.iterations);
    assert!(seen.windows(2).all(|w| w[1].1 < w[0].1));
    assert_eq!(seen.last().map(|s| s.0), Some(report.iterations));
}

#[test]
fn test_iteration_limit() {
    let problem = ExpDecay::noisy(20, 9);
    let mut ws = Workspace::new(&Parameters::default(), 20, 3).unwrap();
    ws.init(&problem, &array![1.0, 1.0, 0.0], None).unwrap();
    let criteria = ConvergenceCriteria::new(0.0, 0.0, 0.0, 2);
    let report = ws.solve(&problem, &criteria).unwrap();

    assert_eq!(report.status, ConvergenceStatus::MaxIterationsReached);
    assert_eq!(report.iterations, 2);
    assert!(!report.success());
}

#[test]
fn test_no_progress_from_start() {
    let mut ws = Workspace::new(&Parameters::default(), 1, 1).unwrap();
    ws.init(&WrongSign, &array![0.0], None).unwrap();
    let err = ws
        .solve(&WrongSign, &ConvergenceCriteria::default())
        .unwrap_err();

    assert!(matches!(err, MultifitError::NoProgress { attempts: 15 }));
    assert_eq!(ws.position()[0], 0.0);
    assert_relative_eq!(ws.chi_squared(), 1.0);
}
