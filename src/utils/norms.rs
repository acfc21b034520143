//! Vector norms used by the convergence and radius tests.

use ndarray::Array1;

/// Euclidean norm `||a||`.
pub fn enorm(a: &Array1<f64>) -> f64 {
    a.dot(a).sqrt()
}

/// Scaled Euclidean norm `||diag(D) a|| = sqrt(sum (D_i a_i)^2)`.
///
/// `d` and `a` must have the same length.
pub fn scaled_norm(d: &Array1<f64>, a: &Array1<f64>) -> f64 {
    debug_assert_eq!(d.len(), a.len());
    d.iter()
        .zip(a.iter())
        .map(|(di, ai)| {
            let u = di * ai;
            u * u
        })
        .sum::<f64>()
        .sqrt()
}

/// `max_i |g_i| * max(|x_i|, 1)`, the gradient measure of the convergence test.
pub fn scaled_infnorm(x: &Array1<f64>, g: &Array1<f64>) -> f64 {
    x.iter()
        .zip(g.iter())
        .map(|(xi, gi)| (xi.abs().max(1.0) * gi).abs())
        .fold(0.0, f64::max)
}
