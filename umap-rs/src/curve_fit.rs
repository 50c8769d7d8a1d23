use crate::Q;
use log::debug;
use ndarray::{Array1, Array2};
use ndarray_linalg::Solve;

/// Figure of merit that is minimized during the fit procedure
pub fn chi2(y: &Array1<Q>, y_model: &Array1<Q>) -> Q {
    (y - y_model).map(|x| x.powi(2)).sum()
}

/// `1 / (1 + a * x^(2b))`, the low-dimensional membership curve
pub fn curve(a: Q, b: Q, x: Q) -> Q {
    1.0 / (1.0 + a * x.powf(2.0 * b))
}

/// Levenberg-Marquardt least squares fit of `curve` to samples `(x, y)`.
///
/// Each step solves `[J'J + lambda diag(J'J)] delta = J'(y - f)` and is accepted only when it
/// lowers chi2. Follows the description from <http://people.duke.edu/~hpgavin/ce281/lm.pdf>.
pub struct Minimizer<'a> {
    x: &'a Array1<Q>,
    y: &'a Array1<Q>,
    pub parameters: [Q; 2],
    pub chi2: Q,
    pub lambda: Q,
    pub max_iterations: usize,
    pub tolerance: Q,
    lambda_up_fac: Q,
    lambda_down_fac: Q,
}

impl<'a> Minimizer<'a> {
    pub fn init(x: &'a Array1<Q>, y: &'a Array1<Q>, initial: [Q; 2]) -> Minimizer<'a> {
        let y_model = Self::model(x, initial);
        Minimizer {
            x,
            y,
            parameters: initial,
            chi2: chi2(y, &y_model),
            lambda: 1e-3,
            max_iterations: 1000,
            tolerance: 1e-12,
            lambda_up_fac: 11.0,
            lambda_down_fac: 9.0,
        }
    }

    fn model(x: &Array1<Q>, p: [Q; 2]) -> Array1<Q> {
        x.map(|&v| curve(p[0], p[1], v))
    }

    /// Analytic parameter gradient of the model, one row per sample
    fn jacobian(&self) -> Array2<Q> {
        let [a, b] = self.parameters;
        let mut j = Array2::zeros((self.x.len(), 2));
        for (i, &x) in self.x.iter().enumerate() {
            if x <= 0.0 {
                continue;
            }
            let x2b = x.powf(2.0 * b);
            let denom = (1.0 + a * x2b).powi(2);
            j[[i, 0]] = -x2b / denom;
            j[[i, 1]] = -2.0 * a * x2b * x.ln() / denom;
        }
        j
    }

    /// Run LM steps until chi2 stops improving. Returns the number of iterations taken.
    pub fn minimize(&mut self) -> usize {
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            let j = self.jacobian();
            let jt = j.t();
            let residual = self.y - &Self::model(self.x, self.parameters);
            let b = jt.dot(&residual);
            let jt_j = jt.dot(&j);

            let mut lhs = jt_j.clone();
            for i in 0..2 {
                lhs[[i, i]] += self.lambda * jt_j[[i, i]];
            }
            let delta = match lhs.solve(&b) {
                Ok(delta) => delta,
                Err(_) => {
                    self.lambda = (self.lambda * self.lambda_up_fac).min(1e7);
                    continue;
                }
            };

            let candidate = [self.parameters[0] + delta[0], self.parameters[1] + delta[1]];
            let candidate_chi2 = chi2(self.y, &Self::model(self.x, candidate));

            if candidate_chi2.is_finite() && candidate_chi2 < self.chi2 {
                let improvement = self.chi2 - candidate_chi2;
                self.parameters = candidate;
                self.chi2 = candidate_chi2;
                self.lambda = (self.lambda / self.lambda_down_fac).max(1e-12);
                if improvement <= self.tolerance * self.chi2.max(self.tolerance) {
                    break;
                }
            } else {
                self.lambda = (self.lambda * self.lambda_up_fac).min(1e7);
                if self.lambda >= 1e7 {
                    break;
                }
            }
        }
        debug!(
            "curve fit: a={:.6} b={:.6} chi2={:.3e} after {} iterations",
            self.parameters[0], self.parameters[1], self.chi2, iterations
        );
        iterations
    }
}

/// Fit the `a` and `b` parameters of the membership curve so that it approximates an offset
/// exponential decay with the given `spread` and `min_dist`.
pub fn find_ab_params(spread: Q, min_dist: Q) -> (Q, Q) {
    let x = Array1::linspace(0.0, 3.0 * spread, 300);
    let y = x.map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist) / spread).exp() });
    let mut minimizer = Minimizer::init(&x, &y, [1.0, 1.0]);
    minimizer.minimize();
    (minimizer.parameters[0], minimizer.parameters[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ab_default_min_dist() {
        let (a, b) = find_ab_params(1.0, 0.1);
        assert!((a - 1.577).abs() < 0.02, "a = {}", a);
        assert!((b - 0.895).abs() < 0.02, "b = {}", b);
    }

    #[test]
    fn test_ab_wide_min_dist() {
        let (a, b) = find_ab_params(1.0, 0.5);
        assert!((a - 0.583).abs() < 0.02, "a = {}", a);
        assert!((b - 1.334).abs() < 0.02, "b = {}", b);
    }

    #[test]
    fn test_curve() {
        assert_eq!(curve(1.0, 1.0, 0.0), 1.0);
        assert!((curve(1.0, 1.0, 1.0) - 0.5).abs() < 1e-12);
    }
}
