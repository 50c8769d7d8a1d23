//! L2-regularized logistic regression, fitted with L-BFGS. Minimizes
//! `0.5 * ||W||^2 + C * sum_i loss_i` with unpenalized intercepts.

use log::debug;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use std::collections::VecDeque;

const HISTORY: usize = 10;

#[derive(Clone, Debug)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    /// Convergence threshold on the largest gradient component
    pub tol: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        LogisticRegression {
            c: 1.0,
            max_iter: 100,
            tol: 1e-4,
        }
    }
}

impl LogisticRegression {
    /// Softmax regression over `n_classes` classes. Returns the `n_classes x n_features`
    /// coefficient matrix.
    pub fn fit_multinomial(&self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Array2<f64> {
        let (n, p) = x.dim();
        assert_eq!(n, y.len());
        let c = self.c;
        let n_params = n_classes * p + n_classes;

        let objective = |params: &Array1<f64>| -> (f64, Array1<f64>) {
            let w = coefficients(params, n_classes, p);
            let b = params.slice(s![n_classes * p..]);

            let mut z = x.dot(&w.t());
            z += &b;

            let mut loss = 0.0;
            for (i, mut row) in z.axis_iter_mut(Axis(0)).enumerate() {
                let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let z_true = row[y[i]] - max;
                row.map_inplace(|v| *v = (*v - max).exp());
                let sum = row.sum();
                loss += sum.ln() - z_true;
                row /= sum;
                // row now holds P - Y
                row[y[i]] -= 1.0;
            }

            let grad_w = z.t().dot(&x) * c + &w;
            let grad_b = z.sum_axis(Axis(0)) * c;
            let value = c * loss + 0.5 * w.iter().map(|v| v * v).sum::<f64>();

            let mut grad = Array1::zeros(n_params);
            grad.slice_mut(s![..n_classes * p])
                .iter_mut()
                .zip(grad_w.iter())
                .for_each(|(g, &v)| *g = v);
            grad.slice_mut(s![n_classes * p..]).assign(&grad_b);
            (value, grad)
        };

        let params = minimize_lbfgs(objective, Array1::zeros(n_params), self.max_iter, self.tol);
        coefficients(&params, n_classes, p)
    }

    /// Two-class regression of `y` (true = positive class). Returns the coefficient vector.
    pub fn fit_binary(&self, x: ArrayView2<f64>, y: &[bool]) -> Array1<f64> {
        let (n, p) = x.dim();
        assert_eq!(n, y.len());
        let c = self.c;
        let target = y.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect::<Array1<f64>>();

        let objective = |params: &Array1<f64>| -> (f64, Array1<f64>) {
            let w = params.slice(s![..p]);
            let b = params[p];
            let z = x.dot(&w) + b;

            let mut loss = 0.0;
            let mut resid = Array1::zeros(n);
            for i in 0..n {
                // signed margin, log(1 + exp(-m)) computed stably
                let m = if y[i] { z[i] } else { -z[i] };
                loss += (-m).max(0.0) + (-m.abs()).exp().ln_1p();
                resid[i] = sigmoid(z[i]) - target[i];
            }

            let grad_w = x.t().dot(&resid) * c + &w;
            let value = c * loss + 0.5 * w.dot(&w);
            let mut grad = Array1::zeros(p + 1);
            grad.slice_mut(s![..p]).assign(&grad_w);
            grad[p] = c * resid.sum();
            (value, grad)
        };

        let params = minimize_lbfgs(objective, Array1::zeros(p + 1), self.max_iter, self.tol);
        params.slice(s![..p]).to_owned()
    }
}

/// Leading `n_classes * p` parameters as a row-major coefficient matrix
fn coefficients(params: &Array1<f64>, n_classes: usize, p: usize) -> Array2<f64> {
    Array2::from_shape_fn((n_classes, p), |(k, j)| params[k * p + j])
}

#[inline]
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Limited-memory BFGS with a backtracking Armijo line search.
fn minimize_lbfgs<F>(mut f: F, x0: Array1<f64>, max_iter: usize, tol: f64) -> Array1<f64>
where
    F: FnMut(&Array1<f64>) -> (f64, Array1<f64>),
{
    let mut x = x0;
    let (mut fx, mut g) = f(&x);
    let mut history: VecDeque<(Array1<f64>, Array1<f64>, f64)> = VecDeque::with_capacity(HISTORY);

    let mut iterations = 0;
    while iterations < max_iter {
        if g.iter().fold(0.0, |acc: f64, v| acc.max(v.abs())) < tol {
            break;
        }
        iterations += 1;

        // two-loop recursion
        let mut q = g.clone();
        let mut alphas = Vec::with_capacity(history.len());
        for (s, y, rho) in history.iter().rev() {
            let alpha = rho * s.dot(&q);
            q.scaled_add(-alpha, y);
            alphas.push(alpha);
        }
        let gamma = match history.back() {
            Some((s, y, _)) => s.dot(y) / y.dot(y),
            None => 1.0 / g.dot(&g).sqrt().max(1.0),
        };
        q *= gamma;
        for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
            let beta = rho * y.dot(&q);
            q.scaled_add(alpha - beta, s);
        }
        let mut d = -q;

        let mut slope = g.dot(&d);
        if !(slope < 0.0) {
            history.clear();
            d = -&g;
            slope = g.dot(&d);
        }

        let mut step = 1.0;
        let (x_new, f_new, g_new) = loop {
            let candidate = &x + &(&d * step);
            let (f_c, g_c) = f(&candidate);
            if f_c <= fx + 1e-4 * step * slope || step < 1e-12 {
                break (candidate, f_c, g_c);
            }
            step *= 0.5;
        };
        if !(f_new <= fx) {
            break;
        }

        let s = &x_new - &x;
        let y = &g_new - &g;
        let sy = s.dot(&y);
        if sy > 1e-12 {
            if history.len() == HISTORY {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / sy));
        }

        let decrease = fx - f_new;
        x = x_new;
        g = g_new;
        let converged = decrease <= 1e-12 * fx.abs().max(f_new.abs()).max(1.0);
        fx = f_new;
        if converged {
            break;
        }
    }
    debug!("lbfgs: {} iterations, objective {:.6}", iterations, fx);
    x
}
