// This file is part of ffld, an implementation of deformable part model training with
// Fourier-accelerated convolution, following the methods described in the papers:
//
//      Exact Acceleration of Linear Object Detectors,
//      Charles Dubout, Francois Fleuret.
//      In European Conference on Computer Vision (ECCV), 2012.
//
//      Object Detection with Discriminatively Trained Part Based Models,
//      Pedro F. Felzenszwalb, Ross B. Girshick, David McAllester, Deva Ramanan.
//      In IEEE Transactions on Pattern Analysis and Machine Intelligence, 2010.
//
// You can redistribute this source code and/or modify it under the terms of the
// BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.


//! Limited-memory BFGS with a projection onto a convex feasible set.

use std::collections::VecDeque;

use log::trace;

use crate::error::{Error, Result};
use crate::math::{dot, squared_norm};

const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;

pub struct Lbfgs {
    history: usize,
    max_iterations: usize,
    epsilon: f64,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Lbfgs {
            history: 10,
            max_iterations: 400,
            epsilon: 1e-6,
        }
    }
}

impl Lbfgs {
    pub fn new(history: usize, max_iterations: usize, epsilon: f64) -> Self {
        Lbfgs {
            history: history.max(1),
            max_iterations,
            epsilon,
        }
    }

    /// Minimizes `f` starting from `x`, which is overwritten with the best
    /// point found. `f` returns the objective and writes its gradient.
    /// `project` maps any point back onto the feasible set.
    pub fn minimize<F, P>(&self, x: &mut Vec<f64>, mut f: F, project: P) -> Result<f64>
    where
        F: FnMut(&[f64], &mut [f64]) -> f64,
        P: Fn(&mut [f64]),
    {
        let n = x.len();
        project(x);
        let mut g = vec![0.0; n];
        let mut fx = f(x, &mut g);
        if !fx.is_finite() {
            return Err(Error::Numerical(format!("objective is {} at the starting point", fx)));
        }

        let mut pairs: VecDeque<(Vec<f64>, Vec<f64>, f64)> = VecDeque::with_capacity(self.history);
        let mut d = vec![0.0; n];
        let mut x_new = vec![0.0; n];
        let mut g_new = vec![0.0; n];

        for iteration in 0..self.max_iterations {
            if squared_norm(&g) == 0.0 {
                break;
            }
            self.direction(&g, &pairs, &mut d);
            if dot(&d, &g) >= 0.0 {
                pairs.clear();
                d.iter_mut().zip(&g).for_each(|(d, g)| *d = -g);
            }

            let mut step = if pairs.is_empty() {
                1.0 / squared_norm(&g).sqrt().max(1.0)
            } else {
                1.0
            };

            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                for i in 0..n {
                    x_new[i] = x[i] + step * d[i];
                }
                project(&mut x_new);
                let f_new = f(&x_new, &mut g_new);
                let decrease: f64 = (0..n).map(|i| g[i] * (x_new[i] - x[i])).sum();
                if f_new.is_finite() && f_new <= fx + ARMIJO * decrease.min(0.0) {
                    accepted = Some(f_new);
                    break;
                }
                step *= 0.5;
            }

            let f_new = match accepted {
                Some(f_new) => f_new,
                None => break,
            };

            let s: Vec<f64> = (0..n).map(|i| x_new[i] - x[i]).collect();
            let y: Vec<f64> = (0..n).map(|i| g_new[i] - g[i]).collect();
            let sy = dot(&s, &y);
            if sy > 1e-12 {
                if pairs.len() == self.history {
                    pairs.pop_front();
                }
                pairs.push_back((s, y, sy));
            }

            let improvement = fx - f_new;
            std::mem::swap(x, &mut x_new);
            std::mem::swap(&mut g, &mut g_new);
            fx = f_new;
            trace!("L-BFGS iteration {}: {}", iteration, fx);

            if improvement <= self.epsilon * fx.abs().max(1.0) {
                break;
            }
        }

        Ok(fx)
    }

    /// Two-loop recursion: `d = -H g`.
    fn direction(&self, g: &[f64], pairs: &VecDeque<(Vec<f64>, Vec<f64>, f64)>, d: &mut [f64]) {
        d.iter_mut().zip(g).for_each(|(d, g)| *d = -g);
        let mut alphas = Vec::with_capacity(pairs.len());
        for (s, y, sy) in pairs.iter().rev() {
            let alpha = dot(s, d) / sy;
            d.iter_mut().zip(y).for_each(|(d, y)| *d -= alpha * y);
            alphas.push(alpha);
        }
        if let Some((_, y, sy)) = pairs.back() {
            let gamma = sy / squared_norm(y);
            d.iter_mut().for_each(|d| *d *= gamma);
        }
        for ((s, y, sy), alpha) in pairs.iter().zip(alphas.iter().rev()) {
            let beta = dot(y, d) / sy;
            d.iter_mut().zip(s).for_each(|(d, s)| *d += (alpha - beta) * s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Lbfgs;

    #[test]
    fn test_quadratic() {
        let mut x = vec![0.0, 0.0, 0.0];
        let fx = Lbfgs::default()
            .minimize(
                &mut x,
                |x, g| {
                    let targets = [1.0, -2.0, 3.0];
                    let mut f = 0.0;
                    for i in 0..3 {
                        let d = x[i] - targets[i];
                        f += (i + 1) as f64 * d * d;
                        g[i] = 2.0 * (i + 1) as f64 * d;
                    }
                    f
                },
                |_| {},
            )
            .unwrap();
        assert!(fx < 1e-4);
        assert!((x[0] - 1.0).abs() < 1e-2);
        assert!((x[1] + 2.0).abs() < 1e-2);
        assert!((x[2] - 3.0).abs() < 1e-2);
    }

    #[test]
    fn test_projection_is_respected() {
        let mut x = vec![-1.0];
        Lbfgs::default()
            .minimize(
                &mut x,
                |x, g| {
                    g[0] = 2.0 * x[0];
                    x[0] * x[0]
                },
                |x| x[0] = x[0].min(-0.5),
            )
            .unwrap();
        assert!((x[0] + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_start() {
        let mut x = vec![1.0];
        let result = Lbfgs::default().minimize(&mut x, |_, _| f64::NAN, |_| {});
        assert!(result.is_err());
    }
}
