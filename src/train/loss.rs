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


use std::ops::Range;

use crate::common::par_map;
use crate::math::{axpy, squared_norm, weighted_sum};
use crate::model::Mixture;

const NB_CHUNKS: usize = 16;

/// A placement's feature vector, tagged with the component it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct Example {
    pub component: usize,
    pub features: Vec<f32>,
}

impl Example {
    pub fn score(&self, weights: &[f64], ranges: &[Range<usize>]) -> f64 {
        weighted_sum(&weights[ranges[self.component].clone()], &self.features)
    }
}

/// `1/2 max_k |w_k|^2 + C J sum_pos max(0, 1 - w.x) + C sum_neg max(0, 1 + w.x)`,
/// biases excluded from the regularizer.
pub struct Objective<'a> {
    ranges: Vec<Range<usize>>,
    positives: &'a [Example],
    negatives: &'a [Example],
    c: f64,
    j: f64,
}

impl<'a> Objective<'a> {
    pub fn new(mixture: &Mixture, positives: &'a [Example], negatives: &'a [Example], c: f64, j: f64) -> Self {
        Objective {
            ranges: mixture.parameter_ranges(),
            positives,
            negatives,
            c,
            j,
        }
    }

    pub fn evaluate(&self, w: &[f64], grad: &mut [f64]) -> f64 {
        grad.iter_mut().for_each(|g| *g = 0.0);

        // The bias is the last parameter of every component.
        let regularized = |r: &Range<usize>| r.start..r.end - 1;
        let mut loss = 0.0;
        let widest = self
            .ranges
            .iter()
            .map(|r| squared_norm(&w[regularized(r)]))
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((k, norm)) = widest {
            loss += 0.5 * norm;
            let r = regularized(&self.ranges[k]);
            grad[r.clone()].copy_from_slice(&w[r]);
        }

        let total = self.positives.len() + self.negatives.len();
        let chunk = (total + NB_CHUNKS - 1) / NB_CHUNKS;
        let partials = par_map(if total == 0 { 0 } else { NB_CHUNKS }, |c| {
            let mut partial_grad = vec![0.0; w.len()];
            let mut partial_loss = 0.0;
            for i in c * chunk..((c + 1) * chunk).min(total) {
                let (example, sign, weight) = if i < self.positives.len() {
                    (&self.positives[i], -1.0, self.c * self.j)
                } else {
                    (&self.negatives[i - self.positives.len()], 1.0, self.c)
                };
                let r = self.ranges[example.component].clone();
                let hinge = 1.0 + sign * weighted_sum(&w[r.clone()], &example.features);
                if hinge > 0.0 {
                    partial_loss += weight * hinge;
                    axpy(sign * weight, &example.features, &mut partial_grad[r]);
                }
            }
            (partial_loss, partial_grad)
        });

        for (partial_loss, partial_grad) in partials {
            loss += partial_loss;
            grad.iter_mut().zip(&partial_grad).for_each(|(g, p)| *g += p);
        }
        loss
    }
}

#[cfg(test)]
mod tests {
    use super::{Example, Objective};
    use crate::model::{Mixture, Model};

    fn mixture() -> Mixture {
        Mixture::new(vec![Model::new(1, 1), Model::new(1, 1)]).unwrap()
    }

    fn example(component: usize, seed: f32) -> Example {
        let mut features: Vec<f32> = (0..31).map(|i| ((i as f32 + seed) * 0.37).sin()).collect();
        features.push(1.0);
        Example { component, features }
    }

    #[test]
    fn test_zero_weights() {
        let mixture = mixture();
        let positives = vec![example(0, 1.0), example(1, 2.0)];
        let negatives = vec![example(0, 3.0)];
        let objective = Objective::new(&mixture, &positives, &negatives, 0.5, 2.0);
        let w = vec![0.0; mixture.dimension()];
        let mut grad = vec![0.0; w.len()];
        // Every hinge is active with value 1.
        let loss = objective.evaluate(&w, &mut grad);
        assert!((loss - (0.5 * 2.0 * 2.0 + 0.5)).abs() < 1e-12);
        // Bias gradient: -C J for the positive, +C for the negative of component 0.
        assert!((grad[31] - (-1.0 + 0.5)).abs() < 1e-12);
        assert!((grad[63] - (-1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let mixture = mixture();
        let positives = vec![example(0, 1.0), example(1, 2.0), example(1, 5.0)];
        let negatives = vec![example(0, 3.0), example(1, 4.0)];
        let objective = Objective::new(&mixture, &positives, &negatives, 0.1, 2.0);

        let w: Vec<f64> = (0..mixture.dimension()).map(|i| ((i * 7) as f64 * 0.13).cos() * 0.05).collect();
        let mut grad = vec![0.0; w.len()];
        objective.evaluate(&w, &mut grad);

        let h = 1e-6;
        let mut scratch = vec![0.0; w.len()];
        for i in [0, 5, 30, 31, 32, 50, 63] {
            let mut plus = w.clone();
            plus[i] += h;
            let mut minus = w.clone();
            minus[i] -= h;
            let numeric = (objective.evaluate(&plus, &mut scratch) - objective.evaluate(&minus, &mut scratch)) / (2.0 * h);
            assert!((numeric - grad[i]).abs() < 1e-4, "coordinate {}: {} vs {}", i, numeric, grad[i]);
        }
    }

    #[test]
    fn test_satisfied_margins_cost_nothing() {
        let mixture = Mixture::new(vec![Model::new(1, 1)]).unwrap();
        let positive = example(0, 1.0);
        let mut w = vec![0.0; mixture.dimension()];
        w[31] = 2.0;
        let objective = Objective::new(&mixture, std::slice::from_ref(&positive), &[], 1.0, 1.0);
        let mut grad = vec![0.0; w.len()];
        assert_eq!(0.0, objective.evaluate(&w, &mut grad));
        assert!(grad.iter().all(|&g| g == 0.0));
    }
}
