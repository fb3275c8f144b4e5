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

//! Generalized distance transform of part responses.

use crate::common::Matrix;
use crate::patchwork::ScoreMap;

use super::Deformation;

/// Best placement of a part, per candidate anchor, in part-level cells.
pub type PositionMap = Matrix<(usize, usize)>;

/// For every anchor `p` of `responses`, computes
/// `max_q responses(q) + d0 * dy^2 + d1 * dy + d2 * dx^2 + d3 * dx` with
/// `(dy, dx) = q - p`, together with the maximizing `q`.
///
/// Runs the separable lower envelope algorithm: rows first, then columns.
pub fn distance_transform(responses: &ScoreMap, deformation: &Deformation) -> (ScoreMap, PositionMap) {
    let rows = responses.rows();
    let cols = responses.cols();
    if responses.is_empty() {
        return (ScoreMap::empty(), PositionMap::empty());
    }

    let [d_yy, d_y, d_xx, d_x] = deformation.coefficients();
    let mut envelope = Envelope::with_capacity(rows.max(cols));

    // Horizontal pass
    let mut tmp = ScoreMap::new(rows, cols, 0.0);
    let mut arg_x = Matrix::new(rows, cols, 0usize);
    for y in 0..rows {
        envelope.transform(
            responses.row(y),
            tmp.row_mut(y),
            arg_x.row_mut(y),
            -f64::from(d_xx),
            f64::from(d_x),
        );
    }

    // Vertical pass
    let mut out = ScoreMap::new(rows, cols, 0.0);
    let mut positions = PositionMap::new(rows, cols, (0, 0));
    let mut column = vec![0.0f32; rows];
    let mut column_out = vec![0.0f32; rows];
    let mut arg_y = vec![0usize; rows];
    for x in 0..cols {
        for y in 0..rows {
            column[y] = tmp[(y, x)];
        }
        envelope.transform(&column, &mut column_out, &mut arg_y, -f64::from(d_yy), f64::from(d_y));
        for y in 0..rows {
            let qy = arg_y[y];
            out[(y, x)] = column_out[y];
            positions[(y, x)] = (qy, arg_x[(qy, x)]);
        }
    }

    (out, positions)
}

/// Scratch space of the 1-D transform.
struct Envelope {
    v: Vec<usize>,
    z: Vec<f64>,
}

impl Envelope {
    fn with_capacity(n: usize) -> Self {
        Envelope {
            v: vec![0; n],
            z: vec![0.0; n + 1],
        }
    }

    /// `out[p] = max_q vals[q] - a * (p - q)^2 - b * (p - q)`, `a > 0`.
    fn transform(&mut self, vals: &[f32], out: &mut [f32], arg: &mut [usize], a: f64, b: f64) {
        let n = vals.len();
        if n == 0 {
            return;
        }

        let intercept = |q: usize| {
            let q = q as f64;
            f64::from(vals[q as usize]) - a * q * q + b * q
        };
        let intersect = |r: usize, q: usize| (intercept(r) - intercept(q)) / (2.0 * a * (q - r) as f64);

        let v = &mut self.v;
        let z = &mut self.z;
        let mut k = 0;
        v[0] = 0;
        z[0] = f64::NEG_INFINITY;
        z[1] = f64::INFINITY;

        for q in 1..n {
            let mut s = intersect(v[k], q);
            while k > 0 && s <= z[k] {
                k -= 1;
                s = intersect(v[k], q);
            }
            k += 1;
            v[k] = q;
            z[k] = s;
            z[k + 1] = f64::INFINITY;
        }

        k = 0;
        for p in 0..n {
            while z[k + 1] < p as f64 {
                k += 1;
            }
            let q = v[k];
            let d = p as f64 - q as f64;
            out[p] = (f64::from(vals[q]) - a * d * d - b * d) as f32;
            arg[p] = q;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::distance_transform;
    use crate::model::Deformation;
    use crate::patchwork::ScoreMap;

    fn brute_force(map: &ScoreMap, d: &Deformation, y: usize, x: usize) -> f32 {
        let [a, b, c, e] = d.coefficients();
        let mut best = f32::NEG_INFINITY;
        for (qy, qx, &v) in map.indexed_iter() {
            let dy = qy as f32 - y as f32;
            let dx = qx as f32 - x as f32;
            best = best.max(v + a * dy * dy + b * dy + c * dx * dx + e * dx);
        }
        best
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(5);
        let data = (0..9 * 13).map(|_| rng.gen_range(-2.0..2.0)).collect();
        let map = ScoreMap::from_vec(9, 13, data);
        let deformation = Deformation::new([-0.3, 0.1, -0.05, -0.2]);

        let (out, positions) = distance_transform(&map, &deformation);

        for y in 0..9 {
            for x in 0..13 {
                let expected = brute_force(&map, &deformation, y, x);
                assert!((expected - out[(y, x)]).abs() < 1e-4);
                let (qy, qx) = positions[(y, x)];
                let dy = qy as f32 - y as f32;
                let dx = qx as f32 - x as f32;
                let achieved = map[(qy, qx)] - 0.3 * dy * dy + 0.1 * dy - 0.05 * dx * dx - 0.2 * dx;
                assert!((expected - achieved).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_flat_map_stays_in_place() {
        let map = ScoreMap::new(4, 5, 1.5);
        let (out, positions) = distance_transform(&map, &Deformation::default());
        for (y, x, &v) in out.indexed_iter() {
            assert_eq!(1.5, v);
            assert_eq!((y, x), positions[(y, x)]);
        }
    }

    #[test]
    fn test_empty_map() {
        let (out, positions) = distance_transform(&ScoreMap::empty(), &Deformation::default());
        assert!(out.is_empty() && positions.is_empty());
    }

    #[test]
    fn test_flat_deformation_keeps_positions_in_range() {
        let mut rng = StdRng::seed_from_u64(9);
        let data = (0..6 * 73).map(|_| rng.gen_range(-2.0..2.0)).collect();
        let map = ScoreMap::from_vec(6, 73, data);
        for d in [[0.0, 0.0, 0.0, 0.0], [0.5, 0.0, 0.5, 0.0], [f32::NAN; 4]] {
            let (out, positions) = distance_transform(&map, &Deformation::new(d));
            assert_eq!((6, 73), (out.rows(), out.cols()));
            for (_, _, &(qy, qx)) in positions.indexed_iter() {
                assert!(qy < 6 && qx < 73);
            }
        }
    }
}
