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


use rand::Rng;

use super::{Deformation, Model, Part};
use crate::common::Matrix;
use crate::feat::{Filter, NB_FEATURES};

const NB_RESTARTS: usize = 10;
const MOVES_PER_PART: usize = 100;

impl Model {
    /// Turns a root-only component into one with `nb_parts` parts of
    /// `part_size` cells cut from the doubled root. Components that already
    /// have parts are returned unchanged.
    pub fn into_parts<R: Rng>(self, nb_parts: usize, part_size: (usize, usize), rng: &mut R) -> Model {
        let (root, bias) = match self {
            Model::RootOnly { root, bias } => (root, bias),
            with_parts => return with_parts,
        };
        if nb_parts == 0 || root.is_empty() {
            return Model::RootOnly { root, bias };
        }

        let doubled = upsample(&root);
        let rows = part_size.0.clamp(1, doubled.rows());
        let cols = part_size.1.clamp(1, doubled.cols());
        let energy = energy(&doubled);

        let positions = place(&energy, nb_parts, (rows, cols), rng);
        let parts = positions
            .into_iter()
            .filter_map(|(y, x)| {
                let filter = doubled.block(y, x, rows, cols)?;
                Some(Part::new(filter, Deformation::default(), (y as i32, x as i32)))
            })
            .collect();

        Model::WithParts { root, parts, bias }
    }
}

/// Bilinear x2 upsampling.
fn upsample(filter: &Filter) -> Filter {
    let (rows, cols) = (filter.rows(), filter.cols());
    let mut out = Filter::zeros(2 * rows, 2 * cols);

    let source = |i: usize, n: usize| {
        let s = ((i as f32 + 0.5) / 2.0 - 0.5).clamp(0.0, (n - 1) as f32);
        let lo = s.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        (lo, hi, s - lo as f32)
    };

    for y in 0..2 * rows {
        let (y0, y1, fy) = source(y, rows);
        for x in 0..2 * cols {
            let (x0, x1, fx) = source(x, cols);
            let cell = out.cell_mut(y, x);
            for f in 0..NB_FEATURES {
                cell[f] = (1.0 - fy) * ((1.0 - fx) * filter.cell(y0, x0)[f] + fx * filter.cell(y0, x1)[f])
                    + fy * ((1.0 - fx) * filter.cell(y1, x0)[f] + fx * filter.cell(y1, x1)[f]);
            }
        }
    }
    out
}

/// Positive energy of every cell.
fn energy(filter: &Filter) -> Matrix<f64> {
    let mut energy = Matrix::new(filter.rows(), filter.cols(), 0.0);
    for y in 0..filter.rows() {
        for x in 0..filter.cols() {
            energy[(y, x)] = filter
                .cell(y, x)
                .iter()
                .map(|&w| f64::from(w.max(0.0)).powi(2))
                .sum();
        }
    }
    energy
}

fn place<R: Rng>(energy: &Matrix<f64>, nb_parts: usize, size: (usize, usize), rng: &mut R) -> Vec<(usize, usize)> {
    let mut remaining = energy.clone();
    let mut greedy = Vec::with_capacity(nb_parts);
    for _ in 0..nb_parts {
        let best = best_window(&remaining, size);
        clear(&mut remaining, best, size);
        greedy.push(best);
    }

    let mut best = greedy.clone();
    let mut best_cover = cover(energy, &best, size);

    for _ in 0..NB_RESTARTS {
        let mut current = greedy.clone();
        for _ in 0..MOVES_PER_PART * nb_parts {
            let moved = rng.gen_range(0..nb_parts);
            let mut remaining = energy.clone();
            for (i, &position) in current.iter().enumerate() {
                if i != moved {
                    clear(&mut remaining, position, size);
                }
            }
            current[moved] = best_window(&remaining, size);
        }
        let c = cover(energy, &current, size);
        if c > best_cover {
            best_cover = c;
            best = current;
        }
    }

    best
}

/// Top-left corner of the window holding the most energy; the first one on ties.
fn best_window(energy: &Matrix<f64>, (rows, cols): (usize, usize)) -> (usize, usize) {
    // Summed-area table with a leading zero row and column.
    let mut table = Matrix::new(energy.rows() + 1, energy.cols() + 1, 0.0);
    for y in 0..energy.rows() {
        for x in 0..energy.cols() {
            table[(y + 1, x + 1)] = energy[(y, x)] + table[(y, x + 1)] + table[(y + 1, x)] - table[(y, x)];
        }
    }

    let mut best = (0, 0);
    let mut best_sum = f64::NEG_INFINITY;
    for y in 0..=energy.rows() - rows {
        for x in 0..=energy.cols() - cols {
            let sum = table[(y + rows, x + cols)] - table[(y, x + cols)] - table[(y + rows, x)] + table[(y, x)];
            if sum > best_sum {
                best_sum = sum;
                best = (y, x);
            }
        }
    }
    best
}

fn clear(energy: &mut Matrix<f64>, (y, x): (usize, usize), (rows, cols): (usize, usize)) {
    for r in y..y + rows {
        energy.row_mut(r)[x..x + cols].iter_mut().for_each(|e| *e = 0.0);
    }
}

/// Energy of the union of the windows.
fn cover(energy: &Matrix<f64>, positions: &[(usize, usize)], size: (usize, usize)) -> f64 {
    let mut covered = Matrix::new(energy.rows(), energy.cols(), false);
    for &(y, x) in positions {
        for r in y..y + size.0 {
            covered.row_mut(r)[x..x + size.1].iter_mut().for_each(|c| *c = true);
        }
    }
    energy
        .as_slice()
        .iter()
        .zip(covered.as_slice())
        .filter(|(_, c)| **c)
        .map(|(e, _)| e)
        .sum()
}
