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

use std::cmp;

use image::RgbImage;

use super::{FeatureMap, NB_FEATURES};

const NB_ORIENTATIONS: usize = 9;
const EPS: f32 = 0.0001;
const TRUNCATION: f32 = 0.2;
// 1 / sqrt(18)
const TEXTURE_SCALE: f32 = 0.235_702_26;

// Unit vectors of the 9 contrast-insensitive orientation bins.
const UU: [f32; NB_ORIENTATIONS] = [
    1.0000, 0.9397, 0.7660, 0.5000, 0.1736, -0.1736, -0.5000, -0.7660, -0.9397,
];
const VV: [f32; NB_ORIENTATIONS] = [
    0.0000, 0.3420, 0.6428, 0.8660, 0.9848, 0.9848, 0.8660, 0.6428, 0.3420,
];

/// Computes the (unpadded) HOG feature map of `image` with square cells of
/// `cell_size` pixels. The grid has `(size + cell_size / 2) / cell_size`
/// cells along each axis.
pub fn compute_hog(image: &RgbImage, cell_size: usize) -> FeatureMap {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let rows = (height + cell_size / 2) / cell_size;
    let cols = (width + cell_size / 2) / cell_size;

    if rows == 0 || cols == 0 || width < 3 || height < 3 {
        return FeatureMap::zeros(rows, cols);
    }

    let hist = orientation_histograms(image, cell_size, rows, cols);
    let energy = cell_energy(&hist, rows, cols);
    normalize(&hist, &energy, rows, cols)
}

/// 18 contrast-sensitive orientation histograms per cell, with bilinear
/// spatial interpolation of every pixel's vote.
fn orientation_histograms(image: &RgbImage, cell_size: usize, rows: usize, cols: usize) -> Vec<f32> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut hist = vec![0.0f32; rows * cols * 2 * NB_ORIENTATIONS];
    let cell = cell_size as f32;

    let visible_y = cmp::min(height, rows * cell_size);
    let visible_x = cmp::min(width, cols * cell_size);

    let pixel = |x: usize, y: usize| image.get_pixel(x as u32, y as u32).0;

    for y in 1..visible_y.saturating_sub(1) {
        for x in 1..visible_x.saturating_sub(1) {
            let left = pixel(x - 1, y);
            let right = pixel(x + 1, y);
            let up = pixel(x, y - 1);
            let down = pixel(x, y + 1);

            // Gradient of the colour channel with the largest magnitude
            let mut dx = 0.0f32;
            let mut dy = 0.0f32;
            let mut v = -1.0f32;
            for c in 0..3 {
                let gx = f32::from(right[c]) - f32::from(left[c]);
                let gy = f32::from(down[c]) - f32::from(up[c]);
                let m = gx * gx + gy * gy;
                if m > v {
                    v = m;
                    dx = gx;
                    dy = gy;
                }
            }

            if v <= 0.0 {
                continue;
            }

            let mut best_dot = 0.0f32;
            let mut best_o = 0;
            for o in 0..NB_ORIENTATIONS {
                let dot = UU[o] * dx + VV[o] * dy;
                if dot > best_dot {
                    best_dot = dot;
                    best_o = o;
                } else if -dot > best_dot {
                    best_dot = -dot;
                    best_o = o + NB_ORIENTATIONS;
                }
            }

            let magnitude = v.sqrt();
            let xp = (x as f32 + 0.5) / cell - 0.5;
            let yp = (y as f32 + 0.5) / cell - 0.5;
            let ixp = xp.floor() as i64;
            let iyp = yp.floor() as i64;
            let vx0 = xp - ixp as f32;
            let vy0 = yp - iyp as f32;
            let vx1 = 1.0 - vx0;
            let vy1 = 1.0 - vy0;

            let mut vote = |cy: i64, cx: i64, weight: f32| {
                if cy >= 0 && cx >= 0 && (cy as usize) < rows && (cx as usize) < cols {
                    let i = ((cy as usize * cols + cx as usize) * 2 * NB_ORIENTATIONS) + best_o;
                    hist[i] += weight * magnitude;
                }
            };

            vote(iyp, ixp, vx1 * vy1);
            vote(iyp, ixp + 1, vx0 * vy1);
            vote(iyp + 1, ixp, vx1 * vy0);
            vote(iyp + 1, ixp + 1, vx0 * vy0);
        }
    }

    hist
}

/// Squared norm of the contrast-insensitive histogram of each cell.
fn cell_energy(hist: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    (0..rows * cols)
        .map(|i| {
            let h = &hist[i * 2 * NB_ORIENTATIONS..(i + 1) * 2 * NB_ORIENTATIONS];
            (0..NB_ORIENTATIONS)
                .map(|o| {
                    let s = h[o] + h[o + NB_ORIENTATIONS];
                    s * s
                })
                .sum()
        })
        .collect()
}

fn normalize(hist: &[f32], energy: &[f32], rows: usize, cols: usize) -> FeatureMap {
    let mut features = FeatureMap::zeros(rows, cols);
    let clamp_row = |y: i64| num::clamp(y, 0, rows as i64 - 1) as usize;
    let clamp_col = |x: i64| num::clamp(x, 0, cols as i64 - 1) as usize;
    let block_norm = |y: i64, x: i64| {
        let (y0, y1) = (clamp_row(y), clamp_row(y + 1));
        let (x0, x1) = (clamp_col(x), clamp_col(x + 1));
        let sum = energy[y0 * cols + x0]
            + energy[y0 * cols + x1]
            + energy[y1 * cols + x0]
            + energy[y1 * cols + x1];
        1.0 / (sum + EPS).sqrt()
    };

    for y in 0..rows {
        for x in 0..cols {
            let (yi, xi) = (y as i64, x as i64);
            let norms = [
                block_norm(yi, xi),
                block_norm(yi, xi - 1),
                block_norm(yi - 1, xi),
                block_norm(yi - 1, xi - 1),
            ];
            let h = &hist[(y * cols + x) * 2 * NB_ORIENTATIONS..(y * cols + x + 1) * 2 * NB_ORIENTATIONS];
            let cell = features.cell_mut(y, x);
            let mut texture = [0.0f32; 4];

            for o in 0..2 * NB_ORIENTATIONS {
                let mut sum = 0.0;
                for (t, n) in texture.iter_mut().zip(norms.iter()) {
                    let v = (h[o] * n).min(TRUNCATION);
                    sum += v;
                    *t += v;
                }
                cell[o] = 0.5 * sum;
            }

            for o in 0..NB_ORIENTATIONS {
                let s = h[o] + h[o + NB_ORIENTATIONS];
                let sum: f32 = norms.iter().map(|n| (s * n).min(TRUNCATION)).sum();
                cell[2 * NB_ORIENTATIONS + o] = 0.5 * sum;
            }

            for (j, t) in texture.iter().enumerate() {
                cell[3 * NB_ORIENTATIONS + j] = TEXTURE_SCALE * t;
            }
        }
    }

    debug_assert_eq!(3 * NB_ORIENTATIONS + 4, NB_FEATURES);
    features
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::compute_hog;
    use crate::feat::NB_FEATURES;

    #[test]
    fn test_grid_size_rounds_to_nearest_cell() {
        let image = RgbImage::new(35, 20);
        let hog = compute_hog(&image, 8);
        assert_eq!((3, 4), (hog.rows(), hog.cols()));
    }

    #[test]
    fn test_flat_image_has_no_features() {
        let image = RgbImage::from_pixel(32, 32, Rgb([90, 90, 90]));
        assert!(compute_hog(&image, 8).is_zero());
    }

    #[test]
    fn test_vertical_edge_votes_horizontal_gradient() {
        let image = RgbImage::from_fn(32, 32, |x, _| {
            if x < 16 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let hog = compute_hog(&image, 8);
        let cell = hog.cell(1, 1);
        // Orientation 0 (pointing right) dominates the sensitive bins.
        let best = (0..18)
            .max_by(|&a, &b| cell[a].partial_cmp(&cell[b]).unwrap())
            .unwrap();
        assert_eq!(0, best);
        assert!(cell.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert_eq!(NB_FEATURES, cell.len());
    }
}
