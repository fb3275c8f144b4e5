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

//! Small dense vector kernels shared by the scorer and the optimizer.

/// Inner product of two feature vectors, accumulated in double precision.
pub fn vector_inner_product(left: &[f32], right: &[f32]) -> f64 {
    debug_assert_eq!(left.len(), right.len());
    left.iter()
        .zip(right)
        .map(|(&l, &r)| f64::from(l) * f64::from(r))
        .sum()
}

/// Inner product of a parameter vector with a feature vector.
pub fn weighted_sum(weights: &[f64], features: &[f32]) -> f64 {
    debug_assert_eq!(weights.len(), features.len());
    weights
        .iter()
        .zip(features)
        .map(|(&w, &x)| w * f64::from(x))
        .sum()
}

/// `dest += alpha * src`
pub fn axpy(alpha: f64, src: &[f32], dest: &mut [f64]) {
    debug_assert_eq!(src.len(), dest.len());
    for (d, &s) in dest.iter_mut().zip(src) {
        *d += alpha * f64::from(s);
    }
}

pub fn dot(left: &[f64], right: &[f64]) -> f64 {
    debug_assert_eq!(left.len(), right.len());
    left.iter().zip(right).map(|(l, r)| l * r).sum()
}

pub fn squared_norm(vec: &[f64]) -> f64 {
    dot(vec, vec)
}
