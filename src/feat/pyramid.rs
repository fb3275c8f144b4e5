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

use image::imageops::{self, FilterType};
use image::RgbImage;
use log::debug;

use super::{compute_hog, FeatureMap};
use crate::common::{par_map, Seq};
use crate::error::{Error, Result};

/// Smallest image side, in pixels, that one octave of the pyramid needs.
const MIN_OCTAVE_SIZE: f64 = 40.0;

/// Multi-scale stack of padded HOG feature maps, ordered finest to coarsest.
///
/// The first `interval` levels use 4 pixel cells, which gives part filters
/// twice the resolution of the root filter scored `interval` levels higher.
#[derive(Clone, Debug)]
pub struct FeaturePyramid {
    padding: usize,
    interval: usize,
    levels: Vec<FeatureMap>,
    scales: Vec<f64>,
}

impl FeaturePyramid {
    pub fn new(image: &RgbImage, padding: usize, interval: usize) -> Result<Self> {
        if padding < 2 {
            return Err(Error::Config(format!("padding must be at least 2, got {}", padding)));
        }
        if interval == 0 {
            return Err(Error::Config("interval must be positive".to_string()));
        }

        let width = image.width();
        let height = image.height();
        let min_side = f64::from(width.min(height));
        let max_scale = if min_side > 0.0 {
            ((min_side / MIN_OCTAVE_SIZE).log2() * interval as f64).ceil() as i64
        } else {
            -1
        };

        if max_scale < interval as i64 {
            debug!("image {}x{} too small for a pyramid", width, height);
            return Ok(FeaturePyramid {
                padding,
                interval,
                levels: Vec::new(),
                scales: Vec::new(),
            });
        }

        let max_scale = max_scale as usize;
        let octaves = par_map(interval, |i| {
            let base = 2f64.powf(-(i as f64) / interval as f64);
            let scaled = rescale(image, base);
            let mut out = vec![(i, compute_hog(&scaled, 4).pad(padding), 4.0 / base)];

            for (j, scale) in Seq::new(base, |s| s * 0.5).enumerate() {
                let z = i + (j + 1) * interval;
                if z > max_scale {
                    break;
                }
                let scaled = if j == 0 { scaled.clone() } else { rescale(image, scale) };
                out.push((z, compute_hog(&scaled, 8).pad(padding), 8.0 / scale));
            }
            out
        });

        let mut levels = vec![FeatureMap::zeros(0, 0); max_scale + 1];
        let mut scales = vec![0.0; max_scale + 1];
        for (z, level, scale) in octaves.into_iter().flatten() {
            levels[z] = level;
            scales[z] = scale;
        }

        Ok(FeaturePyramid {
            padding,
            interval,
            levels,
            scales,
        })
    }

    /// Builds a pyramid from precomputed, already padded levels.
    pub fn from_levels(padding: usize, interval: usize, levels: Vec<FeatureMap>) -> Self {
        let scales = (0..levels.len())
            .map(|z| 2f64.powf(z as f64 / interval as f64 + 2.0))
            .collect();
        FeaturePyramid {
            padding,
            interval,
            levels,
            scales,
        }
    }

    #[inline]
    pub fn padding(&self) -> usize {
        self.padding
    }

    #[inline]
    pub fn interval(&self) -> usize {
        self.interval
    }

    #[inline]
    pub fn levels(&self) -> &[FeatureMap] {
        &self.levels
    }

    /// Image pixels covered by one cell of level `z`.
    #[inline]
    pub fn scale(&self, z: usize) -> f64 {
        self.scales[z]
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Size of the largest (first) level a `width x height` image produces,
    /// including padding on both sides.
    pub fn max_level_size(width: u32, height: u32, padding: usize) -> (usize, usize) {
        (
            (height as usize + 2) / 4 + 2 * padding,
            (width as usize + 2) / 4 + 2 * padding,
        )
    }
}

fn rescale(image: &RgbImage, scale: f64) -> RgbImage {
    if (scale - 1.0).abs() < f64::EPSILON {
        return image.clone();
    }
    let width = ((f64::from(image.width()) * scale + 0.5) as u32).max(1);
    let height = ((f64::from(image.height()) * scale + 0.5) as u32).max(1);
    imageops::resize(image, width, height, FilterType::Triangle)
}
