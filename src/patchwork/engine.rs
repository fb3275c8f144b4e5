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

use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::error::{Error, Result};
use crate::feat::{Filter, NB_FEATURES};

/// Transform sizes are rounded up to a multiple of this.
const ALIGNMENT: usize = 16;

/// Upper bound on the number of complex values of one transformed plane.
const MAX_PLANE_VALUES: usize = 1 << 28;

/// Owner of the transform plans, sized once for the largest feature level
/// of a run and shared read-only by every convolution afterwards.
#[derive(Clone)]
pub struct FourierEngine {
    rows: usize,
    cols: usize,
    row_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for FourierEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FourierEngine")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl FourierEngine {
    /// Plans transforms able to hold a `max_rows x max_cols` feature level.
    pub fn new(max_rows: usize, max_cols: usize) -> Result<Self> {
        let engine_error = |msg: String| Error::Engine {
            rows: max_rows,
            cols: max_cols,
            msg,
        };

        if max_rows == 0 || max_cols == 0 {
            return Err(engine_error("dimensions must be positive".to_string()));
        }

        let rows = align(max_rows).ok_or_else(|| engine_error("size overflow".to_string()))?;
        let cols = align(max_cols).ok_or_else(|| engine_error("size overflow".to_string()))?;
        let values = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(NB_FEATURES))
            .filter(|&n| n <= MAX_PLANE_VALUES)
            .ok_or_else(|| engine_error("plane too large".to_string()))?;

        // Make sure at least one transformed plane can be allocated.
        let mut probe: Vec<Complex32> = Vec::new();
        probe
            .try_reserve_exact(values)
            .map_err(|e| engine_error(e.to_string()))?;

        let mut planner = FftPlanner::new();
        Ok(FourierEngine {
            rows,
            cols,
            row_forward: planner.plan_fft_forward(cols),
            row_inverse: planner.plan_fft_inverse(cols),
            col_forward: planner.plan_fft_forward(rows),
            col_inverse: planner.plan_fft_inverse(rows),
        })
    }

    /// Engine large enough for the first level of every listed image size.
    pub fn for_image_sizes<I>(sizes: I, padding: usize) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let (rows, cols) = sizes
            .into_iter()
            .map(|(w, h)| crate::feat::FeaturePyramid::max_level_size(w, h, padding))
            .fold((0, 0), |(r, c), (lr, lc)| (r.max(lr), c.max(lc)));
        Self::new(rows, cols)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// In-place 2-D transform of a `rows x cols` row-major buffer. The
    /// inverse transform is normalized.
    pub(crate) fn fft2d(&self, buf: &mut [Complex32], inverse: bool) {
        debug_assert_eq!(buf.len(), self.rows * self.cols);
        let (row_fft, col_fft) = if inverse {
            (&self.row_inverse, &self.col_inverse)
        } else {
            (&self.row_forward, &self.col_forward)
        };

        row_fft.process(buf);

        let mut transposed = vec![Complex32::new(0.0, 0.0); buf.len()];
        transpose(buf, &mut transposed, self.rows, self.cols);
        col_fft.process(&mut transposed);
        transpose(&transposed, buf, self.cols, self.rows);

        if inverse {
            let norm = 1.0 / (self.rows * self.cols) as f32;
            buf.iter_mut().for_each(|v| *v *= norm);
        }
    }

    /// Transforms `filter` for correlation against any patchwork built by
    /// this engine.
    pub fn transform_filter(&self, filter: &Filter) -> Result<FilterSpectrum> {
        if filter.rows() > self.rows || filter.cols() > self.cols {
            return Err(Error::LevelTooLarge {
                rows: filter.rows(),
                cols: filter.cols(),
                max_rows: self.rows,
                max_cols: self.cols,
            });
        }

        let plane_len = self.rows * self.cols;
        let mut data = vec![Complex32::new(0.0, 0.0); NB_FEATURES * plane_len];
        for y in 0..filter.rows() {
            for x in 0..filter.cols() {
                for (f, &v) in filter.cell(y, x).iter().enumerate() {
                    data[f * plane_len + y * self.cols + x] = Complex32::new(v, 0.0);
                }
            }
        }
        for feature in data.chunks_mut(plane_len) {
            self.fft2d(feature, false);
            // Correlation multiplies by the conjugate spectrum.
            feature.iter_mut().for_each(|v| *v = v.conj());
        }

        Ok(FilterSpectrum {
            rows: filter.rows(),
            cols: filter.cols(),
            data,
        })
    }
}

/// Conjugated transform of one filter.
#[derive(Clone, Debug)]
pub struct FilterSpectrum {
    rows: usize,
    cols: usize,
    data: Vec<Complex32>,
}

impl FilterSpectrum {
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub(crate) fn data(&self) -> &[Complex32] {
        &self.data
    }
}

fn align(n: usize) -> Option<usize> {
    n.checked_add(ALIGNMENT - 1).map(|v| v & !(ALIGNMENT - 1))
}

fn transpose(src: &[Complex32], dest: &mut [Complex32], rows: usize, cols: usize) {
    for y in 0..rows {
        for x in 0..cols {
            dest[x * rows + y] = src[y * cols + x];
        }
    }
}
