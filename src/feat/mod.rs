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

//! Histogram-of-oriented-gradient feature maps and pyramids.

mod hog;
mod pyramid;

pub use self::hog::compute_hog;
pub use self::pyramid::FeaturePyramid;

/// Length of the feature vector stored in every cell.
pub const NB_FEATURES: usize = 31;

/// A rows x cols grid of `NB_FEATURES`-dimensional cells.
///
/// The same type stores pyramid levels and filters.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMap {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

/// Linear filter weights, laid out like a feature map.
pub type Filter = FeatureMap;

impl FeatureMap {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        FeatureMap {
            rows,
            cols,
            data: vec![0.0; rows * cols * NB_FEATURES],
        }
    }

    /// Returns `None` when `data` does not hold `rows * cols` cells.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != rows * cols * NB_FEATURES {
            return None;
        }
        Some(FeatureMap { rows, cols, data })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    #[inline]
    pub fn cell(&self, y: usize, x: usize) -> &[f32] {
        let start = (y * self.cols + x) * NB_FEATURES;
        &self.data[start..start + NB_FEATURES]
    }

    #[inline]
    pub fn cell_mut(&mut self, y: usize, x: usize) -> &mut [f32] {
        let start = (y * self.cols + x) * NB_FEATURES;
        &mut self.data[start..start + NB_FEATURES]
    }

    /// One row of cells, `cols * NB_FEATURES` values.
    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        let len = self.cols * NB_FEATURES;
        &self.data[y * len..(y + 1) * len]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    /// Copies the `rows x cols` window whose top-left cell is `(y, x)`.
    /// Returns `None` if the window leaves the map.
    pub fn block(&self, y: usize, x: usize, rows: usize, cols: usize) -> Option<FeatureMap> {
        if y + rows > self.rows || x + cols > self.cols {
            return None;
        }
        let mut data = Vec::with_capacity(rows * cols * NB_FEATURES);
        for r in y..y + rows {
            let row = self.row(r);
            data.extend_from_slice(&row[x * NB_FEATURES..(x + cols) * NB_FEATURES]);
        }
        Some(FeatureMap { rows, cols, data })
    }

    /// Surrounds the map with `padding` zero cells on every side.
    pub fn pad(&self, padding: usize) -> FeatureMap {
        let mut padded = FeatureMap::zeros(self.rows + 2 * padding, self.cols + 2 * padding);
        let row_len = self.cols * NB_FEATURES;
        for y in 0..self.rows {
            let start = ((y + padding) * padded.cols + padding) * NB_FEATURES;
            padded.data[start..start + row_len].copy_from_slice(self.row(y));
        }
        padded
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureMap, NB_FEATURES};

    fn ramp(rows: usize, cols: usize) -> FeatureMap {
        let data = (0..rows * cols * NB_FEATURES).map(|i| i as f32).collect();
        FeatureMap::from_vec(rows, cols, data).unwrap()
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(FeatureMap::from_vec(2, 2, vec![0.0; 3]).is_none());
    }

    #[test]
    fn test_block() {
        let map = ramp(4, 5);
        let block = map.block(1, 2, 2, 3).unwrap();
        assert_eq!(map.cell(1, 2), block.cell(0, 0));
        assert_eq!(map.cell(2, 4), block.cell(1, 2));
        assert!(map.block(3, 0, 2, 1).is_none());
    }

    #[test]
    fn test_pad() {
        let map = ramp(2, 3);
        let padded = map.pad(2);
        assert_eq!((6, 7), (padded.rows(), padded.cols()));
        assert!(padded.cell(0, 0).iter().all(|&v| v == 0.0));
        assert!(padded.cell(5, 6).iter().all(|&v| v == 0.0));
        assert_eq!(map.cell(1, 2), padded.cell(3, 4));
    }
}
