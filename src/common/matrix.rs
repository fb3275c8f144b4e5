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

use std::ops::{Index, IndexMut};

/// Dense row-major 2-D grid.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Clone> Matrix<T> {
    pub fn new(rows: usize, cols: usize, value: T) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }
}

impl<T> Matrix<T> {
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(rows * cols, data.len(), "matrix data does not match its shape");
        Matrix { rows, cols, data }
    }

    pub fn empty() -> Self {
        Matrix {
            rows: 0,
            cols: 0,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.data[y * self.cols..(y + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        &mut self.data[y * self.cols..(y + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Row-major iteration as `(row, col, value)`.
    pub fn indexed_iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let cols = self.cols;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, v)| (i / cols, i % cols, v))
    }
}

impl<T> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, (y, x): (usize, usize)) -> &T {
        &self.data[y * self.cols + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T> {
    #[inline]
    fn index_mut(&mut self, (y, x): (usize, usize)) -> &mut T {
        &mut self.data[y * self.cols + x]
    }
}

#[cfg(test)]
mod tests {
    use super::Matrix;

    #[test]
    fn test_indexing_is_row_major() {
        let mut m = Matrix::new(2, 3, 0);
        m[(1, 2)] = 7;
        assert_eq!(&[0, 0, 7], m.row(1));
        assert_eq!(7, m.as_slice()[5]);
    }

    #[test]
    fn test_indexed_iter() {
        let m = Matrix::from_vec(2, 2, vec![1, 2, 3, 4]);
        let cells: Vec<_> = m.indexed_iter().map(|(y, x, v)| (y, x, *v)).collect();
        assert_eq!(vec![(0, 0, 1), (0, 1, 2), (1, 0, 3), (1, 1, 4)], cells);
    }
}
