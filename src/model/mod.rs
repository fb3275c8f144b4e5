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


mod dt;
mod io;
mod mixture;
mod parts;

pub use self::dt::{distance_transform, PositionMap};
pub use self::io::{load_mixture, read_mixture, save_mixture, write_mixture};
pub use self::mixture::{Mixture, MixtureScores, MixtureSpectra};

use crate::common::Rectangle;
use crate::error::{Error, Result};
use crate::feat::{FeaturePyramid, Filter};
use crate::math::weighted_sum;
use crate::patchwork::{FilterSpectrum, FourierEngine, ScoreMap};

/// Upper bound of the quadratic deformation coefficients.
pub const MAX_QUADRATIC: f32 = -0.01;

/// Quadratic displacement cost `(dy^2, dy, dx^2, dx)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Deformation([f32; 4]);

impl Deformation {
    pub fn new(coefficients: [f32; 4]) -> Self {
        Deformation(coefficients)
    }

    #[inline]
    pub fn coefficients(&self) -> [f32; 4] {
        self.0
    }

    /// Keeps the penalty strictly concave.
    pub fn project(&mut self) {
        self.0[0] = self.0[0].min(MAX_QUADRATIC);
        self.0[2] = self.0[2].min(MAX_QUADRATIC);
    }

    /// Finite, with both quadratic coefficients at most `MAX_QUADRATIC`.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
            && self.0[0] <= MAX_QUADRATIC
            && self.0[2] <= MAX_QUADRATIC
    }

    /// Displacement features of a part placed `(dy, dx)` away from its anchor.
    pub fn features(dy: i64, dx: i64) -> [f32; 4] {
        let (dy, dx) = (dy as f32, dx as f32);
        [dy * dy, dy, dx * dx, dx]
    }
}

impl Default for Deformation {
    fn default() -> Self {
        Deformation([MAX_QUADRATIC, 0.0, MAX_QUADRATIC, 0.0])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    filter: Filter,
    deformation: Deformation,
    offset: (i32, i32),
}

impl Part {
    pub fn new(filter: Filter, deformation: Deformation, offset: (i32, i32)) -> Self {
        Part {
            filter,
            deformation,
            offset,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn deformation(&self) -> &Deformation {
        &self.deformation
    }

    /// Anchor `(row, col)` relative to the root's top-left cell at twice its resolution.
    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    fn dimension(&self) -> usize {
        self.filter.as_slice().len() + 4
    }
}

/// One mixture component.
#[derive(Clone, Debug, PartialEq)]
pub enum Model {
    RootOnly { root: Filter, bias: f32 },
    WithParts { root: Filter, parts: Vec<Part>, bias: f32 },
}

/// Per-level output of scoring one component.
#[derive(Clone, Debug, Default)]
pub struct ComponentScores {
    /// Indexed by level; empty where the component cannot be placed.
    pub scores: Vec<ScoreMap>,
    /// Indexed by `[part][level]`, aligned with `scores`.
    pub positions: Vec<Vec<PositionMap>>,
}

impl ComponentScores {
    /// Part positions of the root placement `(z, y, x)`.
    pub fn part_positions(&self, z: usize, y: usize, x: usize) -> Vec<(usize, usize)> {
        self.positions.iter().map(|levels| levels[z][(y, x)]).collect()
    }
}

impl Model {
    /// A zero root filter of `rows x cols` cells.
    pub fn new(rows: usize, cols: usize) -> Self {
        Model::RootOnly {
            root: Filter::zeros(rows, cols),
            bias: 0.0,
        }
    }

    /// Validates that every part fits within the doubled root.
    pub fn with_parts(root: Filter, parts: Vec<Part>, bias: f32) -> Result<Self> {
        if parts.is_empty() {
            return Ok(Model::RootOnly { root, bias });
        }
        for part in &parts {
            if !part.deformation.is_valid() {
                return Err(Error::InvalidModel(format!(
                    "part deformation {:?} is not strictly concave",
                    part.deformation.coefficients()
                )));
            }
            let (oy, ox) = part.offset;
            if oy < 0
                || ox < 0
                || oy as usize + part.filter.rows() > 2 * root.rows()
                || ox as usize + part.filter.cols() > 2 * root.cols()
            {
                return Err(Error::InvalidModel(format!(
                    "part at {:?} of size {}x{} leaves its {}x{} root",
                    part.offset,
                    part.filter.rows(),
                    part.filter.cols(),
                    root.rows(),
                    root.cols()
                )));
            }
        }
        Ok(Model::WithParts { root, parts, bias })
    }

    pub fn root(&self) -> &Filter {
        match self {
            Model::RootOnly { root, .. } | Model::WithParts { root, .. } => root,
        }
    }

    pub fn parts(&self) -> &[Part] {
        match self {
            Model::RootOnly { .. } => &[],
            Model::WithParts { parts, .. } => parts,
        }
    }

    pub fn bias(&self) -> f32 {
        match self {
            Model::RootOnly { bias, .. } | Model::WithParts { bias, .. } => *bias,
        }
    }

    pub fn has_parts(&self) -> bool {
        matches!(self, Model::WithParts { .. })
    }

    pub fn is_zero(&self) -> bool {
        self.bias() == 0.0
            && self.root().is_zero()
            && self
                .parts()
                .iter()
                .all(|p| p.filter.is_zero() && p.deformation.0.iter().all(|&d| d == 0.0))
    }

    /// Size of the parameter vector, bias included.
    pub fn dimension(&self) -> usize {
        self.root().as_slice().len() + self.parts().iter().map(Part::dimension).sum::<usize>() + 1
    }

    /// Positions of the quadratic deformation weights in the parameter vector.
    pub fn quadratic_indices(&self) -> Vec<usize> {
        let mut indices = Vec::with_capacity(2 * self.parts().len());
        let mut offset = self.root().as_slice().len();
        for part in self.parts() {
            offset += part.filter.as_slice().len();
            indices.push(offset);
            indices.push(offset + 2);
            offset += 4;
        }
        indices
    }

    /// Writes the parameters in sample layout.
    pub fn write_weights(&self, out: &mut Vec<f64>) {
        out.extend(self.root().as_slice().iter().map(|&w| f64::from(w)));
        for part in self.parts() {
            out.extend(part.filter.as_slice().iter().map(|&w| f64::from(w)));
            out.extend(part.deformation.0.iter().map(|&d| f64::from(d)));
        }
        out.push(f64::from(self.bias()));
    }

    /// Loads parameters written by `write_weights`, returning the unread tail.
    pub fn read_weights<'a>(&mut self, weights: &'a [f64]) -> Result<&'a [f64]> {
        if weights.len() < self.dimension() {
            return Err(Error::InvalidModel(format!(
                "expected {} parameters, got {}",
                self.dimension(),
                weights.len()
            )));
        }
        let mut pos = 0;
        let mut take = |dest: &mut [f32]| {
            for d in dest.iter_mut() {
                *d = weights[pos] as f32;
                pos += 1;
            }
        };
        match self {
            Model::RootOnly { root, bias } => {
                take(root.as_mut_slice());
                take(std::slice::from_mut(bias));
            }
            Model::WithParts { root, parts, bias } => {
                take(root.as_mut_slice());
                for part in parts.iter_mut() {
                    take(part.filter.as_mut_slice());
                    take(&mut part.deformation.0);
                    part.deformation.project();
                }
                take(std::slice::from_mut(bias));
            }
        }
        Ok(&weights[pos..])
    }

    /// Score of a sample built by `extract_sample`.
    pub fn dot(&self, sample: &[f32]) -> f64 {
        let mut weights = Vec::with_capacity(self.dimension());
        self.write_weights(&mut weights);
        weighted_sum(&weights, sample)
    }

    /// Spectra of the root followed by every part.
    pub fn transform(&self, engine: &FourierEngine) -> Result<Vec<FilterSpectrum>> {
        std::iter::once(self.root())
            .chain(self.parts().iter().map(|p| &p.filter))
            .map(|f| engine.transform_filter(f))
            .collect()
    }

    /// First level the component can be placed on.
    pub fn first_level(&self, pyramid: &FeaturePyramid) -> usize {
        if self.has_parts() {
            pyramid.interval()
        } else {
            0
        }
    }

    /// Combines the filter responses (root first, then parts, each indexed by level)
    /// into per-level scores.
    pub fn score(&self, pyramid: &FeaturePyramid, responses: &[Vec<ScoreMap>]) -> ComponentScores {
        let nb_levels = pyramid.levels().len();
        let parts = self.parts();
        let first = self.first_level(pyramid);
        let pad = pyramid.padding() as i64;
        let bias = self.bias();

        let mut scores = vec![ScoreMap::empty(); nb_levels];
        let mut positions = vec![vec![PositionMap::empty(); nb_levels]; parts.len()];

        for z in first..nb_levels {
            let root_map = &responses[0][z];
            if root_map.is_empty() {
                continue;
            }
            let mut total = root_map.clone();
            total.as_mut_slice().iter_mut().for_each(|s| *s += bias);

            for (p, part) in parts.iter().enumerate() {
                let (dt, argmax) = distance_transform(&responses[p + 1][z - first], &part.deformation);
                let mut chosen = PositionMap::new(total.rows(), total.cols(), (0, 0));
                let (oy, ox) = (i64::from(part.offset.0), i64::from(part.offset.1));

                for y in 0..total.rows() {
                    for x in 0..total.cols() {
                        let ay = 2 * y as i64 - pad + oy;
                        let ax = 2 * x as i64 - pad + ox;
                        if ay < 0 || ax < 0 || ay as usize >= dt.rows() || ax as usize >= dt.cols() {
                            total[(y, x)] = f32::NEG_INFINITY;
                            continue;
                        }
                        let anchor = (ay as usize, ax as usize);
                        total[(y, x)] += dt[anchor];
                        chosen[(y, x)] = argmax[anchor];
                    }
                }
                positions[p][z] = chosen;
            }
            scores[z] = total;
        }

        ComponentScores { scores, positions }
    }

    /// Anchor of `part` for the root placement `(y, x)`, in part-level cells.
    pub fn anchor(&self, pyramid: &FeaturePyramid, part: &Part, y: usize, x: usize) -> (i64, i64) {
        let pad = pyramid.padding() as i64;
        (
            2 * y as i64 - pad + i64::from(part.offset.0),
            2 * x as i64 - pad + i64::from(part.offset.1),
        )
    }

    /// Feature vector of the placement, laid out like `write_weights`.
    /// Returns `None` when a window leaves its level.
    pub fn extract_sample(
        &self,
        pyramid: &FeaturePyramid,
        z: usize,
        y: usize,
        x: usize,
        part_positions: &[(usize, usize)],
    ) -> Option<Vec<f32>> {
        let levels = pyramid.levels();
        let root = self.root();
        let parts = self.parts();
        if part_positions.len() != parts.len() || (!parts.is_empty() && z < pyramid.interval()) {
            return None;
        }

        let mut sample = Vec::with_capacity(self.dimension());
        let window = levels.get(z)?.block(y, x, root.rows(), root.cols())?;
        sample.extend_from_slice(window.as_slice());

        for (part, &(qy, qx)) in parts.iter().zip(part_positions) {
            let level = &levels[z - pyramid.interval()];
            let window = level.block(qy, qx, part.filter.rows(), part.filter.cols())?;
            sample.extend_from_slice(window.as_slice());
            let (ay, ax) = self.anchor(pyramid, part, y, x);
            sample.extend_from_slice(&Deformation::features(qy as i64 - ay, qx as i64 - ax));
        }

        sample.push(1.0);
        debug_assert_eq!(self.dimension(), sample.len());
        Some(sample)
    }

    /// Image-space box of the root placement `(y, x)` on level `z`.
    pub fn bounding_box(&self, pyramid: &FeaturePyramid, z: usize, y: usize, x: usize) -> Rectangle {
        let s = pyramid.scale(z);
        let pad = pyramid.padding() as f64;
        let root = self.root();
        Rectangle::new(
            ((x as f64 - pad) * s + 0.5).floor() as i32,
            ((y as f64 - pad) * s + 0.5).floor() as i32,
            (root.cols() as f64 * s + 0.5) as u32,
            (root.rows() as f64 * s + 0.5) as u32,
        )
    }
}
