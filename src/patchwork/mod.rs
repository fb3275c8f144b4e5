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

//! Fourier-domain convolution of feature pyramids with banks of filters.
//!
//! All the levels of a pyramid are packed into a few planes of a fixed size
//! (a patchwork), each plane is transformed once per feature, every filter is
//! transformed once, and the response of one filter over one plane costs a
//! single inverse transform. A packed level is never split, so a valid
//! correlation window stays inside its own rectangle and the circular nature
//! of the discrete transform never contaminates a valid position.

mod engine;
mod packing;

pub use self::engine::{FilterSpectrum, FourierEngine};

use rustfft::num_complex::Complex32;

use self::packing::{pack, Placement};
use crate::common::{par_map, Matrix};
use crate::error::{Error, Result};
use crate::feat::{FeatureMap, FeaturePyramid, Filter, NB_FEATURES};
use crate::math::vector_inner_product;

/// Per-location filter responses.
pub type ScoreMap = Matrix<f32>;

/// The levels of one pyramid, packed and transformed.
pub struct Patchwork {
    planes: Vec<Vec<Complex32>>,
    placements: Vec<Option<Placement>>,
}

impl Patchwork {
    pub fn new(engine: &FourierEngine, pyramid: &FeaturePyramid) -> Result<Self> {
        Self::from_levels(engine, pyramid.levels())
    }

    pub fn from_levels(engine: &FourierEngine, levels: &[FeatureMap]) -> Result<Self> {
        let (rows, cols) = (engine.rows(), engine.cols());

        if let Some(level) = levels.iter().find(|l| l.rows() > rows || l.cols() > cols) {
            return Err(Error::LevelTooLarge {
                rows: level.rows(),
                cols: level.cols(),
                max_rows: rows,
                max_cols: cols,
            });
        }

        let sizes: Vec<(usize, usize)> = levels.iter().map(|l| (l.rows(), l.cols())).collect();
        let (placements, nb_planes) = pack(&sizes, rows, cols);

        let planes = par_map(nb_planes, |p| {
            let mut plane = vec![Complex32::new(0.0, 0.0); NB_FEATURES * rows * cols];
            for (level, placement) in levels.iter().zip(&placements) {
                let placement = match placement {
                    Some(placement) if placement.plane == p => placement,
                    _ => continue,
                };
                for y in 0..level.rows() {
                    for x in 0..level.cols() {
                        let offset = (placement.y + y) * cols + placement.x + x;
                        for (f, &v) in level.cell(y, x).iter().enumerate() {
                            plane[f * rows * cols + offset] = Complex32::new(v, 0.0);
                        }
                    }
                }
            }
            for feature in plane.chunks_mut(rows * cols) {
                engine.fft2d(feature, false);
            }
            plane
        });

        Ok(Patchwork { planes, placements })
    }

    pub fn nb_planes(&self) -> usize {
        self.planes.len()
    }

    /// Valid cross-correlation of every filter with every level, indexed
    /// `[filter][level]`. A filter larger than a level yields an empty map.
    pub fn convolve(&self, engine: &FourierEngine, filters: &[FilterSpectrum]) -> Vec<Vec<ScoreMap>> {
        par_map(filters.len(), |i| self.convolve_one(engine, &filters[i]))
    }

    fn convolve_one(&self, engine: &FourierEngine, filter: &FilterSpectrum) -> Vec<ScoreMap> {
        let (rows, cols) = (engine.rows(), engine.cols());
        let plane_len = rows * cols;
        let mut maps = vec![ScoreMap::empty(); self.placements.len()];
        let fits = |p: &Placement| p.rows >= filter.rows() && p.cols >= filter.cols();

        for (index, plane) in self.planes.iter().enumerate() {
            if !self
                .placements
                .iter()
                .flatten()
                .any(|p| p.plane == index && fits(p))
            {
                continue;
            }

            let mut product = vec![Complex32::new(0.0, 0.0); plane_len];
            for (level_feature, filter_feature) in plane
                .chunks(plane_len)
                .zip(filter.data().chunks(plane_len))
            {
                for ((acc, l), f) in product.iter_mut().zip(level_feature).zip(filter_feature) {
                    *acc += l * f;
                }
            }
            engine.fft2d(&mut product, true);

            for (level, placement) in self.placements.iter().enumerate() {
                let placement = match placement {
                    Some(p) if p.plane == index && fits(p) => p,
                    _ => continue,
                };
                let out_rows = placement.rows - filter.rows() + 1;
                let out_cols = placement.cols - filter.cols() + 1;
                let mut map = ScoreMap::new(out_rows, out_cols, 0.0);
                for y in 0..out_rows {
                    let start = (placement.y + y) * cols + placement.x;
                    for (out, v) in map
                        .row_mut(y)
                        .iter_mut()
                        .zip(&product[start..start + out_cols])
                    {
                        *out = v.re;
                    }
                }
                maps[level] = map;
            }
        }

        maps
    }
}

/// Spatial valid cross-correlation of `level` with `filter`.
pub fn correlate_direct(level: &FeatureMap, filter: &Filter) -> ScoreMap {
    if filter.rows() > level.rows() || filter.cols() > level.cols() {
        return ScoreMap::empty();
    }
    let out_rows = level.rows() - filter.rows() + 1;
    let out_cols = level.cols() - filter.cols() + 1;
    let width = filter.cols() * NB_FEATURES;
    let mut map = ScoreMap::new(out_rows, out_cols, 0.0);

    for y in 0..out_rows {
        for x in 0..out_cols {
            let mut sum = 0.0;
            for fy in 0..filter.rows() {
                let row = &level.row(y + fy)[x * NB_FEATURES..x * NB_FEATURES + width];
                sum += vector_inner_product(row, filter.row(fy));
            }
            map[(y, x)] = sum as f32;
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{correlate_direct, FourierEngine, Patchwork, ScoreMap};
    use crate::feat::{FeatureMap, NB_FEATURES};

    fn random_map(rng: &mut StdRng, rows: usize, cols: usize) -> FeatureMap {
        let data = (0..rows * cols * NB_FEATURES)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();
        FeatureMap::from_vec(rows, cols, data).unwrap()
    }

    fn assert_maps_close(expected: &ScoreMap, actual: &ScoreMap) {
        assert_eq!((expected.rows(), expected.cols()), (actual.rows(), actual.cols()));
        for (e, a) in expected.as_slice().iter().zip(actual.as_slice()) {
            assert_abs_diff_eq!(*e, *a, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_engine_rounds_to_alignment() {
        let engine = FourierEngine::new(17, 33).unwrap();
        assert_eq!((32, 48), (engine.rows(), engine.cols()));
    }

    #[test]
    fn test_engine_rejects_empty_size() {
        assert!(FourierEngine::new(0, 10).is_err());
    }

    #[test]
    fn test_matches_direct_correlation() {
        let mut rng = StdRng::seed_from_u64(7);
        let level = random_map(&mut rng, 20, 27);
        let filter = random_map(&mut rng, 5, 4);
        let engine = FourierEngine::new(20, 27).unwrap();

        let patchwork = Patchwork::from_levels(&engine, &[level.clone()]).unwrap();
        let spectrum = engine.transform_filter(&filter).unwrap();
        let maps = patchwork.convolve(&engine, &[spectrum]);

        assert_maps_close(&correlate_direct(&level, &filter), &maps[0][0]);
    }

    #[test]
    fn test_packing_preserves_responses() {
        let mut rng = StdRng::seed_from_u64(11);
        let levels: Vec<FeatureMap> = [(14, 12), (10, 9), (8, 15), (6, 6), (3, 2)]
            .iter()
            .map(|&(r, c)| random_map(&mut rng, r, c))
            .collect();
        let filters = vec![random_map(&mut rng, 3, 3), random_map(&mut rng, 4, 2)];
        let engine = FourierEngine::new(16, 32).unwrap();

        let packed = Patchwork::from_levels(&engine, &levels).unwrap();
        assert!(packed.nb_planes() < levels.len());
        let spectra: Vec<_> = filters
            .iter()
            .map(|f| engine.transform_filter(f).unwrap())
            .collect();
        let together = packed.convolve(&engine, &spectra);

        for (z, level) in levels.iter().enumerate() {
            let alone = Patchwork::from_levels(&engine, &[level.clone()])
                .unwrap()
                .convolve(&engine, &spectra);
            for f in 0..filters.len() {
                assert_maps_close(&alone[f][0], &together[f][z]);
                assert_maps_close(&correlate_direct(level, &filters[f]), &together[f][z]);
            }
        }
    }

    #[test]
    fn test_filter_larger_than_level_gives_empty_map() {
        let mut rng = StdRng::seed_from_u64(3);
        let engine = FourierEngine::new(16, 16).unwrap();
        let patchwork = Patchwork::from_levels(&engine, &[random_map(&mut rng, 4, 4)]).unwrap();
        let spectrum = engine.transform_filter(&random_map(&mut rng, 5, 2)).unwrap();
        assert!(patchwork.convolve(&engine, &[spectrum])[0][0].is_empty());
    }

    #[test]
    fn test_level_too_large() {
        let engine = FourierEngine::new(16, 16).unwrap();
        let level = FeatureMap::zeros(17, 4);
        assert!(Patchwork::from_levels(&engine, &[level]).is_err());
    }
}
