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


use std::ops::Range;

use log::debug;
use rand::Rng;

use super::{ComponentScores, Model};
use crate::error::{Error, Result};
use crate::feat::FeaturePyramid;
use crate::patchwork::{FilterSpectrum, FourierEngine, Patchwork};
use crate::scene::{ObjectName, Scene};

const MIN_AREA: u64 = 3000;
const MAX_AREA: u64 = 5000;

/// A mixture of components, one per aspect ratio.
#[derive(Clone, Debug, PartialEq)]
pub struct Mixture {
    models: Vec<Model>,
}

/// Filter spectra of every component, root first then parts.
pub struct MixtureSpectra {
    spectra: Vec<FilterSpectrum>,
    ranges: Vec<Range<usize>>,
}

pub struct MixtureScores {
    components: Vec<ComponentScores>,
}

impl MixtureScores {
    pub fn components(&self) -> &[ComponentScores] {
        &self.components
    }

    /// Best scoring component at `(y, x)` on level `z`. Components whose
    /// map does not cover the position, or score it `-inf`, are ignored.
    pub fn best(&self, z: usize, y: usize, x: usize) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (k, component) in self.components.iter().enumerate() {
            let map = match component.scores.get(z) {
                Some(map) if y < map.rows() && x < map.cols() => map,
                _ => continue,
            };
            let s = map[(y, x)];
            if s.is_finite() && best.map_or(true, |(_, b)| s > b) {
                best = Some((k, s));
            }
        }
        best
    }
}

impl Mixture {
    pub fn new(models: Vec<Model>) -> Result<Self> {
        if models.is_empty() {
            return Err(Error::InvalidModel("a mixture needs at least one component".into()));
        }
        Ok(Mixture { models })
    }

    /// Zero components sized after the aspect ratios and areas of the
    /// non-difficult objects of the category.
    pub fn from_scenes(nb_components: usize, scenes: &[Scene], name: ObjectName) -> Result<Self> {
        if nb_components == 0 {
            return Err(Error::Config("the number of components must be positive".into()));
        }

        let boxes: Vec<_> = scenes
            .iter()
            .flat_map(|s| s.targets(name))
            .map(|o| o.bndbox())
            .filter(|b| !b.is_empty())
            .collect();
        if boxes.is_empty() {
            return Err(Error::EmptyTrainingSet(format!("no {} to learn from", name)));
        }

        let ratio = |w: u32, h: u32| f64::from(w) / f64::from(h);
        let mut ratios: Vec<f64> = boxes.iter().map(|b| ratio(b.width(), b.height())).collect();
        ratios.sort_by(|a, b| a.total_cmp(b));

        let n = ratios.len();
        let references: Vec<f64> = (0..nb_components).map(|i| ratios[i * n / nb_components]).collect();

        let mut areas = vec![Vec::new(); nb_components];
        for b in &boxes {
            let r = ratio(b.width(), b.height());
            let k = references.iter().rposition(|&reference| r >= reference).unwrap_or(0);
            areas[k].push(b.area());
        }

        let mut sizes = vec![(1, 1); nb_components];
        for i in (0..nb_components).rev() {
            if areas[i].is_empty() {
                // The last component always gets the widest objects.
                sizes[i] = sizes.get(i + 1).copied().unwrap_or((1, 1));
                continue;
            }
            areas[i].sort_unstable();
            let area = areas[i][areas[i].len() * 2 / 10].clamp(MIN_AREA, MAX_AREA) as f64;
            let r = ratios[n * (2 * i + 1) / (2 * nb_components)];
            let rows = ((area / r).sqrt() / 8.0 + 0.5) as usize;
            let cols = ((area * r).sqrt() / 8.0 + 0.5) as usize;
            sizes[i] = (rows.max(1), cols.max(1));
        }

        for (i, (rows, cols)) in sizes.iter().enumerate() {
            debug!("Component {} has a {}x{} root", i, rows, cols);
        }
        Mixture::new(sizes.into_iter().map(|(r, c)| Model::new(r, c)).collect())
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn nb_components(&self) -> usize {
        self.models.len()
    }

    pub fn is_zero(&self) -> bool {
        self.models.iter().all(Model::is_zero)
    }

    pub fn dimension(&self) -> usize {
        self.models.iter().map(Model::dimension).sum()
    }

    /// Parameter range of every component in the flattened vector.
    pub fn parameter_ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.models
            .iter()
            .map(|m| {
                let range = start..start + m.dimension();
                start = range.end;
                range
            })
            .collect()
    }

    /// All parameters, component after component.
    pub fn weights(&self) -> Vec<f64> {
        let mut weights = Vec::with_capacity(self.dimension());
        for model in &self.models {
            model.write_weights(&mut weights);
        }
        weights
    }

    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        let mut rest = weights;
        for model in &mut self.models {
            rest = model.read_weights(rest)?;
        }
        if !rest.is_empty() {
            return Err(Error::InvalidModel(format!("{} extra parameters", rest.len())));
        }
        Ok(())
    }

    /// Adds parts to every root-only component; others are left untouched.
    pub fn initialize_parts<R: Rng>(&mut self, nb_parts: usize, part_size: (usize, usize), rng: &mut R) -> Result<()> {
        if nb_parts == 0 || part_size.0 == 0 || part_size.1 == 0 {
            return Err(Error::Config(format!(
                "cannot initialize {} parts of size {:?}",
                nb_parts, part_size
            )));
        }
        let models = std::mem::take(&mut self.models);
        self.models = models
            .into_iter()
            .map(|m| m.into_parts(nb_parts, part_size, rng))
            .collect();
        Ok(())
    }

    pub fn transform_filters(&self, engine: &FourierEngine) -> Result<MixtureSpectra> {
        let mut spectra = Vec::new();
        let mut ranges = Vec::with_capacity(self.models.len());
        for model in &self.models {
            let start = spectra.len();
            spectra.extend(model.transform(engine)?);
            ranges.push(start..spectra.len());
        }
        Ok(MixtureSpectra { spectra, ranges })
    }

    /// Scores every component on the pyramid.
    pub fn score(&self, engine: &FourierEngine, spectra: &MixtureSpectra, pyramid: &FeaturePyramid) -> Result<MixtureScores> {
        let consistent = spectra.ranges.len() == self.models.len()
            && self
                .models
                .iter()
                .zip(&spectra.ranges)
                .all(|(m, r)| r.len() == 1 + m.parts().len());
        if !consistent {
            return Err(Error::InvalidModel("filter spectra do not match the mixture".into()));
        }
        if pyramid.is_empty() {
            return Ok(MixtureScores {
                components: vec![ComponentScores::default(); self.models.len()],
            });
        }

        let patchwork = Patchwork::new(engine, pyramid)?;
        let responses = patchwork.convolve(engine, &spectra.spectra);
        let components = self
            .models
            .iter()
            .zip(&spectra.ranges)
            .map(|(model, range)| model.score(pyramid, &responses[range.clone()]))
            .collect();
        Ok(MixtureScores { components })
    }
}
