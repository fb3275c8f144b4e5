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


//! Latent SVM training of a mixture: positive relabeling, hard negative
//! mining and projected L-BFGS on the resulting cache.

mod lbfgs;
mod loss;

pub use self::lbfgs::Lbfgs;
pub use self::loss::{Example, Objective};

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::common::{par_map, Rectangle};
use crate::error::{Error, Result};
use crate::feat::FeaturePyramid;
use crate::model::{Mixture, MixtureScores, MixtureSpectra, MAX_QUADRATIC};
use crate::patchwork::FourierEngine;
use crate::scene::{ImageSource, ObjectName, Scene};

/// Negatives at or below this score are dropped from the cache.
const EASY_NEGATIVE: f64 = -1.01;
/// Windows of positive scenes overlapping a target by more than this are not negatives.
const NEGATIVE_OVERLAP: f64 = 0.3;

#[derive(Clone, Debug, PartialEq)]
pub struct TrainParams {
    /// SVM regularization constant.
    pub c: f64,
    /// Weight of the positives relative to the negatives.
    pub j: f64,
    pub interval: usize,
    pub padding: usize,
    /// Relabel iterations of the final phase; the root-only phase runs half.
    pub relabel: usize,
    /// Maximum mining rounds per relabel iteration.
    pub datamine: usize,
    /// Minimum IoU between a positive placement and its object.
    pub overlap: f64,
    pub max_negatives: usize,
    pub max_negatives_per_scene: usize,
    pub nb_parts: usize,
    pub part_size: (usize, usize),
    pub seed: u64,
    /// Also mine negatives away from the objects of positive scenes.
    pub mine_positive_scenes: bool,
    pub max_iterations: usize,
}

impl Default for TrainParams {
    fn default() -> Self {
        TrainParams {
            c: 0.002,
            j: 2.0,
            interval: 5,
            padding: 6,
            relabel: 8,
            datamine: 10,
            overlap: 0.7,
            max_negatives: 24000,
            max_negatives_per_scene: 200,
            nb_parts: 8,
            part_size: (6, 6),
            seed: 0,
            mine_positive_scenes: false,
            max_iterations: 400,
        }
    }
}

impl TrainParams {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Config(msg));
        if !(self.c > 0.0 && self.c.is_finite()) {
            return fail(format!("C must be positive, got {}", self.c));
        }
        if !(self.j > 0.0 && self.j.is_finite()) {
            return fail(format!("J must be positive, got {}", self.j));
        }
        if self.interval == 0 {
            return fail("interval must be positive".into());
        }
        if self.padding < 2 {
            return fail(format!("padding must be at least 2, got {}", self.padding));
        }
        if self.relabel == 0 {
            return fail("relabel must be positive".into());
        }
        if self.datamine == 0 {
            return fail("datamine must be positive".into());
        }
        if !(self.overlap > 0.0 && self.overlap < 1.0) {
            return fail(format!("overlap must be in (0, 1), got {}", self.overlap));
        }
        if self.max_negatives == 0 || self.max_negatives_per_scene == 0 {
            return fail("negative caps must be positive".into());
        }
        if self.nb_parts == 0 || self.part_size.0 == 0 || self.part_size.1 == 0 {
            return fail(format!("invalid parts: {} of size {:?}", self.nb_parts, self.part_size));
        }
        if self.max_iterations == 0 {
            return fail("the optimizer needs at least one iteration".into());
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct NegativeKey {
    scene: usize,
    z: usize,
    y: usize,
    x: usize,
    component: usize,
}

struct Negative {
    key: NegativeKey,
    example: Example,
}

/// Where a positive was placed.
#[derive(Clone, Copy, Debug)]
struct Placement {
    component: usize,
    z: usize,
    y: usize,
    x: usize,
    rect: Rectangle,
}

pub struct Trainer<'a, S: ImageSource> {
    params: TrainParams,
    engine: &'a FourierEngine,
    images: &'a S,
    scenes: &'a [Scene],
    name: ObjectName,
    rng: StdRng,
    round: u64,
}

impl<'a, S: ImageSource> Trainer<'a, S> {
    pub fn new(
        params: TrainParams,
        engine: &'a FourierEngine,
        images: &'a S,
        scenes: &'a [Scene],
        name: ObjectName,
    ) -> Result<Self> {
        params.validate()?;
        if scenes.is_empty() {
            return Err(Error::EmptyTrainingSet("no scenes".into()));
        }
        let rng = StdRng::seed_from_u64(params.seed);
        Ok(Trainer {
            params,
            engine,
            images,
            scenes,
            name,
            rng,
            round: 0,
        })
    }

    /// Trains the roots (unless `root_phase` is false), adds parts to the
    /// root-only components and trains everything.
    pub fn run(&mut self, mixture: &mut Mixture, root_phase: bool) -> Result<()> {
        if root_phase {
            info!("Training the root filters");
            self.train(mixture, (self.params.relabel / 2).max(1))?;
        }
        if mixture.models().iter().any(|m| !m.has_parts()) {
            info!(
                "Initializing {} parts of {}x{} cells",
                self.params.nb_parts, self.params.part_size.0, self.params.part_size.1
            );
            mixture.initialize_parts(self.params.nb_parts, self.params.part_size, &mut self.rng)?;
        }
        info!("Training the full model");
        self.train(mixture, self.params.relabel)
    }

    /// Runs `nb_relabel` relabel iterations, each followed by mining rounds.
    pub fn train(&mut self, mixture: &mut Mixture, nb_relabel: usize) -> Result<()> {
        let mut negatives: Vec<Negative> = Vec::new();

        for i in 0..nb_relabel {
            let mut spectra = mixture.transform_filters(self.engine)?;
            let positives: Vec<Example> = self
                .relabel_positives(mixture, &spectra)?
                .into_iter()
                .map(|(_, example)| example)
                .collect();
            if positives.is_empty() {
                return Err(Error::EmptyTrainingSet(format!(
                    "no {} placement overlaps its object by {}",
                    self.name, self.params.overlap
                )));
            }

            let mut previous_loss: Option<f64> = None;
            for j in 0..self.params.datamine {
                let weights = mixture.weights();
                let ranges = mixture.parameter_ranges();
                negatives.retain(|n| n.example.score(&weights, &ranges) > EASY_NEGATIVE);
                let kept = negatives.len();

                let added = self.mine_negatives(mixture, &spectra, &mut negatives)?;
                if j > 0 && added == 0 {
                    debug!("No new hard negative, stopping mining");
                    break;
                }

                let negative_examples: Vec<Example> = negatives.iter().map(|n| n.example.clone()).collect();
                let loss = self.optimize(mixture, &positives, &negative_examples)?;
                info!(
                    "Relabel: {}, datamine: {}, # positives: {}, # hard negatives: {} (already in the cache) + {} (new) = {}, loss: {}",
                    i,
                    j,
                    positives.len(),
                    kept,
                    added,
                    negatives.len(),
                    loss
                );
                if let Some(previous) = previous_loss {
                    if loss < 0.999 * previous {
                        warn!("Loss decreased from {} to {} after adding negatives", previous, loss);
                    }
                }
                previous_loss = Some(loss);
                spectra = mixture.transform_filters(self.engine)?;
            }
        }
        Ok(())
    }

    /// Best placement of every non-difficult target object among those
    /// overlapping it by at least `overlap`.
    fn relabel_positives(&self, mixture: &Mixture, spectra: &MixtureSpectra) -> Result<Vec<(Placement, Example)>> {
        let positive: Vec<usize> = (0..self.scenes.len())
            .filter(|&i| self.scenes[i].is_positive(self.name))
            .collect();
        let zero = mixture.is_zero();

        let found = par_map(positive.len(), |i| self.scene_positives(mixture, spectra, positive[i], zero));
        let mut examples = Vec::new();
        for scene in found {
            examples.extend(scene?);
        }
        Ok(examples)
    }

    fn scene_positives(
        &self,
        mixture: &Mixture,
        spectra: &MixtureSpectra,
        index: usize,
        zero: bool,
    ) -> Result<Vec<(Placement, Example)>> {
        let (pyramid, scores) = match self.scene_scores(mixture, spectra, index)? {
            Some(scored) => scored,
            None => return Ok(Vec::new()),
        };

        let mut examples = Vec::new();
        for object in self.scenes[index].targets(self.name) {
            let target = object.bndbox();
            let mut best: Option<(f64, Placement)> = None;

            for (k, (model, component)) in mixture.models().iter().zip(scores.components()).enumerate() {
                for (z, map) in component.scores.iter().enumerate() {
                    for (y, x, &s) in map.indexed_iter() {
                        if !s.is_finite() {
                            continue;
                        }
                        let rect = model.bounding_box(&pyramid, z, y, x);
                        let iou = rect.iou(&target);
                        if iou < self.params.overlap {
                            continue;
                        }
                        let key = if zero { iou } else { f64::from(s) };
                        if best.map_or(true, |(b, _)| key > b) {
                            best = Some((key, Placement { component: k, z, y, x, rect }));
                        }
                    }
                }
            }

            let placement = match best {
                Some((_, placement)) => placement,
                None => {
                    debug!("No placement of {:?} in scene {}", target, self.scenes[index].id());
                    continue;
                }
            };
            debug!("Object {:?} relabeled to {:?}", target, placement.rect);
            let Placement { component, z, y, x, .. } = placement;
            let positions = scores.components()[component].part_positions(z, y, x);
            if let Some(features) = mixture.models()[component].extract_sample(&pyramid, z, y, x, &positions) {
                examples.push((placement, Example { component, features }));
            }
        }
        Ok(examples)
    }

    /// Adds new hard negatives to `cache`, scene by scene, until the caps
    /// are reached. Returns how many were added.
    fn mine_negatives(&mut self, mixture: &Mixture, spectra: &MixtureSpectra, cache: &mut Vec<Negative>) -> Result<usize> {
        let round = self.round;
        self.round += 1;
        if cache.len() >= self.params.max_negatives {
            return Ok(0);
        }

        let this = &*self;
        let scenes: Vec<usize> = (0..this.scenes.len())
            .filter(|&i| {
                let scene = &this.scenes[i];
                scene.is_negative(this.name) || (this.params.mine_positive_scenes && scene.is_positive(this.name))
            })
            .collect();
        if scenes.is_empty() {
            warn!("No scene to mine negatives from");
            return Ok(0);
        }

        let cached: HashSet<NegativeKey> = cache.iter().map(|n| n.key).collect();
        let mut per_scene: HashMap<usize, usize> = HashMap::new();
        for negative in cache.iter() {
            *per_scene.entry(negative.key.scene).or_insert(0) += 1;
        }

        let found = par_map(scenes.len(), |i| {
            let index = scenes[i];
            let room = this
                .params
                .max_negatives_per_scene
                .saturating_sub(per_scene.get(&index).copied().unwrap_or(0));
            this.scene_negatives(mixture, spectra, index, room, &cached, round)
        });

        let mut added = 0;
        'scenes: for scene in found {
            for negative in scene? {
                if cache.len() >= this.params.max_negatives {
                    break 'scenes;
                }
                cache.push(negative);
                added += 1;
            }
        }
        Ok(added)
    }

    fn scene_negatives(
        &self,
        mixture: &Mixture,
        spectra: &MixtureSpectra,
        index: usize,
        room: usize,
        cached: &HashSet<NegativeKey>,
        round: u64,
    ) -> Result<Vec<Negative>> {
        if room == 0 {
            return Ok(Vec::new());
        }
        let (pyramid, scores) = match self.scene_scores(mixture, spectra, index)? {
            Some(scored) => scored,
            None => return Ok(Vec::new()),
        };
        let targets: Vec<Rectangle> = self.scenes[index].targets(self.name).map(|o| o.bndbox()).collect();

        let mut candidates: Vec<(f32, NegativeKey)> = Vec::new();
        for (k, (model, component)) in mixture.models().iter().zip(scores.components()).enumerate() {
            for (z, map) in component.scores.iter().enumerate() {
                for (y, x, &s) in map.indexed_iter() {
                    // Also rejects -inf
                    if !(s > -1.0) {
                        continue;
                    }
                    let key = NegativeKey {
                        scene: index,
                        z,
                        y,
                        x,
                        component: k,
                    };
                    if cached.contains(&key) {
                        continue;
                    }
                    if !targets.is_empty() {
                        let rect = model.bounding_box(&pyramid, z, y, x);
                        if targets.iter().any(|t| rect.iou(t) > NEGATIVE_OVERLAP) {
                            continue;
                        }
                    }
                    candidates.push((s, key));
                }
            }
        }

        let mut rng = StdRng::seed_from_u64(
            self.params.seed ^ ((index as u64) << 32) ^ round.wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
        candidates.shuffle(&mut rng);
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate(room);

        Ok(candidates
            .into_iter()
            .filter_map(|(_, key)| {
                let NegativeKey { z, y, x, component, .. } = key;
                let positions = scores.components()[component].part_positions(z, y, x);
                let features = mixture.models()[component].extract_sample(&pyramid, z, y, x, &positions)?;
                Some(Negative {
                    key,
                    example: Example { component, features },
                })
            })
            .collect())
    }

    /// Pyramid and scores of a scene, or `None` if the scene cannot be used.
    fn scene_scores(
        &self,
        mixture: &Mixture,
        spectra: &MixtureSpectra,
        index: usize,
    ) -> Result<Option<(FeaturePyramid, MixtureScores)>> {
        let scene = &self.scenes[index];
        let image = match self.images.load(scene) {
            Ok(image) => image,
            Err(e) => {
                warn!("Skipping scene {}: {}", scene.id(), e);
                return Ok(None);
            }
        };

        let pyramid = FeaturePyramid::new(&image, self.params.padding, self.params.interval)?;
        if pyramid.is_empty() {
            debug!("Scene {} is too small for a pyramid", scene.id());
            return Ok(None);
        }

        match mixture.score(self.engine, spectra, &pyramid) {
            Ok(scores) => Ok(Some((pyramid, scores))),
            Err(e @ Error::LevelTooLarge { .. }) => {
                warn!("Skipping scene {}: {}", scene.id(), e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Fits the mixture to the cached examples, returning the final loss.
    fn optimize(&self, mixture: &mut Mixture, positives: &[Example], negatives: &[Example]) -> Result<f64> {
        let objective = Objective::new(mixture, positives, negatives, self.params.c, self.params.j);
        let quadratic: Vec<usize> = mixture
            .models()
            .iter()
            .zip(mixture.parameter_ranges())
            .flat_map(|(model, range)| {
                model
                    .quadratic_indices()
                    .into_iter()
                    .map(move |i| range.start + i)
            })
            .collect();

        let mut weights = mixture.weights();
        let lbfgs = Lbfgs::new(10, self.params.max_iterations, 1e-6);
        let loss = lbfgs.minimize(
            &mut weights,
            |w, g| objective.evaluate(w, g),
            |w| {
                for &i in &quadratic {
                    w[i] = w[i].min(f64::from(MAX_QUADRATIC));
                }
            },
        )?;
        if !loss.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(Error::Numerical(format!("optimization diverged (loss {})", loss)));
        }

        mixture.set_weights(&weights)?;
        Ok(loss)
    }
}
