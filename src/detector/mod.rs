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


use std::cmp::Ordering::*;

use image::RgbImage;
use log::debug;

use crate::common::Rectangle;
use crate::error::{Error, Result};
use crate::feat::FeaturePyramid;
use crate::model::{Mixture, MixtureSpectra};
use crate::patchwork::FourierEngine;

/// A scored box in image coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    bbox: Rectangle,
    score: f64,
    component: usize,
    level: usize,
}

impl Detection {
    pub fn bbox(&self) -> &Rectangle {
        &self.bbox
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn component(&self) -> usize {
        self.component
    }

    pub fn level(&self) -> usize {
        self.level
    }
}

/// Runs a trained mixture over whole images.
pub struct Detector {
    mixture: Mixture,
    engine: Option<(FourierEngine, MixtureSpectra)>,
    padding: usize,
    interval: usize,
    score_thresh: f64,
    nms_thresh: f64,
}

impl Detector {
    pub fn new(mixture: Mixture, padding: usize, interval: usize) -> Result<Self> {
        if padding < 2 || interval == 0 {
            return Err(Error::Config(format!(
                "invalid pyramid parameters: padding {}, interval {}",
                padding, interval
            )));
        }
        Ok(Detector {
            mixture,
            engine: None,
            padding,
            interval,
            score_thresh: 0.0,
            nms_thresh: 0.5,
        })
    }

    pub fn mixture(&self) -> &Mixture {
        &self.mixture
    }

    /// Detections scoring below `thresh` are not returned.
    pub fn set_score_thresh(&mut self, thresh: f64) {
        self.score_thresh = thresh;
    }

    /// Boxes overlapping a better one by more than `thresh` are suppressed.
    pub fn set_nms_thresh(&mut self, thresh: f64) -> Result<()> {
        if !(thresh > 0.0 && thresh <= 1.0) {
            return Err(Error::Config(format!("illegal NMS threshold: {}", thresh)));
        }
        self.nms_thresh = thresh;
        Ok(())
    }

    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let pyramid = FeaturePyramid::new(image, self.padding, self.interval)?;
        if pyramid.is_empty() {
            debug!("image {}x{} too small to detect anything", image.width(), image.height());
            return Ok(Vec::new());
        }
        let (engine, spectra) = engine_for(&mut self.engine, &self.mixture, &pyramid)?;
        let scores = self.mixture.score(engine, spectra, &pyramid)?;

        let mut detections = Vec::new();
        for (k, (model, component)) in self.mixture.models().iter().zip(scores.components()).enumerate() {
            for (z, map) in component.scores.iter().enumerate() {
                for (y, x, &s) in map.indexed_iter() {
                    let score = f64::from(s);
                    if !score.is_finite() || score < self.score_thresh {
                        continue;
                    }
                    detections.push(Detection {
                        bbox: model.bounding_box(&pyramid, z, y, x),
                        score,
                        component: k,
                        level: z,
                    });
                }
            }
        }

        let mut kept = Vec::new();
        non_maximum_suppression(&mut detections, &mut kept, self.nms_thresh);
        Ok(kept)
    }
}

/// The cached engine, grown when the pyramid does not fit it.
fn engine_for<'a>(
    slot: &'a mut Option<(FourierEngine, MixtureSpectra)>,
    mixture: &Mixture,
    pyramid: &FeaturePyramid,
) -> Result<&'a (FourierEngine, MixtureSpectra)> {
    let (rows, cols) = pyramid
        .levels()
        .iter()
        .fold((0, 0), |(r, c), l| (r.max(l.rows()), c.max(l.cols())));
    let grown = match slot.as_ref().map(|(e, _)| (e.rows(), e.cols())) {
        Some((r, c)) if r >= rows && c >= cols => None,
        Some((r, c)) => Some((rows.max(r), cols.max(c))),
        None => Some((rows, cols)),
    };
    if let Some((rows, cols)) = grown {
        debug!("Planning a {}x{} Fourier engine", rows, cols);
        let engine = FourierEngine::new(rows, cols)?;
        let spectra = mixture.transform_filters(&engine)?;
        *slot = Some((engine, spectra));
    }
    slot.as_ref().ok_or_else(|| Error::Engine {
        rows,
        cols,
        msg: "no engine planned".into(),
    })
}

/// Greedy suppression: keeps the best box of every cluster of boxes
/// overlapping by more than `iou_thresh`.
fn non_maximum_suppression(detections: &mut Vec<Detection>, kept: &mut Vec<Detection>, iou_thresh: f64) {
    kept.clear();
    detections.sort_by(|x, y| {
        if x.score > y.score {
            // x goes before y
            Less
        } else if x.score < y.score {
            Greater
        } else {
            Equal
        }
    });

    let mut suppressed = vec![false; detections.len()];
    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(detections[i].clone());
        for j in i + 1..detections.len() {
            if !suppressed[j] && detections[i].bbox.iou(&detections[j].bbox) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
}
