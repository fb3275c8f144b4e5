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


mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ffld::{load_mixture, save_mixture, Detector, FeaturePyramid, FourierEngine, Mixture, Model};

fn random_mixture(seed: u64) -> Mixture {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mixture = Mixture::new(vec![Model::new(13, 6), Model::new(8, 10)]).unwrap();
    mixture.initialize_parts(4, (4, 4), &mut rng).unwrap();
    let weights: Vec<f64> = (0..mixture.dimension()).map(|_| rng.gen_range(-0.1..0.1)).collect();
    mixture.set_weights(&weights).unwrap();
    mixture
}

#[test]
fn test_reloaded_mixture_scores_identically() {
    common::init_logging();
    let mixture = random_mixture(1);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixture.bin");
    save_mixture(&mixture, &path).unwrap();
    let reloaded = load_mixture(&path).unwrap();
    assert_eq!(mixture, reloaded);

    let image = common::synthetic_image(3, true);
    let pyramid = FeaturePyramid::new(&image, 6, 5).unwrap();
    let engine = FourierEngine::for_image_sizes(vec![(image.width(), image.height())], 6).unwrap();

    let before = mixture
        .score(&engine, &mixture.transform_filters(&engine).unwrap(), &pyramid)
        .unwrap();
    let after = reloaded
        .score(&engine, &reloaded.transform_filters(&engine).unwrap(), &pyramid)
        .unwrap();
    for (a, b) in before.components().iter().zip(after.components()) {
        assert_eq!(a.scores, b.scores);
        assert_eq!(a.positions, b.positions);
    }
}

#[test]
fn test_detector_agrees_with_reloaded_mixture() {
    let mixture = random_mixture(2);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixture.bin");
    save_mixture(&mixture, &path).unwrap();

    let image = common::synthetic_image(4, true);
    let mut original = Detector::new(mixture, 6, 5).unwrap();
    let mut reloaded = Detector::new(load_mixture(&path).unwrap(), 6, 5).unwrap();
    original.set_score_thresh(-0.5);
    reloaded.set_score_thresh(-0.5);

    assert_eq!(original.detect(&image).unwrap(), reloaded.detect(&image).unwrap());
}

#[test]
fn test_missing_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_mixture(&dir.path().join("absent.bin")).unwrap_err();
    assert!(matches!(err, ffld::Error::Io { .. }));
}

#[test]
fn test_corrupt_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.bin");
    std::fs::write(&path, b"FFLD\x01\x00\x00\x00garbage").unwrap();
    let err = load_mixture(&path).unwrap_err();
    assert!(matches!(err, ffld::Error::InvalidModel(_)));
}
