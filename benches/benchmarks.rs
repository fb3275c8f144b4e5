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


#[macro_use]
extern crate criterion;

use std::time::Duration;

use criterion::Criterion;
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ffld::patchwork::correlate_direct;
use ffld::{Detector, FeaturePyramid, Filter, FourierEngine, Mixture, Model, Patchwork, NB_FEATURES};

fn get_test_image() -> RgbImage {
    let mut rng = StdRng::seed_from_u64(0);
    RgbImage::from_fn(500, 375, |x, y| {
        let v = ((x / 7 + y / 11) % 3) as u8 * 40 + rng.gen_range(0..60);
        Rgb([v, v / 2, 255 - v])
    })
}

fn get_test_filters(count: usize) -> Vec<Filter> {
    let mut rng = StdRng::seed_from_u64(1);
    (0..count)
        .map(|_| {
            let data = (0..6 * 6 * NB_FEATURES).map(|_| rng.gen_range(-1.0..1.0)).collect();
            Filter::from_vec(6, 6, data).unwrap()
        })
        .collect()
}

fn bench_pyramid(c: &mut Criterion) {
    let image = get_test_image();
    c.bench_function("feature_pyramid", move |b| {
        b.iter(|| FeaturePyramid::new(&image, 6, 5).unwrap())
    });
}

fn bench_convolution_compare(c: &mut Criterion) {
    let image = get_test_image();
    let pyramid = FeaturePyramid::new(&image, 6, 5).unwrap();
    let engine = FourierEngine::for_image_sizes(vec![(image.width(), image.height())], 6).unwrap();
    let filters = get_test_filters(8);
    let spectra: Vec<_> = filters.iter().map(|f| engine.transform_filter(f).unwrap()).collect();

    let mut group = c.benchmark_group("convolution_comparison");
    group.sample_size(10).measurement_time(Duration::new(20, 0));
    group.bench_function("patchwork", |b| {
        b.iter(|| {
            let patchwork = Patchwork::new(&engine, &pyramid).unwrap();
            patchwork.convolve(&engine, &spectra)
        })
    });
    group.bench_function("direct", |b| {
        b.iter(|| {
            filters
                .iter()
                .map(|f| pyramid.levels().iter().map(|l| correlate_direct(l, f)).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        })
    });
    group.finish();
}

fn detect_single_image(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let mut mixture = Mixture::new(vec![Model::new(13, 6), Model::new(10, 10), Model::new(6, 13)]).unwrap();
    mixture.initialize_parts(8, (6, 6), &mut rng).unwrap();
    let weights: Vec<f64> = (0..mixture.dimension()).map(|_| rng.gen_range(-0.05..0.05)).collect();
    mixture.set_weights(&weights).unwrap();

    let mut detector = Detector::new(mixture, 6, 5).unwrap();
    detector.set_score_thresh(0.5);
    let image = get_test_image();

    let mut group = c.benchmark_group("detect_single_image");
    // Limit the measurement time and the sample size
    // to make sure the benchmark finishes in a feasible amount of time.
    group.sample_size(10).measurement_time(Duration::new(60, 0));
    group.bench_function("detect", |b| b.iter(|| detector.detect(&image).unwrap()));
    group.finish();
}

criterion_group!(features, bench_pyramid);
criterion_group!(convolution, bench_convolution_compare);
criterion_group!(detection_perf, detect_single_image);
criterion_main!(features, convolution, detection_perf);
