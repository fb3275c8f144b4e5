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


use std::env::Args;

use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use ffld::Detector;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match Options::parse(std::env::args()) {
        Ok(options) => options,
        Err(message) => {
            println!("Failed to parse program arguments: {}", message);
            std::process::exit(1);
        }
    };

    let mixture = match ffld::load_mixture(std::path::Path::new(&options.model_path)) {
        Ok(mixture) => mixture,
        Err(error) => {
            println!("Failed to load model: {}", error);
            std::process::exit(1);
        }
    };

    let mut detector = match Detector::new(mixture, 6, 5) {
        Ok(detector) => detector,
        Err(error) => {
            println!("Failed to create detector: {}", error);
            std::process::exit(1);
        }
    };
    detector.set_score_thresh(options.threshold);

    let mut image = match image::open(&options.image_path) {
        Ok(image) => image.to_rgb8(),
        Err(message) => {
            println!("Failed to read image: {}", message);
            std::process::exit(1);
        }
    };

    let detections = match detector.detect(&image) {
        Ok(detections) => detections,
        Err(error) => {
            println!("Detection failed: {}", error);
            std::process::exit(1);
        }
    };

    println!("Found {} objects", detections.len());
    for detection in detections.iter() {
        let bbox = detection.bbox();
        println!(
            "{} {} {} {} score {:.3} component {}",
            bbox.x(),
            bbox.y(),
            bbox.width(),
            bbox.height(),
            detection.score(),
            detection.component()
        );
        if bbox.width() > 0 && bbox.height() > 0 {
            let rect = Rect::at(bbox.x(), bbox.y()).of_size(bbox.width(), bbox.height());
            draw_hollow_rect_mut(&mut image, rect, Rgb([255, 0, 0]));
        }
    }

    if let Err(message) = image.save(&options.output_path) {
        println!("Failed to save {}: {}", options.output_path, message);
        std::process::exit(1);
    }
    println!("Saved result to {}", options.output_path);
}

struct Options {
    model_path: String,
    image_path: String,
    output_path: String,
    threshold: f64,
}

impl Options {
    fn parse(args: Args) -> Result<Self, String> {
        let args: Vec<String> = args.collect();
        if args.len() < 4 || args.len() > 5 {
            return Err(format!(
                "Usage: {} <model-path> <image-path> <output-path> [threshold]",
                args[0]
            ));
        }

        let threshold = match args.get(4) {
            Some(t) => t.parse().map_err(|e| format!("invalid threshold {}: {}", t, e))?,
            None => 0.0,
        };

        Ok(Options {
            model_path: args[1].clone(),
            image_path: args[2].clone(),
            output_path: args[3].clone(),
            threshold,
        })
    }
}
