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


#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use ffld::Rectangle;

pub const SIZE: u32 = 256;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fits a 13x6 root exactly on the 8 pixel level.
pub fn person_box() -> Rectangle {
    Rectangle::new(40, 40, 48, 104)
}

/// Textured background, plus a bright figure with a darker head when `with_person`.
pub fn synthetic_image(seed: u64, with_person: bool) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut image = RgbImage::from_fn(SIZE, SIZE, |x, y| {
        let stripe = if (x / 16 + y / 24) % 2 == 0 { 20 } else { 0 };
        let v = rng.gen_range(50..110) + stripe;
        Rgb([v, v, v + 10])
    });
    if with_person {
        let b = person_box();
        for y in b.y()..=b.bottom() {
            for x in b.x()..=b.right() {
                let head = y < b.y() + 24 && (x - b.x() - 24).abs() < 10;
                let colour = if head { Rgb([120, 80, 60]) } else { Rgb([230, 210, 190]) };
                image.put_pixel(x as u32, y as u32, colour);
            }
        }
    }
    image
}

/// A Pascal VOC style directory, removed on drop.
pub struct VocDataset {
    pub dir: TempDir,
    pub list: PathBuf,
}

fn annotation(id: &str, with_person: bool) -> String {
    let object = if with_person {
        let b = person_box();
        format!(
            "<object><name>person</name><difficult>0</difficult><truncated>0</truncated>\
             <bndbox><xmin>{}</xmin><ymin>{}</ymin><xmax>{}</xmax><ymax>{}</ymax></bndbox></object>",
            b.x(),
            b.y(),
            b.right(),
            b.bottom()
        )
    } else {
        String::new()
    };
    format!(
        "<annotation><filename>{}.png</filename>\
         <size><width>{}</width><height>{}</height><depth>3</depth></size>{}</annotation>",
        id, SIZE, SIZE, object
    )
}

pub fn write_voc_dataset(nb_positives: usize, nb_negatives: usize) -> VocDataset {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("VOC");
    let annotations = root.join("Annotations");
    let images = root.join("JPEGImages");
    let sets = root.join("ImageSets").join("Main");
    for d in [&annotations, &images, &sets] {
        fs::create_dir_all(d).unwrap();
    }

    let mut ids = Vec::new();
    for i in 0..nb_positives + nb_negatives {
        let positive = i < nb_positives;
        let id = format!("{:06}", i);
        fs::write(annotations.join(format!("{}.xml", id)), annotation(&id, positive)).unwrap();
        synthetic_image(i as u64, positive)
            .save(images.join(format!("{}.png", id)))
            .unwrap();
        ids.push(format!("{} {}", id, if positive { 1 } else { -1 }));
    }

    let list = sets.join("person_train.txt");
    fs::write(&list, ids.join("\n")).unwrap();
    VocDataset { dir, list }
}
