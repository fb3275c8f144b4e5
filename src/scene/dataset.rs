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


use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::{ObjectName, Scene};
use crate::error::{Error, Result};

/// Scenes selected for training one category.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub scenes: Vec<Scene>,
    /// Non-difficult target objects.
    pub nb_positives: usize,
    /// Annotated objects of other categories.
    pub nb_negatives: usize,
}

impl Dataset {
    pub fn nb_positive_scenes(&self, name: ObjectName) -> usize {
        self.scenes.iter().filter(|s| s.is_positive(name)).count()
    }

    /// `(width, height)` of every scene, for sizing the Fourier engine.
    pub fn image_sizes(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.scenes.iter().map(|s| (s.width(), s.height()))
    }
}

/// Image ids listed in an image set, one per line, before the first space.
/// Lines shorter than three characters are skipped.
pub fn image_set_ids(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|line| {
            if line.len() < 3 {
                warn!("Skipping short line {:?} in image set", line);
                return false;
            }
            true
        })
        .map(|line| line.split(' ').next().unwrap_or(line))
        .collect()
}

/// Loads the scenes of an image set: every positive scene and at most
/// `max_negative_scenes` scenes without the category (all when `None`).
/// Annotations are read from `<list dir>/../../Annotations/<id>.xml`.
pub fn load_dataset(list: &Path, name: ObjectName, max_negative_scenes: Option<usize>) -> Result<Dataset> {
    if list.extension().map_or(true, |e| e != "txt") {
        return Err(Error::Config(format!(
            "invalid image set file {}, should be .txt",
            list.display()
        )));
    }
    let text = fs::read_to_string(list).map_err(|e| Error::io(list, e))?;
    let folder = annotation_folder(list);

    let mut negatives_left = max_negative_scenes;
    let mut dataset = Dataset {
        scenes: Vec::new(),
        nb_positives: 0,
        nb_negatives: 0,
    };

    for id in image_set_ids(&text) {
        let scene = match Scene::load(&folder.join(format!("{}.xml", id))) {
            Ok(scene) => scene,
            Err(e) => {
                warn!("Skipping scene {}: {}", id, e);
                continue;
            }
        };

        let positives = scene.targets(name).count();
        dataset.nb_positives += positives;
        dataset.nb_negatives += scene.objects().iter().filter(|o| o.name() != Some(name)).count();

        let keep = if positives > 0 {
            true
        } else if scene.is_negative(name) && negatives_left != Some(0) {
            if let Some(left) = negatives_left.as_mut() {
                *left -= 1;
            }
            true
        } else {
            false
        };
        if keep {
            dataset.scenes.push(scene);
        }
    }

    info!("{} positive samples", dataset.nb_positives);
    info!("{} negative samples", dataset.nb_negatives);

    if dataset.scenes.is_empty() {
        return Err(Error::EmptyTrainingSet(format!(
            "no usable scene in {}",
            list.display()
        )));
    }
    Ok(dataset)
}

fn annotation_folder(list: &Path) -> PathBuf {
    list.parent()
        .unwrap_or_else(|| Path::new("."))
        .join("..")
        .join("..")
        .join("Annotations")
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{image_set_ids, load_dataset};
    use crate::scene::ObjectName;

    fn annotation(name: &str, difficult: u8) -> String {
        format!(
            "<annotation><filename>img.jpg</filename>\
             <size><width>64</width><height>48</height><depth>3</depth></size>\
             <object><name>{}</name><difficult>{}</difficult>\
             <bndbox><xmin>1</xmin><ymin>2</ymin><xmax>30</xmax><ymax>40</ymax></bndbox></object>\
             </annotation>",
            name, difficult
        )
    }

    #[test]
    fn test_image_set_ids() {
        let ids = image_set_ids("000005 1\n\nab\n000007\n  \n000009 -1\n");
        assert_eq!(vec!["000005", "000007", "000009"], ids);
    }

    #[test]
    fn test_load_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let sets = dir.path().join("ImageSets").join("Main");
        let annotations = dir.path().join("Annotations");
        fs::create_dir_all(&sets).unwrap();
        fs::create_dir_all(&annotations).unwrap();

        fs::write(annotations.join("pos1.xml"), annotation("person", 0)).unwrap();
        fs::write(annotations.join("dif1.xml"), annotation("person", 1)).unwrap();
        fs::write(annotations.join("neg1.xml"), annotation("dog", 0)).unwrap();
        fs::write(annotations.join("neg2.xml"), annotation("cat", 0)).unwrap();
        fs::write(annotations.join("bad1.xml"), "<annotation>").unwrap();
        let list = sets.join("person_train.txt");
        fs::write(&list, "pos1\ndif1\nneg1\nneg2\nbad1\nmissing\nn3\n").unwrap();

        let all = load_dataset(&list, ObjectName::Person, None).unwrap();
        let ids: Vec<_> = all.scenes.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(vec!["pos1", "neg1", "neg2"], ids);
        assert_eq!(1, all.nb_positives);
        assert_eq!(2, all.nb_negatives);
        assert_eq!(1, all.nb_positive_scenes(ObjectName::Person));

        let capped = load_dataset(&list, ObjectName::Person, Some(1)).unwrap();
        assert_eq!(2, capped.scenes.len());

        let none = load_dataset(&list, ObjectName::Person, Some(0)).unwrap();
        assert_eq!(1, none.scenes.len());

        assert!(load_dataset(&list, ObjectName::Zebra, Some(0)).is_err());
    }

    #[test]
    fn test_list_must_be_txt() {
        let err = load_dataset(Path::new("sets/train.csv"), ObjectName::Person, None).unwrap_err();
        assert!(err.is_config());
    }
}
