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


mod category;
mod dataset;

pub use self::category::ObjectName;
pub use self::dataset::{image_set_ids, load_dataset, Dataset};

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::warn;

use crate::common::Rectangle;
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    /// `None` for names outside the known categories.
    name: Option<ObjectName>,
    bndbox: Rectangle,
    difficult: bool,
    truncated: bool,
}

impl Object {
    pub fn new(name: Option<ObjectName>, bndbox: Rectangle, difficult: bool, truncated: bool) -> Self {
        Object {
            name,
            bndbox,
            difficult,
            truncated,
        }
    }

    pub fn name(&self) -> Option<ObjectName> {
        self.name
    }

    pub fn bndbox(&self) -> Rectangle {
        self.bndbox
    }

    pub fn difficult(&self) -> bool {
        self.difficult
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

/// An annotated image.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    id: String,
    image_path: PathBuf,
    width: u32,
    height: u32,
    depth: u32,
    objects: Vec<Object>,
}

impl Scene {
    pub fn new(
        id: impl Into<String>,
        image_path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        depth: u32,
        objects: Vec<Object>,
    ) -> Self {
        Scene {
            id: id.into(),
            image_path: image_path.into(),
            width,
            height,
            depth,
            objects,
        }
    }

    /// Reads a Pascal VOC annotation. The image is looked up in the
    /// `JPEGImages` directory next to the annotation directory.
    pub fn load(annotation: &Path) -> Result<Scene> {
        let xml = fs::read_to_string(annotation).map_err(|e| Error::io(annotation, e))?;
        Scene::parse(&xml, annotation)
    }

    pub fn parse(xml: &str, annotation: &Path) -> Result<Scene> {
        let fail = |msg: String| Error::Annotation {
            path: annotation.to_path_buf(),
            msg,
        };

        let doc = roxmltree::Document::parse(xml).map_err(|e| fail(e.to_string()))?;
        let root = doc.root_element();
        if !root.has_tag_name("annotation") {
            return Err(fail(format!("unexpected root element <{}>", root.tag_name().name())));
        }

        let filename = child_text(root, "filename").ok_or_else(|| fail("missing <filename>".into()))?;
        let size = child(root, "size").ok_or_else(|| fail("missing <size>".into()))?;
        let width = parse_number(size, "width").map_err(fail)?;
        let height = parse_number(size, "height").map_err(fail)?;
        let depth = parse_number(size, "depth").unwrap_or(3);

        let mut objects = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("object")) {
            let name = child_text(node, "name").ok_or_else(|| fail("object without <name>".into()))?;
            let bndbox = child(node, "bndbox").ok_or_else(|| fail("object without <bndbox>".into()))?;
            let corner = |tag: &str| -> Result<i32> {
                child_text(bndbox, tag)
                    .and_then(|t| t.parse::<f64>().ok())
                    .map(|v| v.round() as i32)
                    .ok_or_else(|| fail(format!("invalid <{}>", tag)))
            };
            let rect = Rectangle::from_corners(corner("xmin")?, corner("ymin")?, corner("xmax")?, corner("ymax")?);
            objects.push(Object::new(
                name.parse().ok(),
                rect,
                flag(node, "difficult"),
                flag(node, "truncated"),
            ));
        }

        let id = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        let image_path = annotation
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("..")
            .join("JPEGImages")
            .join(filename);

        Ok(Scene::new(id, image_path, width, height, depth, objects))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Non-difficult objects of the category.
    pub fn targets(&self, name: ObjectName) -> impl Iterator<Item = &Object> {
        self.objects
            .iter()
            .filter(move |o| o.name == Some(name) && !o.difficult)
    }

    pub fn is_positive(&self, name: ObjectName) -> bool {
        self.targets(name).next().is_some()
    }

    /// No object of the category at all, difficult ones included.
    pub fn is_negative(&self, name: ObjectName) -> bool {
        self.objects.iter().all(|o| o.name != Some(name))
    }
}

fn child<'a, 'i>(node: roxmltree::Node<'a, 'i>, tag: &str) -> Option<roxmltree::Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, tag: &str) -> Option<&'a str> {
    child(node, tag).and_then(|n| n.text()).map(str::trim)
}

fn parse_number(node: roxmltree::Node, tag: &str) -> std::result::Result<u32, String> {
    child_text(node, tag)
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| format!("invalid <{}>", tag))
}

fn flag(node: roxmltree::Node, tag: &str) -> bool {
    matches!(child_text(node, tag), Some("1") | Some("true"))
}

/// Where scene images come from.
pub trait ImageSource: Sync {
    fn load(&self, scene: &Scene) -> Result<RgbImage>;
}

/// Decodes scene images from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskImages;

impl ImageSource for DiskImages {
    fn load(&self, scene: &Scene) -> Result<RgbImage> {
        let path = scene.image_path();
        let image = image::open(path)
            .map_err(|source| Error::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();

        if image.width() != scene.width() || image.height() != scene.height() {
            warn!(
                "Image {} is {}x{} but its annotation says {}x{}",
                path.display(),
                image.width(),
                image.height(),
                scene.width(),
                scene.height()
            );
        }
        Ok(image)
    }
}
