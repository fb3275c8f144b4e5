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
mod detector;
mod error;
mod math;
mod train;

pub mod feat;
pub mod model;
pub mod patchwork;
pub mod scene;

pub use crate::common::{Matrix, Rectangle};
pub use crate::detector::{Detection, Detector};
pub use crate::error::{Error, Result};
pub use crate::feat::{FeatureMap, FeaturePyramid, Filter, NB_FEATURES};
pub use crate::model::{load_mixture, read_mixture, save_mixture, write_mixture, Mixture, Model};
pub use crate::patchwork::{FourierEngine, Patchwork};
pub use crate::scene::{load_dataset, DiskImages, ImageSource, ObjectName, Scene};
pub use crate::train::{TrainParams, Trainer};
