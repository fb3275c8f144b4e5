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

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("unknown category {0:?}")]
    UnknownCategory(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("annotation parse error at {path}: {msg}")]
    Annotation { path: PathBuf, msg: String },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("the Fourier engine cannot support {rows}x{cols} feature maps: {msg}")]
    Engine { rows: usize, cols: usize, msg: String },
    #[error("feature level {rows}x{cols} exceeds the Fourier engine size {max_rows}x{max_cols}")]
    LevelTooLarge {
        rows: usize,
        cols: usize,
        max_rows: usize,
        max_cols: usize,
    },
    #[error("empty training set: {0}")]
    EmptyTrainingSet(String),
    #[error("numerical failure: {0}")]
    Numerical(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_model(source: io::Error) -> Self {
        Error::InvalidModel(source.to_string())
    }

    /// Configuration errors are the ones worth answering with usage guidance.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::UnknownCategory(_))
    }
}
