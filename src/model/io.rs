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


use std::fs::File;
use std::io;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Deformation, Mixture, Model, Part};
use crate::error::{Error, Result};
use crate::feat::{Filter, NB_FEATURES};

const MAGIC: &[u8; 4] = b"FFLD";
const VERSION: u32 = 1;
/// Sanity bound on the cells of a single filter.
const MAX_FILTER_CELLS: usize = 1 << 16;

pub fn load_mixture(path: &Path) -> Result<Mixture> {
    let mut buf = vec![];
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut buf))
        .map_err(|e| Error::io(path, e))?;
    MixtureReader::new(Cursor::new(buf)).read()
}

pub fn read_mixture<R: Read>(reader: R) -> Result<Mixture> {
    MixtureReader::new(reader).read()
}

pub fn save_mixture(mixture: &Mixture, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_mixture(mixture, &mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| Error::io(path, e))
}

pub fn write_mixture<W: Write>(mixture: &Mixture, writer: &mut W) -> io::Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_u32::<LittleEndian>(VERSION)?;
    writer.write_i32::<LittleEndian>(NB_FEATURES as i32)?;
    writer.write_i32::<LittleEndian>(mixture.nb_components() as i32)?;

    for model in mixture.models() {
        writer.write_i32::<LittleEndian>(model.parts().len() as i32)?;
        writer.write_f32::<LittleEndian>(model.bias())?;
        write_filter(writer, model.root())?;
        for part in model.parts() {
            let (row, col) = part.offset();
            writer.write_i32::<LittleEndian>(row)?;
            writer.write_i32::<LittleEndian>(col)?;
            for d in part.deformation().coefficients().iter() {
                writer.write_f32::<LittleEndian>(*d)?;
            }
            write_filter(writer, part.filter())?;
        }
    }
    Ok(())
}

fn write_filter<W: Write>(writer: &mut W, filter: &Filter) -> io::Result<()> {
    writer.write_i32::<LittleEndian>(filter.rows() as i32)?;
    writer.write_i32::<LittleEndian>(filter.cols() as i32)?;
    for v in filter.as_slice() {
        writer.write_f32::<LittleEndian>(*v)?;
    }
    Ok(())
}

struct MixtureReader<R: Read> {
    reader: R,
}

impl<R: Read> MixtureReader<R> {
    fn new(reader: R) -> Self {
        MixtureReader { reader }
    }

    fn read(mut self) -> Result<Mixture> {
        let mut magic = [0u8; 4];
        self.reader.read_exact(&mut magic).map_err(Error::invalid_model)?;
        if &magic != MAGIC {
            return Err(Error::InvalidModel("not a mixture checkpoint".into()));
        }
        let version = self.reader.read_u32::<LittleEndian>().map_err(Error::invalid_model)?;
        if version != VERSION {
            return Err(Error::InvalidModel(format!("unsupported format version {}", version)));
        }
        let nb_features = self.read_count()?;
        if nb_features != NB_FEATURES {
            return Err(Error::InvalidModel(format!(
                "checkpoint has {} features per cell, expected {}",
                nb_features, NB_FEATURES
            )));
        }

        let nb_components = self.read_count()?;
        let mut models = Vec::with_capacity(nb_components.min(64));
        for _ in 0..nb_components {
            models.push(self.read_model()?);
        }
        Mixture::new(models)
    }

    fn read_model(&mut self) -> Result<Model> {
        let nb_parts = self.read_count()?;
        let bias = self.read_f32()?;
        if !bias.is_finite() {
            return Err(Error::InvalidModel(format!("non-finite bias {}", bias)));
        }
        let root = self.read_filter()?;

        let mut parts = Vec::with_capacity(nb_parts.min(64));
        for _ in 0..nb_parts {
            let offset = (self.read_i32()?, self.read_i32()?);
            let mut coefficients = [0.0; 4];
            for c in coefficients.iter_mut() {
                *c = self.read_f32()?;
            }
            let filter = self.read_filter()?;
            parts.push(Part::new(filter, Deformation::new(coefficients), offset));
        }

        if nb_parts == 0 {
            Ok(Model::RootOnly { root, bias })
        } else {
            Model::with_parts(root, parts, bias)
        }
    }

    fn read_filter(&mut self) -> Result<Filter> {
        let rows = self.read_count()?;
        let cols = self.read_count()?;
        if rows == 0 || cols == 0 || rows * cols > MAX_FILTER_CELLS {
            return Err(Error::InvalidModel(format!("invalid filter size {}x{}", rows, cols)));
        }

        let mut data = vec![0.0f32; rows * cols * NB_FEATURES];
        self.reader
            .read_f32_into::<LittleEndian>(&mut data)
            .map_err(Error::invalid_model)?;
        if data.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidModel("non-finite filter weight".into()));
        }
        Filter::from_vec(rows, cols, data)
            .ok_or_else(|| Error::InvalidModel(format!("invalid filter size {}x{}", rows, cols)))
    }

    fn read_count(&mut self) -> Result<usize> {
        let n = self.read_i32()?;
        if n < 0 {
            return Err(Error::InvalidModel(format!("negative count {}", n)));
        }
        Ok(n as usize)
    }

    fn read_i32(&mut self) -> Result<i32> {
        self.reader.read_i32::<LittleEndian>().map_err(Error::invalid_model)
    }

    fn read_f32(&mut self) -> Result<f32> {
        self.reader.read_f32::<LittleEndian>().map_err(Error::invalid_model)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{read_mixture, write_mixture};
    use crate::error::Error;
    use crate::feat::NB_FEATURES;
    use crate::model::{Mixture, Model};

    fn trained_mixture() -> Mixture {
        let mut rng = StdRng::seed_from_u64(3);
        let mut mixture = Mixture::new(vec![Model::new(3, 2), Model::new(2, 3)]).unwrap();
        let weights: Vec<f64> = (0..mixture.dimension()).map(|_| rng.gen_range(-1.0..1.0)).collect();
        mixture.set_weights(&weights).unwrap();
        mixture.initialize_parts(2, (2, 2), &mut rng).unwrap();
        mixture
    }

    #[test]
    fn test_round_trip() {
        let mixture = trained_mixture();
        let mut buf = Vec::new();
        write_mixture(&mixture, &mut buf).unwrap();
        assert_eq!(b"FFLD", &buf[..4]);
        let read = read_mixture(Cursor::new(buf)).unwrap();
        assert_eq!(mixture, read);
    }

    #[test]
    fn test_truncated_checkpoint() {
        let mut buf = Vec::new();
        write_mixture(&trained_mixture(), &mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(read_mixture(Cursor::new(buf)).is_err());
    }

    #[test]
    fn test_bad_header() {
        assert!(read_mixture(Cursor::new(b"NOPE".to_vec())).is_err());
        let mut buf = Vec::new();
        write_mixture(&trained_mixture(), &mut buf).unwrap();
        buf[8] = 30;
        assert!(read_mixture(Cursor::new(buf)).is_err());
    }

    /// Byte offset of the first part's `dy^2` coefficient in component 0.
    fn first_deformation_offset(mixture: &Mixture) -> usize {
        let root = mixture.models()[0].root();
        16 + 4 + 4 + 8 + root.rows() * root.cols() * NB_FEATURES * 4 + 8
    }

    #[test]
    fn test_non_concave_deformation_rejected() {
        let mixture = trained_mixture();
        let mut buf = Vec::new();
        write_mixture(&mixture, &mut buf).unwrap();
        let at = first_deformation_offset(&mixture);
        let stored = f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        assert_eq!(mixture.models()[0].parts()[0].deformation().coefficients()[0], stored);

        for bad in [0.0f32, 0.5, f32::NAN] {
            let mut patched = buf.clone();
            patched[at..at + 4].copy_from_slice(&bad.to_le_bytes());
            match read_mixture(Cursor::new(patched)) {
                Err(Error::InvalidModel(_)) => {}
                other => panic!("{} accepted: {:?}", bad, other.map(|m| m.nb_components())),
            }
        }
    }

    #[test]
    fn test_non_finite_bias_rejected() {
        let mut buf = Vec::new();
        write_mixture(&trained_mixture(), &mut buf).unwrap();
        buf[20..24].copy_from_slice(&f32::INFINITY.to_le_bytes());
        assert!(matches!(read_mixture(Cursor::new(buf)), Err(Error::InvalidModel(_))));
    }

    #[test]
    fn test_zero_components_rejected() {
        let mut buf = b"FFLD".to_vec();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&31i32.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        assert!(read_mixture(Cursor::new(buf)).is_err());
    }
}
