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
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{CommandFactory, Parser};
use log::{error, info, warn};

use ffld::{
    load_dataset, load_mixture, save_mixture, write_mixture, DiskImages, Error, FourierEngine, Mixture,
    ObjectName, Result, TrainParams, Trainer,
};

/// Learns a mixture of deformable part models from a Pascal VOC style image set.
#[derive(Parser, Debug)]
#[command(name = "train", version, about)]
struct Options {
    /// SVM regularization constant
    #[arg(short = 'c', long = "C", default_value_t = 0.002)]
    c: f64,

    /// Maximum number of data-mining iterations within each training iteration
    #[arg(short = 'd', long, default_value_t = 10)]
    datamine: usize,

    /// Number of levels per octave in the HOG pyramid
    #[arg(short = 'e', long, default_value_t = 5)]
    interval: usize,

    /// SVM positive regularization constant boost
    #[arg(short = 'j', long = "J", default_value_t = 2.0)]
    j: f64,

    /// Maximum number of training iterations
    #[arg(short = 'l', long, default_value_t = 8)]
    relabel: usize,

    /// Read the initial model from a file instead of starting from scratch
    #[arg(short = 'm', long)]
    model: Option<PathBuf>,

    /// Name of the object to detect
    #[arg(short = 'n', long, default_value = "person")]
    name: String,

    /// Amount of zero padding in HOG cells
    #[arg(short = 'p', long, default_value_t = 6)]
    padding: usize,

    /// Write the trained model to this file
    #[arg(short = 'r', long, default_value = "model.txt")]
    result: PathBuf,

    /// Random seed (defaults to the current time)
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// Minimum overlap in latent positive search
    #[arg(short = 'v', long, default_value_t = 0.7)]
    overlap: f64,

    /// Number of mixture components (without symmetry)
    #[arg(short = 'x', long = "nb-components", default_value_t = 3)]
    nb_components: usize,

    /// Maximum number of negative images to consider (all by default)
    #[arg(short = 'z', long = "nb-negatives")]
    nb_negatives: Option<usize>,

    /// Image set, one image id per line
    #[arg(value_name = "image_set.txt")]
    image_set: PathBuf,
}

impl Options {
    fn train_params(&self) -> Result<TrainParams> {
        if self.nb_components == 0 {
            return Err(Error::Config("nb-components must be positive".into()));
        }
        let seed = match self.seed {
            Some(seed) => seed,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        let params = TrainParams {
            c: self.c,
            j: self.j,
            interval: self.interval,
            padding: self.padding,
            relabel: self.relabel,
            datamine: self.datamine,
            overlap: self.overlap,
            seed,
            ..TrainParams::default()
        };
        params.validate()?;
        Ok(params)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = Options::parse();
    if let Err(e) = run(&options) {
        error!("{}", e);
        if e.is_config() {
            eprintln!("{}", Options::command().render_usage());
        }
        std::process::exit(1);
    }
}

fn run(options: &Options) -> Result<()> {
    let name: ObjectName = options.name.parse()?;
    let params = options.train_params()?;
    info!("Training {} with seed {}", name, params.seed);

    info!("ImageSet: {}", options.image_set.display());
    let dataset = load_dataset(&options.image_set, name, options.nb_negatives)?;
    let engine = FourierEngine::for_image_sizes(dataset.image_sizes(), params.padding)?;

    let mut mixture = Mixture::from_scenes(options.nb_components, &dataset.scenes, name)?;
    let root_phase = match &options.model {
        Some(path) => {
            mixture = load_mixture(path)?;
            info!("Loaded {} components from {}", mixture.nb_components(), path.display());
            false
        }
        None => true,
    };

    let mut trainer = Trainer::new(params, &engine, &DiskImages, &dataset.scenes, name)?;
    trainer.run(&mut mixture, root_phase)?;

    if let Err(e) = save_mixture(&mixture, &options.result) {
        warn!("{}; writing the model to the standard output", e);
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        write_mixture(&mixture, &mut lock).map_err(|e| Error::Io {
            path: PathBuf::from("<stdout>"),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Options;

    #[test]
    fn test_defaults() {
        let options = Options::parse_from(["train", "sets/person.txt"]);
        let params = options.train_params().unwrap();
        assert_eq!(0.002, params.c);
        assert_eq!(2.0, params.j);
        assert_eq!((5, 6, 8, 10), (params.interval, params.padding, params.relabel, params.datamine));
        assert_eq!(0.7, params.overlap);
        assert_eq!(3, options.nb_components);
        assert_eq!(None, options.nb_negatives);
        assert_eq!("model.txt", options.result.to_str().unwrap());
    }

    #[test]
    fn test_short_options() {
        let options = Options::parse_from([
            "train", "-c", "0.01", "-j", "3", "-x", "2", "-z", "5", "-n", "Car", "-s", "42", "set.txt",
        ]);
        let params = options.train_params().unwrap();
        assert_eq!((0.01, 3.0, 42), (params.c, params.j, params.seed));
        assert_eq!(Some(5), options.nb_negatives);
        assert_eq!("Car", options.name);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for args in [
            vec!["train", "-v", "0", "set.txt"],
            vec!["train", "-v", "1", "set.txt"],
            vec!["train", "-c", "0", "set.txt"],
            vec!["train", "-p", "1", "set.txt"],
            vec!["train", "-x", "0", "set.txt"],
        ] {
            let options = Options::parse_from(args);
            assert!(options.train_params().unwrap_err().is_config());
        }
    }

    #[test]
    fn test_negative_scene_count_is_rejected() {
        assert!(Options::try_parse_from(["train", "-z", "-1", "set.txt"]).is_err());
    }
}
