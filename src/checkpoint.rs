use std::{
    fs,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use burn::{
    module::Module,
    record::{CompactRecorder, RecorderError},
    tensor::backend::Backend,
};
use log::{info, warn};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

/// The files an agent writes while training
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// Model checkpoint or value table
    pub checkpoint: PathBuf,
    /// Reward curve image
    pub plot: PathBuf,
}

impl Artifacts {
    /// `<dir>/models/<name>` and `<dir>/plots/<name>.png`
    pub fn in_dir(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            checkpoint: dir.join("models").join(name),
            plot: dir.join("plots").join(format!("{name}.png")),
        }
    }
}

/// Create the parent directory of `path` if it is missing
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}

fn checkpoint_error(path: &Path, err: RecorderError) -> Error {
    Error::Checkpoint {
        path: path.to_path_buf(),
        reason: format!("{err:?}"),
    }
}

/// Save a burn module with the [`CompactRecorder`], which appends its own file extension
pub fn save_module<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    module
        .clone()
        .save_file(path, &CompactRecorder::new())
        .map_err(|err| checkpoint_error(path, err))
}

/// Load the parameters saved at `path` into `module`
pub fn load_module<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    module
        .load_file(path, &CompactRecorder::new(), device)
        .map_err(|err| checkpoint_error(path, err))
}

/// Load the parameters saved at `path`, or keep the freshly initialized `module` if that fails
pub fn load_or_keep<B: Backend, M: Module<B>>(module: M, path: &Path, device: &B::Device) -> M {
    match load_module(module.clone(), path, device) {
        Ok(loaded) => {
            info!("Loaded model from {}", path.display());
            loaded
        }
        Err(err) => {
            warn!("Model does not exist ({err}), creating a new one");
            module
        }
    }
}

pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer(writer, value)?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use burn::backend::NdArray;

    use super::*;
    use crate::{
        model::{Mlp, MlpConfig},
        tensor::to_rows,
    };

    type B = NdArray;

    #[test]
    fn artifacts_layout() {
        let artifacts = Artifacts::in_dir("out", "dqn");
        assert_eq!(artifacts.checkpoint, Path::new("out/models/dqn"));
        assert_eq!(artifacts.plot, Path::new("out/plots/dqn.png"));
    }

    #[test]
    fn module_checkpoint_restores_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("mlp");
        let device = Default::default();
        let config = MlpConfig::new(3, 2);

        let saved: Mlp<B> = config.init(&device);
        save_module(&saved, &path).unwrap();

        let input = burn::tensor::Tensor::<B, 2>::from_floats([[0.1, 0.2, 0.3]], &device);
        let restored = load_or_keep(config.init::<B>(&device), &path, &device);
        let expected = to_rows(saved.forward(input.clone()));
        let actual = to_rows(restored.forward(input));
        for (a, e) in actual[0].iter().zip(&expected[0]) {
            // Half precision storage
            assert!((a - e).abs() < 1e-2, "{a} != {e}");
        }
    }

    #[test]
    fn missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing");
        let device = Default::default();
        let fresh: Mlp<B> = MlpConfig::new(3, 2).init(&device);

        assert!(matches!(
            load_module(fresh.clone(), &path, &device),
            Err(Error::Checkpoint { .. })
        ));
        let kept = load_or_keep(fresh, &path, &device);
        assert_eq!(kept.num_params(), 3 * 24 + 24 + 24 * 24 + 24 + 24 * 2 + 2);
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.json");
        let table = HashMap::from([(String::from("0.00_0.50"), vec![1.0f32, -2.5])]);

        save_json(&table, &path).unwrap();
        let loaded: HashMap<String, Vec<f32>> = load_json(&path).unwrap();
        assert_eq!(loaded, table);
        assert!(matches!(
            load_json::<HashMap<String, Vec<f32>>>(&dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
