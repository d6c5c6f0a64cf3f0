use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::forest::ForestParams;
use crate::train::TrainOptions;

/// Settings driving the `train` command.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainSettings {
    /// Number of simulated samples when no dataset is given.
    pub n_samples: usize,
    /// Seed for simulation, split and forest.
    pub seed: u64,
    /// Held-out share of the dataset.
    pub test_fraction: f64,
    /// Directory receiving the artifact set.
    pub artifacts_dir: PathBuf,
    /// Optional CSV to train from instead of simulating.
    pub dataset: Option<PathBuf>,
    /// Optional PNG bar chart of the selected model's importances.
    pub importance_plot: Option<PathBuf>,
    /// Tree ensemble hyper-parameters.
    pub forest: ForestParams,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            n_samples: 2000,
            seed: 42,
            test_fraction: 0.2,
            artifacts_dir: PathBuf::from("model"),
            dataset: None,
            importance_plot: Some(PathBuf::from("feature_importances.png")),
            forest: ForestParams::default(),
        }
    }
}

impl TrainSettings {
    pub fn train_options(&self) -> TrainOptions {
        TrainOptions { seed: self.seed, test_fraction: self.test_fraction, forest: self.forest.clone() }
    }
}

/// Loads TOML settings, falling back to defaults when the implicit file is missing.
pub fn load_settings(explicit: Option<&Path>) -> Result<TrainSettings> {
    let (candidate, explicit_provided) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from("train.toml"), false),
    };

    if candidate.exists() {
        let raw = std::fs::read_to_string(&candidate)
            .with_context(|| format!("failed to read training configuration from {}", candidate.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse TOML configuration at {}", candidate.display()))
    } else if explicit_provided {
        bail!("configuration file not found at {}", candidate.display());
    } else {
        Ok(TrainSettings::default())
    }
}
