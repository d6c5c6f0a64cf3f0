//! JSON persistence of the trained artifact set.
//!
//! A directory holds one file per artifact plus a manifest describing the
//! run. Loading reads and validates every file; any failure rejects the
//! whole set.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ArtifactError;
use crate::model::Model;
use crate::preprocess::{LabelEncoder, StandardScaler, FEATURE_NAMES};
use crate::train::{TrainedArtifacts, TrainingReport};

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const CROP_ENCODER_FILE: &str = "label_encoder_crop.json";
pub const SOIL_ENCODER_FILE: &str = "label_encoder_soil.json";
pub const FEATURE_NAMES_FILE: &str = "feature_names.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Provenance of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub model: String,
    pub seed: u64,
    pub n_samples: usize,
    pub trained_at: DateTime<Utc>,
    pub report: TrainingReport,
}

/// The artifact set as read back from disk.
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub model: Model,
    pub scaler: StandardScaler,
    pub crop_encoder: LabelEncoder,
    pub soil_encoder: LabelEncoder,
    pub feature_names: Vec<String>,
    pub manifest: Option<Manifest>,
}

pub fn save(dir: impl AsRef<Path>, trained: &TrainedArtifacts, seed: u64, n_samples: usize) -> Result<Manifest, ArtifactError> {
    let dir = dir.as_ref();
    validate(&trained.model, &trained.scaler, &trained.crop_encoder, &trained.soil_encoder)?;
    fs::create_dir_all(dir).map_err(|source| ArtifactError::Io { path: dir.to_path_buf(), source })?;

    let manifest = Manifest {
        model: trained.report.selected.display_name().to_string(),
        seed,
        n_samples,
        trained_at: Utc::now(),
        report: trained.report.clone(),
    };

    write_json(dir.join(MODEL_FILE), &trained.model)?;
    write_json(dir.join(SCALER_FILE), &trained.scaler)?;
    write_json(dir.join(CROP_ENCODER_FILE), &trained.crop_encoder)?;
    write_json(dir.join(SOIL_ENCODER_FILE), &trained.soil_encoder)?;
    write_json(dir.join(FEATURE_NAMES_FILE), &FEATURE_NAMES)?;
    write_json(dir.join(MANIFEST_FILE), &manifest)?;

    info!(dir = %dir.display(), model = %manifest.model, "saved artifacts");
    Ok(manifest)
}

pub fn load(dir: impl AsRef<Path>) -> Result<LoadedArtifacts, ArtifactError> {
    let dir = dir.as_ref();
    let model: Model = read_json(dir.join(MODEL_FILE))?;
    let scaler: StandardScaler = read_json(dir.join(SCALER_FILE))?;
    let crop_encoder: LabelEncoder = read_json(dir.join(CROP_ENCODER_FILE))?;
    let soil_encoder: LabelEncoder = read_json(dir.join(SOIL_ENCODER_FILE))?;
    let feature_names: Vec<String> = read_json(dir.join(FEATURE_NAMES_FILE))?;
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = if manifest_path.exists() { Some(read_json(manifest_path)?) } else { None };

    if feature_names.iter().map(String::as_str).ne(FEATURE_NAMES) {
        return Err(ArtifactError::Invalid(format!(
            "feature names {feature_names:?} do not match {FEATURE_NAMES:?}"
        )));
    }
    validate(&model, &scaler, &crop_encoder, &soil_encoder)?;

    Ok(LoadedArtifacts { model, scaler, crop_encoder, soil_encoder, feature_names, manifest })
}

fn validate(
    model: &Model,
    scaler: &StandardScaler,
    crop_encoder: &LabelEncoder,
    soil_encoder: &LabelEncoder,
) -> Result<(), ArtifactError> {
    if !model.is_well_formed() {
        return Err(ArtifactError::Invalid("model parameters are malformed".into()));
    }
    if !scaler.is_well_formed() {
        return Err(ArtifactError::Invalid("scaler statistics are malformed".into()));
    }
    for (name, enc) in [("crop", crop_encoder), ("soil", soil_encoder)] {
        if !enc.is_well_formed() {
            return Err(ArtifactError::Invalid(format!("{name} encoder classes must be sorted and unique")));
        }
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: PathBuf, value: &T) -> Result<(), ArtifactError> {
    let raw = serde_json::to_string(value).map_err(|source| ArtifactError::Json { path: path.clone(), source })?;
    fs::write(&path, raw).map_err(|source| ArtifactError::Io { path, source })
}

fn read_json<T: DeserializeOwned>(path: PathBuf) -> Result<T, ArtifactError> {
    let raw = fs::read_to_string(&path).map_err(|source| ArtifactError::Io { path: path.clone(), source })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactError::Json { path, source })
}
