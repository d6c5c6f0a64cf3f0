//! Offline training: split, fit encoders and scaler, fit both candidates,
//! evaluate them on the held-out rows, keep the better one.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TrainError;
use crate::forest::{ForestParams, RandomForest};
use crate::io::YieldRecord;
use crate::metrics::Metrics;
use crate::model::{select_model, LinearModel, Model, ModelKind};
use crate::preprocess::{preprocess, LabelEncoder, StandardScaler, N_FEATURES, PUBLIC_FEATURE_NAMES};
use crate::vocab::{Crop, Soil};

/// Smallest dataset that leaves enough rows on both sides of the split.
pub const MIN_SAMPLES: usize = 10;

/// Options for one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    pub seed: u64,
    pub test_fraction: f64,
    pub forest: ForestParams,
}

impl Default for TrainOptions {
    fn default() -> Self {
        TrainOptions { seed: 42, test_fraction: 0.2, forest: ForestParams::default() }
    }
}

/// Held-out scores of both candidates and the resulting choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub n_train: usize,
    pub n_test: usize,
    pub linear: Metrics,
    pub ensemble: Metrics,
    pub selected: ModelKind,
    pub feature_importance: [f64; N_FEATURES],
}

/// Everything training produces; this is what gets persisted.
#[derive(Debug, Clone)]
pub struct TrainedArtifacts {
    pub model: Model,
    pub scaler: StandardScaler,
    pub crop_encoder: LabelEncoder,
    pub soil_encoder: LabelEncoder,
    pub report: TrainingReport,
}

/// Shuffles row indices with the seed; the first `ceil(test_fraction * n)`
/// become the held-out partition. Returns `(train, test)`.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>), TrainError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(TrainError::InvalidTestFraction(test_fraction));
    }
    let n_test = (test_fraction * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(TrainError::TooFewSamples { n, min: MIN_SAMPLES });
    }
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Every sample needs vocabulary labels, finite features and a positive, finite yield.
pub fn validate_records(records: &[YieldRecord]) -> Result<(), TrainError> {
    for (row, r) in records.iter().enumerate() {
        let reason = if r.crop_type.parse::<Crop>().is_err() {
            Some(format!("unknown crop type {:?}", r.crop_type))
        } else if r.soil_type.parse::<Soil>().is_err() {
            Some(format!("unknown soil type {:?}", r.soil_type))
        } else {
            r.defect()
        };
        if let Some(reason) = reason {
            return Err(TrainError::InvalidSample { row, reason });
        }
    }
    Ok(())
}

pub fn train(records: &[YieldRecord], opts: &TrainOptions) -> Result<TrainedArtifacts, TrainError> {
    if records.len() < MIN_SAMPLES {
        return Err(TrainError::TooFewSamples { n: records.len(), min: MIN_SAMPLES });
    }
    validate_records(records)?;
    info!(samples = records.len(), seed = opts.seed, "training on dataset");

    let crop_encoder = LabelEncoder::fit(records.iter().map(|r| r.crop_type.as_str()));
    let soil_encoder = LabelEncoder::fit(records.iter().map(|r| r.soil_type.as_str()));
    let (features, targets) = preprocess(records, &crop_encoder, &soil_encoder)?;

    let (train_idx, test_idx) = train_test_split(records.len(), opts.test_fraction, opts.seed)?;
    let pick = |idx: &[usize]| -> (Vec<_>, Vec<f64>) {
        (idx.iter().map(|&i| features[i]).collect(), idx.iter().map(|&i| targets[i]).collect())
    };
    let (x_train, y_train) = pick(&train_idx);
    let (x_test, y_test) = pick(&test_idx);

    let (scaler, x_train) = StandardScaler::fit_transform(&x_train)?;
    let x_test = scaler.transform_all(&x_test);

    let linear = Model::Linear(LinearModel::fit(&x_train, &y_train)?);
    let linear_metrics = Metrics::evaluate(&y_test, &linear.predict_all(&x_test));
    info!(
        mae = linear_metrics.mae,
        rmse = linear_metrics.rmse,
        r2 = linear_metrics.r2,
        "{}",
        ModelKind::Linear.display_name()
    );

    let ensemble = Model::Ensemble(RandomForest::fit(&x_train, &y_train, &opts.forest, opts.seed)?);
    let ensemble_metrics = Metrics::evaluate(&y_test, &ensemble.predict_all(&x_test));
    info!(
        mae = ensemble_metrics.mae,
        rmse = ensemble_metrics.rmse,
        r2 = ensemble_metrics.r2,
        trees = opts.forest.n_trees,
        "{}",
        ModelKind::Ensemble.display_name()
    );

    let selected = select_model(linear_metrics.r2, ensemble_metrics.r2);
    let model = match selected {
        ModelKind::Linear => linear,
        ModelKind::Ensemble => ensemble,
    };
    let feature_importance = model.feature_importances();
    info!(model = selected.display_name(), "selected best model");
    for (name, v) in PUBLIC_FEATURE_NAMES.iter().zip(feature_importance) {
        info!(feature = *name, importance = v, "feature importance");
    }

    Ok(TrainedArtifacts {
        model,
        scaler,
        crop_encoder,
        soil_encoder,
        report: TrainingReport {
            n_train: train_idx.len(),
            n_test: test_idx.len(),
            linear: linear_metrics,
            ensemble: ensemble_metrics,
            selected,
            feature_importance,
        },
    })
}
