// Categorical encoding and feature standardization.
use crate::error::{EncodeError, TrainError};
use crate::io::YieldRecord;
use serde::{Deserialize, Serialize};

/// Number of model features.
pub const N_FEATURES: usize = 5;

/// Feature slot names as persisted alongside the model.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "crop_encoded",
    "soil_encoded",
    "rainfall_mm",
    "temperature_c",
    "fertilizer_kg_ha",
];

/// Feature names exposed in prediction responses, slot-aligned with [`FEATURE_NAMES`].
pub const PUBLIC_FEATURE_NAMES: [&str; N_FEATURES] = [
    "crop_type",
    "soil_type",
    "rainfall_mm",
    "temperature_c",
    "fertilizer_kg_ha",
];

/// `[crop_code, soil_code, rainfall, temperature, fertilizer]`, raw or standardized.
pub type FeatureVector = [f64; N_FEATURES];

/// Bidirectional label <-> code mapping. Codes follow the lexicographic
/// order of the labels and are contiguous from 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(|s| s.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        LabelEncoder { classes }
    }

    pub fn encode(&self, label: &str) -> Result<usize, EncodeError> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| EncodeError::UnknownLabel { label: label.to_string() })
    }

    pub fn decode(&self, code: usize) -> Result<&str, EncodeError> {
        self.classes
            .get(code)
            .map(String::as_str)
            .ok_or(EncodeError::UnknownCode { code })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// A deserialized encoder must still be sorted and duplicate-free.
    pub fn is_well_formed(&self) -> bool {
        !self.classes.is_empty() && self.classes.windows(2).all(|w| w[0] < w[1])
    }
}

/// Per-feature standardization fitted on a training matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: FeatureVector,
    std: FeatureVector,
}

impl StandardScaler {
    /// Column means and population standard deviations. A (numerically)
    /// constant column is stored with `std == 0`.
    pub fn fit(rows: &[FeatureVector]) -> Result<Self, TrainError> {
        if rows.is_empty() {
            return Err(TrainError::TooFewSamples { n: 0, min: 1 });
        }
        let n = rows.len() as f64;
        let mut mean = [0.0; N_FEATURES];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut std = [0.0; N_FEATURES];
        for row in rows {
            for j in 0..N_FEATURES {
                std[j] += (row[j] - mean[j]).powi(2);
            }
        }
        for j in 0..N_FEATURES {
            std[j] = (std[j] / n).sqrt();
            if std[j] <= 10.0 * f64::EPSILON * mean[j].abs().max(1.0) {
                std[j] = 0.0;
            }
        }
        Ok(StandardScaler { mean, std })
    }

    pub fn transform(&self, v: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; N_FEATURES];
        for j in 0..N_FEATURES {
            out[j] = if self.std[j] == 0.0 { 0.0 } else { (v[j] - self.mean[j]) / self.std[j] };
        }
        out
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    pub fn fit_transform(rows: &[FeatureVector]) -> Result<(Self, Vec<FeatureVector>), TrainError> {
        let scaler = Self::fit(rows)?;
        let scaled = scaler.transform_all(rows);
        Ok((scaler, scaled))
    }

    pub fn mean(&self) -> &FeatureVector {
        &self.mean
    }

    pub fn std(&self) -> &FeatureVector {
        &self.std
    }

    pub fn is_well_formed(&self) -> bool {
        self.mean.iter().all(|m| m.is_finite())
            && self.std.iter().all(|s| s.is_finite() && *s >= 0.0)
    }
}

/// Encodes both categorical columns and assembles raw feature vectors plus targets.
pub fn preprocess(
    records: &[YieldRecord],
    crop: &LabelEncoder,
    soil: &LabelEncoder,
) -> Result<(Vec<FeatureVector>, Vec<f64>), EncodeError> {
    let mut features = Vec::with_capacity(records.len());
    let mut targets = Vec::with_capacity(records.len());
    for r in records {
        features.push(assemble(
            crop.encode(&r.crop_type)?,
            soil.encode(&r.soil_type)?,
            r.rainfall_mm,
            r.temperature_c,
            r.fertilizer_kg_ha,
        ));
        targets.push(r.yield_tons_ha);
    }
    Ok((features, targets))
}

/// Places inputs in feature-slot order.
pub fn assemble(crop_code: usize, soil_code: usize, rainfall: f64, temperature: f64, fertilizer: f64) -> FeatureVector {
    [crop_code as f64, soil_code as f64, rainfall, temperature, fertilizer]
}
