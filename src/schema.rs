// Request and response shapes at the service boundary.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

pub const RAINFALL_LIMITS: (f64, f64) = (0.0, 2000.0);
pub const TEMPERATURE_LIMITS: (f64, f64) = (0.0, 50.0);
pub const FERTILIZER_LIMITS: (f64, f64) = (0.0, 500.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub crop_type: String,
    pub soil_type: String,
    pub rainfall_mm: f64,
    pub temperature_c: f64,
    pub fertilizer_kg_ha: f64,
}

impl PredictionRequest {
    /// Range checks for the numeric fields. Categories are checked by the pipeline.
    pub fn validate(&self) -> Result<(), RequestError> {
        check("rainfall_mm", self.rainfall_mm, RAINFALL_LIMITS)?;
        check("temperature_c", self.temperature_c, TEMPERATURE_LIMITS)?;
        check("fertilizer_kg_ha", self.fertilizer_kg_ha, FERTILIZER_LIMITS)?;
        Ok(())
    }
}

fn check(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), RequestError> {
    // NaN fails the range test
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(RequestError::OutOfRange { field, value, min, max })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Tons per hectare.
    pub predicted_yield: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub feature_importance: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}
