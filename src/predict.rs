//! Inference over immutable, shared artifacts.
//!
//! [`ServiceState`] is built once (from a training run or from disk) and
//! never mutated, so any number of threads may call [`ServiceState::predict`]
//! through an `Arc` without locking. [`PredictionService`] adds the
//! readiness gate: it answers `ServiceUnavailable` until a full, validated
//! state is present.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::artifacts::{self, LoadedArtifacts};
use crate::error::{ArtifactError, EncodeError, PredictError};
use crate::model::Model;
use crate::preprocess::{assemble, LabelEncoder, StandardScaler, PUBLIC_FEATURE_NAMES};
use crate::schema::{HealthResponse, PredictionRequest, PredictionResponse};
use crate::train::TrainedArtifacts;
use crate::vocab::{Crop, Soil};

/// Half-width of the confidence band as a fraction of the prediction.
pub const CONFIDENCE_MARGIN: f64 = 0.1;

/// Fixed ±10% band; the lower bound never drops below zero.
pub fn confidence_band(predicted_yield: f64) -> (f64, f64) {
    let lower = (predicted_yield * (1.0 - CONFIDENCE_MARGIN)).max(0.0);
    let upper = predicted_yield * (1.0 + CONFIDENCE_MARGIN);
    (lower, upper)
}

/// Loaded encoders, scaler and model.
#[derive(Debug, Clone)]
pub struct ServiceState {
    model: Model,
    scaler: StandardScaler,
    crop_encoder: LabelEncoder,
    soil_encoder: LabelEncoder,
}

impl ServiceState {
    pub fn new(model: Model, scaler: StandardScaler, crop_encoder: LabelEncoder, soil_encoder: LabelEncoder) -> Self {
        ServiceState { model, scaler, crop_encoder, soil_encoder }
    }

    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let LoadedArtifacts { model, scaler, crop_encoder, soil_encoder, .. } = artifacts::load(dir)?;
        Ok(Self::new(model, scaler, crop_encoder, soil_encoder))
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn predict(
        &self,
        crop_type: &str,
        soil_type: &str,
        rainfall_mm: f64,
        temperature_c: f64,
        fertilizer_kg_ha: f64,
    ) -> Result<PredictionResponse, PredictError> {
        let crop_code = encode_category::<Crop>("crop_type", crop_type, &self.crop_encoder)?;
        let soil_code = encode_category::<Soil>("soil_type", soil_type, &self.soil_encoder)?;

        let raw = assemble(crop_code, soil_code, rainfall_mm, temperature_c, fertilizer_kg_ha);
        let scaled = self.scaler.transform(&raw);
        // trees route NaN/inf down a branch instead of propagating it
        if !raw.iter().chain(&scaled).all(|v| v.is_finite()) {
            let err = PredictError::Prediction {
                reason: format!("non-finite features {raw:?} (scaled {scaled:?})"),
            };
            error!(error = %err, "prediction failed");
            return Err(err);
        }
        let predicted_yield = self.model.predict(&scaled);
        if !predicted_yield.is_finite() {
            let err = PredictError::Prediction {
                reason: format!("model returned non-finite value {predicted_yield} for features {raw:?}"),
            };
            error!(error = %err, "prediction failed");
            return Err(err);
        }

        let (confidence_lower, confidence_upper) = confidence_band(predicted_yield);
        let feature_importance: BTreeMap<String, f64> = PUBLIC_FEATURE_NAMES
            .iter()
            .map(|name| name.to_string())
            .zip(self.model.feature_importances())
            .collect();

        debug!(crop_type, soil_type, predicted_yield, "prediction");
        Ok(PredictionResponse { predicted_yield, confidence_lower, confidence_upper, feature_importance })
    }

    pub fn predict_request(&self, req: &PredictionRequest) -> Result<PredictionResponse, PredictError> {
        self.predict(&req.crop_type, &req.soil_type, req.rainfall_mm, req.temperature_c, req.fertilizer_kg_ha)
    }
}

impl From<TrainedArtifacts> for ServiceState {
    fn from(t: TrainedArtifacts) -> Self {
        ServiceState::new(t.model, t.scaler, t.crop_encoder, t.soil_encoder)
    }
}

/// A label must be in the fixed vocabulary and in the fitted encoder.
fn encode_category<V: std::str::FromStr>(
    field: &'static str,
    label: &str,
    encoder: &LabelEncoder,
) -> Result<usize, PredictError> {
    let unknown = || PredictError::InvalidCategory {
        field,
        source: EncodeError::UnknownLabel { label: label.to_string() },
    };
    if label.parse::<V>().is_err() {
        return Err(unknown());
    }
    encoder.encode(label).map_err(|source| PredictError::InvalidCategory { field, source })
}

/// Readiness gate in front of a shared [`ServiceState`].
#[derive(Debug, Clone, Default)]
pub struct PredictionService {
    state: Option<Arc<ServiceState>>,
}

impl PredictionService {
    pub fn unavailable() -> Self {
        PredictionService { state: None }
    }

    pub fn ready(state: Arc<ServiceState>) -> Self {
        PredictionService { state: Some(state) }
    }

    /// Loads the artifact directory; on failure the service stays unavailable.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        match ServiceState::load(dir) {
            Ok(state) => {
                info!(dir = %dir.display(), model = ?state.model.kind(), "model and preprocessors loaded");
                Self::ready(Arc::new(state))
            }
            Err(err) => {
                error!(dir = %dir.display(), error = %err, "failed to load artifacts");
                Self::unavailable()
            }
        }
    }

    pub fn state(&self) -> Result<&Arc<ServiceState>, PredictError> {
        self.state.as_ref().ok_or(PredictError::ServiceUnavailable)
    }

    pub fn health(&self) -> Result<HealthResponse, PredictError> {
        self.state()?;
        Ok(HealthResponse { status: "healthy".into(), message: "model loaded and serving".into() })
    }

    pub fn predict(&self, req: &PredictionRequest) -> Result<PredictionResponse, PredictError> {
        self.state()?.predict_request(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::forest::{ForestParams, RandomForest};
    use crate::model::LinearModel;
    use crate::preprocess::{FeatureVector, N_FEATURES};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rstest::{fixture, rstest};

    fn encoders() -> (LabelEncoder, LabelEncoder) {
        (LabelEncoder::fit(Crop::ALL.map(Crop::as_str)), LabelEncoder::fit(Soil::ALL.map(Soil::as_str)))
    }

    fn scaler() -> StandardScaler {
        let rows: Vec<FeatureVector> = vec![
            [0.0, 0.0, 600.0, 20.0, 100.0],
            [5.0, 3.0, 1000.0, 30.0, 200.0],
        ];
        StandardScaler::fit(&rows).unwrap()
    }

    fn linear_state(intercept: f64) -> ServiceState {
        let (crop, soil) = encoders();
        let model = Model::Linear(LinearModel { coefficients: [0.1, 0.2, 0.5, 0.3, 0.4], intercept });
        ServiceState::new(model, scaler(), crop, soil)
    }

    #[fixture]
    fn ensemble_state() -> ServiceState {
        let (crop, soil) = encoders();
        let x: Vec<FeatureVector> = (0..60)
            .map(|i| {
                let v = i as f64;
                [(i % 6) as f64, (i % 4) as f64, v - 30.0, (v * 0.7).sin(), (v * 0.3).cos()]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 4.0 + r[0] * 0.5 + r[2].abs() * 0.1).collect();
        let params = ForestParams { n_trees: 4, max_depth: 5, ..ForestParams::default() };
        let forest = RandomForest::fit(&x, &y, &params, 42).unwrap();
        ServiceState::new(Model::Ensemble(forest), scaler(), crop, soil)
    }

    #[test]
    fn band_is_ten_percent() {
        let state = linear_state(5.0);
        let out = state.predict("Wheat", "Loamy", 800.0, 25.0, 150.0).unwrap();
        assert_relative_eq!(out.confidence_lower, 0.9 * out.predicted_yield, max_relative = 1e-12);
        assert_relative_eq!(out.confidence_upper, 1.1 * out.predicted_yield, max_relative = 1e-12);
    }

    #[rstest]
    #[case(-3.0)]
    #[case(-1e9)]
    #[case(0.0)]
    fn lower_bound_never_negative(#[case] y: f64) {
        let (lower, _) = confidence_band(y);
        assert!(lower >= 0.0);
    }

    #[test]
    fn negative_prediction_is_clamped() {
        let out = linear_state(-50.0).predict("Barley", "Sandy", 300.0, 15.0, 50.0).unwrap();
        assert!(out.predicted_yield < 0.0);
        assert_eq!(out.confidence_lower, 0.0);
    }

    #[test]
    fn linear_reports_uniform_importance() {
        let out = linear_state(5.0).predict("Wheat", "Loamy", 800.0, 25.0, 150.0).unwrap();
        let keys: Vec<&str> = out.feature_importance.keys().map(String::as_str).collect();
        assert_eq!(keys, ["crop_type", "fertilizer_kg_ha", "rainfall_mm", "soil_type", "temperature_c"]);
        assert!(out.feature_importance.values().all(|v| *v == 0.20));
    }

    #[rstest]
    fn ensemble_importance_sums_to_one(ensemble_state: ServiceState) {
        let out = ensemble_state.predict("Wheat", "Loamy", 800.0, 25.0, 150.0).unwrap();
        assert_eq!(out.feature_importance.len(), N_FEATURES);
        assert_abs_diff_eq!(out.feature_importance.values().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[rstest]
    fn repeated_calls_are_bit_identical(ensemble_state: ServiceState) {
        let a = ensemble_state.predict("Corn", "Silty", 910.0, 27.5, 180.0).unwrap();
        let b = ensemble_state.predict("Corn", "Silty", 910.0, 27.5, 180.0).unwrap();
        assert_eq!(a.predicted_yield.to_bits(), b.predicted_yield.to_bits());
        assert_eq!(a, b);
    }

    #[rstest]
    fn concurrent_calls_agree(ensemble_state: ServiceState) {
        let state = Arc::new(ensemble_state);
        let expected = state.predict("Rice", "Clay", 700.0, 22.0, 120.0).unwrap();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let state = Arc::clone(&state);
                    s.spawn(move || state.predict("Rice", "Clay", 700.0, 22.0, 120.0).unwrap())
                })
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), expected);
            }
        });
    }

    #[rstest]
    #[case("Tomato", "Loamy", "crop_type")]
    #[case("wheat", "Loamy", "crop_type")]
    #[case("Wheat", "Peat", "soil_type")]
    fn unknown_category_is_a_client_error(#[case] crop: &str, #[case] soil: &str, #[case] expected: &str) {
        let err = linear_state(5.0).predict(crop, soil, 800.0, 25.0, 150.0).unwrap_err();
        match &err {
            PredictError::InvalidCategory { field, source: EncodeError::UnknownLabel { .. } } => {
                assert_eq!(*field, expected)
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Client);
    }

    #[test]
    fn vocabulary_label_missing_from_encoder_is_rejected() {
        let (_, soil) = encoders();
        let crop = LabelEncoder::fit(["Wheat", "Rice"]);
        let state = ServiceState::new(linear_state(1.0).model().clone(), scaler(), crop, soil);
        let err = state.predict("Potato", "Clay", 800.0, 25.0, 150.0).unwrap_err();
        assert!(matches!(err, PredictError::InvalidCategory { field: "crop_type", .. }));
    }

    #[test]
    fn non_finite_output_is_a_prediction_error() {
        let err = linear_state(5.0).predict("Wheat", "Loamy", f64::NAN, 25.0, 150.0).unwrap_err();
        assert!(matches!(err, PredictError::Prediction { .. }));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[rstest]
    #[case(f64::NAN, 25.0, 150.0)]
    #[case(f64::INFINITY, 25.0, 150.0)]
    #[case(800.0, f64::NEG_INFINITY, 150.0)]
    #[case(800.0, 25.0, f64::NAN)]
    fn ensemble_rejects_non_finite_features(
        ensemble_state: ServiceState,
        #[case] rainfall: f64,
        #[case] temperature: f64,
        #[case] fertilizer: f64,
    ) {
        let err = ensemble_state.predict("Wheat", "Loamy", rainfall, temperature, fertilizer).unwrap_err();
        assert!(matches!(err, PredictError::Prediction { .. }));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn unloaded_service_is_unavailable() {
        let service = PredictionService::unavailable();
        let req = PredictionRequest {
            crop_type: "Wheat".into(),
            soil_type: "Loamy".into(),
            rainfall_mm: 800.0,
            temperature_c: 25.0,
            fertilizer_kg_ha: 150.0,
        };
        let err = service.predict(&req).unwrap_err();
        assert!(matches!(err, PredictError::ServiceUnavailable));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(service.health().is_err());
    }

    #[test]
    fn missing_directory_leaves_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let service = PredictionService::from_dir(dir.path().join("nope"));
        assert!(matches!(service.health(), Err(PredictError::ServiceUnavailable)));
    }

    #[test]
    fn ready_service_serves() {
        let service = PredictionService::ready(Arc::new(linear_state(5.0)));
        assert_eq!(service.health().unwrap().status, "healthy");
    }
}
