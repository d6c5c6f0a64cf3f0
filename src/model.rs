/// Regression models: an OLS linear model fitted with linfa, and the tree ensemble.
use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::forest::RandomForest;
use crate::preprocess::{FeatureVector, N_FEATURES};

/// Fixed importance reported for the linear model, which has no native one.
pub const UNIFORM_IMPORTANCE: f64 = 0.20;

/// Coefficients and intercept of an ordinary least-squares fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: [f64; N_FEATURES],
    pub intercept: f64,
}

impl LinearModel {
    pub fn fit(x: &[FeatureVector], y: &[f64]) -> Result<Self, TrainError> {
        let n = x.len();
        if n <= N_FEATURES {
            return Err(TrainError::TooFewSamples { n, min: N_FEATURES + 1 });
        }
        let mut records = Array2::<f64>::zeros((n, N_FEATURES));
        for (i, row) in x.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                records[(i, j)] = *v;
            }
        }
        let targets = Array1::from(y.to_vec());
        let ds = Dataset::new(records, targets);
        let fitted = LinearRegression::new().fit(&ds)?;

        let params = fitted.params();
        if params.len() != N_FEATURES {
            return Err(TrainError::Coefficients { got: params.len(), expected: N_FEATURES });
        }
        let mut coefficients = [0.0; N_FEATURES];
        for (c, p) in coefficients.iter_mut().zip(params.iter()) {
            *c = *p;
        }
        Ok(LinearModel { coefficients, intercept: fitted.intercept() })
    }

    pub fn predict(&self, x: &FeatureVector) -> f64 {
        self.intercept + self.coefficients.iter().zip(x).map(|(c, v)| c * v).sum::<f64>()
    }
}

/// Which candidate a [`Model`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Linear,
    Ensemble,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Linear => "Linear Regression",
            ModelKind::Ensemble => "Random Forest",
        }
    }
}

/// The selected, fitted model as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum Model {
    Linear(LinearModel),
    Ensemble(RandomForest),
}

impl Model {
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::Linear(_) => ModelKind::Linear,
            Model::Ensemble(_) => ModelKind::Ensemble,
        }
    }

    pub fn predict(&self, x: &FeatureVector) -> f64 {
        match self {
            Model::Linear(m) => m.predict(x),
            Model::Ensemble(f) => f.predict(x),
        }
    }

    pub fn predict_all(&self, rows: &[FeatureVector]) -> Vec<f64> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    /// Slot-ordered importances: the forest's normalized impurity decrease,
    /// or a flat 0.20 for the linear model.
    pub fn feature_importances(&self) -> [f64; N_FEATURES] {
        match self {
            Model::Linear(_) => [UNIFORM_IMPORTANCE; N_FEATURES],
            Model::Ensemble(f) => *f.feature_importances(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        match self {
            Model::Linear(m) => m.intercept.is_finite() && m.coefficients.iter().all(|c| c.is_finite()),
            Model::Ensemble(f) => f.is_well_formed(),
        }
    }
}

/// The ensemble wins only with a strictly higher held-out R².
pub fn select_model(linear_r2: f64, ensemble_r2: f64) -> ModelKind {
    if ensemble_r2 > linear_r2 {
        ModelKind::Ensemble
    } else {
        ModelKind::Linear
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestParams;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    fn linear_data() -> (Vec<FeatureVector>, Vec<f64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let a = i as f64;
            let row = [a % 6.0, (a * 7.0) % 4.0, a * 0.5, (a * 3.0) % 11.0, (a * a) % 13.0];
            y.push(1.5 + 2.0 * row[0] - 0.5 * row[1] + 0.25 * row[2] + row[3] - 3.0 * row[4]);
            x.push(row);
        }
        (x, y)
    }

    #[test]
    fn ols_recovers_exact_coefficients() {
        let (x, y) = linear_data();
        let m = LinearModel::fit(&x, &y).unwrap();
        let expected = [2.0, -0.5, 0.25, 1.0, -3.0];
        for (c, e) in m.coefficients.iter().zip(expected) {
            assert_abs_diff_eq!(*c, e, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(m.intercept, 1.5, epsilon = 1e-6);
        assert_abs_diff_eq!(m.predict(&x[4]), y[4], epsilon = 1e-6);
    }

    #[test]
    fn ols_needs_more_rows_than_features() {
        let (x, y) = linear_data();
        assert!(matches!(
            LinearModel::fit(&x[..5], &y[..5]),
            Err(TrainError::TooFewSamples { .. })
        ));
    }

    #[rstest]
    #[case(0.80, 0.95, ModelKind::Ensemble)]
    #[case(0.95, 0.80, ModelKind::Linear)]
    #[case(0.90, 0.90, ModelKind::Linear)]
    fn selection_rule(#[case] linear: f64, #[case] ensemble: f64, #[case] expected: ModelKind) {
        assert_eq!(select_model(linear, ensemble), expected);
    }

    #[test]
    fn linear_importance_is_uniform() {
        let (x, y) = linear_data();
        let model = Model::Linear(LinearModel::fit(&x, &y).unwrap());
        assert_eq!(model.feature_importances(), [0.20; N_FEATURES]);
        assert_eq!(model.kind(), ModelKind::Linear);
    }

    #[test]
    fn ensemble_importance_comes_from_forest() {
        let (x, y) = linear_data();
        let params = ForestParams { n_trees: 3, max_depth: 4, ..ForestParams::default() };
        let forest = RandomForest::fit(&x, &y, &params, 42).unwrap();
        let model = Model::Ensemble(forest.clone());
        assert_eq!(&model.feature_importances(), forest.feature_importances());
        assert_abs_diff_eq!(model.feature_importances().iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn model_json_is_tagged() {
        let model = Model::Linear(LinearModel { coefficients: [1.0; N_FEATURES], intercept: 0.5 });
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["kind"], "linear");
        let back: Model = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
    }
}
