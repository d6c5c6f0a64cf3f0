use std::sync::Arc;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use cropcast::artifacts;
use cropcast::forest::ForestParams;
use cropcast::io::{load_csv, write_csv};
use cropcast::model::ModelKind;
use cropcast::simulate::generate_dataset;
use cropcast::train::{train, TrainOptions};
use cropcast::{PredictError, PredictionRequest, PredictionService, ServiceState};

fn wheat() -> PredictionRequest {
    PredictionRequest {
        crop_type: "Wheat".into(),
        soil_type: "Loamy".into(),
        rainfall_mm: 800.0,
        temperature_c: 25.0,
        fertilizer_kg_ha: 150.0,
    }
}

#[test]
fn reference_run_trains_persists_and_serves() {
    // seed 42, 2000 samples, 100 trees of depth 10
    let data = generate_dataset(2000, 42).unwrap();
    let opts = TrainOptions::default();
    let trained = train(&data, &opts).unwrap();
    assert_eq!(trained.report.n_test, 400);
    assert_eq!(trained.report.selected, ModelKind::Ensemble);

    let dir = tempfile::tempdir().unwrap();
    artifacts::save(dir.path(), &trained, opts.seed, data.len()).unwrap();

    let service = PredictionService::from_dir(dir.path());
    assert!(service.health().is_ok());

    let out = service.predict(&wheat()).unwrap();
    assert!(out.predicted_yield > 0.0);
    assert_relative_eq!(out.confidence_lower, 0.9 * out.predicted_yield, max_relative = 1e-12);
    assert_relative_eq!(out.confidence_upper, 1.1 * out.predicted_yield, max_relative = 1e-12);

    let keys: Vec<&str> = out.feature_importance.keys().map(String::as_str).collect();
    assert_eq!(keys, ["crop_type", "fertilizer_kg_ha", "rainfall_mm", "soil_type", "temperature_c"]);
    assert_abs_diff_eq!(out.feature_importance.values().sum::<f64>(), 1.0, epsilon = 1e-9);
    // potato's base yield dominates the variance
    assert!(out.feature_importance["crop_type"] > out.feature_importance["soil_type"]);

    // loaded state predicts exactly like the in-memory one
    let in_memory = ServiceState::from(trained);
    assert_eq!(in_memory.predict_request(&wheat()).unwrap(), out);
}

#[test]
fn csv_dataset_trains_like_simulated_one() {
    let data = generate_dataset(300, 7).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    write_csv(&path, &data).unwrap();
    let loaded = load_csv(&path).unwrap();
    assert_eq!(loaded, data);

    let opts = TrainOptions {
        seed: 7,
        forest: ForestParams { n_trees: 4, max_depth: 6, ..ForestParams::default() },
        ..TrainOptions::default()
    };
    let a = train(&data, &opts).unwrap();
    let b = train(&loaded, &opts).unwrap();
    assert_eq!(a.model, b.model);
}

#[test]
fn non_finite_csv_cells_do_not_poison_the_artifacts() {
    let data = generate_dataset(300, 7).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    write_csv(&path, &data).unwrap();
    let mut text = std::fs::read_to_string(&path).unwrap();
    text.push_str("Wheat,Loamy,800.0,25.0,150.0,NaN\nRice,Clay,inf,22.0,120.0,5.0\n");
    std::fs::write(&path, text).unwrap();

    let loaded = load_csv(&path).unwrap();
    assert_eq!(loaded, data);

    let opts = TrainOptions {
        seed: 7,
        forest: ForestParams { n_trees: 3, max_depth: 5, ..ForestParams::default() },
        ..TrainOptions::default()
    };
    let trained = train(&loaded, &opts).unwrap();
    assert!(trained.report.linear.r2.is_finite());
    let out_dir = dir.path().join("model");
    artifacts::save(&out_dir, &trained, opts.seed, loaded.len()).unwrap();
    assert!(PredictionService::from_dir(&out_dir).health().is_ok());
}

#[test]
fn unknown_crop_never_reaches_the_model() {
    let data = generate_dataset(200, 42).unwrap();
    let opts = TrainOptions {
        forest: ForestParams { n_trees: 2, max_depth: 4, ..ForestParams::default() },
        ..TrainOptions::default()
    };
    let service = PredictionService::ready(Arc::new(ServiceState::from(train(&data, &opts).unwrap())));
    let mut req = wheat();
    req.crop_type = "Tomato".into();
    assert!(matches!(service.predict(&req), Err(PredictError::InvalidCategory { field: "crop_type", .. })));
}
