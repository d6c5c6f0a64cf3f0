//! Crop yield estimation from crop, soil, rainfall, temperature and fertilizer.
//!
//! Training simulates agronomic samples, fits a linear model and a tree
//! ensemble on standardized features, and keeps whichever scores the higher
//! held-out R². Inference encodes, scales and predicts against the loaded
//! artifacts, then attaches a ±10% band and per-feature importances.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod forest;
pub mod io;
pub mod metrics;
pub mod model;
pub mod predict;
pub mod preprocess;
pub mod schema;
pub mod simulate;
pub mod telemetry;
pub mod train;
pub mod vocab;

pub use error::{ArtifactError, EncodeError, ErrorKind, PredictError, TrainError};
pub use predict::{PredictionService, ServiceState};
pub use schema::{PredictionRequest, PredictionResponse};
