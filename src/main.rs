/// Command-line front end: simulate data, train and persist the model, serve predictions.
use std::error::Error;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use plotters::prelude::*;
use tracing::info;

use cropcast::config::load_settings;
use cropcast::io::{describe, load_csv, write_csv};
use cropcast::preprocess::PUBLIC_FEATURE_NAMES;
use cropcast::schema::PredictionRequest;
use cropcast::simulate::generate_dataset;
use cropcast::train::{train, TrainingReport};
use cropcast::vocab::{crop_names, soil_names};
use cropcast::{artifacts, telemetry, ErrorKind, PredictionService};

#[derive(Parser)]
#[command(name = "cropcast", version, about = "Crop yield prediction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate a labeled dataset and write it as CSV.
    Generate {
        #[arg(long, default_value_t = 2000)]
        samples: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value = "dataset.csv")]
        output: PathBuf,
    },
    /// Fit both candidates, keep the better one and persist the artifacts.
    Train {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        dataset: Option<PathBuf>,
        #[arg(long)]
        artifacts: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        samples: Option<usize>,
        /// Skip the importance chart.
        #[arg(long)]
        no_plot: bool,
    },
    /// Predict the yield for one field.
    Predict {
        #[arg(long, default_value = "model")]
        artifacts: PathBuf,
        #[arg(long)]
        crop: String,
        #[arg(long)]
        soil: String,
        #[arg(long)]
        rainfall: f64,
        #[arg(long)]
        temperature: f64,
        #[arg(long)]
        fertilizer: f64,
    },
    /// List valid crop types.
    Crops,
    /// List valid soil types.
    Soils,
    /// Check that the artifact set loads.
    Health {
        #[arg(long, default_value = "model")]
        artifacts: PathBuf,
    },
}

/// Draws a horizontal bar chart of feature importances and saves it as a PNG
/// input: feature names with their importance, output path
/// output: none (writes the PNG)
/// logic: split "results" into names and values; set up PNG backend;
/// build Cartesian chart; label Y ticks with feature names; draw one bar per feature
fn plot_importances(results: &[(String, f64)], path: &Path) -> Result<(), Box<dyn Error>> {
    let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
    let values: Vec<f64> = results.iter().map(|(_, v)| *v).collect();
    let count = results.len();

    let max_x = values.iter().cloned().fold(0.0_f64, f64::max).max(1e-6);
    let x_range = 0.0..(max_x * 1.1);

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Importances", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(200)
        .build_cartesian_2d(x_range, 0..count)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .y_labels(count)
        .y_label_formatter(&|idx| {
            let i = *idx as usize;
            if i < count {
                names[i].to_string()
            } else {
                String::new()
            }
        })
        .x_desc("Importance")
        .y_desc("Feature")
        .draw()?;

    chart.draw_series(
        values.iter().enumerate().map(|(i, &v)| {
            Rectangle::new([(0.0, i), (v, i + 1)], BLUE.mix(0.5).filled())
        })
    )?;

    root.present()?;
    Ok(())
}

fn print_report(report: &TrainingReport) {
    println!("{:<20} {:>8} {:>8} {:>8}", "model", "MAE", "RMSE", "R²");
    for (name, m) in [("Linear Regression", &report.linear), ("Random Forest", &report.ensemble)] {
        println!("{:<20} {:>8.3} {:>8.3} {:>8.3}", name, m.mae, m.rmse, m.r2);
    }
    println!("\nBest model: {}", report.selected.display_name());
    println!("\nFeature importances:");
    let mut ranked: Vec<(&str, f64)> = PUBLIC_FEATURE_NAMES.iter().copied().zip(report.feature_importance).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (name, v) in ranked {
        println!("{:<20} {:>8.4}", name, v);
    }
}

/// load or simulate data, train, persist, and visualize
/// input: CLI overrides on top of the TOML settings
/// output: none (artifacts written to the configured directory)
fn run_train(
    config: Option<PathBuf>,
    dataset: Option<PathBuf>,
    artifacts_dir: Option<PathBuf>,
    seed: Option<u64>,
    samples: Option<usize>,
    no_plot: bool,
) -> Result<()> {
    let mut settings = load_settings(config.as_deref())?;
    if let Some(seed) = seed {
        settings.seed = seed;
    }
    if let Some(n) = samples {
        settings.n_samples = n;
    }
    if let Some(dir) = artifacts_dir {
        settings.artifacts_dir = dir;
    }
    if dataset.is_some() {
        settings.dataset = dataset;
    }

    let records = match &settings.dataset {
        Some(path) => load_csv(path).with_context(|| format!("failed to load dataset {}", path.display()))?,
        None => {
            info!(samples = settings.n_samples, seed = settings.seed, "generating agricultural dataset");
            generate_dataset(settings.n_samples, settings.seed)?
        }
    };
    info!(rows = records.len(), columns = 6, "dataset shape");
    for c in describe(&records) {
        info!(column = c.name, count = c.count, mean = c.mean, min = c.min, max = c.max, "dataset summary");
    }

    let trained = train(&records, &settings.train_options())?;
    artifacts::save(&settings.artifacts_dir, &trained, settings.seed, records.len())
        .context("failed to save artifacts")?;
    print_report(&trained.report);

    if let (Some(path), false) = (&settings.importance_plot, no_plot) {
        let results: Vec<(String, f64)> = PUBLIC_FEATURE_NAMES
            .iter()
            .map(|n| n.to_string())
            .zip(trained.report.feature_importance)
            .collect();
        plot_importances(&results, path).map_err(|e| anyhow!("failed to plot importances: {e}"))?;
        println!("Wrote {}", path.display());
    }
    println!("Model saved to {}", settings.artifacts_dir.display());
    Ok(())
}

fn run_predict(artifacts_dir: &Path, request: PredictionRequest) -> Result<()> {
    request.validate().context("invalid input")?;
    let service = PredictionService::from_dir(artifacts_dir);
    let response = service.predict(&request).map_err(|e| match e.kind() {
        ErrorKind::Client => anyhow!("invalid input: {e}"),
        ErrorKind::Unavailable => anyhow!("service unavailable: {e}; run `cropcast train` first"),
        ErrorKind::Internal => anyhow!("prediction error: {e}"),
    })?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Generate { samples, seed, output } => {
            let records = generate_dataset(samples, seed)?;
            write_csv(&output, &records).with_context(|| format!("failed to write {}", output.display()))?;
            println!("Wrote {} samples to {}", records.len(), output.display());
        }
        Command::Train { config, dataset, artifacts, seed, samples, no_plot } => {
            run_train(config, dataset, artifacts, seed, samples, no_plot)?;
        }
        Command::Predict { artifacts, crop, soil, rainfall, temperature, fertilizer } => {
            let request = PredictionRequest {
                crop_type: crop,
                soil_type: soil,
                rainfall_mm: rainfall,
                temperature_c: temperature,
                fertilizer_kg_ha: fertilizer,
            };
            run_predict(&artifacts, request)?;
        }
        Command::Crops => println!("{}", serde_json::json!({ "crops": crop_names() })),
        Command::Soils => println!("{}", serde_json::json!({ "soils": soil_names() })),
        Command::Health { artifacts } => {
            let health = PredictionService::from_dir(&artifacts).health().map_err(|e| anyhow!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
    }
    Ok(())
}
