// Module for loading and writing yield datasets. It reads the csv file, validates headers, and skips malformed rows.
use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::DatasetError;

const REQUIRED_COLUMNS: [&str; 6] = [
    "crop_type",
    "soil_type",
    "rainfall_mm",
    "temperature_c",
    "fertilizer_kg_ha",
    "yield_tons_ha",
];

/// One labeled sample, matching the dataset CSV columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldRecord {
    pub crop_type: String,
    pub soil_type: String,
    pub rainfall_mm: f64,
    pub temperature_c: f64,
    pub fertilizer_kg_ha: f64,
    pub yield_tons_ha: f64,
}

impl YieldRecord {
    /// Why this record cannot be used as a training sample, if anything.
    pub fn defect(&self) -> Option<String> {
        let numeric = [
            ("rainfall_mm", self.rainfall_mm),
            ("temperature_c", self.temperature_c),
            ("fertilizer_kg_ha", self.fertilizer_kg_ha),
            ("yield_tons_ha", self.yield_tons_ha),
        ];
        if let Some((name, v)) = numeric.iter().find(|(_, v)| !v.is_finite()) {
            return Some(format!("{name} is not finite ({v})"));
        }
        if self.yield_tons_ha <= 0.0 {
            return Some(format!("yield_tons_ha must be positive, got {}", self.yield_tons_ha));
        }
        None
    }
}

/// Count, mean, min and max of one numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: &'static str,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Per-column summary of the numeric dataset columns, in CSV order.
/// An empty dataset yields NaN statistics with a zero count.
pub fn describe(records: &[YieldRecord]) -> Vec<ColumnSummary> {
    let columns: [(&'static str, fn(&YieldRecord) -> f64); 4] = [
        ("rainfall_mm", |r: &YieldRecord| r.rainfall_mm),
        ("temperature_c", |r: &YieldRecord| r.temperature_c),
        ("fertilizer_kg_ha", |r: &YieldRecord| r.fertilizer_kg_ha),
        ("yield_tons_ha", |r: &YieldRecord| r.yield_tons_ha),
    ];
    columns
        .iter()
        .map(|&(name, get)| {
            let count = records.len();
            let (sum, min, max) = records.iter().map(get).fold(
                (0.0, f64::INFINITY, f64::NEG_INFINITY),
                |(s, lo, hi), v| (s + v, lo.min(v), hi.max(v)),
            );
            if count == 0 {
                ColumnSummary { name, count, mean: f64::NAN, min: f64::NAN, max: f64::NAN }
            } else {
                ColumnSummary { name, count, mean: sum / count as f64, min, max }
            }
        })
        .collect()
}

pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<YieldRecord>, DatasetError> {
    let file = File::open(path.as_ref())?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(DatasetError::MissingColumn(column));
        }
    }
    let expected_len = headers.len();

    let mut out = Vec::new();
    for result in rdr.records() {
        let raw: StringRecord = result?;
        let line = raw.position().map(|p| p.line()).unwrap_or(0);

        if raw.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        if raw.len() != expected_len {
            warn!(line, expected = expected_len, found = raw.len(), "skipping row with wrong field count");
            continue;
        }

        match raw.deserialize::<YieldRecord>(Some(&headers)) {
            Ok(rec) => match rec.defect() {
                Some(reason) => warn!(line, %reason, "skipping invalid record"),
                None => out.push(rec),
            },
            Err(e) => warn!(line, error = %e, "skipping malformed record"),
        }
    }

    info!(path = %path.as_ref().display(), rows = out.len(), "loaded dataset");
    Ok(out)
}

pub fn write_csv(path: impl AsRef<Path>, records: &[YieldRecord]) -> Result<(), DatasetError> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path.as_ref())?;
    for rec in records {
        wtr.serialize(rec)?;
    }
    wtr.flush()?;
    info!(path = %path.as_ref().display(), rows = records.len(), "wrote dataset");
    Ok(())
}
