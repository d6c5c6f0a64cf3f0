//! Synthetic agronomic data.
//!
//! Each sample draws a crop and soil uniformly, draws weather and fertilizer
//! from clamped normals, and derives a yield from the crop's base yield, the
//! soil multiplier and three quadratic response curves, plus 10% noise.
//! The whole stream is a function of the seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::error::TrainError;
use crate::io::YieldRecord;
use crate::vocab::{Crop, Soil};

/// Lowest yield ever reported, in tons/hectare.
pub const MIN_YIELD: f64 = 0.5;

pub const RAINFALL_RANGE: (f64, f64) = (300.0, 1500.0);
pub const TEMPERATURE_RANGE: (f64, f64) = (15.0, 35.0);
pub const FERTILIZER_RANGE: (f64, f64) = (50.0, 300.0);

const NOISE_FRACTION: f64 = 0.1;

pub fn rainfall_effect(rainfall_mm: f64) -> f64 {
    let d = rainfall_mm - 800.0;
    1.0 + 0.0003 * d - 0.0000005 * d * d
}

pub fn temperature_effect(temperature_c: f64) -> f64 {
    let d = temperature_c - 25.0;
    1.0 + 0.02 * d - 0.001 * d * d
}

/// Diminishing returns; not centered on a reference dose.
pub fn fertilizer_effect(fertilizer_kg_ha: f64) -> f64 {
    1.0 + 0.002 * fertilizer_kg_ha - 0.000003 * fertilizer_kg_ha * fertilizer_kg_ha
}

/// Noise-free yield for the given conditions.
pub fn expected_yield(crop: Crop, soil: Soil, rainfall_mm: f64, temperature_c: f64, fertilizer_kg_ha: f64) -> f64 {
    crop.base_yield()
        * soil.multiplier()
        * rainfall_effect(rainfall_mm)
        * temperature_effect(temperature_c)
        * fertilizer_effect(fertilizer_kg_ha)
}

/// Seeded sample generator.
pub struct YieldSimulator {
    rng: StdRng,
    rainfall: Normal<f64>,
    temperature: Normal<f64>,
    fertilizer: Normal<f64>,
}

impl YieldSimulator {
    pub fn new(seed: u64) -> Result<Self, TrainError> {
        Ok(YieldSimulator {
            rng: StdRng::seed_from_u64(seed),
            rainfall: Normal::new(800.0, 200.0)?,
            temperature: Normal::new(25.0, 5.0)?,
            fertilizer: Normal::new(150.0, 50.0)?,
        })
    }

    pub fn sample(&mut self) -> YieldRecord {
        let crop = Crop::ALL[self.rng.random_range(0..Crop::ALL.len())];
        let soil = Soil::ALL[self.rng.random_range(0..Soil::ALL.len())];
        let rainfall_mm = self.rainfall.sample(&mut self.rng).clamp(RAINFALL_RANGE.0, RAINFALL_RANGE.1);
        let temperature_c = self.temperature.sample(&mut self.rng).clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        let fertilizer_kg_ha = self.fertilizer.sample(&mut self.rng).clamp(FERTILIZER_RANGE.0, FERTILIZER_RANGE.1);

        let raw = expected_yield(crop, soil, rainfall_mm, temperature_c, fertilizer_kg_ha);
        let z: f64 = self.rng.sample(StandardNormal);
        let noisy = raw + z * NOISE_FRACTION * raw.abs();

        YieldRecord {
            crop_type: crop.as_str().to_string(),
            soil_type: soil.as_str().to_string(),
            rainfall_mm,
            temperature_c,
            fertilizer_kg_ha,
            yield_tons_ha: noisy.max(MIN_YIELD),
        }
    }

    pub fn generate(&mut self, n_samples: usize) -> Vec<YieldRecord> {
        (0..n_samples).map(|_| self.sample()).collect()
    }
}

/// Convenience wrapper: `n_samples` records from a fresh simulator.
pub fn generate_dataset(n_samples: usize, seed: u64) -> Result<Vec<YieldRecord>, TrainError> {
    Ok(YieldSimulator::new(seed)?.generate(n_samples))
}
