// Metric engine - occupancy and spectral flatness per analysis band
//
// Pure functions of the supplied bins, noise floor, and margin. All
// aggregates are computed over a sorted copy of the input so results do not
// depend on bin order, down to the last floating-point bit.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frequency::FrequencyRange;

/// Floor applied to bins before taking logs in the geometric mean
const LOG_FLOOR: f64 = 1e-20;

/// Linear-power bins of one analysis band at one instant
#[derive(Debug, Clone, Copy)]
pub struct SpectrumSlice<'a> {
    pub band: FrequencyRange,
    /// Linear power, any order
    pub powers: &'a [f64],
    /// Timestamp of the evaluation
    pub at: Duration,
}

/// Anomaly indicators for one band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandMetric {
    pub band: FrequencyRange,
    /// Fraction of bins above noise floor + margin, in [0, 1]
    pub occupancy: f64,
    /// Spectral flatness measure, in [0, 1]; 1 means noise-like
    pub flatness: f64,
    pub noise_floor_db: f64,
    /// Number of bins evaluated
    pub bins: usize,
    #[serde(with = "crate::spectrum::capture::millis")]
    pub computed_at: Duration,
}

impl BandMetric {
    /// Benign metric for a band with no usable data
    pub fn benign(band: FrequencyRange, noise_floor_db: f64, bins: usize, at: Duration) -> Self {
        Self {
            band,
            occupancy: 0.0,
            flatness: 1.0,
            noise_floor_db,
            bins,
            computed_at: at,
        }
    }

    /// Whether this metric crosses either anomaly threshold
    pub fn breaches(&self, occupancy_threshold: f64, flatness_threshold: f64) -> bool {
        self.occupancy > occupancy_threshold || (1.0 - self.flatness) > flatness_threshold
    }
}

/// Stateless metric engine configured with the occupancy margin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricEngine {
    margin_db: f64,
}

impl MetricEngine {
    pub fn new(margin_db: f64) -> Self {
        Self { margin_db }
    }

    pub fn margin_db(&self) -> f64 {
        self.margin_db
    }

    /// Compute occupancy and flatness for one slice
    ///
    /// # Arguments
    /// * `slice` - linear-power bins of the band
    /// * `noise_floor_db` - caller-supplied noise floor estimate
    ///
    /// # Returns
    /// `BandMetric`; fewer than two bins, an all-zero slice, or non-finite
    /// input yields flatness 1 and occupancy 0
    pub fn evaluate(&self, slice: &SpectrumSlice<'_>, noise_floor_db: f64) -> BandMetric {
        let degenerate = slice.powers.len() < 2
            || slice.powers.iter().any(|p| !p.is_finite() || *p < 0.0)
            || !noise_floor_db.is_finite();
        if degenerate {
            return BandMetric::benign(slice.band, noise_floor_db, slice.powers.len(), slice.at);
        }

        let mut sorted = slice.powers.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let arithmetic = sorted.iter().sum::<f64>() / n;
        if !(arithmetic > 0.0) || !arithmetic.is_finite() {
            return BandMetric::benign(slice.band, noise_floor_db, sorted.len(), slice.at);
        }

        let log_mean = sorted.iter().map(|p| p.max(LOG_FLOOR).ln()).sum::<f64>() / n;
        let flatness = (log_mean.exp() / arithmetic).clamp(0.0, 1.0);

        let threshold = 10f64.powf((noise_floor_db + self.margin_db) / 10.0);
        let occupied = sorted.iter().filter(|p| **p > threshold).count();

        BandMetric {
            band: slice.band,
            occupancy: occupied as f64 / n,
            flatness,
            noise_floor_db,
            bins: sorted.len(),
            computed_at: slice.at,
        }
    }
}
