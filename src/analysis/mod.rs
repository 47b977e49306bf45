// Analysis module - anomaly metrics over the stitched spectrum
//
// - metrics: Metric Engine (occupancy, spectral flatness)
// - noise_floor: percentile noise floor fed to the metric engine
// - peaks: strongest-bin picking for reports

pub mod metrics;
pub mod noise_floor;
pub mod peaks;

pub use metrics::{BandMetric, MetricEngine, SpectrumSlice};
pub use noise_floor::percentile_db;
pub use peaks::find_peaks;
