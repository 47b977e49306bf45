// Spectrum module - captures, stitching, and the FFT primitive
//
// Architecture:
// - Capture: one narrowband power spectrum at a known centre frequency
// - Stitcher: places capture bins on the absolute-frequency grid
// - WidebandSpectrum: the stitched view, shared as an immutable snapshot
// - PowerSpectrumEstimator: IQ -> power bins for simulated sources

pub mod capture;
pub mod estimator;
pub mod stitcher;
pub mod wideband;

pub use capture::{Capture, PowerScale};
pub use estimator::PowerSpectrumEstimator;
pub use stitcher::{IngestReport, OverlapPolicy, Stitcher, StitcherSettings};
pub use wideband::{power_to_db, BinFreshness, SpectrumBin, WidebandSpectrum, DB_FLOOR};
