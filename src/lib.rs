// Spectrum Switch Core - narrowband sweep stitching and antenna switching
// Sweeps a wide span in overlapping windows, stitches a live wideband view,
// and drives an RF port switch from Manual/Frequency/Time/Event policies.

// Module declarations
pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod frequency;
pub mod spectrum;
pub mod sweep;
pub mod switching;
pub mod telemetry;

// Re-exports for convenience
pub use config::AppConfig;
pub use engine::{Coordinator, CycleOutcome, Observer};
pub use error::{ConfigError, ErrorCode, PipelineError};

use tracing_subscriber::EnvFilter;

/// Initialize logging
///
/// Writes to stderr. Uses `RUST_LOG` when set, `info` otherwise. Safe to call
/// more than once; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }

    #[test]
    fn test_default_pipeline_builds() {
        let coordinator = Coordinator::new(&AppConfig::default()).unwrap();
        assert_eq!(coordinator.next_center_frequency(), 88e6 + 0.75e6);
    }
}
