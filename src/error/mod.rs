// Error types for the sweep-and-switch core
//
// This module defines the error taxonomy used across the crate:
// configuration errors (fatal to setup) and pipeline errors (transient I/O,
// malformed data, invariant violations). Every error carries a stable numeric
// code so that external surfaces can react without string matching.

mod config;
mod pipeline;

pub use config::{log_config_error, ConfigError, ConfigErrorCodes};
pub use pipeline::{log_pipeline_error, PipelineError, PipelineErrorCodes, PipelineErrorKind};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the CLI and any display layer.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
