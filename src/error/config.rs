// Configuration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Configuration error code constants
///
/// Error code range: 3001-3013
pub struct ConfigErrorCodes {}

impl ConfigErrorCodes {
    /// Sweep start/end are inverted, equal, or outside tuning limits
    pub const INVALID_SWEEP_SPAN: i32 = 3001;

    /// Overlap fraction does not cover the edge guard regions
    pub const OVERLAP_TOO_SMALL: i32 = 3002;

    /// A single field holds an out-of-range value
    pub const INVALID_VALUE: i32 = 3003;

    /// Frequency mode requested with no ranges
    pub const EMPTY_RANGE_TABLE: i32 = 3004;

    /// Two frequency ranges share frequencies
    pub const OVERLAPPING_RANGES: i32 = 3005;

    /// A frequency range has low >= high
    pub const INVALID_RANGE: i32 = 3006;

    /// Port label not present in the configured port set
    pub const UNKNOWN_PORT: i32 = 3007;

    /// Port index outside the configured port set
    pub const PORT_OUT_OF_RANGE: i32 = 3008;

    /// Time mode requested with no slots
    pub const EMPTY_SCHEDULE: i32 = 3009;

    /// Event mode fallback order cannot produce a distinct port
    pub const INVALID_FALLBACK_ORDER: i32 = 3010;

    /// Frequency string could not be parsed
    pub const FREQUENCY_PARSE: i32 = 3011;

    /// Configuration document could not be parsed
    pub const PARSE_FAILED: i32 = 3012;

    /// Configuration file could not be read
    pub const IO_FAILED: i32 = 3013;
}

/// Log a configuration error with structured context
pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Configuration error in {}: code={}, component=Config, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Static configuration errors
///
/// These are fatal to setup: a configuration that produces one of these is
/// never silently defaulted or clamped.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Sweep span is empty, inverted, or outside the tuner limits
    InvalidSweepSpan { start_hz: f64, end_hz: f64 },

    /// Overlap fraction must exceed 2 * guard / window
    OverlapTooSmall { overlap_fraction: f64, required: f64 },

    /// Field-level validation failure
    InvalidValue { field: String, reason: String },

    /// Frequency mode with no ranges
    EmptyRangeTable,

    /// Two frequency-mode ranges overlap
    OverlappingRanges { first: String, second: String },

    /// Range with low >= high
    InvalidRange { low_hz: f64, high_hz: f64 },

    /// Unknown port label
    UnknownPort { label: String },

    /// Port index beyond the port set
    PortOutOfRange { index: usize, count: usize },

    /// Time mode with no slots
    EmptySchedule,

    /// Event mode fallback order is unusable
    InvalidFallbackOrder { reason: String },

    /// Frequency text could not be parsed
    FrequencyParse { input: String },

    /// JSON document could not be parsed
    ParseFailed { reason: String },

    /// Configuration file could not be read
    IoFailed { path: String, reason: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::InvalidSweepSpan { .. } => ConfigErrorCodes::INVALID_SWEEP_SPAN,
            ConfigError::OverlapTooSmall { .. } => ConfigErrorCodes::OVERLAP_TOO_SMALL,
            ConfigError::InvalidValue { .. } => ConfigErrorCodes::INVALID_VALUE,
            ConfigError::EmptyRangeTable => ConfigErrorCodes::EMPTY_RANGE_TABLE,
            ConfigError::OverlappingRanges { .. } => ConfigErrorCodes::OVERLAPPING_RANGES,
            ConfigError::InvalidRange { .. } => ConfigErrorCodes::INVALID_RANGE,
            ConfigError::UnknownPort { .. } => ConfigErrorCodes::UNKNOWN_PORT,
            ConfigError::PortOutOfRange { .. } => ConfigErrorCodes::PORT_OUT_OF_RANGE,
            ConfigError::EmptySchedule => ConfigErrorCodes::EMPTY_SCHEDULE,
            ConfigError::InvalidFallbackOrder { .. } => ConfigErrorCodes::INVALID_FALLBACK_ORDER,
            ConfigError::FrequencyParse { .. } => ConfigErrorCodes::FREQUENCY_PARSE,
            ConfigError::ParseFailed { .. } => ConfigErrorCodes::PARSE_FAILED,
            ConfigError::IoFailed { .. } => ConfigErrorCodes::IO_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::InvalidSweepSpan { start_hz, end_hz } => format!(
                "Sweep span invalid: start {} Hz must be below end {} Hz within [1 Hz, 4 GHz]",
                start_hz, end_hz
            ),
            ConfigError::OverlapTooSmall {
                overlap_fraction,
                required,
            } => format!(
                "Overlap fraction {} does not cover edge guards (must exceed {})",
                overlap_fraction, required
            ),
            ConfigError::InvalidValue { field, reason } => {
                format!("Invalid {}: {}", field, reason)
            }
            ConfigError::EmptyRangeTable => {
                "Frequency mode requires at least one range".to_string()
            }
            ConfigError::OverlappingRanges { first, second } => {
                format!("Overlapping ranges: {} and {}", first, second)
            }
            ConfigError::InvalidRange { low_hz, high_hz } => format!(
                "Range lower bound {} Hz must be below upper bound {} Hz",
                low_hz, high_hz
            ),
            ConfigError::UnknownPort { label } => format!("Unknown port '{}'", label),
            ConfigError::PortOutOfRange { index, count } => {
                format!("Port index {} out of range ({} ports)", index, count)
            }
            ConfigError::EmptySchedule => "Time mode requires at least one slot".to_string(),
            ConfigError::InvalidFallbackOrder { reason } => {
                format!("Invalid fallback order: {}", reason)
            }
            ConfigError::FrequencyParse { input } => {
                format!("Invalid frequency format: '{}'", input)
            }
            ConfigError::ParseFailed { reason } => {
                format!("Failed to parse configuration: {}", reason)
            }
            ConfigError::IoFailed { path, reason } => {
                format!("Failed to read configuration {}: {}", path, reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseFailed {
            reason: err.to_string(),
        }
    }
}
