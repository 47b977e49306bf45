//! Frequency helpers shared by the sweep, stitching, and switching layers.
//!
//! Frequencies are carried as `f64` Hz throughout the crate. User-facing
//! surfaces (JSON configuration, CLI flags) additionally accept a unit suffix
//! such as `"433.92 MHz"`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lowest frequency the tuner accepts.
pub const MIN_TUNABLE_HZ: f64 = 1.0;

/// Highest frequency the tuner accepts.
pub const MAX_TUNABLE_HZ: f64 = 4.0e9;

/// Parse a frequency with an optional Hz/kHz/MHz/GHz suffix.
///
/// Accepts plain and scientific notation (`"1e6"`, `"2.4GHz"`, `" 100 mhz "`).
/// Anything else, including bare SI prefixes like `"500k"`, is rejected.
pub fn parse_frequency(text: &str) -> Result<f64, ConfigError> {
    let reject = || ConfigError::FrequencyParse {
        input: text.to_string(),
    };

    let lowered = text.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return Err(reject());
    }

    let (number, multiplier) = [("ghz", 1e9), ("mhz", 1e6), ("khz", 1e3), ("hz", 1.0)]
        .iter()
        .find_map(|(suffix, mult)| lowered.strip_suffix(suffix).map(|rest| (rest, *mult)))
        .unwrap_or((lowered.as_str(), 1.0));

    let number = number.trim();
    if number.is_empty() {
        return Err(reject());
    }

    let value: f64 = number.parse().map_err(|_| reject())?;
    let hz = value * multiplier;
    if hz.is_finite() {
        Ok(hz)
    } else {
        Err(reject())
    }
}

/// Format a frequency for log lines, e.g. `433.920 MHz`.
pub fn format_frequency(hz: f64) -> String {
    let abs = hz.abs();
    if abs >= 1e9 {
        format!("{:.3} GHz", hz / 1e9)
    } else if abs >= 1e6 {
        format!("{:.3} MHz", hz / 1e6)
    } else if abs >= 1e3 {
        format!("{:.3} kHz", hz / 1e3)
    } else {
        format!("{:.1} Hz", hz)
    }
}

/// Serde adapter accepting either a number of Hz or a string with units.
///
/// Serializes as a plain number of Hz.
pub mod serde_hz {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FrequencyValue {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match FrequencyValue::deserialize(deserializer)? {
            FrequencyValue::Number(hz) => Ok(hz),
            FrequencyValue::Text(text) => {
                super::parse_frequency(&text).map_err(serde::de::Error::custom)
            }
        }
    }
}

/// Half-open frequency interval `[low_hz, high_hz)`.
///
/// Touching intervals (`[100, 200)` and `[200, 300)`) do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    #[serde(with = "serde_hz")]
    pub low_hz: f64,
    #[serde(with = "serde_hz")]
    pub high_hz: f64,
}

impl FrequencyRange {
    /// Build a validated range (finite, low < high).
    pub fn new(low_hz: f64, high_hz: f64) -> Result<Self, ConfigError> {
        if !low_hz.is_finite() || !high_hz.is_finite() || low_hz >= high_hz {
            return Err(ConfigError::InvalidRange { low_hz, high_hz });
        }
        Ok(Self { low_hz, high_hz })
    }

    pub fn contains(&self, hz: f64) -> bool {
        self.low_hz <= hz && hz < self.high_hz
    }

    pub fn overlaps(&self, other: &FrequencyRange) -> bool {
        self.low_hz < other.high_hz && other.low_hz < self.high_hz
    }

    pub fn width_hz(&self) -> f64 {
        self.high_hz - self.low_hz
    }

    pub fn center_hz(&self) -> f64 {
        0.5 * (self.low_hz + self.high_hz)
    }
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            format_frequency(self.low_hz),
            format_frequency(self.high_hz)
        )
    }
}
