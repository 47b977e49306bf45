// Capture - one narrowband acquisition at a fixed centre frequency
//
// Captures arrive from the (external) receiver already transformed into a
// power spectrum in FFT-shifted order: bin 0 is the lowest frequency,
// bin N/2 sits on the centre frequency. They are immutable once produced and
// are consumed by the stitcher and the metric engine, then dropped.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// FFT size below which the DC notch is skipped
const MIN_NOTCH_FFT_SIZE: usize = 16;

/// Relative sample-rate deviation accepted against the configured bandwidth
const SAMPLE_RATE_TOLERANCE: f64 = 1e-6;

/// Unit of the capture bins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerScale {
    /// Linear power (|X|^2)
    #[default]
    Linear,
    /// Power in dB (10 log10 |X|^2)
    Decibel,
}

/// One acquisition: centre frequency, sample rate, monotonic timestamp, bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    /// Tuned centre frequency in Hz
    pub center_hz: f64,
    /// Complex sample rate in Hz (equals the captured bandwidth)
    pub sample_rate_hz: f64,
    /// Monotonic acquisition time since pipeline start
    #[serde(with = "millis")]
    pub timestamp: Duration,
    /// Scale of `bins`
    #[serde(default)]
    pub scale: PowerScale,
    /// Power spectrum, FFT-shifted, length = FFT size
    pub bins: Vec<f64>,
}

impl Capture {
    /// Create a capture with linear-power bins
    pub fn new(center_hz: f64, sample_rate_hz: f64, timestamp: Duration, bins: Vec<f64>) -> Self {
        Self {
            center_hz,
            sample_rate_hz,
            timestamp,
            scale: PowerScale::Linear,
            bins,
        }
    }

    /// Same capture with a different bin scale
    pub fn with_scale(mut self, scale: PowerScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Frequency spacing between adjacent bins
    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate_hz / self.bins.len().max(1) as f64
    }

    /// Absolute frequency of bin `k`
    ///
    /// Bin `N/2` is the centre; bin 0 sits at `center - sample_rate / 2`.
    pub fn bin_frequency(&self, k: usize) -> f64 {
        let offset = k as f64 - (self.bins.len() / 2) as f64;
        self.center_hz + offset * self.bin_width_hz()
    }

    /// Reject captures the stitcher cannot place
    ///
    /// # Arguments
    /// * `expected_bins` - configured FFT size
    /// * `expected_sample_rate_hz` - configured window bandwidth; a capture at
    ///   another rate would land on the grid at the wrong spacing
    ///
    /// # Returns
    /// * `Err(PipelineError::BinCountMismatch)` - bin count differs from the FFT size
    /// * `Err(PipelineError::MalformedCapture)` - non-finite metadata or bins,
    ///   sample rate off the configured bandwidth, negative linear power
    pub fn validate(
        &self,
        expected_bins: usize,
        expected_sample_rate_hz: f64,
    ) -> Result<(), PipelineError> {
        if self.bins.len() != expected_bins {
            return Err(PipelineError::BinCountMismatch {
                expected: expected_bins,
                actual: self.bins.len(),
            });
        }
        if !self.center_hz.is_finite() || self.center_hz <= 0.0 {
            return Err(PipelineError::MalformedCapture {
                reason: format!("centre frequency {} Hz", self.center_hz),
            });
        }
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(PipelineError::MalformedCapture {
                reason: format!("sample rate {} Hz", self.sample_rate_hz),
            });
        }
        let deviation = (self.sample_rate_hz - expected_sample_rate_hz).abs();
        if deviation > SAMPLE_RATE_TOLERANCE * expected_sample_rate_hz {
            return Err(PipelineError::MalformedCapture {
                reason: format!(
                    "sample rate {} Hz, expected {} Hz",
                    self.sample_rate_hz, expected_sample_rate_hz
                ),
            });
        }
        if let Some(k) = self.bins.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::MalformedCapture {
                reason: format!("bin {} is not finite", k),
            });
        }
        if self.scale == PowerScale::Linear {
            if let Some(k) = self.bins.iter().position(|&v| v < 0.0) {
                return Err(PipelineError::MalformedCapture {
                    reason: format!("bin {} has negative linear power", k),
                });
            }
        }
        Ok(())
    }

    /// Linear power bins with the DC spur notched out
    ///
    /// The centre `±notch_half_width` bins are replaced with the mean of the
    /// two bins just outside the notch on each side. Skipped for small FFTs
    /// or a zero notch width.
    pub fn conditioned_power(&self, notch_half_width: usize) -> Vec<f64> {
        let mut power: Vec<f64> = match self.scale {
            PowerScale::Linear => self.bins.clone(),
            PowerScale::Decibel => self.bins.iter().map(|db| 10f64.powf(db / 10.0)).collect(),
        };

        let n = power.len();
        let k = notch_half_width;
        if k == 0 || n < MIN_NOTCH_FFT_SIZE || n / 2 < k + 3 || n / 2 + k + 3 > n {
            return power;
        }

        let c = n / 2;
        let neighbours = power[c - k - 3..c - k - 1]
            .iter()
            .chain(power[c + k + 1..c + k + 3].iter());
        let fill = neighbours.clone().sum::<f64>() / neighbours.count() as f64;
        for bin in &mut power[c - k..=c + k] {
            *bin = fill;
        }
        power
    }
}

/// Serde adapter storing a `Duration` as fractional milliseconds
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "timestamp must be a non-negative number of ms (got {})",
                ms
            )));
        }
        Ok(Duration::from_secs_f64(ms / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(bins: Vec<f64>) -> Capture {
        Capture::new(100e6, 2e6, Duration::from_millis(5), bins)
    }

    #[test]
    fn test_bin_frequency_layout() {
        let cap = capture(vec![1.0; 8]);
        assert_eq!(cap.bin_width_hz(), 250e3);
        assert_eq!(cap.bin_frequency(4), 100e6);
        assert_eq!(cap.bin_frequency(0), 99e6);
        assert_eq!(cap.bin_frequency(7), 100e6 + 3.0 * 250e3);
    }

    #[test]
    fn test_validate_bin_count() {
        let cap = capture(vec![1.0; 8]);
        assert!(cap.validate(8, 2e6).is_ok());
        assert_eq!(
            cap.validate(16, 2e6),
            Err(PipelineError::BinCountMismatch {
                expected: 16,
                actual: 8
            })
        );
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let mut bins = vec![1.0; 8];
        bins[3] = f64::NAN;
        assert!(matches!(
            capture(bins).validate(8, 2e6),
            Err(PipelineError::MalformedCapture { .. })
        ));

        let mut cap = capture(vec![1.0; 8]);
        cap.sample_rate_hz = 0.0;
        assert!(cap.validate(8, 2e6).is_err());
    }

    #[test]
    fn test_validate_sample_rate_against_bandwidth() {
        let cap = capture(vec![1.0; 8]);
        assert!(cap.validate(8, 2e6 + 1.0).is_ok());
        assert!(matches!(
            cap.validate(8, 8e6),
            Err(PipelineError::MalformedCapture { .. })
        ));
        assert!(cap.validate(8, 1.999e6).is_err());
    }

    #[test]
    fn test_negative_power_only_rejected_for_linear() {
        let cap = capture(vec![-3.0; 8]);
        assert!(cap.validate(8, 2e6).is_err());
        assert!(cap.with_scale(PowerScale::Decibel).validate(8, 2e6).is_ok());
    }

    #[test]
    fn test_decibel_conversion() {
        let cap = capture(vec![0.0, 10.0, 20.0, -10.0]).with_scale(PowerScale::Decibel);
        let power = cap.conditioned_power(0);
        assert!((power[0] - 1.0).abs() < 1e-12);
        assert!((power[1] - 10.0).abs() < 1e-9);
        assert!((power[2] - 100.0).abs() < 1e-9);
        assert!((power[3] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_dc_notch_fills_centre() {
        let mut bins = vec![1.0; 32];
        bins[16] = 1000.0;
        bins[15] = 500.0;
        bins[17] = 500.0;
        let power = capture(bins).conditioned_power(2);
        for value in &power[14..=18] {
            assert!((value - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_dc_notch_skipped_for_small_fft() {
        let mut bins = vec![1.0; 8];
        bins[4] = 50.0;
        let power = capture(bins).conditioned_power(2);
        assert_eq!(power[4], 50.0);
    }

    #[test]
    fn test_json_timestamp_in_ms() {
        let json = r#"{"center_hz": 1e8, "sample_rate_hz": 2e6, "timestamp": 1500.0, "bins": [1, 2]}"#;
        let cap: Capture = serde_json::from_str(json).unwrap();
        assert_eq!(cap.timestamp, Duration::from_millis(1500));
        assert_eq!(cap.scale, PowerScale::Linear);
    }
}
