//! Synthetic capture source.
//!
//! Generates complex baseband blocks for the requested centre: Gaussian noise,
//! fixed tones that fall inside the window, and an optional wideband interferer
//! (a dense tone comb) active over a time interval. Blocks go through the same
//! `PowerSpectrumEstimator` a hardware source would use, and the shared
//! `ManualClock` advances by one capture duration per capture.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::frequency::FrequencyRange;
use crate::spectrum::capture::Capture;
use crate::spectrum::estimator::PowerSpectrumEstimator;

use super::backend::{CaptureSource, ManualClock, TimeSource};

/// A continuous carrier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub frequency_hz: f64,
    pub power_db: f64,
}

/// Wideband interferer covering `band` while `active_from <= t < active_until`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interferer {
    pub band: FrequencyRange,
    pub power_db: f64,
    #[serde(with = "crate::spectrum::capture::millis")]
    pub active_from: Duration,
    #[serde(with = "crate::spectrum::capture::millis")]
    pub active_until: Duration,
}

impl Interferer {
    pub fn is_active(&self, at: Duration) -> bool {
        at >= self.active_from && at < self.active_until
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSettings {
    /// Complex sample rate, equal to the window bandwidth
    pub sample_rate_hz: f64,
    pub fft_size: usize,
    /// Total complex noise power per sample
    pub noise_power_db: f64,
    pub tones: Vec<Tone>,
    pub interferer: Option<Interferer>,
    #[serde(with = "crate::spectrum::capture::millis")]
    pub capture_duration: Duration,
    pub seed: u64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 2e6,
            fft_size: 1024,
            noise_power_db: -90.0,
            tones: Vec::new(),
            interferer: None,
            capture_duration: Duration::from_millis(100),
            seed: 0x5eed,
        }
    }
}

pub struct SyntheticSource {
    settings: SimSettings,
    estimator: PowerSpectrumEstimator,
    noise: Normal<f64>,
    rng: StdRng,
    clock: Arc<ManualClock>,
}

impl SyntheticSource {
    /// # Returns
    /// * `Err(PipelineError::MalformedCapture)` - sample rate or FFT size unusable
    pub fn new(settings: SimSettings, clock: Arc<ManualClock>) -> Result<Self, PipelineError> {
        if !(settings.sample_rate_hz.is_finite() && settings.sample_rate_hz > 0.0) || settings.fft_size < 2 {
            return Err(PipelineError::MalformedCapture {
                reason: format!(
                    "simulator sample rate {} Hz with FFT size {}",
                    settings.sample_rate_hz, settings.fft_size
                ),
            });
        }
        // Split complex noise power evenly over I and Q
        let sigma = (10f64.powf(settings.noise_power_db / 10.0) / 2.0).sqrt();
        let noise = Normal::new(0.0, sigma).map_err(|err| PipelineError::MalformedCapture {
            reason: format!("noise power {} dB: {}", settings.noise_power_db, err),
        })?;

        Ok(Self {
            estimator: PowerSpectrumEstimator::new(settings.fft_size),
            rng: StdRng::seed_from_u64(settings.seed),
            noise,
            settings,
            clock,
        })
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    pub fn clock(&self) -> Arc<ManualClock> {
        Arc::clone(&self.clock)
    }

    /// Carriers visible in a window centred on `center_hz` at time `at`
    fn carriers(&self, center_hz: f64, at: Duration) -> Vec<Tone> {
        let half = self.settings.sample_rate_hz / 2.0;
        let window = center_hz - half..center_hz + half;
        let mut carriers: Vec<Tone> = self
            .settings
            .tones
            .iter()
            .filter(|tone| window.contains(&tone.frequency_hz))
            .copied()
            .collect();

        if let Some(interferer) = self.settings.interferer.filter(|i| i.is_active(at)) {
            let spacing = 2.0 * self.settings.sample_rate_hz / self.settings.fft_size as f64;
            let mut hz = interferer.band.low_hz.max(window.start);
            let end = interferer.band.high_hz.min(window.end);
            while hz < end {
                carriers.push(Tone {
                    frequency_hz: hz,
                    power_db: interferer.power_db,
                });
                hz += spacing;
            }
        }
        carriers
    }
}

impl CaptureSource for SyntheticSource {
    fn capture(&mut self, center_hz: f64) -> Result<Capture, PipelineError> {
        self.clock.advance(self.settings.capture_duration);
        let at = self.clock.now();
        let carriers = self.carriers(center_hz, at);
        let n = self.settings.fft_size;
        let fs = self.settings.sample_rate_hz;

        let mut iq: Vec<Complex<f64>> = (0..n)
            .map(|_| Complex::new(self.noise.sample(&mut self.rng), self.noise.sample(&mut self.rng)))
            .collect();

        for carrier in &carriers {
            let amplitude = 10f64.powf(carrier.power_db / 20.0);
            let cycles_per_sample = (carrier.frequency_hz - center_hz) / fs;
            let phase: f64 = self.rng.gen_range(0.0..2.0 * PI);
            for (i, sample) in iq.iter_mut().enumerate() {
                *sample += Complex::from_polar(amplitude, 2.0 * PI * cycles_per_sample * i as f64 + phase);
            }
        }

        Ok(Capture::new(center_hz, fs, at, self.estimator.power_spectrum(&iq)))
    }
}
