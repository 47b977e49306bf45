// Power spectrum estimator - IQ block to FFT-shifted power bins
//
// This is the FFT primitive the capture sources use to turn raw complex
// samples into the bins a `Capture` carries. Hann windowed, normalized so a
// full-scale complex tone of amplitude A reads A^2 at its peak bin.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Windowed FFT power-spectrum estimator for complex baseband blocks
pub struct PowerSpectrumEstimator {
    fft: Arc<dyn Fft<f64>>,
    fft_size: usize,
    /// Hann window (pre-computed)
    window: Vec<f64>,
    /// (sum of window)^2, the tone-amplitude normalization
    norm: f64,
}

impl PowerSpectrumEstimator {
    /// Create an estimator
    ///
    /// # Arguments
    /// * `fft_size` - Number of bins per spectrum (and samples per block)
    pub fn new(fft_size: usize) -> Self {
        let window: Vec<f64> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - ((2.0 * std::f64::consts::PI * i as f64) / (fft_size as f64 - 1.0)).cos())
            })
            .collect();
        let sum: f64 = window.iter().sum();

        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(fft_size),
            fft_size,
            norm: (sum * sum).max(f64::MIN_POSITIVE),
            window,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Compute the FFT-shifted linear power spectrum of one IQ block
    ///
    /// Short blocks are zero-padded; extra samples are ignored.
    ///
    /// # Returns
    /// Power spectrum (size = fft_size), bin `fft_size / 2` is DC
    pub fn power_spectrum(&self, iq: &[Complex<f64>]) -> Vec<f64> {
        let mut buffer: Vec<Complex<f64>> = iq
            .iter()
            .take(self.fft_size)
            .zip(&self.window)
            .map(|(sample, w)| sample.scale(*w))
            .collect();
        buffer.resize(self.fft_size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        let half = self.fft_size / 2;
        (0..self.fft_size)
            .map(|k| buffer[(k + half) % self.fft_size].norm_sqr() / self.norm)
            .collect()
    }
}
