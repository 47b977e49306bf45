// Sweep scheduler - cyclic centre-frequency plan across the span
//
// The span is cut into `ceil(span / step)` windows whose centres sit at
// `start + (i + 0.5) * step`. The cursor only moves when the coordinator
// calls `advance`, i.e. after the previous capture has been stitched (or
// given up on).

use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;
use crate::frequency::{format_frequency, FrequencyRange, MAX_TUNABLE_HZ, MIN_TUNABLE_HZ};

/// Upper bound on stitched grid points (span / FFT bin width)
pub const MAX_GRID_BINS: usize = 1 << 24;

/// Sweep plan: span, window geometry, and the current cursor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPlan {
    span: FrequencyRange,
    window_bandwidth_hz: f64,
    overlap_fraction: f64,
    guard_bins: usize,
    fft_size: usize,
    step_hz: f64,
    steps: usize,
    cursor: usize,
    cycles_completed: u64,
}

impl SweepPlan {
    /// Build a validated plan
    ///
    /// # Arguments
    /// * `start_hz`, `end_hz` - sweep span within the tunable range
    /// * `window_bandwidth_hz` - instantaneous bandwidth of one capture
    /// * `overlap_fraction` - in [0, 1)
    /// * `guard_bins` - edge bins the stitcher drops on each side
    /// * `fft_size` - bins per capture
    ///
    /// # Returns
    /// * `Err(ConfigError::OverlapTooSmall)` - adjacent windows would leave the
    ///   guard regions uncovered (`overlap <= 2 * guard_bins / fft_size`)
    pub fn new(
        start_hz: f64,
        end_hz: f64,
        window_bandwidth_hz: f64,
        overlap_fraction: f64,
        guard_bins: usize,
        fft_size: usize,
    ) -> Result<Self, ConfigError> {
        let span_ok = start_hz.is_finite()
            && end_hz.is_finite()
            && start_hz >= MIN_TUNABLE_HZ
            && end_hz <= MAX_TUNABLE_HZ
            && start_hz < end_hz;
        if !span_ok {
            return Err(ConfigError::InvalidSweepSpan { start_hz, end_hz });
        }
        if !window_bandwidth_hz.is_finite() || window_bandwidth_hz <= 0.0 {
            return Err(ConfigError::invalid(
                "sweep.window_bandwidth_hz",
                format!("{} Hz must be positive", window_bandwidth_hz),
            ));
        }
        if !(0.0..1.0).contains(&overlap_fraction) {
            return Err(ConfigError::invalid(
                "sweep.overlap_fraction",
                format!("{} is outside [0, 1)", overlap_fraction),
            ));
        }
        if fft_size < 2 {
            return Err(ConfigError::invalid(
                "stitch.fft_size",
                format!("{} bins is too small", fft_size),
            ));
        }
        if 2 * guard_bins >= fft_size {
            return Err(ConfigError::invalid(
                "stitch.guard_bins",
                format!("{} guard bins per edge leave nothing of {} bins", guard_bins, fft_size),
            ));
        }

        // Guard width as a fraction of the window
        let required = 2.0 * guard_bins as f64 / fft_size as f64;
        if guard_bins > 0 && overlap_fraction <= required {
            return Err(ConfigError::OverlapTooSmall {
                overlap_fraction,
                required,
            });
        }

        let span = FrequencyRange::new(start_hz, end_hz)?;
        let grid_bins = span.width_hz() * fft_size as f64 / window_bandwidth_hz;
        if grid_bins >= MAX_GRID_BINS as f64 {
            return Err(ConfigError::invalid(
                "sweep.window_bandwidth_hz",
                format!(
                    "{} over {} needs {:.0} grid bins (limit {})",
                    format_frequency(window_bandwidth_hz),
                    span,
                    grid_bins,
                    MAX_GRID_BINS
                ),
            ));
        }

        let step_hz = window_bandwidth_hz * (1.0 - overlap_fraction);
        let steps = ((span.width_hz() / step_hz).ceil() as usize).max(1);

        log::info!(
            "[Sweep] {} in {} steps of {}",
            span,
            steps,
            format_frequency(step_hz)
        );

        Ok(Self {
            span,
            window_bandwidth_hz,
            overlap_fraction,
            guard_bins,
            fft_size,
            step_hz,
            steps,
            cursor: 0,
            cycles_completed: 0,
        })
    }

    pub fn span(&self) -> FrequencyRange {
        self.span
    }

    pub fn window_bandwidth_hz(&self) -> f64 {
        self.window_bandwidth_hz
    }

    pub fn overlap_fraction(&self) -> f64 {
        self.overlap_fraction
    }

    pub fn step_hz(&self) -> f64 {
        self.step_hz
    }

    /// Windows per full cycle
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Centre frequency of window `index`
    pub fn center_at(&self, index: usize) -> f64 {
        self.span.low_hz + (index as f64 + 0.5) * self.step_hz
    }

    /// Centre frequency to tune to next
    pub fn next_center_frequency(&self) -> f64 {
        self.center_at(self.cursor)
    }

    /// Move to the next window, wrapping back to the start of the span
    ///
    /// # Returns
    /// `true` when this advance completed a full cycle
    pub fn advance(&mut self) -> bool {
        self.cursor += 1;
        if self.cursor >= self.steps {
            self.cursor = 0;
            self.cycles_completed += 1;
            tracing::debug!(cycles = self.cycles_completed, "[Sweep] cycle complete");
            return true;
        }
        false
    }

    /// Step whose centre lies within `tolerance_hz` of `hz`
    pub fn step_near(&self, hz: f64, tolerance_hz: f64) -> Option<usize> {
        let index = ((hz - self.span.low_hz) / self.step_hz - 0.5).round();
        if !(index >= 0.0 && index < self.steps as f64) {
            return None;
        }
        let index = index as usize;
        ((self.center_at(index) - hz).abs() <= tolerance_hz).then_some(index)
    }

    /// Move the cursor to `index`
    ///
    /// A backwards move restarts the sweep and counts as a completed cycle.
    ///
    /// # Returns
    /// `true` when the move wrapped
    pub fn seek(&mut self, index: usize) -> bool {
        let index = index.min(self.steps - 1);
        let wrapped = index < self.cursor;
        if wrapped {
            self.cycles_completed += 1;
            tracing::debug!(cycles = self.cycles_completed, "[Sweep] cycle restarted at step {}", index);
        }
        self.cursor = index;
        wrapped
    }

    /// All centres of one cycle, in sweep order
    pub fn centers(&self) -> Vec<f64> {
        (0..self.steps).map(|i| self.center_at(i)).collect()
    }

    /// Frequency interval window `index` contributes after guard removal
    pub fn effective_coverage(&self, index: usize) -> (f64, f64) {
        let guard_hz = self.guard_bins as f64 * self.window_bandwidth_hz / self.fft_size as f64;
        let half = 0.5 * self.window_bandwidth_hz - guard_hz;
        let center = self.center_at(index);
        (center - half, center + half)
    }

    /// Time to revisit every frequency once: `steps * capture_duration`
    pub fn revisit_latency(&self, capture_duration: Duration) -> Duration {
        capture_duration.saturating_mul(self.steps.min(u32::MAX as usize) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fm_band() -> SweepPlan {
        SweepPlan::new(88e6, 108e6, 2e6, 0.25, 16, 1024).unwrap()
    }

    #[test]
    fn test_step_matches_overlap() {
        let plan = fm_band();
        assert_eq!(plan.step_hz(), 2e6 * (1.0 - 0.25));
        // 20 MHz / 1.5 MHz = 13.33 -> 14 windows
        assert_eq!(plan.steps(), 14);
        assert_eq!(plan.next_center_frequency(), 88e6 + 0.75e6);
    }

    #[test]
    fn test_cursor_wraps() {
        let mut plan = fm_band();
        let first = plan.next_center_frequency();
        for _ in 0..13 {
            assert!(!plan.advance());
        }
        assert!(plan.advance());
        assert_eq!(plan.cursor(), 0);
        assert_eq!(plan.cycles_completed(), 1);
        assert_eq!(plan.next_center_frequency(), first);
    }

    #[test]
    fn test_full_cycle_covers_span() {
        let plan = fm_band();
        let (first_lo, _) = plan.effective_coverage(0);
        assert!(first_lo <= 88e6);
        for i in 1..plan.steps() {
            let (_, prev_hi) = plan.effective_coverage(i - 1);
            let (lo, _) = plan.effective_coverage(i);
            assert!(lo <= prev_hi, "gap before window {}", i);
        }
        let (_, last_hi) = plan.effective_coverage(plan.steps() - 1);
        assert!(last_hi >= 108e6);
    }

    #[test]
    fn test_revisit_latency() {
        let plan = fm_band();
        assert_eq!(
            plan.revisit_latency(Duration::from_millis(100)),
            Duration::from_millis(1400)
        );
    }

    #[test]
    fn test_overlap_must_cover_guards() {
        // 2 * 64 / 1024 = 0.125
        let err = SweepPlan::new(88e6, 108e6, 2e6, 0.125, 64, 1024).unwrap_err();
        assert!(matches!(err, ConfigError::OverlapTooSmall { .. }));
        assert!(SweepPlan::new(88e6, 108e6, 2e6, 0.13, 64, 1024).is_ok());
        // No guard: zero overlap is fine
        assert!(SweepPlan::new(88e6, 108e6, 2e6, 0.0, 0, 1024).is_ok());
    }

    #[test]
    fn test_rejects_bad_span_and_values() {
        assert!(matches!(
            SweepPlan::new(108e6, 88e6, 2e6, 0.25, 0, 1024),
            Err(ConfigError::InvalidSweepSpan { .. })
        ));
        assert!(SweepPlan::new(0.5, 1e6, 2e6, 0.25, 0, 1024).is_err());
        assert!(SweepPlan::new(1e6, 5e9, 2e6, 0.25, 0, 1024).is_err());
        assert!(SweepPlan::new(88e6, 108e6, 0.0, 0.25, 0, 1024).is_err());
        assert!(SweepPlan::new(88e6, 108e6, 2e6, 1.0, 0, 1024).is_err());
        assert!(SweepPlan::new(88e6, 108e6, 2e6, 0.9, 512, 1024).is_err());
    }

    #[test]
    fn test_step_near_and_seek() {
        let mut plan = fm_band();
        let third = plan.center_at(3);
        assert_eq!(plan.step_near(third + 5.0, 10.0), Some(3));
        assert_eq!(plan.step_near(third + 50e3, 10.0), None);
        assert_eq!(plan.step_near(80e6, 10.0), None);
        assert_eq!(plan.step_near(plan.center_at(13), 0.0), Some(13));

        assert!(!plan.seek(3));
        assert_eq!(plan.next_center_frequency(), third);
        assert_eq!(plan.cycles_completed(), 0);

        // Going back restarts the sweep
        assert!(plan.seek(1));
        assert_eq!(plan.cursor(), 1);
        assert_eq!(plan.cycles_completed(), 1);
    }

    #[test]
    fn test_grid_size_is_bounded() {
        // 1 Hz windows over 3 GHz
        let err = SweepPlan::new(1e6, 3e9, 1.0, 0.25, 0, 1024).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(SweepPlan::new(1e6, 3e9, 20e6, 0.25, 0, 1024).is_ok());
    }

    #[test]
    fn test_span_narrower_than_window() {
        let plan = SweepPlan::new(100e6, 100.5e6, 2e6, 0.5, 0, 256).unwrap();
        assert_eq!(plan.steps(), 1);
        assert_eq!(plan.next_center_frequency(), 100.5e6);
    }
}
