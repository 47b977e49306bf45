// Stitcher - merges narrowband captures into the wideband view
//
// Each ingest touches only the grid bins covered by the capture window.
// Published views are immutable `Arc`s, so a snapshot handed to a reader is
// never observed half-updated. Updates are written into a second buffer: the
// view before the current one, recycled once no reader holds it and brought
// level by copying only the bins the last update changed.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PipelineError};
use crate::frequency::FrequencyRange;
use crate::spectrum::capture::Capture;
use crate::spectrum::wideband::WidebandSpectrum;

/// How a bin already holding data is reconciled with a new capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// The most recent capture (by timestamp) wins
    #[default]
    LastWriteWins,
    /// `alpha * new + (1 - alpha) * old`, strictly newer captures only
    ExponentialAverage { alpha: f64 },
}

impl OverlapPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            OverlapPolicy::LastWriteWins => Ok(()),
            OverlapPolicy::ExponentialAverage { alpha } if alpha > 0.0 && alpha <= 1.0 => Ok(()),
            OverlapPolicy::ExponentialAverage { alpha } => Err(ConfigError::invalid(
                "stitch.overlap_policy.alpha",
                format!("{} is outside (0, 1]", alpha),
            )),
        }
    }
}

/// Static stitcher parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StitcherSettings {
    pub span: FrequencyRange,
    pub fft_size: usize,
    /// Grid spacing (window bandwidth / FFT size)
    pub bin_width_hz: f64,
    /// Edge bins dropped on each side of every capture
    pub guard_bins: usize,
    /// Half-width of the DC notch applied before merging
    pub dc_notch_bins: usize,
    pub max_bin_age: Duration,
    pub overlap_policy: OverlapPolicy,
    pub peak_hold: bool,
}

/// Summary of one ingest, for logging and telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// Grid bins written by this capture
    pub written: usize,
    /// Capture bins dropped as guard, out-of-span, or older than the grid value
    pub skipped: usize,
}

pub struct Stitcher {
    settings: StitcherSettings,
    view: Arc<WidebandSpectrum>,
    /// View replaced by the last update; reused when no reader holds it
    previous: Option<Arc<WidebandSpectrum>>,
    /// Bins that differ between `previous` and `view`; `None` means all
    changed: Option<Range<usize>>,
    ingested: u64,
    last_report: IngestReport,
}

impl Stitcher {
    pub fn new(settings: StitcherSettings) -> Result<Self, PipelineError> {
        let view = WidebandSpectrum::new(
            settings.span,
            settings.bin_width_hz,
            settings.max_bin_age,
            settings.peak_hold,
        )?;
        log::info!(
            "[Stitcher] Grid of {} bins at {:.1} Hz spacing over {}",
            view.len(),
            settings.bin_width_hz,
            settings.span
        );
        Ok(Self {
            settings,
            view: Arc::new(view),
            previous: None,
            changed: None,
            ingested: 0,
            last_report: IngestReport::default(),
        })
    }

    pub fn settings(&self) -> &StitcherSettings {
        &self.settings
    }

    /// Current view (cheap clone of the shared snapshot)
    pub fn snapshot(&self) -> Arc<WidebandSpectrum> {
        Arc::clone(&self.view)
    }

    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    pub fn last_report(&self) -> IngestReport {
        self.last_report
    }

    /// Merge one capture into the wideband view and return the new snapshot
    ///
    /// # Arguments
    /// * `capture` - validated against the configured FFT size and window
    ///   bandwidth first
    ///
    /// # Returns
    /// * `Err(PipelineError::BinCountMismatch | MalformedCapture)` - the capture
    ///   is dropped and the view is left exactly as it was
    /// * `Err(PipelineError::InvariantViolation)` - the merged region is no
    ///   longer ordered by frequency
    pub fn ingest(&mut self, capture: &Capture) -> Result<Arc<WidebandSpectrum>, PipelineError> {
        let window_hz = self.settings.bin_width_hz * self.settings.fft_size as f64;
        capture.validate(self.settings.fft_size, window_hz)?;

        let power = capture.conditioned_power(self.settings.dc_notch_bins);
        let n = power.len();
        let guard = self.settings.guard_bins;
        let ts = capture.timestamp;
        let max_age = self.settings.max_bin_age;
        let policy = self.settings.overlap_policy;

        let mut buffer = self.begin_update();
        let view = &mut buffer;
        view.age_to(ts);

        let mut report = IngestReport {
            written: 0,
            skipped: 2 * guard.min(n / 2),
        };
        let mut touched: Option<(usize, usize)> = None;

        for (k, &value) in power.iter().enumerate().take(n.saturating_sub(guard)).skip(guard) {
            let Some(idx) = view.index_of(capture.bin_frequency(k)) else {
                report.skipped += 1;
                continue;
            };

            let bin = &mut view.bins_mut()[idx];
            let merged = match (policy, bin.updated_at) {
                (_, None) => Some(value),
                (OverlapPolicy::LastWriteWins, Some(at)) => (ts >= at).then_some(value),
                (OverlapPolicy::ExponentialAverage { alpha }, Some(at)) => {
                    if ts <= at {
                        None
                    } else if ts - at > max_age {
                        Some(value)
                    } else {
                        Some(alpha * value + (1.0 - alpha) * bin.power)
                    }
                }
            };

            let Some(merged) = merged else {
                report.skipped += 1;
                continue;
            };
            bin.power = merged;
            bin.updated_at = Some(ts);
            if let Some(peaks) = view.peak_hold_mut() {
                peaks[idx] = peaks[idx].max(merged);
            }

            report.written += 1;
            touched = Some(touched.map_or((idx, idx), |(lo, hi)| (lo.min(idx), hi.max(idx))));
        }

        let changed = touched.map_or(0..0, |(lo, hi)| lo..hi + 1);
        view.check_ordering(changed.clone())?;

        self.commit_update(buffer, Some(changed));
        self.ingested += 1;
        self.last_report = report;
        tracing::trace!(
            center_hz = capture.center_hz,
            written = report.written,
            skipped = report.skipped,
            "[Stitcher] ingest"
        );
        Ok(Arc::clone(&self.view))
    }

    /// Advance the staleness clock without new data
    pub fn age_to(&mut self, now: Duration) -> Arc<WidebandSpectrum> {
        if self.view.as_of().map_or(true, |at| now > at) {
            let mut buffer = self.begin_update();
            buffer.age_to(now);
            self.commit_update(buffer, Some(0..0));
        }
        Arc::clone(&self.view)
    }

    /// Clear the peak-hold envelope
    pub fn reset_peaks(&mut self) {
        if self.view.peak_hold().is_some() {
            let mut buffer = self.begin_update();
            buffer.reset_peak_hold();
            self.commit_update(buffer, None);
            log::info!("[Stitcher] Peak hold reset");
        }
    }

    /// Writable copy of the current view
    ///
    /// Recycles the previous view when this stitcher holds its only reference,
    /// otherwise clones the whole grid.
    fn begin_update(&mut self) -> WidebandSpectrum {
        match self.previous.take().map(Arc::try_unwrap) {
            Some(Ok(mut buffer)) => {
                buffer.copy_changes_from(&self.view, self.changed.clone());
                buffer
            }
            _ => (*self.view).clone(),
        }
    }

    fn commit_update(&mut self, buffer: WidebandSpectrum, changed: Option<Range<usize>>) {
        self.previous = Some(std::mem::replace(&mut self.view, Arc::new(buffer)));
        self.changed = changed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFT: usize = 16;

    fn settings(policy: OverlapPolicy, guard_bins: usize) -> StitcherSettings {
        // 1 kHz grid over [100, 200] kHz, 16 kHz windows
        StitcherSettings {
            span: FrequencyRange::new(100e3, 200e3).unwrap(),
            fft_size: FFT,
            bin_width_hz: 1e3,
            guard_bins,
            dc_notch_bins: 0,
            max_bin_age: Duration::from_secs(2),
            overlap_policy: policy,
            peak_hold: true,
        }
    }

    fn capture(center_hz: f64, ts_ms: u64, level: f64) -> Capture {
        Capture::new(center_hz, 16e3, Duration::from_millis(ts_ms), vec![level; FFT])
    }

    #[test]
    fn test_bins_map_to_absolute_frequency() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        let view = stitcher.ingest(&capture(120e3, 0, 3.0)).unwrap();

        // Bin 0 lands on 112 kHz, bin 15 on 127 kHz
        let written: Vec<f64> = view
            .bins()
            .iter()
            .filter(|b| b.updated_at.is_some())
            .map(|b| b.frequency_hz)
            .collect();
        assert_eq!(written.len(), 16);
        assert_eq!(written[0], 112e3);
        assert_eq!(written[15], 127e3);
        assert_eq!(stitcher.last_report().written, 16);
    }

    #[test]
    fn test_out_of_span_bins_discarded() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        stitcher.ingest(&capture(100e3, 0, 1.0)).unwrap();
        // 92..99 kHz fall below the span
        assert_eq!(stitcher.last_report().written, 8);
        assert_eq!(stitcher.last_report().skipped, 8);
    }

    #[test]
    fn test_guard_bins_excluded() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 2)).unwrap();
        let view = stitcher.ingest(&capture(150e3, 0, 1.0)).unwrap();
        let lo = view.index_of(142e3).unwrap();
        let hi = view.index_of(157e3).unwrap();
        assert!(view.bins()[lo].updated_at.is_none());
        assert!(view.bins()[lo + 1].updated_at.is_none());
        assert!(view.bins()[lo + 2].updated_at.is_some());
        assert!(view.bins()[hi - 2].updated_at.is_some());
        assert!(view.bins()[hi - 1].updated_at.is_none());
        assert_eq!(stitcher.last_report().written, 12);
    }

    #[test]
    fn test_last_write_wins_by_timestamp() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        stitcher.ingest(&capture(150e3, 100, 1.0)).unwrap();
        stitcher.ingest(&capture(150e3, 200, 5.0)).unwrap();
        // An older capture arriving late does not overwrite fresher data
        let view = stitcher.ingest(&capture(150e3, 150, 9.0)).unwrap();
        let idx = view.index_of(150e3).unwrap();
        assert_eq!(view.bins()[idx].power, 5.0);
        assert_eq!(view.bins()[idx].updated_at, Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_reingest_is_idempotent() {
        for policy in [
            OverlapPolicy::LastWriteWins,
            OverlapPolicy::ExponentialAverage { alpha: 0.5 },
        ] {
            let mut stitcher = Stitcher::new(settings(policy, 1)).unwrap();
            let cap = capture(150e3, 10, 4.0);
            let once = (*stitcher.ingest(&cap).unwrap()).clone();
            let twice = (*stitcher.ingest(&cap).unwrap()).clone();
            assert_eq!(once, twice, "policy {:?}", policy);
        }
    }

    #[test]
    fn test_exponential_average() {
        let policy = OverlapPolicy::ExponentialAverage { alpha: 0.25 };
        let mut stitcher = Stitcher::new(settings(policy, 0)).unwrap();
        stitcher.ingest(&capture(150e3, 0, 8.0)).unwrap();
        let view = stitcher.ingest(&capture(150e3, 100, 4.0)).unwrap();
        let idx = view.index_of(150e3).unwrap();
        assert!((view.bins()[idx].power - 7.0).abs() < 1e-12);

        // After the bin went stale the average restarts from the new value
        let view = stitcher.ingest(&capture(150e3, 5000, 2.0)).unwrap();
        assert_eq!(view.bins()[idx].power, 2.0);
    }

    #[test]
    fn test_rejected_capture_leaves_view_untouched() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        let before = stitcher.ingest(&capture(150e3, 0, 1.0)).unwrap();

        let short = Capture::new(150e3, 16e3, Duration::from_millis(10_000), vec![1.0; 8]);
        let err = stitcher.ingest(&short).unwrap_err();
        assert!(matches!(err, PipelineError::BinCountMismatch { .. }));

        // Staleness clock did not move either
        assert_eq!(*stitcher.snapshot(), *before);
        assert_eq!(stitcher.ingested(), 1);
    }

    #[test]
    fn test_wrong_sample_rate_rejected() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        let wide = Capture::new(150e3, 64e3, Duration::ZERO, vec![1.0; FFT]);
        assert!(matches!(
            stitcher.ingest(&wide),
            Err(PipelineError::MalformedCapture { .. })
        ));
        assert_eq!(stitcher.snapshot().freshness_counts().0, 0);
    }

    #[test]
    fn test_snapshot_isolated_from_later_ingest() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        let first = stitcher.ingest(&capture(150e3, 0, 1.0)).unwrap();
        stitcher.ingest(&capture(150e3, 100, 2.0)).unwrap();
        let idx = first.index_of(150e3).unwrap();
        assert_eq!(first.bins()[idx].power, 1.0);
        assert_eq!(stitcher.snapshot().bins()[idx].power, 2.0);
    }

    #[test]
    fn test_released_snapshot_buffer_is_reused() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        let mut reference = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        let captures = [
            capture(120e3, 0, 1.0),
            capture(150e3, 100, 2.0),
            capture(125e3, 200, 3.0),
            capture(180e3, 300, 4.0),
        ];

        // Like a watch channel: only the latest snapshot is kept outside
        let mut published = stitcher.ingest(&captures[0]).unwrap();
        let first_buffer = published.bins().as_ptr();
        for cap in &captures[1..3] {
            published = stitcher.ingest(cap).unwrap();
        }
        assert_eq!(published.bins().as_ptr(), first_buffer);
        published = stitcher.ingest(&captures[3]).unwrap();

        for cap in &captures {
            reference.ingest(cap).unwrap();
        }
        assert_eq!(*published, *reference.snapshot());
    }

    #[test]
    fn test_held_snapshot_forces_copy() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        let held = stitcher.ingest(&capture(120e3, 0, 1.0)).unwrap();
        stitcher.ingest(&capture(150e3, 100, 2.0)).unwrap();
        let latest = stitcher.ingest(&capture(120e3, 200, 9.0)).unwrap();

        let idx = held.index_of(120e3).unwrap();
        assert_eq!(held.bins()[idx].power, 1.0);
        assert_eq!(latest.bins()[idx].power, 9.0);
        assert_ne!(held.bins().as_ptr(), latest.bins().as_ptr());
    }

    #[test]
    fn test_staleness_after_max_age() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        stitcher.ingest(&capture(120e3, 0, 1.0)).unwrap();
        let view = stitcher.ingest(&capture(180e3, 3000, 1.0)).unwrap();
        let old = view.index_of(120e3).unwrap();
        let new = view.index_of(180e3).unwrap();
        assert!(view.is_stale(old));
        assert!(!view.is_stale(new));
        // Stale bins keep their last known value
        assert_eq!(view.bins()[old].power, 1.0);
    }

    #[test]
    fn test_peak_hold_and_reset() {
        let mut stitcher = Stitcher::new(settings(OverlapPolicy::LastWriteWins, 0)).unwrap();
        stitcher.ingest(&capture(150e3, 0, 9.0)).unwrap();
        let view = stitcher.ingest(&capture(150e3, 100, 2.0)).unwrap();
        let idx = view.index_of(150e3).unwrap();
        assert_eq!(view.peak_hold().unwrap()[idx], 9.0);

        stitcher.reset_peaks();
        assert_eq!(stitcher.snapshot().peak_hold().unwrap()[idx], 0.0);
    }

    #[test]
    fn test_overlap_policy_validation() {
        assert!(OverlapPolicy::ExponentialAverage { alpha: 0.0 }.validate().is_err());
        assert!(OverlapPolicy::ExponentialAverage { alpha: 1.0 }.validate().is_ok());
        let parsed: OverlapPolicy =
            serde_json::from_str(r#"{"policy": "exponential_average", "alpha": 0.3}"#).unwrap();
        assert_eq!(parsed, OverlapPolicy::ExponentialAverage { alpha: 0.3 });
    }
}
