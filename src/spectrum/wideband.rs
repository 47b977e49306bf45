// WidebandSpectrum - stitched view across the whole sweep span
//
// The view is a fixed grid of bins spaced one FFT bin apart, starting at the
// sweep start frequency. Each bin remembers when it was last written so that
// freshness can be derived lazily against the newest timestamp the view has
// seen (`as_of`), keeping each ingest proportional to the window size.

use std::ops::Range;
use std::time::Duration;

use serde::Serialize;

use crate::error::PipelineError;
use crate::frequency::FrequencyRange;
use crate::sweep::MAX_GRID_BINS;

/// Lowest power reported in dB views
pub const DB_FLOOR: f64 = -140.0;

/// Convert linear power to dB, floored at [`DB_FLOOR`]
pub fn power_to_db(power: f64) -> f64 {
    if power > 0.0 {
        (10.0 * power.log10()).max(DB_FLOOR)
    } else {
        DB_FLOOR
    }
}

/// One grid point of the stitched spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectrumBin {
    /// Absolute frequency in Hz
    pub frequency_hz: f64,
    /// Linear power (0.0 until first written)
    pub power: f64,
    /// Timestamp of the capture that last wrote this bin
    pub updated_at: Option<Duration>,
}

/// Freshness of a bin relative to the view's `as_of` time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinFreshness {
    /// Never written
    Empty,
    /// Written within `max_bin_age`
    Fresh,
    /// Last known value, older than `max_bin_age`
    Stale,
}

/// Stitched wideband power spectrum
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidebandSpectrum {
    span: FrequencyRange,
    bin_width_hz: f64,
    max_bin_age: Duration,
    bins: Vec<SpectrumBin>,
    peak_hold: Option<Vec<f64>>,
    as_of: Option<Duration>,
}

impl WidebandSpectrum {
    /// Build an empty grid covering `span` at `bin_width_hz` spacing
    ///
    /// # Returns
    /// * `Err(PipelineError::InvariantViolation)` - the grid would be empty,
    ///   larger than [`MAX_GRID_BINS`], or not strictly increasing
    pub fn new(
        span: FrequencyRange,
        bin_width_hz: f64,
        max_bin_age: Duration,
        peak_hold: bool,
    ) -> Result<Self, PipelineError> {
        if !(bin_width_hz > 0.0) || !bin_width_hz.is_finite() {
            return Err(PipelineError::InvariantViolation {
                details: format!("grid bin width {} Hz", bin_width_hz),
            });
        }

        let count = (span.width_hz() / bin_width_hz).floor() + 1.0;
        if count > MAX_GRID_BINS as f64 {
            return Err(PipelineError::InvariantViolation {
                details: format!("grid of {:.0} bins exceeds {}", count, MAX_GRID_BINS),
            });
        }
        let count = count as usize;
        let bins: Vec<SpectrumBin> = (0..count)
            .map(|i| SpectrumBin {
                frequency_hz: span.low_hz + i as f64 * bin_width_hz,
                power: 0.0,
                updated_at: None,
            })
            .collect();

        let spectrum = Self {
            span,
            bin_width_hz,
            max_bin_age,
            peak_hold: peak_hold.then(|| vec![0.0; bins.len()]),
            bins,
            as_of: None,
        };
        spectrum.check_ordering(0..spectrum.bins.len())?;
        Ok(spectrum)
    }

    pub fn span(&self) -> FrequencyRange {
        self.span
    }

    pub fn bin_width_hz(&self) -> f64 {
        self.bin_width_hz
    }

    pub fn max_bin_age(&self) -> Duration {
        self.max_bin_age
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &[SpectrumBin] {
        &self.bins
    }

    /// Newest timestamp the view has been aged to
    pub fn as_of(&self) -> Option<Duration> {
        self.as_of
    }

    /// Max-hold envelope (linear power), when enabled
    pub fn peak_hold(&self) -> Option<&[f64]> {
        self.peak_hold.as_deref()
    }

    /// Nearest grid index for `hz`
    ///
    /// Frequencies up to half a grid bin outside the span snap onto the edge
    /// bins, so window centres that are not grid-aligned still reach them.
    pub fn index_of(&self, hz: f64) -> Option<usize> {
        let last = self.bins.len() - 1;
        let position = (hz - self.span.low_hz) / self.bin_width_hz;
        if !(position >= -0.5) {
            return None;
        }
        if hz > self.span.high_hz && position >= last as f64 + 0.5 {
            return None;
        }
        Some((position.round().max(0.0) as usize).min(last))
    }

    pub fn freshness(&self, index: usize) -> BinFreshness {
        match (self.bins[index].updated_at, self.as_of) {
            (None, _) => BinFreshness::Empty,
            (Some(at), Some(now)) if now.saturating_sub(at) > self.max_bin_age => {
                BinFreshness::Stale
            }
            _ => BinFreshness::Fresh,
        }
    }

    pub fn is_stale(&self, index: usize) -> bool {
        self.freshness(index) == BinFreshness::Stale
    }

    /// Linear power of fresh bins whose frequency lies in `band`
    ///
    /// Stale and never-written bins are excluded so that decisions are only
    /// made on current data.
    pub fn fresh_power_in(&self, band: &FrequencyRange) -> Vec<f64> {
        self.bins
            .iter()
            .enumerate()
            .filter(|(i, bin)| {
                band.contains(bin.frequency_hz) && self.freshness(*i) == BinFreshness::Fresh
            })
            .map(|(_, bin)| bin.power)
            .collect()
    }

    /// Count bins per freshness class: (fresh, stale, empty)
    pub fn freshness_counts(&self) -> (usize, usize, usize) {
        (0..self.bins.len()).fold((0, 0, 0), |(fresh, stale, empty), i| {
            match self.freshness(i) {
                BinFreshness::Fresh => (fresh + 1, stale, empty),
                BinFreshness::Stale => (fresh, stale + 1, empty),
                BinFreshness::Empty => (fresh, stale, empty + 1),
            }
        })
    }

    /// Power in dB for display consumers
    pub fn power_db(&self) -> Vec<f64> {
        self.bins.iter().map(|bin| power_to_db(bin.power)).collect()
    }

    /// Verify that frequencies strictly increase over `range`
    pub fn check_ordering(&self, range: Range<usize>) -> Result<(), PipelineError> {
        let end = range.end.min(self.bins.len());
        let start = range.start.saturating_sub(1);
        for i in start + 1..end {
            let (prev, next) = (self.bins[i - 1].frequency_hz, self.bins[i].frequency_hz);
            if !(next > prev) {
                return Err(PipelineError::InvariantViolation {
                    details: format!(
                        "stitched bins out of order at {}: {} Hz then {} Hz",
                        i, prev, next
                    ),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn bins_mut(&mut self) -> &mut [SpectrumBin] {
        &mut self.bins
    }

    pub(crate) fn peak_hold_mut(&mut self) -> Option<&mut Vec<f64>> {
        self.peak_hold.as_mut()
    }

    /// Move `as_of` forward (never backwards)
    pub(crate) fn age_to(&mut self, now: Duration) {
        self.as_of = Some(self.as_of.map_or(now, |prev| prev.max(now)));
    }

    /// Bring this buffer level with `source` (same grid)
    ///
    /// `changed` lists the bins that may differ; `None` copies everything.
    pub(crate) fn copy_changes_from(&mut self, source: &WidebandSpectrum, changed: Option<Range<usize>>) {
        let Some(range) = changed.filter(|_| self.bins.len() == source.bins.len()) else {
            self.clone_from(source);
            return;
        };
        self.bins[range.clone()].copy_from_slice(&source.bins[range.clone()]);
        match (self.peak_hold.as_mut(), source.peak_hold.as_ref()) {
            (Some(dst), Some(src)) => dst[range.clone()].copy_from_slice(&src[range]),
            _ => self.peak_hold = source.peak_hold.clone(),
        }
        self.as_of = source.as_of;
    }

    pub(crate) fn reset_peak_hold(&mut self) {
        if let Some(peaks) = self.peak_hold.as_mut() {
            peaks.iter_mut().for_each(|p| *p = 0.0);
        }
    }
}
