//! Configuration loading and validation
//!
//! The whole pipeline is configured from one JSON document. Every section and
//! field is optional and falls back to the values in the `Default` impls, but a
//! document that exists and is unreadable, unparsable, or inconsistent is an
//! error: nothing is silently defaulted once the user has said something.
//!
//! Frequencies accept a number of Hz or a string with a unit (`"433.92 MHz"`).
//! Durations are integer milliseconds (`*_ms`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::metrics::MetricEngine;
use crate::error::ConfigError;
use crate::frequency::{serde_hz, FrequencyRange};
use crate::spectrum::stitcher::{OverlapPolicy, StitcherSettings};
use crate::sweep::SweepPlan;
use crate::switching::modes::{ModeKind, ModeSpec, RangeSpec, SlotSpec, SwitchMode};
use crate::switching::policy::PolicyEngine;
use crate::switching::ports::{PortRef, PortSet, OPERA_CAKE_PORTS};

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub sweep: SweepConfig,
    pub stitch: StitchConfig,
    pub metrics: MetricsConfig,
    pub switching: SwitchingConfig,
}

/// Sweep span and capture timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    #[serde(with = "serde_hz")]
    pub start_hz: f64,
    #[serde(with = "serde_hz")]
    pub end_hz: f64,
    /// Instantaneous bandwidth of one capture (= sample rate)
    #[serde(with = "serde_hz")]
    pub window_bandwidth_hz: f64,
    /// Fraction of each window shared with the next, in [0, 1)
    pub overlap_fraction: f64,
    /// Time one capture takes, used for revisit latency
    pub capture_duration_ms: u64,
    /// Max distance between requested and reported centre
    #[serde(with = "serde_hz")]
    pub tune_tolerance_hz: f64,
    /// Dropped captures at one step before the step is skipped
    pub max_capture_retries: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_hz: 88e6,
            end_hz: 108e6,
            window_bandwidth_hz: 2e6,
            overlap_fraction: 0.25,
            capture_duration_ms: 100,
            tune_tolerance_hz: 1.0,
            max_capture_retries: 3,
        }
    }
}

/// Stitching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StitchConfig {
    /// Bins per capture
    pub fft_size: usize,
    /// Edge bins excluded on each side of every capture
    pub guard_bins: usize,
    /// Bins older than this are stale
    pub max_bin_age_ms: u64,
    /// Half-width of the DC notch (0 disables it)
    pub dc_notch_bins: usize,
    pub overlap_policy: OverlapPolicy,
    pub peak_hold: bool,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            guard_bins: 16,
            max_bin_age_ms: 5000,
            dc_notch_bins: 2,
            overlap_policy: OverlapPolicy::LastWriteWins,
            peak_hold: false,
        }
    }
}

/// Metric engine and noise floor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Occupancy threshold above the noise floor
    pub occupancy_margin_db: f64,
    /// Percentile of fresh bins used as the noise floor, in [0, 1]
    pub noise_floor_percentile: f64,
    /// Bands evaluated each cycle; empty means the whole sweep span
    pub analysis_bands: Vec<FrequencyRange>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            occupancy_margin_db: 6.0,
            noise_floor_percentile: 0.2,
            analysis_bands: Vec::new(),
        }
    }
}

/// Port set and switching mode parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SwitchingConfig {
    pub ports: Vec<String>,
    pub initial_port: PortRef,
    pub initial_mode: ModeKind,
    /// Frequency mode table, in priority order
    pub frequency_ranges: Vec<RangeSpec>,
    /// Time mode: uniform dwell over `time_order`
    pub dwell_ms: u64,
    /// Time mode port order; empty means all ports in declared order
    pub time_order: Vec<PortRef>,
    /// Time mode per-slot dwell; overrides `dwell_ms` / `time_order`
    pub time_slots: Vec<SlotSpec>,
    pub occupancy_threshold: f64,
    pub flatness_threshold: f64,
    pub n_confirm: u32,
    pub cooldown_ms: u64,
    /// Event mode fallback order; empty means all ports in declared order
    pub fallback_order: Vec<PortRef>,
    pub switch_log_capacity: usize,
}

impl Default for SwitchingConfig {
    fn default() -> Self {
        Self {
            ports: OPERA_CAKE_PORTS.clone(),
            initial_port: PortRef::Label("A1".to_string()),
            initial_mode: ModeKind::Manual,
            frequency_ranges: Vec::new(),
            dwell_ms: 5000,
            time_order: Vec::new(),
            time_slots: Vec::new(),
            occupancy_threshold: 0.5,
            flatness_threshold: 0.8,
            n_confirm: 3,
            cooldown_ms: 4000,
            fallback_order: Vec::new(),
            switch_log_capacity: 64,
        }
    }
}

impl SwitchingConfig {
    fn all_ports(&self) -> Vec<PortRef> {
        (0..self.ports.len()).map(PortRef::Index).collect()
    }

    /// Mode request for `kind` built from this section
    pub fn mode_spec(&self, kind: ModeKind) -> ModeSpec {
        match kind {
            ModeKind::Manual => ModeSpec::Manual,
            ModeKind::Frequency => ModeSpec::Frequency {
                ranges: self.frequency_ranges.clone(),
            },
            ModeKind::Time => {
                let slots = if !self.time_slots.is_empty() {
                    self.time_slots.clone()
                } else {
                    let order = if self.time_order.is_empty() {
                        self.all_ports()
                    } else {
                        self.time_order.clone()
                    };
                    order
                        .into_iter()
                        .map(|port| SlotSpec {
                            port,
                            dwell_ms: self.dwell_ms,
                        })
                        .collect()
                };
                ModeSpec::Time { slots }
            }
            ModeKind::Event => ModeSpec::Event {
                fallback_order: if self.fallback_order.is_empty() {
                    self.all_ports()
                } else {
                    self.fallback_order.clone()
                },
                n_confirm: self.n_confirm,
                cooldown_ms: self.cooldown_ms,
                occupancy_threshold: self.occupancy_threshold,
                flatness_threshold: self.flatness_threshold,
            },
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` - Loaded and validated configuration
    /// * `Err(ConfigError)` - File unreadable, JSON invalid, or values inconsistent
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::IoFailed {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let config = Self::from_json_str(&contents)?;
        log::info!("[Config] Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every cross-field rule by building each component once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let plan = self.sweep_plan()?;

        let sweep = &self.sweep;
        if !sweep.tune_tolerance_hz.is_finite() || sweep.tune_tolerance_hz < 0.0 {
            return Err(ConfigError::invalid(
                "sweep.tune_tolerance_hz",
                format!("{} Hz must be non-negative", sweep.tune_tolerance_hz),
            ));
        }
        if sweep.capture_duration_ms == 0 {
            return Err(ConfigError::invalid(
                "sweep.capture_duration_ms",
                "must be greater than zero",
            ));
        }

        let stitch = &self.stitch;
        if stitch.max_bin_age_ms == 0 {
            return Err(ConfigError::invalid(
                "stitch.max_bin_age_ms",
                "must be greater than zero",
            ));
        }
        if stitch.dc_notch_bins * 2 + 1 >= stitch.fft_size {
            return Err(ConfigError::invalid(
                "stitch.dc_notch_bins",
                format!("notch wider than {} bins", stitch.fft_size),
            ));
        }
        stitch.overlap_policy.validate()?;

        let metrics = &self.metrics;
        if !metrics.occupancy_margin_db.is_finite() {
            return Err(ConfigError::invalid(
                "metrics.occupancy_margin_db",
                "must be finite",
            ));
        }
        if !(0.0..=1.0).contains(&metrics.noise_floor_percentile) {
            return Err(ConfigError::invalid(
                "metrics.noise_floor_percentile",
                format!("{} is outside [0, 1]", metrics.noise_floor_percentile),
            ));
        }
        for band in &metrics.analysis_bands {
            let band = FrequencyRange::new(band.low_hz, band.high_hz)?;
            if !band.overlaps(&plan.span()) {
                return Err(ConfigError::invalid(
                    "metrics.analysis_bands",
                    format!("{} lies outside the sweep span {}", band, plan.span()),
                ));
            }
        }

        // Builds the initial mode, then every mode a later request could select
        let ports = self.port_set()?;
        self.policy_engine()?;
        let switching = &self.switching;
        if !switching.frequency_ranges.is_empty() {
            switching.mode_spec(ModeKind::Frequency).build(&ports)?;
        }
        switching.mode_spec(ModeKind::Time).build(&ports)?;
        // A single-port switch has nowhere to fall back to
        if ports.len() > 1 || !switching.fallback_order.is_empty() {
            switching.mode_spec(ModeKind::Event).build(&ports)?;
        }
        if switching.switch_log_capacity == 0 {
            return Err(ConfigError::invalid(
                "switching.switch_log_capacity",
                "must be greater than zero",
            ));
        }

        let revisit = plan.revisit_latency(self.capture_duration());
        if revisit > self.max_bin_age() {
            log::warn!(
                "[Config] Revisit latency {:?} exceeds max bin age {:?}; bins will go stale between visits",
                revisit,
                self.max_bin_age()
            );
        }
        Ok(())
    }

    pub fn capture_duration(&self) -> Duration {
        Duration::from_millis(self.sweep.capture_duration_ms)
    }

    pub fn max_bin_age(&self) -> Duration {
        Duration::from_millis(self.stitch.max_bin_age_ms)
    }

    pub fn sweep_plan(&self) -> Result<SweepPlan, ConfigError> {
        SweepPlan::new(
            self.sweep.start_hz,
            self.sweep.end_hz,
            self.sweep.window_bandwidth_hz,
            self.sweep.overlap_fraction,
            self.stitch.guard_bins,
            self.stitch.fft_size,
        )
    }

    pub fn stitcher_settings(&self) -> Result<StitcherSettings, ConfigError> {
        Ok(StitcherSettings {
            span: FrequencyRange::new(self.sweep.start_hz, self.sweep.end_hz)?,
            fft_size: self.stitch.fft_size,
            bin_width_hz: self.sweep.window_bandwidth_hz / self.stitch.fft_size.max(1) as f64,
            guard_bins: self.stitch.guard_bins,
            dc_notch_bins: self.stitch.dc_notch_bins,
            max_bin_age: self.max_bin_age(),
            overlap_policy: self.stitch.overlap_policy,
            peak_hold: self.stitch.peak_hold,
        })
    }

    pub fn metric_engine(&self) -> MetricEngine {
        MetricEngine::new(self.metrics.occupancy_margin_db)
    }

    /// Configured analysis bands, or the whole span
    pub fn analysis_bands(&self) -> Result<Vec<FrequencyRange>, ConfigError> {
        if self.metrics.analysis_bands.is_empty() {
            return Ok(vec![FrequencyRange::new(
                self.sweep.start_hz,
                self.sweep.end_hz,
            )?]);
        }
        self.metrics
            .analysis_bands
            .iter()
            .map(|band| FrequencyRange::new(band.low_hz, band.high_hz))
            .collect()
    }

    pub fn port_set(&self) -> Result<PortSet, ConfigError> {
        PortSet::new(self.switching.ports.clone())
    }

    /// Mode the engine starts in
    pub fn initial_mode(&self, ports: &PortSet) -> Result<SwitchMode, ConfigError> {
        self.switching
            .mode_spec(self.switching.initial_mode)
            .build(ports)
    }

    pub fn policy_engine(&self) -> Result<PolicyEngine, ConfigError> {
        let ports = self.port_set()?;
        let initial_port = ports.resolve(&self.switching.initial_port)?;
        let mode = self.initial_mode(&ports)?;
        PolicyEngine::new(ports, initial_port, mode)
    }
}
