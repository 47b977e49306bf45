//! Configuration documents loaded from disk into a running coordinator

use std::io::Write;
use std::time::Duration;

use spectrum_switch::config::AppConfig;
use spectrum_switch::error::{ConfigError, ConfigErrorCodes, ErrorCode};
use spectrum_switch::spectrum::OverlapPolicy;
use spectrum_switch::switching::{ModeKind, PolicyRequest, PortId};
use spectrum_switch::Coordinator;

const FULL_DOCUMENT: &str = r#"{
    "sweep": {
        "start_hz": "430MHz",
        "end_hz": "440MHz",
        "window_bandwidth_hz": "2.5MHz",
        "overlap_fraction": 0.3,
        "capture_duration_ms": 50,
        "tune_tolerance_hz": "10Hz"
    },
    "stitch": {
        "fft_size": 512,
        "guard_bins": 20,
        "max_bin_age_ms": 2000,
        "overlap_policy": { "policy": "exponential_average", "alpha": 0.5 },
        "peak_hold": true
    },
    "metrics": {
        "occupancy_margin_db": 8.0,
        "analysis_bands": [ { "low_hz": 433e6, "high_hz": 435e6 } ]
    },
    "switching": {
        "ports": ["ANT1", "ANT2", "ANT3"],
        "initial_port": "ANT2",
        "initial_mode": "time",
        "time_slots": [
            { "port": "ANT2", "dwell_ms": 3000 },
            { "port": 0, "dwell_ms": 1000 }
        ],
        "frequency_ranges": [
            { "low_hz": "430MHz", "high_hz": "435MHz", "port": "ANT1" },
            { "low_hz": "435MHz", "high_hz": "440MHz", "port": "ANT3" }
        ],
        "fallback_order": ["ANT1", "ANT3"],
        "n_confirm": 2,
        "cooldown_ms": 10000
    }
}"#;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_document_loads_and_starts() {
    let file = write_temp(FULL_DOCUMENT);
    let config = AppConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.sweep.window_bandwidth_hz, 2.5e6);
    assert_eq!(config.sweep.tune_tolerance_hz, 10.0);
    assert_eq!(
        config.stitch.overlap_policy,
        OverlapPolicy::ExponentialAverage { alpha: 0.5 }
    );
    assert_eq!(config.switching.n_confirm, 2);
    // Unspecified fields keep their defaults
    assert_eq!(config.sweep.max_capture_retries, 3);

    let coordinator = Coordinator::new(&config).unwrap();
    let state = coordinator.state();
    assert_eq!(state.mode, ModeKind::Time);
    assert_eq!(state.port, PortId(1));
    assert_eq!(state.port_label, "ANT2");
    assert_eq!(state.time_slot, Some(0));
    assert_eq!(
        config.max_bin_age(),
        Duration::from_millis(2000)
    );
}

#[test]
fn test_configured_modes_accept_requests() {
    let config = AppConfig::from_json_str(FULL_DOCUMENT).unwrap();
    let coordinator = Coordinator::new(&config).unwrap();
    for kind in [ModeKind::Frequency, ModeKind::Event, ModeKind::Manual] {
        let request = PolicyRequest::SetMode {
            mode: config.switching.mode_spec(kind),
        };
        assert!(coordinator.submit(request).is_ok(), "{} rejected", kind);
    }
}

#[test]
fn test_rejections_carry_stable_codes() {
    let cases = [
        (
            r#"{ "sweep": { "start_hz": "108MHz", "end_hz": "88MHz" } }"#,
            ConfigErrorCodes::INVALID_SWEEP_SPAN,
        ),
        (
            r#"{ "sweep": { "overlap_fraction": 0.01 } }"#,
            ConfigErrorCodes::OVERLAP_TOO_SMALL,
        ),
        (
            r#"{ "switching": { "initial_port": "C7" } }"#,
            ConfigErrorCodes::UNKNOWN_PORT,
        ),
        (
            r#"{ "switching": { "initial_port": 12 } }"#,
            ConfigErrorCodes::PORT_OUT_OF_RANGE,
        ),
        (
            r#"{ "switching": { "initial_mode": "frequency" } }"#,
            ConfigErrorCodes::EMPTY_RANGE_TABLE,
        ),
        (
            r#"{ "switching": { "fallback_order": ["A1"] } }"#,
            ConfigErrorCodes::INVALID_FALLBACK_ORDER,
        ),
        (
            r#"{ "sweep": { "start_hz": "88 furlongs" } }"#,
            ConfigErrorCodes::PARSE_FAILED,
        ),
        (r#"{ "sweep": "#, ConfigErrorCodes::PARSE_FAILED),
    ];
    for (document, code) in cases {
        let err = AppConfig::from_json_str(document).unwrap_err();
        assert_eq!(err.code(), code, "{} gave {}", document, err);
    }
}

#[test]
fn test_unreadable_file() {
    let err = AppConfig::load_from_file("/nonexistent/spectrum-switch.json").unwrap_err();
    assert!(matches!(err, ConfigError::IoFailed { .. }));
}
