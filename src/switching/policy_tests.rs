use super::*;
use crate::switching::modes::{RangeSpec, SlotSpec};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn three_ports() -> PortSet {
    PortSet::new(vec!["A".into(), "B".into(), "C".into()]).unwrap()
}

fn time_spec(dwell_ms: u64) -> ModeSpec {
    ModeSpec::Time {
        slots: ["A", "B", "C"]
            .iter()
            .map(|p| SlotSpec {
                port: (*p).into(),
                dwell_ms,
            })
            .collect(),
    }
}

fn event_spec(n_confirm: u32, cooldown_ms: u64) -> ModeSpec {
    ModeSpec::Event {
        fallback_order: vec!["A".into(), "B".into(), "C".into()],
        n_confirm,
        cooldown_ms,
        occupancy_threshold: 0.5,
        flatness_threshold: 0.8,
    }
}

fn engine_in(spec: ModeSpec) -> PolicyEngine {
    let ports = three_ports();
    let mode = spec.build(&ports).unwrap();
    PolicyEngine::new(ports, PortId(0), mode).unwrap()
}

fn metric(occupancy: f64, flatness: f64) -> BandMetric {
    let band = FrequencyRange::new(100e6, 101e6).unwrap();
    BandMetric {
        occupancy,
        flatness,
        ..BandMetric::benign(band, -90.0, 64, Duration::ZERO)
    }
}

/// Evaluate and commit whatever is proposed (transport always succeeds)
fn tick(engine: &mut PolicyEngine, now: Duration, metrics: Option<&[BandMetric]>) -> PolicyOutcome {
    let outcome = engine.evaluate(&EvaluationInput {
        now,
        tuned_hz: 100e6,
        metrics,
    });
    if let Some(cmd) = &outcome.command {
        engine.commit(cmd).unwrap();
    }
    outcome
}

#[test]
fn test_manual_holds_until_requested() {
    let mut engine = engine_in(ModeSpec::Manual);
    for t in 0..10 {
        assert!(tick(&mut engine, secs(t), None).command.is_none());
    }

    engine
        .apply(&PolicyRequest::SelectPort { port: "C".into() }, secs(10))
        .unwrap();
    let outcome = tick(&mut engine, secs(11), None);
    let cmd = outcome.command.unwrap();
    assert_eq!((cmd.from, cmd.to), (PortId(0), PortId(2)));
    assert_eq!(cmd.reason, SwitchReason::ManualRequest);
    assert_eq!(engine.state().port, PortId(2));
    assert_eq!(engine.state().port_label, "C");

    // Request satisfied, nothing further
    assert!(tick(&mut engine, secs(12), None).command.is_none());
}

#[test]
fn test_select_nonexistent_port_rejected() {
    let mut engine = engine_in(time_spec(5000));
    let err = engine
        .apply(&PolicyRequest::SelectPort { port: 7usize.into() }, secs(0))
        .unwrap_err();
    assert!(matches!(err, ConfigError::PortOutOfRange { .. }));
    assert_eq!(engine.state().port, PortId(0));
    assert_eq!(engine.state().mode, ModeKind::Time);
}

#[test]
fn test_select_port_leaves_autonomous_mode() {
    let mut engine = engine_in(event_spec(3, 4000));
    engine
        .apply(&PolicyRequest::SelectPort { port: "B".into() }, secs(1))
        .unwrap();
    assert_eq!(engine.state().mode, ModeKind::Manual);
    assert_eq!(tick(&mut engine, secs(2), None).command.unwrap().to, PortId(1));
}

#[test]
fn test_failed_transport_reproposes_next_tick() {
    let mut engine = engine_in(ModeSpec::Manual);
    engine
        .apply(&PolicyRequest::SelectPort { port: "B".into() }, secs(0))
        .unwrap();

    // Proposal not committed: transport failed
    let first = engine.evaluate(&EvaluationInput {
        now: secs(1),
        tuned_hz: 0.0,
        metrics: None,
    });
    assert!(first.command.is_some());
    assert_eq!(engine.state().port, PortId(0));

    let second = tick(&mut engine, secs(2), None);
    assert_eq!(second.command.unwrap().to, PortId(1));
    assert_eq!(engine.state().port, PortId(1));
    assert_eq!(engine.state().switch_count, 1);
}

#[test]
fn test_commit_rejects_stale_command() {
    let mut engine = engine_in(ModeSpec::Manual);
    let cmd = SwitchCommand {
        from: PortId(2),
        to: PortId(1),
        to_label: "B".into(),
        mode: ModeKind::Manual,
        reason: SwitchReason::ManualRequest,
        issued_at: secs(0),
    };
    assert!(engine.commit(&cmd).unwrap_err().is_fatal());
}

#[test]
fn test_frequency_mode_follows_tuned_frequency() {
    let spec = ModeSpec::Frequency {
        ranges: vec![
            RangeSpec {
                low_hz: 100e6,
                high_hz: 200e6,
                port: "A".into(),
            },
            RangeSpec {
                low_hz: 200e6,
                high_hz: 300e6,
                port: "B".into(),
            },
        ],
    };
    let mut engine = engine_in(spec);

    let at = |engine: &mut PolicyEngine, hz: f64, t: u64| {
        let outcome = engine.evaluate(&EvaluationInput {
            now: secs(t),
            tuned_hz: hz,
            metrics: None,
        });
        if let Some(cmd) = &outcome.command {
            engine.commit(cmd).unwrap();
        }
        outcome.command
    };

    let cmd = at(&mut engine, 250e6, 0).unwrap();
    assert_eq!(cmd.to, PortId(1));
    assert!(matches!(cmd.reason, SwitchReason::FrequencyRange { .. }));

    // Same range: no switch; outside every range: hold
    assert!(at(&mut engine, 260e6, 1).is_none());
    assert!(at(&mut engine, 350e6, 2).is_none());
    assert_eq!(engine.state().port, PortId(1));

    assert_eq!(at(&mut engine, 150e6, 3).unwrap().to, PortId(0));
}

#[test]
fn test_invalid_mode_request_keeps_previous_mode() {
    let mut engine = engine_in(time_spec(5000));
    let overlapping = ModeSpec::Frequency {
        ranges: vec![
            RangeSpec {
                low_hz: 100e6,
                high_hz: 200e6,
                port: "A".into(),
            },
            RangeSpec {
                low_hz: 150e6,
                high_hz: 300e6,
                port: "B".into(),
            },
        ],
    };
    let err = engine
        .apply(&PolicyRequest::SetMode { mode: overlapping }, secs(1))
        .unwrap_err();
    assert!(matches!(err, ConfigError::OverlappingRanges { .. }));
    assert_eq!(engine.state().mode, ModeKind::Time);
    assert_eq!(engine.mode().kind(), ModeKind::Time);

    let empty = ModeSpec::Frequency { ranges: vec![] };
    assert!(engine
        .apply(&PolicyRequest::SetMode { mode: empty }, secs(1))
        .is_err());
    assert_eq!(engine.state().mode, ModeKind::Time);
}

#[test]
fn test_time_mode_switch_count_after_16s() {
    let mut engine = engine_in(ModeSpec::Manual);
    engine
        .apply(&PolicyRequest::SetMode { mode: time_spec(5000) }, secs(0))
        .unwrap();

    let mut switches = 0;
    for t in 1..=16 {
        if tick(&mut engine, secs(t), None).command.is_some() {
            switches += 1;
        }
    }
    assert_eq!(switches, 3);
    assert_eq!(engine.state().port, PortId(3 % 3));
    assert_eq!(engine.state().last_switch_at, Some(secs(15)));
}

#[test]
fn test_time_mode_ignores_anomalies() {
    let mut engine = engine_in(time_spec(5000));
    engine
        .apply(&PolicyRequest::SetMode { mode: time_spec(5000) }, secs(0))
        .unwrap();
    let hot = [metric(1.0, 0.0)];
    for t in 1..5 {
        assert!(tick(&mut engine, secs(t), Some(&hot)).command.is_none());
    }
    assert_eq!(engine.state().hold_remaining, Some(secs(1)));
    assert!(tick(&mut engine, secs(5), Some(&hot)).command.is_some());
}

#[test]
fn test_time_mode_aligns_to_schedule_on_entry() {
    let ports = three_ports();
    let mut engine = PolicyEngine::new(ports, PortId(1), SwitchMode::Manual).unwrap();
    let spec = ModeSpec::Time {
        slots: vec![
            SlotSpec {
                port: "C".into(),
                dwell_ms: 1000,
            },
            SlotSpec {
                port: "A".into(),
                dwell_ms: 3000,
            },
        ],
    };
    engine
        .apply(&PolicyRequest::SetMode { mode: spec }, secs(0))
        .unwrap();

    let cmd = tick(&mut engine, secs(0), None).command.unwrap();
    assert_eq!(cmd.to, PortId(2));
    assert_eq!(cmd.reason, SwitchReason::ScheduleAlign { slot: 0 });

    // Per-slot dwell: C for 1 s, then A for 3 s
    assert_eq!(tick(&mut engine, secs(1), None).command.unwrap().to, PortId(0));
    assert!(tick(&mut engine, secs(3), None).command.is_none());
    assert_eq!(tick(&mut engine, secs(4), None).command.unwrap().to, PortId(2));
}

#[test]
fn test_event_single_spike_does_not_switch() {
    let mut engine = engine_in(event_spec(3, 4000));
    let spike = [metric(0.95, 0.9)];
    let quiet = [metric(0.05, 0.95)];

    assert!(tick(&mut engine, secs(1), Some(&spike)).command.is_none());
    assert_eq!(engine.state().anomaly, AnomalyStatus::Building);
    for t in 2..10 {
        assert!(tick(&mut engine, secs(t), Some(&quiet)).command.is_none());
    }
    assert_eq!(engine.state().confirm_count, 0);
    assert_eq!(engine.state().anomaly, AnomalyStatus::Clear);
    assert_eq!(engine.state().port, PortId(0));
}

#[test]
fn test_event_confirms_then_cools_down() {
    let mut engine = engine_in(event_spec(3, 4000));
    let hot = [metric(0.95, 0.9)];

    let mut switch_times = Vec::new();
    let mut suppressed = 0;
    for t in 1..=8 {
        let outcome = tick(&mut engine, secs(t), Some(&hot));
        if outcome.command.is_some() {
            switch_times.push(t);
        }
        if outcome.suppressed.is_some() {
            suppressed += 1;
        }
    }

    // Third breaching cycle switches; cool-down [3, 7) blocks the next one
    assert_eq!(switch_times, vec![3, 7]);
    assert_eq!(suppressed, 1);
    assert_eq!(engine.state().port, PortId(2));
}

#[test]
fn test_event_cooldown_reports_but_does_not_switch() {
    let mut engine = engine_in(event_spec(2, 10_000));
    let hot = [metric(0.9, 0.9)];
    tick(&mut engine, secs(1), Some(&hot));
    let cmd = tick(&mut engine, secs(2), Some(&hot)).command.unwrap();
    assert_eq!(cmd.to, PortId(1));
    assert!(matches!(
        cmd.reason,
        SwitchReason::AnomalyConfirmed { consecutive: 2, .. }
    ));

    for t in 3..12 {
        let outcome = tick(&mut engine, secs(t), Some(&hot));
        assert!(outcome.command.is_none(), "switched at {}", t);
    }
    assert_eq!(engine.state().anomaly, AnomalyStatus::Suppressed);
    assert_eq!(engine.state().port, PortId(1));
    assert_eq!(engine.state().switch_count, 1);
}

#[test]
fn test_event_flatness_breach_counts() {
    let mut engine = engine_in(event_spec(2, 0));
    // 1 - 0.1 = 0.9 > 0.8
    let tonal = [metric(0.0, 0.1)];
    tick(&mut engine, secs(1), Some(&tonal));
    assert!(tick(&mut engine, secs(2), Some(&tonal)).command.is_some());
}

#[test]
fn test_event_missing_metrics_keep_counter() {
    let mut engine = engine_in(event_spec(3, 4000));
    let hot = [metric(0.95, 0.9)];
    tick(&mut engine, secs(1), Some(&hot));
    tick(&mut engine, secs(2), Some(&hot));
    // Dropped capture: no metrics this cycle
    assert!(tick(&mut engine, secs(3), None).command.is_none());
    assert_eq!(engine.state().confirm_count, 2);
    assert!(tick(&mut engine, secs(4), Some(&hot)).command.is_some());
}

#[test]
fn test_event_degenerate_spectrum_never_triggers() {
    let mut engine = engine_in(event_spec(1, 0));
    let degenerate = [metric(0.0, 1.0)];
    for t in 0..20 {
        assert!(tick(&mut engine, secs(t), Some(&degenerate)).command.is_none());
    }
}

#[test]
fn test_mode_change_resets_confirmation() {
    let mut engine = engine_in(event_spec(3, 4000));
    let hot = [metric(0.95, 0.9)];
    tick(&mut engine, secs(1), Some(&hot));
    tick(&mut engine, secs(2), Some(&hot));
    engine
        .apply(&PolicyRequest::SetMode { mode: event_spec(3, 4000) }, secs(2))
        .unwrap();
    assert_eq!(engine.state().confirm_count, 0);
    assert!(tick(&mut engine, secs(3), Some(&hot)).command.is_none());
}

#[test]
fn test_request_json_shape() {
    let request: PolicyRequest =
        serde_json::from_str(r#"{"request": "select_port", "port": "B"}"#).unwrap();
    assert_eq!(request, PolicyRequest::SelectPort { port: "B".into() });
}
