use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use spectrum_switch::analysis::find_peaks;
use spectrum_switch::config::AppConfig;
use spectrum_switch::engine::{
    spawn_control_loop, CommandTransport, ControlLoop, Coordinator, Interferer, LatencyBenchmark,
    ManualClock, RecordingTransport, ReplaySource, RunSummary, SimSettings, SwitchTransport, SyntheticSource,
    SystemTimeSource, TimeSource, Tone,
};
use spectrum_switch::frequency::{format_frequency, parse_frequency, FrequencyRange};
use spectrum_switch::spectrum::WidebandSpectrum;
use spectrum_switch::switching::{ModeKind, PortRef};
use spectrum_switch::telemetry::TelemetrySnapshot;

fn main() -> ExitCode {
    spectrum_switch::init_logging();
    let cli = Cli::parse();
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("spectrum-switch error: {err:?}");
            ExitCode::from(1)
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "spectrum-switch", about = "Sweep, stitch and antenna-switch control CLI")]
struct Cli {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_ref())?;
        match self.command {
            Command::CheckConfig => check_config_command(&config),
            Command::Plan => plan_command(&config),
            Command::Simulate(args) => simulate_command(config, args),
            Command::Replay(args) => replay_command(config, args),
            Command::Latency(args) => latency_command(&config, args),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print it with defaults filled in.
    CheckConfig,
    /// Print the sweep plan: window centres and revisit latency.
    Plan,
    /// Run the control loop against the synthetic receiver.
    Simulate(SimulateArgs),
    /// Run the control loop over captures recorded as JSON lines.
    Replay(ReplayArgs),
    /// Alternate the switch between two ports and report command latency.
    Latency(LatencyArgs),
}

#[derive(Args, Debug, Clone)]
struct SwitchArgs {
    /// Override the initial switching mode.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Drive a real Opera Cake via `hackrf_operacake` instead of recording switches.
    #[arg(long)]
    switch_command: bool,
    /// Opera Cake board address for --switch-command.
    #[arg(long, default_value_t = 0)]
    board_address: u8,
    /// Number of strongest bins to report.
    #[arg(long, default_value_t = 5)]
    peaks: usize,
}

#[derive(Args, Debug, Clone)]
struct SimulateArgs {
    #[command(flatten)]
    switch: SwitchArgs,
    /// Number of capture cycles to run.
    #[arg(long, default_value_t = 200)]
    cycles: u64,
    /// RNG seed for the synthetic noise.
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
    /// Receiver noise power per sample (dB).
    #[arg(long, default_value_t = -90.0, allow_hyphen_values = true)]
    noise_db: f64,
    /// Continuous carrier as FREQ@DB, e.g. 100.1M@-40 (repeatable).
    #[arg(long = "tone", value_parser = parse_tone)]
    tones: Vec<Tone>,
    /// Interferer band lower edge, e.g. 95M.
    #[arg(long, value_parser = parse_hz, requires = "interferer_high")]
    interferer_low: Option<f64>,
    /// Interferer band upper edge.
    #[arg(long, value_parser = parse_hz, requires = "interferer_low")]
    interferer_high: Option<f64>,
    /// Interferer power per comb tone (dB).
    #[arg(long, default_value_t = -40.0, allow_hyphen_values = true)]
    interferer_db: f64,
    /// Interferer start (ms of simulated time).
    #[arg(long, default_value_t = 0)]
    interferer_from_ms: u64,
    /// Interferer end (ms of simulated time).
    #[arg(long, default_value_t = u64::MAX)]
    interferer_until_ms: u64,
    /// Run acquisition and control on separate threads.
    #[arg(long)]
    threaded: bool,
}

#[derive(Args, Debug, Clone)]
struct ReplayArgs {
    #[command(flatten)]
    switch: SwitchArgs,
    /// JSON-lines capture file.
    input: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct LatencyArgs {
    /// Switch cycles; each cycle visits both ports once.
    #[arg(long, default_value_t = 50)]
    cycles: u32,
    /// Wait after every switch command (ms).
    #[arg(long, default_value_t = 1500)]
    dwell_ms: u64,
    /// The two ports to alternate between, by label or index.
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"], default_values = ["A4", "B4"])]
    ports: Vec<String>,
    /// Drive a real Opera Cake via `hackrf_operacake` instead of recording switches.
    #[arg(long)]
    switch_command: bool,
    /// Opera Cake board address for --switch-command.
    #[arg(long, default_value_t = 0)]
    board_address: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
    Manual,
    Frequency,
    Time,
    Event,
}

impl From<ModeArg> for ModeKind {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Manual => ModeKind::Manual,
            ModeArg::Frequency => ModeKind::Frequency,
            ModeArg::Time => ModeKind::Time,
            ModeArg::Event => ModeKind::Event,
        }
    }
}

fn parse_hz(text: &str) -> Result<f64, String> {
    parse_frequency(text).map_err(|err| err.to_string())
}

fn parse_tone(text: &str) -> Result<Tone, String> {
    let (freq, db) = text
        .split_once('@')
        .ok_or_else(|| format!("expected FREQ@DB, got '{text}'"))?;
    Ok(Tone {
        frequency_hz: parse_hz(freq)?,
        power_db: db
            .trim()
            .parse()
            .map_err(|_| format!("invalid power '{db}'"))?,
    })
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::default(),
    };
    Ok(config)
}

fn apply_switch_args(config: &mut AppConfig, args: &SwitchArgs) {
    if let Some(mode) = args.mode {
        config.switching.initial_mode = mode.into();
    }
}

fn transport(args: &SwitchArgs) -> Box<dyn SwitchTransport> {
    switch_transport(args.switch_command, args.board_address)
}

fn switch_transport(switch_command: bool, board_address: u8) -> Box<dyn SwitchTransport> {
    if switch_command {
        Box::new(CommandTransport::operacake(board_address))
    } else {
        Box::new(RecordingTransport::new())
    }
}

fn check_config_command(config: &AppConfig) -> Result<()> {
    config.validate().context("configuration rejected")?;
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn plan_command(config: &AppConfig) -> Result<()> {
    let plan = config.sweep_plan()?;
    println!(
        "span {} - {}, step {}, {} windows",
        format_frequency(plan.span().low_hz),
        format_frequency(plan.span().high_hz),
        format_frequency(plan.step_hz()),
        plan.steps()
    );
    for (index, center) in plan.centers().iter().enumerate() {
        let (low, high) = plan.effective_coverage(index);
        println!(
            "{index:>4}  {:>14}  [{} .. {}]",
            format_frequency(*center),
            format_frequency(low),
            format_frequency(high)
        );
    }
    println!(
        "revisit latency {:?} at {:?} per capture",
        plan.revisit_latency(config.capture_duration()),
        config.capture_duration()
    );
    Ok(())
}

fn simulate_command(mut config: AppConfig, args: SimulateArgs) -> Result<()> {
    apply_switch_args(&mut config, &args.switch);
    let coordinator = Coordinator::new(&config).context("configuration rejected")?;

    let interferer = match (args.interferer_low, args.interferer_high) {
        (Some(low), Some(high)) => Some(Interferer {
            band: FrequencyRange::new(low, high)?,
            power_db: args.interferer_db,
            active_from: Duration::from_millis(args.interferer_from_ms),
            active_until: Duration::from_millis(args.interferer_until_ms),
        }),
        _ => None,
    };
    let clock = Arc::new(ManualClock::new());
    let source = SyntheticSource::new(
        SimSettings {
            sample_rate_hz: config.sweep.window_bandwidth_hz,
            fft_size: config.stitch.fft_size,
            noise_power_db: args.noise_db,
            tones: args.tones.clone(),
            interferer,
            capture_duration: config.capture_duration(),
            seed: args.seed,
        },
        Arc::clone(&clock),
    )?;
    let transport = transport(&args.switch);

    let (summary, spectrum, telemetry) = if args.threaded {
        let handle = spawn_control_loop(coordinator, source, transport, clock, Some(args.cycles));
        let observer = handle.observer().clone();
        let summary = handle.join()?;
        (summary, observer.spectrum(), observer.telemetry())
    } else {
        let mut control = ControlLoop::new(coordinator, source, transport, clock);
        let summary = control.run_cycles(args.cycles)?;
        let coordinator = control.coordinator();
        (summary, coordinator.spectrum(), coordinator.telemetry().snapshot())
    };
    print_report(&summary, &spectrum, telemetry, args.switch.peaks)
}

fn replay_command(mut config: AppConfig, args: ReplayArgs) -> Result<()> {
    apply_switch_args(&mut config, &args.switch);
    let coordinator = Coordinator::new(&config).context("configuration rejected")?;
    let source = ReplaySource::open(&args.input)?;
    let cycles = source.len() as u64;
    let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());

    let mut control = ControlLoop::new(coordinator, source, transport(&args.switch), clock);
    let summary = control.run_cycles(cycles)?;
    let coordinator = control.coordinator();
    print_report(
        &summary,
        &coordinator.spectrum(),
        coordinator.telemetry().snapshot(),
        args.switch.peaks,
    )
}

fn latency_command(config: &AppConfig, args: LatencyArgs) -> Result<()> {
    let ports = config.port_set()?;
    let refs: Vec<PortRef> = args.ports.iter().map(|port| parse_port(port)).collect();
    let [first, second] = refs.as_slice() else {
        anyhow::bail!("expected two ports, got {}", refs.len());
    };
    let benchmark = LatencyBenchmark::new(
        &ports,
        [first, second],
        args.cycles,
        Duration::from_millis(args.dwell_ms),
    )
    .context("latency ports rejected")?;

    let mut transport = switch_transport(args.switch_command, args.board_address);
    let report = benchmark.run(&mut transport);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Numeric text selects a port by index, anything else by label
fn parse_port(text: &str) -> PortRef {
    match text.parse::<usize>() {
        Ok(index) => PortRef::Index(index),
        Err(_) => PortRef::from(text),
    }
}

#[derive(Serialize)]
struct Peak {
    frequency_hz: f64,
    power_db: f64,
}

#[derive(Serialize)]
struct Report {
    summary: RunSummary,
    fresh_bins: usize,
    stale_bins: usize,
    empty_bins: usize,
    peaks: Vec<Peak>,
    telemetry: TelemetrySnapshot,
}

fn print_report(
    summary: &RunSummary,
    spectrum: &WidebandSpectrum,
    telemetry: TelemetrySnapshot,
    peak_count: usize,
) -> Result<()> {
    let db = spectrum.power_db();
    let separation = (spectrum.len() / 200).max(1);
    let peaks = find_peaks(&db, peak_count, separation)
        .into_iter()
        .map(|index| Peak {
            frequency_hz: spectrum.bins()[index].frequency_hz,
            power_db: db[index],
        })
        .collect();
    let (fresh_bins, stale_bins, empty_bins) = spectrum.freshness_counts();

    let report = Report {
        summary: *summary,
        fresh_bins,
        stale_bins,
        empty_bins,
        peaks,
        telemetry,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
