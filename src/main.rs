//! Keystroke Harness - command-line front end
//!
//! `fuzz` runs a long randomized campaign, `suite` runs the scripted
//! assertion table and `encode` prints a single encoding offline.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{info, warn};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use keystroke_harness::{
    campaign::{CampaignSettings, CampaignState, CancelFlag, FuzzCampaign, StopCondition},
    config::Config,
    error::HarnessError,
    keys::{build_strategy, find_key, KeystrokeEncoder, KeystrokeGenerator, ModifierSet, StrategyKind},
    report::{FailureLog, RunInfo, RunReport},
    stats::RunStatistics,
    suite::{AssertionSuite, SuiteSettings, SuiteSummary},
    transport::{self, Transport},
    utils::{as_millis_f64, format_hms},
    verify::TransactionVerifier,
};

#[cfg(unix)]
use keystroke_harness::transport::TtyTransport;

/// Window after the reset wait in which startup lines are collected
const STARTUP_DRAIN: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(
    name = "keystroke-harness",
    version,
    about = "Fuzz and assertion testing for serial keystroke-to-scancode converters"
)]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send randomized keystrokes for a duration and/or count
    Fuzz(FuzzArgs),
    /// Run the scripted pass/fail assertion suite
    Suite(SuiteArgs),
    /// Print the bytes for one key and modifier combination
    Encode(EncodeArgs),
}

#[derive(Args)]
struct FuzzArgs {
    /// Serial port (e.g. /dev/ttyACM0)
    port: String,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Stop after this many inputs
    #[arg(long, value_name = "N")]
    count: Option<u64>,

    #[arg(short, long)]
    baudrate: Option<u32>,

    /// Response timeout in seconds
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Fixed pause between inputs
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Pause after each write before polling for a response
    #[arg(long, value_name = "MS")]
    settle_ms: Option<u64>,

    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Seed for a reproducible input sequence
    #[arg(long)]
    seed: Option<u64>,

    /// Write the run report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Write the full failure log as JSON
    #[arg(long, value_name = "FILE")]
    failures: Option<PathBuf>,
}

#[derive(Args)]
struct SuiteArgs {
    /// Serial port (e.g. /dev/ttyACM0)
    port: String,

    #[arg(short, long)]
    baudrate: Option<u32>,

    /// Quiet period in seconds that ends a response
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<f64>,
}

#[derive(Args)]
struct EncodeArgs {
    /// Key name, e.g. a, F5, Up, PageDown, Escape
    key: String,

    #[arg(long)]
    shift: bool,

    #[arg(long)]
    ctrl: bool,

    #[arg(long)]
    alt: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Fuzz(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_fuzz(args, config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Suite(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_suite(args, config)
        }
        Command::Encode(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_encode(args, &config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Config::load().unwrap_or_else(|e| {
            warn!("Using default configuration: {}", e);
            Config::default()
        })),
    }
}

fn seconds(value: f64, flag: &str) -> Result<Duration, HarnessError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(HarnessError::Usage(format!("{} must be a positive number of seconds", flag)));
    }
    Ok(Duration::from_secs_f64(value))
}

#[cfg(unix)]
fn open_transport(port: &str, baud_rate: u32) -> Result<Box<dyn Transport>> {
    println!("Connecting to {} at {} baud...", port, baud_rate);
    let tty = TtyTransport::open(port, baud_rate).with_context(|| format!("failed to open {}", port))?;
    Ok(Box::new(tty))
}

#[cfg(not(unix))]
fn open_transport(port: &str, _baud_rate: u32) -> Result<Box<dyn Transport>> {
    bail!("serial port {} cannot be opened: only unix hosts are supported", port)
}

fn install_interrupt_handler(cancel: &CancelFlag) -> Result<()> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || cancel.cancel()).context("failed to install Ctrl-C handler")
}

fn run_fuzz(args: FuzzArgs, mut config: Config) -> Result<()> {
    // Bounds are checked before the port is touched
    let stop = StopCondition::new(args.duration.map(Duration::from_secs), args.count)?;

    if let Some(rate) = args.baudrate {
        config.transport.baud_rate = rate;
    }
    if let Some(timeout) = args.timeout {
        config.verify.timeout_ms = seconds(timeout, "--timeout")?.as_millis() as u64;
    }
    if let Some(delay) = args.delay_ms {
        config.campaign.delay_ms = delay;
    }
    if let Some(settle) = args.settle_ms {
        config.verify.settle_ms = settle;
    }
    if let Some(strategy) = args.strategy {
        config.campaign.strategy = strategy;
    }
    if args.seed.is_some() {
        config.campaign.seed = args.seed;
    }
    config.validate()?;

    let encoder = KeystrokeEncoder::new(config.modifiers);
    let strategy = build_strategy(
        config.campaign.strategy,
        &config.weights,
        config.campaign.malformed_share,
    )?;
    let generator = KeystrokeGenerator::new(encoder, strategy, config.campaign.seed);
    let strategy_name = generator.strategy_name();
    let verifier = TransactionVerifier::new(config.verifier_settings());

    let mut settings = CampaignSettings::new(stop);
    settings.delay = config.delay();
    settings.jitter = config.jitter();
    settings.progress_every = config.campaign.progress_every;

    let cancel = CancelFlag::new();
    install_interrupt_handler(&cancel)?;

    let mut link = open_transport(&args.port, config.transport.baud_rate)?;
    transport::connect(&mut link, config.reset_wait(), STARTUP_DRAIN).context("device did not come up")?;
    println!("Connected!");

    let rule = "=".repeat(70);
    println!("\n{}\nKeystroke Fuzz Testing\n{}", rule, rule);
    if let Some(d) = args.duration {
        println!("Duration: {} seconds ({:.1} hours)", d, d as f64 / 3600.0);
    }
    if let Some(n) = args.count {
        println!("Target count: {} inputs", n);
    }
    println!("Strategy: {}", strategy_name);

    let mut campaign = FuzzCampaign::new(settings, generator, verifier)
        .with_cancel_flag(cancel)
        .on_progress(print_progress);
    let seed = campaign.seed();
    println!("Seed: {}\n\nStarting fuzz testing...\n", seed);

    let mut stats = RunStatistics::new();
    let state = campaign.execute(&mut link, &mut stats);

    match state {
        CampaignState::Interrupted => println!("\n\nFuzz testing interrupted by user."),
        _ => println!("\n\nFuzz testing complete!"),
    }

    let info = RunInfo {
        strategy: strategy_name.to_string(),
        seed,
        final_state: state,
    };
    let report = RunReport::new(&stats, &info, config.report.recent_failures);
    print!("{}", report.to_text());

    if let Some(path) = &args.report {
        report.export_json(path).map_err(|source| HarnessError::Report {
            path: path.display().to_string(),
            source,
        })?;
        println!("\nReport saved to: {}", path.display());
    }
    if let Some(path) = &args.failures {
        FailureLog::new(&stats)
            .export_json(path)
            .map_err(|source| HarnessError::Report {
                path: path.display().to_string(),
                source,
            })?;
        println!("Failures saved to: {}", path.display());
    }

    Ok(())
}

fn print_progress(stats: &RunStatistics) {
    print!(
        "\rElapsed: {} | Inputs: {} | Success: {:.1}% | Throughput: {:.1}/s | Avg Response: {:.1}ms | Failures: {}",
        format_hms(stats.elapsed()),
        stats.total(),
        stats.success_rate(),
        stats.throughput(),
        as_millis_f64(stats.average_response_time()),
        stats.failures()
    );
    let _ = io::stdout().flush();
}

fn run_suite(args: SuiteArgs, mut config: Config) -> Result<ExitCode> {
    if let Some(rate) = args.baudrate {
        config.transport.baud_rate = rate;
    }
    if let Some(timeout) = args.timeout {
        config.suite.idle_timeout_ms = seconds(timeout, "--timeout")?.as_millis() as u64;
    }

    let suite = AssertionSuite::builtin(SuiteSettings {
        banner: config.suite.banner.clone(),
        idle_timeout: Duration::from_millis(config.suite.idle_timeout_ms),
        char_gap: Duration::from_millis(config.suite.char_gap_ms),
    });

    let cancel = CancelFlag::new();
    install_interrupt_handler(&cancel)?;

    let mut link = open_transport(&args.port, config.transport.baud_rate)?;
    let startup = transport::connect(&mut link, config.reset_wait(), STARTUP_DRAIN)
        .context("device did not come up")?;
    for line in &startup {
        println!("  Device: {}", line);
    }
    if let Err(e) = suite.handshake(&startup) {
        println!("Failed to connect to device: {}", e);
        close_quietly(&mut link);
        return Ok(ExitCode::FAILURE);
    }

    let rule = "=".repeat(60);
    println!("{}\nHARDWARE-IN-THE-LOOP TEST SUITE\n{}\n", rule, rule);
    let summary = suite.run(&mut link, &cancel);
    close_quietly(&mut link);

    print_suite_results(&summary);
    if summary.interrupted {
        println!("\nTest interrupted by user");
    }

    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn close_quietly<T: Transport + ?Sized>(link: &mut T) {
    if let Err(e) = link.close() {
        warn!("Failed to close transport: {}", e);
    }
}

fn print_suite_results(summary: &SuiteSummary) {
    let mut section = "";
    for (i, result) in summary.results.iter().enumerate() {
        if result.section != section {
            section = result.section;
            println!("--- {} ---\n", section);
        }
        println!("Test {}: {}", i + 1, result.name);
        if result.passed {
            println!("  PASS");
        } else {
            println!("  FAIL");
            println!("  Expected output containing: {:?}", result.expected);
            if let Some(fault) = &result.fault {
                println!("  Transport error: {}", fault);
            }
            println!("  Actual output:");
        }
        for line in &result.actual {
            println!("    {}", line);
        }
        println!();
    }

    let rule = "=".repeat(60);
    println!("{}", rule);
    println!("Test Summary: {} tests", summary.total());
    println!("  Passed: {}", summary.passed());
    println!("  Failed: {}", summary.failed());
    println!("  Success rate: {:.1}%", summary.success_rate());
    println!("{}", rule);
}

fn run_encode(args: EncodeArgs, config: &Config) -> Result<()> {
    let Some(key) = find_key(&args.key) else {
        bail!("unknown key '{}'", args.key);
    };
    let mods = ModifierSet {
        shift: args.shift,
        ctrl: args.ctrl,
        alt: args.alt,
    };
    let input = KeystrokeEncoder::new(config.modifiers).encode(key, mods);
    info!("Encoded {} as {} bytes", input.description, input.bytes.len());

    println!("description: {}", input.description);
    println!("category:    {}", input.category);
    println!("hex:         {}", input.hex());
    println!("bytes:       {:?}", input.bytes);
    Ok(())
}
