use std::error::Error;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::time::Duration;

use clap::ArgAction::{Set, SetTrue};
use clap::{Parser, ValueEnum};
use tracing::{event, Level};
use tracing_subscriber::prelude::*;

use cpu::{EngineStatus, Fault, FrameBreak, Propeller};

mod pins;
mod sleep;

use pins::PinPrinter;
use sleep::MinimalSleeper;

const ABOUT: &str = "Emulator for the Propeller P1 microcontroller";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FrameBreakArg {
    None,
    Hit,
    Miss,
}

impl From<FrameBreakArg> for FrameBreak {
    fn from(arg: FrameBreakArg) -> FrameBreak {
        match arg {
            FrameBreakArg::None => FrameBreak::None,
            FrameBreakArg::Hit => FrameBreak::Hit,
            FrameBreakArg::Miss => FrameBreak::Miss,
        }
    }
}

/// Run a compiled Propeller program image
#[derive(Parser, Debug)]
#[clap(version, about=ABOUT, long_about = None)]
struct Cli {
    /// The program image (a .binary file) to load into hub RAM
    #[clap(action=Set)]
    image: OsString,

    /// A 32KB ROM image to use instead of the built-in tables
    #[clap(long, action=Set)]
    rom: Option<OsString>,

    /// Stop after this many system clocks
    #[clap(long, action=Set)]
    max_steps: Option<u64>,

    /// Run this many times faster than real-time ('MAX' for
    /// as-fast-as-possible)
    #[clap(long, action=Set, default_value = "MAX")]
    speed_multiplier: String,

    /// Stop when a video frame completes
    #[clap(long, value_enum, default_value = "none")]
    frame_break: FrameBreakArg,

    /// Print the pins each time they change
    #[clap(long, action=SetTrue)]
    show_pins: bool,
}

#[derive(Debug)]
enum Fail {
    ReadFailed(String),
    BadMultiplier(String),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Fail::ReadFailed(message) => f.write_str(message),
            Fail::BadMultiplier(s) => write!(
                f,
                "--speed-multiplier should be a positive number or MAX, not {s:?}"
            ),
        }
    }
}

impl Error for Fail {}

#[derive(Debug, PartialEq, Eq)]
enum StopReason {
    StepLimit,
    Breakpoint,
    AllCogsStopped,
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::StepLimit => "step limit reached",
            StopReason::Breakpoint => "breakpoint",
            StopReason::AllCogsStopped => "all cogs stopped",
        })
    }
}

fn read_file(name: &OsString) -> Result<Vec<u8>, Fail> {
    std::fs::read(Path::new(name))
        .map_err(|e| Fail::ReadFailed(format!("failed to read {}: {}", name.to_string_lossy(), e)))
}

fn parse_speed_multiplier(s: &str) -> Result<Option<f64>, Fail> {
    if s == "MAX" {
        event!(Level::INFO, "--speed-multiplier=MAX, running at maximum speed");
        return Ok(None);
    }
    match s.parse::<f64>() {
        Ok(x) if x > 0.0 && x.is_finite() => {
            event!(Level::INFO, "running at speed multiplier {}", x);
            Ok(Some(x))
        }
        _ => Err(Fail::BadMultiplier(s.to_string())),
    }
}

fn run(
    chip: &mut Propeller,
    max_steps: Option<u64>,
    multiplier: Option<f64>,
) -> Result<StopReason, Fault> {
    let mut sleeper = MinimalSleeper::new(Duration::from_millis(20));
    let mut steps: u64 = 0;
    loop {
        if max_steps.is_some_and(|limit| steps >= limit) {
            return Ok(StopReason::StepLimit);
        }
        let before = chip.time();
        let running = chip.step()?;
        steps += 1;
        if let Some(m) = multiplier {
            sleeper.time_passes(chip.time() - before, m);
        }
        if !running {
            return Ok(StopReason::Breakpoint);
        }
        if chip.hub().running_cogs() == 0 {
            return Ok(StopReason::AllCogsStopped);
        }
    }
}

fn print_summary(chip: &Propeller) {
    let status = chip.status();
    println!(
        "counter={} time={:.9}s clock={} ({}Hz) locks set={:#04x} free={:#04x}",
        status.counter,
        status.time,
        status.clock_mode_name,
        status.core_frequency,
        status.locks_set,
        status.locks_available
    );
    println!(
        "ina={:#010x} inb={:#010x} dir={:#018x}",
        chip.ina(),
        chip.inb(),
        status.dir_pins
    );
    for id in 0..base::prelude::COG_COUNT {
        let Some(cog) = chip.cog_status(id) else {
            continue;
        };
        let detail = match cog.detail {
            EngineStatus::Native { zero, carry } => format!("Z={} C={}", zero, carry),
            EngineStatus::Interpreted {
                object_frame,
                variable_frame,
                local_frame,
                stack_frame,
            } => format!(
                "object={object_frame:#06x} variables={variable_frame:#06x} \
                 locals={local_frame:#06x} stack={stack_frame:#06x}"
            ),
        };
        println!(
            "cog {} ({}) pc={:#06x} {}: {}",
            cog.id, cog.engine, cog.pc, cog.description, detail
        );
    }
}

fn run_simulator() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // See
    // https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Box::new(e));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let multiplier = parse_speed_multiplier(&cli.speed_multiplier)?;
    let image = read_file(&cli.image)?;
    let mut chip = match &cli.rom {
        Some(name) => Propeller::with_rom(&read_file(name)?),
        None => Propeller::new(),
    };
    chip.set_frame_break(cli.frame_break.into());
    if cli.show_pins {
        let id = chip.include_plugin(Box::new(PinPrinter::new()));
        chip.notify_on_pins(id);
    }
    chip.initialize(&image)?;

    let outcome = run(&mut chip, cli.max_steps, multiplier);
    print_summary(&chip);
    match outcome {
        Ok(reason) => {
            event!(Level::INFO, "Execution stopped: {}", reason);
            Ok(())
        }
        Err(fault) => Err(Box::new(fault)),
    }
}

fn main() {
    match run_simulator() {
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}

#[test]
fn test_parse_speed_multiplier() {
    assert_eq!(parse_speed_multiplier("MAX").ok(), Some(None));
    assert_eq!(parse_speed_multiplier("2.5").ok(), Some(Some(2.5)));
    assert!(parse_speed_multiplier("0").is_err());
    assert!(parse_speed_multiplier("-1").is_err());
    assert!(parse_speed_multiplier("fast").is_err());
}

#[test]
fn test_run_stops_at_step_limit() {
    let mut chip = Propeller::new();
    chip.initialize(&[0u8; 16]).expect("valid image");
    assert_eq!(run(&mut chip, Some(100), None), Ok(StopReason::StepLimit));
    assert_eq!(chip.counter(), 100);
}
