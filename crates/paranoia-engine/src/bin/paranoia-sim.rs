//! Headless Paranoia run.
//!
//! Usage:
//!   paranoia-sim --seed 7 --ticks 720 < script.txt
//!   paranoia-sim --config tuning.json --json < script.txt
//!   paranoia-sim --record run.json < script.txt
//!
//! The script holds one textual command per line (`suppress thermal 30`,
//! `order engineer move core`, `verify`, ...). Commands queue up until a
//! `wait N` line (or `tick`) advances the clock; blank lines and `#` comments
//! are skipped. After the script ends the run continues without commands
//! until `--ticks` have passed or an ending is reached.
//!
//! Exit status: 0 when the station survives or the tick budget runs out,
//! 2 for any other ending.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use paranoia_engine::engine::TickReport;
use paranoia_engine::logging;
use paranoia_engine::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "paranoia-sim", about = "Run the Paranoia station simulation headless")]
struct Args {
    /// Random seed.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Tick budget for the whole run.
    #[arg(long, default_value_t = 720)]
    ticks: u64,

    /// Engine config as JSON (partial documents fill in from the defaults).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print headlines as JSON lines instead of text.
    #[arg(long)]
    json: bool,

    /// Write a replay log (JSON) of the run to this file.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "warn")]
    log: String,
}

/// One parsed script line.
enum Step {
    Queue(Command),
    Wait(u64),
}

fn parse_line(line: &str) -> anyhow::Result<Option<Step>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    match words.next().map(str::to_ascii_lowercase).as_deref() {
        Some("tick") => Ok(Some(Step::Wait(1))),
        Some("wait") => {
            let n = match words.next() {
                Some(raw) => raw.parse().with_context(|| format!("bad wait count in '{line}'"))?,
                None => 1,
            };
            Ok(Some(Step::Wait(n)))
        }
        _ => Ok(Some(Step::Queue(Command::parse(line)?))),
    }
}

fn print_report(report: &TickReport, json: bool) -> anyhow::Result<()> {
    for rejection in &report.rejected {
        eprintln!(
            "[{:>5}] rejected {}: need {} cycles, have {}",
            report.tick,
            rejection.command.name(),
            rejection.needed,
            rejection.available
        );
    }
    for headline in &report.headlines {
        if json {
            println!("{}", serde_json::to_string(headline)?);
        } else {
            println!("[{:>5}] {:<8} {}", headline.tick, format!("{:?}", headline.hint), headline.text);
        }
    }
    Ok(())
}

/// The engine plus the bits of run state the script loop needs.
struct Runner {
    engine: Engine,
    /// Commands queued since the last tick, for the replay recorder.
    pending: Vec<Command>,
    recorder: Option<ReplayRecorder>,
    tick_budget: u64,
    json: bool,
}

impl Runner {
    fn queue(&mut self, cmd: Command) {
        self.pending.push(cmd.clone());
        self.engine.queue(cmd);
    }

    fn advance(&mut self, n: u64) -> anyhow::Result<()> {
        for _ in 0..n {
            if self.engine.ending().is_some() || self.engine.tick_count() >= self.tick_budget {
                break;
            }
            let commands = std::mem::take(&mut self.pending);
            if let Some(recorder) = &mut self.recorder {
                let hash = self.engine.state_hash()?;
                recorder.record_tick(self.engine.tick_count(), &commands, Some(hash))?;
            }
            let report = self.engine.tick();
            print_report(&report, self.json)?;
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    logging::init(&args.log);

    let config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            EngineConfig::from_json(&raw)?
        }
        None => EngineConfig::default(),
    }
    .with_process_env()?;

    let engine = Engine::new(args.seed, config)?;
    let recorder = match &args.record {
        Some(_) => Some(ReplayRecorder::new(
            engine.capture_save()?,
            engine.config().checkpoint_interval,
        )),
        None => None,
    };
    let mut runner = Runner {
        engine,
        pending: Vec::new(),
        recorder,
        tick_budget: args.ticks,
        json: args.json,
    };

    for (lineno, line) in io::stdin().lock().lines().enumerate() {
        let line = line.context("failed to read script")?;
        match parse_line(&line).with_context(|| format!("script line {}", lineno + 1))? {
            Some(Step::Queue(cmd)) => runner.queue(cmd),
            Some(Step::Wait(n)) => runner.advance(n)?,
            None => {}
        }
    }
    let remaining = args.ticks.saturating_sub(runner.engine.tick_count());
    runner.advance(remaining)?;

    if let (Some(path), Some(recorder)) = (&args.record, runner.recorder.take()) {
        let log = recorder.finish();
        std::fs::write(path, serde_json::to_vec(&log)?)
            .with_context(|| format!("failed to write replay log {}", path.display()))?;
    }

    let engine = &runner.engine;
    let suspicion = engine.kernel().suspicion();
    match engine.ending() {
        Some(ending) => {
            println!("ending: {ending:?} at tick {} (suspicion {suspicion:.1})", engine.tick_count());
            Ok(if ending == Ending::Survived {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        None => {
            println!("no ending after {} ticks (suspicion {suspicion:.1})", engine.tick_count());
            Ok(ExitCode::SUCCESS)
        }
    }
}
