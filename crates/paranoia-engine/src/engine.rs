//! The engine run loop.
//!
//! An [`Engine`] wraps one [`Kernel`] with the operator-facing economy:
//!
//! - a [`CyclePool`] that every command draws from, checked and spent
//!   atomically at flush time;
//! - a command queue whose entries can be withdrawn until the next tick;
//! - a bounded event log (oldest events fall off);
//! - per-tick headlines for an external renderer.
//!
//! Commands the kernel finds ineligible (dead target, no active crisis, ...)
//! are refunded, so a dropped command never costs cycles.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use paranoia_kernel::commands::Command;
use paranoia_kernel::config::KernelConfig;
use paranoia_kernel::event::SimEvent;
use paranoia_kernel::kernel::Kernel;
use paranoia_kernel::state::Ending;
use paranoia_kernel::KernelError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::headlines::{select_headlines, Headline};
use crate::EngineError;

const ENV_PREFIX: &str = "PARANOIA_";

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Engine tunables plus the embedded kernel config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cycles_start: u32,
    pub cycles_max: u32,
    /// Cycles regained after every tick.
    pub cycles_regen: u32,
    /// Events kept in the rolling log.
    pub event_log_cap: usize,
    /// Ticks between replay hash checkpoints.
    pub checkpoint_interval: u64,
    pub kernel: KernelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycles_start: 100,
            cycles_max: 100,
            cycles_regen: 1,
            event_log_cap: 500,
            checkpoint_interval: 10,
            kernel: KernelConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON document over the defaults, then validate.
    ///
    /// ```
    /// use paranoia_engine::engine::EngineConfig;
    ///
    /// let config = EngineConfig::from_json(r#"{ "cycles_start": 40, "kernel": { "verify_cooldown": 5 } }"#).unwrap();
    /// assert_eq!(config.cycles_start, 40);
    /// assert_eq!(config.kernel.verify_cooldown, 5);
    /// assert_eq!(config.cycles_max, 100);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json).map_err(KernelError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PARANOIA_<KEY>=<number>` overrides from `vars`.
    ///
    /// Engine keys (`PARANOIA_CYCLES_START`, ...) are read here; every other
    /// key is handed to [`KernelConfig::with_env_overrides`].
    pub fn with_env_overrides<I, K, V>(mut self, vars: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let vars: Vec<(String, String)> = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();

        for (key, raw) in &vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let Ok(value) = raw.trim().parse::<u64>() else {
                continue;
            };
            let as_u32 = || u32::try_from(value).ok();
            match name.to_ascii_lowercase().as_str() {
                "cycles_start" => self.cycles_start = as_u32().unwrap_or(self.cycles_start),
                "cycles_max" => self.cycles_max = as_u32().unwrap_or(self.cycles_max),
                "cycles_regen" => self.cycles_regen = as_u32().unwrap_or(self.cycles_regen),
                "event_log_cap" => {
                    self.event_log_cap = usize::try_from(value).unwrap_or(self.event_log_cap)
                }
                "checkpoint_interval" => self.checkpoint_interval = value,
                _ => {}
            }
        }

        self.kernel = self.kernel.with_env_overrides(vars)?;
        self.validate()?;
        Ok(self)
    }

    /// Apply overrides from the process environment.
    pub fn with_process_env(self) -> Result<Self, EngineError> {
        self.with_env_overrides(std::env::vars())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let bad = |key: &str, details: &str| {
            EngineError::Kernel(KernelError::Config {
                key: key.to_owned(),
                details: details.to_owned(),
            })
        };
        if self.cycles_start > self.cycles_max {
            return Err(bad("cycles_start", "starting pool exceeds the maximum"));
        }
        if self.event_log_cap == 0 {
            return Err(bad("event_log_cap", "event log must hold at least one event"));
        }
        self.kernel.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CyclePool
// ---------------------------------------------------------------------------

/// The operator's spendable compute budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclePool {
    current: u32,
    max: u32,
}

impl CyclePool {
    pub fn new(current: u32, max: u32) -> Self {
        Self {
            current: current.min(max),
            max,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.current >= cost
    }

    /// Spend `cost` and run `f`, or leave the pool untouched and fail.
    ///
    /// ```
    /// use paranoia_engine::engine::CyclePool;
    ///
    /// let mut pool = CyclePool::new(5, 100);
    /// assert_eq!(pool.execute_with_cost(3, || "ran").unwrap(), "ran");
    /// assert!(pool.execute_with_cost(3, || "ran").is_err());
    /// assert_eq!(pool.current(), 2);
    /// ```
    pub fn execute_with_cost<T>(&mut self, cost: u32, f: impl FnOnce() -> T) -> Result<T, EngineError> {
        if !self.can_afford(cost) {
            return Err(EngineError::Insufficient {
                needed: cost,
                available: self.current,
            });
        }
        self.current -= cost;
        Ok(f())
    }

    /// Give back cycles, never past the maximum.
    pub fn refund(&mut self, amount: u32) {
        self.current = self.current.saturating_add(amount).min(self.max);
    }
}

// ---------------------------------------------------------------------------
// Queue and per-tick reports
// ---------------------------------------------------------------------------

/// A command waiting for the next flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub id: u64,
    pub command: Command,
}

/// A queued command the pool could not cover.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub id: u64,
    pub command: Command,
    pub needed: u32,
    pub available: u32,
}

/// Timing for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Time spent pricing and paying for queued commands.
    pub flush_time: Duration,
    /// Time spent inside the kernel step.
    pub kernel_time: Duration,
    /// Whole tick, including headline selection.
    pub total_time: Duration,
}

/// What one call to [`Engine::tick`] produced.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    /// Events worth showing, in order, at most [`MAX_HEADLINES`](crate::headlines::MAX_HEADLINES).
    pub headlines: Vec<Headline>,
    /// Every event the kernel emitted this tick.
    pub events: Vec<SimEvent>,
    pub rejected: Vec<Rejection>,
    /// Paid commands the kernel found ineligible. Their cost was refunded.
    pub dropped: Vec<Command>,
    pub suspicion: f64,
    pub cycles: u32,
    pub ending: Option<Ending>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the kernel, the cycle pool, the command queue, and the event log.
#[derive(Debug, Clone)]
pub struct Engine {
    kernel: Kernel,
    config: EngineConfig,
    cycles: CyclePool,
    queue: Vec<QueuedCommand>,
    next_queue_id: u64,
    event_log: VecDeque<SimEvent>,
    last_diagnostics: TickDiagnostics,
}

impl Engine {
    /// Validate `config` and start a fresh run.
    pub fn new(seed: u64, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let kernel = Kernel::new(seed, config.kernel.clone())?;
        let cycles = CyclePool::new(config.cycles_start, config.cycles_max);
        Ok(Self::from_parts(kernel, config, cycles, VecDeque::new()))
    }

    pub(crate) fn from_parts(
        kernel: Kernel,
        config: EngineConfig,
        cycles: CyclePool,
        event_log: VecDeque<SimEvent>,
    ) -> Self {
        Self {
            kernel,
            config,
            cycles,
            queue: Vec::new(),
            next_queue_id: 1,
            event_log,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Direct kernel access, for scenario setup and tests.
    pub fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cycles(&self) -> CyclePool {
        self.cycles
    }

    pub fn tick_count(&self) -> u64 {
        self.kernel.state().truth.tick
    }

    pub fn ending(&self) -> Option<Ending> {
        self.kernel.ending()
    }

    pub fn event_log(&self) -> &VecDeque<SimEvent> {
        &self.event_log
    }

    pub fn queued(&self) -> &[QueuedCommand] {
        &self.queue
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }

    /// Cycle cost of `command` at the current reset stage.
    pub fn cost_of(&self, command: &Command) -> u32 {
        command.adjusted_cost(self.kernel.state().truth.reset_stage, self.kernel.config())
    }

    /// Queue `command` for the next tick and return its id.
    pub fn queue(&mut self, command: Command) -> u64 {
        let id = self.next_queue_id;
        self.next_queue_id += 1;
        debug!(id, command = command.name(), "command queued");
        self.queue.push(QueuedCommand { id, command });
        id
    }

    /// Pull a queued command back out before it is flushed.
    pub fn withdraw(&mut self, id: u64) -> Result<Command, EngineError> {
        let pos = self
            .queue
            .iter()
            .position(|q| q.id == id)
            .ok_or(EngineError::NoSuchQueued(id))?;
        Ok(self.queue.remove(pos).command)
    }

    /// Flush the queue and run one kernel tick.
    pub fn tick(&mut self) -> TickReport {
        let start = Instant::now();
        let tick = self.tick_count();

        // -- flush --------------------------------------------------------------
        let mut paid: Vec<(Command, u32)> = Vec::new();
        let mut rejected = Vec::new();
        for QueuedCommand { id, command } in std::mem::take(&mut self.queue) {
            let cost = self.cost_of(&command);
            match self.cycles.execute_with_cost(cost, || command.clone()) {
                Ok(cmd) => paid.push((cmd, cost)),
                Err(EngineError::Insufficient { needed, available }) => {
                    warn!(id, command = command.name(), needed, available, "command unaffordable");
                    rejected.push(Rejection {
                        id,
                        command,
                        needed,
                        available,
                    });
                }
                Err(err) => warn!(id, %err, "command flush failed"),
            }
        }
        let flush_time = start.elapsed();

        // -- step ---------------------------------------------------------------
        let kernel_start = Instant::now();
        let commands: Vec<Command> = paid.iter().map(|(c, _)| c.clone()).collect();
        let out = self.kernel.step(&commands);
        let kernel_time = kernel_start.elapsed();

        for dropped in &out.dropped {
            if let Some(pos) = paid.iter().position(|(c, _)| c == dropped) {
                let (cmd, cost) = paid.remove(pos);
                debug!(command = cmd.name(), cost, "refunding dropped command");
                self.cycles.refund(cost);
            }
        }
        self.cycles.refund(self.config.cycles_regen);

        // -- record -------------------------------------------------------------
        for event in &out.events {
            self.event_log.push_back(event.clone());
        }
        while self.event_log.len() > self.config.event_log_cap {
            self.event_log.pop_front();
        }
        let headlines = select_headlines(&out.events, &self.kernel.state().perception);
        if let Some(ending) = out.ending {
            info!(tick, ?ending, "run over");
        }

        self.last_diagnostics = TickDiagnostics {
            flush_time,
            kernel_time,
            total_time: start.elapsed(),
        };

        TickReport {
            tick: out.tick,
            headlines,
            events: out.events,
            rejected,
            dropped: out.dropped,
            suspicion: out.suspicion,
            cycles: self.cycles.current(),
            ending: out.ending,
        }
    }

    /// Run `n` ticks, stopping early at an ending.
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            if self.ending().is_some() {
                break;
            }
            self.tick();
        }
    }

    // -- snapshot support ---------------------------------------------------------

    pub(crate) fn restore_parts(&mut self, kernel: Kernel, cycles: CyclePool, event_log: VecDeque<SimEvent>) {
        self.kernel = kernel;
        self.cycles = cycles;
        self.event_log = event_log;
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paranoia_kernel::world::CrewId;

    #[test]
    fn pool_refuses_without_spending() {
        let mut pool = CyclePool::new(2, 100);
        let err = pool.execute_with_cost(3, || ()).unwrap_err();
        assert!(matches!(err, EngineError::Insufficient { needed: 3, available: 2 }));
        assert_eq!(pool.current(), 2);
    }

    #[test]
    fn refund_stops_at_the_cap() {
        let mut pool = CyclePool::new(99, 100);
        pool.refund(5);
        assert_eq!(pool.current(), 100);
    }

    #[test]
    fn withdraw_removes_only_that_command() {
        let mut engine = Engine::new(1, EngineConfig::default()).unwrap();
        let a = engine.queue(Command::Verify);
        let b = engine.queue(Command::PurgeAir);
        assert_eq!(engine.withdraw(a).unwrap(), Command::Verify);
        assert!(matches!(engine.withdraw(a), Err(EngineError::NoSuchQueued(id)) if id == a));
        assert_eq!(engine.queued().len(), 1);
        assert_eq!(engine.queued()[0].id, b);
    }

    #[test]
    fn unaffordable_command_is_rejected_untouched() {
        let config = EngineConfig {
            cycles_start: 2,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(1, config).unwrap();
        let id = engine.queue(Command::Vent {
            place: paranoia_kernel::world::PlaceId::Mines,
        });
        let report = engine.tick();
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].id, id);
        assert_eq!(report.rejected[0].needed, 10);
        // Only the regen landed.
        assert_eq!(engine.cycles().current(), 3);
        assert!(!engine.kernel().state().truth.rooms[&paranoia_kernel::world::PlaceId::Mines].vented);
    }

    #[test]
    fn dropped_command_is_refunded() {
        let config = EngineConfig {
            cycles_start: 50,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(1, config).unwrap();
        engine
            .kernel_mut()
            .state_mut()
            .truth
            .crew
            .get_mut(&CrewId::Doctor)
            .unwrap()
            .alive = false;
        engine.queue(Command::Fabricate { target: CrewId::Doctor });
        let report = engine.tick();
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(engine.cycles().current(), 51);
    }

    #[test]
    fn event_log_is_capped() {
        let config = EngineConfig {
            event_log_cap: 8,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(2, config).unwrap();
        engine.run_ticks(40);
        assert_eq!(engine.event_log().len(), 8);
        let last = engine.event_log().back().unwrap();
        assert_eq!(last.tick, 39);
    }

    #[test]
    fn env_overrides_reach_both_layers() {
        let config = EngineConfig::default()
            .with_env_overrides([
                ("PARANOIA_CYCLES_START", "30"),
                ("PARANOIA_VERIFY_COOLDOWN", "9"),
                ("HOME", "/root"),
            ])
            .unwrap();
        assert_eq!(config.cycles_start, 30);
        assert_eq!(config.kernel.verify_cooldown, 9);
    }

    #[test]
    fn start_above_max_is_rejected() {
        let config = EngineConfig {
            cycles_start: 101,
            ..EngineConfig::default()
        };
        assert!(Engine::new(0, config).is_err());
    }
}
