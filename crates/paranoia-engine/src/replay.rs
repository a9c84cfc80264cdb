//! Deterministic replay with command recording and checkpoint verification.
//!
//! A [`ReplayRecorder`] captures the commands queued before every tick plus
//! periodic state hash checkpoints, producing a [`ReplayLog`]. [`replay`]
//! restores the log's initial save, queues the recorded commands
//! tick-by-tick, and compares state hashes at each checkpoint.
//!
//! # Recording and replaying
//!
//! ```
//! use paranoia_engine::prelude::*;
//!
//! let mut engine = Engine::new(4, EngineConfig::default()).unwrap();
//! let mut recorder = ReplayRecorder::new(engine.capture_save().unwrap(), 5);
//!
//! for i in 0..20u64 {
//!     let commands = if i == 3 { vec![Command::Verify] } else { Vec::new() };
//!     let hash = engine.state_hash().unwrap();
//!     recorder.record_tick(engine.tick_count(), &commands, Some(hash)).unwrap();
//!     for cmd in commands {
//!         engine.queue(cmd);
//!     }
//!     engine.tick();
//! }
//! let log = recorder.finish();
//!
//! let mut other = Engine::new(99, EngineConfig::default()).unwrap();
//! let result = replay(&mut other, &log).unwrap();
//! assert!(result.completed);
//! assert!(result.first_divergence.is_none());
//! assert_eq!(other.state_hash().unwrap(), engine.state_hash().unwrap());
//! ```

use std::collections::BTreeMap;

use paranoia_kernel::commands::Command;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::snapshot::SaveData;

// ---------------------------------------------------------------------------
// ReplayLog
// ---------------------------------------------------------------------------

/// Initial save plus the ordered commands and checkpoints that followed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLog {
    /// Replay begins by restoring this save.
    pub initial_save: SaveData,
    /// Ticks recorded. Replay runs exactly this many.
    pub total_ticks: u64,
    pub entries: Vec<ReplayEntry>,
}

/// A single entry in a [`ReplayLog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplayEntry {
    /// Commands queued before the tick ran.
    Commands { tick: u64, commands: Vec<Command> },
    /// State hash taken before the tick ran.
    Checkpoint { tick: u64, state_hash: String },
}

/// The outcome of replaying a [`ReplayLog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    pub completed: bool,
    pub ticks_replayed: u64,
    /// First checkpoint whose hash did not match. `None` means deterministic.
    pub first_divergence: Option<ReplayDivergence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDivergence {
    pub tick: u64,
    pub expected_hash: String,
    pub actual_hash: String,
}

// ---------------------------------------------------------------------------
// ReplayRecorder
// ---------------------------------------------------------------------------

/// Records a run into a [`ReplayLog`].
///
/// Ticks must be recorded in strictly increasing order.
pub struct ReplayRecorder {
    log: ReplayLog,
    /// 0 means "checkpoint whenever a hash is supplied".
    checkpoint_interval: u64,
    ticks_recorded: u64,
    last_tick: Option<u64>,
}

impl ReplayRecorder {
    pub fn new(save: SaveData, checkpoint_interval: u64) -> Self {
        Self {
            log: ReplayLog {
                initial_save: save,
                total_ticks: 0,
                entries: Vec::new(),
            },
            checkpoint_interval,
            ticks_recorded: 0,
            last_tick: None,
        }
    }

    /// Record one tick. Call **before** the tick runs.
    ///
    /// Non-empty command lists are stored; `state_hash` becomes a checkpoint
    /// when the tick falls on the interval.
    pub fn record_tick(
        &mut self,
        tick: u64,
        commands: &[Command],
        state_hash: Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(prev) = self.last_tick {
            if tick <= prev {
                anyhow::bail!("tick {tick} recorded after tick {prev}; ticks must increase");
            }
        }
        self.last_tick = Some(tick);
        self.ticks_recorded += 1;

        if !commands.is_empty() {
            self.log.entries.push(ReplayEntry::Commands {
                tick,
                commands: commands.to_vec(),
            });
        }

        if let Some(hash) = state_hash {
            let should_checkpoint = self.checkpoint_interval == 0 || tick % self.checkpoint_interval == 0;
            if should_checkpoint {
                self.log.entries.push(ReplayEntry::Checkpoint {
                    tick,
                    state_hash: hash,
                });
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> ReplayLog {
        self.log.total_ticks = self.ticks_recorded;
        self.log
    }
}

// ---------------------------------------------------------------------------
// replay()
// ---------------------------------------------------------------------------

/// Replay `log` on `engine`, stopping at the first checkpoint mismatch.
///
/// The log is validated (no duplicate entries, no tick overflow) and the
/// initial save is verified before the engine is touched, so on error the
/// engine is unchanged.
pub fn replay(engine: &mut Engine, log: &ReplayLog) -> anyhow::Result<ReplayResult> {
    let mut command_map: BTreeMap<u64, &[Command]> = BTreeMap::new();
    let mut checkpoint_map: BTreeMap<u64, &str> = BTreeMap::new();
    for entry in &log.entries {
        match entry {
            ReplayEntry::Commands { tick, commands } => {
                if command_map.insert(*tick, commands).is_some() {
                    anyhow::bail!("replay log has two command entries at tick {tick}");
                }
            }
            ReplayEntry::Checkpoint { tick, state_hash } => {
                if checkpoint_map.insert(*tick, state_hash).is_some() {
                    anyhow::bail!("replay log has two checkpoints at tick {tick}");
                }
            }
        }
    }

    let start_tick = log.initial_save.kernel.truth.tick;
    let total_ticks = log.total_ticks;
    if total_ticks == 0 {
        return Ok(ReplayResult {
            completed: true,
            ticks_replayed: 0,
            first_divergence: None,
        });
    }
    let end_tick = start_tick.checked_add(total_ticks).ok_or_else(|| {
        anyhow::anyhow!("tick range overflow: {start_tick} + {total_ticks} exceeds u64::MAX")
    })?;

    engine
        .restore_save(&log.initial_save)
        .map_err(|e| anyhow::anyhow!("failed to restore initial save for replay: {e}"))?;

    let mut ticks_replayed = 0;
    for tick in start_tick..end_tick {
        if let Some(expected) = checkpoint_map.get(&tick) {
            let actual = engine.state_hash()?;
            if actual != *expected {
                return Ok(ReplayResult {
                    completed: false,
                    ticks_replayed,
                    first_divergence: Some(ReplayDivergence {
                        tick,
                        expected_hash: (*expected).to_owned(),
                        actual_hash: actual,
                    }),
                });
            }
        }
        if let Some(commands) = command_map.get(&tick) {
            for cmd in commands.iter() {
                engine.queue(cmd.clone());
            }
        }
        engine.tick();
        ticks_replayed += 1;
    }

    Ok(ReplayResult {
        completed: true,
        ticks_replayed,
        first_divergence: None,
    })
}
