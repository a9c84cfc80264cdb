//! Save and restore with BLAKE3 hashing.
//!
//! A [`SaveData`] holds everything the next tick depends on: kernel truth and
//! perception, the kernel config, the random stream's internal state, the
//! cycle pool, and the recent event log. Its `hash` is a BLAKE3 digest of
//! that content, checked on restore.
//!
//! # Usage
//!
//! ```
//! use paranoia_engine::prelude::*;
//!
//! let mut engine = Engine::new(3, EngineConfig::default()).unwrap();
//! engine.run_ticks(10);
//!
//! let save = engine.capture_save().unwrap();
//! assert_eq!(save.kernel.truth.tick, 10);
//! assert_eq!(save.hash.len(), 64);
//!
//! engine.run_ticks(10);
//! engine.restore_save(&save).unwrap();
//! assert_eq!(engine.tick_count(), 10);
//! ```
//!
//! # What Is NOT Saved
//!
//! - The command queue. Restoring clears it.
//! - Diagnostics, which are per-tick and transient.
//! - The engine config. Pool limits and the log cap come from the engine
//!   doing the restore.

use std::collections::VecDeque;

use paranoia_kernel::config::KernelConfig;
use paranoia_kernel::event::SimEvent;
use paranoia_kernel::kernel::{Kernel, KernelState};
use paranoia_kernel::rng::SimRng;
use serde::{Deserialize, Serialize};

use crate::engine::{CyclePool, Engine};

/// Bumped whenever the saved shape changes.
pub const SAVE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// SaveData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    pub version: u32,
    pub kernel: KernelState,
    pub kernel_config: KernelConfig,
    pub rng: SimRng,
    pub cycles: CyclePool,
    pub event_log: Vec<SimEvent>,
    /// BLAKE3 hex digest (64 lowercase hex chars) of everything above.
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Hashing helpers
// ---------------------------------------------------------------------------

fn compute_hash(
    version: u32,
    kernel: &KernelState,
    kernel_config: &KernelConfig,
    rng: &SimRng,
    cycles: &CyclePool,
    event_log: &[SimEvent],
) -> anyhow::Result<String> {
    #[derive(Serialize)]
    struct HashableState<'a> {
        version: u32,
        kernel: &'a KernelState,
        kernel_config: &'a KernelConfig,
        rng: &'a SimRng,
        cycles: &'a CyclePool,
        event_log: &'a [SimEvent],
    }

    let hashable = HashableState {
        version,
        kernel,
        kernel_config,
        rng,
        cycles,
        event_log,
    };
    let json_bytes = serde_json::to_vec(&hashable)?;
    Ok(blake3::hash(&json_bytes).to_hex().to_string())
}

// ---------------------------------------------------------------------------
// Engine save/restore methods
// ---------------------------------------------------------------------------

impl Engine {
    /// Capture the full simulation state.
    pub fn capture_save(&self) -> anyhow::Result<SaveData> {
        let kernel = self.kernel().state().clone();
        let kernel_config = self.kernel().config().clone();
        let rng = self.kernel().rng().clone();
        let cycles = self.cycles();
        let event_log: Vec<SimEvent> = self.event_log().iter().cloned().collect();
        let hash = compute_hash(SAVE_VERSION, &kernel, &kernel_config, &rng, &cycles, &event_log)?;
        Ok(SaveData {
            version: SAVE_VERSION,
            kernel,
            kernel_config,
            rng,
            cycles,
            event_log,
            hash,
        })
    }

    /// Restore from `save`.
    ///
    /// The version, the hash, and the kernel config are all checked before
    /// anything is touched; on error the engine is unchanged.
    pub fn restore_save(&mut self, save: &SaveData) -> anyhow::Result<()> {
        if save.version != SAVE_VERSION {
            anyhow::bail!(
                "save version {} is not supported (expected {SAVE_VERSION})",
                save.version
            );
        }
        let expected_hash = compute_hash(
            save.version,
            &save.kernel,
            &save.kernel_config,
            &save.rng,
            &save.cycles,
            &save.event_log,
        )?;
        if expected_hash != save.hash {
            anyhow::bail!(
                "save hash mismatch: recorded {} but recomputed {expected_hash}. \
                 The save may be corrupted or tampered with.",
                save.hash
            );
        }

        let kernel = Kernel::from_parts(save.kernel.clone(), save.kernel_config.clone(), save.rng.clone())
            .map_err(|e| anyhow::anyhow!("failed to rebuild kernel from save: {e}"))?;
        let cycles = CyclePool::new(save.cycles.current(), self.config().cycles_max);
        let cap = self.config().event_log_cap;
        let skip = save.event_log.len().saturating_sub(cap);
        let event_log: VecDeque<SimEvent> = save.event_log.iter().skip(skip).cloned().collect();

        self.restore_parts(kernel, cycles, event_log);
        Ok(())
    }

    /// BLAKE3 digest of the current state, as [`SaveData::hash`] would hold it.
    pub fn state_hash(&self) -> anyhow::Result<String> {
        let event_log: Vec<SimEvent> = self.event_log().iter().cloned().collect();
        compute_hash(
            SAVE_VERSION,
            self.kernel().state(),
            self.kernel().config(),
            self.kernel().rng(),
            &self.cycles(),
            &event_log,
        )
    }

    /// Capture a branch point. Same as [`capture_save`](Self::capture_save).
    pub fn fork_save(&self) -> anyhow::Result<SaveData> {
        self.capture_save()
    }
}

/// Build a fresh engine straight from a save.
pub fn engine_from_save(save: &SaveData, config: crate::engine::EngineConfig) -> anyhow::Result<Engine> {
    let mut engine = Engine::new(0, config)?;
    engine.restore_save(save)?;
    Ok(engine)
}
