//! Paranoia Engine -- run loop, cycle pool, save/restore, and replay around
//! the [`paranoia_kernel`] simulation.
//!
//! The kernel decides what happens on the station; the engine decides what
//! the operator can afford. It owns the spendable cycle pool, the command
//! queue (commands can be withdrawn until the next flush), a bounded event
//! log, and the headline filter that feeds an external renderer.
//!
//! # Quick Start
//!
//! ```
//! use paranoia_engine::prelude::*;
//!
//! let mut engine = Engine::new(7, EngineConfig::default()).unwrap();
//! let id = engine.queue(Command::Verify);
//! let report = engine.tick();
//!
//! assert_eq!(report.tick, 0);
//! assert!(report.rejected.iter().all(|r| r.id != id));
//! assert!(engine.cycles().current() <= engine.config().cycles_max);
//! ```

#![deny(unsafe_code)]

pub mod engine;
pub mod headlines;
pub mod logging;
pub mod replay;
pub mod snapshot;

use paranoia_kernel::KernelError;

/// Re-export the kernel crate for convenience.
pub use paranoia_kernel;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the engine wrapper.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The cycle pool cannot cover a command.
    #[error("insufficient cycles: need {needed}, have {available}")]
    Insufficient {
        /// Cost of the command at the current reset stage.
        needed: u32,
        /// Cycles in the pool.
        available: u32,
    },

    /// No queued command has this id (already flushed or withdrawn).
    #[error("no queued command with id {0}")]
    NoSuchQueued(u64),

    /// The kernel rejected its configuration or input.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use paranoia_kernel::prelude::*;

    pub use crate::engine::{
        CyclePool, Engine, EngineConfig, QueuedCommand, Rejection, TickDiagnostics, TickReport,
    };
    pub use crate::headlines::{select_headlines, Headline, RenderHint, MAX_HEADLINES};
    pub use crate::replay::{
        replay, ReplayDivergence, ReplayEntry, ReplayLog, ReplayRecorder, ReplayResult,
    };
    pub use crate::snapshot::SaveData;
    pub use crate::EngineError;
}
