//! Paranoia Kernel -- deterministic station simulation with a deception economy.
//!
//! The kernel owns the authoritative [`Truth`](state::Truth) of the station
//! (rooms, crew, threat arcs, escalation) and the crew's subjective
//! [`Perception`](state::Perception) of the station AI (beliefs, suspicion
//! ledger, tamper operations, doubts). Every mutation flows through the
//! [`ProposalBuffer`](proposal::ProposalBuffer): systems and commands propose
//! events against the start-of-tick state, and the [`Kernel`](kernel::Kernel)
//! applies them in FIFO order at the tick boundary.
//!
//! # Quick Start
//!
//! ```
//! use paranoia_kernel::prelude::*;
//!
//! let mut kernel = Kernel::new(7, KernelConfig::default()).unwrap();
//! kernel.step(&[Command::Verify]);
//! kernel.run_ticks(9);
//!
//! assert_eq!(kernel.state().truth.tick, 10);
//! let suspicion = kernel.suspicion();
//! assert!((0.0..=100.0).contains(&suspicion));
//! ```

#![deny(unsafe_code)]

pub mod apply;
pub mod commands;
pub mod config;
pub mod event;
pub mod kernel;
pub mod proposal;
pub mod rng;
pub mod state;
pub mod systems;
pub mod time;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by kernel construction, configuration, and command parsing.
///
/// Per-tick refusals (unaffordable or ineligible commands, detectors with no
/// signal) are not errors; they are logged and leave state untouched.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A configuration value failed validation.
    #[error("invalid config value for '{key}': {details}")]
    Config {
        /// The offending configuration key.
        key: String,
        /// Why the value was rejected.
        details: String,
    },

    /// A configuration document could not be parsed.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A textual command could not be parsed.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A place name did not match any room on the station.
    #[error("unknown place '{0}'")]
    UnknownPlace(String),

    /// A crew name did not match any crew member.
    #[error("unknown crew member '{0}'")]
    UnknownCrew(String),

    /// A station system name was not recognised.
    #[error("unknown station system '{0}'")]
    UnknownSystem(String),

    /// Kernel state broke a structural contract. Should never happen in
    /// normal operation.
    #[error("kernel invariant violated: {detail}")]
    InvariantViolation {
        /// Description of the violated invariant.
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::commands::{Command, OrderIntent, StationSystem};
    pub use crate::config::{ChannelMix, KernelConfig};
    pub use crate::event::{EventKind, SimEvent, StationAction, Tag};
    pub use crate::kernel::{Kernel, KernelState, StepOutput};
    pub use crate::proposal::{ApplyReport, CausalReason, Deferred, Proposal, ProposalBuffer};
    pub use crate::rng::SimRng;
    pub use crate::state::{
        Belief, CrisisKind, CrisisOp, CrisisStatus, CrewMember, Doubt, Ending, LedgerEntry,
        LedgerReason, Perception, ResetStage, Room, TamperKind, TamperOp, TamperStatus, Truth,
    };
    pub use crate::systems::beliefs::suspicion_score;
    pub use crate::time::Window;
    pub use crate::world::{CrewId, PlaceId};
    pub use crate::KernelError;
}
