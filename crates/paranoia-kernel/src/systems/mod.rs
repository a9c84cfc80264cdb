//! Kernel systems.
//!
//! Proposal systems (`crew`, `arcs`, `physics`, `pressure`) read the
//! start-of-tick state and push into the
//! [`ProposalBuffer`](crate::proposal::ProposalBuffer). Post-apply systems
//! (`beliefs`, `backfire`, `crisis`, `doubts`) run after the buffer is
//! applied and update perception directly.

pub mod arcs;
pub mod backfire;
pub mod beliefs;
pub mod crew;
pub mod crisis;
pub mod doubts;
pub mod physics;
pub mod pressure;
