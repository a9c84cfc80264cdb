//! Proposal buffer with causality metadata for deferred state changes.
//!
//! The [`ProposalBuffer`] collects proposed events during a tick. Commands,
//! crew behaviour, arc stepping, and the pressure router all read the
//! start-of-tick state and push proposals here; none of them mutate state.
//! The kernel drains the buffer in deterministic FIFO order at the tick
//! boundary and applies each proposal, so no system ever observes another
//! system's same-tick write.
//!
//! A proposal may carry [`Deferred`] side effects (a suspicion nudge or a new
//! doubt). They fire only if the proposal itself applies.
//!
//! # Example
//!
//! ```
//! use paranoia_kernel::event::{EventKind, Tag};
//! use paranoia_kernel::proposal::{CausalReason, ProposalBuffer};
//!
//! let mut buf = ProposalBuffer::new();
//! buf.push(
//!     EventKind::SystemsTick,
//!     &[Tag::Background],
//!     CausalReason::Timer("environment".to_owned()),
//! );
//! assert_eq!(buf.len(), 1);
//!
//! let drained = buf.drain();
//! assert_eq!(drained[0].index, 0);
//! assert!(buf.is_empty());
//! ```

use serde::{Deserialize, Serialize};

use crate::commands::StationSystem;
use crate::event::{EventKind, Tag};
use crate::state::LedgerReason;
use crate::world::CrewId;

// ---------------------------------------------------------------------------
// CausalReason
// ---------------------------------------------------------------------------

/// Why a proposal was made.
///
/// Prefer the most specific variant possible. `SystemInternal` is a last
/// resort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CausalReason {
    /// An operator command (the AI acting).
    Operator(String),
    /// A crew member acting on their own.
    CrewBehaviour(CrewId),
    /// The pressure router picked this.
    Director(String),
    /// A game rule (e.g. "suffocation_damage").
    GameRule(String),
    /// A state transition.
    StateTransition {
        /// The state being transitioned from.
        from: String,
        /// The state being transitioned to.
        to: String,
    },
    /// A timer firing.
    Timer(String),
    /// Internal system logic.
    SystemInternal(String),
}

// ---------------------------------------------------------------------------
// Deferred
// ---------------------------------------------------------------------------

/// A side effect staged on a proposal, applied only if the proposal applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Deferred {
    /// Write one ledger entry and shift crew beliefs.
    Suspicion {
        delta: f64,
        reason: LedgerReason,
        detail: String,
    },
    /// Open a new doubt.
    Doubt {
        topic: String,
        severity: u8,
        involved: Vec<CrewId>,
        system: Option<StationSystem>,
    },
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// A single proposed event with causality metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// What should happen.
    pub kind: EventKind,
    /// Narrative tags carried onto the applied event.
    pub tags: Vec<Tag>,
    /// Why this proposal was made.
    pub reason: CausalReason,
    /// Side effects that fire on successful application.
    pub deferred: Vec<Deferred>,
    /// Sequential index within the buffer (set on insertion).
    pub index: u32,
    /// Whether the proposal applied.
    ///
    /// `false` before application, and stays `false` if the proposal was
    /// stale by the time it was applied (e.g. its crew member died earlier
    /// in the same batch).
    #[serde(default)]
    pub applied: bool,
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Summary of one tick's application pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Proposals that were stale or ineligible at apply time.
    pub failed_count: usize,
    /// Proposals that applied.
    pub success_count: usize,
}

// ---------------------------------------------------------------------------
// ProposalBuffer
// ---------------------------------------------------------------------------

/// Collects proposals during a tick for FIFO application.
///
/// Proposals are applied in strict insertion order. Given the same state,
/// the same commands, and the same random stream, the same proposals are
/// pushed in the same order.
#[derive(Debug, Default)]
pub struct ProposalBuffer {
    proposals: Vec<Proposal>,
    next_index: u32,
}

impl ProposalBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a proposal and return it so callers can attach deferred effects.
    pub fn push(&mut self, kind: EventKind, tags: &[Tag], reason: CausalReason) -> &mut Proposal {
        let index = self.next_index;
        self.next_index += 1;
        self.proposals.push(Proposal {
            kind,
            tags: tags.to_vec(),
            reason,
            deferred: Vec::new(),
            index,
            applied: false,
        });
        let last = self.proposals.len() - 1;
        &mut self.proposals[last]
    }

    /// Queue a proposal with deferred side effects.
    pub fn push_with(
        &mut self,
        kind: EventKind,
        tags: &[Tag],
        reason: CausalReason,
        deferred: Vec<Deferred>,
    ) {
        self.push(kind, tags, reason).deferred = deferred;
    }

    /// All queued proposals in insertion order.
    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    /// Whether any queued proposal matches `pred`.
    pub fn any(&self, pred: impl Fn(&EventKind) -> bool) -> bool {
        self.proposals.iter().any(|p| pred(&p.kind))
    }

    /// Take every proposal in FIFO order and reset the index.
    pub fn drain(&mut self) -> Vec<Proposal> {
        self.next_index = 0;
        std::mem::take(&mut self.proposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_insertion_order() {
        let mut buf = ProposalBuffer::new();
        for i in 0..5 {
            buf.push(
                EventKind::SystemsTick,
                &[],
                CausalReason::Timer(format!("t{i}")),
            );
        }
        let drained = buf.drain();
        let indices: Vec<u32> = drained.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(drained.iter().all(|p| !p.applied));
    }

    #[test]
    fn deferred_effects_ride_on_the_proposal() {
        let mut buf = ProposalBuffer::new();
        buf.push_with(
            EventKind::SystemsTick,
            &[Tag::Uncertainty],
            CausalReason::Director("doubt_voiced".to_owned()),
            vec![Deferred::Suspicion {
                delta: 3.0,
                reason: LedgerReason::DoubtVoiced,
                detail: "test".to_owned(),
            }],
        );
        assert_eq!(buf.proposals()[0].deferred.len(), 1);
        assert!(buf.any(|k| matches!(k, EventKind::SystemsTick)));
    }

    #[test]
    fn drain_resets_indices() {
        let mut buf = ProposalBuffer::new();
        buf.push(EventKind::SystemsTick, &[], CausalReason::SystemInternal("a".into()));
        buf.drain();
        buf.push(EventKind::SystemsTick, &[], CausalReason::SystemInternal("b".into()));
        assert_eq!(buf.proposals()[0].index, 0);
    }
}
