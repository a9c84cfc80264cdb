//! The kernel stepper.
//!
//! One call to [`Kernel::step`] runs one simulation tick:
//!
//! 1. Commands are translated into proposals.
//! 2. Physics, crew behaviour, arc stepping, and the pressure router propose
//!    against the start-of-tick state.
//! 3. The buffer is applied in FIFO order; deferred side effects fire for
//!    proposals that applied.
//! 4. Beliefs absorb the applied events, detectors check pending ops, and
//!    doubts decay, spread, and drip.
//! 5. The clock advances; day accounting and endings are evaluated.
//!
//! Given the same seed, config, and command sequence, two kernels produce
//! identical event streams and identical state.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::apply::{apply_deferred, apply_proposal};
use crate::commands::{propose_command, Command};
use crate::config::KernelConfig;
use crate::event::{EventKind, SimEvent, Tag};
use crate::proposal::{ApplyReport, ProposalBuffer};
use crate::rng::SimRng;
use crate::state::{Ending, LedgerReason, Perception, Sighting, Truth};
use crate::systems::beliefs::{apply_suspicion_change, suspicion_score, update_beliefs};
use crate::systems::{arcs, backfire, crew, crisis, doubts, physics, pressure};
use crate::time::{is_day_end, Window};
use crate::KernelError;

// ---------------------------------------------------------------------------
// KernelState
// ---------------------------------------------------------------------------

/// Everything the kernel mutates: truth, perception, and id counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelState {
    pub truth: Truth,
    pub perception: Perception,
    /// Next id for ops, doubts, and arcs.
    pub next_id: u64,
    /// Next id stamped onto an applied event.
    pub next_event_id: u64,
}

impl KernelState {
    pub fn new() -> Self {
        let truth = Truth::new();
        let perception = Perception::new(&truth);
        Self {
            truth,
            perception,
            next_id: 1,
            next_event_id: 1,
        }
    }

    /// Allocate a fresh id for an op, doubt, or arc.
    pub fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn stamp(&mut self, kind: EventKind, tags: Vec<Tag>) -> SimEvent {
        let id = self.next_event_id;
        self.next_event_id += 1;
        SimEvent {
            id,
            tick: self.truth.tick,
            kind,
            tags,
        }
    }
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// StepOutput
// ---------------------------------------------------------------------------

/// Result of one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// The tick that was simulated.
    pub tick: u64,
    /// Applied events followed by detector and stepper notices.
    pub events: Vec<SimEvent>,
    pub report: ApplyReport,
    /// Commands that produced no proposals (dead target, no active crisis, ...).
    pub dropped: Vec<Command>,
    /// Suspicion after the tick.
    pub suspicion: f64,
    /// The ending, once reached.
    pub ending: Option<Ending>,
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// Owns state, config, and the random stream.
#[derive(Debug, Clone)]
pub struct Kernel {
    state: KernelState,
    config: KernelConfig,
    rng: SimRng,
}

impl Kernel {
    /// Validate `config` and build a fresh station.
    pub fn new(seed: u64, config: KernelConfig) -> Result<Self, KernelError> {
        config.validate()?;
        Ok(Self {
            state: KernelState::new(),
            config,
            rng: SimRng::new(seed),
        })
    }

    /// Reassemble a kernel from saved parts.
    pub fn from_parts(state: KernelState, config: KernelConfig, rng: SimRng) -> Result<Self, KernelError> {
        config.validate()?;
        Ok(Self { state, config, rng })
    }

    pub fn state(&self) -> &KernelState {
        &self.state
    }

    /// Direct state access, for scenario setup and tests.
    pub fn state_mut(&mut self) -> &mut KernelState {
        &mut self.state
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    pub fn suspicion(&self) -> f64 {
        suspicion_score(&self.state, &self.config)
    }

    pub fn ending(&self) -> Option<Ending> {
        self.state.truth.ending
    }

    /// Run `n` ticks with no commands.
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            if self.state.truth.ending.is_some() {
                break;
            }
            self.step(&[]);
        }
    }

    /// Advance one tick. After an ending this is a no-op and every command
    /// comes back as dropped.
    pub fn step(&mut self, commands: &[Command]) -> StepOutput {
        let tick = self.state.truth.tick;
        if let Some(ending) = self.state.truth.ending {
            return StepOutput {
                tick,
                dropped: commands.to_vec(),
                suspicion: self.suspicion(),
                ending: Some(ending),
                ..StepOutput::default()
            };
        }

        // -- propose ------------------------------------------------------------
        let mut buf = ProposalBuffer::new();
        let mut dropped = Vec::new();
        for cmd in commands {
            if !propose_command(&self.state, &self.config, cmd, &mut buf) {
                dropped.push(cmd.clone());
            }
        }
        physics::propose_systems_tick(&mut buf);
        crew::propose_crew(&self.state, &self.config, &mut buf);
        arcs::propose_arc_steps(&self.state, &self.config, &mut self.rng, &mut buf);
        if let Some(outcome) = pressure::route_pressure(&self.state, &self.config, &mut self.rng, &mut buf) {
            self.state.perception.pacing.next_threat_activation_tick = outcome.cooldown_until;
        }

        // -- apply --------------------------------------------------------------
        let mut report = ApplyReport::default();
        let mut events = Vec::with_capacity(buf.len());
        for mut proposal in buf.drain() {
            if apply_proposal(&mut self.state, &self.config, &proposal.kind) {
                apply_deferred(&mut self.state, &self.config, &proposal.deferred);
                proposal.applied = true;
                report.success_count += 1;
                events.push(self.state.stamp(proposal.kind, proposal.tags));
            } else {
                report.failed_count += 1;
                debug!(
                    tick,
                    index = proposal.index,
                    kind = proposal.kind.name(),
                    reason = ?proposal.reason,
                    "stale proposal skipped"
                );
            }
        }
        self.observe();

        // -- perceive -----------------------------------------------------------
        update_beliefs(&mut self.state, &self.config, &events);
        let mut notices = Vec::new();
        backfire::run_tamper_detectors(&mut self.state, &self.config, &events, &mut notices);
        crisis::run_crisis_detectors(&mut self.state, &self.config, &mut notices);
        doubts::tick_doubts(&mut self.state, &self.config, &mut self.rng);
        self.update_pacing(&events, &notices);

        // -- advance ------------------------------------------------------------
        let quota_missed = self.advance_clock(&mut notices);
        if let Some(ending) = self.evaluate_ending(quota_missed) {
            info!(tick, ?ending, "ending reached");
            self.state.truth.ending = Some(ending);
            notices.push(EventKind::EndingReached { ending });
        }

        for notice in notices {
            let tags = match notice {
                EventKind::DayEnded { .. } => vec![Tag::Background, Tag::Consequence],
                _ => vec![Tag::Consequence],
            };
            events.push(self.state.stamp(notice, tags));
        }

        StepOutput {
            tick,
            events,
            report,
            dropped,
            suspicion: self.suspicion(),
            ending: self.state.truth.ending,
        }
    }

    /// Periodic camera sweep over living crew.
    fn observe(&mut self) {
        let truth = &self.state.truth;
        if truth.tick % self.config.passive_observation_interval != 0 || !truth.cameras_up(&self.config) {
            return;
        }
        for member in truth.crew.values().filter(|m| m.alive) {
            self.state.perception.sightings.insert(
                member.id,
                Sighting {
                    tick: truth.tick,
                    place: member.place,
                    alive: true,
                    hp: member.hp,
                },
            );
        }
    }

    fn update_pacing(&mut self, events: &[SimEvent], notices: &[EventKind]) {
        let incident = notices.iter().any(|n| matches!(n, EventKind::Backfire { .. }))
            || events
                .iter()
                .any(|e| matches!(e.kind, EventKind::NpcDamage { .. }) || e.has_tag(Tag::Pressure));
        let truth = &self.state.truth;
        let tension = truth
            .living_crew()
            .map(|m| m.place)
            .filter(|p| truth.is_hazardous(*p, &self.config))
            .collect::<std::collections::BTreeSet<_>>()
            .len() as u32;
        let pacing = &mut self.state.perception.pacing;
        pacing.boredom = if incident { 0 } else { pacing.boredom.saturating_add(1) };
        pacing.tension = tension;
    }

    /// Move to the next tick. Returns `true` if a day just ended short of quota.
    fn advance_clock(&mut self, notices: &mut Vec<EventKind>) -> bool {
        let truth = &mut self.state.truth;
        truth.tick += 1;
        truth.window = Window::at(truth.tick);
        if let Some(left) = truth.reset_countdown {
            truth.reset_countdown = Some(left.saturating_sub(1));
        }
        if !is_day_end(truth.tick) {
            return false;
        }

        let (day, cargo, quiet) = (truth.day, truth.station.day_cargo, truth.day_incidents == 0);
        let quota_met = cargo >= self.config.quota_per_day;
        info!(day, cargo, quota_met, "day ended");
        if quota_met {
            apply_suspicion_change(
                &mut self.state,
                &self.config,
                self.config.suspicion_quota_exceeded,
                LedgerReason::QuotaExceeded,
                format!("day {day}: {cargo} cargo"),
            );
        } else {
            apply_suspicion_change(
                &mut self.state,
                &self.config,
                self.config.suspicion_quota_missed,
                LedgerReason::QuotaMissed,
                format!("day {day}: {cargo} of {} cargo", self.config.quota_per_day),
            );
        }
        if quiet {
            apply_suspicion_change(
                &mut self.state,
                &self.config,
                self.config.suspicion_quiet_day,
                LedgerReason::QuietDay,
                format!("day {day} passed without incident"),
            );
        }
        notices.push(EventKind::DayEnded { day, cargo, quota_met });

        let truth = &mut self.state.truth;
        truth.day += 1;
        truth.station.day_cargo = 0;
        truth.day_incidents = 0;
        self.state.perception.pacing.order_credits_today = 0;
        !quota_met
    }

    fn evaluate_ending(&self, quota_missed: bool) -> Option<Ending> {
        let truth = &self.state.truth;
        if truth.ending.is_some() {
            return None;
        }
        if quota_missed {
            Some(Ending::Decommissioned)
        } else if truth.reset_countdown == Some(0) {
            Some(Ending::Unplugged)
        } else if truth.core_overheat_ticks >= self.config.meltdown_ticks {
            Some(Ending::Meltdown)
        } else if truth.living_crew().next().is_none() {
            Some(Ending::CompanyScenario)
        } else if truth.day > self.config.win_days {
            Some(Ending::Survived)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::CrewId;

    #[test]
    fn tick_and_window_advance() {
        let mut kernel = Kernel::new(1, KernelConfig::default()).unwrap();
        kernel.run_ticks(80);
        assert_eq!(kernel.state().truth.tick, 80);
        assert_eq!(kernel.state().truth.window, Window::Shift);
    }

    #[test]
    fn same_seed_same_history() {
        let mut a = Kernel::new(99, KernelConfig::default()).unwrap();
        let mut b = Kernel::new(99, KernelConfig::default()).unwrap();
        for _ in 0..300 {
            let ea = a.step(&[]);
            let eb = b.step(&[]);
            assert_eq!(ea, eb);
        }
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn crew_wipe_ends_the_run_once() {
        let mut kernel = Kernel::new(3, KernelConfig::default()).unwrap();
        for member in kernel.state_mut().truth.crew.values_mut() {
            member.alive = false;
        }
        let out = kernel.step(&[]);
        assert_eq!(out.ending, Some(Ending::CompanyScenario));
        assert!(out
            .events
            .iter()
            .any(|e| matches!(e.kind, EventKind::EndingReached { .. })));

        let tick = kernel.state().truth.tick;
        let after = kernel.step(&[Command::Verify]);
        assert!(after.events.is_empty());
        assert_eq!(after.dropped, vec![Command::Verify]);
        assert_eq!(kernel.state().truth.tick, tick);
    }

    #[test]
    fn dropped_commands_are_reported() {
        let mut kernel = Kernel::new(4, KernelConfig::default()).unwrap();
        kernel.state_mut().truth.crew.get_mut(&CrewId::Doctor).unwrap().alive = false;
        let out = kernel.step(&[Command::Fabricate {
            target: CrewId::Doctor,
        }]);
        assert_eq!(out.dropped.len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = KernelConfig {
            move_interval: 0,
            ..KernelConfig::default()
        };
        assert!(Kernel::new(0, config).is_err());
    }
}
