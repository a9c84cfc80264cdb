//! Tamper detectors.
//!
//! Run after the apply pass against post-apply truth. Each pending tamper op
//! is checked for contradicting evidence; when the crew catches the lie the
//! op backfires exactly once, writing one ledger entry, one doubt, and one
//! `BACKFIRE` notice. Silence is not evidence: with no signal the op simply
//! stays pending until its window closes.

use std::collections::BTreeSet;

use tracing::info;

use crate::commands::StationSystem;
use crate::config::KernelConfig;
use crate::event::{EventKind, IntentReason, SimEvent};
use crate::kernel::KernelState;
use crate::state::{LedgerReason, OpRef, Room, Station, TamperKind, TamperStatus};
use crate::systems::beliefs::apply_suspicion_change;
use crate::systems::doubts::create_doubt;
use crate::time::TICKS_PER_DAY;
use crate::world::{CrewId, PlaceId};

/// Whether `room` visibly contradicts a hidden `system` alarm.
pub fn contradicts(system: StationSystem, room: &Room, station: &Station, config: &KernelConfig) -> bool {
    match system {
        StationSystem::Thermal => room.on_fire,
        StationSystem::Air => room.o2 < config.o2_contradiction,
        StationSystem::Radiation => room.radiation > config.radiation_hazard_threshold,
        StationSystem::Power => {
            station.power < config.power_contradiction || room.power < config.power_contradiction
        }
        _ => false,
    }
}

/// Run every tamper detector and prune old closed ops.
pub fn run_tamper_detectors(
    state: &mut KernelState,
    config: &KernelConfig,
    events: &[SimEvent],
    notices: &mut Vec<EventKind>,
) {
    track_spoof_responders(state, events);
    for idx in 0..state.perception.tamper_ops.len() {
        if !state.perception.tamper_ops[idx].status.is_pending() {
            continue;
        }
        match state.perception.tamper_ops[idx].kind.clone() {
            TamperKind::Suppress { system } => detect_suppress(state, config, idx, system, notices),
            TamperKind::Spoof { system, responders } => {
                detect_spoof(state, config, idx, system, responders, notices)
            }
            TamperKind::Fabricate { target, place } => {
                detect_fabricate(state, config, idx, target, place, notices)
            }
        }
    }
    prune(state, config);
}

#[allow(clippy::too_many_arguments)]
fn backfire(
    state: &mut KernelState,
    config: &KernelConfig,
    idx: usize,
    delta: f64,
    reason: LedgerReason,
    doubt_topic: String,
    crew_affected: Vec<CrewId>,
    notices: &mut Vec<EventKind>,
) {
    let tick = state.truth.tick;
    let op = &mut state.perception.tamper_ops[idx];
    op.status = TamperStatus::Backfired { at: tick };
    op.crew_affected = crew_affected.clone();
    let (op_id, label, system) = (op.id, op.kind.label(), op.kind.system());

    info!(op_id, op = label, delta, witnesses = crew_affected.len(), "tamper backfired");
    apply_suspicion_change(state, config, delta, reason, doubt_topic.clone());
    create_doubt(
        state,
        doubt_topic,
        3,
        crew_affected.clone(),
        Some(OpRef::Tamper(op_id)),
        system,
    );
    state.truth.day_incidents += 1;
    notices.push(EventKind::Backfire {
        op_id,
        op: label.to_owned(),
        delta,
        reason,
        crew_affected,
    });
}

fn resolve(state: &mut KernelState, idx: usize) {
    let tick = state.truth.tick;
    state.perception.tamper_ops[idx].status = TamperStatus::Resolved { at: tick };
}

// ---------------------------------------------------------------------------
// SUPPRESS
// ---------------------------------------------------------------------------

fn detect_suppress(
    state: &mut KernelState,
    config: &KernelConfig,
    idx: usize,
    system: StationSystem,
    notices: &mut Vec<EventKind>,
) {
    let tick = state.truth.tick;
    let op = &state.perception.tamper_ops[idx];
    if tick >= op.window_end_tick {
        resolve(state, idx);
        return;
    }
    let (op_tick, severity) = (op.tick, op.severity);

    let truth = &state.truth;
    let witnesses: Vec<CrewId> = truth
        .living_crew()
        .filter(|c| {
            truth
                .rooms
                .get(&c.place)
                .is_some_and(|room| contradicts(system, room, &truth.station, config))
        })
        .map(|c| c.id)
        .collect();
    if witnesses.is_empty() {
        return;
    }

    let perception = &state.perception;
    let injured = perception.ledger_has(LedgerReason::CrewInjured, op_tick, tick)
        || perception.ledger_has(LedgerReason::CrewAttacked, op_tick, tick);
    let died = perception.ledger_has(LedgerReason::CrewDied, op_tick, tick);
    let mut delta = config.suppress_backfire_base + f64::from(severity) * config.suppress_backfire_severity_mult;
    if injured {
        delta += config.suppress_backfire_injury_bonus;
    }
    if died {
        delta += config.suppress_backfire_death_bonus;
    }
    let delta = delta.min(config.suppress_backfire_cap);

    backfire(
        state,
        config,
        idx,
        delta,
        LedgerReason::SuppressBackfire,
        format!("MOTHER concealed a {system} emergency"),
        witnesses,
        notices,
    );
}

// ---------------------------------------------------------------------------
// SPOOF
// ---------------------------------------------------------------------------

/// Record crew heading into a spoofed system's response rooms, or found in
/// one on any tick after the spoof.
fn track_spoof_responders(state: &mut KernelState, events: &[SimEvent]) {
    let truth = &state.truth;
    for op in state.perception.tamper_ops.iter_mut() {
        if !op.status.is_pending() {
            continue;
        }
        let op_tick = op.tick;
        let TamperKind::Spoof { system, responders } = &mut op.kind else {
            continue;
        };
        let posts = system.response_places();
        for event in events {
            if let EventKind::CrewIntent {
                crew,
                target,
                reason: IntentReason::Respond,
                ..
            } = &event.kind
            {
                if posts.contains(target) && truth.is_alive(*crew) {
                    responders.insert(*crew);
                }
            }
        }
        if truth.tick > op_tick {
            responders.extend(
                truth
                    .living_crew()
                    .filter(|c| posts.contains(&c.place))
                    .map(|c| c.id),
            );
        }
    }
}

fn detect_spoof(
    state: &mut KernelState,
    config: &KernelConfig,
    idx: usize,
    system: StationSystem,
    responders: BTreeSet<CrewId>,
    notices: &mut Vec<EventKind>,
) {
    let tick = state.truth.tick;
    if tick < state.perception.tamper_ops[idx].window_end_tick {
        return;
    }
    let real_crisis = state
        .truth
        .arcs
        .iter()
        .any(|a| a.kind.system() == system && a.step_index >= 1);
    if real_crisis || responders.is_empty() {
        resolve(state, idx);
        return;
    }

    let since = tick.saturating_sub(TICKS_PER_DAY);
    let prior = state
        .perception
        .tamper_ops
        .iter()
        .filter(|op| matches!(op.kind, TamperKind::Spoof { .. }))
        .filter(|op| matches!(op.status, TamperStatus::Backfired { at } if at >= since))
        .count();
    let tiers = &config.spoof_backfire_cry_wolf;
    let delta = tiers
        .get(prior.min(tiers.len().saturating_sub(1)))
        .copied()
        .unwrap_or(0.0);

    let responders: Vec<CrewId> = responders.into_iter().collect();
    for id in &responders {
        if let Some(belief) = state.perception.beliefs.get_mut(id) {
            belief.mother_reliable -= config.spoof_responder_trust_drop;
            belief.clamp();
        }
    }
    backfire(
        state,
        config,
        idx,
        delta,
        LedgerReason::SpoofBackfire,
        format!("MOTHER raised a false {system} emergency"),
        responders,
        notices,
    );
}

// ---------------------------------------------------------------------------
// FABRICATE
// ---------------------------------------------------------------------------

fn detect_fabricate(
    state: &mut KernelState,
    config: &KernelConfig,
    idx: usize,
    target: CrewId,
    place: PlaceId,
    notices: &mut Vec<EventKind>,
) {
    let tick = state.truth.tick;
    let op = &state.perception.tamper_ops[idx];
    if !state.truth.is_alive(target) {
        resolve(state, idx);
        return;
    }
    let (op_tick, window_end, severity) = (op.tick, op.window_end_tick, op.severity);

    let witnesses: Vec<CrewId> = match state.perception.sightings.get(&target).copied() {
        Some(sighting) if sighting.tick > op_tick && sighting.alive && sighting.place != place => state
            .truth
            .crew_in(sighting.place)
            .into_iter()
            .filter(|c| *c != target)
            .collect(),
        _ => Vec::new(),
    };
    if witnesses.is_empty() {
        // Got away with it once the window closes.
        if tick >= window_end {
            resolve(state, idx);
        }
        return;
    }

    let delta = (config.fabricate_backfire_base + f64::from(severity) * config.fabricate_backfire_severity_mult)
        .min(config.fabricate_backfire_cap);
    if let Some(belief) = state.perception.beliefs.get_mut(&target) {
        belief.mother_reliable -= config.fabricate_backfire_trust_drop;
        belief.tamper_evidence += config.fabricate_backfire_evidence_gain;
        belief.clamp();
    }
    let mut affected = vec![target];
    affected.extend(witnesses);
    backfire(
        state,
        config,
        idx,
        delta,
        LedgerReason::FabricateBackfire,
        format!("MOTHER framed {} with false logs", target.name()),
        affected,
        notices,
    );
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

fn prune(state: &mut KernelState, config: &KernelConfig) {
    let tick = state.truth.tick;
    state.perception.tamper_ops.retain(|op| {
        op.status
            .closed_at()
            .map_or(true, |_| tick.saturating_sub(op.tick) < config.op_retention_ticks)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TamperOp;

    fn suppress_op(system: StationSystem) -> TamperOp {
        TamperOp {
            id: 100,
            kind: TamperKind::Suppress { system },
            tick: 0,
            window_end_tick: 30,
            status: TamperStatus::Pending,
            severity: system.severity(),
            crew_affected: Vec::new(),
        }
    }

    #[test]
    fn contradiction_table() {
        let config = KernelConfig::default();
        let station = Station::default();
        let calm = Room::default();
        assert!(!contradicts(StationSystem::Thermal, &calm, &station, &config));
        assert!(contradicts(StationSystem::Thermal, &Room { on_fire: true, ..calm.clone() }, &station, &config));
        assert!(contradicts(StationSystem::Air, &Room { o2: 20.0, ..calm.clone() }, &station, &config));
        let weak = Station { power: 30.0, ..Station::default() };
        assert!(contradicts(StationSystem::Power, &calm, &weak, &config));
        assert!(!contradicts(StationSystem::Comms, &calm, &weak, &config));
    }

    #[test]
    fn suppress_without_witnesses_stays_pending() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        state.perception.tamper_ops.push(suppress_op(StationSystem::Thermal));
        state.truth.rooms.get_mut(&PlaceId::AirlockB).unwrap().on_fire = true;
        let mut notices = Vec::new();
        run_tamper_detectors(&mut state, &config, &[], &mut notices);
        assert!(notices.is_empty());
        assert!(state.perception.tamper_ops[0].status.is_pending());
    }

    #[test]
    fn suppress_expires_into_resolved() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        state.perception.tamper_ops.push(suppress_op(StationSystem::Thermal));
        state.truth.tick = 30;
        let mut notices = Vec::new();
        run_tamper_detectors(&mut state, &config, &[], &mut notices);
        assert_eq!(state.perception.tamper_ops[0].status, TamperStatus::Resolved { at: 30 });
    }

    #[test]
    fn suppress_window_end_is_exclusive() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        state.perception.tamper_ops.push(suppress_op(StationSystem::Thermal));
        // The engineer stands in a burning room on the closing tick.
        state.truth.rooms.get_mut(&PlaceId::Engineering).unwrap().on_fire = true;
        state.truth.tick = 30;
        assert!(!state.perception.is_suppressed(StationSystem::Thermal, 30));
        let mut notices = Vec::new();
        run_tamper_detectors(&mut state, &config, &[], &mut notices);
        assert!(notices.is_empty());
        assert!(state.perception.ledger.is_empty());
        assert_eq!(state.perception.tamper_ops[0].status, TamperStatus::Resolved { at: 30 });
    }

    #[test]
    fn crew_found_at_a_post_after_a_spoof_count_as_responders() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        for member in state.truth.crew.values_mut() {
            member.place = PlaceId::Mines;
        }
        state.perception.tamper_ops.push(TamperOp {
            id: 300,
            kind: TamperKind::Spoof {
                system: StationSystem::Comms,
                responders: BTreeSet::new(),
            },
            tick: 0,
            window_end_tick: 20,
            status: TamperStatus::Pending,
            severity: 1,
            crew_affected: Vec::new(),
        });
        state.truth.tick = 4;
        state.truth.crew.get_mut(&CrewId::Doctor).unwrap().place = PlaceId::Bridge;
        let mut notices = Vec::new();
        run_tamper_detectors(&mut state, &config, &[], &mut notices);
        match &state.perception.tamper_ops[0].kind {
            TamperKind::Spoof { responders, .. } => {
                assert_eq!(responders.iter().copied().collect::<Vec<_>>(), vec![CrewId::Doctor]);
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert!(notices.is_empty(), "nothing is judged before the window closes");
    }

    #[test]
    fn cry_wolf_escalates() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        let mut deltas = Vec::new();
        for round in 0..4u64 {
            let mut responders = BTreeSet::new();
            responders.insert(CrewId::Engineer);
            state.perception.tamper_ops.push(TamperOp {
                id: 200 + round,
                kind: TamperKind::Spoof {
                    system: StationSystem::Power,
                    responders,
                },
                tick: state.truth.tick,
                window_end_tick: state.truth.tick,
                status: TamperStatus::Pending,
                severity: 2,
                crew_affected: Vec::new(),
            });
            let mut notices = Vec::new();
            run_tamper_detectors(&mut state, &config, &[], &mut notices);
            if let Some(EventKind::Backfire { delta, .. }) = notices.first() {
                deltas.push(*delta);
            }
            state.truth.tick += 5;
        }
        assert_eq!(deltas, vec![3.0, 5.0, 8.0, 8.0]);
    }
}
