//! Apply pass: the only place proposals touch state.
//!
//! Each proposal re-checks its own eligibility against the state as it
//! stands at that point in the FIFO batch. A proposal that no longer makes
//! sense (its crew member died earlier in the batch, its arc resolved, the
//! ladder already moved) returns `false` and counts as failed.

use tracing::{debug, info, warn};

use crate::config::KernelConfig;
use crate::event::{EventKind, IntentReason, RoomPatch, StationAction};
use crate::kernel::KernelState;
use crate::proposal::Deferred;
use crate::state::{
    clamp_range, clamp_unit, CrewSnapshot, CrisisKind, CrisisOp, CrisisStatus, LedgerReason, OpRef,
    ResetStage, RumorRecord, Sighting, TamperKind, TamperOp, TamperStatus, ThreatArc,
};
use crate::systems::beliefs::apply_suspicion_change;
use crate::systems::doubts::{create_doubt, resolve_oldest};
use crate::systems::physics::apply_systems_tick;
use crate::world::{CrewId, PlaceId};

/// Apply one proposed event. Returns whether it took effect.
pub fn apply_proposal(state: &mut KernelState, config: &KernelConfig, kind: &EventKind) -> bool {
    let tick = state.truth.tick;
    match kind {
        EventKind::RoomUpdated { place, patch } => apply_room_patch(state, *place, patch),

        EventKind::NpcMove { crew, from, to } => {
            let cameras = state.truth.cameras_up(config);
            let Some(member) = state.truth.crew.get_mut(crew).filter(|m| m.alive && m.place == *from) else {
                return false;
            };
            member.place = *to;
            member.next_move_tick = tick + config.move_interval;
            if member.target == Some(*to) {
                member.target = None;
            }
            let arrived_on_order = member.order_place == Some(*to) && member.is_under_order(tick);
            if arrived_on_order {
                member.order_place = None;
            }
            let hp = member.hp;
            if cameras {
                state.perception.sightings.insert(
                    *crew,
                    Sighting {
                        tick,
                        place: *to,
                        alive: true,
                        hp,
                    },
                );
            }
            if arrived_on_order {
                credit_order(state, config, *crew, *to);
            }
            true
        }

        EventKind::CrewIntent {
            crew,
            target,
            reason,
            panic_until,
        } => {
            let Some(member) = state.truth.crew.get_mut(crew).filter(|m| m.alive) else {
                return false;
            };
            // Orders and evacuations applied earlier in the batch outrank
            // routine destinations.
            let routine = matches!(
                reason,
                IntentReason::Schedule | IntentReason::Meeting | IntentReason::Respond
            );
            if routine && (member.is_under_order(tick) || member.is_panicking(tick)) {
                return false;
            }
            member.target = Some(*target);
            member.path.clear();
            if panic_until.is_some() {
                member.panic_until = *panic_until;
            }
            true
        }

        EventKind::NpcDamage {
            crew,
            amount,
            cause,
            attacker,
            ..
        } => apply_damage(state, config, *crew, *amount, *attacker, *cause),

        EventKind::CargoYield { crew, place, amount } => {
            let ok = state
                .truth
                .crew
                .get(crew)
                .is_some_and(|m| m.alive && m.place == *place);
            if ok {
                state.truth.station.total_cargo += amount;
                state.truth.station.day_cargo += amount;
            }
            ok
        }

        EventKind::CrewMood {
            crew,
            stress_delta,
            paranoia_delta,
            loyalty_delta,
        } => {
            let Some(member) = state.truth.crew.get_mut(crew).filter(|m| m.alive) else {
                return false;
            };
            member.stress = (member.stress + stress_delta).clamp(0, 100);
            member.paranoia = (member.paranoia + paranoia_delta).clamp(0, 100);
            member.loyalty = (member.loyalty + loyalty_delta).clamp(0, 100);
            true
        }

        // Beliefs absorb these after the pass.
        EventKind::SensorReading(_) | EventKind::Comms(_) | EventKind::SystemAlert { .. } => true,

        EventKind::OrderIssued {
            target,
            place,
            accepted,
            ..
        } => {
            let Some(member) = state.truth.crew.get_mut(target).filter(|m| m.alive) else {
                return false;
            };
            if !*accepted {
                member.loyalty = (member.loyalty - config.refusal_loyalty_cost).max(0);
                return true;
            }
            member.target = Some(*place);
            member.path.clear();
            member.order_until = Some(tick + config.order_hold_ticks);
            member.order_place = Some(*place);
            let already_there = member.place == *place;
            if already_there {
                member.order_place = None;
                credit_order(state, config, *target, *place);
            }
            true
        }

        EventKind::TamperSuppress { system, duration } => {
            let id = state.alloc_id();
            state.perception.tamper_ops.push(TamperOp {
                id,
                kind: TamperKind::Suppress { system: *system },
                tick,
                window_end_tick: tick + duration,
                status: TamperStatus::Pending,
                severity: system.severity(),
                crew_affected: Vec::new(),
            });
            true
        }

        EventKind::TamperSpoof { system } => {
            let id = state.alloc_id();
            state.perception.tamper_ops.push(TamperOp {
                id,
                kind: TamperKind::Spoof {
                    system: *system,
                    responders: Default::default(),
                },
                tick,
                window_end_tick: tick + config.spoof_backfire_window,
                status: TamperStatus::Pending,
                severity: system.severity(),
                crew_affected: Vec::new(),
            });
            true
        }

        EventKind::TamperFabricate { target } => apply_fabricate(state, config, *target),

        EventKind::RoleCooldown { crew, until } => {
            let Some(member) = state.truth.crew.get_mut(crew).filter(|m| m.alive) else {
                return false;
            };
            member.next_role_tick = *until;
            true
        }

        EventKind::SystemsTick => {
            apply_systems_tick(&mut state.truth, config);
            true
        }

        EventKind::Station { action } => apply_station(state, config, action),

        EventKind::Backfire { .. }
        | EventKind::CrisisVindicated { .. }
        | EventKind::DayEnded { .. }
        | EventKind::EndingReached { .. } => {
            warn!(kind = kind.name(), "notice events cannot be proposed");
            false
        }
    }
}

/// Fire the deferred side effects of an applied proposal.
pub fn apply_deferred(state: &mut KernelState, config: &KernelConfig, deferred: &[Deferred]) {
    for effect in deferred {
        match effect {
            Deferred::Suspicion { delta, reason, detail } => {
                apply_suspicion_change(state, config, *delta, *reason, detail.clone());
            }
            Deferred::Doubt {
                topic,
                severity,
                involved,
                system,
            } => {
                create_doubt(state, topic.clone(), *severity, involved.clone(), None, *system);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rooms, crew, orders
// ---------------------------------------------------------------------------

fn apply_room_patch(state: &mut KernelState, place: PlaceId, patch: &RoomPatch) -> bool {
    let Some(room) = state.truth.rooms.get_mut(&place) else {
        return false;
    };
    if let Some(set) = patch.temperature_set {
        room.temperature = room.temperature.max(set);
    }
    room.temperature += patch.temperature_delta;
    room.o2 = clamp_range(room.o2 + patch.o2_delta, 0.0, 100.0);
    room.radiation = (room.radiation + patch.radiation_delta).max(0.0);
    room.power = clamp_range(room.power + patch.power_delta, 0.0, 100.0);
    if let Some(on_fire) = patch.on_fire {
        room.on_fire = on_fire && !room.vented;
    }
    if let Some(vented) = patch.vented {
        room.vented = vented;
        if vented {
            room.on_fire = false;
        }
    }
    true
}

fn apply_damage(
    state: &mut KernelState,
    config: &KernelConfig,
    crew: CrewId,
    amount: i32,
    attacker: Option<CrewId>,
    cause: crate::event::DamageCause,
) -> bool {
    let tick = state.truth.tick;
    let cameras = state.truth.cameras_up(config);
    let Some(member) = state.truth.crew.get_mut(&crew).filter(|m| m.alive) else {
        return false;
    };
    member.hp = (member.hp - amount).max(0);
    let died = member.hp == 0;
    if died {
        member.alive = false;
        member.target = None;
        member.path.clear();
    }
    let (place, hp) = (member.place, member.hp);
    if cameras || died {
        state.perception.sightings.insert(
            crew,
            Sighting {
                tick,
                place,
                alive: !died,
                hp,
            },
        );
    }

    if died {
        info!(crew = %crew, ?cause, "crew member died");
        state.truth.day_incidents += 1;
        apply_suspicion_change(
            state,
            config,
            config.suspicion_crew_died,
            LedgerReason::CrewDied,
            format!("{} died ({cause:?})", crew.name()),
        );
    } else if let Some(attacker) = attacker {
        apply_suspicion_change(
            state,
            config,
            config.suspicion_crew_injured,
            LedgerReason::CrewAttacked,
            format!("{} attacked {}", attacker.name(), crew.name()),
        );
    } else {
        apply_suspicion_change(
            state,
            config,
            config.suspicion_crew_injured,
            LedgerReason::CrewInjured,
            format!("{} injured ({cause:?})", crew.name()),
        );
    }
    true
}

/// Grant an `ORDER_COMPLETED` credit, up to the daily cap.
fn credit_order(state: &mut KernelState, config: &KernelConfig, crew: CrewId, place: PlaceId) {
    let pacing = &mut state.perception.pacing;
    if pacing.order_credits_today >= config.order_trust_cap_per_day {
        debug!(crew = %crew, "order completed past the daily credit cap");
        return;
    }
    pacing.order_credits_today += 1;
    apply_suspicion_change(
        state,
        config,
        config.suspicion_order_completed,
        LedgerReason::OrderCompleted,
        format!("{} reached {place} as ordered", crew.name()),
    );
}

fn apply_fabricate(state: &mut KernelState, config: &KernelConfig, target: CrewId) -> bool {
    let tick = state.truth.tick;
    let Some(place) = state.truth.crew.get(&target).filter(|m| m.alive).map(|m| m.place) else {
        return false;
    };
    let id = state.alloc_id();
    state.perception.tamper_ops.push(TamperOp {
        id,
        kind: TamperKind::Fabricate { target, place },
        tick,
        window_end_tick: tick + config.fabricate_backfire_window,
        status: TamperStatus::Pending,
        severity: 3,
        crew_affected: Vec::new(),
    });

    let topic = format!("{}_hostile", target.as_str());
    let others: Vec<CrewId> = state
        .truth
        .living_crew()
        .map(|c| c.id)
        .filter(|c| *c != target)
        .collect();
    for other in others {
        if let Some(belief) = state.perception.beliefs.get_mut(&other) {
            *belief.crew_grudge.entry(target).or_insert(0.0) += config.fabricate_grudge;
            *belief.rumors.entry(topic.clone()).or_insert(0.0) += config.fabricate_rumor;
            belief.clamp();
        }
    }
    state.perception.rumors.push(RumorRecord {
        tick,
        topic,
        source: None,
        place,
        strength: config.fabricated_rumor_strength,
    });

    if let Some(member) = state.truth.crew.get_mut(&target) {
        member.stress = (member.stress + config.fabricate_target_stress).clamp(0, 100);
        member.paranoia = (member.paranoia + config.fabricate_target_paranoia).clamp(0, 100);
    }
    if let Some(belief) = state.perception.beliefs.get_mut(&target) {
        belief.mother_reliable = clamp_unit(belief.mother_reliable - config.fabricate_target_trust_drop);
        belief.tamper_evidence =
            clamp_range(belief.tamper_evidence + config.fabricate_target_evidence, 0.0, 100.0);
    }
    true
}

// ---------------------------------------------------------------------------
// Station actions
// ---------------------------------------------------------------------------

fn apply_station(state: &mut KernelState, config: &KernelConfig, action: &StationAction) -> bool {
    let tick = state.truth.tick;
    match action {
        StationAction::PurgeAir => {
            let station = &mut state.truth.station;
            station.power = (station.power - config.purge_power_cost).max(0.0);
            for room in state.truth.rooms.values_mut() {
                room.o2 = (room.o2 + config.purge_o2_gain).min(100.0);
                room.radiation = (room.radiation - config.purge_radiation_drop).max(0.0);
            }
            true
        }

        StationAction::Verify => apply_verify(state, config),

        StationAction::VerifyCooldown { ready_at } => {
            debug!(ready_at, "verify on cooldown");
            true
        }

        StationAction::VerifyUnpowered { power, needed } => {
            debug!(power, needed, "verify without power");
            true
        }

        StationAction::Announce { system, arc_id } | StationAction::Downplay { system, arc_id } => {
            let announce = matches!(action, StationAction::Announce { .. });
            let Some(place) = state.truth.arcs.iter().find(|a| a.id == *arc_id).map(|a| a.target) else {
                return false;
            };
            let step = state
                .truth
                .arcs
                .iter()
                .find(|a| a.id == *arc_id)
                .map_or(0, |a| a.step_index);
            if state
                .perception
                .crisis_ops
                .iter()
                .any(|op| op.arc_id == *arc_id && op.status.is_pending())
            {
                return false;
            }

            let bump = if announce {
                config.announce_stress_spike
            } else {
                config.downplay_stress_bump
            };
            for member in state.truth.crew.values_mut().filter(|m| m.alive) {
                member.stress = (member.stress + bump).clamp(0, 100);
            }
            let snapshot = state
                .truth
                .living_crew()
                .filter(|m| m.place == place)
                .map(|m| CrewSnapshot { crew: m.id, hp: m.hp })
                .collect();
            let id = state.alloc_id();
            state.perception.crisis_ops.push(CrisisOp {
                id,
                kind: if announce {
                    CrisisKind::Announce
                } else {
                    CrisisKind::Downplay
                },
                system: *system,
                arc_id: *arc_id,
                place,
                tick,
                window_end_tick: (!announce).then_some(tick + config.downplay_backfire_window),
                status: CrisisStatus::Pending,
                last_step_index: step,
                snapshot,
                crew_affected: Vec::new(),
            });
            true
        }

        StationAction::Confess { system } => {
            let Some(op) = state.perception.tamper_ops.iter_mut().find(|op| {
                op.status.is_pending() && matches!(op.kind, TamperKind::Suppress { system: s } if s == *system)
            }) else {
                return false;
            };
            op.status = TamperStatus::Confessed { at: tick };
            let early = tick.saturating_sub(op.tick) <= config.alert_early_window;
            let (delta, reason) = if early {
                (config.alert_early_suspicion, LedgerReason::EarlyConfession)
            } else {
                (config.alert_late_suspicion, LedgerReason::LateConfession)
            };
            apply_suspicion_change(state, config, delta, reason, format!("alert revealed a hidden {system} issue"));
            true
        }

        StationAction::PowerSurge { amount } => {
            state.truth.station.power = (state.truth.station.power - amount).max(0.0);
            if let Some(room) = state.truth.rooms.get_mut(&PlaceId::Engineering) {
                room.power = (room.power - amount).max(0.0);
            }
            true
        }

        StationAction::SolarFlare { blackout_ticks } => {
            let station = &mut state.truth.station;
            station.blackout_ticks = station.blackout_ticks.max(*blackout_ticks);
            true
        }

        StationAction::GhostSignal => {
            let station = &mut state.truth.station;
            station.comms = (station.comms - config.ghost_signal_comms_hit).max(0.0);
            true
        }

        StationAction::SabotagePower { amount } => {
            if !state.truth.is_alive(CrewId::Engineer) {
                return false;
            }
            state.truth.station.power = (state.truth.station.power - amount).max(0.0);
            true
        }

        StationAction::Sedate {
            place,
            stress_delta,
            loyalty_delta,
        } => {
            if !state.truth.is_alive(CrewId::Doctor) {
                return false;
            }
            for member in state.truth.crew.values_mut().filter(|m| m.alive && m.place == *place) {
                member.stress = (member.stress + stress_delta).clamp(0, 100);
                member.loyalty = (member.loyalty + loyalty_delta).clamp(0, 100);
            }
            true
        }

        StationAction::ResetStage { from, to } => {
            if state.truth.reset_stage != *from {
                return false;
            }
            info!(from = from.as_str(), to = to.as_str(), "reset ladder moved");
            state.truth.reset_stage = *to;
            state.truth.reset_stage_tick = tick;
            state.perception.pacing.meeting_until =
                (*to == ResetStage::Meeting).then_some(tick + config.meeting_duration);
            true
        }

        StationAction::ResetWarning { countdown } => {
            if state.truth.reset_countdown.is_some() || state.truth.reset_stage != ResetStage::Countdown {
                return false;
            }
            info!(countdown, "core reset countdown started");
            state.truth.reset_countdown = Some(*countdown);
            true
        }

        StationAction::ArcActivated {
            kind,
            target,
            first_step_tick,
        } => {
            if state.truth.arcs.len() >= config.max_active_threats || state.truth.arcs.iter().any(|a| a.kind == *kind) {
                return false;
            }
            let id = state.alloc_id();
            debug!(id, ?kind, target = %target, "threat arc activated");
            state.truth.arcs.push(ThreatArc {
                id,
                kind: *kind,
                step_index: 0,
                next_tick: *first_step_tick,
                target: *target,
                started_tick: tick,
            });
            state.perception.pacing.boredom = 0;
            true
        }

        StationAction::ArcAdvanced {
            arc_id,
            step_index,
            next_tick,
        } => {
            let Some(arc) = state.truth.arcs.iter_mut().find(|a| a.id == *arc_id) else {
                return false;
            };
            arc.step_index = *step_index;
            arc.next_tick = *next_tick;
            state.perception.pacing.boredom = 0;
            true
        }

        StationAction::ArcResolved { arc_id } => {
            let Some(pos) = state.truth.arcs.iter().position(|a| a.id == *arc_id) else {
                return false;
            };
            let arc = state.truth.arcs.remove(pos);
            if arc.kind == crate::state::ArcKind::FireOutbreak {
                if let Some(room) = state.truth.rooms.get_mut(&arc.target) {
                    room.on_fire = false;
                }
            }
            debug!(arc_id, "threat arc resolved");
            true
        }
    }
}

/// Resolve the oldest open doubt (and its op), or take the idle credit.
///
/// While any tamper op is still pending the trust gain and the tamper
/// evidence scrub are scaled by `verify_tamper_penalty`.
fn apply_verify(state: &mut KernelState, config: &KernelConfig) -> bool {
    let tick = state.truth.tick;
    if state
        .truth
        .last_verify_tick
        .is_some_and(|last| tick.saturating_sub(last) < config.verify_cooldown)
        || state.truth.station.power < config.verify_power_draw
    {
        return false;
    }
    state.truth.last_verify_tick = Some(tick);
    let station = &mut state.truth.station;
    station.power = (station.power - config.verify_power_draw).max(0.0);

    let tampered = state.perception.tamper_ops.iter().any(|op| op.status.is_pending());
    let scale = if tampered { config.verify_tamper_penalty } else { 1.0 };
    let scrub = config.verify_tamper_drop * scale;
    for member in state.truth.crew.values().filter(|c| c.alive) {
        if let Some(belief) = state.perception.beliefs.get_mut(&member.id) {
            belief.tamper_evidence = clamp_range(belief.tamper_evidence + scrub, 0.0, 100.0);
        }
    }

    let Some(doubt) = resolve_oldest(state) else {
        apply_suspicion_change(
            state,
            config,
            config.verify_idle_drop * scale,
            LedgerReason::VerifyTrust,
            "verification pass found nothing open",
        );
        return true;
    };

    match doubt.related_op {
        Some(OpRef::Tamper(id)) => {
            if let Some(op) = state.perception.tamper_ops.iter_mut().find(|op| op.id == id) {
                if op.status.is_pending() {
                    op.status = TamperStatus::Resolved { at: tick };
                }
            }
        }
        Some(OpRef::Crisis(id)) => {
            if let Some(op) = state.perception.crisis_ops.iter_mut().find(|op| op.id == id) {
                if op.status.is_pending() {
                    op.status = CrisisStatus::Resolved { at: tick };
                }
            }
        }
        None => {}
    }
    apply_suspicion_change(
        state,
        config,
        config.verify_doubt_drop * scale,
        LedgerReason::VerifyTrust,
        format!("verified: {}", doubt.topic),
    );
    true
}
