//! Environmental threat arcs.
//!
//! An arc is activated by the pressure router's physical channel, steps
//! through a fixed escalation table on a jittered schedule, and resolves
//! after its last step. Step 0 raises a system alarm unless that system is
//! suppressed.

use crate::config::KernelConfig;
use crate::event::{EventKind, RoomPatch, SensorReading, ReadingSource, StationAction, Tag};
use crate::kernel::KernelState;
use crate::proposal::{CausalReason, ProposalBuffer};
use crate::rng::SimRng;
use crate::state::{ArcKind, ThreatArc};
use crate::world::PlaceId;

fn director(label: &str) -> CausalReason {
    CausalReason::Director(label.to_owned())
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

/// Propose a new arc. Returns `false` at the concurrency cap or when every
/// kind is already running.
pub fn propose_arc_activation(
    state: &KernelState,
    config: &KernelConfig,
    rng: &mut SimRng,
    buf: &mut ProposalBuffer,
) -> bool {
    let truth = &state.truth;
    let queued = buf.any(|k| {
        matches!(
            k,
            EventKind::Station {
                action: StationAction::ArcActivated { .. }
            }
        )
    });
    if queued || truth.arcs.len() >= config.max_active_threats {
        return false;
    }

    let available: Vec<ArcKind> = ArcKind::ALL
        .into_iter()
        .filter(|k| truth.arcs.iter().all(|a| a.kind != *k))
        .collect();
    let Some(&kind) = rng.pick(&available) else {
        return false;
    };
    let target = pick_target(state, kind, rng);
    let first_step_tick = truth.tick + rng.range(config.arc_first_step_min, config.arc_first_step_max);

    buf.push(
        EventKind::Station {
            action: StationAction::ArcActivated {
                kind,
                target,
                first_step_tick,
            },
        },
        &[Tag::Pressure, Tag::Telegraph],
        director("physical"),
    );
    true
}

fn pick_target(state: &KernelState, kind: ArcKind, rng: &mut SimRng) -> PlaceId {
    match kind {
        ArcKind::PowerSurge => PlaceId::Engineering,
        ArcKind::SolarFlare => PlaceId::Bridge,
        ArcKind::RadiationLeak => rng
            .pick(&[PlaceId::Core, PlaceId::Engineering])
            .copied()
            .unwrap_or(PlaceId::Core),
        ArcKind::AirScrubber | ArcKind::FireOutbreak | ArcKind::GhostSignal => {
            let mut occupied: Vec<PlaceId> = state.truth.living_crew().map(|c| c.place).collect();
            occupied.sort();
            occupied.dedup();
            rng.pick(&occupied).copied().unwrap_or(PlaceId::Engineering)
        }
    }
}

// ---------------------------------------------------------------------------
// Stepping
// ---------------------------------------------------------------------------

/// Propose the next step (or resolution) of every arc that is due.
pub fn propose_arc_steps(
    state: &KernelState,
    config: &KernelConfig,
    rng: &mut SimRng,
    buf: &mut ProposalBuffer,
) {
    let tick = state.truth.tick;
    for arc in state.truth.arcs.iter().filter(|a| tick >= a.next_tick) {
        if arc.step_index >= arc.kind.max_steps() {
            buf.push(
                EventKind::Station {
                    action: StationAction::ArcResolved { arc_id: arc.id },
                },
                &[Tag::Consequence],
                CausalReason::StateTransition {
                    from: "active".to_owned(),
                    to: "resolved".to_owned(),
                },
            );
            continue;
        }

        if arc.step_index == 0 && !state.perception.is_suppressed(arc.kind.system(), tick) {
            buf.push(
                EventKind::SystemAlert {
                    system: arc.kind.system(),
                    place: Some(arc.target),
                    message: format!("{} warning in {}", arc.kind.system().as_str().to_uppercase(), arc.target),
                },
                &[Tag::Telegraph, Tag::Pressure],
                director("arc_alert"),
            );
        }
        propose_step_effect(arc, config, buf);

        let next_tick = tick + step_gap(state, config, rng);
        buf.push(
            EventKind::Station {
                action: StationAction::ArcAdvanced {
                    arc_id: arc.id,
                    step_index: arc.step_index + 1,
                    next_tick,
                },
            },
            &[Tag::Background],
            director("arc_step"),
        );
    }
}

fn step_gap(state: &KernelState, config: &KernelConfig, rng: &mut SimRng) -> u64 {
    let pacing = &state.perception.pacing;
    let mut gap = rng.range(config.arc_step_gap_min, config.arc_step_gap_max);
    if pacing.boredom >= config.boredom_threshold {
        gap = gap.saturating_sub(config.arc_bored_speedup);
    }
    if pacing.tension >= config.tension_threshold {
        gap += config.arc_tense_slowdown;
    }
    gap.max(config.arc_step_gap_floor)
}

fn room(place: PlaceId, patch: RoomPatch, buf: &mut ProposalBuffer) {
    buf.push(
        EventKind::RoomUpdated { place, patch },
        &[Tag::Pressure],
        director("arc_step"),
    );
}

fn propose_step_effect(arc: &ThreatArc, config: &KernelConfig, buf: &mut ProposalBuffer) {
    let step = arc.step_index as usize;
    let place = arc.target;
    match arc.kind {
        ArcKind::AirScrubber => {
            let drop = [8.0, 15.0, 25.0][step.min(2)];
            room(place, RoomPatch { o2_delta: -drop, ..RoomPatch::default() }, buf);
        }
        ArcKind::FireOutbreak => {
            let patch = match step {
                0 => RoomPatch { temperature_set: Some(40.0), ..RoomPatch::default() },
                1 => RoomPatch {
                    temperature_set: Some(55.0),
                    on_fire: Some(true),
                    ..RoomPatch::default()
                },
                _ => RoomPatch { temperature_set: Some(70.0), ..RoomPatch::default() },
            };
            room(place, patch, buf);
        }
        ArcKind::RadiationLeak => {
            let rise = [4.0, 7.0, 10.0][step.min(2)];
            room(place, RoomPatch { radiation_delta: rise, ..RoomPatch::default() }, buf);
        }
        ArcKind::PowerSurge => {
            let amount = [8.0, 12.0][step.min(1)];
            buf.push(
                EventKind::Station {
                    action: StationAction::PowerSurge { amount },
                },
                &[Tag::Pressure],
                director("arc_step"),
            );
        }
        ArcKind::SolarFlare => {
            if step >= 1 {
                buf.push(
                    EventKind::Station {
                        action: StationAction::SolarFlare {
                            blackout_ticks: config.solar_flare_blackout_ticks,
                        },
                    },
                    &[Tag::Pressure, Tag::Uncertainty],
                    director("arc_step"),
                );
            }
        }
        ArcKind::GhostSignal => {
            buf.push(
                EventKind::Station {
                    action: StationAction::GhostSignal,
                },
                &[Tag::Uncertainty],
                director("arc_step"),
            );
            buf.push(
                EventKind::SensorReading(SensorReading {
                    source: ReadingSource::Sensor,
                    system: arc.kind.system(),
                    place: Some(place),
                    confidence: 0.5,
                    target: None,
                    message: format!("Unidentified signal on the {place} comm line"),
                }),
                &[Tag::Uncertainty],
                director("arc_step"),
            );
        }
    }
}
