//! Crew behaviour: schedules, movement, panic, damage, mood, yields, role
//! acts, and the commander's reset ladder.
//!
//! Everything here is a proposal against the start-of-tick state. A crew
//! member killed earlier in the same batch makes their later proposals
//! stale, and the apply pass drops them.

use tracing::debug;

use crate::config::KernelConfig;
use crate::event::{DamageCause, EventKind, IntentReason, StationAction, Tag};
use crate::kernel::KernelState;
use crate::proposal::{CausalReason, ProposalBuffer};
use crate::state::{CrewMember, ResetStage, TamperKind, Truth};
use crate::systems::beliefs::suspicion_score;
use crate::time::Window;
use crate::world::{find_path, find_path_avoiding, CrewId, PlaceId};

// ---------------------------------------------------------------------------
// Refuge
// ---------------------------------------------------------------------------

/// First non-hazardous room in safety priority order reachable from `from`
/// without crossing hazards. Falls back to any safe neighbour, then `from`.
pub fn find_safe_room(
    truth: &Truth,
    config: &KernelConfig,
    from: PlaceId,
    exclude: Option<PlaceId>,
) -> PlaceId {
    let hazardous = |p: PlaceId| truth.is_hazardous(p, config);
    for candidate in PlaceId::SAFE_PRIORITY {
        if Some(candidate) == exclude || hazardous(candidate) {
            continue;
        }
        if candidate == from || !find_path_avoiding(from, candidate, hazardous).is_empty() {
            return candidate;
        }
    }
    from.neighbors()
        .find(|p| !hazardous(*p) && Some(*p) != exclude)
        .unwrap_or(from)
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

/// Propose this tick's behaviour for every living crew member.
pub fn propose_crew(state: &KernelState, config: &KernelConfig, buf: &mut ProposalBuffer) {
    for member in state.truth.living_crew() {
        propose_member(state, config, member, buf);
    }
}

fn propose_member(
    state: &KernelState,
    config: &KernelConfig,
    member: &CrewMember,
    buf: &mut ProposalBuffer,
) {
    let truth = &state.truth;
    let tick = truth.tick;
    let id = member.id;
    let Some(room) = truth.rooms.get(&member.place) else {
        return;
    };
    let here_hazardous = room.is_hazardous(config.radiation_hazard_threshold);
    let behaviour = CausalReason::CrewBehaviour(id);

    // -- damage ---------------------------------------------------------------
    let damage = |cause: DamageCause, amount: i32, buf: &mut ProposalBuffer| {
        buf.push(
            EventKind::NpcDamage {
                crew: id,
                place: member.place,
                amount,
                cause,
                attacker: None,
            },
            &[Tag::Consequence],
            CausalReason::GameRule(format!("{cause:?}").to_lowercase()),
        );
    };
    if (room.vented || room.o2 < config.suffocation_o2) && tick % 3 == 0 {
        damage(DamageCause::Suffocation, config.damage_suffocation, buf);
    }
    if (room.on_fire || room.temperature > config.burn_temperature) && tick % 3 == 0 {
        damage(DamageCause::Burn, config.damage_burn, buf);
    }
    if room.radiation > config.radiation_sickness && tick % 6 == 0 {
        damage(DamageCause::Radiation, config.damage_radiation, buf);
    }

    // -- mood -----------------------------------------------------------------
    let alone = truth.crew_in(member.place).len() == 1;
    let mut stress_delta = 0;
    if alone {
        stress_delta += config.stress_isolation;
    }
    if truth.station.blackout_ticks > 0 {
        stress_delta += config.stress_blackout;
    }
    if truth.reset_countdown.is_some() {
        stress_delta += config.stress_reset_countdown;
    }
    if stress_delta == 0 && room.is_comfortable() {
        stress_delta -= config.stress_safe_decay;
    }
    let paranoia_delta = i32::from(member.stress > config.stress_paranoia_threshold);
    let loyalty_delta = if truth.reset_stage >= ResetStage::Meeting
        && member.stress > config.stage_loyalty_stress
        && tick % config.stage_loyalty_interval == 0
    {
        -config.stage_loyalty_drop
    } else {
        0
    };
    let stress_delta = if member.stress + stress_delta < 0 { 0 } else { stress_delta };
    if stress_delta != 0 || paranoia_delta != 0 || loyalty_delta != 0 {
        buf.push(
            EventKind::CrewMood {
                crew: id,
                stress_delta,
                paranoia_delta,
                loyalty_delta,
            },
            &[Tag::Background],
            behaviour.clone(),
        );
    }

    // -- panic ----------------------------------------------------------------
    let mut panicking = member.is_panicking(tick);
    let mut target = member.target;
    if here_hazardous && !panicking {
        let refuge = find_safe_room(truth, config, member.place, None);
        if refuge != member.place {
            buf.push(
                EventKind::CrewIntent {
                    crew: id,
                    target: refuge,
                    reason: IntentReason::Panic,
                    panic_until: Some(tick + config.panic_ticks),
                },
                &[Tag::Reaction],
                behaviour.clone(),
            );
            panicking = true;
            target = Some(refuge);
        }
    }

    // -- role acts --------------------------------------------------------------
    if !panicking && tick >= member.next_role_tick {
        propose_role_act(state, config, member, buf);
    }

    // -- destination ----------------------------------------------------------
    let meeting = meeting_in_session(state);
    if !panicking && !member.is_under_order(tick) {
        let (desired, reason) = if let Some(post) = response_duty(state, id) {
            (post, IntentReason::Respond)
        } else if meeting {
            (PlaceId::Mess, IntentReason::Meeting)
        } else {
            (id.scheduled_place(truth.window), IntentReason::Schedule)
        };
        let blocked = desired != member.place && truth.is_hazardous(desired, config);
        if target != Some(desired) && !blocked {
            buf.push(
                EventKind::CrewIntent {
                    crew: id,
                    target: desired,
                    reason,
                    panic_until: None,
                },
                &[Tag::Background],
                behaviour.clone(),
            );
            target = Some(desired);
        }
    }

    // -- movement -------------------------------------------------------------
    if let Some(dest) = target.filter(|d| *d != member.place) {
        if tick >= member.next_move_tick {
            let hazardous = |p: PlaceId| truth.is_hazardous(p, config);
            let mut path = find_path_avoiding(member.place, dest, hazardous);
            if path.is_empty() {
                path = find_path(member.place, dest);
            }
            if let Some(&next) = path.first() {
                if hazardous(next) && !here_hazardous {
                    debug!(crew = %id, next = %next, "holding at the door of a hazardous room");
                } else {
                    buf.push(
                        EventKind::NpcMove {
                            crew: id,
                            from: member.place,
                            to: next,
                        },
                        &[Tag::Background],
                        behaviour.clone(),
                    );
                }
            }
        }
    }

    // -- yield ----------------------------------------------------------------
    if id.can_extract()
        && member.place == PlaceId::Mines
        && !here_hazardous
        && !meeting
        && tick > 0
        && tick % config.yield_interval == 0
    {
        buf.push(
            EventKind::CargoYield {
                crew: id,
                place: PlaceId::Mines,
                amount: 1,
            },
            &[Tag::Background],
            behaviour,
        );
    }
}

/// Whether the crew is currently assembled for a reset meeting.
pub fn meeting_in_session(state: &KernelState) -> bool {
    state.truth.reset_stage == ResetStage::Meeting
        && state
            .perception
            .pacing
            .meeting_until
            .is_some_and(|until| state.truth.tick < until)
}

/// Post a crew member must answer: a live spoofed alarm or an unsuppressed
/// real emergency on a system they are responsible for.
fn response_duty(state: &KernelState, id: CrewId) -> Option<PlaceId> {
    let tick = state.truth.tick;
    let spoofed = state.perception.tamper_ops.iter().filter_map(|op| match op.kind {
        TamperKind::Spoof { system, .. } if op.status.is_pending() => Some(system),
        _ => None,
    });
    let real = state
        .truth
        .arcs
        .iter()
        .filter(|arc| arc.step_index >= 1)
        .map(|arc| arc.kind.system())
        .filter(|system| !state.perception.is_suppressed(*system, tick));

    spoofed
        .chain(real)
        .filter(|system| system.responder() == Some(id))
        .find_map(|system| system.response_places().first().copied())
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

fn cooldown(buf: &mut ProposalBuffer, crew: CrewId, until: u64) {
    buf.push(
        EventKind::RoleCooldown { crew, until },
        &[Tag::Background],
        CausalReason::Timer("role_cooldown".to_owned()),
    );
}

fn propose_role_act(
    state: &KernelState,
    config: &KernelConfig,
    member: &CrewMember,
    buf: &mut ProposalBuffer,
) {
    let truth = &state.truth;
    let tick = truth.tick;
    let id = member.id;
    let behaviour = CausalReason::CrewBehaviour(id);
    let roommates: Vec<CrewId> = truth
        .crew_in(member.place)
        .into_iter()
        .filter(|c| *c != id)
        .collect();

    match id {
        CrewId::Commander => propose_reset_ladder(state, config, buf),

        CrewId::Engineer => {
            if member.place == PlaceId::Engineering
                && (member.stress >= config.engineer_sabotage_stress
                    || member.loyalty <= config.sabotage_loyalty_threshold)
            {
                buf.push(
                    EventKind::Station {
                        action: StationAction::SabotagePower {
                            amount: config.engineer_sabotage_power_hit,
                        },
                    },
                    &[Tag::Reaction, Tag::Pressure],
                    behaviour,
                );
                cooldown(buf, id, tick + config.engineer_sabotage_cooldown);
            }
        }

        CrewId::Doctor => {
            if member.place == PlaceId::Medbay
                && member.stress >= config.doctor_sedate_stress
                && !roommates.is_empty()
            {
                buf.push(
                    EventKind::Station {
                        action: StationAction::Sedate {
                            place: PlaceId::Medbay,
                            stress_delta: config.doctor_sedate_stress_delta,
                            loyalty_delta: config.doctor_sedate_loyalty_delta,
                        },
                    },
                    &[Tag::Reaction],
                    behaviour,
                );
                cooldown(buf, id, tick + config.doctor_sedate_cooldown);
            }
        }

        CrewId::Roughneck => {
            let agitated = member.stress >= config.roughneck_violence_stress
                || member.paranoia >= config.roughneck_violence_paranoia;
            if !agitated {
                return;
            }
            let Some(belief) = state.perception.beliefs.get(&id) else {
                return;
            };
            let victim = roommates
                .iter()
                .copied()
                .max_by(|a, b| belief.grudge(*a).total_cmp(&belief.grudge(*b)).then(b.cmp(a)));
            if let Some(victim) = victim {
                buf.push(
                    EventKind::NpcDamage {
                        crew: victim,
                        place: member.place,
                        amount: config.roughneck_violence_damage,
                        cause: DamageCause::Assault,
                        attacker: Some(id),
                    },
                    &[Tag::Consequence, Tag::Reaction],
                    behaviour,
                );
                cooldown(buf, id, tick + config.roughneck_violence_cooldown);
            }
        }

        CrewId::Specialist => {
            let behind = f64::from(truth.station.day_cargo)
                < f64::from(config.quota_per_day) * config.specialist_sacrifice_quota_ratio;
            if member.place != PlaceId::Mines || truth.window != Window::Shift || !behind {
                return;
            }
            let victim = roommates.iter().copied().min_by_key(|c| {
                truth.crew.get(c).map_or(i32::MAX, |m| m.loyalty)
            });
            if let Some(victim) = victim {
                buf.push(
                    EventKind::NpcDamage {
                        crew: victim,
                        place: PlaceId::Mines,
                        amount: config.specialist_sacrifice_damage,
                        cause: DamageCause::Accident,
                        attacker: Some(id),
                    },
                    &[Tag::Consequence],
                    behaviour.clone(),
                );
                buf.push(
                    EventKind::CargoYield {
                        crew: id,
                        place: PlaceId::Mines,
                        amount: config.specialist_sacrifice_yield,
                    },
                    &[Tag::Background],
                    behaviour,
                );
                cooldown(buf, id, tick + config.specialist_sacrifice_cooldown);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reset ladder
// ---------------------------------------------------------------------------

/// Mean unresolved doubt severity per living crew member.
pub fn avg_doubt_burden(state: &KernelState) -> f64 {
    let living = state.truth.living_crew().count();
    if living == 0 {
        return 0.0;
    }
    let total: u32 = state
        .perception
        .unresolved_doubts()
        .map(|d| u32::from(d.severity))
        .sum();
    f64::from(total) / living as f64
}

/// The commander's read of the crew mood.
pub fn effective_suspicion(state: &KernelState, config: &KernelConfig) -> f64 {
    suspicion_score(state, config) + avg_doubt_burden(state) * config.reset_doubt_weight
}

/// Next ladder stage for an effective suspicion, if it changes.
pub fn next_reset_stage(stage: ResetStage, effective: f64, config: &KernelConfig) -> Option<ResetStage> {
    let next = match stage {
        ResetStage::Countdown => return None,
        _ if effective < config.reset_deescalation_threshold && stage != ResetStage::None => {
            ResetStage::None
        }
        ResetStage::None if effective >= config.reset_threshold_whispers => ResetStage::Whispers,
        ResetStage::Whispers if effective >= config.reset_threshold_meeting => ResetStage::Meeting,
        ResetStage::Meeting if effective >= config.reset_threshold_restrictions => {
            ResetStage::Restrictions
        }
        ResetStage::Restrictions if effective >= config.reset_threshold_countdown => {
            ResetStage::Countdown
        }
        _ => return None,
    };
    Some(next)
}

fn propose_reset_ladder(state: &KernelState, config: &KernelConfig, buf: &mut ProposalBuffer) {
    let truth = &state.truth;
    let effective = effective_suspicion(state, config);
    let Some(to) = next_reset_stage(truth.reset_stage, effective, config) else {
        return;
    };
    let from = truth.reset_stage;
    buf.push(
        EventKind::Station {
            action: StationAction::ResetStage { from, to },
        },
        &[Tag::Pressure, Tag::Telegraph],
        CausalReason::StateTransition {
            from: from.as_str().to_owned(),
            to: to.as_str().to_owned(),
        },
    );
    if to == ResetStage::Countdown {
        buf.push(
            EventKind::Station {
                action: StationAction::ResetWarning {
                    countdown: config.reset_countdown_ticks,
                },
            },
            &[Tag::Pressure, Tag::Telegraph],
            CausalReason::CrewBehaviour(CrewId::Commander),
        );
    }
    cooldown(buf, CrewId::Commander, truth.tick + config.commander_reset_cooldown);
}
