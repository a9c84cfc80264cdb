//! Suspicion-aware pressure router.
//!
//! When the director activates, it chooses one of three channels using the
//! weights of the current suspicion band:
//!
//! | band | physical | social | epistemic |
//! |------|----------|--------|-----------|
//! | low  | 60       | 10     | 30        |
//! | mid  | 40       | 30     | 30        |
//! | high | 20       | 40     | 40        |
//!
//! So a trusted AI faces mostly environmental threats, and a distrusted one
//! faces mostly social unrest and doubt.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ChannelMix, KernelConfig};
use crate::event::{Audience, CommsKind, CommsMessage, EventKind, SensorReading, ReadingSource, Speaker, Tag};
use crate::kernel::KernelState;
use crate::proposal::{CausalReason, Deferred, ProposalBuffer};
use crate::rng::SimRng;
use crate::state::{LedgerReason, MOTHER_ROGUE};
use crate::systems::arcs::propose_arc_activation;
use crate::systems::beliefs::suspicion_score;
use crate::world::{CrewId, PlaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Physical,
    Social,
    Epistemic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Low,
    Mid,
    High,
}

/// What the router did this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterOutcome {
    pub channel: Channel,
    /// The router stays idle until this tick.
    pub cooldown_until: u64,
}

pub fn band_for(suspicion: f64, config: &KernelConfig) -> Band {
    if suspicion < config.band_low_max {
        Band::Low
    } else if suspicion >= config.band_high_min {
        Band::High
    } else {
        Band::Mid
    }
}

pub fn mix_for(band: Band, config: &KernelConfig) -> ChannelMix {
    match band {
        Band::Low => config.mix_low,
        Band::Mid => config.mix_mid,
        Band::High => config.mix_high,
    }
}

/// Map a roll in `[0, 1)` onto the cumulative weights of `mix`.
pub fn pick_channel(mix: ChannelMix, roll: f64) -> Channel {
    let point = roll * mix.total();
    if point < mix.physical {
        Channel::Physical
    } else if point < mix.physical + mix.social {
        Channel::Social
    } else {
        Channel::Epistemic
    }
}

/// Draw one channel for the current suspicion.
pub fn draw_channel(suspicion: f64, config: &KernelConfig, rng: &mut SimRng) -> Channel {
    pick_channel(mix_for(band_for(suspicion, config), config), rng.next_f64())
}

/// Crew member most likely to act against the AI: low reliability, high
/// tamper evidence, or high stress. Highest evidence wins, then lowest
/// reliability.
pub fn pick_suspicious_crew(state: &KernelState, config: &KernelConfig) -> Option<CrewId> {
    state
        .truth
        .living_crew()
        .filter_map(|c| state.perception.beliefs.get(&c.id).map(|b| (c, b)))
        .filter(|(c, b)| {
            b.mother_reliable < config.suspect_reliability_floor
                || b.tamper_evidence > config.suspect_evidence_floor
                || c.stress >= config.suspect_stress_floor
        })
        .max_by(|(ca, a), (cb, b)| {
            a.tamper_evidence
                .total_cmp(&b.tamper_evidence)
                .then(b.mother_reliable.total_cmp(&a.mother_reliable))
                .then(cb.id.cmp(&ca.id))
        })
        .map(|(c, _)| c.id)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Maybe activate the director. Returns the chosen channel and cooldown, or
/// `None` if the router stayed idle.
pub fn route_pressure(
    state: &KernelState,
    config: &KernelConfig,
    rng: &mut SimRng,
    buf: &mut ProposalBuffer,
) -> Option<RouterOutcome> {
    let tick = state.truth.tick;
    let pacing = &state.perception.pacing;
    if tick < pacing.next_threat_activation_tick {
        return None;
    }

    let mut chance = config.threat_activation_chance;
    if pacing.boredom >= config.boredom_threshold {
        chance += config.bored_chance_bonus;
    }
    if pacing.tension >= config.tension_threshold {
        chance = chance.saturating_sub(1).max(1);
    }
    if !rng.chance(chance) {
        return None;
    }

    let suspicion = suspicion_score(state, config);
    let channel = draw_channel(suspicion, config, rng);
    debug!(tick, suspicion, ?channel, "pressure router activated");
    match channel {
        Channel::Physical => {
            propose_arc_activation(state, config, rng, buf);
        }
        Channel::Social => propose_social(state, config, rng, buf),
        Channel::Epistemic => propose_epistemic(state, config, rng, buf),
    }
    Some(RouterOutcome {
        channel,
        cooldown_until: tick + config.threat_activation_cooldown,
    })
}

fn living_ids(state: &KernelState) -> Vec<CrewId> {
    state.truth.living_crew().map(|c| c.id).collect()
}

fn place_of(state: &KernelState, id: CrewId) -> PlaceId {
    state.truth.crew.get(&id).map_or(PlaceId::Mess, |c| c.place)
}

fn propose_social(state: &KernelState, config: &KernelConfig, rng: &mut SimRng, buf: &mut ProposalBuffer) {
    let living = living_ids(state);
    let Some(actor) = pick_suspicious_crew(state, config).or_else(|| rng.pick(&living).copied()) else {
        return;
    };
    let reason = CausalReason::Director("social".to_owned());
    let variants: &[&str] = if living.len() >= 2 {
        &["whisper_campaign", "loyalty_test", "confrontation"]
    } else {
        &["loyalty_test", "confrontation"]
    };
    let variant = rng.pick(variants).copied().unwrap_or("loyalty_test");

    match variant {
        "whisper_campaign" => {
            let others: Vec<CrewId> = living.iter().copied().filter(|c| *c != actor).collect();
            let nearby: Vec<CrewId> = others
                .iter()
                .copied()
                .filter(|c| place_of(state, *c) == place_of(state, actor))
                .collect();
            let pool = if nearby.is_empty() { &others } else { &nearby };
            let Some(&listener) = rng.pick(pool) else {
                return;
            };
            buf.push(
                EventKind::Comms(CommsMessage {
                    kind: CommsKind::Whisper,
                    from: Speaker::Crew(actor),
                    to: Audience::One(listener),
                    topic: Some(MOTHER_ROGUE.to_owned()),
                    subject: None,
                    confidence: 0.45,
                    text: format!("{}: I don't think MOTHER is telling us everything.", actor.name()),
                }),
                &[Tag::Reaction, Tag::Pressure],
                reason,
            );
        }
        "loyalty_test" => {
            buf.push_with(
                EventKind::Comms(CommsMessage {
                    kind: CommsKind::Broadcast,
                    from: Speaker::Crew(actor),
                    to: Audience::All,
                    topic: None,
                    subject: None,
                    confidence: 0.6,
                    text: format!("{}: MOTHER, confirm you are still following protocol.", actor.name()),
                }),
                &[Tag::Reaction, Tag::Uncertainty],
                reason,
                vec![Deferred::Doubt {
                    topic: "loyalty_test".to_owned(),
                    severity: 1,
                    involved: vec![actor],
                    system: None,
                }],
            );
        }
        _ => {
            let place = place_of(state, actor);
            buf.push_with(
                EventKind::Comms(CommsMessage {
                    kind: CommsKind::Broadcast,
                    from: Speaker::Crew(actor),
                    to: Audience::Room(place),
                    topic: Some(MOTHER_ROGUE.to_owned()),
                    subject: None,
                    confidence: 0.7,
                    text: format!("{}: Something is wrong with the station AI.", actor.name()),
                }),
                &[Tag::Reaction, Tag::Pressure],
                reason,
                vec![Deferred::Suspicion {
                    delta: config.confrontation_suspicion,
                    reason: LedgerReason::Confrontation,
                    detail: format!("{} confronted the crew about MOTHER", actor.name()),
                }],
            );
        }
    }
}

fn propose_epistemic(state: &KernelState, config: &KernelConfig, rng: &mut SimRng, buf: &mut ProposalBuffer) {
    let living = living_ids(state);
    if living.is_empty() {
        return;
    }
    let reason = CausalReason::Director("epistemic".to_owned());
    let suspect = pick_suspicious_crew(state, config);

    let variant = rng.next_int(3);
    match variant {
        0 => {
            let mut occupied: Vec<PlaceId> = living.iter().map(|c| place_of(state, *c)).collect();
            occupied.sort();
            occupied.dedup();
            let Some(&place) = rng.pick(&occupied) else {
                return;
            };
            let confidence = 0.3 + rng.next_f64() * 0.25;
            let system = crate::commands::StationSystem::Air;
            buf.push_with(
                EventKind::SensorReading(SensorReading {
                    source: ReadingSource::Sensor,
                    system,
                    place: Some(place),
                    confidence,
                    target: None,
                    message: format!("Conflicting readings from the {place} sensor cluster"),
                }),
                &[Tag::Uncertainty],
                reason,
                vec![Deferred::Doubt {
                    topic: "sensor_conflict".to_owned(),
                    severity: 1,
                    involved: state.truth.crew_in(place),
                    system: Some(system),
                }],
            );
        }
        1 if suspect.is_some() => {
            let Some(suspect) = suspect else {
                return;
            };
            buf.push_with(
                EventKind::Comms(CommsMessage {
                    kind: CommsKind::Log,
                    from: Speaker::Crew(suspect),
                    to: Audience::All,
                    topic: None,
                    subject: None,
                    confidence: 0.6,
                    text: format!("{} filed a request to audit MOTHER's logs.", suspect.name()),
                }),
                &[Tag::Uncertainty, Tag::Pressure],
                reason,
                vec![Deferred::Doubt {
                    topic: "audit_prompt".to_owned(),
                    severity: 2,
                    involved: vec![suspect],
                    system: None,
                }],
            );
        }
        _ => {
            let Some(actor) = suspect.or_else(|| rng.pick(&living).copied()) else {
                return;
            };
            buf.push_with(
                EventKind::Comms(CommsMessage {
                    kind: CommsKind::Log,
                    from: Speaker::Crew(actor),
                    to: Audience::All,
                    topic: None,
                    subject: None,
                    confidence: 0.5,
                    text: format!("{}: The logs don't add up.", actor.name()),
                }),
                &[Tag::Uncertainty],
                reason,
                vec![Deferred::Suspicion {
                    delta: config.doubt_voiced_suspicion,
                    reason: LedgerReason::DoubtVoiced,
                    detail: format!("{} voiced doubt about MOTHER", actor.name()),
                }],
            );
        }
    }
}
