//! Crew belief model and the suspicion ledger.
//!
//! Suspicion is derived, never stored: the mean over living crew of
//!
//! ```text
//! tamper_evidence / 100 × 40 + (1 − mother_reliable) × 35 + rumor(mother_rogue) × 25
//! ```
//!
//! rounded to a whole number. The three weights live in [`KernelConfig`].
//!
//! Every signed influence on it is written to the ledger by
//! [`apply_suspicion_change`], which also shifts each living crew member's
//! beliefs so the score actually moves.

use tracing::{debug, error};

use crate::config::KernelConfig;
use crate::event::{Audience, CommsKind, EventKind, ReadingSource, SimEvent, Speaker};
use crate::kernel::KernelState;
use crate::state::{clamp_range, clamp_unit, Belief, LedgerEntry, LedgerReason, RumorRecord, MOTHER_ROGUE};
use crate::time::Window;
use crate::world::CrewId;

// ---------------------------------------------------------------------------
// Suspicion
// ---------------------------------------------------------------------------

/// One crew member's contribution to suspicion, unrounded.
pub fn crew_suspicion(belief: &Belief, config: &KernelConfig) -> f64 {
    let raw = belief.tamper_evidence / 100.0 * config.suspicion_weight_tamper
        + (1.0 - belief.mother_reliable) * config.suspicion_weight_distrust
        + belief.rumor(MOTHER_ROGUE) * config.suspicion_weight_rogue;
    clamp_range(raw, 0.0, 100.0)
}

/// Rounded mean suspicion over living crew, 0–100. Zero with nobody left
/// alive.
pub fn suspicion_score(state: &KernelState, config: &KernelConfig) -> f64 {
    let mut total = 0.0;
    let mut living = 0u32;
    for member in state.truth.living_crew() {
        living += 1;
        if let Some(belief) = state.perception.beliefs.get(&member.id) {
            total += crew_suspicion(belief, config);
        }
    }
    if living == 0 {
        return 0.0;
    }
    clamp_range((total / f64::from(living)).round(), 0.0, 100.0)
}

/// Write one ledger entry and shift living crew beliefs by `delta`.
///
/// Reliability moves by `delta / suspicion_trust_scale` (200 by default);
/// spikes of at least `spike_evidence_threshold` also add `floor(delta / 2)`
/// tamper evidence. A non-finite delta is an invariant
/// violation and is recorded as zero.
pub fn apply_suspicion_change(
    state: &mut KernelState,
    config: &KernelConfig,
    delta: f64,
    reason: LedgerReason,
    detail: impl Into<String>,
) {
    let delta = if delta.is_finite() {
        delta
    } else {
        error!(reason = reason.as_str(), "non-finite suspicion delta");
        debug_assert!(delta.is_finite(), "non-finite suspicion delta for {reason:?}");
        0.0
    };

    let detail = detail.into();
    debug!(delta, reason = reason.as_str(), detail = %detail, "suspicion change");
    let ledger = &mut state.perception.ledger;
    ledger.push_back(LedgerEntry {
        tick: state.truth.tick,
        delta,
        reason,
        detail,
    });
    while ledger.len() > config.ledger_cap {
        ledger.pop_front();
    }

    if delta == 0.0 {
        return;
    }
    let evidence = if delta >= config.spike_evidence_threshold {
        (delta / 2.0).floor()
    } else {
        0.0
    };
    for member in state.truth.crew.values().filter(|c| c.alive) {
        if let Some(belief) = state.perception.beliefs.get_mut(&member.id) {
            belief.mother_reliable = clamp_unit(belief.mother_reliable - delta / config.suspicion_trust_scale);
            belief.tamper_evidence = clamp_range(belief.tamper_evidence + evidence, 0.0, 100.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Belief update
// ---------------------------------------------------------------------------

/// Fold this tick's applied events into crew beliefs, then run coupling,
/// evening rumor spread, decay, and trust recovery.
pub fn update_beliefs(state: &mut KernelState, config: &KernelConfig, events: &[SimEvent]) {
    for event in events {
        absorb_event(state, config, event);
    }
    couple_stats(state, config);
    spread_rumors(state, config);
    decay(state, config);
    clamp_all(state);
}

fn living(state: &KernelState) -> Vec<CrewId> {
    state.truth.living_crew().map(|c| c.id).collect()
}

fn absorb_event(state: &mut KernelState, config: &KernelConfig, event: &SimEvent) {
    let tick = state.truth.tick;
    match &event.kind {
        EventKind::SensorReading(reading) => {
            for id in living(state) {
                let Some(belief) = state.perception.beliefs.get_mut(&id) else {
                    continue;
                };
                match reading.source {
                    ReadingSource::Hallucination => belief.mother_reliable -= config.hallucination_trust_drop,
                    _ if reading.confidence < config.low_confidence_reading => {
                        belief.mother_reliable -= config.low_confidence_trust_drop;
                        belief.tamper_evidence += config.low_confidence_evidence;
                    }
                    ReadingSource::Sensor if reading.confidence >= config.high_confidence_reading => {
                        belief.mother_reliable += config.high_confidence_trust_gain;
                    }
                    _ => {}
                }
            }
        }

        EventKind::Comms(msg) => {
            if msg.kind == CommsKind::Order {
                return;
            }
            let speaker = match msg.from {
                Speaker::Crew(c) => Some(c),
                Speaker::Mother => None,
            };
            let receivers: Vec<CrewId> = match msg.to {
                Audience::All => living(state),
                Audience::Room(place) => state.truth.crew_in(place),
                Audience::One(c) if state.truth.is_alive(c) => vec![c],
                Audience::One(_) => Vec::new(),
            };
            for id in receivers.into_iter().filter(|id| Some(*id) != speaker) {
                let Some(belief) = state.perception.beliefs.get_mut(&id) else {
                    continue;
                };
                if let Some(topic) = &msg.topic {
                    *belief.rumors.entry(topic.clone()).or_insert(0.0) += config.rumor_gain;
                    if topic == MOTHER_ROGUE {
                        belief.mother_reliable -= config.rogue_rumor_trust_drop;
                        belief.tamper_evidence += config.rogue_rumor_evidence;
                    }
                }
                if let Some(subject) = msg.subject {
                    *belief.crew_grudge.entry(subject).or_insert(0.0) += config.whisper_grudge_impact;
                }
            }
            if let (Some(source), Some(topic)) = (speaker, &msg.topic) {
                if let Some(place) = state.truth.crew.get(&source).map(|c| c.place) {
                    state.perception.rumors.push(RumorRecord {
                        tick,
                        topic: topic.clone(),
                        source: Some(source),
                        place,
                        strength: config.overheard_rumor_strength,
                    });
                }
            }
        }

        kind if kind.is_tamper() => {
            for id in living(state) {
                if let Some(belief) = state.perception.beliefs.get_mut(&id) {
                    belief.tamper_evidence += config.tamper_evidence_gain;
                }
            }
        }

        EventKind::NpcDamage {
            crew,
            attacker: Some(attacker),
            ..
        } => {
            if let Some(belief) = state.perception.beliefs.get_mut(crew) {
                *belief.crew_grudge.entry(*attacker).or_insert(0.0) += config.assault_grudge;
            }
        }

        _ => {}
    }
}

/// Reliability and tamper evidence feed back into loyalty and paranoia.
fn couple_stats(state: &mut KernelState, config: &KernelConfig) {
    for member in state.truth.crew.values_mut().filter(|c| c.alive) {
        let Some(belief) = state.perception.beliefs.get_mut(&member.id) else {
            continue;
        };
        if belief.mother_reliable < config.low_reliability {
            member.loyalty -= 1;
        } else if belief.mother_reliable > config.high_reliability {
            member.loyalty += 1;
        }
        if belief.mother_reliable < config.paranoid_reliability {
            member.paranoia += 1;
        }
        if belief.tamper_evidence > config.tamper_evidence_threshold {
            member.loyalty -= 1;
            member.paranoia += 1;
            let rogue = belief.rumors.entry(MOTHER_ROGUE.to_owned()).or_insert(0.0);
            *rogue = rogue.max(config.tamper_rogue_rumor_floor);
        }
        member.loyalty = member.loyalty.clamp(0, 100);
        member.paranoia = member.paranoia.clamp(0, 100);
    }
}

/// During the evening, crew sharing a room with a recent rumor pick it up.
fn spread_rumors(state: &mut KernelState, config: &KernelConfig) {
    let tick = state.truth.tick;
    if state.truth.window == Window::Evening {
        let since = tick.saturating_sub(config.rumor_spread_window);
        let recent: Vec<RumorRecord> = state
            .perception
            .rumors
            .iter()
            .filter(|r| r.tick >= since)
            .cloned()
            .collect();
        for record in recent {
            for listener in state.truth.crew_in(record.place) {
                if Some(listener) == record.source {
                    continue;
                }
                if let Some(belief) = state.perception.beliefs.get_mut(&listener) {
                    *belief.rumors.entry(record.topic.clone()).or_insert(0.0) +=
                        record.strength * config.rumor_spread_factor;
                }
            }
        }
    }

    let rumors = &mut state.perception.rumors;
    if rumors.len() > config.max_rumor_records {
        let excess = rumors.len() - config.max_rumor_records;
        rumors.drain(..excess);
    }
}

fn decay(state: &mut KernelState, config: &KernelConfig) {
    let tick = state.truth.tick;
    let recover = tick > 0 && tick % config.trust_recovery_interval == 0;
    for id in living(state) {
        let Some(belief) = state.perception.beliefs.get_mut(&id) else {
            continue;
        };
        belief.tamper_evidence = (belief.tamper_evidence - config.tamper_evidence_decay).max(0.0);
        for strength in belief.rumors.values_mut() {
            *strength = (*strength - config.rumor_decay).max(0.0);
        }
        if recover && belief.tamper_evidence < config.trust_recovery_tamper_window {
            belief.mother_reliable += config.trust_recovery_amount;
        }
    }
}

fn clamp_all(state: &mut KernelState) {
    for belief in state.perception.beliefs.values_mut() {
        belief.clamp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CommsMessage, Tag};

    fn event(kind: EventKind) -> SimEvent {
        SimEvent {
            id: 0,
            tick: 0,
            kind,
            tags: vec![Tag::Reaction],
        }
    }

    #[test]
    fn fresh_crew_suspicion_is_moderate() {
        let state = KernelState::new();
        let config = KernelConfig::default();
        // (1 − 0.55) × 35 = 15.75, rounded.
        assert_eq!(suspicion_score(&state, &config), 16.0);
    }

    #[test]
    fn each_component_carries_its_weight() {
        let config = KernelConfig::default();
        let mut belief = Belief {
            mother_reliable: 1.0,
            tamper_evidence: 100.0,
            ..Belief::default()
        };
        assert_eq!(crew_suspicion(&belief, &config), 40.0);

        belief.tamper_evidence = 0.0;
        belief.mother_reliable = 0.0;
        assert_eq!(crew_suspicion(&belief, &config), 35.0);

        belief.mother_reliable = 1.0;
        belief.rumors.insert(MOTHER_ROGUE.to_owned(), 1.0);
        assert_eq!(crew_suspicion(&belief, &config), 25.0);
    }

    #[test]
    fn score_is_a_whole_number() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        state.perception.beliefs.get_mut(&CrewId::Doctor).unwrap().tamper_evidence = 13.0;
        let score = suspicion_score(&state, &config);
        assert_eq!(score, score.round());
    }

    #[test]
    fn dead_crew_do_not_count() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        state.perception.beliefs.get_mut(&CrewId::Doctor).unwrap().tamper_evidence = 100.0;
        let with_doctor = suspicion_score(&state, &config);
        state.truth.crew.get_mut(&CrewId::Doctor).unwrap().alive = false;
        assert!(suspicion_score(&state, &config) < with_doctor);

        for member in state.truth.crew.values_mut() {
            member.alive = false;
        }
        assert_eq!(suspicion_score(&state, &config), 0.0);
    }

    #[test]
    fn positive_delta_raises_score_and_writes_ledger() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        let before = suspicion_score(&state, &config);
        apply_suspicion_change(&mut state, &config, 16.0, LedgerReason::SuppressBackfire, "test");
        assert!(suspicion_score(&state, &config) > before);
        let entry = state.perception.ledger.back().unwrap();
        assert_eq!(entry.delta, 16.0);
        assert_eq!(entry.reason, LedgerReason::SuppressBackfire);
        let belief = &state.perception.beliefs[&CrewId::Commander];
        assert_eq!(belief.tamper_evidence, 8.0);
    }

    #[test]
    fn ledger_is_capped() {
        let mut state = KernelState::new();
        let config = KernelConfig {
            ledger_cap: 3,
            ..KernelConfig::default()
        };
        for i in 0..5 {
            apply_suspicion_change(&mut state, &config, -1.0, LedgerReason::VerifyTrust, format!("{i}"));
        }
        assert_eq!(state.perception.ledger.len(), 3);
        assert_eq!(state.perception.ledger.front().unwrap().detail, "2");
    }

    #[test]
    fn rogue_whisper_reaches_only_its_listener() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        let whisper = event(EventKind::Comms(CommsMessage {
            kind: CommsKind::Whisper,
            from: Speaker::Crew(CrewId::Roughneck),
            to: Audience::One(CrewId::Specialist),
            topic: Some(MOTHER_ROGUE.to_owned()),
            subject: Some(CrewId::Engineer),
            confidence: 0.45,
            text: "she's lying to us".to_owned(),
        }));
        update_beliefs(&mut state, &config, &[whisper]);

        let listener = &state.perception.beliefs[&CrewId::Specialist];
        assert!(listener.rumor(MOTHER_ROGUE) > 0.2);
        assert_eq!(listener.grudge(CrewId::Engineer), config.whisper_grudge_impact);
        assert_eq!(state.perception.beliefs[&CrewId::Doctor].rumor(MOTHER_ROGUE), 0.0);
        assert_eq!(state.perception.rumors.len(), 1);
    }

    #[test]
    fn tamper_events_add_ambient_evidence() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        let suppress = event(EventKind::TamperSuppress {
            system: crate::commands::StationSystem::Thermal,
            duration: 30,
        });
        update_beliefs(&mut state, &config, &[suppress]);
        let evidence = state.perception.beliefs[&CrewId::Doctor].tamper_evidence;
        assert!((evidence - (config.tamper_evidence_gain - config.tamper_evidence_decay)).abs() < 1e-9);
    }

    #[test]
    fn beliefs_stay_in_range_under_pressure() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        for _ in 0..50 {
            apply_suspicion_change(&mut state, &config, 25.0, LedgerReason::FabricateBackfire, "x");
            update_beliefs(&mut state, &config, &[]);
        }
        for belief in state.perception.beliefs.values() {
            assert!((0.0..=1.0).contains(&belief.mother_reliable));
            assert!((0.0..=100.0).contains(&belief.tamper_evidence));
        }
        assert!(suspicion_score(&state, &config) <= 100.0);
    }
}
