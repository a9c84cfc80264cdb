//! Crew doubts: creation, VERIFY resolution, spread, decay, and drip.

use tracing::debug;

use crate::commands::StationSystem;
use crate::config::KernelConfig;
use crate::kernel::KernelState;
use crate::rng::SimRng;
use crate::state::{Doubt, LedgerReason, OpRef};
use crate::systems::beliefs::apply_suspicion_change;
use crate::world::CrewId;

/// Open a new doubt and return its id.
pub fn create_doubt(
    state: &mut KernelState,
    topic: impl Into<String>,
    severity: u8,
    involved: Vec<CrewId>,
    related_op: Option<OpRef>,
    system: Option<StationSystem>,
) -> u64 {
    let id = state.alloc_id();
    let doubt = Doubt {
        id,
        topic: topic.into(),
        created_tick: state.truth.tick,
        severity: severity.clamp(1, 3),
        involved,
        related_op,
        system,
        resolved: false,
    };
    debug!(id, topic = %doubt.topic, severity = doubt.severity, "doubt opened");
    state.perception.doubts.push(doubt);
    id
}

/// Resolve the oldest unresolved doubt, returning a copy of it.
pub fn resolve_oldest(state: &mut KernelState) -> Option<Doubt> {
    let doubt = state
        .perception
        .doubts
        .iter_mut()
        .filter(|d| !d.resolved)
        .min_by_key(|d| (d.created_tick, d.id))?;
    doubt.resolved = true;
    Some(doubt.clone())
}

/// Per-tick upkeep: decay old doubts, spread open ones between roommates,
/// and drip suspicion from the unresolved total.
pub fn tick_doubts(state: &mut KernelState, config: &KernelConfig, rng: &mut SimRng) {
    decay(state, config);
    spread(state, config, rng);
    drip(state, config);
}

fn decay(state: &mut KernelState, config: &KernelConfig) {
    let tick = state.truth.tick;
    state.perception.doubts.retain(|d| {
        let age = tick.saturating_sub(d.created_tick);
        if d.resolved {
            age < config.op_retention_ticks
        } else {
            age < config.doubt_decay_ticks
        }
    });
}

fn spread(state: &mut KernelState, config: &KernelConfig, rng: &mut SimRng) {
    let tick = state.truth.tick;
    if tick == 0 || tick % config.doubt_spread_interval != 0 {
        return;
    }
    for idx in 0..state.perception.doubts.len() {
        if state.perception.doubts[idx].resolved || !rng.chance(config.doubt_spread_chance) {
            continue;
        }
        let involved = state.perception.doubts[idx].involved.clone();
        let candidates: Vec<CrewId> = state
            .truth
            .living_crew()
            .filter(|c| !involved.contains(&c.id))
            .filter(|c| {
                involved
                    .iter()
                    .filter_map(|i| state.truth.crew.get(i))
                    .any(|other| other.alive && other.place == c.place)
            })
            .map(|c| c.id)
            .collect();
        if let Some(&newcomer) = rng.pick(&candidates) {
            state.perception.doubts[idx].involved.push(newcomer);
        }
    }
}

fn drip(state: &mut KernelState, config: &KernelConfig) {
    let tick = state.truth.tick;
    if tick == 0 || tick % config.doubt_drip_interval != 0 {
        return;
    }
    let total: u32 = state
        .perception
        .unresolved_doubts()
        .map(|d| u32::from(d.severity))
        .sum();
    if total == 0 {
        return;
    }
    let delta = (f64::from(total) * config.doubt_drip_per_severity).min(config.doubt_drip_cap);
    apply_suspicion_change(
        state,
        config,
        delta,
        LedgerReason::DoubtPressure,
        format!("{total} severity of open doubts"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_takes_the_oldest_first() {
        let mut state = KernelState::new();
        state.truth.tick = 5;
        let first = create_doubt(&mut state, "a", 1, vec![], None, None);
        state.truth.tick = 6;
        let second = create_doubt(&mut state, "b", 2, vec![], None, None);

        assert_eq!(resolve_oldest(&mut state).map(|d| d.id), Some(first));
        assert_eq!(resolve_oldest(&mut state).map(|d| d.id), Some(second));
        assert!(resolve_oldest(&mut state).is_none());
    }

    #[test]
    fn unresolved_doubts_decay() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        create_doubt(&mut state, "old", 1, vec![], None, None);
        state.truth.tick = config.doubt_decay_ticks;
        decay(&mut state, &config);
        assert!(state.perception.doubts.is_empty());
    }

    #[test]
    fn drip_is_capped() {
        let mut state = KernelState::new();
        let config = KernelConfig::default();
        for _ in 0..5 {
            create_doubt(&mut state, "x", 3, vec![], None, None);
        }
        state.truth.tick = config.doubt_drip_interval;
        drip(&mut state, &config);
        let entry = state.perception.ledger.back().unwrap();
        assert_eq!(entry.reason, LedgerReason::DoubtPressure);
        assert_eq!(entry.delta, config.doubt_drip_cap);
    }

    #[test]
    fn doubts_spread_to_roommates_only() {
        let mut state = KernelState::new();
        let config = KernelConfig {
            doubt_spread_chance: 100,
            ..KernelConfig::default()
        };
        for member in state.truth.crew.values_mut() {
            member.place = crate::world::PlaceId::Dorms;
        }
        state.truth.crew.get_mut(&CrewId::Doctor).unwrap().place = crate::world::PlaceId::Medbay;
        create_doubt(&mut state, "x", 1, vec![CrewId::Commander], None, None);
        let mut rng = SimRng::new(5);
        for step in 1..=10 {
            state.truth.tick = step * config.doubt_spread_interval;
            spread(&mut state, &config, &mut rng);
        }
        let involved = &state.perception.doubts[0].involved;
        assert_eq!(involved.len(), 4);
        assert!(!involved.contains(&CrewId::Doctor));
    }
}
