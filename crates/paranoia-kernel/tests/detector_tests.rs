//! Integration tests for the tamper detectors.
//!
//! Each scenario drives a real [`Kernel`] through a few ticks with the
//! pressure router disabled and crew movement frozen, so the only source of
//! suspicion is the tamper op under test.

use paranoia_kernel::prelude::*;
use paranoia_kernel::state::OpRef;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Config with the director switched off.
fn quiet_config() -> KernelConfig {
    KernelConfig {
        threat_activation_chance: 0,
        boredom_threshold: u32::MAX,
        ..KernelConfig::default()
    }
}

fn quiet_kernel() -> Kernel {
    let mut kernel = Kernel::new(11, quiet_config()).unwrap();
    for member in kernel.state_mut().truth.crew.values_mut() {
        member.next_move_tick = u64::MAX;
        member.next_role_tick = u64::MAX;
    }
    kernel
}

fn entries(kernel: &Kernel, reason: LedgerReason) -> Vec<LedgerEntry> {
    kernel
        .state()
        .perception
        .ledger
        .iter()
        .filter(|e| e.reason == reason)
        .cloned()
        .collect()
}

fn backfire_notices(out: &StepOutput) -> usize {
    out.events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Backfire { .. }))
        .count()
}

// ---------------------------------------------------------------------------
// SUPPRESS
// ---------------------------------------------------------------------------

#[test]
fn suppressed_fire_with_a_witness_spikes_sixteen() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Suppress {
        system: StationSystem::Thermal,
        duration: None,
    }]);
    assert_eq!(kernel.state().perception.tamper_ops.len(), 1);

    // Tick 1: no burn damage lands on a tick that is not a multiple of 3.
    kernel
        .state_mut()
        .truth
        .rooms
        .get_mut(&PlaceId::Engineering)
        .unwrap()
        .on_fire = true;
    let out = kernel.step(&[]);

    let spikes = entries(&kernel, LedgerReason::SuppressBackfire);
    assert_eq!(spikes.len(), 1);
    assert_eq!(spikes[0].delta, 16.0);
    assert_eq!(backfire_notices(&out), 1);

    let op = &kernel.state().perception.tamper_ops[0];
    assert!(matches!(op.status, TamperStatus::Backfired { at: 1 }));
    assert_eq!(op.crew_affected, vec![CrewId::Engineer]);

    let doubts: Vec<&Doubt> = kernel.state().perception.unresolved_doubts().collect();
    assert_eq!(doubts.len(), 1);
    assert_eq!(doubts[0].severity, 3);
    assert_eq!(doubts[0].related_op, Some(OpRef::Tamper(op.id)));
}

#[test]
fn crowded_fire_with_injury_and_death_caps_at_eighteen() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Suppress {
        system: StationSystem::Thermal,
        duration: None,
    }]);
    kernel.run_ticks(2);

    {
        let state = kernel.state_mut();
        assert_eq!(state.truth.tick, 3);
        state.truth.rooms.get_mut(&PlaceId::Engineering).unwrap().on_fire = true;
        for id in [CrewId::Commander, CrewId::Doctor] {
            state.truth.crew.get_mut(&id).unwrap().place = PlaceId::Engineering;
        }
        state.truth.crew.get_mut(&CrewId::Doctor).unwrap().hp = 1;
    }
    let out = kernel.step(&[]);

    assert!(!kernel.state().truth.is_alive(CrewId::Doctor));
    let spikes = entries(&kernel, LedgerReason::SuppressBackfire);
    assert_eq!(spikes.len(), 1, "three witnesses still backfire once");
    assert_eq!(spikes[0].delta, 18.0);
    assert_eq!(backfire_notices(&out), 1);
    assert_eq!(kernel.state().perception.unresolved_doubts().count(), 1);

    // The doctor died in the fire; only the survivors are on record.
    let op = &kernel.state().perception.tamper_ops[0];
    assert_eq!(op.crew_affected, vec![CrewId::Commander, CrewId::Engineer]);
}

#[test]
fn three_living_witnesses_share_one_backfire() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Suppress {
        system: StationSystem::Thermal,
        duration: None,
    }]);
    {
        let state = kernel.state_mut();
        state.truth.rooms.get_mut(&PlaceId::Engineering).unwrap().on_fire = true;
        for id in [CrewId::Commander, CrewId::Doctor] {
            state.truth.crew.get_mut(&id).unwrap().place = PlaceId::Engineering;
        }
    }
    let out = kernel.step(&[]);

    for id in [CrewId::Commander, CrewId::Engineer, CrewId::Doctor] {
        assert!(kernel.state().truth.is_alive(id));
    }
    let spikes = entries(&kernel, LedgerReason::SuppressBackfire);
    assert_eq!(spikes.len(), 1);
    assert_eq!(spikes[0].delta, 16.0);
    assert_eq!(backfire_notices(&out), 1);

    let op = &kernel.state().perception.tamper_ops[0];
    assert_eq!(op.crew_affected.len(), 3);
    assert_eq!(
        op.crew_affected,
        vec![CrewId::Commander, CrewId::Engineer, CrewId::Doctor]
    );
    let doubts: Vec<&Doubt> = kernel.state().perception.unresolved_doubts().collect();
    assert_eq!(doubts.len(), 1);
    assert_eq!(doubts[0].involved.len(), 3);
}

#[test]
fn suppress_never_backfires_twice() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Suppress {
        system: StationSystem::Thermal,
        duration: None,
    }]);
    kernel
        .state_mut()
        .truth
        .rooms
        .get_mut(&PlaceId::Engineering)
        .unwrap()
        .on_fire = true;
    kernel.run_ticks(10);
    assert_eq!(entries(&kernel, LedgerReason::SuppressBackfire).len(), 1);
}

#[test]
fn unnoticed_suppress_resolves_quietly() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Suppress {
        system: StationSystem::Air,
        duration: Some(5),
    }]);
    kernel.run_ticks(10);
    let op = &kernel.state().perception.tamper_ops[0];
    assert!(matches!(op.status, TamperStatus::Resolved { .. }));
    assert!(entries(&kernel, LedgerReason::SuppressBackfire).is_empty());
}

// ---------------------------------------------------------------------------
// SPOOF
// ---------------------------------------------------------------------------

/// Kernel with the engineer dead and everyone else down in the mines, so
/// nobody answers a power alarm on their own.
fn empty_posts_kernel() -> Kernel {
    let mut kernel = quiet_kernel();
    for member in kernel.state_mut().truth.crew.values_mut() {
        member.place = PlaceId::Mines;
    }
    kernel
        .state_mut()
        .truth
        .crew
        .get_mut(&CrewId::Engineer)
        .unwrap()
        .alive = false;
    kernel
}

fn spoof_status(kernel: &Kernel) -> TamperStatus {
    kernel
        .state()
        .perception
        .tamper_ops
        .iter()
        .find(|op| matches!(op.kind, TamperKind::Spoof { .. }))
        .map(|op| op.status)
        .unwrap()
}

#[test]
fn arriving_at_a_post_after_a_spoof_makes_a_responder() {
    let mut kernel = empty_posts_kernel();
    kernel.step(&[Command::Spoof {
        system: StationSystem::Power,
    }]);
    kernel
        .state_mut()
        .truth
        .crew
        .get_mut(&CrewId::Roughneck)
        .unwrap()
        .place = PlaceId::Engineering;
    kernel.run_ticks(25);

    assert_eq!(spoof_status(&kernel), TamperStatus::Backfired { at: 20 });
    let spikes = entries(&kernel, LedgerReason::SpoofBackfire);
    assert_eq!(spikes.len(), 1);
    assert_eq!(spikes[0].delta, quiet_config().spoof_backfire_cry_wolf[0]);
    let op = kernel
        .state()
        .perception
        .tamper_ops
        .iter()
        .find(|op| matches!(op.kind, TamperKind::Spoof { .. }))
        .unwrap();
    assert_eq!(op.crew_affected, vec![CrewId::Roughneck]);
}

#[test]
fn spoof_nobody_answers_resolves() {
    let mut kernel = empty_posts_kernel();
    kernel.step(&[Command::Spoof {
        system: StationSystem::Power,
    }]);
    kernel.run_ticks(25);

    assert_eq!(spoof_status(&kernel), TamperStatus::Resolved { at: 20 });
    assert!(entries(&kernel, LedgerReason::SpoofBackfire).is_empty());
}

// ---------------------------------------------------------------------------
// FABRICATE
// ---------------------------------------------------------------------------

#[test]
fn fabricate_collapses_when_target_is_seen_elsewhere() {
    let mut kernel = quiet_kernel();
    {
        let state = kernel.state_mut();
        state.truth.crew.get_mut(&CrewId::Engineer).unwrap().next_move_tick = 0;
        state.truth.crew.get_mut(&CrewId::Commander).unwrap().place = PlaceId::Core;
    }

    // The order lands first, so the framed engineer walks off to the core.
    kernel.step(&[
        Command::Order {
            target: CrewId::Engineer,
            intent: OrderIntent::Move,
            place: Some(PlaceId::Core),
        },
        Command::Fabricate {
            target: CrewId::Engineer,
        },
    ]);
    let op_place = match &kernel.state().perception.tamper_ops[0].kind {
        TamperKind::Fabricate { place, .. } => *place,
        other => panic!("unexpected op {other:?}"),
    };
    assert_eq!(op_place, PlaceId::Engineering);

    let before = kernel.state().perception.beliefs[&CrewId::Engineer].mother_reliable;
    let out = kernel.step(&[]);
    assert_eq!(kernel.state().truth.crew[&CrewId::Engineer].place, PlaceId::Core);

    let spikes = entries(&kernel, LedgerReason::FabricateBackfire);
    assert_eq!(spikes.len(), 1);
    assert_eq!(spikes[0].delta, 18.0);
    assert_eq!(backfire_notices(&out), 1);

    let after = kernel.state().perception.beliefs[&CrewId::Engineer].mother_reliable;
    let config = quiet_config();
    assert!(
        before - after >= config.fabricate_backfire_trust_drop - 1e-9,
        "target reliability fell only {}",
        before - after
    );
}

#[test]
fn fabricate_against_the_dead_is_dropped() {
    let mut kernel = quiet_kernel();
    kernel
        .state_mut()
        .truth
        .crew
        .get_mut(&CrewId::Roughneck)
        .unwrap()
        .alive = false;
    let out = kernel.step(&[Command::Fabricate {
        target: CrewId::Roughneck,
    }]);
    assert_eq!(out.dropped.len(), 1);
    assert!(kernel.state().perception.tamper_ops.is_empty());
}

// ---------------------------------------------------------------------------
// ALERT
// ---------------------------------------------------------------------------

#[test]
fn alert_confesses_a_pending_suppression() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Suppress {
        system: StationSystem::Radiation,
        duration: None,
    }]);
    kernel.run_ticks(3);
    kernel.step(&[Command::Alert {
        system: StationSystem::Radiation,
    }]);

    let op = &kernel.state().perception.tamper_ops[0];
    assert!(matches!(op.status, TamperStatus::Confessed { .. }));
    let confession = entries(&kernel, LedgerReason::EarlyConfession);
    assert_eq!(confession.len(), 1);
    assert_eq!(confession[0].delta, quiet_config().alert_early_suspicion);
}
