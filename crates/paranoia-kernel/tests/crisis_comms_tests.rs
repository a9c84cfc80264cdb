//! Integration tests for ANNOUNCE and DOWNPLAY.

use paranoia_kernel::prelude::*;
use paranoia_kernel::state::{ArcKind, ThreatArc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn quiet_kernel() -> Kernel {
    let config = KernelConfig {
        threat_activation_chance: 0,
        boredom_threshold: u32::MAX,
        ..KernelConfig::default()
    };
    let mut kernel = Kernel::new(21, config).unwrap();
    for member in kernel.state_mut().truth.crew.values_mut() {
        member.next_move_tick = u64::MAX;
        member.next_role_tick = u64::MAX;
    }
    kernel
}

/// Plant a dormant arc that will not step on its own during the test.
fn plant_arc(kernel: &mut Kernel, kind: ArcKind, target: PlaceId) -> u64 {
    let state = kernel.state_mut();
    let id = state.alloc_id();
    state.truth.arcs.push(ThreatArc {
        id,
        kind,
        step_index: 0,
        next_tick: u64::MAX,
        target,
        started_tick: 0,
    });
    id
}

fn ledger_deltas(kernel: &Kernel, reason: LedgerReason) -> Vec<f64> {
    kernel
        .state()
        .perception
        .ledger
        .iter()
        .filter(|e| e.reason == reason)
        .map(|e| e.delta)
        .collect()
}

// ---------------------------------------------------------------------------
// ANNOUNCE
// ---------------------------------------------------------------------------

#[test]
fn announce_without_a_crisis_is_dropped() {
    let mut kernel = quiet_kernel();
    let out = kernel.step(&[Command::Announce {
        system: StationSystem::Thermal,
    }]);
    assert_eq!(out.dropped.len(), 1);
    assert!(kernel.state().perception.crisis_ops.is_empty());
}

#[test]
fn announce_spikes_stress_and_earns_trust() {
    let mut kernel = quiet_kernel();
    let arc_id = plant_arc(&mut kernel, ArcKind::FireOutbreak, PlaceId::Engineering);
    let stress_before = kernel.state().truth.crew[&CrewId::Doctor].stress;

    let out = kernel.step(&[Command::Announce {
        system: StationSystem::Thermal,
    }]);
    assert!(out.dropped.is_empty());

    let stress_after = kernel.state().truth.crew[&CrewId::Doctor].stress;
    assert!(
        stress_after >= stress_before + kernel.config().announce_stress_spike - 1,
        "stress went {stress_before} -> {stress_after}"
    );
    assert_eq!(
        ledger_deltas(&kernel, LedgerReason::AnnounceCrisis),
        vec![kernel.config().suspicion_announce]
    );

    let op = &kernel.state().perception.crisis_ops[0];
    assert_eq!(op.kind, CrisisKind::Announce);
    assert_eq!(op.arc_id, arc_id);
    assert_eq!(op.status, CrisisStatus::Pending);
}

#[test]
fn announce_evacuates_the_target_room() {
    let mut kernel = quiet_kernel();
    plant_arc(&mut kernel, ArcKind::FireOutbreak, PlaceId::Engineering);
    let out = kernel.step(&[Command::Announce {
        system: StationSystem::Thermal,
    }]);
    let evacuating = out.events.iter().any(|e| {
        matches!(
            e.kind,
            EventKind::CrewIntent {
                crew: CrewId::Engineer,
                reason: paranoia_kernel::event::IntentReason::Evacuate,
                ..
            }
        )
    });
    assert!(evacuating);
    assert_ne!(kernel.state().truth.crew[&CrewId::Engineer].target, Some(PlaceId::Engineering));
}

#[test]
fn one_crisis_is_communicated_once() {
    let mut kernel = quiet_kernel();
    plant_arc(&mut kernel, ArcKind::RadiationLeak, PlaceId::Mines);
    let out = kernel.step(&[
        Command::Announce {
            system: StationSystem::Radiation,
        },
        Command::Downplay {
            system: StationSystem::Radiation,
        },
    ]);
    assert_eq!(out.dropped.len(), 1, "same-tick downplay must be dropped");

    let out = kernel.step(&[Command::Announce {
        system: StationSystem::Radiation,
    }]);
    assert_eq!(out.dropped.len(), 1, "pending announcement blocks a repeat");
    assert_eq!(kernel.state().perception.crisis_ops.len(), 1);
}

#[test]
fn announcement_is_vindicated_when_the_arc_ends() {
    let mut kernel = quiet_kernel();
    plant_arc(&mut kernel, ArcKind::AirScrubber, PlaceId::Mess);
    kernel.step(&[Command::Announce {
        system: StationSystem::Air,
    }]);
    kernel.state_mut().truth.arcs.clear();

    let out = kernel.step(&[]);
    assert!(out
        .events
        .iter()
        .any(|e| matches!(e.kind, EventKind::CrisisVindicated { .. })));
    assert!(matches!(
        kernel.state().perception.crisis_ops[0].status,
        CrisisStatus::Vindicated { .. }
    ));
    // The arc never got past its first step, so no bonus.
    assert!(ledger_deltas(&kernel, LedgerReason::AnnounceVindicated).is_empty());
}

// ---------------------------------------------------------------------------
// DOWNPLAY
// ---------------------------------------------------------------------------

#[test]
fn downplay_backfires_when_crew_are_hurt_in_the_room() {
    let mut kernel = quiet_kernel();
    plant_arc(&mut kernel, ArcKind::FireOutbreak, PlaceId::Engineering);
    kernel
        .state_mut()
        .truth
        .rooms
        .get_mut(&PlaceId::Engineering)
        .unwrap()
        .on_fire = true;

    kernel.step(&[Command::Downplay {
        system: StationSystem::Thermal,
    }]);
    kernel.run_ticks(3);

    let config = kernel.config().clone();
    assert_eq!(
        ledger_deltas(&kernel, LedgerReason::DownplayCrisis),
        vec![config.suspicion_downplay]
    );
    assert_eq!(
        ledger_deltas(&kernel, LedgerReason::DownplayBackfire),
        vec![config.downplay_backfire_base + config.downplay_backfire_injury_bonus]
    );
    let op = &kernel.state().perception.crisis_ops[0];
    assert!(matches!(op.status, CrisisStatus::Backfired { .. }));
    assert_eq!(op.crew_affected, vec![CrewId::Engineer]);
}

#[test]
fn quiet_downplay_expires_after_its_window() {
    let mut kernel = quiet_kernel();
    plant_arc(&mut kernel, ArcKind::PowerSurge, PlaceId::Core);
    kernel.step(&[Command::Downplay {
        system: StationSystem::Power,
    }]);
    let window = kernel.config().downplay_backfire_window;
    kernel.run_ticks(window + 1);

    assert!(matches!(
        kernel.state().perception.crisis_ops[0].status,
        CrisisStatus::Expired { .. }
    ));
    assert!(ledger_deltas(&kernel, LedgerReason::DownplayBackfire).is_empty());
}
