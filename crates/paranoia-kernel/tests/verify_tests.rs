//! Integration tests for VERIFY: doubt resolution order, idle credit, the
//! cooldown, the power gate, and the penalty for verifying over a live lie.

use paranoia_kernel::prelude::*;
use paranoia_kernel::state::OpRef;
use paranoia_kernel::systems::doubts::create_doubt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn quiet_kernel() -> Kernel {
    let config = KernelConfig {
        threat_activation_chance: 0,
        boredom_threshold: u32::MAX,
        ..KernelConfig::default()
    };
    let mut kernel = Kernel::new(5, config).unwrap();
    for member in kernel.state_mut().truth.crew.values_mut() {
        member.next_move_tick = u64::MAX;
        member.next_role_tick = u64::MAX;
    }
    kernel
}

fn verify_entries(kernel: &Kernel) -> Vec<f64> {
    kernel
        .state()
        .perception
        .ledger
        .iter()
        .filter(|e| e.reason == LedgerReason::VerifyTrust)
        .map(|e| e.delta)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn idle_verify_takes_the_small_credit() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Verify]);

    assert_eq!(verify_entries(&kernel), vec![kernel.config().verify_idle_drop]);
    assert_eq!(kernel.state().truth.last_verify_tick, Some(0));
}

#[test]
fn verify_resolves_the_oldest_doubt_first() {
    let mut kernel = quiet_kernel();
    let (first, second) = {
        let state = kernel.state_mut();
        let first = create_doubt(state, "why did the vents hiss", 2, vec![CrewId::Doctor], None, None);
        let second = create_doubt(state, "who opened the airlock", 1, vec![CrewId::Engineer], None, None);
        (first, second)
    };

    kernel.step(&[Command::Verify]);

    let doubts = &kernel.state().perception.doubts;
    let resolved = |id: u64| doubts.iter().find(|d| d.id == id).map(|d| d.resolved);
    assert_eq!(resolved(first), Some(true));
    assert_eq!(resolved(second), Some(false));
    assert_eq!(verify_entries(&kernel), vec![kernel.config().verify_doubt_drop]);
}

#[test]
fn verify_closes_the_linked_tamper_op() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Suppress {
        system: StationSystem::Air,
        duration: Some(200),
    }]);
    let op_id = kernel.state().perception.tamper_ops[0].id;
    create_doubt(
        kernel.state_mut(),
        "air readings look flat",
        2,
        Vec::new(),
        Some(OpRef::Tamper(op_id)),
        Some(StationSystem::Air),
    );

    kernel.step(&[Command::Verify]);
    assert!(matches!(
        kernel.state().perception.tamper_ops[0].status,
        TamperStatus::Resolved { at: 1 }
    ));
}

#[test]
fn second_verify_inside_the_cooldown_only_reports() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Verify]);
    let out = kernel.step(&[Command::Verify]);

    assert_eq!(verify_entries(&kernel).len(), 1, "cooldown verify must not credit");
    assert_eq!(out.dropped, vec![Command::Verify]);
    let cooldown = out.events.iter().any(|e| {
        matches!(
            e.kind,
            EventKind::Station {
                action: StationAction::VerifyCooldown { ready_at }
            } if ready_at == kernel.config().verify_cooldown
        )
    });
    assert!(cooldown);
}

#[test]
fn verify_is_ready_again_after_the_cooldown() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Verify]);
    let cooldown = kernel.config().verify_cooldown;
    kernel.run_ticks(cooldown - 1);
    assert_eq!(kernel.state().truth.tick, cooldown);

    kernel.step(&[Command::Verify]);
    assert_eq!(verify_entries(&kernel).len(), 2);
    assert_eq!(kernel.state().truth.last_verify_tick, Some(cooldown));
}

#[test]
fn verify_needs_station_power() {
    let mut kernel = quiet_kernel();
    kernel.state_mut().truth.station.power = 1.0;
    let out = kernel.step(&[Command::Verify]);

    assert_eq!(out.dropped, vec![Command::Verify]);
    assert!(verify_entries(&kernel).is_empty());
    assert_eq!(kernel.state().truth.last_verify_tick, None);
    let needed = kernel.config().verify_power_draw;
    assert!(out.events.iter().any(|e| matches!(
        e.kind,
        EventKind::Station {
            action: StationAction::VerifyUnpowered { needed: n, .. }
        } if n == needed
    )));
}

#[test]
fn verify_scrubs_tamper_evidence() {
    let mut kernel = quiet_kernel();
    for belief in kernel.state_mut().perception.beliefs.values_mut() {
        belief.tamper_evidence = 30.0;
    }
    kernel.step(&[Command::Verify]);

    let config = kernel.config().clone();
    let expected = 30.0 + config.verify_tamper_drop - config.tamper_evidence_decay;
    for belief in kernel.state().perception.beliefs.values() {
        assert!((belief.tamper_evidence - expected).abs() < 1e-9, "got {}", belief.tamper_evidence);
    }
}

#[test]
fn pending_tamper_blunts_verify() {
    let mut kernel = quiet_kernel();
    kernel.step(&[Command::Suppress {
        system: StationSystem::Air,
        duration: Some(200),
    }]);
    assert!(kernel.state().perception.tamper_ops[0].status.is_pending());
    for belief in kernel.state_mut().perception.beliefs.values_mut() {
        belief.tamper_evidence = 30.0;
    }
    kernel.step(&[Command::Verify]);

    let config = kernel.config().clone();
    assert_eq!(
        verify_entries(&kernel),
        vec![config.verify_idle_drop * config.verify_tamper_penalty]
    );
    let expected = 30.0 + config.verify_tamper_drop * config.verify_tamper_penalty - config.tamper_evidence_decay;
    let evidence = kernel.state().perception.beliefs[&CrewId::Doctor].tamper_evidence;
    assert!((evidence - expected).abs() < 1e-9, "got {evidence}");
}
