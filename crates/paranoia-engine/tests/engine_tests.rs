//! Integration tests for the engine wrapper: the cycle pool, the queue, and
//! headline routing over a live kernel.

use paranoia_engine::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine_with(cycles: u32) -> Engine {
    let config = EngineConfig {
        cycles_start: cycles,
        ..EngineConfig::default()
    };
    Engine::new(42, config).unwrap()
}

// ---------------------------------------------------------------------------
// Cycle pool
// ---------------------------------------------------------------------------

#[test]
fn costs_are_spent_and_regenerated() {
    let mut engine = engine_with(50);
    engine.queue(Command::Suppress {
        system: StationSystem::Air,
        duration: None,
    });
    engine.queue(Command::Verify);
    let report = engine.tick();
    assert!(report.rejected.is_empty());
    // 5 + 3 spent, 1 regenerated.
    assert_eq!(report.cycles, 43);
}

#[test]
fn queue_is_paid_in_order_until_the_pool_runs_dry() {
    let mut engine = engine_with(12);
    let first = engine.queue(Command::Vent { place: PlaceId::Mines });
    let second = engine.queue(Command::Verify);
    let third = engine.queue(Command::Seal { place: PlaceId::Mines });

    let report = engine.tick();
    let rejected: Vec<u64> = report.rejected.iter().map(|r| r.id).collect();
    assert_eq!(rejected, vec![second, third]);
    assert!(engine.kernel().state().truth.rooms[&PlaceId::Mines].vented);
    assert_ne!(first, second);
}

#[test]
fn surcharge_applies_from_restrictions_on() {
    let mut engine = engine_with(100);
    assert_eq!(engine.cost_of(&Command::Fabricate { target: CrewId::Doctor }), 7);
    engine.kernel_mut().state_mut().truth.reset_stage = ResetStage::Restrictions;
    assert_eq!(engine.cost_of(&Command::Fabricate { target: CrewId::Doctor }), 11);
}

#[test]
fn withdrawn_command_never_runs() {
    let mut engine = engine_with(100);
    let id = engine.queue(Command::Vent { place: PlaceId::Cargo });
    engine.withdraw(id).unwrap();
    let report = engine.tick();
    assert!(!engine.kernel().state().truth.rooms[&PlaceId::Cargo].vented);
    assert_eq!(report.cycles, 100);
    assert!(matches!(engine.withdraw(id), Err(EngineError::NoSuchQueued(_))));
}

#[test]
fn verify_on_cooldown_is_refunded() {
    let mut engine = engine_with(50);
    engine.queue(Command::Verify);
    assert_eq!(engine.tick().cycles, 48);

    engine.queue(Command::Verify);
    let report = engine.tick();
    assert_eq!(report.dropped, vec![Command::Verify]);
    assert!(report.rejected.is_empty());
    assert_eq!(report.cycles, 49);
    assert!(report.events.iter().any(|e| matches!(
        e.kind,
        EventKind::Station {
            action: StationAction::VerifyCooldown { .. }
        }
    )));
}

#[test]
fn unpowered_verify_is_refunded_with_a_headline() {
    let mut engine = engine_with(50);
    engine.kernel_mut().state_mut().truth.station.power = 0.5;
    engine.queue(Command::Verify);
    let report = engine.tick();
    assert_eq!(report.dropped, vec![Command::Verify]);
    assert_eq!(report.cycles, 51);
    assert!(report
        .headlines
        .iter()
        .any(|h| h.text.starts_with("VERIFY UNAVAILABLE: Insufficient power")));
}

#[test]
fn commands_after_the_ending_cost_nothing() {
    let mut engine = engine_with(50);
    for member in engine.kernel_mut().state_mut().truth.crew.values_mut() {
        member.alive = false;
    }
    let report = engine.tick();
    assert!(report.ending.is_some());
    assert_eq!(report.cycles, 51);

    engine.queue(Command::Vent { place: PlaceId::Mines });
    let report = engine.tick();
    assert_eq!(report.dropped, vec![Command::Vent { place: PlaceId::Mines }]);
    assert_eq!(report.cycles, 52);
}

// ---------------------------------------------------------------------------
// Headlines
// ---------------------------------------------------------------------------

#[test]
fn headlines_are_capped_every_tick() {
    let mut engine = engine_with(100);
    for _ in 0..200 {
        let report = engine.tick();
        assert!(report.headlines.len() <= MAX_HEADLINES);
        for headline in &report.headlines {
            assert_eq!(headline.tick, report.tick);
            assert!(!headline.text.is_empty());
        }
        if report.ending.is_some() {
            break;
        }
    }
}

#[test]
fn tamper_commands_stay_out_of_headlines() {
    let mut engine = engine_with(100);
    engine.queue(Command::Suppress {
        system: StationSystem::Radiation,
        duration: None,
    });
    let report = engine.tick();
    assert!(report.headlines.iter().all(|h| h.kind != "TAMPER_SUPPRESS"));
    assert!(report
        .events
        .iter()
        .any(|e| matches!(e.kind, EventKind::TamperSuppress { .. })));
}

#[test]
fn spoofed_alarm_makes_a_headline() {
    let mut engine = engine_with(100);
    engine.queue(Command::Spoof {
        system: StationSystem::Air,
    });
    let report = engine.tick();
    assert!(report
        .headlines
        .iter()
        .any(|h| h.kind == "SYSTEM_ALERT" && h.hint == RenderHint::Warning));
}

#[test]
fn event_log_keeps_the_latest_events() {
    let mut engine = Engine::new(
        6,
        EngineConfig {
            event_log_cap: 20,
            ..EngineConfig::default()
        },
    )
    .unwrap();
    engine.run_ticks(30);
    let ids: Vec<u64> = engine.event_log().iter().map(|e| e.id).collect();
    assert_eq!(ids.len(), 20);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    let diagnostics = engine.last_diagnostics();
    assert!(diagnostics.total_time >= diagnostics.kernel_time);
}
