//! Property tests for the perception layer.
//!
//! Random operator command scripts are driven through a real kernel; after
//! every tick the belief ranges, the suspicion bounds, the ledger, and the op
//! lifecycles must still hold.

use std::collections::BTreeMap;

use paranoia_kernel::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum CmdOp {
    Order(usize, usize),
    Suppress(usize, u64),
    Spoof(usize),
    Fabricate(usize),
    Announce(usize),
    Downplay(usize),
    Verify,
    Vent(usize),
    Seal(usize),
    PurgeAir,
    Alert(usize),
    Wait,
}

fn cmd_op_strategy() -> impl Strategy<Value = CmdOp> {
    prop_oneof![
        (0..5usize, 0..10usize).prop_map(|(c, p)| CmdOp::Order(c, p)),
        (0..10usize, 1..80u64).prop_map(|(s, d)| CmdOp::Suppress(s, d)),
        (0..10usize).prop_map(CmdOp::Spoof),
        (0..5usize).prop_map(CmdOp::Fabricate),
        (0..10usize).prop_map(CmdOp::Announce),
        (0..10usize).prop_map(CmdOp::Downplay),
        Just(CmdOp::Verify),
        (0..10usize).prop_map(CmdOp::Vent),
        (0..10usize).prop_map(CmdOp::Seal),
        Just(CmdOp::PurgeAir),
        (0..10usize).prop_map(CmdOp::Alert),
        Just(CmdOp::Wait),
        Just(CmdOp::Wait),
    ]
}

fn to_command(op: &CmdOp) -> Option<Command> {
    let system = |i: usize| StationSystem::ALL[i % StationSystem::ALL.len()];
    let crew = |i: usize| CrewId::ALL[i % CrewId::ALL.len()];
    let place = |i: usize| PlaceId::ALL[i % PlaceId::ALL.len()];
    Some(match op {
        CmdOp::Order(c, p) => Command::Order {
            target: crew(*c),
            intent: OrderIntent::Move,
            place: Some(place(*p)),
        },
        CmdOp::Suppress(s, d) => Command::Suppress {
            system: system(*s),
            duration: Some(*d),
        },
        CmdOp::Spoof(s) => Command::Spoof { system: system(*s) },
        CmdOp::Fabricate(c) => Command::Fabricate { target: crew(*c) },
        CmdOp::Announce(s) => Command::Announce { system: system(*s) },
        CmdOp::Downplay(s) => Command::Downplay { system: system(*s) },
        CmdOp::Verify => Command::Verify,
        CmdOp::Vent(p) => Command::Vent { place: place(*p) },
        CmdOp::Seal(p) => Command::Seal { place: place(*p) },
        CmdOp::PurgeAir => Command::PurgeAir,
        CmdOp::Alert(s) => Command::Alert { system: system(*s) },
        CmdOp::Wait => return None,
    })
}

/// Assert the per-tick invariants and record op closing ticks.
fn check_invariants(kernel: &Kernel, closed: &mut BTreeMap<u64, u64>) {
    let perception = &kernel.state().perception;

    for belief in perception.beliefs.values() {
        assert!((0.0..=1.0).contains(&belief.mother_reliable));
        assert!((0.0..=100.0).contains(&belief.tamper_evidence));
        assert!(belief.rumors.values().all(|v| (0.0..=1.0).contains(v)));
        assert!(belief.crew_grudge.values().all(|v| (0.0..=100.0).contains(v)));
    }

    let suspicion = kernel.suspicion();
    assert!((0.0..=100.0).contains(&suspicion), "suspicion {suspicion}");

    assert!(perception.ledger.iter().all(|e| e.delta.is_finite()));
    assert!(perception.ledger.len() <= kernel.config().ledger_cap);

    let closings = perception
        .tamper_ops
        .iter()
        .map(|op| (op.id, op.status.closed_at()))
        .chain(perception.crisis_ops.iter().map(|op| (op.id, op.status.closed_at())));
    for (id, at) in closings {
        match (closed.get(&id), at) {
            (Some(first), Some(now)) => assert_eq!(*first, now, "op {id} closed twice"),
            (Some(_), None) => panic!("op {id} went back to pending"),
            (None, Some(now)) => {
                closed.insert(id, now);
            }
            (None, None) => {}
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn perception_stays_in_range(
        seed in any::<u64>(),
        ops in prop::collection::vec(cmd_op_strategy(), 1..120),
    ) {
        let mut kernel = Kernel::new(seed, KernelConfig::default()).unwrap();
        let mut closed = BTreeMap::new();
        for op in &ops {
            let commands: Vec<Command> = to_command(op).into_iter().collect();
            kernel.step(&commands);
            check_invariants(&kernel, &mut closed);
            if kernel.ending().is_some() {
                break;
            }
        }
    }

    #[test]
    fn same_script_same_state(
        seed in any::<u64>(),
        ops in prop::collection::vec(cmd_op_strategy(), 1..60),
    ) {
        let mut a = Kernel::new(seed, KernelConfig::default()).unwrap();
        let mut b = Kernel::new(seed, KernelConfig::default()).unwrap();
        for op in &ops {
            let commands: Vec<Command> = to_command(op).into_iter().collect();
            let out_a = a.step(&commands);
            let out_b = b.step(&commands);
            prop_assert_eq!(out_a, out_b);
        }
        prop_assert_eq!(a.state(), b.state());
    }
}
