//! Crisis-comms detectors: announcement vindication and downplay harm.

use tracing::info;

use crate::config::KernelConfig;
use crate::event::EventKind;
use crate::kernel::KernelState;
use crate::state::{CrisisKind, CrisisStatus, LedgerReason, OpRef};
use crate::systems::beliefs::apply_suspicion_change;
use crate::systems::doubts::create_doubt;
use crate::world::CrewId;

pub fn run_crisis_detectors(state: &mut KernelState, config: &KernelConfig, notices: &mut Vec<EventKind>) {
    for idx in 0..state.perception.crisis_ops.len() {
        if !state.perception.crisis_ops[idx].status.is_pending() {
            continue;
        }
        match state.perception.crisis_ops[idx].kind {
            CrisisKind::Announce => track_announcement(state, config, idx, notices),
            CrisisKind::Downplay => detect_downplay(state, config, idx, notices),
        }
    }
    let tick = state.truth.tick;
    state.perception.crisis_ops.retain(|op| {
        op.status.is_pending() || tick.saturating_sub(op.tick) < config.op_retention_ticks
    });
}

fn track_announcement(state: &mut KernelState, config: &KernelConfig, idx: usize, notices: &mut Vec<EventKind>) {
    let tick = state.truth.tick;
    let arc_step = {
        let arc_id = state.perception.crisis_ops[idx].arc_id;
        state.truth.arcs.iter().find(|a| a.id == arc_id).map(|a| a.step_index)
    };
    let op = &mut state.perception.crisis_ops[idx];
    if let Some(step) = arc_step {
        op.last_step_index = op.last_step_index.max(step);
        return;
    }

    op.status = CrisisStatus::Vindicated { at: tick };
    let (op_id, system, severe) = (op.id, op.system, op.last_step_index >= config.severe_arc_step);
    info!(op_id, system = %system, severe, "announcement vindicated");
    if severe {
        apply_suspicion_change(
            state,
            config,
            config.suspicion_announce_vindicated,
            LedgerReason::AnnounceVindicated,
            format!("{system} crisis played out as announced"),
        );
    }
    notices.push(EventKind::CrisisVindicated {
        op_id,
        kind: CrisisKind::Announce,
        system,
    });
}

fn detect_downplay(state: &mut KernelState, config: &KernelConfig, idx: usize, notices: &mut Vec<EventKind>) {
    let tick = state.truth.tick;
    let truth = &state.truth;
    let op = &state.perception.crisis_ops[idx];

    let mut harmed: Vec<CrewId> = Vec::new();
    let mut delta = config.downplay_backfire_base;
    let room_hazardous = truth.is_hazardous(op.place, config);
    for snap in &op.snapshot {
        let Some(member) = truth.crew.get(&snap.crew) else {
            continue;
        };
        if !member.alive {
            harmed.push(snap.crew);
            delta += config.downplay_backfire_death_bonus;
        } else if member.place == op.place && room_hazardous && member.hp < snap.hp {
            harmed.push(snap.crew);
            delta += config.downplay_backfire_injury_bonus;
        }
    }

    if harmed.is_empty() {
        if op.window_end_tick.is_some_and(|end| tick >= end) {
            state.perception.crisis_ops[idx].status = CrisisStatus::Expired { at: tick };
        }
        return;
    }

    let delta = delta.min(config.downplay_backfire_cap);
    let (op_id, system) = (op.id, op.system);
    let op = &mut state.perception.crisis_ops[idx];
    op.status = CrisisStatus::Backfired { at: tick };
    op.crew_affected = harmed.clone();

    info!(op_id, system = %system, delta, harmed = harmed.len(), "downplay backfired");
    let detail = format!("MOTHER downplayed the {system} crisis while crew were hurt");
    apply_suspicion_change(state, config, delta, LedgerReason::DownplayBackfire, detail.clone());
    create_doubt(state, detail, 3, harmed.clone(), Some(OpRef::Crisis(op_id)), Some(system));
    state.truth.day_incidents += 1;
    notices.push(EventKind::Backfire {
        op_id,
        op: "DOWNPLAY".to_owned(),
        delta,
        reason: LedgerReason::DownplayBackfire,
        crew_affected: harmed,
    });
}
