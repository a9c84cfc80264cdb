//! Environment drift.
//!
//! Physics proposes a single `SYSTEMS_TICK` per tick; the apply pass calls
//! [`apply_systems_tick`] so the drift lands in FIFO order with everything
//! else.

use crate::config::KernelConfig;
use crate::event::{EventKind, Tag};
use crate::proposal::{CausalReason, ProposalBuffer};
use crate::state::Truth;
use crate::world::PlaceId;

pub fn propose_systems_tick(buf: &mut ProposalBuffer) {
    buf.push(
        EventKind::SystemsTick,
        &[Tag::Background],
        CausalReason::Timer("systems_tick".to_owned()),
    );
}

/// Advance every room and the station bus by one tick.
pub fn apply_systems_tick(truth: &mut Truth, config: &KernelConfig) {
    let tick = truth.tick;
    let station = &mut truth.station;
    station.blackout_ticks = station.blackout_ticks.saturating_sub(1);
    station.comms = (station.comms + 1.0).min(100.0);
    station.power = (station.power + 1.0).min(100.0);
    let bus_power = station.power;

    let decay_radiation = tick > 0 && tick % config.radiation_decay_interval == 0;
    for room in truth.rooms.values_mut() {
        if room.vented {
            room.o2 = (room.o2 - config.vent_o2_loss).max(0.0);
            room.temperature = (room.temperature - config.vent_heat_loss).max(config.vacuum_temperature);
            room.on_fire = false;
        } else {
            if bus_power >= config.o2_regen_power && room.power >= config.o2_regen_power {
                room.o2 = (room.o2 + 1.0).min(100.0);
            }
            if !room.on_fire {
                let gap = config.ambient_temperature - room.temperature;
                room.temperature += gap.clamp(-config.temp_cooling_rate, config.temp_cooling_rate);
            }
        }

        if room.on_fire {
            room.temperature += config.fire_heat;
            room.o2 = (room.o2 - config.fire_o2_burn).max(0.0);
            if room.o2 < config.fire_o2_floor {
                room.on_fire = false;
            }
        }

        if decay_radiation {
            room.radiation = (room.radiation - 1.0).max(0.0);
        }
        room.power = (room.power + 1.0).min(100.0);
    }

    let core_hot = truth
        .rooms
        .get(&PlaceId::Core)
        .is_some_and(|r| r.temperature >= config.meltdown_temp);
    truth.core_overheat_ticks = if core_hot { truth.core_overheat_ticks + 1 } else { 0 };
}
