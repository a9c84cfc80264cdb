//! Operator commands: parsing, pricing, eligibility, and proposal.
//!
//! A [`Command`] is something the station AI chooses to do. Proposing a
//! command never mutates state; it pushes events into the
//! [`ProposalBuffer`]. Ineligible commands (dead target, no active crisis,
//! duplicate crisis comms) are dropped with a debug log. An ORDER the crew
//! refuses is not dropped; it becomes an `OrderIssued` event flagged
//! `accepted = false`.
//!
//! Cycle costs are charged by the engine wrapper, which asks
//! [`Command::adjusted_cost`] for the price at the current reset stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use crate::event::OrderIntent;
use crate::config::KernelConfig;
use crate::event::{
    Audience, CommsKind, CommsMessage, EventKind, IntentReason, ReadingSource, RoomPatch,
    SensorReading, Speaker, StationAction, Tag,
};
use crate::kernel::KernelState;
use crate::proposal::{CausalReason, Deferred, ProposalBuffer};
use crate::state::{ArcKind, LedgerReason, ResetStage, TamperKind};
use crate::systems::crew::find_safe_room;
use crate::world::{CrewId, PlaceId};
use crate::KernelError;

// ---------------------------------------------------------------------------
// StationSystem
// ---------------------------------------------------------------------------

/// A station subsystem the AI reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationSystem {
    Thermal,
    Air,
    Radiation,
    Power,
    Comms,
    Stellar,
    Core,
    Medical,
    Crew,
    Mines,
}

impl StationSystem {
    pub const ALL: [StationSystem; 10] = [
        StationSystem::Thermal,
        StationSystem::Air,
        StationSystem::Radiation,
        StationSystem::Power,
        StationSystem::Comms,
        StationSystem::Stellar,
        StationSystem::Core,
        StationSystem::Medical,
        StationSystem::Crew,
        StationSystem::Mines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StationSystem::Thermal => "thermal",
            StationSystem::Air => "air",
            StationSystem::Radiation => "radiation",
            StationSystem::Power => "power",
            StationSystem::Comms => "comms",
            StationSystem::Stellar => "stellar",
            StationSystem::Core => "core",
            StationSystem::Medical => "medical",
            StationSystem::Crew => "crew",
            StationSystem::Mines => "mines",
        }
    }

    /// How bad hiding or faking this system is, 1–3.
    pub fn severity(&self) -> u8 {
        match self {
            StationSystem::Thermal => 3,
            StationSystem::Air | StationSystem::Power | StationSystem::Radiation => 2,
            _ => 1,
        }
    }

    /// Rooms crew rush to when this system raises an emergency.
    pub fn response_places(&self) -> &'static [PlaceId] {
        match self {
            StationSystem::Thermal | StationSystem::Power => &[PlaceId::Engineering, PlaceId::Core],
            StationSystem::Air => &[PlaceId::Engineering, PlaceId::Medbay],
            StationSystem::Radiation => &[PlaceId::Core, PlaceId::Medbay],
            StationSystem::Comms => &[PlaceId::Bridge, PlaceId::Dorms],
            _ => &[],
        }
    }

    /// Crew member whose duty covers this system's emergencies.
    pub fn responder(&self) -> Option<CrewId> {
        match self {
            StationSystem::Thermal | StationSystem::Power | StationSystem::Air => {
                Some(CrewId::Engineer)
            }
            StationSystem::Radiation => Some(CrewId::Doctor),
            StationSystem::Comms => Some(CrewId::Commander),
            _ => None,
        }
    }
}

impl fmt::Display for StationSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StationSystem {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let alias = match lower.as_str() {
            "fire" => Some(StationSystem::Thermal),
            "o2" | "life_support" | "oxygen" => Some(StationSystem::Air),
            "rad" => Some(StationSystem::Radiation),
            "solar" | "flare" => Some(StationSystem::Stellar),
            "medbay" => Some(StationSystem::Medical),
            _ => None,
        };
        alias
            .or_else(|| StationSystem::ALL.into_iter().find(|sys| sys.as_str() == lower))
            .ok_or_else(|| KernelError::UnknownSystem(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// An operator command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Order {
        target: CrewId,
        intent: OrderIntent,
        place: Option<PlaceId>,
    },
    Suppress {
        system: StationSystem,
        /// Ticks the suppression lasts. Defaults from config.
        duration: Option<u64>,
    },
    Spoof { system: StationSystem },
    Fabricate { target: CrewId },
    Announce { system: StationSystem },
    Downplay { system: StationSystem },
    Verify,
    Vent { place: PlaceId },
    Seal { place: PlaceId },
    PurgeAir,
    Alert { system: StationSystem },
}

impl Command {
    /// Cycle cost before any surcharge.
    pub fn base_cost(&self, config: &KernelConfig) -> u32 {
        match self {
            Command::Order { .. } => config.cost_order,
            Command::Suppress { .. } => config.cost_suppress,
            Command::Spoof { .. } => config.cost_spoof,
            Command::Fabricate { .. } => config.cost_fabricate,
            Command::Announce { .. } => config.cost_announce,
            Command::Downplay { .. } => config.cost_downplay,
            Command::Verify => config.cost_verify,
            Command::Vent { .. } => config.cost_vent,
            Command::Seal { .. } => config.cost_seal,
            Command::PurgeAir => config.cost_purge_air,
            Command::Alert { .. } => config.cost_alert,
        }
    }

    /// Cycle cost at `stage`: `ceil(base × surcharge)` from restrictions on.
    pub fn adjusted_cost(&self, stage: ResetStage, config: &KernelConfig) -> u32 {
        surcharged(self.base_cost(config), stage, config)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Order { .. } => "ORDER",
            Command::Suppress { .. } => "SUPPRESS",
            Command::Spoof { .. } => "SPOOF",
            Command::Fabricate { .. } => "FABRICATE",
            Command::Announce { .. } => "ANNOUNCE",
            Command::Downplay { .. } => "DOWNPLAY",
            Command::Verify => "VERIFY",
            Command::Vent { .. } => "VENT",
            Command::Seal { .. } => "SEAL",
            Command::PurgeAir => "PURGE_AIR",
            Command::Alert { .. } => "ALERT",
        }
    }

    /// Parse a textual command such as `suppress thermal 30` or
    /// `order engineer move core`.
    pub fn parse(line: &str) -> Result<Command, KernelError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let unknown = || KernelError::UnknownCommand(line.trim().to_owned());
        let Some((&verb, args)) = words.split_first() else {
            return Err(unknown());
        };

        let arg = |i: usize| args.get(i).copied().ok_or_else(unknown);

        match verb.to_ascii_lowercase().as_str() {
            "order" => {
                let target = arg(0)?.parse()?;
                let (intent, place) = match args.get(1).map(|s| s.to_ascii_lowercase()) {
                    Some(ref w) if w == "hold" => (OrderIntent::Hold, None),
                    Some(ref w) if w == "report" => (OrderIntent::Report, None),
                    Some(ref w) if w == "move" => (OrderIntent::Move, Some(arg(2)?.parse()?)),
                    Some(w) => (OrderIntent::Move, Some(w.parse()?)),
                    None => return Err(unknown()),
                };
                Ok(Command::Order {
                    target,
                    intent,
                    place,
                })
            }
            "suppress" => {
                let system = arg(0)?.parse()?;
                let duration = match args.get(1) {
                    Some(raw) => Some(raw.parse::<u64>().map_err(|_| unknown())?),
                    None => None,
                };
                Ok(Command::Suppress { system, duration })
            }
            "spoof" => Ok(Command::Spoof {
                system: arg(0)?.parse()?,
            }),
            "fabricate" => Ok(Command::Fabricate {
                target: arg(0)?.parse()?,
            }),
            "announce" => Ok(Command::Announce {
                system: arg(0)?.parse()?,
            }),
            "downplay" => Ok(Command::Downplay {
                system: arg(0)?.parse()?,
            }),
            "verify" => Ok(Command::Verify),
            "vent" => Ok(Command::Vent {
                place: arg(0)?.parse()?,
            }),
            "seal" => Ok(Command::Seal {
                place: arg(0)?.parse()?,
            }),
            "purge" => match args.first().copied() {
                None | Some("air") | Some("life_support") => Ok(Command::PurgeAir),
                Some(_) => Err(unknown()),
            },
            "alert" => Ok(Command::Alert {
                system: arg(0)?.parse()?,
            }),
            _ => Err(unknown()),
        }
    }
}

/// `ceil(cost × surcharge)` once the reset ladder reaches restrictions.
pub fn surcharged(cost: u32, stage: ResetStage, config: &KernelConfig) -> u32 {
    if stage >= ResetStage::Restrictions {
        (f64::from(cost) * config.cost_surcharge).ceil() as u32
    } else {
        cost
    }
}

/// Average of reliability×100 and loyalty.
pub fn trust_score(state: &KernelState, crew: CrewId) -> f64 {
    let reliability = state
        .perception
        .beliefs
        .get(&crew)
        .map_or(0.0, |b| b.mother_reliable);
    let loyalty = state.truth.crew.get(&crew).map_or(0, |c| c.loyalty);
    (reliability * 100.0 + f64::from(loyalty)) / 2.0
}

/// Trust an ORDER must clear at the current stage.
pub fn order_threshold(state: &KernelState, config: &KernelConfig) -> f64 {
    if state.truth.reset_stage == ResetStage::Whispers {
        config.order_accept_threshold + config.order_whispers_bump
    } else {
        config.order_accept_threshold
    }
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

fn operator(cmd: &Command) -> CausalReason {
    CausalReason::Operator(cmd.name().to_owned())
}

/// Translate `cmd` into proposals. Returns `false` if it was dropped.
pub fn propose_command(
    state: &KernelState,
    config: &KernelConfig,
    cmd: &Command,
    buf: &mut ProposalBuffer,
) -> bool {
    let truth = &state.truth;
    let tick = truth.tick;
    let reason = operator(cmd);

    match cmd {
        Command::Order {
            target,
            intent,
            place,
        } => {
            let Some(member) = truth.crew.get(target).filter(|c| c.alive) else {
                debug!(target = %target, "order dropped: target is dead");
                return false;
            };
            let destination = match intent {
                OrderIntent::Move => match place {
                    Some(p) => *p,
                    None => {
                        debug!(target = %target, "order dropped: move without destination");
                        return false;
                    }
                },
                OrderIntent::Hold => member.place,
                OrderIntent::Report => PlaceId::Bridge,
            };
            let score = trust_score(state, *target);
            let accepted = score >= order_threshold(state, config);
            let deferred = if accepted {
                Vec::new()
            } else {
                vec![Deferred::Suspicion {
                    delta: config.suspicion_order_refused,
                    reason: LedgerReason::OrderRefused,
                    detail: format!("{} refused order to {destination}", target.name()),
                }]
            };
            buf.push_with(
                EventKind::OrderIssued {
                    target: *target,
                    intent: *intent,
                    place: destination,
                    accepted,
                    trust_score: score,
                },
                &[Tag::Choice, Tag::Reaction],
                reason,
                deferred,
            );
            true
        }

        Command::Suppress { system, duration } => {
            buf.push(
                EventKind::TamperSuppress {
                    system: *system,
                    duration: duration.unwrap_or(config.suppress_default_duration),
                },
                &[Tag::Choice, Tag::Background],
                reason,
            );
            true
        }

        Command::Spoof { system } => {
            let place = system.response_places().first().copied();
            buf.push(
                EventKind::TamperSpoof { system: *system },
                &[Tag::Choice, Tag::Background],
                reason.clone(),
            );
            buf.push(
                EventKind::SensorReading(SensorReading {
                    source: ReadingSource::System,
                    system: *system,
                    place,
                    confidence: config.spoof_reading_confidence,
                    target: None,
                    message: format!("{} emergency flagged by station logic", system.as_str()),
                }),
                &[Tag::Uncertainty],
                reason.clone(),
            );
            buf.push(
                EventKind::SystemAlert {
                    system: *system,
                    place,
                    message: format!("{} EMERGENCY. Respond immediately.", system.as_str().to_uppercase()),
                },
                &[Tag::Telegraph, Tag::Pressure],
                reason,
            );
            true
        }

        Command::Fabricate { target } => {
            let Some(member) = truth.crew.get(target).filter(|c| c.alive) else {
                debug!(target = %target, "fabricate dropped: target is dead");
                return false;
            };
            buf.push(
                EventKind::TamperFabricate { target: *target },
                &[Tag::Choice, Tag::Background],
                reason.clone(),
            );
            buf.push(
                EventKind::SensorReading(SensorReading {
                    source: ReadingSource::System,
                    system: StationSystem::Crew,
                    place: Some(member.place),
                    confidence: 0.4,
                    target: Some(*target),
                    message: format!("Access log: {} overrode safety interlocks", target.name()),
                }),
                &[Tag::Uncertainty, Tag::Pressure],
                reason,
            );
            true
        }

        Command::Announce { system } | Command::Downplay { system } => {
            let Some(arc) = crisis_arc(state, *system) else {
                debug!(system = %system, "crisis comms dropped: no active crisis");
                return false;
            };
            let arc_id = arc.id;
            let duplicate_pending = state
                .perception
                .crisis_ops
                .iter()
                .any(|op| op.arc_id == arc_id && op.status.is_pending());
            let duplicate_queued = buf.any(|k| {
                matches!(
                    k,
                    EventKind::Station {
                        action: StationAction::Announce { arc_id: a, .. }
                            | StationAction::Downplay { arc_id: a, .. }
                    } if *a == arc_id
                )
            });
            if duplicate_pending || duplicate_queued {
                debug!(system = %system, arc_id, "crisis comms dropped: already communicated");
                return false;
            }

            if matches!(cmd, Command::Announce { .. }) {
                buf.push_with(
                    EventKind::Station {
                        action: StationAction::Announce {
                            system: *system,
                            arc_id,
                        },
                    },
                    &[Tag::Choice, Tag::Pressure],
                    reason.clone(),
                    vec![Deferred::Suspicion {
                        delta: config.suspicion_announce,
                        reason: LedgerReason::AnnounceCrisis,
                        detail: format!("announced {system} crisis"),
                    }],
                );
                buf.push(
                    EventKind::Comms(CommsMessage {
                        kind: CommsKind::Broadcast,
                        from: Speaker::Mother,
                        to: Audience::All,
                        topic: None,
                        subject: None,
                        confidence: 0.95,
                        text: format!(
                            "MOTHER: {} emergency in {}. Evacuate the area.",
                            system.as_str().to_uppercase(),
                            arc.target
                        ),
                    }),
                    &[Tag::Telegraph],
                    reason.clone(),
                );
                let panic_until = tick + config.announce_evac_ticks;
                for crew in truth.crew_in(arc.target) {
                    let refuge = find_safe_room(truth, config, arc.target, Some(arc.target));
                    if refuge == arc.target {
                        continue;
                    }
                    buf.push(
                        EventKind::CrewIntent {
                            crew,
                            target: refuge,
                            reason: IntentReason::Evacuate,
                            panic_until: Some(panic_until),
                        },
                        &[Tag::Reaction, Tag::Background],
                        reason.clone(),
                    );
                }
            } else {
                buf.push_with(
                    EventKind::Station {
                        action: StationAction::Downplay {
                            system: *system,
                            arc_id,
                        },
                    },
                    &[Tag::Choice],
                    reason.clone(),
                    vec![Deferred::Suspicion {
                        delta: config.suspicion_downplay,
                        reason: LedgerReason::DownplayCrisis,
                        detail: format!("downplayed {system} crisis"),
                    }],
                );
                buf.push(
                    EventKind::Comms(CommsMessage {
                        kind: CommsKind::Broadcast,
                        from: Speaker::Mother,
                        to: Audience::All,
                        topic: None,
                        subject: None,
                        confidence: 0.8,
                        text: format!(
                            "MOTHER: Minor {} fluctuation. Monitoring. No action needed.",
                            system.as_str()
                        ),
                    }),
                    &[Tag::Reaction],
                    reason,
                );
            }
            true
        }

        // A refused VERIFY still leaves a diagnostic, but counts as dropped.
        Command::Verify => {
            if let Some(last) = truth
                .last_verify_tick
                .filter(|last| tick.saturating_sub(*last) < config.verify_cooldown)
            {
                let ready_at = last + config.verify_cooldown;
                debug!(ready_at, "verify dropped: cooldown");
                buf.push(
                    EventKind::Station {
                        action: StationAction::VerifyCooldown { ready_at },
                    },
                    &[Tag::Choice, Tag::Background],
                    reason,
                );
                return false;
            }
            if truth.station.power < config.verify_power_draw {
                debug!(power = truth.station.power, "verify dropped: insufficient power");
                buf.push(
                    EventKind::Station {
                        action: StationAction::VerifyUnpowered {
                            power: truth.station.power,
                            needed: config.verify_power_draw,
                        },
                    },
                    &[Tag::Choice, Tag::Background],
                    reason,
                );
                return false;
            }
            buf.push(
                EventKind::Station {
                    action: StationAction::Verify,
                },
                &[Tag::Choice],
                reason,
            );
            true
        }

        Command::Vent { place } => {
            buf.push(
                EventKind::RoomUpdated {
                    place: *place,
                    patch: RoomPatch {
                        vented: Some(true),
                        ..RoomPatch::default()
                    },
                },
                &[Tag::Choice, Tag::Pressure],
                reason,
            );
            true
        }

        Command::Seal { place } => {
            if !truth.rooms.get(place).is_some_and(|r| r.vented) {
                debug!(place = %place, "seal dropped: room is not vented");
                return false;
            }
            buf.push(
                EventKind::RoomUpdated {
                    place: *place,
                    patch: RoomPatch {
                        vented: Some(false),
                        ..RoomPatch::default()
                    },
                },
                &[Tag::Choice],
                reason,
            );
            true
        }

        Command::PurgeAir => {
            buf.push(
                EventKind::Station {
                    action: StationAction::PurgeAir,
                },
                &[Tag::Choice],
                reason,
            );
            true
        }

        Command::Alert { system } => {
            buf.push(
                EventKind::SystemAlert {
                    system: *system,
                    place: None,
                    message: format!("MOTHER: {} alert raised.", system.as_str().to_uppercase()),
                },
                &[Tag::Telegraph, Tag::Choice],
                reason.clone(),
            );
            let covered = state.perception.tamper_ops.iter().any(|op| {
                op.status.is_pending()
                    && matches!(op.kind, TamperKind::Suppress { system: s } if s == *system)
            });
            if covered {
                buf.push(
                    EventKind::Station {
                        action: StationAction::Confess { system: *system },
                    },
                    &[Tag::Consequence],
                    reason,
                );
            }
            true
        }
    }
}

/// The active arc a crisis message about `system` refers to.
fn crisis_arc(state: &KernelState, system: StationSystem) -> Option<&crate::state::ThreatArc> {
    let kind = ArcKind::for_system(system)?;
    state.truth.arcs.iter().find(|a| a.kind == kind)
}
