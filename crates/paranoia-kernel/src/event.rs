//! Simulation events.
//!
//! Every state change is described by an [`EventKind`]. Proposals carry event
//! kinds into the [`ProposalBuffer`](crate::proposal::ProposalBuffer); once
//! applied, they are stamped with an id and tick as a [`SimEvent`] and
//! returned to the caller for headline routing and telemetry.

use serde::{Deserialize, Serialize};

use crate::commands::StationSystem;
use crate::state::{ArcKind, CrisisKind, Ending, LedgerReason, ResetStage};
use crate::world::{CrewId, PlaceId};

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Narrative role of an event, used by the director and renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Pressure,
    Reaction,
    Uncertainty,
    Background,
    Telegraph,
    Consequence,
    Choice,
}

// ---------------------------------------------------------------------------
// Messages and readings
// ---------------------------------------------------------------------------

/// Who produced a sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    /// A physical sensor.
    Sensor,
    /// The AI's own system log.
    System,
    /// A stressed crew member's imagination.
    Hallucination,
}

/// A telemetry reading the crew can see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub source: ReadingSource,
    pub system: StationSystem,
    pub place: Option<PlaceId>,
    /// 0–1.
    pub confidence: f64,
    /// Crew member the reading implicates.
    pub target: Option<CrewId>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommsKind {
    Whisper,
    Broadcast,
    Log,
    Order,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Mother,
    Crew(CrewId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Every living crew member.
    All,
    /// Living crew in one room.
    Room(PlaceId),
    One(CrewId),
}

/// A whisper, broadcast, log line, or order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommsMessage {
    pub kind: CommsKind,
    pub from: Speaker,
    pub to: Audience,
    /// Rumor topic the message feeds, if any.
    pub topic: Option<String>,
    /// Crew member the message is about.
    pub subject: Option<CrewId>,
    pub confidence: f64,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Room patches and causes
// ---------------------------------------------------------------------------

/// A partial update to one room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomPatch {
    pub o2_delta: f64,
    pub temperature_delta: f64,
    /// Overrides temperature (applied before the delta).
    pub temperature_set: Option<f64>,
    pub radiation_delta: f64,
    pub power_delta: f64,
    pub on_fire: Option<bool>,
    pub vented: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DamageCause {
    Suffocation,
    Burn,
    Radiation,
    Assault,
    Accident,
}

/// Why a crew member picked a new destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentReason {
    Schedule,
    Panic,
    Evacuate,
    Order,
    Meeting,
    /// Answering an emergency alarm.
    Respond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderIntent {
    /// Go to a room.
    Move,
    /// Stay put.
    Hold,
    /// Report to the bridge.
    Report,
}

// ---------------------------------------------------------------------------
// StationAction
// ---------------------------------------------------------------------------

/// Station-level actions by the AI, the crew, or the director.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StationAction {
    PurgeAir,
    Verify,
    /// VERIFY issued on cooldown: diagnostic only.
    VerifyCooldown { ready_at: u64 },
    /// VERIFY issued with too little station power: diagnostic only.
    VerifyUnpowered { power: f64, needed: f64 },
    Announce { system: StationSystem, arc_id: u64 },
    Downplay { system: StationSystem, arc_id: u64 },
    /// An alert that confesses a pending suppression.
    Confess { system: StationSystem },
    PowerSurge { amount: f64 },
    SolarFlare { blackout_ticks: u64 },
    GhostSignal,
    SabotagePower { amount: f64 },
    Sedate { place: PlaceId, stress_delta: i32, loyalty_delta: i32 },
    ResetStage { from: ResetStage, to: ResetStage },
    ResetWarning { countdown: u64 },
    ArcActivated { kind: ArcKind, target: PlaceId, first_step_tick: u64 },
    ArcAdvanced { arc_id: u64, step_index: u32, next_tick: u64 },
    ArcResolved { arc_id: u64 },
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    RoomUpdated { place: PlaceId, patch: RoomPatch },
    NpcMove { crew: CrewId, from: PlaceId, to: PlaceId },
    CrewIntent {
        crew: CrewId,
        target: PlaceId,
        reason: IntentReason,
        /// Panic lasts until this tick.
        panic_until: Option<u64>,
    },
    NpcDamage {
        crew: CrewId,
        place: PlaceId,
        amount: i32,
        cause: DamageCause,
        attacker: Option<CrewId>,
    },
    CargoYield { crew: CrewId, place: PlaceId, amount: u32 },
    CrewMood {
        crew: CrewId,
        stress_delta: i32,
        paranoia_delta: i32,
        loyalty_delta: i32,
    },
    SensorReading(SensorReading),
    Comms(CommsMessage),
    /// An order from the AI; `accepted = false` is a flagged refusal.
    OrderIssued {
        target: CrewId,
        intent: OrderIntent,
        place: PlaceId,
        accepted: bool,
        trust_score: f64,
    },
    TamperSuppress { system: StationSystem, duration: u64 },
    TamperSpoof { system: StationSystem },
    TamperFabricate { target: CrewId },
    SystemAlert {
        system: StationSystem,
        place: Option<PlaceId>,
        message: String,
    },
    /// A crew role behaviour fired and goes on cooldown.
    RoleCooldown { crew: CrewId, until: u64 },
    /// Environment drift for one tick.
    SystemsTick,
    Station { action: StationAction },

    // -- post-apply notices (written by detectors and the stepper) ----------
    Backfire {
        op_id: u64,
        op: String,
        delta: f64,
        reason: LedgerReason,
        crew_affected: Vec<CrewId>,
    },
    CrisisVindicated { op_id: u64, kind: CrisisKind, system: StationSystem },
    DayEnded { day: u32, cargo: u32, quota_met: bool },
    EndingReached { ending: Ending },
}

impl EventKind {
    /// Short type name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::RoomUpdated { .. } => "ROOM_UPDATED",
            EventKind::NpcMove { .. } => "NPC_MOVE",
            EventKind::CrewIntent { .. } => "CREW_INTENT",
            EventKind::NpcDamage { .. } => "NPC_DAMAGE",
            EventKind::CargoYield { .. } => "CARGO_YIELD",
            EventKind::CrewMood { .. } => "CREW_MOOD_TICK",
            EventKind::SensorReading(_) => "SENSOR_READING",
            EventKind::Comms(_) => "COMMS_MESSAGE",
            EventKind::OrderIssued { .. } => "ORDER_ISSUED",
            EventKind::TamperSuppress { .. } => "TAMPER_SUPPRESS",
            EventKind::TamperSpoof { .. } => "TAMPER_SPOOF",
            EventKind::TamperFabricate { .. } => "TAMPER_FABRICATE",
            EventKind::SystemAlert { .. } => "SYSTEM_ALERT",
            EventKind::RoleCooldown { .. } => "ROLE_COOLDOWN",
            EventKind::SystemsTick => "SYSTEMS_TICK",
            EventKind::Station { .. } => "SYSTEM_ACTION",
            EventKind::Backfire { .. } => "BACKFIRE",
            EventKind::CrisisVindicated { .. } => "CRISIS_VINDICATED",
            EventKind::DayEnded { .. } => "DAY_ENDED",
            EventKind::EndingReached { .. } => "ENDING",
        }
    }

    /// Whether this is one of the tamper events.
    pub fn is_tamper(&self) -> bool {
        matches!(
            self,
            EventKind::TamperSuppress { .. }
                | EventKind::TamperSpoof { .. }
                | EventKind::TamperFabricate { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// SimEvent
// ---------------------------------------------------------------------------

/// An applied event, stamped with a unique id and the tick it happened on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub id: u64,
    pub tick: u64,
    pub kind: EventKind,
    pub tags: Vec<Tag>,
}

impl SimEvent {
    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_activation_survives_json() {
        let event = SimEvent {
            id: 9,
            tick: 41,
            kind: EventKind::Station {
                action: StationAction::ArcActivated {
                    kind: ArcKind::FireOutbreak,
                    target: PlaceId::Engineering,
                    first_step_tick: 55,
                },
            },
            tags: vec![Tag::Pressure],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""action":"ARC_ACTIVATED""#), "{json}");
        let back: SimEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn station_actions_round_trip_inside_events() {
        let actions = [
            StationAction::Verify,
            StationAction::VerifyCooldown { ready_at: 20 },
            StationAction::ResetStage {
                from: ResetStage::Whispers,
                to: ResetStage::Meeting,
            },
            StationAction::ArcResolved { arc_id: 3 },
        ];
        for action in actions {
            let kind = EventKind::Station { action };
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(serde_json::from_str::<EventKind>(&json).unwrap(), kind);
        }
    }
}
