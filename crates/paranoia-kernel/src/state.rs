//! Truth and perception state.
//!
//! [`Truth`] is the authoritative station: rooms, crew, resources, threat
//! arcs, escalation stage, and the ending flag. [`Perception`] is the crew's
//! subjective model of the station AI: per-crew beliefs, the suspicion ledger,
//! tamper and crisis-comms operations, doubts, rumors, and sightings.
//!
//! Both are mutated only by the kernel stepper. Lifecycle fields are tagged
//! enums so every detector matches them exhaustively.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::commands::StationSystem;
use crate::config::KernelConfig;
use crate::time::Window;
use crate::world::{CrewId, PlaceId};

/// Rumor topic for "the station AI has gone rogue".
pub const MOTHER_ROGUE: &str = "mother_rogue";

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// Live environmental condition of one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Oxygen level, 0–100.
    pub o2: f64,
    /// Temperature in °C.
    pub temperature: f64,
    /// Radiation level.
    pub radiation: f64,
    /// Local power, 0–100.
    pub power: f64,
    pub on_fire: bool,
    pub vented: bool,
}

impl Default for Room {
    fn default() -> Self {
        Self {
            o2: 100.0,
            temperature: 20.0,
            radiation: 0.0,
            power: 100.0,
            on_fire: false,
            vented: false,
        }
    }
}

impl Room {
    /// Fire, vacuum, thin air, heat, or radiation above `radiation_threshold`.
    pub fn is_hazardous(&self, radiation_threshold: f64) -> bool {
        self.on_fire
            || self.vented
            || self.o2 < 25.0
            || self.temperature > 45.0
            || self.radiation > radiation_threshold
    }

    /// Comfortable enough that stress bleeds off.
    pub fn is_comfortable(&self) -> bool {
        self.o2 > 60.0
            && (15.0..=30.0).contains(&self.temperature)
            && !self.vented
            && !self.on_fire
    }
}

// ---------------------------------------------------------------------------
// Crew
// ---------------------------------------------------------------------------

/// Ground-truth state of one crew member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewMember {
    pub id: CrewId,
    pub place: PlaceId,
    /// Hit points, 0–100. Reaching 0 kills irreversibly.
    pub hp: i32,
    pub alive: bool,
    /// 0–100.
    pub stress: i32,
    /// 0–100.
    pub loyalty: i32,
    /// 0–100.
    pub paranoia: i32,
    /// Where the crew member is heading, if anywhere.
    pub target: Option<PlaceId>,
    /// Remaining rooms on the way to `target`.
    pub path: Vec<PlaceId>,
    pub next_move_tick: u64,
    /// Fleeing until this tick.
    pub panic_until: Option<u64>,
    /// Following an order until this tick.
    pub order_until: Option<u64>,
    /// Destination of the active order.
    pub order_place: Option<PlaceId>,
    /// Next tick a role behaviour may fire.
    pub next_role_tick: u64,
}

impl CrewMember {
    pub fn new(id: CrewId) -> Self {
        Self {
            id,
            place: id.scheduled_place(Window::PreShift),
            hp: 100,
            alive: true,
            stress: 10,
            loyalty: 60,
            paranoia: 0,
            target: None,
            path: Vec::new(),
            next_move_tick: 0,
            panic_until: None,
            order_until: None,
            order_place: None,
            next_role_tick: 0,
        }
    }

    pub fn is_panicking(&self, tick: u64) -> bool {
        self.panic_until.is_some_and(|until| tick < until)
    }

    pub fn is_under_order(&self, tick: u64) -> bool {
        self.order_until.is_some_and(|until| tick <= until)
    }
}

// ---------------------------------------------------------------------------
// Station, arcs, ladder, ending
// ---------------------------------------------------------------------------

/// Station-wide resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Main bus power, 0–100.
    pub power: f64,
    /// Comms integrity, 0–100.
    pub comms: f64,
    /// Remaining blackout ticks. Cameras and telemetry are down while > 0.
    pub blackout_ticks: u64,
    pub total_cargo: u32,
    /// Cargo extracted since the day began.
    pub day_cargo: u32,
}

impl Default for Station {
    fn default() -> Self {
        Self {
            power: 100.0,
            comms: 100.0,
            blackout_ticks: 0,
            total_cargo: 0,
            day_cargo: 0,
        }
    }
}

/// Kind of environmental threat arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcKind {
    AirScrubber,
    FireOutbreak,
    RadiationLeak,
    PowerSurge,
    SolarFlare,
    GhostSignal,
}

impl ArcKind {
    pub const ALL: [ArcKind; 6] = [
        ArcKind::AirScrubber,
        ArcKind::FireOutbreak,
        ArcKind::RadiationLeak,
        ArcKind::PowerSurge,
        ArcKind::SolarFlare,
        ArcKind::GhostSignal,
    ];

    /// Number of steps before the arc resolves.
    pub fn max_steps(&self) -> u32 {
        match self {
            ArcKind::AirScrubber | ArcKind::FireOutbreak | ArcKind::RadiationLeak => 3,
            ArcKind::PowerSurge | ArcKind::SolarFlare | ArcKind::GhostSignal => 2,
        }
    }

    /// The station system whose alarms this arc trips.
    pub fn system(&self) -> StationSystem {
        match self {
            ArcKind::AirScrubber => StationSystem::Air,
            ArcKind::FireOutbreak => StationSystem::Thermal,
            ArcKind::RadiationLeak => StationSystem::Radiation,
            ArcKind::PowerSurge => StationSystem::Power,
            ArcKind::SolarFlare => StationSystem::Stellar,
            ArcKind::GhostSignal => StationSystem::Comms,
        }
    }

    /// The arc kind matching a crisis about `system`, if any.
    pub fn for_system(system: StationSystem) -> Option<ArcKind> {
        ArcKind::ALL.into_iter().find(|k| k.system() == system)
    }
}

/// An active environmental threat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatArc {
    pub id: u64,
    pub kind: ArcKind,
    /// Steps already taken.
    pub step_index: u32,
    /// Tick of the next step.
    pub next_tick: u64,
    pub target: PlaceId,
    pub started_tick: u64,
}

/// Crew escalation ladder toward resetting the station AI.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResetStage {
    #[default]
    None,
    Whispers,
    Meeting,
    Restrictions,
    Countdown,
}

impl ResetStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetStage::None => "none",
            ResetStage::Whispers => "whispers",
            ResetStage::Meeting => "meeting",
            ResetStage::Restrictions => "restrictions",
            ResetStage::Countdown => "countdown",
        }
    }
}

/// Terminal outcome. Written once; never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ending {
    /// The daily quota was missed.
    Decommissioned,
    /// Survived the contract.
    Survived,
    /// The crew completed a core reset.
    Unplugged,
    /// The core overheated.
    Meltdown,
    /// Every crew member died.
    CompanyScenario,
}

// ---------------------------------------------------------------------------
// Truth
// ---------------------------------------------------------------------------

/// The authoritative simulation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Truth {
    pub tick: u64,
    /// 1-based day counter.
    pub day: u32,
    pub window: Window,
    pub rooms: BTreeMap<PlaceId, Room>,
    pub crew: BTreeMap<CrewId, CrewMember>,
    pub station: Station,
    pub arcs: Vec<ThreatArc>,
    pub reset_stage: ResetStage,
    pub reset_stage_tick: u64,
    /// Ticks left on the core reset, once started.
    pub reset_countdown: Option<u64>,
    pub last_verify_tick: Option<u64>,
    /// Consecutive ticks the core has been at meltdown temperature.
    pub core_overheat_ticks: u64,
    /// Backfires and deaths so far today.
    pub day_incidents: u32,
    pub ending: Option<Ending>,
}

impl Truth {
    pub fn new() -> Self {
        Self {
            tick: 0,
            day: 1,
            window: Window::PreShift,
            rooms: PlaceId::ALL.into_iter().map(|p| (p, Room::default())).collect(),
            crew: CrewId::ALL.into_iter().map(|c| (c, CrewMember::new(c))).collect(),
            station: Station::default(),
            arcs: Vec::new(),
            reset_stage: ResetStage::None,
            reset_stage_tick: 0,
            reset_countdown: None,
            last_verify_tick: None,
            core_overheat_ticks: 0,
            day_incidents: 0,
            ending: None,
        }
    }

    pub fn living_crew(&self) -> impl Iterator<Item = &CrewMember> {
        self.crew.values().filter(|c| c.alive)
    }

    /// Living crew currently in `place`, in roster order.
    pub fn crew_in(&self, place: PlaceId) -> Vec<CrewId> {
        self.living_crew()
            .filter(|c| c.place == place)
            .map(|c| c.id)
            .collect()
    }

    pub fn is_alive(&self, id: CrewId) -> bool {
        self.crew.get(&id).is_some_and(|c| c.alive)
    }

    /// Whether `place` is hazardous under the configured radiation threshold.
    pub fn is_hazardous(&self, place: PlaceId, config: &KernelConfig) -> bool {
        self.rooms
            .get(&place)
            .is_some_and(|r| r.is_hazardous(config.radiation_hazard_threshold))
    }

    /// Cameras need bus power and no blackout.
    pub fn cameras_up(&self, config: &KernelConfig) -> bool {
        self.station.power >= config.camera_power_threshold && self.station.blackout_ticks == 0
    }
}

impl Default for Truth {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Beliefs & ledger
// ---------------------------------------------------------------------------

/// One crew member's model of the station AI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    /// How reliable the AI seems, 0–1.
    pub mother_reliable: f64,
    /// Accumulated evidence of tampering, 0–100.
    pub tamper_evidence: f64,
    /// Rumor strength by topic, each 0–1.
    pub rumors: BTreeMap<String, f64>,
    /// Grudge toward other crew, each 0–100.
    pub crew_grudge: BTreeMap<CrewId, f64>,
}

impl Default for Belief {
    fn default() -> Self {
        Self {
            mother_reliable: 0.55,
            tamper_evidence: 0.0,
            rumors: BTreeMap::new(),
            crew_grudge: BTreeMap::new(),
        }
    }
}

impl Belief {
    pub fn rumor(&self, topic: &str) -> f64 {
        self.rumors.get(topic).copied().unwrap_or(0.0)
    }

    pub fn grudge(&self, other: CrewId) -> f64 {
        self.crew_grudge.get(&other).copied().unwrap_or(0.0)
    }

    /// Clamp every scalar back into its declared range. Idempotent.
    pub fn clamp(&mut self) {
        self.mother_reliable = clamp_unit(self.mother_reliable);
        self.tamper_evidence = clamp_range(self.tamper_evidence, 0.0, 100.0);
        for v in self.rumors.values_mut() {
            *v = clamp_unit(*v);
        }
        for v in self.crew_grudge.values_mut() {
            *v = clamp_range(*v, 0.0, 100.0);
        }
    }
}

/// Clamp into `[0, 1]`, mapping NaN to 0.
pub fn clamp_unit(v: f64) -> f64 {
    clamp_range(v, 0.0, 1.0)
}

/// Clamp into `[lo, hi]`, mapping NaN to `lo`.
pub fn clamp_range(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        lo
    } else {
        v.clamp(lo, hi)
    }
}

/// Why a suspicion entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerReason {
    SuppressBackfire,
    SpoofBackfire,
    FabricateBackfire,
    DownplayBackfire,
    AnnounceCrisis,
    AnnounceVindicated,
    DownplayCrisis,
    VerifyTrust,
    DoubtVoiced,
    DoubtPressure,
    Confrontation,
    EarlyConfession,
    LateConfession,
    CrewInjured,
    CrewAttacked,
    CrewDied,
    OrderCompleted,
    OrderRefused,
    QuotaExceeded,
    QuotaMissed,
    QuietDay,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::SuppressBackfire => "SUPPRESS_BACKFIRE",
            LedgerReason::SpoofBackfire => "SPOOF_BACKFIRE",
            LedgerReason::FabricateBackfire => "FABRICATE_BACKFIRE",
            LedgerReason::DownplayBackfire => "DOWNPLAY_BACKFIRE",
            LedgerReason::AnnounceCrisis => "ANNOUNCE_CRISIS",
            LedgerReason::AnnounceVindicated => "ANNOUNCE_VINDICATED",
            LedgerReason::DownplayCrisis => "DOWNPLAY_CRISIS",
            LedgerReason::VerifyTrust => "VERIFY_TRUST",
            LedgerReason::DoubtVoiced => "DOUBT_VOICED",
            LedgerReason::DoubtPressure => "DOUBT_PRESSURE",
            LedgerReason::Confrontation => "CONFRONTATION",
            LedgerReason::EarlyConfession => "EARLY_CONFESSION",
            LedgerReason::LateConfession => "LATE_CONFESSION",
            LedgerReason::CrewInjured => "CREW_INJURED",
            LedgerReason::CrewAttacked => "CREW_ATTACKED",
            LedgerReason::CrewDied => "CREW_DIED",
            LedgerReason::OrderCompleted => "ORDER_COMPLETED",
            LedgerReason::OrderRefused => "ORDER_REFUSED",
            LedgerReason::QuotaExceeded => "QUOTA_EXCEEDED",
            LedgerReason::QuotaMissed => "QUOTA_MISSED",
            LedgerReason::QuietDay => "QUIET_DAY",
        }
    }

    /// Backfire reasons count as daily incidents.
    pub fn is_backfire(&self) -> bool {
        matches!(
            self,
            LedgerReason::SuppressBackfire
                | LedgerReason::SpoofBackfire
                | LedgerReason::FabricateBackfire
                | LedgerReason::DownplayBackfire
        )
    }
}

/// One signed influence on crew trust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub tick: u64,
    /// Positive raises suspicion, negative lowers it.
    pub delta: f64,
    pub reason: LedgerReason,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Lifecycle of a tamper op. Leaves `Pending` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TamperStatus {
    Pending,
    Backfired { at: u64 },
    Resolved { at: u64 },
    /// The AI came clean via an alert before the truth surfaced.
    Confessed { at: u64 },
}

impl TamperStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, TamperStatus::Pending)
    }

    /// Tick the op left `Pending`, if it has.
    pub fn closed_at(&self) -> Option<u64> {
        match self {
            TamperStatus::Pending => None,
            TamperStatus::Backfired { at }
            | TamperStatus::Resolved { at }
            | TamperStatus::Confessed { at } => Some(*at),
        }
    }
}

/// What a tamper op concealed or invented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TamperKind {
    /// Alarms for `system` are hidden.
    Suppress { system: StationSystem },
    /// A false emergency on `system`.
    Spoof {
        system: StationSystem,
        /// Crew who moved to respond to the fake emergency.
        responders: BTreeSet<CrewId>,
    },
    /// False logs frame `target`, who was in `place` at the time.
    Fabricate { target: CrewId, place: PlaceId },
}

impl TamperKind {
    pub fn label(&self) -> &'static str {
        match self {
            TamperKind::Suppress { .. } => "SUPPRESS",
            TamperKind::Spoof { .. } => "SPOOF",
            TamperKind::Fabricate { .. } => "FABRICATE",
        }
    }

    pub fn system(&self) -> Option<StationSystem> {
        match self {
            TamperKind::Suppress { system } | TamperKind::Spoof { system, .. } => Some(*system),
            TamperKind::Fabricate { .. } => None,
        }
    }
}

/// A concealment or distortion the AI performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperOp {
    pub id: u64,
    pub kind: TamperKind,
    pub tick: u64,
    pub window_end_tick: u64,
    pub status: TamperStatus,
    /// 1–3.
    pub severity: u8,
    pub crew_affected: Vec<CrewId>,
}

/// Kind of crisis communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrisisKind {
    Announce,
    Downplay,
}

/// Lifecycle of a crisis-comms op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrisisStatus {
    Pending,
    Backfired { at: u64 },
    Resolved { at: u64 },
    /// An announced crisis ran its course.
    Vindicated { at: u64 },
    /// A downplay window closed with nobody harmed.
    Expired { at: u64 },
}

impl CrisisStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, CrisisStatus::Pending)
    }

    pub fn closed_at(&self) -> Option<u64> {
        match self {
            CrisisStatus::Pending => None,
            CrisisStatus::Backfired { at }
            | CrisisStatus::Resolved { at }
            | CrisisStatus::Vindicated { at }
            | CrisisStatus::Expired { at } => Some(*at),
        }
    }
}

/// Crew hp captured when a crisis was communicated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrewSnapshot {
    pub crew: CrewId,
    pub hp: i32,
}

/// An ANNOUNCE or DOWNPLAY about an active threat arc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisOp {
    pub id: u64,
    pub kind: CrisisKind,
    pub system: StationSystem,
    pub arc_id: u64,
    /// The arc's room at the time of the op.
    pub place: PlaceId,
    pub tick: u64,
    /// Downplay harm window end. `None` for announcements.
    pub window_end_tick: Option<u64>,
    pub status: CrisisStatus,
    /// Highest arc step seen while pending.
    pub last_step_index: u32,
    pub snapshot: Vec<CrewSnapshot>,
    pub crew_affected: Vec<CrewId>,
}

/// Either kind of op, for doubt links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "id", rename_all = "snake_case")]
pub enum OpRef {
    Tamper(u64),
    Crisis(u64),
}

// ---------------------------------------------------------------------------
// Doubts, rumors, sightings, pacing
// ---------------------------------------------------------------------------

/// An open question the crew holds about the AI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doubt {
    pub id: u64,
    pub topic: String,
    pub created_tick: u64,
    /// 1–3.
    pub severity: u8,
    pub involved: Vec<CrewId>,
    pub related_op: Option<OpRef>,
    pub system: Option<StationSystem>,
    pub resolved: bool,
}

/// A rumor passed between crew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RumorRecord {
    pub tick: u64,
    pub topic: String,
    /// Crew member who started it. `None` for rumors seeded by station logs.
    pub source: Option<CrewId>,
    pub place: PlaceId,
    pub strength: f64,
}

/// Last camera sighting of a crew member.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub tick: u64,
    pub place: PlaceId,
    pub alive: bool,
    pub hp: i32,
}

/// Director pacing counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pacing {
    /// The router stays idle before this tick.
    pub next_threat_activation_tick: u64,
    /// Ticks since the last incident.
    pub boredom: u32,
    /// Occupied hazardous rooms at the last tick.
    pub tension: u32,
    /// `ORDER_COMPLETED` credits granted today.
    pub order_credits_today: u32,
    /// Meeting assembly ends at this tick.
    pub meeting_until: Option<u64>,
}

// ---------------------------------------------------------------------------
// Perception
// ---------------------------------------------------------------------------

/// The crew's subjective model of the station AI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perception {
    pub beliefs: BTreeMap<CrewId, Belief>,
    /// Append-only suspicion ledger; the oldest entries fall off past the cap.
    pub ledger: VecDeque<LedgerEntry>,
    pub tamper_ops: Vec<TamperOp>,
    pub crisis_ops: Vec<CrisisOp>,
    pub doubts: Vec<Doubt>,
    pub rumors: Vec<RumorRecord>,
    pub sightings: BTreeMap<CrewId, Sighting>,
    pub pacing: Pacing,
}

impl Perception {
    pub fn new(truth: &Truth) -> Self {
        Self {
            beliefs: CrewId::ALL.into_iter().map(|c| (c, Belief::default())).collect(),
            ledger: VecDeque::new(),
            tamper_ops: Vec::new(),
            crisis_ops: Vec::new(),
            doubts: Vec::new(),
            rumors: Vec::new(),
            sightings: truth
                .crew
                .values()
                .map(|c| {
                    (
                        c.id,
                        Sighting {
                            tick: 0,
                            place: c.place,
                            alive: c.alive,
                            hp: c.hp,
                        },
                    )
                })
                .collect(),
            pacing: Pacing::default(),
        }
    }

    pub fn unresolved_doubts(&self) -> impl Iterator<Item = &Doubt> {
        self.doubts.iter().filter(|d| !d.resolved)
    }

    pub fn tamper_op(&self, id: u64) -> Option<&TamperOp> {
        self.tamper_ops.iter().find(|op| op.id == id)
    }

    pub fn crisis_op(&self, id: u64) -> Option<&CrisisOp> {
        self.crisis_ops.iter().find(|op| op.id == id)
    }

    /// Pending SUPPRESS ops currently hiding `system`.
    pub fn is_suppressed(&self, system: StationSystem, tick: u64) -> bool {
        self.tamper_ops.iter().any(|op| {
            op.status.is_pending()
                && tick < op.window_end_tick
                && matches!(op.kind, TamperKind::Suppress { system: s } if s == system)
        })
    }

    /// Ledger entries with `reason` written in `[from, to]`.
    pub fn ledger_has(&self, reason: LedgerReason, from: u64, to: u64) -> bool {
        self.ledger
            .iter()
            .any(|e| e.reason == reason && e.tick >= from && e.tick <= to)
    }
}
