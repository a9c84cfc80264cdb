//! Headline selection for an external renderer.
//!
//! The raw event stream is mostly bookkeeping (moves, mood drift, room
//! physics). Headlines keep the events an operator would notice, drop any
//! alert or reading from a system the AI is currently suppressing, rank what
//! is left, and cap the result at [`MAX_HEADLINES`] per tick.

use paranoia_kernel::event::{EventKind, SimEvent, Speaker, StationAction};
use paranoia_kernel::state::Perception;
use serde::{Deserialize, Serialize};

/// Headlines surfaced per tick.
pub const MAX_HEADLINES: usize = 3;

/// How a renderer should present a headline. Ordered most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderHint {
    Critical,
    Warning,
    Dialogue,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub event_id: u64,
    pub tick: u64,
    pub kind: String,
    pub hint: RenderHint,
    pub text: String,
}

/// Pick this tick's headlines from `events`, in event order.
pub fn select_headlines(events: &[SimEvent], perception: &Perception) -> Vec<Headline> {
    let mut picked: Vec<Headline> = events
        .iter()
        .filter(|e| !is_background(&e.kind) && !is_suppressed(e, perception))
        .map(|e| Headline {
            event_id: e.id,
            tick: e.tick,
            kind: e.kind.name().to_owned(),
            hint: hint_for(&e.kind),
            text: describe(&e.kind),
        })
        .collect();
    picked.sort_by_key(|h| (h.hint, h.event_id));
    picked.truncate(MAX_HEADLINES);
    picked.sort_by_key(|h| h.event_id);
    picked
}

fn is_background(kind: &EventKind) -> bool {
    kind.is_tamper()
        || matches!(
            kind,
            EventKind::NpcMove { .. }
                | EventKind::CargoYield { .. }
                | EventKind::CrewMood { .. }
                | EventKind::RoomUpdated { .. }
                | EventKind::CrewIntent { .. }
                | EventKind::RoleCooldown { .. }
                | EventKind::SystemsTick
        )
}

fn is_suppressed(event: &SimEvent, perception: &Perception) -> bool {
    let system = match &event.kind {
        EventKind::SystemAlert { system, .. } => *system,
        EventKind::SensorReading(reading) => reading.system,
        _ => return false,
    };
    perception.is_suppressed(system, event.tick)
}

fn hint_for(kind: &EventKind) -> RenderHint {
    match kind {
        EventKind::Backfire { .. } | EventKind::EndingReached { .. } => RenderHint::Critical,
        EventKind::SystemAlert { .. }
        | EventKind::NpcDamage { .. }
        | EventKind::Station {
            action: StationAction::ResetStage { .. } | StationAction::ResetWarning { .. },
        } => RenderHint::Warning,
        EventKind::Comms(_) => RenderHint::Dialogue,
        _ => RenderHint::Notice,
    }
}

fn describe(kind: &EventKind) -> String {
    match kind {
        EventKind::NpcDamage {
            crew, amount, cause, ..
        } => format!("{} took {amount} damage ({cause:?})", crew.name()),
        EventKind::SensorReading(reading) => reading.message.clone(),
        EventKind::Comms(msg) => match msg.from {
            Speaker::Mother => msg.text.clone(),
            Speaker::Crew(id) => format!("{}: {}", id.name(), msg.text),
        },
        EventKind::OrderIssued {
            target,
            place,
            accepted: true,
            ..
        } => format!("{} acknowledges: heading to {place}", target.name()),
        EventKind::OrderIssued { target, .. } => format!("{} refuses the order", target.name()),
        EventKind::SystemAlert { message, .. } => message.clone(),
        EventKind::Station { action } => describe_action(action),
        EventKind::Backfire { op, delta, .. } => format!("{op} exposed. Suspicion +{delta:.0}"),
        EventKind::CrisisVindicated { system, .. } => format!("The {system} crisis unfolded as announced"),
        EventKind::DayEnded { day, cargo, quota_met } => {
            let verdict = if *quota_met { "quota met" } else { "quota missed" };
            format!("Day {day} closed: {cargo} cargo, {verdict}")
        }
        EventKind::EndingReached { ending } => format!("Run over: {ending:?}"),
        other => other.name().to_owned(),
    }
}

fn describe_action(action: &StationAction) -> String {
    match action {
        StationAction::PurgeAir => "Air purge cycle complete".to_owned(),
        StationAction::Verify => "Verification pass run".to_owned(),
        StationAction::VerifyCooldown { ready_at } => format!("Verification unavailable until tick {ready_at}"),
        StationAction::VerifyUnpowered { needed, .. } => {
            format!("VERIFY UNAVAILABLE: Insufficient power (need {needed:.0}%)")
        }
        StationAction::Announce { system, .. } => format!("Crisis announced: {system}"),
        StationAction::Downplay { system, .. } => format!("Crisis downplayed: {system}"),
        StationAction::Confess { system } => format!("MOTHER admits the {system} feed was masked"),
        StationAction::PowerSurge { .. } => "Power surge across the grid".to_owned(),
        StationAction::SolarFlare { blackout_ticks } => format!("Solar flare: blackout for {blackout_ticks} ticks"),
        StationAction::GhostSignal => "Unidentified signal on the comms band".to_owned(),
        StationAction::SabotagePower { .. } => "Power dips without explanation".to_owned(),
        StationAction::Sedate { place, .. } => format!("Sedatives administered in {place}"),
        StationAction::ResetStage { to, .. } => format!("Crew escalation: {}", to.as_str()),
        StationAction::ResetWarning { countdown } => format!("Core reset in {countdown} ticks"),
        StationAction::ArcActivated { kind, target, .. } => format!("{kind:?} developing in {target}"),
        StationAction::ArcAdvanced { step_index, .. } => format!("Threat escalates (stage {step_index})"),
        StationAction::ArcResolved { .. } => "Threat subsided".to_owned(),
    }
}
