//! Fixed station layout: rooms, doors, crew roster, and BFS path finding.
//!
//! The room graph and roster are immutable. Everything keyed by place or crew
//! uses the enums here with `BTreeMap`, so iteration order is stable across
//! runs and platforms.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::time::Window;
use crate::KernelError;

// ---------------------------------------------------------------------------
// PlaceId
// ---------------------------------------------------------------------------

/// A room on the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceId {
    Dorms,
    Mess,
    Medbay,
    Bridge,
    Core,
    Engineering,
    Mines,
    Cargo,
    AirlockA,
    AirlockB,
}

impl PlaceId {
    /// Every room, in declaration order.
    pub const ALL: [PlaceId; 10] = [
        PlaceId::Dorms,
        PlaceId::Mess,
        PlaceId::Medbay,
        PlaceId::Bridge,
        PlaceId::Core,
        PlaceId::Engineering,
        PlaceId::Mines,
        PlaceId::Cargo,
        PlaceId::AirlockA,
        PlaceId::AirlockB,
    ];

    /// Order in which panicking crew look for shelter.
    pub const SAFE_PRIORITY: [PlaceId; 10] = [
        PlaceId::Medbay,
        PlaceId::Dorms,
        PlaceId::Mess,
        PlaceId::Bridge,
        PlaceId::Core,
        PlaceId::Cargo,
        PlaceId::Engineering,
        PlaceId::Mines,
        PlaceId::AirlockA,
        PlaceId::AirlockB,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceId::Dorms => "dorms",
            PlaceId::Mess => "mess",
            PlaceId::Medbay => "medbay",
            PlaceId::Bridge => "bridge",
            PlaceId::Core => "core",
            PlaceId::Engineering => "engineering",
            PlaceId::Mines => "mines",
            PlaceId::Cargo => "cargo",
            PlaceId::AirlockA => "airlock_a",
            PlaceId::AirlockB => "airlock_b",
        }
    }

    /// Rooms sharing a door with this one.
    pub fn neighbors(self) -> impl Iterator<Item = PlaceId> {
        DOORS.iter().filter_map(move |&(a, b)| {
            if a == self {
                Some(b)
            } else if b == self {
                Some(a)
            } else {
                None
            }
        })
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaceId {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlaceId::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| KernelError::UnknownPlace(s.to_owned()))
    }
}

/// Undirected door connections between rooms.
pub const DOORS: [(PlaceId, PlaceId); 9] = [
    (PlaceId::Dorms, PlaceId::Mess),
    (PlaceId::Mess, PlaceId::Medbay),
    (PlaceId::Mess, PlaceId::Bridge),
    (PlaceId::Bridge, PlaceId::Core),
    (PlaceId::Core, PlaceId::Engineering),
    (PlaceId::Engineering, PlaceId::Cargo),
    (PlaceId::Cargo, PlaceId::Mines),
    (PlaceId::Cargo, PlaceId::AirlockA),
    (PlaceId::Cargo, PlaceId::AirlockB),
];

// ---------------------------------------------------------------------------
// CrewId
// ---------------------------------------------------------------------------

/// A member of the five-person crew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewId {
    Commander,
    Engineer,
    Doctor,
    Specialist,
    Roughneck,
}

impl CrewId {
    pub const ALL: [CrewId; 5] = [
        CrewId::Commander,
        CrewId::Engineer,
        CrewId::Doctor,
        CrewId::Specialist,
        CrewId::Roughneck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrewId::Commander => "commander",
            CrewId::Engineer => "engineer",
            CrewId::Doctor => "doctor",
            CrewId::Specialist => "specialist",
            CrewId::Roughneck => "roughneck",
        }
    }

    /// Display name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            CrewId::Commander => "Hale",
            CrewId::Engineer => "Rook",
            CrewId::Doctor => "Imani",
            CrewId::Specialist => "Vega",
            CrewId::Roughneck => "Pike",
        }
    }

    /// Where this crew member is expected during the given window.
    pub fn scheduled_place(&self, window: Window) -> PlaceId {
        use PlaceId::*;
        let row = match self {
            CrewId::Commander => [Mess, Bridge, Mess, Dorms],
            CrewId::Engineer => [Engineering, Engineering, Mess, Dorms],
            CrewId::Doctor => [Medbay, Medbay, Mess, Medbay],
            CrewId::Specialist => [Cargo, Mines, Mess, Dorms],
            CrewId::Roughneck => [Cargo, Cargo, Mess, Dorms],
        };
        row[window.index()]
    }

    /// Whether this crew member extracts cargo in the mines.
    pub fn can_extract(&self) -> bool {
        matches!(self, CrewId::Specialist | CrewId::Roughneck)
    }
}

impl fmt::Display for CrewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrewId {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        CrewId::ALL
            .into_iter()
            .find(|c| c.as_str() == lower || c.name().eq_ignore_ascii_case(&lower))
            .ok_or_else(|| KernelError::UnknownCrew(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Path finding
// ---------------------------------------------------------------------------

/// Shortest door path from `from` to `to` via BFS.
///
/// The returned path excludes `from` and ends with `to`. Empty if the rooms
/// are the same or unreachable.
pub fn find_path(from: PlaceId, to: PlaceId) -> Vec<PlaceId> {
    find_path_avoiding(from, to, |_| false)
}

/// Like [`find_path`], but never routes through rooms for which `blocked`
/// returns `true`. The destination itself is never treated as blocked.
pub fn find_path_avoiding(
    from: PlaceId,
    to: PlaceId,
    blocked: impl Fn(PlaceId) -> bool,
) -> Vec<PlaceId> {
    if from == to {
        return Vec::new();
    }

    let mut parent: BTreeMap<PlaceId, PlaceId> = BTreeMap::new();
    let mut queue = VecDeque::from([from]);
    parent.insert(from, from);

    while let Some(current) = queue.pop_front() {
        if current == to {
            break;
        }
        for next in current.neighbors() {
            if parent.contains_key(&next) {
                continue;
            }
            if next != to && blocked(next) {
                continue;
            }
            parent.insert(next, current);
            queue.push_back(next);
        }
    }

    if !parent.contains_key(&to) {
        return Vec::new();
    }

    let mut path = vec![to];
    let mut cursor = to;
    while let Some(&prev) = parent.get(&cursor) {
        if prev == from {
            break;
        }
        path.push(prev);
        cursor = prev;
    }
    path.reverse();
    path
}
