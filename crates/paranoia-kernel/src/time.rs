//! Tick → hour → window mapping.

use serde::{Deserialize, Serialize};

/// Simulation ticks per in-game hour.
pub const TICKS_PER_HOUR: u64 = 10;
/// Simulation ticks per in-game day.
pub const TICKS_PER_DAY: u64 = TICKS_PER_HOUR * 24;

/// One of the four daily schedule windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    /// Hours 0–7.
    PreShift,
    /// Hours 8–15.
    Shift,
    /// Hours 16–19. Rumors spread.
    Evening,
    /// Hours 20–23.
    Night,
}

impl Window {
    /// The window containing `tick`.
    pub fn at(tick: u64) -> Self {
        match hour_of(tick) {
            0..=7 => Window::PreShift,
            8..=15 => Window::Shift,
            16..=19 => Window::Evening,
            _ => Window::Night,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Window::PreShift => 0,
            Window::Shift => 1,
            Window::Evening => 2,
            Window::Night => 3,
        }
    }

    /// Short label ("W1".."W4").
    pub fn label(&self) -> &'static str {
        match self {
            Window::PreShift => "W1",
            Window::Shift => "W2",
            Window::Evening => "W3",
            Window::Night => "W4",
        }
    }
}

/// Hour of day (0–23) for `tick`.
pub fn hour_of(tick: u64) -> u64 {
    (tick % TICKS_PER_DAY) / TICKS_PER_HOUR
}

/// Whether `tick` is the last tick of a day.
pub fn is_day_end(tick: u64) -> bool {
    tick > 0 && tick % TICKS_PER_DAY == 0
}
