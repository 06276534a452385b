use serde::{Deserialize, Serialize};

// =============================================================================
// Time of Day
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn display_name(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Evening => "Evening",
            TimeOfDay::Night => "Night",
        }
    }

    /// Returns the period for an hour of the day (0-23).
    pub fn from_hour(hour: u8) -> TimeOfDay {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            18..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// =============================================================================
// Game Clock
// =============================================================================

/// The campaign's world clock.
///
/// Days are 1-based; hour/minute follow a 24-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameClock {
    pub day: u32,
    pub hour: u8,
    pub minute: u8,
}

impl GameClock {
    pub fn new(day: u32, hour: u8, minute: u8) -> Self {
        Self { day, hour, minute }
    }

    /// Current time-of-day period.
    pub fn period(&self) -> TimeOfDay {
        TimeOfDay::from_hour(self.hour)
    }

    /// Advance the clock by a number of in-game minutes.
    pub fn advance_minutes(&self, minutes: u32) -> GameClock {
        let total = self.total_minutes() + minutes as i64;
        GameClock {
            day: (total / (24 * 60)) as u32 + 1,
            hour: ((total / 60) % 24) as u8,
            minute: (total % 60) as u8,
        }
    }

    /// Minutes elapsed since day 1, 00:00.
    pub fn total_minutes(&self) -> i64 {
        (self.day as i64 - 1) * 24 * 60 + (self.hour as i64) * 60 + (self.minute as i64)
    }

    /// 12-hour display string, e.g. "3:05 PM".
    pub fn formatted_time(&self) -> String {
        let am_pm = if self.hour >= 12 { "PM" } else { "AM" };
        let display_hour = if self.hour == 0 {
            12
        } else if self.hour > 12 {
            self.hour - 12
        } else {
            self.hour
        };
        format!("{}:{:02} {}", display_hour, self.minute, am_pm)
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self {
            day: 1,
            hour: 9,
            minute: 0,
        }
    }
}
