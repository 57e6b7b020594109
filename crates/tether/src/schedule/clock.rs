use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A wall-clock time of day with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    pub const NOON: TimeOfDay = TimeOfDay { hour: 12, minute: 0 };
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn to_naive(self) -> Option<chrono::NaiveTime> {
        chrono::NaiveTime::from_hms_opt(self.hour, self.minute, 0)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hour12, meridiem) = match self.hour {
            0 => (12, "AM"),
            1..=11 => (self.hour, "AM"),
            12 => (12, "PM"),
            _ => (self.hour - 12, "PM"),
        };
        write!(f, "{}:{:02} {}", hour12, self.minute, meridiem)
    }
}

fn clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})(?::(\d{2}))?\s*(am|pm|a\.m\.|p\.m\.)?$").expect("clock regex")
    })
}

/// Parse `H`, `H:MM`, `Ham`, `H:MMpm`, `H pm` (already lowercased).
///
/// Without a meridiem the hour is taken literally, so `"5"` is 05:00.
/// With one, the hour must be 1-12; `12am` is midnight and `12pm` is noon.
pub fn parse_clock(text: &str) -> Option<TimeOfDay> {
    let caps = clock_re().captures(text.trim())?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };

    let hour = match caps.get(3).map(|m| m.as_str().starts_with('p')) {
        None => hour,
        Some(_) if !(1..=12).contains(&hour) => return None,
        Some(false) => hour % 12,
        Some(true) => hour % 12 + 12,
    };

    TimeOfDay::new(hour, minute)
}

/// True when a token can only be read as a clock time (`9am`, `14:30`),
/// as opposed to a bare number that might be a day of month.
pub fn looks_like_clock(token: &str) -> bool {
    token.contains(':') || token.ends_with("am") || token.ends_with("pm") || token.ends_with('.')
}
