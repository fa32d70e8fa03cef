//! Time source and record timestamp formatting.

use chrono::{DateTime, FixedOffset, Utc};

/// Bangkok, the offset records were historically stamped in
pub const DEFAULT_RECORD_OFFSET: &str = "+07:00";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// `M/D/YYYY h:mm:ss AM|PM` in the given civil offset
pub fn format_record_date(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset)
        .format("%-m/%-d/%Y %-I:%M:%S %p")
        .to_string()
}

/// Parse `+HH:MM` / `-HH:MM`
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, String> {
    value
        .trim()
        .parse::<FixedOffset>()
        .map_err(|e| format!("invalid UTC offset {:?}: {}", value, e))
}
