//! Time zone handling for `time_zone` and TIMESTAMP columns

use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

/// A `time_zone` value: `SYSTEM`, `UTC`, or a fixed `±HH:MM` offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeZoneSpec {
    /// Host zone, resolved through the process's `TZ`
    System,
    Utc,
    Offset(FixedOffset),
}

impl TimeZoneSpec {
    /// Parse a `time_zone` setting (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("SYSTEM") {
            return Some(TimeZoneSpec::System);
        }
        if s.eq_ignore_ascii_case("UTC") || s.eq_ignore_ascii_case("GMT") {
            return Some(TimeZoneSpec::Utc);
        }

        let (sign, rest) = match s.as_bytes().first()? {
            b'+' => (1, &s[1..]),
            b'-' => (-1, &s[1..]),
            _ => return None,
        };
        let (hours, minutes) = rest.split_once(':')?;
        let hours: i32 = hours.parse().ok()?;
        let minutes: i32 = minutes.parse().ok()?;
        if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) || minutes > 0 && hours == 14 {
            return None;
        }
        let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
        if offset.local_minus_utc() == 0 {
            return Some(TimeZoneSpec::Utc);
        }
        Some(TimeZoneSpec::Offset(offset))
    }

    /// Canonical name as reported by `@@time_zone`
    pub fn name(&self) -> String {
        match self {
            TimeZoneSpec::System => "SYSTEM".to_string(),
            TimeZoneSpec::Utc => "UTC".to_string(),
            TimeZoneSpec::Offset(offset) => {
                let secs = offset.local_minus_utc();
                let sign = if secs < 0 { '-' } else { '+' };
                let secs = secs.abs();
                format!("{}{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60)
            }
        }
    }

    /// Convert a UTC instant to wall-clock time in this zone
    pub fn from_utc(&self, utc: NaiveDateTime) -> NaiveDateTime {
        match self {
            TimeZoneSpec::Utc => utc,
            TimeZoneSpec::System => Local.from_utc_datetime(&utc).naive_local(),
            TimeZoneSpec::Offset(offset) => offset.from_utc_datetime(&utc).naive_local(),
        }
    }

    /// Convert wall-clock time in this zone to a UTC instant.
    ///
    /// Ambiguous local times resolve to the earlier instant; times skipped
    /// by a DST jump are taken at the standard offset.
    pub fn to_utc(&self, local: NaiveDateTime) -> NaiveDateTime {
        match self {
            TimeZoneSpec::Utc => local,
            TimeZoneSpec::System => match Local.from_local_datetime(&local).earliest() {
                Some(dt) => dt.naive_utc(),
                None => {
                    let offset = Local.offset_from_utc_datetime(&local).fix();
                    local - chrono::Duration::seconds(i64::from(offset.local_minus_utc()))
                }
            },
            TimeZoneSpec::Offset(offset) => {
                local - chrono::Duration::seconds(i64::from(offset.local_minus_utc()))
            }
        }
    }

    /// Current wall-clock time in this zone
    pub fn now(&self) -> NaiveDateTime {
        self.from_utc(Utc::now().naive_utc())
    }
}

/// Parse MySQL date/time literals
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_date(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d").to_string()
}
