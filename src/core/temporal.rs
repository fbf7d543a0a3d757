//! Temporal data types and time handling

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Local date/time paired with its UTC offset.
///
/// The offset magnitude is always below 24 hours; whole days of a larger
/// offset are moved into the local value so that the represented UTC
/// instant does not change. The UTC instant is computed once, at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalTimeValue {
    local: NaiveDateTime,
    offset: Duration,
    utc: DateTime<Utc>,
}

impl CanonicalTimeValue {
    /// Create a value from a naive local date/time and its UTC offset
    pub fn new(local: NaiveDateTime, offset: Duration) -> Self {
        let whole_days = Duration::days(offset.num_days());
        let (local, offset) = if whole_days.is_zero() {
            (local, offset)
        } else {
            (
                local.checked_sub_signed(whole_days).unwrap_or(local),
                offset - whole_days,
            )
        };

        let utc_naive = local.checked_sub_signed(offset).unwrap_or(
            if offset > Duration::zero() {
                NaiveDateTime::MIN
            } else {
                NaiveDateTime::MAX
            },
        );

        Self {
            local,
            offset,
            utc: Utc.from_utc_datetime(&utc_naive),
        }
    }

    /// Express a UTC instant in the given offset
    pub fn from_utc(utc: DateTime<Utc>, offset: Duration) -> Self {
        let offset = offset - Duration::days(offset.num_days());
        let local = utc
            .naive_utc()
            .checked_add_signed(offset)
            .unwrap_or_else(|| utc.naive_utc());
        Self::new(local, offset)
    }

    /// Local (wall clock) date/time
    pub fn local(&self) -> NaiveDateTime {
        self.local
    }

    /// UTC offset, always within (-24h, 24h)
    pub fn utc_offset(&self) -> Duration {
        self.offset
    }

    /// The represented instant in UTC
    pub fn to_utc(&self) -> DateTime<Utc> {
        self.utc
    }
}

impl fmt::Display for CanonicalTimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.local.format("%Y-%m-%dT%H:%M:%S%.f"),
            format_offset(self.offset)
        )
    }
}

/// Half-open UTC time range `[begin, end)`.
///
/// An empty range is represented by `begin = +inf` and `end = -inf` so that
/// min/max reductions over several ranges are unaffected by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { begin, end }
    }

    /// The empty range (`+inf`, `-inf`)
    pub fn empty() -> Self {
        Self {
            begin: DateTime::<Utc>::MAX_UTC,
            end: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// True when no instant is covered
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    /// Check if a timestamp is within this range
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.begin && ts < self.end
    }

    /// Smallest range covering both
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }
}

/// Reference instant for period alignment (0001-01-01T00:00:00).
///
/// Doubles as the date placeholder for names that only carry a time of day.
pub fn reference_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Total nanoseconds of a duration
pub fn nanos(d: Duration) -> i128 {
    d.num_seconds() as i128 * NANOS_PER_SECOND + d.subsec_nanos() as i128
}

/// Build a duration from nanoseconds
pub fn from_nanos(n: i128) -> Duration {
    let secs = n.div_euclid(NANOS_PER_SECOND) as i64;
    let rest = n.rem_euclid(NANOS_PER_SECOND) as i64;
    Duration::seconds(secs) + Duration::nanoseconds(rest)
}

/// Number of whole `unit`s in `d`, truncated toward zero
pub fn count(d: Duration, unit: Duration) -> i128 {
    nanos(d) / nanos(unit)
}

/// Round a local value down to a multiple of `period` since the reference epoch
pub fn round_down(t: NaiveDateTime, period: Duration) -> NaiveDateTime {
    let epoch = reference_epoch();
    let ticks = nanos(t.signed_duration_since(epoch));
    let p = nanos(period);
    if p <= 0 {
        return t;
    }
    epoch + from_nanos(ticks - ticks.rem_euclid(p))
}

/// True if `t` lies exactly on a multiple of `period` since the Unix epoch
pub fn is_multiple_of(t: DateTime<Utc>, period: Duration) -> bool {
    let p = nanos(period);
    let ticks = t.timestamp() as i128 * NANOS_PER_SECOND + t.timestamp_subsec_nanos() as i128;
    p > 0 && ticks.rem_euclid(p) == 0
}

/// Render an offset as `+hh:mm`
pub fn format_offset(offset: Duration) -> String {
    let sign = if offset < Duration::zero() { '-' } else { '+' };
    let minutes = offset.num_minutes().abs();
    format!("{}{:02}:{:02}", sign, minutes / 60, minutes % 60)
}

/// Parse `Z`, `+hh:mm`, `-hh:mm` or `+hhmm`
pub fn parse_offset(text: &str) -> Option<Duration> {
    if text == "Z" || text == "z" {
        return Some(Duration::zero());
    }
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i64 = digits[..2].parse().ok()?;
    let minutes: i64 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    Some(Duration::minutes(sign * (hours * 60 + minutes)))
}
