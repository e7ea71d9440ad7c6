//! Which messages a deletion run selects.

use chrono::{DateTime, TimeDelta, Utc};

/// Time bounds of one deletion run.
///
/// When both bounds are present they are ORed, not ANDed: a message matches
/// if it is older than `older_than` *or* at least as new as `newer_than`.
/// The "all" test run relies on this (`older_than = now`,
/// `newer_than = epoch`). Do not reuse the two-sided form for new selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub older_than: Option<DateTime<Utc>>,
    pub newer_than: Option<DateTime<Utc>>,
}

impl Selection {
    pub fn older_than(limit: DateTime<Utc>) -> Self {
        Self {
            older_than: Some(limit),
            newer_than: None,
        }
    }

    pub fn newer_than(start: DateTime<Utc>) -> Self {
        Self {
            older_than: None,
            newer_than: Some(start),
        }
    }

    /// Everything: `older_than = now` OR `newer_than = epoch`.
    pub fn everything(now: DateTime<Utc>) -> Self {
        Self {
            older_than: Some(now),
            newer_than: Some(unix_epoch()),
        }
    }

    /// Scheduled sweep: messages older than `hours` before `now`.
    pub fn retention(now: DateTime<Utc>, hours: u32) -> Self {
        Self::older_than(saturating_sub(now, TimeDelta::hours(i64::from(hours))))
    }

    pub fn is_empty(&self) -> bool {
        self.older_than.is_none() && self.newer_than.is_none()
    }

    pub fn matches(&self, timestamp: DateTime<Utc>) -> bool {
        let is_old = self.older_than.is_some_and(|limit| timestamp < limit);
        let is_new = self.newer_than.is_some_and(|start| timestamp >= start);
        is_old || is_new
    }
}

fn unix_epoch() -> DateTime<Utc> {
    // Default for `DateTime<Utc>` is 1970-01-01T00:00:00Z.
    DateTime::<Utc>::default()
}

fn saturating_sub(now: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    now.checked_sub_signed(delta)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parse `last<N>d<N>h<N>m` (each part optional, in that order, case-insensitive).
///
/// Returns `None` for malformed input and for a zero total so callers can
/// fall through to the other selector forms.
pub fn parse_last_duration(input: &str) -> Option<TimeDelta> {
    let trimmed = input.trim();
    let prefix = trimmed.get(..4)?;
    if !prefix.eq_ignore_ascii_case("last") {
        return None;
    }

    let mut rest = &trimmed[4..];
    let mut parts = [0_i64; 3];
    let mut seen_any = false;

    for (slot, unit) in ['d', 'h', 'm'].into_iter().enumerate() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            continue;
        }
        let next = rest[digits..].chars().next()?;
        if !next.eq_ignore_ascii_case(&unit) {
            continue;
        }
        parts[slot] = rest[..digits].parse().ok()?;
        rest = &rest[digits + 1..];
        seen_any = true;
    }

    if !rest.is_empty() || !seen_any {
        return None;
    }

    let [days, hours, minutes] = parts;
    let total_minutes = days
        .checked_mul(24 * 60)?
        .checked_add(hours.checked_mul(60)?)?
        .checked_add(minutes)?;
    if total_minutes <= 0 {
        return None;
    }
    TimeDelta::try_minutes(total_minutes)
}

/// Selector accepted by the test-run command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestSelector {
    /// Every message in the channel.
    All,
    /// Messages older than N hours.
    OlderThanHours(u32),
    /// Messages newer than `now - window`.
    Last(TimeDelta),
}

impl TestSelector {
    /// Resolution order: `last…`, then `all`, then a non-negative hour count.
    pub fn parse(input: &str) -> Option<Self> {
        if let Some(window) = parse_last_duration(input) {
            return Some(Self::Last(window));
        }
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        let hours = trimmed.parse::<u32>().ok()?;
        TimeDelta::try_hours(i64::from(hours))?;
        Some(Self::OlderThanHours(hours))
    }

    pub fn selection(&self, now: DateTime<Utc>) -> Selection {
        match *self {
            Self::All => Selection::everything(now),
            Self::OlderThanHours(hours) => Selection::retention(now, hours),
            Self::Last(window) => Selection::newer_than(saturating_sub(now, window)),
        }
    }

    /// Human-readable summary used in the "starting" reply.
    pub fn describe(&self) -> String {
        match *self {
            Self::All => "Deleting all messages in the channel.".to_string(),
            Self::OlderThanHours(hours) => format!("Deleting messages older than {hours} hours."),
            Self::Last(window) => format!(
                "Deleting messages from the last {}.",
                format_window(window)
            ),
        }
    }
}

fn format_window(window: TimeDelta) -> String {
    let total = window.num_minutes();
    let (days, hours, minutes) = (total / 1440, (total % 1440) / 60, total % 60);
    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}
