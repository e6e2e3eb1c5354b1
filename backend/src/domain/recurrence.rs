//! Recurrence expansion behind a small, library-agnostic interface.
//!
//! The planner only sees [`RecurrenceExpansion::next_after`]: a lazy,
//! restartable walk over local wall-clock occurrence times. The `rrule`
//! crate does the actual RRULE iteration; its types stay inside this module.
//!
//! Expansion runs on wall-clock time: the seed's local fields are written
//! into a `DTSTART:...Z` header (unless the rule text carries its own), and
//! every produced instant is read back as a wall-clock value. Conversion to
//! UTC happens at the call site against the schedule's zone, so a daily rule
//! keeps firing at the same local hour across DST transitions.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

/// Hard ceiling on internal iteration steps per [`RecurrenceExpansion::next_after`]
/// call, so a pathological rule cannot spin the planner.
const MAX_EXPANSION_STEPS: u16 = 1_000;

/// Errors raised while building an expansion. Neither is retried; the
/// schedule is skipped for the tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecurrenceError {
    /// The RRULE text could not be parsed.
    #[error("invalid recurrence rule: {message}")]
    InvalidRule { message: String },
    /// The IANA timezone name is unknown.
    #[error("unknown timezone: {name}")]
    UnknownTimezone { name: String },
}

/// Coarse rule frequency used for the planner's adaptive horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Other,
}

impl Frequency {
    /// Sniff the `FREQ=` part out of an RRULE text. Missing or unrecognised
    /// frequencies classify as `Other`.
    pub fn detect(rrule_text: &str) -> Self {
        let upper = rrule_text.to_ascii_uppercase();
        if upper.contains("FREQ=MINUTELY") {
            Self::Minutely
        } else if upper.contains("FREQ=HOURLY") {
            Self::Hourly
        } else if upper.contains("FREQ=DAILY") {
            Self::Daily
        } else if upper.contains("FREQ=WEEKLY") {
            Self::Weekly
        } else if upper.contains("FREQ=MONTHLY") {
            Self::Monthly
        } else {
            Self::Other
        }
    }

    /// Whether tasks materialized at this cadence are too frequent to carry
    /// a due date.
    pub fn is_high_frequency(&self) -> bool {
        matches!(self, Self::Minutely | Self::Hourly)
    }
}

/// Resolve an IANA zone name.
pub fn parse_timezone(name: &str) -> Result<Tz, RecurrenceError> {
    name.parse::<Tz>().map_err(|_| RecurrenceError::UnknownTimezone {
        name: name.to_owned(),
    })
}

/// Interpret a local wall-clock time in `tz` and convert to UTC.
///
/// Ambiguous times (autumn DST fold) resolve to the earlier instant; times
/// inside a spring-forward gap do not exist and yield `None`.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) => Some(instant.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

enum Source {
    /// One-off: the sequence is exactly the seed.
    Single(NaiveDateTime),
    /// Recurring: a parsed rule set iterated from its DTSTART.
    Rule(RRuleSet),
}

/// A restartable expansion of a schedule's firing times.
pub struct RecurrenceExpansion {
    source: Source,
    until: Option<NaiveDateTime>,
    frequency: Frequency,
}

impl RecurrenceExpansion {
    /// Build an expansion for a schedule.
    ///
    /// `rrule_text` may already carry a `DTSTART:` line, which is used
    /// verbatim; otherwise one is prepended from the seed. `until` excludes
    /// occurrences strictly after it. The timezone is validated even though
    /// expansion itself runs on wall-clock values, so a broken schedule
    /// surfaces here rather than at conversion time.
    pub fn build(
        rrule_text: Option<&str>,
        seed_local: NaiveDateTime,
        tz_name: &str,
        until: Option<NaiveDateTime>,
    ) -> Result<Self, RecurrenceError> {
        parse_timezone(tz_name)?;

        let rule = rrule_text.filter(|text| !text.trim().is_empty());
        let (source, frequency) = match rule {
            None => (Source::Single(seed_local), Frequency::Other),
            Some(text) => {
                let combined = if text.contains("DTSTART:") {
                    text.to_owned()
                } else {
                    // Stored rules are commonly the bare property value
                    // ("FREQ=DAILY"); give them their property name before
                    // prepending the seed as DTSTART.
                    let rule_line = if text.to_ascii_uppercase().starts_with("RRULE:") {
                        text.to_owned()
                    } else {
                        format!("RRULE:{text}")
                    };
                    format!(
                        "DTSTART:{}Z\n{}",
                        seed_local.format("%Y%m%dT%H%M%S"),
                        rule_line
                    )
                };
                let set = combined
                    .parse::<RRuleSet>()
                    .map_err(|err| RecurrenceError::InvalidRule {
                        message: err.to_string(),
                    })?;
                (Source::Rule(set), Frequency::detect(text))
            }
        };

        Ok(Self {
            source,
            until,
            frequency,
        })
    }

    /// Frequency classification for the adaptive horizon.
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// First occurrence strictly after `cursor`, in local wall-clock time.
    ///
    /// Returns `None` once the rule is exhausted, the UNTIL bound is passed,
    /// or the internal step budget runs out.
    pub fn next_after(&self, cursor: NaiveDateTime) -> Option<NaiveDateTime> {
        let candidate = match &self.source {
            Source::Single(seed) => (*seed > cursor).then_some(*seed),
            Source::Rule(set) => set
                .clone()
                .all(MAX_EXPANSION_STEPS)
                .dates
                .into_iter()
                .map(|instant| instant.naive_local())
                .find(|occurrence| *occurrence > cursor),
        }?;

        match self.until {
            Some(until) if candidate > until => None,
            _ => Some(candidate),
        }
    }
}
