//! Recurrence rules and their pure expansion into future instants.
//!
//! Expansion is a stateless function of the rule, the anchor instant, and a
//! caller-supplied horizon. Every occurrence is computed from the anchor
//! rather than the previous occurrence so monthly steps do not drift through
//! short months and the sequence is restartable.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// How often a session repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Repeat every `interval` days.
    Daily,
    /// Repeat every `interval` weeks.
    Weekly,
    /// Repeat every `interval` calendar months.
    Monthly,
}

/// Optional end condition for a recurrence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceEnd {
    /// Stop once an occurrence would fall after this instant.
    Until(DateTime<Utc>),
    /// Produce at most this many occurrences.
    Count(u32),
}

/// Input payload for [`RecurrenceRule::new`]; also the persisted JSON shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRuleDraft {
    /// Repeat frequency.
    pub frequency: Frequency,
    /// Step between occurrences in units of `frequency`; must be at least 1.
    pub interval: u32,
    /// Optional end condition.
    pub end: Option<RecurrenceEnd>,
}

/// Validation errors raised when accepting a recurrence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecurrenceValidationError {
    /// The interval was zero; rejected at acceptance time, never during
    /// expansion.
    #[error("recurrence interval must be at least 1")]
    ZeroInterval,
}

/// A validated recurrence rule attached to a session.
///
/// Not persisted independently: the rule lives as an attribute of the
/// originating session and is stored as JSON alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecurrenceRuleDraft", into = "RecurrenceRuleDraft")]
pub struct RecurrenceRule {
    frequency: Frequency,
    interval: u32,
    end: Option<RecurrenceEnd>,
}

impl RecurrenceRule {
    /// Create a validated recurrence rule.
    pub fn new(draft: RecurrenceRuleDraft) -> Result<Self, RecurrenceValidationError> {
        Self::try_from(draft)
    }

    /// Returns the repeat frequency.
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Returns the step between occurrences.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Returns the optional end condition.
    pub fn end(&self) -> Option<RecurrenceEnd> {
        self.end
    }

    /// Expand the rule into the ordered sequence of future instants.
    ///
    /// Occurrences are strictly after `anchor` and stop at the sooner of the
    /// rule's own end condition and `horizon` (inclusive). Rules producing no
    /// occurrence within the horizon yield an empty sequence, not an error.
    pub fn expand(
        &self,
        anchor: DateTime<Utc>,
        horizon: DateTime<Utc>,
    ) -> RecurrenceExpansion {
        RecurrenceExpansion {
            rule: *self,
            anchor,
            horizon,
            emitted: 0,
        }
    }
}

impl TryFrom<RecurrenceRuleDraft> for RecurrenceRule {
    type Error = RecurrenceValidationError;

    fn try_from(draft: RecurrenceRuleDraft) -> Result<Self, Self::Error> {
        if draft.interval == 0 {
            return Err(RecurrenceValidationError::ZeroInterval);
        }
        Ok(Self {
            frequency: draft.frequency,
            interval: draft.interval,
            end: draft.end,
        })
    }
}

impl From<RecurrenceRule> for RecurrenceRuleDraft {
    fn from(rule: RecurrenceRule) -> Self {
        Self {
            frequency: rule.frequency,
            interval: rule.interval,
            end: rule.end,
        }
    }
}

/// Lazy, finite iterator over the instants a rule produces.
///
/// Pure function of its inputs; two expansions with identical inputs yield
/// identical sequences.
#[derive(Debug, Clone)]
pub struct RecurrenceExpansion {
    rule: RecurrenceRule,
    anchor: DateTime<Utc>,
    horizon: DateTime<Utc>,
    emitted: u32,
}

impl RecurrenceExpansion {
    fn occurrence(&self, ordinal: u32) -> Option<DateTime<Utc>> {
        let steps = self.rule.interval.checked_mul(ordinal)?;
        match self.rule.frequency {
            Frequency::Daily => self
                .anchor
                .checked_add_signed(Duration::days(i64::from(steps))),
            Frequency::Weekly => self
                .anchor
                .checked_add_signed(Duration::weeks(i64::from(steps))),
            Frequency::Monthly => self.anchor.checked_add_months(Months::new(steps)),
        }
    }
}

impl Iterator for RecurrenceExpansion {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(RecurrenceEnd::Count(count)) = self.rule.end() {
            if self.emitted >= count {
                return None;
            }
        }

        let instant = self.occurrence(self.emitted + 1)?;
        if instant > self.horizon {
            return None;
        }
        if let Some(RecurrenceEnd::Until(until)) = self.rule.end() {
            if instant > until {
                return None;
            }
        }

        self.emitted += 1;
        Some(instant)
    }
}
