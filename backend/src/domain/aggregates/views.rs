//! Derived view definitions and rebuild scoping.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::sessions::OwnerId;

/// Ranking period granularity for leaderboards and refresh jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodGranularity {
    /// Calendar week, Monday start.
    Week,
    /// Calendar month.
    Month,
}

impl PeriodGranularity {
    /// Stable string form used in persistence and job payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Truncate `at` to the start of its period.
    pub fn period_start(self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let start = match self {
            Self::Week => date.week(Weekday::Mon).first_day(),
            Self::Month => date - Days::new(u64::from(date.day0())),
        };
        start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Exclusive end of the period beginning at `start`, or `None` if the
    /// calendar arithmetic overflows.
    pub fn period_end(self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Week => start.checked_add_days(Days::new(7)),
            Self::Month => start.checked_add_months(chrono::Months::new(1)),
        }
    }

    /// Widen `[from, to)` outward to whole Monday-start weeks.
    ///
    /// A month boundary can fall mid-week; any computation or swap keyed by
    /// week bucket must cover those straddling weeks in full, or a bucket
    /// would be rewritten from a partial read. Returns `None` if the calendar
    /// arithmetic overflows.
    pub fn week_aligned(
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = Self::Week.period_start(from);
        let last_week = Self::Week.period_start(to);
        let end = if last_week == to {
            to
        } else {
            Self::Week.period_end(last_week)?
        };
        Some((start, end))
    }
}

impl fmt::Display for PeriodGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised when parsing a period granularity from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown period granularity: {value}")]
pub struct ParsePeriodGranularityError {
    /// The rejected input.
    pub value: String,
}

impl FromStr for PeriodGranularity {
    type Err = ParsePeriodGranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(ParsePeriodGranularityError {
                value: other.to_owned(),
            }),
        }
    }
}

/// Registered aggregate views, in no particular order.
///
/// [`ViewName::REBUILD_ORDER`] is the authoritative dependency ordering:
/// weekly aggregates and leaderboards are derived after per-owner summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewName {
    /// Per-owner totals over completed sessions.
    SessionSummary,
    /// Per-owner, per-week rollups.
    WeeklyAggregates,
    /// Per-period rankings by points.
    Leaderboard,
}

impl ViewName {
    /// All registered views in dependency order; a view never appears before
    /// one it depends on.
    pub const REBUILD_ORDER: [Self; 3] =
        [Self::SessionSummary, Self::WeeklyAggregates, Self::Leaderboard];

    /// Stable string form used in lane keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionSummary => "session_summary",
            Self::WeeklyAggregates => "weekly_aggregates",
            Self::Leaderboard => "leaderboard",
        }
    }

    /// Views that must be rebuilt before this one.
    pub fn dependencies(self) -> &'static [Self] {
        match self {
            Self::SessionSummary => &[],
            Self::WeeklyAggregates | Self::Leaderboard => &[Self::SessionSummary],
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The grouping key an aggregate rebuild targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildScope {
    /// Rebuild the entire view.
    All,
    /// Rebuild one owner's rows.
    Owner(OwnerId),
    /// Rebuild one ranking period.
    Period {
        /// Period granularity.
        granularity: PeriodGranularity,
        /// Truncated period start.
        start: DateTime<Utc>,
    },
}

impl RebuildScope {
    /// Stable key identifying the serialization lane for a (view, scope)
    /// pair: rebuilds sharing a lane execute in order, disjoint lanes may
    /// interleave.
    pub fn lane_key(&self, view: ViewName) -> String {
        match self {
            Self::All => format!("{view}/all"),
            Self::Owner(owner_id) => format!("{view}/owner/{owner_id}"),
            Self::Period { granularity, start } => {
                format!("{view}/period/{granularity}/{}", start.to_rfc3339())
            }
        }
    }

    /// The owner restriction this scope implies for ledger reads, if any.
    pub fn owner(&self) -> Option<&OwnerId> {
        match self {
            Self::Owner(owner_id) => Some(owner_id),
            Self::All | Self::Period { .. } => None,
        }
    }
}

/// Per-owner totals over completed sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Owning user.
    pub owner_id: OwnerId,
    /// Number of completed sessions.
    pub sessions_completed: i64,
    /// Total active minutes.
    pub total_duration_minutes: i64,
    /// Total energy expenditure.
    pub total_calories_kcal: i64,
    /// Total score contribution.
    pub total_points: i64,
    /// When this row was last rebuilt.
    pub refreshed_at: DateTime<Utc>,
}

/// Per-owner, per-week rollup of completed sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    /// Owning user.
    pub owner_id: OwnerId,
    /// Monday-start week bucket.
    pub week_start: DateTime<Utc>,
    /// Number of completed sessions in the week.
    pub sessions_completed: i64,
    /// Active minutes in the week.
    pub total_duration_minutes: i64,
    /// Energy expenditure in the week.
    pub total_calories_kcal: i64,
    /// Score contribution in the week.
    pub total_points: i64,
    /// When this row was last rebuilt.
    pub refreshed_at: DateTime<Utc>,
}

/// One ranked leaderboard row for a (period, period start) bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Ranking period granularity.
    pub period: PeriodGranularity,
    /// Truncated period start.
    pub period_start: DateTime<Utc>,
    /// Ranked user.
    pub owner_id: OwnerId,
    /// Points accumulated within the period.
    pub points: i64,
    /// 1-based rank within the period bucket; deterministic for pagination.
    pub rank: i32,
    /// When this row was last rebuilt.
    pub refreshed_at: DateTime<Utc>,
}
