//! Pure aggregation over ledger read models.
//!
//! Every function here is deterministic: identical input records and
//! `refreshed_at` produce identical, identically-ordered output. Rebuild
//! idempotence rests on this, so output ordering is always made explicit
//! instead of inherited from map iteration.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, Utc, Weekday};

use crate::domain::sessions::{CompletedSessionRecord, OwnerId};

use super::views::{LeaderboardEntry, PeriodGranularity, SessionSummary, WeeklyAggregate};

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    sessions: i64,
    duration_minutes: i64,
    calories_kcal: i64,
    points: i64,
}

impl Totals {
    fn absorb(&mut self, record: &CompletedSessionRecord) {
        self.sessions += 1;
        self.duration_minutes += (record.completed_at - record.started_at).num_minutes();
        self.calories_kcal += record.calories_kcal;
        self.points += record.points;
    }
}

/// Group completed sessions by owner, summing duration, calories, and points.
pub fn session_summaries(
    records: &[CompletedSessionRecord],
    refreshed_at: DateTime<Utc>,
) -> Vec<SessionSummary> {
    let mut by_owner: BTreeMap<OwnerId, Totals> = BTreeMap::new();
    for record in records {
        by_owner.entry(record.owner_id).or_default().absorb(record);
    }

    by_owner
        .into_iter()
        .map(|(owner_id, totals)| SessionSummary {
            owner_id,
            sessions_completed: totals.sessions,
            total_duration_minutes: totals.duration_minutes,
            total_calories_kcal: totals.calories_kcal,
            total_points: totals.points,
            refreshed_at,
        })
        .collect()
}

/// Group completed sessions by (owner, Monday-start week of the scheduled
/// instant).
pub fn weekly_aggregates(
    records: &[CompletedSessionRecord],
    refreshed_at: DateTime<Utc>,
) -> Vec<WeeklyAggregate> {
    let mut by_bucket: BTreeMap<(OwnerId, DateTime<Utc>), Totals> = BTreeMap::new();
    for record in records {
        let week_start = week_start(record.scheduled_at);
        by_bucket
            .entry((record.owner_id, week_start))
            .or_default()
            .absorb(record);
    }

    by_bucket
        .into_iter()
        .map(|((owner_id, week_start), totals)| WeeklyAggregate {
            owner_id,
            week_start,
            sessions_completed: totals.sessions,
            total_duration_minutes: totals.duration_minutes,
            total_calories_kcal: totals.calories_kcal,
            total_points: totals.points,
            refreshed_at,
        })
        .collect()
}

/// Rank owners by points within each (granularity, period start) bucket.
///
/// Rows from a single rebuild share one `refreshed_at`, so the rank tiebreak
/// falls to the owner id: points descending, then owner ascending, giving the
/// stable ordering leaderboard pagination requires.
pub fn leaderboard(
    records: &[CompletedSessionRecord],
    granularity: PeriodGranularity,
    refreshed_at: DateTime<Utc>,
) -> Vec<LeaderboardEntry> {
    let mut by_bucket: BTreeMap<DateTime<Utc>, BTreeMap<OwnerId, i64>> = BTreeMap::new();
    for record in records {
        let period_start = granularity.period_start(record.scheduled_at);
        *by_bucket
            .entry(period_start)
            .or_default()
            .entry(record.owner_id)
            .or_default() += record.points;
    }

    let mut entries = Vec::new();
    for (period_start, scores) in by_bucket {
        let mut ranked: Vec<(OwnerId, i64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (index, (owner_id, points)) in ranked.into_iter().enumerate() {
            entries.push(LeaderboardEntry {
                period: granularity,
                period_start,
                owner_id,
                points,
                rank: rank_from_index(index),
                refreshed_at,
            });
        }
    }
    entries
}

fn rank_from_index(index: usize) -> i32 {
    i32::try_from(index).map_or(i32::MAX, |rank| rank.saturating_add(1))
}

fn week_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .week(Weekday::Mon)
        .first_day()
        .and_time(NaiveTime::MIN)
        .and_utc()
}
