//! Work timers and timesheet statistics.
//!
//! Timers live in memory only; a stopped timer becomes a timesheet entry
//! through the caller. `TimerRegistry` is shared through the HTTP state.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::TimesheetEntryDetail;
use crate::error::TimerError;

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Default description for timers started without one.
pub const DEFAULT_TIMER_DESCRIPTION: &str = "Work session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub case_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub status: TimerStatus,
    pub start_time: DateTime<Utc>,
    /// Start of the current running segment; `None` while paused.
    pub segment_started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub total_paused_ms: i64,
    /// Worked time from finished segments.
    pub accumulated_ms: i64,
    pub description: String,
}

impl TimerInfo {
    /// Worked milliseconds as of `now`.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        let running = match (self.status, self.segment_started_at) {
            (TimerStatus::Running, Some(started)) => (now - started).num_milliseconds().max(0),
            _ => 0,
        };
        self.accumulated_ms + running
    }

    /// End time of an entry saved from this timer: start plus worked time.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::milliseconds(self.accumulated_ms)
    }
}

/// A timer removed by `stop`, with its final worked time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedTimer {
    pub timer: TimerInfo,
    pub elapsed_ms: i64,
}

/// In-memory timers keyed by timer id. One user has at most one timer.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    timers: RwLock<HashMap<Uuid, TimerInfo>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer, discarding any other timer of the same user unsaved.
    pub async fn start(
        &self,
        user_id: Uuid,
        case_id: Option<Uuid>,
        task_id: Option<Uuid>,
        description: Option<String>,
    ) -> TimerInfo {
        self.start_at(user_id, case_id, task_id, description, Utc::now())
            .await
    }

    async fn start_at(
        &self,
        user_id: Uuid,
        case_id: Option<Uuid>,
        task_id: Option<Uuid>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> TimerInfo {
        let timer = TimerInfo {
            id: Uuid::new_v4(),
            user_id,
            case_id,
            task_id,
            status: TimerStatus::Running,
            start_time: now,
            segment_started_at: Some(now),
            paused_at: None,
            total_paused_ms: 0,
            accumulated_ms: 0,
            description: description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TIMER_DESCRIPTION.to_string()),
        };

        let mut timers = self.timers.write().await;
        let before = timers.len();
        timers.retain(|_, existing| existing.user_id != user_id);
        if timers.len() < before {
            tracing::debug!(user_id = %user_id, "discarded previous timer");
        }
        timers.insert(timer.id, timer.clone());
        timer
    }

    pub async fn pause(&self, user_id: Uuid, timer_id: Uuid) -> Result<TimerInfo, TimerError> {
        self.pause_at(user_id, timer_id, Utc::now()).await
    }

    async fn pause_at(
        &self,
        user_id: Uuid,
        timer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TimerInfo, TimerError> {
        let mut timers = self.timers.write().await;
        let timer = owned_mut(&mut timers, user_id, timer_id)?;
        if timer.status != TimerStatus::Running {
            return Err(TimerError::NotRunning);
        }
        timer.accumulated_ms = timer.elapsed_ms(now);
        timer.status = TimerStatus::Paused;
        timer.segment_started_at = None;
        timer.paused_at = Some(now);
        Ok(timer.clone())
    }

    pub async fn resume(&self, user_id: Uuid, timer_id: Uuid) -> Result<TimerInfo, TimerError> {
        self.resume_at(user_id, timer_id, Utc::now()).await
    }

    async fn resume_at(
        &self,
        user_id: Uuid,
        timer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TimerInfo, TimerError> {
        let mut timers = self.timers.write().await;
        let timer = owned_mut(&mut timers, user_id, timer_id)?;
        if timer.status != TimerStatus::Paused {
            return Err(TimerError::NotPaused);
        }
        if let Some(paused_at) = timer.paused_at.take() {
            timer.total_paused_ms += (now - paused_at).num_milliseconds().max(0);
        }
        timer.status = TimerStatus::Running;
        timer.segment_started_at = Some(now);
        Ok(timer.clone())
    }

    /// Remove the timer, folding a running segment into the total.
    pub async fn stop(&self, user_id: Uuid, timer_id: Uuid) -> Result<StoppedTimer, TimerError> {
        self.stop_at(user_id, timer_id, Utc::now()).await
    }

    async fn stop_at(
        &self,
        user_id: Uuid,
        timer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<StoppedTimer, TimerError> {
        let mut timers = self.timers.write().await;
        owned_mut(&mut timers, user_id, timer_id)?;
        let timer = timers.remove(&timer_id).ok_or(TimerError::NotFound)?;
        Ok(stopped_state(timer, now))
    }

    /// Final state the timer would have if stopped now. The timer stays
    /// registered until `discard` removes it.
    pub async fn stop_preview(
        &self,
        user_id: Uuid,
        timer_id: Uuid,
    ) -> Result<StoppedTimer, TimerError> {
        self.stop_preview_at(user_id, timer_id, Utc::now()).await
    }

    async fn stop_preview_at(
        &self,
        user_id: Uuid,
        timer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<StoppedTimer, TimerError> {
        let timer = self.get(user_id, timer_id).await?;
        Ok(stopped_state(timer, now))
    }

    /// Drop a timer without recording anything.
    pub async fn discard(&self, user_id: Uuid, timer_id: Uuid) -> Result<TimerInfo, TimerError> {
        let mut timers = self.timers.write().await;
        owned_mut(&mut timers, user_id, timer_id)?;
        timers.remove(&timer_id).ok_or(TimerError::NotFound)
    }

    pub async fn get(&self, user_id: Uuid, timer_id: Uuid) -> Result<TimerInfo, TimerError> {
        let timers = self.timers.read().await;
        timers
            .get(&timer_id)
            .filter(|timer| timer.user_id == user_id)
            .cloned()
            .ok_or(TimerError::NotFound)
    }

    pub async fn active_for_user(&self, user_id: Uuid) -> Vec<TimerInfo> {
        let timers = self.timers.read().await;
        let mut out: Vec<TimerInfo> = timers
            .values()
            .filter(|timer| timer.user_id == user_id && timer.status != TimerStatus::Stopped)
            .cloned()
            .collect();
        out.sort_by_key(|timer| timer.start_time);
        out
    }
}

fn stopped_state(mut timer: TimerInfo, now: DateTime<Utc>) -> StoppedTimer {
    timer.accumulated_ms = timer.elapsed_ms(now);
    if let Some(paused_at) = timer.paused_at.take() {
        timer.total_paused_ms += (now - paused_at).num_milliseconds().max(0);
    }
    timer.status = TimerStatus::Stopped;
    timer.segment_started_at = None;
    let elapsed_ms = timer.accumulated_ms;
    StoppedTimer { timer, elapsed_ms }
}

// Timers of other users are reported as missing.
fn owned_mut(
    timers: &mut HashMap<Uuid, TimerInfo>,
    user_id: Uuid,
    timer_id: Uuid,
) -> Result<&mut TimerInfo, TimerError> {
    timers
        .get_mut(&timer_id)
        .filter(|timer| timer.user_id == user_id)
        .ok_or(TimerError::NotFound)
}

/// Hours for `millis`, rounded half away from zero to two places.
pub fn hours_from_millis(millis: i64) -> Decimal {
    round_hours(Decimal::from(millis) / Decimal::from(MILLIS_PER_HOUR))
}

fn round_hours(hours: Decimal) -> Decimal {
    hours.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTimesheetStats {
    pub total_hours: Decimal,
    pub total_minutes: i64,
    pub total_seconds: i64,
    pub daily_hours: Decimal,
    pub weekly_hours: Decimal,
    pub monthly_hours: Decimal,
    pub case_hours: BTreeMap<String, Decimal>,
    pub task_hours: BTreeMap<String, Decimal>,
    pub average_session_length: Decimal,
    pub total_sessions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseTimesheetStats {
    pub total_hours: Decimal,
    pub total_entries: u64,
    pub average_session_length: Decimal,
    pub user_breakdown: BTreeMap<String, Decimal>,
    pub task_breakdown: BTreeMap<String, Decimal>,
    /// Keyed by `YYYY-MM-DD` of the entry start (UTC).
    pub daily_breakdown: BTreeMap<String, Decimal>,
}

fn case_label(entry: &TimesheetEntryDetail) -> String {
    entry
        .case_name
        .clone()
        .unwrap_or_else(|| format!("Case {}", entry.entry.case_id))
}

fn task_label(entry: &TimesheetEntryDetail) -> Option<String> {
    let task_id = entry.entry.task_id?;
    Some(
        entry
            .task_title
            .clone()
            .unwrap_or_else(|| format!("Task {task_id}")),
    )
}

fn user_label(entry: &TimesheetEntryDetail) -> String {
    entry
        .user_name
        .clone()
        .unwrap_or_else(|| format!("User {}", entry.entry.user_id))
}

fn add_hours(map: &mut BTreeMap<String, Decimal>, key: String, hours: Decimal) {
    *map.entry(key).or_insert(Decimal::ZERO) += hours;
}

fn average(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        round_hours(total / Decimal::from(count as u64))
    }
}

fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Totals for one user's entries. Day, week (starting Sunday) and month
/// windows are computed in UTC relative to `now`.
pub fn user_stats(entries: &[TimesheetEntryDetail], now: DateTime<Utc>) -> UserTimesheetStats {
    let today = now.date_naive();
    let day_start = utc_midnight(today);
    let week_start =
        utc_midnight(today - Duration::days(i64::from(today.weekday().num_days_from_sunday())));
    let month_start = utc_midnight(today.with_day(1).unwrap_or(today));

    let mut total = Decimal::ZERO;
    let (mut daily, mut weekly, mut monthly) = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
    let mut case_hours = BTreeMap::new();
    let mut task_hours = BTreeMap::new();

    for detail in entries {
        let hours = detail.entry.hours;
        let started = detail.entry.start_time;
        total += hours;
        if started >= day_start {
            daily += hours;
        }
        if started >= week_start {
            weekly += hours;
        }
        if started >= month_start {
            monthly += hours;
        }
        add_hours(&mut case_hours, case_label(detail), hours);
        if let Some(task) = task_label(detail) {
            add_hours(&mut task_hours, task, hours);
        }
    }

    let minutes = (total * Decimal::from(60)).round().to_i64().unwrap_or_default();
    let seconds = (total * Decimal::from(3600)).round().to_i64().unwrap_or_default();
    UserTimesheetStats {
        total_hours: round_hours(total),
        total_minutes: minutes,
        total_seconds: seconds,
        daily_hours: round_hours(daily),
        weekly_hours: round_hours(weekly),
        monthly_hours: round_hours(monthly),
        case_hours,
        task_hours,
        average_session_length: average(total, entries.len()),
        total_sessions: entries.len() as u64,
    }
}

pub fn case_stats(entries: &[TimesheetEntryDetail]) -> CaseTimesheetStats {
    let mut total = Decimal::ZERO;
    let mut user_breakdown = BTreeMap::new();
    let mut task_breakdown = BTreeMap::new();
    let mut daily_breakdown = BTreeMap::new();

    for detail in entries {
        let hours = detail.entry.hours;
        total += hours;
        add_hours(&mut user_breakdown, user_label(detail), hours);
        if let Some(task) = task_label(detail) {
            add_hours(&mut task_breakdown, task, hours);
        }
        add_hours(
            &mut daily_breakdown,
            detail.entry.start_time.date_naive().to_string(),
            hours,
        );
    }

    CaseTimesheetStats {
        total_hours: round_hours(total),
        total_entries: entries.len() as u64,
        average_session_length: average(total, entries.len()),
        user_breakdown,
        task_breakdown,
        daily_breakdown,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db::TimesheetEntryRecord;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn detail(
        start: DateTime<Utc>,
        millis: i64,
        case_name: Option<&str>,
        task: Option<(Uuid, Option<&str>)>,
        user_name: Option<&str>,
    ) -> TimesheetEntryDetail {
        TimesheetEntryDetail {
            entry: TimesheetEntryRecord {
                id: Uuid::new_v4(),
                case_id: Uuid::nil(),
                user_id: Uuid::nil(),
                task_id: task.map(|(id, _)| id),
                start_time: start,
                end_time: start + Duration::milliseconds(millis),
                duration: millis,
                hours: hours_from_millis(millis),
                description: None,
                created_at: start,
                updated_at: start,
            },
            case_name: case_name.map(str::to_string),
            task_title: task.and_then(|(_, title)| title.map(str::to_string)),
            user_name: user_name.map(str::to_string),
        }
    }

    #[test]
    fn hours_round_to_two_places() {
        assert_eq!(hours_from_millis(5_400_000), dec!(1.50));
        assert_eq!(hours_from_millis(2_700_000), dec!(0.75));
        // 1 minute = 0.01666.. h
        assert_eq!(hours_from_millis(60_000), dec!(0.02));
        // 18 seconds = 0.005 h exactly
        assert_eq!(hours_from_millis(18_000), dec!(0.01));
        assert_eq!(hours_from_millis(0), dec!(0));
    }

    #[tokio::test]
    async fn pause_and_resume_exclude_paused_time() {
        let registry = TimerRegistry::new();
        let user = Uuid::new_v4();
        let t0 = at("2026-03-02T09:00:00Z");

        let timer = registry.start_at(user, None, None, None, t0).await;
        assert_eq!(timer.description, DEFAULT_TIMER_DESCRIPTION);

        let paused = registry
            .pause_at(user, timer.id, t0 + Duration::minutes(30))
            .await
            .expect("pause");
        assert_eq!(paused.accumulated_ms, 30 * 60_000);
        assert_eq!(
            registry.pause_at(user, timer.id, t0).await,
            Err(TimerError::NotRunning)
        );

        registry
            .resume_at(user, timer.id, t0 + Duration::minutes(50))
            .await
            .expect("resume");
        let stopped = registry
            .stop_at(user, timer.id, t0 + Duration::minutes(80))
            .await
            .expect("stop");
        assert_eq!(stopped.elapsed_ms, 60 * 60_000);
        assert_eq!(stopped.timer.total_paused_ms, 20 * 60_000);
        assert_eq!(stopped.timer.status, TimerStatus::Stopped);
        assert_eq!(stopped.timer.end_time(), t0 + Duration::minutes(60));
        assert_eq!(
            registry.get(user, timer.id).await,
            Err(TimerError::NotFound)
        );
    }

    #[tokio::test]
    async fn stopping_a_running_timer_counts_the_open_segment() {
        let registry = TimerRegistry::new();
        let user = Uuid::new_v4();
        let t0 = at("2026-03-02T09:00:00Z");
        let timer = registry.start_at(user, None, None, None, t0).await;

        let stopped = registry
            .stop_at(user, timer.id, t0 + Duration::minutes(45))
            .await
            .expect("stop");
        assert_eq!(stopped.elapsed_ms, 45 * 60_000);
    }

    #[tokio::test]
    async fn stop_preview_keeps_the_timer_until_discarded() {
        let registry = TimerRegistry::new();
        let user = Uuid::new_v4();
        let t0 = at("2026-03-02T09:00:00Z");
        let timer = registry.start_at(user, None, None, None, t0).await;

        let preview = registry
            .stop_preview_at(user, timer.id, t0 + Duration::minutes(20))
            .await
            .expect("preview");
        assert_eq!(preview.elapsed_ms, 20 * 60_000);
        assert_eq!(preview.timer.status, TimerStatus::Stopped);

        let still_there = registry.get(user, timer.id).await.expect("timer kept");
        assert_eq!(still_there.status, TimerStatus::Running);

        assert_eq!(
            registry.discard(Uuid::new_v4(), timer.id).await.map(|t| t.id),
            Err(TimerError::NotFound)
        );
        assert_eq!(
            registry.discard(user, timer.id).await.map(|t| t.id),
            Ok(timer.id)
        );
        assert_eq!(registry.get(user, timer.id).await, Err(TimerError::NotFound));
    }

    #[tokio::test]
    async fn starting_discards_the_users_previous_timer() {
        let registry = TimerRegistry::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        let first = registry.start(user, None, None, None).await;
        let theirs = registry.start(other, None, None, None).await;
        let second = registry
            .start(user, None, None, Some("Review".to_string()))
            .await;

        let active = registry.active_for_user(user).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert_eq!(active[0].description, "Review");
        assert_eq!(registry.get(user, first.id).await, Err(TimerError::NotFound));
        assert!(registry.get(other, theirs.id).await.is_ok());
    }

    #[tokio::test]
    async fn timers_are_private_to_their_owner() {
        let registry = TimerRegistry::new();
        let owner = Uuid::new_v4();
        let timer = registry.start(owner, None, None, None).await;

        let stranger = Uuid::new_v4();
        assert_eq!(registry.get(stranger, timer.id).await, Err(TimerError::NotFound));
        assert_eq!(
            registry.stop(stranger, timer.id).await.map(|s| s.elapsed_ms),
            Err(TimerError::NotFound)
        );
        assert_eq!(
            registry.resume(owner, timer.id).await,
            Err(TimerError::NotPaused)
        );
    }

    #[test]
    fn user_stats_windows_and_breakdowns() {
        // Wednesday; the week started Sunday 2026-03-01.
        let now = at("2026-03-04T18:00:00Z");
        let task = Uuid::new_v4();
        let entries = vec![
            detail(at("2026-03-04T09:00:00Z"), 3_600_000, Some("Alpha"), Some((task, Some("Brief"))), None),
            detail(at("2026-03-02T09:00:00Z"), 5_400_000, Some("Alpha"), None, None),
            detail(at("2026-02-27T09:00:00Z"), 1_800_000, None, Some((task, None)), None),
        ];

        let stats = user_stats(&entries, now);
        assert_eq!(stats.total_hours, dec!(3.00));
        assert_eq!(stats.total_minutes, 180);
        assert_eq!(stats.total_seconds, 10_800);
        assert_eq!(stats.daily_hours, dec!(1.00));
        assert_eq!(stats.weekly_hours, dec!(2.50));
        assert_eq!(stats.monthly_hours, dec!(2.50));
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.average_session_length, dec!(1.00));
        assert_eq!(stats.case_hours.get("Alpha"), Some(&dec!(2.50)));
        assert_eq!(
            stats.case_hours.get(&format!("Case {}", Uuid::nil())),
            Some(&dec!(0.50))
        );
        assert_eq!(stats.task_hours.get("Brief"), Some(&dec!(1.00)));
        assert_eq!(stats.task_hours.get(&format!("Task {task}")), Some(&dec!(0.50)));
    }

    #[test]
    fn case_stats_groups_by_user_and_day() {
        let entries = vec![
            detail(at("2026-03-02T09:00:00Z"), 3_600_000, None, None, Some("Rin")),
            detail(at("2026-03-02T14:00:00Z"), 2_700_000, None, None, Some("Rin")),
            detail(at("2026-03-03T09:00:00Z"), 900_000, None, None, None),
        ];

        let stats = case_stats(&entries);
        assert_eq!(stats.total_hours, dec!(2.00));
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.user_breakdown.get("Rin"), Some(&dec!(1.75)));
        assert_eq!(stats.daily_breakdown.get("2026-03-02"), Some(&dec!(1.75)));
        assert_eq!(stats.daily_breakdown.get("2026-03-03"), Some(&dec!(0.25)));
        assert!(stats.task_breakdown.is_empty());
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = case_stats(&[]);
        assert_eq!(stats.total_hours, Decimal::ZERO);
        assert_eq!(stats.average_session_length, Decimal::ZERO);
    }
}
