//! Recurring task scheduler.
//!
//! A process-scoped registry of per-target jobs driven by a single background
//! tick loop. The registry is mutated by admin calls and read/mutated by the
//! tick loop concurrently; a mutex serializes every access. Deployments are
//! launched through an injected [`JobRunner`] and their task handles are
//! retained until completion, so a slow deployment never stalls the tick and
//! never disappears unsupervised.
//!
//! Re-registering an existing tag accumulates a second job rather than
//! replacing the first; callers that want replacement clear the tag first.

use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Weekday};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::defaults::SCHEDULER_TICK_SECS;
use crate::types::{JobView, LparTarget};

/// Schedule parsing and registration errors.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("empty schedule spec")]
    EmptySpec,
    #[error("unknown weekday: {0}")]
    UnknownWeekday(String),
    #[error("invalid time of day: {0}")]
    InvalidTime(String),
}

/// Parameters bound to a job at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParams {
    pub hostname: String,
    pub username: String,
    pub qualifier: String,
}

/// Launches the deployment bound to a due job. Implementations must return
/// the task handle so completion stays observable.
pub trait JobRunner: Send + Sync {
    fn launch(&self, params: &JobParams) -> JoinHandle<()>;
}

/// One registered recurring job.
#[derive(Debug, Clone)]
struct ScheduledJob {
    tag: String,
    day_of_week: Option<Weekday>,
    time_of_day: NaiveTime,
    params: JobParams,
    last_run: Option<NaiveDateTime>,
    next_run: NaiveDateTime,
}

/// Weekday name lookup table. Lowercase full names, as used by schedule
/// specs.
const WEEKDAYS: [(&str, Weekday); 7] = [
    ("sunday", Weekday::Sun),
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
];

/// Resolve a weekday name (case-insensitive) through the lookup table.
pub(crate) fn weekday_from_name(name: &str) -> Option<Weekday> {
    let lower = name.to_lowercase();
    WEEKDAYS
        .iter()
        .find(|(label, _)| *label == lower)
        .map(|(_, day)| *day)
}

/// Parse a schedule spec: optional weekday name, then `HH:MM` (seconds
/// accepted and ignored). An absent weekday means "every day".
pub(crate) fn parse_schedule_spec(
    spec: &str,
) -> Result<(Option<Weekday>, NaiveTime), ScheduleError> {
    let tokens: Vec<&str> = spec.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Err(ScheduleError::EmptySpec),
        [time] => Ok((None, parse_time(time)?)),
        [day, time, ..] => {
            let weekday = weekday_from_name(day)
                .ok_or_else(|| ScheduleError::UnknownWeekday((*day).to_string()))?;
            Ok((Some(weekday), parse_time(time)?))
        }
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| ScheduleError::InvalidTime(s.to_string()))
}

/// Next local occurrence of `time` (daily) or of (`day`, `time`) (weekly),
/// strictly after `after`.
pub(crate) fn next_occurrence(
    after: NaiveDateTime,
    time: NaiveTime,
    day: Option<Weekday>,
) -> NaiveDateTime {
    let mut candidate = after.date().and_time(time);
    match day {
        None => {
            if candidate <= after {
                candidate += ChronoDuration::days(1);
            }
            candidate
        }
        Some(weekday) => {
            while candidate.weekday() != weekday || candidate <= after {
                candidate += ChronoDuration::days(1);
            }
            candidate
        }
    }
}

/// Process-scoped scheduler owning its registry and tick task.
pub struct TaskScheduler {
    jobs: Arc<Mutex<Vec<ScheduledJob>>>,
    runner: Arc<dyn JobRunner>,
    cancel: CancellationToken,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            runner,
            cancel: CancellationToken::new(),
            tick_task: Mutex::new(None),
        }
    }

    /// Register one job, or wipe the whole registry when `cancel_all` is set.
    pub fn schedule_task(
        &self,
        tag: &str,
        params: JobParams,
        time_of_day: NaiveTime,
        day_of_week: Option<Weekday>,
        cancel_all: bool,
    ) {
        let mut jobs = lock_registry(&self.jobs);
        if cancel_all {
            info!(cleared = jobs.len(), "Cancelling all scheduled jobs");
            jobs.clear();
            return;
        }

        let now = Local::now().naive_local();
        let next_run = next_occurrence(now, time_of_day, day_of_week);
        info!(tag = tag, next_run = %next_run, "Scheduled job");
        jobs.push(ScheduledJob {
            tag: tag.to_string(),
            day_of_week,
            time_of_day,
            params,
            last_run: None,
            next_run,
        });
    }

    /// Remove jobs matching `tag`, or the entire registry when omitted.
    pub fn clear_jobs(&self, tag: Option<&str>) {
        let mut jobs = lock_registry(&self.jobs);
        let before = jobs.len();
        match tag {
            Some(tag) => jobs.retain(|job| job.tag != tag),
            None => jobs.clear(),
        }
        info!(removed = before - jobs.len(), tag = ?tag, "Cleared scheduled jobs");
    }

    /// Read-only snapshot of the registry.
    pub fn list_jobs(&self) -> Vec<JobView> {
        let jobs = lock_registry(&self.jobs);
        jobs.iter()
            .map(|job| {
                let (unit, period_secs) = match job.day_of_week {
                    Some(_) => ("week", 7 * 86_400),
                    None => ("day", 86_400),
                };
                JobView {
                    tag: job.tag.clone(),
                    task: format!("deploy {}", job.params.hostname),
                    last_run: job.last_run,
                    next_run: job.next_run,
                    unit: unit.to_string(),
                    interval: 1,
                    period_secs,
                }
            })
            .collect()
    }

    /// Parse each enabled target's schedule spec and register one job per
    /// target. Invalid specs are skipped with a warning — a single bad row
    /// must not block the rest of the fleet.
    pub fn bootstrap(&self, targets: &[LparTarget]) {
        let mut registered = 0usize;
        for target in targets.iter().filter(|t| t.enabled) {
            let Some(spec) = target.schedule.as_deref() else {
                continue;
            };
            match parse_schedule_spec(spec) {
                Ok((day, time)) => {
                    self.schedule_task(
                        &target.lpar,
                        JobParams {
                            hostname: target.hostname.clone(),
                            username: target.username.clone(),
                            qualifier: target.dataset.clone(),
                        },
                        time,
                        day,
                        false,
                    );
                    registered += 1;
                }
                Err(e) => {
                    warn!(lpar = %target.lpar, spec = spec, error = %e, "Skipping unparsable schedule spec");
                }
            }
        }
        info!(jobs = registered, "Scheduler bootstrap complete");
    }

    /// Start the background tick loop. Idempotent: a second call while the
    /// loop is alive is ignored.
    pub fn start(&self) {
        let mut slot = match self.tick_task.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!("Scheduler tick loop already running");
            return;
        }

        let jobs = Arc::clone(&self.jobs);
        let runner = Arc::clone(&self.runner);
        let cancel = self.cancel.clone();

        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(SCHEDULER_TICK_SECS));
            // Launched deployments, retained until they settle.
            let mut inflight: Vec<JoinHandle<()>> = Vec::new();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(inflight = inflight.len(), "Scheduler tick loop stopping");
                        return;
                    }
                    _ = interval.tick() => {
                        let now = Local::now().naive_local();
                        let due: Vec<JobParams> = {
                            let mut jobs = lock_registry(&jobs);
                            let mut due = Vec::new();
                            for job in jobs.iter_mut() {
                                if job.next_run <= now {
                                    debug!(tag = %job.tag, "Job due");
                                    job.last_run = Some(now);
                                    job.next_run =
                                        next_occurrence(now, job.time_of_day, job.day_of_week);
                                    due.push(job.params.clone());
                                }
                            }
                            due
                        };

                        for params in due {
                            inflight.push(runner.launch(&params));
                        }
                        inflight.retain(|handle| !handle.is_finished());
                    }
                }
            }
        }));
        info!("Scheduler tick loop started");
    }

    /// Stop the tick loop. Clearing only prevents future runs — in-flight
    /// deployments are left to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = match self.tick_task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

fn lock_registry(jobs: &Mutex<Vec<ScheduledJob>>) -> std::sync::MutexGuard<'_, Vec<ScheduledJob>> {
    match jobs.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
