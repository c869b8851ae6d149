//! Read-side statistics over job and task records.
//!
//! Everything here is computed on demand from narrow summaries; nothing is
//! cached between queries. The pure functions take the summaries directly so
//! they can be tested and benchmarked without a store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;

use taskmill_core::DomainError;
use taskmill_jobs::{Job, JobStatus, TaskStatus};

use crate::error::EngineResult;
use crate::store::{JobSummary, RecordStore, TaskSummary};

pub const DEFAULT_TIMELINE_DAYS: u32 = 7;
pub const MAX_TIMELINE_DAYS: u32 = 30;
pub const DEFAULT_RECENT_JOBS: u32 = 10;
pub const MAX_RECENT_JOBS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub running_jobs: u64,
    pub pending_jobs: u64,
    /// Percentage of jobs that completed, `0..=100`.
    pub success_rate: f64,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub running_tasks: u64,
    pub pending_tasks: u64,
    pub avg_processing_time_seconds: f64,
    pub total_processing_time_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelinePoint {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingTimeStats {
    pub min_seconds: f64,
    pub max_seconds: f64,
    pub avg_seconds: f64,
    pub median_seconds: Option<f64>,
}

/// Round to two decimals for presentation.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn overview(jobs: &[JobSummary], tasks: &[TaskSummary]) -> Overview {
    let count_jobs = |pred: &dyn Fn(JobStatus) -> bool| {
        jobs.iter().filter(|j| pred(j.status)).count() as u64
    };
    let count_tasks = |pred: &dyn Fn(TaskStatus) -> bool| {
        tasks.iter().filter(|t| pred(t.status)).count() as u64
    };

    let total_jobs = jobs.len() as u64;
    let completed_jobs = count_jobs(&|s| s == JobStatus::Completed);
    let success_rate = if total_jobs == 0 {
        0.0
    } else {
        completed_jobs as f64 / total_jobs as f64 * 100.0
    };

    let times: Vec<f64> = tasks.iter().filter_map(|t| t.processing_time_seconds).collect();
    let total_time: f64 = times.iter().sum();
    let avg_time = if times.is_empty() {
        0.0
    } else {
        total_time / times.len() as f64
    };

    Overview {
        total_jobs,
        completed_jobs,
        failed_jobs: count_jobs(&|s| s == JobStatus::Failed),
        running_jobs: count_jobs(&|s| s == JobStatus::Running),
        pending_jobs: count_jobs(&|s| s.is_pending_like()),
        success_rate: round2(success_rate),
        total_tasks: tasks.len() as u64,
        completed_tasks: count_tasks(&|s| s == TaskStatus::Completed),
        failed_tasks: count_tasks(&|s| s == TaskStatus::Failed),
        running_tasks: count_tasks(&|s| s == TaskStatus::Running),
        pending_tasks: count_tasks(&|s| s.is_pending_like()),
        avg_processing_time_seconds: round2(avg_time),
        total_processing_time_seconds: round2(total_time),
    }
}

/// Count occurrences of each observed key, sorted by key.
pub fn count_by<'a, I>(keys: I) -> Vec<KeyCount>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(key, count)| KeyCount {
            key: key.to_string(),
            count,
        })
        .collect()
}

pub fn jobs_by_type(jobs: &[JobSummary]) -> Vec<KeyCount> {
    count_by(jobs.iter().map(|j| j.job_type.as_str()))
}

pub fn jobs_by_status(jobs: &[JobSummary]) -> Vec<KeyCount> {
    count_by(jobs.iter().map(|j| j.status.as_str()))
}

pub fn tasks_by_status(tasks: &[TaskSummary]) -> Vec<KeyCount> {
    count_by(tasks.iter().map(|t| t.status.as_str()))
}

/// Jobs created per UTC day over the `days` days ending on `today`,
/// oldest first, zero-filled.
pub fn timeline(jobs: &[JobSummary], days: u32, today: NaiveDate) -> Vec<TimelinePoint> {
    let start = today
        .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
        .unwrap_or(NaiveDate::MIN);

    let mut buckets: BTreeMap<NaiveDate, u64> = start
        .iter_days()
        .take(days as usize)
        .map(|d| (d, 0))
        .collect();
    for job in jobs {
        if let Some(count) = buckets.get_mut(&job.created_at.date_naive()) {
            *count += 1;
        }
    }
    buckets
        .into_iter()
        .map(|(date, count)| TimelinePoint { date, count })
        .collect()
}

pub fn processing_time_stats(tasks: &[TaskSummary]) -> ProcessingTimeStats {
    let mut times: Vec<f64> = tasks.iter().filter_map(|t| t.processing_time_seconds).collect();
    if times.is_empty() {
        return ProcessingTimeStats {
            min_seconds: 0.0,
            max_seconds: 0.0,
            avg_seconds: 0.0,
            median_seconds: None,
        };
    }
    times.sort_by(f64::total_cmp);

    let n = times.len();
    let median = if n % 2 == 0 {
        (times[n / 2 - 1] + times[n / 2]) / 2.0
    } else {
        times[n / 2]
    };
    let avg = times.iter().sum::<f64>() / n as f64;

    ProcessingTimeStats {
        min_seconds: round2(times[0]),
        max_seconds: round2(times[n - 1]),
        avg_seconds: round2(avg),
        median_seconds: Some(round2(median)),
    }
}

/// Validate the timeline window.
pub fn timeline_days(days: Option<i64>) -> Result<u32, DomainError> {
    bounded(days, DEFAULT_TIMELINE_DAYS, MAX_TIMELINE_DAYS, "days")
}

/// Validate the recent-jobs limit.
pub fn recent_limit(limit: Option<i64>) -> Result<u32, DomainError> {
    bounded(limit, DEFAULT_RECENT_JOBS, MAX_RECENT_JOBS, "limit")
}

fn bounded(value: Option<i64>, default: u32, max: u32, name: &str) -> Result<u32, DomainError> {
    let value = value.unwrap_or(i64::from(default));
    if !(1..=i64::from(max)).contains(&value) {
        return Err(DomainError::validation(format!(
            "{name} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(value as u32)
}

/// Store-backed facade over the pure functions above.
pub struct AnalyticsAggregator {
    store: Arc<dyn RecordStore>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn overview(&self) -> EngineResult<Overview> {
        let jobs = self.store.job_summaries().await?;
        let tasks = self.store.task_summaries().await?;
        Ok(overview(&jobs, &tasks))
    }

    pub async fn jobs_by_type(&self) -> EngineResult<Vec<KeyCount>> {
        Ok(jobs_by_type(&self.store.job_summaries().await?))
    }

    pub async fn jobs_by_status(&self) -> EngineResult<Vec<KeyCount>> {
        Ok(jobs_by_status(&self.store.job_summaries().await?))
    }

    pub async fn tasks_by_status(&self) -> EngineResult<Vec<KeyCount>> {
        Ok(tasks_by_status(&self.store.task_summaries().await?))
    }

    pub async fn timeline(&self, days: u32) -> EngineResult<Vec<TimelinePoint>> {
        let jobs = self.store.job_summaries().await?;
        Ok(timeline(&jobs, days, Utc::now().date_naive()))
    }

    pub async fn processing_time_stats(&self) -> EngineResult<ProcessingTimeStats> {
        Ok(processing_time_stats(&self.store.task_summaries().await?))
    }

    pub async fn recent_jobs(&self, limit: u32) -> EngineResult<Vec<Job>> {
        Ok(self.store.recent_jobs(limit as usize).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use taskmill_jobs::JobType;

    fn job(job_type: JobType, status: JobStatus, date: NaiveDate) -> JobSummary {
        JobSummary {
            job_type,
            status,
            created_at: Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap()),
        }
    }

    fn task(status: TaskStatus, secs: Option<f64>) -> TaskSummary {
        TaskSummary {
            status,
            processing_time_seconds: secs,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_store_yields_zeroes() {
        let o = overview(&[], &[]);
        assert_eq!(o.total_jobs, 0);
        assert_eq!(o.success_rate, 0.0);
        assert_eq!(o.avg_processing_time_seconds, 0.0);

        let stats = processing_time_stats(&[]);
        assert_eq!(stats.min_seconds, 0.0);
        assert_eq!(stats.median_seconds, None);

        assert!(jobs_by_type(&[]).is_empty());
        let points = timeline(&[], 7, day(2024, 3, 10));
        assert_eq!(points.len(), 7);
        assert!(points.iter().all(|p| p.count == 0));
    }

    #[test]
    fn overview_counts_pending_like_statuses() {
        let today = day(2024, 3, 10);
        let jobs = vec![
            job(JobType::Compute, JobStatus::Completed, today),
            job(JobType::Compute, JobStatus::Failed, today),
            job(JobType::Compute, JobStatus::Enqueued, today),
            job(JobType::Compute, JobStatus::CreatingTasks, today),
            job(JobType::Compute, JobStatus::Running, today),
            job(JobType::Compute, JobStatus::Cancelled, today),
        ];
        let tasks = vec![
            task(TaskStatus::Completed, Some(1.0)),
            task(TaskStatus::Completed, Some(2.333)),
            task(TaskStatus::Retrying, None),
            task(TaskStatus::Enqueued, None),
            task(TaskStatus::Running, None),
            task(TaskStatus::Failed, Some(0.5)),
        ];

        let o = overview(&jobs, &tasks);
        assert_eq!(o.total_jobs, 6);
        assert_eq!(o.pending_jobs, 2);
        assert_eq!(o.running_jobs, 1);
        assert_eq!(o.success_rate, 16.67);
        assert_eq!(o.pending_tasks, 2);
        assert_eq!(o.running_tasks, 1);
        assert_eq!(o.total_processing_time_seconds, 3.83);
        assert_eq!(o.avg_processing_time_seconds, 1.28);
    }

    #[test]
    fn grouped_counts_only_observed_keys() {
        let today = day(2024, 3, 10);
        let jobs = vec![
            job(JobType::MlInference, JobStatus::Completed, today),
            job(JobType::Compute, JobStatus::Completed, today),
            job(JobType::MlInference, JobStatus::Failed, today),
        ];
        assert_eq!(
            jobs_by_type(&jobs),
            vec![
                KeyCount { key: "compute".into(), count: 1 },
                KeyCount { key: "ml_inference".into(), count: 2 },
            ]
        );
        assert_eq!(jobs_by_status(&jobs).len(), 2);
    }

    #[test]
    fn timeline_is_zero_filled_oldest_first() {
        let today = day(2024, 3, 10);
        let jobs = vec![
            job(JobType::Compute, JobStatus::Completed, day(2024, 3, 10)),
            job(JobType::Compute, JobStatus::Completed, day(2024, 3, 10)),
            job(JobType::Compute, JobStatus::Completed, day(2024, 3, 4)),
            // Outside the window.
            job(JobType::Compute, JobStatus::Completed, day(2024, 3, 3)),
        ];

        let points = timeline(&jobs, 7, today);
        assert_eq!(points.len(), 7);
        assert_eq!(points[0], TimelinePoint { date: day(2024, 3, 4), count: 1 });
        assert_eq!(points[6], TimelinePoint { date: today, count: 2 });
        assert_eq!(points.iter().map(|p| p.count).sum::<u64>(), 3);

        assert_eq!(timeline(&jobs, 1, today).len(), 1);
    }

    #[test]
    fn median_of_even_and_odd_sets() {
        let odd = [task(TaskStatus::Completed, Some(3.0)), task(TaskStatus::Completed, Some(1.0)), task(TaskStatus::Completed, Some(2.0))];
        let stats = processing_time_stats(&odd);
        assert_eq!(stats.median_seconds, Some(2.0));
        assert_eq!(stats.min_seconds, 1.0);
        assert_eq!(stats.max_seconds, 3.0);

        let even = [task(TaskStatus::Completed, Some(1.0)), task(TaskStatus::Completed, Some(4.0))];
        assert_eq!(processing_time_stats(&even).median_seconds, Some(2.5));
    }

    #[test]
    fn query_bounds() {
        assert_eq!(timeline_days(None).unwrap(), 7);
        assert!(timeline_days(Some(0)).is_err());
        assert!(timeline_days(Some(31)).is_err());
        assert_eq!(recent_limit(None).unwrap(), 10);
        assert!(recent_limit(Some(51)).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn timeline_always_has_requested_length(days in 1u32..=30, offsets in proptest::collection::vec(0u64..60, 0..50)) {
                let today = day(2024, 6, 1);
                let jobs: Vec<_> = offsets
                    .iter()
                    .map(|o| job(JobType::Compute, JobStatus::Completed, today - Days::new(*o)))
                    .collect();
                let points = timeline(&jobs, days, today);
                prop_assert_eq!(points.len(), days as usize);
                prop_assert_eq!(points.last().map(|p| p.date), Some(today));
                let in_window = offsets.iter().filter(|o| **o < u64::from(days)).count() as u64;
                prop_assert_eq!(points.iter().map(|p| p.count).sum::<u64>(), in_window);
            }
        }
    }
}
