use serde::Deserialize;
use serde_json::json;

use taskmill_jobs::{Job, Task};
use taskmill_infra::JobListing;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub job_type: String,
    pub num_tasks: i64,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimelineQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentJobsQuery {
    pub limit: Option<i64>,
}

// -------------------------
// JSON mapping
// -------------------------

pub fn job_to_json(job: &Job) -> serde_json::Value {
    json!({
        "id": job.id.to_string(),
        "job_type": job.job_type.as_str(),
        "status": job.status.as_str(),
        "total_tasks": job.total_tasks,
        "completed_tasks": job.completed_tasks,
        "failed_tasks": job.failed_tasks,
        "parameters": job.parameters,
        "created_at": job.created_at,
        "updated_at": job.updated_at,
        "started_at": job.started_at,
        "completed_at": job.completed_at,
        "error_message": job.error_message,
    })
}

pub fn task_to_json(task: &Task) -> serde_json::Value {
    json!({
        "id": task.id.to_string(),
        "job_id": task.job_id.to_string(),
        "task_index": task.task_index,
        "status": task.status.as_str(),
        "retry_count": task.retry_count,
        "max_retries": task.max_retries,
        "parameters": task.parameters,
        "result": task.result,
        "error_message": task.error_message,
        "created_at": task.created_at,
        "updated_at": task.updated_at,
        "started_at": task.started_at,
        "completed_at": task.completed_at,
        "processing_time_seconds": task.processing_time_seconds,
    })
}

pub fn job_listing_to_json(listing: &JobListing) -> serde_json::Value {
    json!({
        "jobs": listing.jobs.iter().map(job_to_json).collect::<Vec<_>>(),
        "total": listing.total,
        "page": listing.page,
        "page_size": listing.page_size,
        "total_pages": listing.total_pages,
    })
}

pub fn task_list_to_json(tasks: &[Task]) -> serde_json::Value {
    json!({
        "tasks": tasks.iter().map(task_to_json).collect::<Vec<_>>(),
        "total": tasks.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmill_jobs::JobType;

    #[test]
    fn job_json_hides_internal_fields() {
        let mut job = Job::new(JobType::Compute, 2, Some(json!({"matrix_size": 10})));
        job.first_failure = Some("boom".into());

        let value = job_to_json(&job);
        assert_eq!(value["job_type"], "compute");
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["total_tasks"], 2);
        assert_eq!(value["parameters"]["matrix_size"], 10);
        assert!(value.get("first_failure").is_none());
        assert!(value["started_at"].is_null());
    }

    #[test]
    fn task_list_counts_entries() {
        let job = Job::new(JobType::Compute, 2, None);
        let tasks = vec![
            Task::new(job.id, 0, 3, json!({})),
            Task::new(job.id, 1, 3, json!({})),
        ];
        let value = task_list_to_json(&tasks);
        assert_eq!(value["total"], 2);
        assert_eq!(value["tasks"][1]["task_index"], 1);
        assert_eq!(value["tasks"][0]["job_id"], job.id.to_string());
    }
}
