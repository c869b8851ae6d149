use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{Days, Utc};
use taskmill_infra::analytics::{overview, processing_time_stats, timeline};
use taskmill_infra::store::{JobSummary, TaskSummary};
use taskmill_jobs::{JobStatus, JobType, TaskStatus};

fn sample_jobs(n: usize) -> Vec<JobSummary> {
    let now = Utc::now();
    let types = [JobType::Compute, JobType::DataProcessing, JobType::MlInference];
    (0..n)
        .map(|i| JobSummary {
            job_type: types[i % types.len()].clone(),
            status: JobStatus::ALL[i % JobStatus::ALL.len()],
            created_at: now - Days::new((i % 14) as u64),
        })
        .collect()
}

fn sample_tasks(n: usize) -> Vec<TaskSummary> {
    (0..n)
        .map(|i| TaskSummary {
            status: TaskStatus::ALL[i % TaskStatus::ALL.len()],
            processing_time_seconds: (i % 3 != 0).then(|| (i % 97) as f64 * 0.13),
        })
        .collect()
}

fn bench_overview(c: &mut Criterion) {
    let mut group = c.benchmark_group("analytics_overview");
    for size in [1_000usize, 10_000, 100_000] {
        let jobs = sample_jobs(size / 10);
        let tasks = sample_tasks(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| overview(black_box(&jobs), black_box(&tasks)))
        });
    }
    group.finish();
}

fn bench_processing_time_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("analytics_processing_time_stats");
    for size in [1_000usize, 100_000] {
        let tasks = sample_tasks(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| processing_time_stats(black_box(&tasks)))
        });
    }
    group.finish();
}

fn bench_timeline(c: &mut Criterion) {
    let jobs = sample_jobs(50_000);
    let today = Utc::now().date_naive();
    c.bench_function("analytics_timeline_30_days", |b| {
        b.iter(|| timeline(black_box(&jobs), 30, today))
    });
}

criterion_group!(
    benches,
    bench_overview,
    bench_processing_time_stats,
    bench_timeline
);
criterion_main!(benches);
