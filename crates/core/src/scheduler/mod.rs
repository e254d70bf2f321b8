//! Job registry, schedules, retry policy and the worker pool that runs
//! collectors.

mod job;
mod registry;
mod schedule;
mod service;
mod worker_pool;

#[cfg(test)]
mod scheduler_tests;

pub use job::{CollectionJob, JobSnapshot, JobState, LastStatus, RetryPolicy, RunSummary};
pub use registry::JobRegistry;
pub use schedule::ScheduleSpec;
pub use service::{Scheduler, SchedulerSettings, TickReport};
pub use worker_pool::RunCompletion;
