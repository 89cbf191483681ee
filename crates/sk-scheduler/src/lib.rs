//! `sk-scheduler` — C5 Scheduler: declarative cron/interval jobs with
//! quiet hours, overlap avoidance, and run-history retention.

pub mod db;
pub mod document;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod types;

pub use document::parse_document;
pub use engine::{JobExecutor, QuietHours, ReloadReport, SchedulerEngine};
pub use error::{Result, SchedulerError};
pub use schedule::compute_next_run;
pub use types::{JobExecution, JobRunStatus, OverlapPolicy, Schedule, ScheduledJob, TargetChannel};
