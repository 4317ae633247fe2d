//! Job Store (spec §4.B): a single JSON document on disk, read fully at boot
//! and rewritten atomically on every mutation.
//!
//! Grounded on the teacher's `config::loader` atomic-save routine
//! (write-temp → rename) but layered under a per-process mutex, since the
//! store additionally needs serialized read-modify-write across concurrent
//! job mutations for the same user record (spec §3 invariant 3, §5 "store
//! writes are serialized per user record").

mod json_store;

pub use json_store::JsonJobStore;

use crate::error::AppResult;
use crate::model::Job;
use async_trait::async_trait;

/// A `(user_id, job)` pair replayed from disk at boot so the orchestrator can
/// re-arm timers for jobs whose `exec_at` is still in the future.
#[derive(Debug, Clone)]
pub struct RehydratedJob {
    pub user_id: String,
    pub job: Job,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a job under `user_id`. Returns the previous job
    /// with the same `job_name`, if any (used by rescheduling to find the
    /// timer family to tear down).
    async fn put_job(&self, user_id: &str, job: Job) -> AppResult<Option<Job>>;

    async fn get_job(&self, user_id: &str, job_name: &str) -> AppResult<Option<Job>>;

    /// Remove a job, returning it if it existed.
    async fn remove_job(&self, user_id: &str, job_name: &str) -> AppResult<Option<Job>>;

    async fn list_jobs_by_user(&self, user_id: &str) -> AppResult<Vec<Job>>;

    async fn get_ci(&self, user_id: &str) -> AppResult<Option<String>>;

    async fn set_ci(&self, user_id: &str, ci_session: String) -> AppResult<()>;

    /// All jobs across all users, for the orchestrator's boot-time rehydration.
    async fn rehydrate(&self) -> AppResult<Vec<RehydratedJob>>;
}
