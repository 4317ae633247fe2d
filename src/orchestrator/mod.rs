//! Scheduler Orchestrator (spec §4.F): composes the Clock, Job Store, HTTP
//! Session Factory, Protocol Driver, and Status Reporter on job triggers.
//!
//! Grounded on the teacher's `scheduler::tokio_scheduler::TokioScheduler`
//! for the "Arc<Self> handed into spawned callbacks" shape, generalized from
//! one tick-driven job map into four independently-armed timer families per
//! job (spec.md §4.F) plus the release-window poll track (spec.md
//! "Release-window polling").

mod timers;

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::clock::TimerWheel;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::event_bus::{AppEvent, EventBus};
use crate::http::{DecorrelatedJitter, HttpSessionFactory, Session};
use crate::model::{CapacityRow, Job, Site};
use crate::reporter::StatusReporter;
use crate::store::JobStore;

/// Everything the orchestrator needs to arm timers and drive jobs,
/// bundled so callbacks can capture one `Arc<Orchestrator>` instead of a
/// handful of loose collaborators (spec.md §9 "Callback closures").
pub struct Orchestrator {
    pub(super) wheel: Arc<dyn TimerWheel>,
    pub(super) store: Arc<dyn JobStore>,
    pub(super) http: Arc<HttpSessionFactory>,
    pub(super) bus: Arc<dyn EventBus>,
    pub(super) reporter: Arc<StatusReporter>,
    pub(super) config: AppConfig,

    /// Process-wide prewarm cache: `job_name → Session`, exclusive
    /// ownership transferred to the firing callback on pickup (spec.md §5).
    pub(super) prewarm_cache: RwLock<HashMap<String, Session>>,
    /// At-most-once submission claim per `job_name` (spec.md §9).
    pub(super) claims: Mutex<HashSet<String>>,
    /// Last raw capacity-view body per job, for the `view-` diff.
    pub(super) view_last_body: RwLock<HashMap<String, String>>,
    /// Per-job decorrelated-jitter state for `view-` tick spacing.
    pub(super) view_jitter: RwLock<HashMap<String, DecorrelatedJitter>>,
    /// Per-job poll tick counters, for the notify-every-N-ticks cadence.
    pub(super) poll_ticks: RwLock<HashMap<String, u32>>,
}

impl Orchestrator {
    pub fn new(
        wheel: Arc<dyn TimerWheel>,
        store: Arc<dyn JobStore>,
        http: Arc<HttpSessionFactory>,
        bus: Arc<dyn EventBus>,
        reporter: Arc<StatusReporter>,
        config: AppConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            wheel,
            store,
            http,
            bus,
            reporter,
            config,
            prewarm_cache: RwLock::new(HashMap::new()),
            claims: Mutex::new(HashSet::new()),
            view_last_body: RwLock::new(HashMap::new()),
            view_jitter: RwLock::new(HashMap::new()),
            poll_ticks: RwLock::new(HashMap::new()),
        })
    }

    /// Replay the store's rehydration stream and re-arm timers for every
    /// job whose `exec_at` is still in the future (spec.md §4.B).
    #[tracing::instrument(name = "orchestrator.boot_rehydrate", skip(self))]
    pub async fn boot_rehydrate(self: &Arc<Self>) -> AppResult<()> {
        let jobs = self.store.rehydrate().await?;
        for rehydrated in jobs {
            if let Err(e) = self.arm_job(&rehydrated.user_id, rehydrated.job.clone()).await {
                tracing::warn!(
                    job_name = %rehydrated.job.job_name,
                    error = %e,
                    "failed to re-arm job on boot"
                );
            }
        }
        Ok(())
    }

    /// Persist and arm a brand new job. Rejects `exec_at <= now` without
    /// mutating the store or arming any timer (spec.md §8 scenario 6).
    #[tracing::instrument(name = "orchestrator.create_job", skip(self, job), fields(job_name = %job.job_name))]
    pub async fn create_job(self: &Arc<Self>, user_id: &str, job: Job) -> AppResult<()> {
        if job.exec_at <= Utc::now() {
            return Err(AppError::PastDeadline);
        }
        self.store.put_job(user_id, job.clone()).await?;
        self.arm_job(user_id, job.clone()).await?;
        let _ = self.bus.publish(AppEvent::JobScheduled {
            job_name: job.job_name.clone(),
            chat_id: job.chat_id.clone(),
        });
        self.reporter
            .scheduling_confirmed(&job.chat_id, &job.job_name, &job.exec_at.to_rfc3339())
            .await
    }

    /// Tear down every timer family for `old_job_name`, then persist and
    /// arm `new_job` from scratch (spec.md §4.F "Reschedule semantics").
    #[tracing::instrument(name = "orchestrator.reschedule_job", skip(self, new_job), fields(old_job_name, new_job_name = %new_job.job_name))]
    pub async fn reschedule_job(self: &Arc<Self>, user_id: &str, old_job_name: &str, new_job: Job) -> AppResult<()> {
        if new_job.exec_at <= Utc::now() {
            return Err(AppError::PastDeadline);
        }
        self.teardown_timers(old_job_name).await;
        self.store.remove_job(user_id, old_job_name).await?;
        self.store.put_job(user_id, new_job.clone()).await?;
        self.arm_job(user_id, new_job.clone()).await?;
        self.bus
            .publish(AppEvent::JobRescheduled {
                old_job_name: old_job_name.to_string(),
                new_job_name: new_job.job_name.clone(),
                chat_id: new_job.chat_id.clone(),
            })
            .map_err(|e| AppError::Store(format!("event bus publish failed: {e}")))
    }

    /// Remove all timer families and the store record for `job_name`.
    #[tracing::instrument(name = "orchestrator.cancel_job", skip(self))]
    pub async fn cancel_job(self: &Arc<Self>, user_id: &str, job_name: &str) -> AppResult<()> {
        self.teardown_timers(job_name).await;
        if let Some(job) = self.store.remove_job(user_id, job_name).await? {
            let _ = self.bus.publish(AppEvent::JobCancelled {
                job_name: job.job_name,
                chat_id: job.chat_id,
            });
        }
        Ok(())
    }

    pub async fn list_jobs(&self, user_id: &str) -> AppResult<Vec<Job>> {
        self.store.list_jobs_by_user(user_id).await
    }

    pub async fn get_job(&self, user_id: &str, job_name: &str) -> AppResult<Option<Job>> {
        self.store.get_job(user_id, job_name).await
    }

    pub async fn set_ci_session(&self, user_id: &str, ci_session: String) -> AppResult<()> {
        self.store.set_ci(user_id, ci_session).await
    }

    /// One-off capacity check for the `capacity` control-surface command —
    /// not part of any armed timer, so it builds a throwaway probe session.
    pub async fn probe_capacity(&self, user_id: &str, site: Site, date: NaiveDate) -> Option<CapacityRow> {
        let user_ci = self.store.get_ci(user_id).await.ok().flatten();
        let cookies = crate::model::JobCookies::default();
        let session = self.http.make_session(&cookies, user_ci.as_deref());
        crate::capacity::check_capacity(&session, self.id_site_for(site), date).await
    }
}
