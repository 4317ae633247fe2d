//! Timer arming, teardown, and the callback bodies for the four armed
//! families (`prewarm-`, `rem-`, `main-`, `view-`) plus `poll-`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serde_json::Value;

use crate::clock::TimerHandle;
use crate::error::AppResult;
use crate::event_bus::AppEvent;
use crate::http::{DecorrelatedJitter, Session};
use crate::model::{Job, Site};
use crate::protocol::errors::is_session_expired;
use crate::protocol::{self, quota_unavailable_message};
use crate::reporter::mask_cookie;

use super::Orchestrator;

impl Orchestrator {
    pub(super) fn id_site_for(&self, site: Site) -> u32 {
        match site {
            Site::Bromo => self.config.sites.bromo.id_site,
            Site::Semeru => self.config.sites.semeru.id_site,
        }
    }

    async fn build_probe_session(&self, user_id: &str, job: &Job) -> Session {
        let user_ci = self.store.get_ci(user_id).await.ok().flatten();
        self.http.make_session(&job.cookies, user_ci.as_deref())
    }

    /// Take the prewarm-cached session if one exists, otherwise build a
    /// fresh one. Exclusive pickup: the cache entry is removed either way.
    async fn take_cached_session(&self, user_id: &str, job: &Job) -> Session {
        if let Some(session) = self.prewarm_cache.write().await.remove(&job.job_name) {
            return session;
        }
        self.build_probe_session(user_id, job).await
    }

    async fn try_claim(&self, job_name: &str) -> bool {
        let mut claims = self.claims.lock().await;
        if claims.contains(job_name) {
            false
        } else {
            claims.insert(job_name.to_string());
            true
        }
    }

    async fn release_claim(&self, job_name: &str) {
        self.claims.lock().await.remove(job_name);
    }

    /// Remove every timer family for `job_name` and drop all per-job
    /// transient state (prewarm cache, view diff/jitter, poll counters).
    pub(super) async fn teardown_timers(&self, job_name: &str) {
        for family in ["prewarm", "rem", "main", "poll", "view"] {
            self.wheel.remove_by_name(&format!("{family}-{job_name}")).await;
        }
        self.prewarm_cache.write().await.remove(job_name);
        self.view_last_body.write().await.remove(job_name);
        self.view_jitter.write().await.remove(job_name);
        self.poll_ticks.write().await.remove(job_name);
        self.claims.lock().await.remove(job_name);
    }

    /// Arm the `prewarm-`, `rem-` (if requested), `main-`, and `view-`
    /// timer families for a newly-created or rehydrated job (spec.md §4.F).
    pub(super) async fn arm_job(self: &Arc<Self>, user_id: &str, job: Job) -> AppResult<()> {
        let tz = self.wheel.timezone();
        let exec_at = job.exec_at.with_timezone(&tz);
        let now = self.wheel.now();

        let prewarm_at = exec_at - ChronoDuration::seconds(self.config.timers.prewarm_secs);
        if prewarm_at > now {
            let this = Arc::clone(self);
            let uid = user_id.to_string();
            let jn = job.job_name.clone();
            self.wheel
                .schedule_once(
                    &format!("prewarm-{}", job.job_name),
                    prewarm_at,
                    Value::Null,
                    Arc::new(move |_, _handle| {
                        let this = Arc::clone(&this);
                        let uid = uid.clone();
                        let jn = jn.clone();
                        Box::pin(async move { this.on_prewarm(uid, jn).await })
                    }),
                )
                .await?;
        }

        if let Some(minutes) = job.reminder_minutes {
            let rem_at = exec_at - ChronoDuration::minutes(minutes as i64);
            if rem_at > now {
                let this = Arc::clone(self);
                let uid = user_id.to_string();
                let jn = job.job_name.clone();
                self.wheel
                    .schedule_once(
                        &format!("rem-{}", job.job_name),
                        rem_at,
                        Value::Null,
                        Arc::new(move |_, _handle| {
                            let this = Arc::clone(&this);
                            let uid = uid.clone();
                            let jn = jn.clone();
                            Box::pin(async move { this.on_reminder(uid, jn).await })
                        }),
                    )
                    .await?;
            }
        }

        {
            let this = Arc::clone(self);
            let uid = user_id.to_string();
            let jn = job.job_name.clone();
            self.wheel
                .schedule_once(
                    &format!("main-{}", job.job_name),
                    exec_at,
                    Value::Null,
                    Arc::new(move |_, _handle| {
                        let this = Arc::clone(&this);
                        let uid = uid.clone();
                        let jn = jn.clone();
                        Box::pin(async move { this.on_main(uid, jn).await })
                    }),
                )
                .await?;
        }

        let view_start = exec_at - ChronoDuration::minutes(self.config.timers.view_lead_minutes);
        let view_end = exec_at + ChronoDuration::minutes(self.config.timers.view_trail_minutes);
        if view_start > now {
            let this = Arc::clone(self);
            let uid = user_id.to_string();
            let jn = job.job_name.clone();
            let interval = Duration::from_secs_f64(self.config.timers.view_jitter_base_secs.max(0.1));
            self.wheel
                .schedule_repeating(
                    &format!("view-{}", job.job_name),
                    view_start,
                    interval,
                    Value::Null,
                    Arc::new(move |_, handle| {
                        let this = Arc::clone(&this);
                        let uid = uid.clone();
                        let jn = jn.clone();
                        Box::pin(async move { this.on_view_tick(uid, jn, view_end, handle).await })
                    }),
                )
                .await?;
        }

        Ok(())
    }

    async fn on_prewarm(self: Arc<Self>, user_id: String, job_name: String) {
        let Some(job) = self.store.get_job(&user_id, &job_name).await.ok().flatten() else {
            return;
        };
        let session = self.build_probe_session(&user_id, &job).await;
        session.prewarm().await;
        self.prewarm_cache.write().await.insert(job_name.clone(), session);
        let _ = self.bus.publish(AppEvent::PrewarmDone { job_name });
    }

    async fn on_reminder(self: Arc<Self>, user_id: String, job_name: String) {
        let Some(job) = self.store.get_job(&user_id, &job_name).await.ok().flatten() else {
            return;
        };
        let ci = job
            .cookies
            .ci_session
            .clone()
            .or(self.store.get_ci(&user_id).await.ok().flatten())
            .unwrap_or_default();
        let _ = self.reporter.reminder(&job.chat_id, &job_name, &ci).await;
        let _ = self.bus.publish(AppEvent::ReminderFired {
            job_name: job_name.clone(),
            chat_id: job.chat_id.clone(),
            masked_cookies: mask_cookie(&ci),
        });
    }

    async fn on_main(self: Arc<Self>, user_id: String, job_name: String) {
        self.run_trigger(user_id, job_name).await;
    }

    /// `view-` tick: probe capacity, diff the raw body against the last
    /// tick, and fire the trigger on the first detected change. On a
    /// probe failure, just reschedule (network hiccups are not fatal to
    /// the watch). Self-cancels at `view_end`.
    async fn on_view_tick(self: Arc<Self>, user_id: String, job_name: String, view_end: chrono::DateTime<chrono_tz::Tz>, handle: TimerHandle) {
        if self.wheel.now() >= view_end {
            handle.cancel();
            self.view_last_body.write().await.remove(&job_name);
            self.view_jitter.write().await.remove(&job_name);
            return;
        }

        let Some(job) = self.store.get_job(&user_id, &job_name).await.ok().flatten() else {
            handle.cancel();
            return;
        };
        let id_site = self.id_site_for(job.site);
        let probe = self.build_probe_session(&user_id, &job).await;
        let Some(raw) = crate::capacity::fetch_capacity_raw(&probe, id_site, job.booking_date).await else {
            self.bump_view_jitter(&job_name, &handle).await;
            return;
        };

        let changed = {
            let mut bodies = self.view_last_body.write().await;
            let changed = matches!(bodies.get(&job_name), Some(prev) if prev != &raw);
            bodies.insert(job_name.clone(), raw);
            changed
        };

        if changed {
            let _ = self.bus.publish(AppEvent::ViewFired { job_name: job_name.clone() });
            self.wheel.remove_by_name(&format!("main-{job_name}")).await;
            handle.cancel();
            self.view_last_body.write().await.remove(&job_name);
            self.view_jitter.write().await.remove(&job_name);
            self.run_trigger(user_id, job_name).await;
        } else {
            self.bump_view_jitter(&job_name, &handle).await;
        }
    }

    async fn bump_view_jitter(&self, job_name: &str, handle: &TimerHandle) {
        let mut jitters = self.view_jitter.write().await;
        let jitter = jitters.entry(job_name.to_string()).or_insert_with(|| {
            DecorrelatedJitter::new(
                Duration::from_secs_f64(self.config.timers.view_jitter_base_secs),
                Duration::from_secs_f64(self.config.timers.view_jitter_cap_secs),
            )
        });
        handle.set_interval(jitter.next());
    }

    async fn arm_poll(self: Arc<Self>, user_id: String, job_name: String) {
        let interval_secs = self.config.timers.poll_interval_secs.max(1);
        let first = self.wheel.now() + ChronoDuration::seconds(interval_secs);
        let interval = Duration::from_secs(interval_secs as u64);
        let this = Arc::clone(&self);
        let uid = user_id.clone();
        let jn = job_name.clone();
        let _ = self
            .wheel
            .schedule_repeating(
                &format!("poll-{job_name}"),
                first,
                interval,
                Value::Null,
                Arc::new(move |_, handle| {
                    let this = Arc::clone(&this);
                    let uid = uid.clone();
                    let jn = jn.clone();
                    Box::pin(async move { this.on_poll_tick(uid, jn, handle).await })
                }),
            )
            .await;
    }

    /// Release-window poll tick (spec.md "Release-window polling"): check
    /// capacity every tick, notify every `poll_notify_every` ticks, give up
    /// after `poll_max_minutes`.
    async fn on_poll_tick(self: Arc<Self>, user_id: String, job_name: String, handle: TimerHandle) {
        let Some(job) = self.store.get_job(&user_id, &job_name).await.ok().flatten() else {
            handle.cancel();
            return;
        };

        let tick = {
            let mut ticks = self.poll_ticks.write().await;
            let counter = ticks.entry(job_name.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let interval_secs = self.config.timers.poll_interval_secs.max(1);
        let max_ticks = (self.config.timers.poll_max_minutes * 60 / interval_secs).max(1) as u32;
        if tick > max_ticks {
            handle.cancel();
            self.poll_ticks.write().await.remove(&job_name);
            let _ = self.bus.publish(AppEvent::PollDeadline {
                job_name: job_name.clone(),
                chat_id: job.chat_id.clone(),
            });
            let _ = self
                .reporter
                .terminal_result(&job.chat_id, &job_name, false, "batas waktu polling tercapai", None, None, 0)
                .await;
            return;
        }

        let id_site = self.id_site_for(job.site);
        let probe = self.build_probe_session(&user_id, &job).await;
        let available = crate::capacity::check_capacity(&probe, id_site, job.booking_date)
            .await
            .map(|row| row.available)
            .unwrap_or(false);

        let _ = self.bus.publish(AppEvent::PollTick {
            job_name: job_name.clone(),
            chat_id: job.chat_id.clone(),
            tick,
        });

        if available {
            handle.cancel();
            self.poll_ticks.write().await.remove(&job_name);
            self.run_trigger(user_id, job_name).await;
        } else if tick % self.config.timers.poll_notify_every.max(1) == 0 {
            let _ = self.reporter.polling_status(&job.chat_id, &job_name, tick).await;
        }
    }

    /// Claim, attempt submission up to `retry_attempts` times with
    /// decorrelated jitter between failures, and either report a terminal
    /// result or fall back to the poll track on a capacity-precondition
    /// miss. Shared by `main-`, `view-` (on first detected change), and
    /// `poll-` (on capacity becoming available) so at-most-once submission
    /// holds regardless of which timer fires first (spec.md §9).
    async fn run_trigger(self: Arc<Self>, user_id: String, job_name: String) {
        if !self.try_claim(&job_name).await {
            return;
        }

        let Some(job) = self.store.get_job(&user_id, &job_name).await.ok().flatten() else {
            self.release_claim(&job_name).await;
            return;
        };

        let id_site = self.id_site_for(job.site);
        let mut session = self.take_cached_session(&user_id, &job).await;

        let mut jitter = DecorrelatedJitter::new(
            Duration::from_secs_f64(self.config.timers.retry_jitter_base_secs),
            Duration::from_secs_f64(self.config.timers.retry_jitter_cap_secs),
        );
        let attempts = self.config.timers.retry_attempts.max(1);
        let quota_miss = quota_unavailable_message();

        let mut outcome = None;
        for attempt in 0..attempts {
            let result = protocol::book(&mut session, id_site, job.site, job.booking_date, &job.profile).await;
            let done = result.success || result.message == quota_miss || is_session_expired(&result.message);
            outcome = Some(result);
            if done {
                break;
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(jitter.next()).await;
            }
        }
        let outcome = outcome.expect("loop runs at least once since attempts is clamped to >= 1");

        if !outcome.success && outcome.message == quota_miss {
            let _ = self.bus.publish(AppEvent::QuotaMiss {
                job_name: job_name.clone(),
                chat_id: job.chat_id.clone(),
            });
            self.arm_poll(user_id.clone(), job_name.clone()).await;
            self.release_claim(&job_name).await;
            return;
        }

        if !outcome.success && is_session_expired(&outcome.message) {
            let _ = self.bus.publish(AppEvent::SessionExpired {
                job_name: job_name.clone(),
                chat_id: job.chat_id.clone(),
                message: outcome.message.clone(),
            });
            let ci = job
                .cookies
                .ci_session
                .clone()
                .or(self.store.get_ci(&user_id).await.ok().flatten())
                .unwrap_or_default();
            let _ = self.reporter.reminder(&job.chat_id, &job_name, &ci).await;
            self.release_claim(&job_name).await;
            return;
        }

        let _ = self
            .reporter
            .terminal_result(
                &job.chat_id,
                &job_name,
                outcome.success,
                &outcome.message,
                outcome.booking_code.as_deref(),
                outcome.link.as_deref(),
                outcome.elapsed_ms,
            )
            .await;
        let _ = self.bus.publish(AppEvent::BookingResult {
            job_name: job_name.clone(),
            chat_id: job.chat_id.clone(),
            success: outcome.success,
            message: outcome.message.clone(),
            booking_code: outcome.booking_code.clone(),
            link: outcome.link.clone(),
            elapsed_ms: outcome.elapsed_ms,
        });

        self.wheel.remove_by_name(&format!("main-{job_name}")).await;
        self.wheel.remove_by_name(&format!("view-{job_name}")).await;
        self.wheel.remove_by_name(&format!("poll-{job_name}")).await;
        self.prewarm_cache.write().await.remove(&job_name);
        self.view_last_body.write().await.remove(&job_name);
        self.view_jitter.write().await.remove(&job_name);
        self.poll_ticks.write().await.remove(&job_name);

        if outcome.success && self.config.orchestrator.promote_same_cookie_jobs {
            self.promote_next_same_cookie_job(&user_id, &job).await;
        }

        self.release_claim(&job_name).await;
    }

    /// Opt-in cross-job optimization (`config.orchestrator.promote_same_cookie_jobs`,
    /// spec.md §9 open question): after a successful submission, find the
    /// next still-pending job for this user sharing the same cookie jar and
    /// pull it forward to run immediately, on the theory that the session
    /// it would have prewarmed is already hot.
    async fn promote_next_same_cookie_job(self: &Arc<Self>, user_id: &str, finished: &Job) {
        let Ok(jobs) = self.store.list_jobs_by_user(user_id).await else {
            return;
        };
        let now = chrono::Utc::now();
        let Some(candidate) = jobs
            .into_iter()
            .filter(|j| j.job_name != finished.job_name)
            .filter(|j| j.exec_at > now)
            .find(|j| j.cookies == finished.cookies && !j.cookies.is_empty())
        else {
            return;
        };

        let mut promoted = candidate.clone();
        promoted.exec_at = now + ChronoDuration::seconds(1);
        if let Err(e) = self.reschedule_job(user_id, &candidate.job_name, promoted).await {
            tracing::warn!(job_name = %candidate.job_name, error = %e, "failed to promote same-cookie job");
        }
    }
}
