//! Tokio-backed [`TimerWheel`].
//!
//! Grounded on the teacher's `scheduler::tokio_scheduler::TokioScheduler`:
//! a background task per armed timer, a `watch`-free cancel flag checked
//! cooperatively around sleeps, and an in-memory map of live entries. Unlike
//! the teacher's single polling loop over a job map, each timer here owns
//! its own `tokio::spawn`'d task — callback fan-out needs no shared tick,
//! since timer names already carry the family/job identity (`family-jobname`)
//! the orchestrator arms and tears down by name.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::{sync::RwLock, task::JoinHandle};

use crate::error::{AppError, AppResult};

use super::traits::{TimerCallback, TimerHandle, TimerPayload, TimerWheel};

struct Entry {
    join: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
}

/// In-memory, Tokio-driven timer wheel.
pub struct TokioTimerWheel {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    tz: Tz,
}

impl TokioTimerWheel {
    pub fn new(tz: Tz) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            tz,
        }
    }

    /// Abort and drop any existing entry for `name`, enforcing the
    /// "at most one live timer per name" invariant.
    async fn evict(&self, name: &str) {
        if let Some(entry) = self.entries.write().await.remove(name) {
            entry.cancel.store(true, Ordering::SeqCst);
            entry.join.abort();
        }
    }
}

#[async_trait]
impl TimerWheel for TokioTimerWheel {
    #[tracing::instrument(name = "clock.schedule_once", skip(self, payload, callback), fields(timer = %name))]
    async fn schedule_once(
        &self,
        name: &str,
        when: DateTime<Tz>,
        payload: TimerPayload,
        callback: TimerCallback,
    ) -> AppResult<()> {
        let now = Utc::now().with_timezone(&self.tz);
        if when <= now {
            return Err(AppError::PastDeadline);
        }
        self.evict(name).await;

        let dur = (when.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_task = cancel.clone();
        let name_owned = name.to_string();
        let entries = self.entries.clone();

        let join = tokio::spawn(async move {
            tokio::time::sleep(dur).await;
            if cancel_task.load(Ordering::SeqCst) {
                return;
            }
            let handle = TimerHandle::new(name_owned.clone(), cancel_task.clone(), None);
            callback(payload, handle).await;
            entries.write().await.remove(&name_owned);
        });

        self.entries.write().await.insert(
            name.to_string(),
            Entry {
                join,
                cancel,
            },
        );
        Ok(())
    }

    #[tracing::instrument(name = "clock.schedule_repeating", skip(self, payload, callback), fields(timer = %name))]
    async fn schedule_repeating(
        &self,
        name: &str,
        first: DateTime<Tz>,
        interval: Duration,
        payload: TimerPayload,
        callback: TimerCallback,
    ) -> AppResult<()> {
        let now = Utc::now().with_timezone(&self.tz);
        if first <= now {
            return Err(AppError::PastDeadline);
        }
        self.evict(name).await;

        let first_dur = (first.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let cancel = Arc::new(AtomicBool::new(false));
        let interval_ms = Arc::new(AtomicU64::new(interval.as_millis() as u64));
        let cancel_task = cancel.clone();
        let interval_task = interval_ms.clone();
        let name_owned = name.to_string();
        let entries = self.entries.clone();

        let join = tokio::spawn(async move {
            tokio::time::sleep(first_dur).await;
            loop {
                if cancel_task.load(Ordering::SeqCst) {
                    break;
                }
                let handle = TimerHandle::new(
                    name_owned.clone(),
                    cancel_task.clone(),
                    Some(interval_task.clone()),
                );
                callback(payload.clone(), handle).await;
                if cancel_task.load(Ordering::SeqCst) {
                    break;
                }
                let wait_ms = interval_task.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }
            entries.write().await.remove(&name_owned);
        });

        self.entries.write().await.insert(
            name.to_string(),
            Entry {
                join,
                cancel,
            },
        );
        Ok(())
    }

    async fn remove_by_name(&self, name: &str) -> bool {
        if let Some(entry) = self.entries.write().await.remove(name) {
            entry.cancel.store(true, Ordering::SeqCst);
            entry.join.abort();
            true
        } else {
            false
        }
    }

    async fn list_names(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn wheel() -> TokioTimerWheel {
        TokioTimerWheel::new(chrono_tz::Asia::Jakarta)
    }

    #[tokio::test]
    async fn past_deadline_is_rejected() {
        let wheel = wheel();
        let when = wheel.now() - ChronoDuration::seconds(5);
        let result = wheel
            .schedule_once(
                "main-job",
                when,
                serde_json::Value::Null,
                Arc::new(|_, _| Box::pin(async {})),
            )
            .await;
        assert!(matches!(result, Err(AppError::PastDeadline)));
    }

    #[tokio::test]
    async fn schedule_once_fires_and_self_removes() {
        let wheel = wheel();
        let notify = Arc::new(Notify::new());
        let notify_cb = notify.clone();
        let when = wheel.now() + ChronoDuration::milliseconds(20);

        wheel
            .schedule_once(
                "main-job",
                when,
                serde_json::Value::Null,
                Arc::new(move |_, _| {
                    let notify = notify_cb.clone();
                    Box::pin(async move {
                        notify.notify_one();
                    })
                }),
            )
            .await
            .unwrap();

        assert!(wheel.list_names().await.contains(&"main-job".to_string()));
        notify.notified().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(wheel.list_names().await.is_empty());
    }

    #[tokio::test]
    async fn remove_by_name_cancels_before_fire() {
        let wheel = wheel();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = fired.clone();
        let when = wheel.now() + ChronoDuration::milliseconds(50);

        wheel
            .schedule_once(
                "main-job",
                when,
                serde_json::Value::Null,
                Arc::new(move |_, _| {
                    let fired = fired_cb.clone();
                    Box::pin(async move {
                        fired.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        assert!(wheel.remove_by_name("main-job").await);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rescheduling_same_name_evicts_previous() {
        let wheel = wheel();
        let first_fired = Arc::new(AtomicUsize::new(0));
        let first_fired_cb = first_fired.clone();
        let when = wheel.now() + ChronoDuration::milliseconds(30);

        wheel
            .schedule_once(
                "main-job",
                when,
                serde_json::Value::Null,
                Arc::new(move |_, _| {
                    let fired = first_fired_cb.clone();
                    Box::pin(async move {
                        fired.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        let when2 = wheel.now() + ChronoDuration::milliseconds(30);
        wheel
            .schedule_once(
                "main-job",
                when2,
                serde_json::Value::Null,
                Arc::new(|_, _| Box::pin(async {})),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(first_fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeating_timer_honors_interval_mutation() {
        let wheel = wheel();
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_cb = ticks.clone();
        let first = wheel.now() + ChronoDuration::milliseconds(10);

        wheel
            .schedule_repeating(
                "view-job",
                first,
                Duration::from_millis(15),
                serde_json::Value::Null,
                Arc::new(move |_, handle| {
                    let ticks = ticks_cb.clone();
                    Box::pin(async move {
                        let n = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                        if n >= 3 {
                            handle.cancel();
                        } else {
                            handle.set_interval(Duration::from_millis(5));
                        }
                    })
                }),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(wheel.list_names().await.is_empty());
    }
}
