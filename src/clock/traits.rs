use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;

use crate::error::AppResult;

/// Opaque payload handed back to a fired callback untouched.
pub type TimerPayload = serde_json::Value;

/// A callback invoked when a timer fires. Receives its payload and a
/// [`TimerHandle`] for self-cancellation and (for repeating timers)
/// interval mutation.
pub type TimerCallback =
    Arc<dyn Fn(TimerPayload, TimerHandle) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle passed to a running callback. Cloning is cheap; all clones share
/// the same underlying cancel flag and interval.
#[derive(Clone)]
pub struct TimerHandle {
    name: String,
    cancel: Arc<AtomicBool>,
    interval_ms: Option<Arc<AtomicU64>>,
}

impl TimerHandle {
    pub(crate) fn new(name: String, cancel: Arc<AtomicBool>, interval_ms: Option<Arc<AtomicU64>>) -> Self {
        Self {
            name,
            cancel,
            interval_ms,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request self-cancellation. The wheel honors this before the next
    /// tick but will not interrupt an in-flight callback invocation.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Mutate the interval of a repeating timer, taking effect on its next
    /// tick. No-op on a one-shot timer's handle.
    pub fn set_interval(&self, new: Duration) {
        if let Some(a) = &self.interval_ms {
            a.store(new.as_millis() as u64, Ordering::SeqCst);
        }
    }
}

/// Schedules one-shot and repeating callbacks against Asia/Jakarta
/// wall-clock time. Callbacks run to completion; the wheel does not
/// preempt them.
#[async_trait]
pub trait TimerWheel: Send + Sync {
    /// Arm a one-shot timer. Fails with [`crate::error::AppError::PastDeadline`]
    /// if `when` is not strictly in the future.
    async fn schedule_once(
        &self,
        name: &str,
        when: DateTime<Tz>,
        payload: TimerPayload,
        callback: TimerCallback,
    ) -> AppResult<()>;

    /// Arm a repeating timer. `interval` is the initial spacing between
    /// ticks; callbacks can mutate it via their [`TimerHandle`].
    async fn schedule_repeating(
        &self,
        name: &str,
        first: DateTime<Tz>,
        interval: Duration,
        payload: TimerPayload,
        callback: TimerCallback,
    ) -> AppResult<()>;

    /// Cancel a live timer by name. Returns `false` if no such timer exists.
    async fn remove_by_name(&self, name: &str) -> bool;

    /// Names of all currently armed timers.
    async fn list_names(&self) -> Vec<String>;

    /// The wheel's wall-clock timezone (always `Asia/Jakarta` in this engine).
    fn timezone(&self) -> Tz;

    /// Current wall-clock time in the wheel's timezone.
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone())
    }
}
