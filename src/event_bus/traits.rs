use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// All events that flow through the engine's internal event bus.
///
/// These are consumed by [`crate::reporter::StatusReporter`] to produce
/// user-facing notifications, and by tests asserting orchestrator behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    JobScheduled {
        job_name: String,
        chat_id: String,
    },
    JobRescheduled {
        old_job_name: String,
        new_job_name: String,
        chat_id: String,
    },
    JobCancelled {
        job_name: String,
        chat_id: String,
    },
    ReminderFired {
        job_name: String,
        chat_id: String,
        masked_cookies: String,
    },
    PrewarmDone {
        job_name: String,
    },
    QuotaMiss {
        job_name: String,
        chat_id: String,
    },
    PollTick {
        job_name: String,
        chat_id: String,
        tick: u32,
    },
    PollDeadline {
        job_name: String,
        chat_id: String,
    },
    ViewFired {
        job_name: String,
    },
    BookingResult {
        job_name: String,
        chat_id: String,
        success: bool,
        message: String,
        booking_code: Option<String>,
        link: Option<String>,
        elapsed_ms: u64,
    },
    SessionExpired {
        job_name: String,
        chat_id: String,
        message: String,
    },
    SystemError {
        message: String,
    },
}

/// Central pub/sub bus for engine events.
///
/// All returned `Receiver`s receive every published event; callers filter
/// client-side if they only care about a subset.
pub trait EventBus: Send + Sync {
    /// Publish an event to all active subscribers.
    fn publish(&self, event: AppEvent) -> Result<(), String>;

    /// Subscribe to all events.
    fn subscribe(&self) -> broadcast::Receiver<AppEvent>;
}
