//! `sigap`: a scheduled booking engine that arms precise timers ahead of a
//! national-park reservation release and drives the upstream booking
//! protocol the instant quota opens.

pub mod capacity;
pub mod clock;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod html;
pub mod http;
pub mod logging;
pub mod lookup;
pub mod model;
pub mod orchestrator;
pub mod protocol;
pub mod reporter;
pub mod store;

/// Convenience re-exports for the engine's most commonly used types.
///
/// ```rust
/// use sigap::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{TokioTimerWheel, TimerWheel};
    pub use crate::config::{load_default_config, AppConfig};
    pub use crate::error::{AppError, AppResult};
    pub use crate::event_bus::{AppEvent, EventBus, TokioBroadcastBus};
    pub use crate::http::{HttpSessionFactory, Session};
    pub use crate::model::{Job, Profile, Site};
    pub use crate::orchestrator::Orchestrator;
    pub use crate::reporter::{NotificationSink, StatusReporter};
    pub use crate::store::{JobStore, JsonJobStore};
}
