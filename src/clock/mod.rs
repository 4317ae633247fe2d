//! Clock & Timer Wheel (spec §4.A): one-shot and repeating callbacks
//! scheduled against Asia/Jakarta wall-clock time.

mod tokio_wheel;
mod traits;

pub use tokio_wheel::TokioTimerWheel;
pub use traits::{TimerCallback, TimerHandle, TimerPayload, TimerWheel};
