use tokio::sync::broadcast;

use super::traits::{AppEvent, EventBus};

const DEFAULT_CAPACITY: usize = 1024;

/// [`EventBus`] implementation backed by a `tokio::sync::broadcast` channel.
pub struct TokioBroadcastBus {
    sender: broadcast::Sender<AppEvent>,
}

impl TokioBroadcastBus {
    /// Create with the default channel capacity (1024).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with an explicit channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for TokioBroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for TokioBroadcastBus {
    fn publish(&self, event: AppEvent) -> Result<(), String> {
        // `send` returns the number of active receivers (may be 0 — that is fine).
        self.sender.send(event).map(|_| ()).map_err(|e| e.to_string())
    }

    fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_receive() {
        let bus = TokioBroadcastBus::new();
        let mut rx = bus.subscribe();

        bus.publish(AppEvent::SystemError {
            message: "disk full".to_string(),
        })
        .expect("publish failed");

        match rx.recv().await.expect("recv failed") {
            AppEvent::SystemError { message } => assert_eq!(message, "disk full"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = TokioBroadcastBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(AppEvent::JobCancelled {
            job_name: "bromo-1-budi-2025-10-01-2025-09-30-070000".into(),
            chat_id: "chat-1".into(),
        })
        .unwrap();

        assert!(matches!(rx1.recv().await.unwrap(), AppEvent::JobCancelled { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), AppEvent::JobCancelled { .. }));
    }

    #[tokio::test]
    async fn lagged_receiver_reports_error() {
        // Capacity-1 bus so the second publish lags a subscriber that hasn't consumed yet.
        let bus = TokioBroadcastBus::with_capacity(1);
        let mut slow_rx = bus.subscribe();

        bus.publish(AppEvent::SystemError { message: "first".into() }).unwrap();
        bus.publish(AppEvent::SystemError { message: "overflow".into() }).unwrap();

        let result = slow_rx.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged, got {result:?}"
        );
    }
}
