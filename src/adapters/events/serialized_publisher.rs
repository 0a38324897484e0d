//! SerializedPublisher - One publish at a time over a shared broker client.
//!
//! Some broker clients multiplex a single channel that must not see
//! interleaved calls. Wrapping such a publisher makes concurrent callers
//! (the publisher loop and `EventService::publish` from request handlers)
//! queue up in arrival order.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, Event};
use crate::ports::EventPublisher;

/// Serializes calls to an inner publisher.
pub struct SerializedPublisher {
    inner: Arc<dyn EventPublisher>,
    gate: Mutex<()>,
}

impl SerializedPublisher {
    pub fn new(inner: Arc<dyn EventPublisher>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }
}

#[async_trait]
impl EventPublisher for SerializedPublisher {
    async fn publish(&self, event: &Event) -> Result<(), DomainError> {
        let _guard = self.gate.lock().await;
        self.inner.publish(event).await
    }

    /// Holds the gate for the whole batch so no other caller interleaves.
    async fn publish_all(&self, events: &[Event]) -> Result<(), DomainError> {
        let _guard = self.gate.lock().await;
        self.inner.publish_all(events).await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Publisher that tracks how many calls overlap
    #[derive(Default)]
    struct OverlapProbe {
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventPublisher for OverlapProbe {
        async fn publish(&self, _: &Event) -> Result<(), DomainError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn concurrent_publishes_never_overlap() {
        let probe = Arc::new(OverlapProbe::default());
        let publisher = Arc::new(SerializedPublisher::new(probe.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let publisher = publisher.clone();
            handles.push(tokio::spawn(async move {
                publisher
                    .publish(&Event::raw("test.event", json!({ "n": i })))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(probe.calls.load(Ordering::SeqCst), 8);
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reports_inner_connectivity() {
        let publisher = SerializedPublisher::new(Arc::new(OverlapProbe::default()));
        assert!(!publisher.is_connected());
    }
}
