use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::monitoring::ServiceStatus;

const CHANNEL_CAPACITY: usize = 128;

/// Fans service events out to connected event-stream subscribers.
pub struct StatusBroadcaster {
    events_tx: broadcast::Sender<String>,
}

impl StatusBroadcaster {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self { events_tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events_tx.subscribe()
    }

    pub fn publish_status_change(&self, service_id: i32, status: ServiceStatus) {
        self.send_message(
            "service_status_changed",
            json!({ "service_id": service_id, "status": status.as_str() }),
        );
    }

    pub fn publish_services_updated(&self) {
        self.send_message("services_updated", json!({}));
    }

    fn send_message(&self, message_type: &str, payload: serde_json::Value) {
        let message = json!({
            "type": message_type,
            "timestamp": Utc::now().to_rfc3339(),
            "payload": payload,
        });

        let serialized = match serde_json::to_string(&message) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(message_type, error = %e, "failed to serialize event");
                return;
            }
        };

        // Send only fails when nobody is subscribed.
        if self.events_tx.send(serialized).is_err() {
            debug!(message_type, "no event subscribers connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_status_changes() {
        let broadcaster = StatusBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish_status_change(7, ServiceStatus::Error);

        let raw = rx.recv().await.unwrap();
        let event: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(event["type"], "service_status_changed");
        assert_eq!(event["payload"]["service_id"], 7);
        assert_eq!(event["payload"]["status"], "ERROR");
        assert!(event["timestamp"].is_string());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_does_not_panic() {
        let broadcaster = StatusBroadcaster::new();
        broadcaster.publish_services_updated();
    }
}
