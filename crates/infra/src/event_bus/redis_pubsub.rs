//! Redis pub/sub transport for status events (optional).
//!
//! Pub/sub is not durable: subscribers that are offline miss events. That
//! matches the notification contract, where the catalog stays the source of
//! truth and events only spare consumers from polling.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use thiserror::Error;
use tracing::{debug, warn};

use jobagent_events::{EventBus, StatusEvent, Subscription};

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to serialize status event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Publishes JSON-encoded [`StatusEvent`]s on one Redis channel.
#[derive(Debug, Clone)]
pub struct RedisPubSubNotifier {
    client: redis::Client,
    channel: String,
}

impl RedisPubSubNotifier {
    pub fn new(redis_url: impl AsRef<str>, channel: impl Into<String>) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl EventBus<StatusEvent> for RedisPubSubNotifier {
    type Error = RedisBusError;

    fn publish(&self, message: StatusEvent) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(&message)?;
        let mut conn = self.client.get_connection()?;
        let receivers: i64 = conn.publish(&self.channel, payload)?;
        debug!(channel = %self.channel, receivers, "status event published");
        Ok(())
    }

    fn subscribe(&self) -> Subscription<StatusEvent> {
        let (tx, rx) = mpsc::channel();

        let client = self.client.clone();
        let channel = self.channel.clone();

        // Forward pub/sub messages until the subscription is dropped.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "redis subscribe: connection failed");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(e) = pubsub.subscribe(&channel) {
                warn!(channel = %channel, error = %e, "redis subscribe failed");
                return;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(_) => return,
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let event: StatusEvent = match serde_json::from_str(&payload) {
                    Ok(e) => e,
                    Err(e) => {
                        debug!(error = %e, "skipping malformed status event");
                        continue;
                    }
                };

                if tx.send(event).is_err() {
                    return;
                }
            }
        });

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(
            RedisPubSubNotifier::new("not a url", "jobagent:status"),
            Err(RedisBusError::Redis(_))
        ));
    }

    #[test]
    fn keeps_channel() {
        let bus = RedisPubSubNotifier::new("redis://127.0.0.1/", "ops").unwrap();
        assert_eq!(bus.channel(), "ops");
    }
}
