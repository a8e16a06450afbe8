//! Broker collaborator interface
//!
//! The gateway never owns the MQTT connection. Anything that can take a
//! topic and a payload and report success implements [`BrokerClient`];
//! connection lifecycle, buffering and retries stay inside the client.

use crate::error::PublishError;

/// Publish primitive of the broker client
///
/// Calls are made in frame order and must not block the caller for longer
/// than it takes to hand the payload to the client.
pub trait BrokerClient: Send + Sync {
    /// Publish `payload` on `topic`
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), PublishError>;
}

impl<F> BrokerClient for F
where
    F: Fn(&str, &[u8], bool) -> Result<(), PublishError> + Send + Sync,
{
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), PublishError> {
        self(topic, payload, retain)
    }
}
