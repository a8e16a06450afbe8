//! Category to topic routing
//!
//! The topic table is closed and compiled in: each [`Category`] maps to
//! exactly one Domoticz topic and unknown tags are refused rather than
//! falling back to a default topic, so a malformed command frame can never
//! land on the sensor topic.

use std::sync::Arc;
use tracing::trace;

use crate::broker::BrokerClient;
use crate::envelope::Category;
use crate::error::{PublishError, RouteError};

/// Topic for sensor readings
pub const TOPIC_SENSOR_INFO: &str = "domoticz/in";

/// Topic for node log lines
pub const TOPIC_LOG: &str = "domoticz/in/log";

/// Topic for commands
pub const TOPIC_COMMAND: &str = "domoticz/in/cmd";

/// Closed category → topic table
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicMap;

impl TopicMap {
    /// Topic for a known category
    pub fn topic(category: Category) -> &'static str {
        match category {
            Category::SensorInfo => TOPIC_SENSOR_INFO,
            Category::Log => TOPIC_LOG,
            Category::Command => TOPIC_COMMAND,
        }
    }

    /// Topic for a raw category tag
    pub fn resolve(tag: u32) -> Result<&'static str, RouteError> {
        Category::try_from(tag).map(Self::topic)
    }

    /// All entries, in tag order
    pub fn entries() -> impl Iterator<Item = (Category, &'static str)> {
        Category::ALL
            .into_iter()
            .map(|category| (category, Self::topic(category)))
    }
}

/// Resolves topics and forwards payloads to the broker collaborator
#[derive(Clone)]
pub struct TopicRouter {
    broker: Arc<dyn BrokerClient>,
    retain: bool,
}

impl TopicRouter {
    /// Create a router publishing without the retain flag
    pub fn new(broker: Arc<dyn BrokerClient>) -> Self {
        Self {
            broker,
            retain: false,
        }
    }

    /// Set the retain flag used for every publication
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Whether publications carry the retain flag
    pub fn retain(&self) -> bool {
        self.retain
    }

    /// Look up the topic for a category tag
    pub fn resolve_topic(&self, tag: u32) -> Result<&'static str, RouteError> {
        TopicMap::resolve(tag)
    }

    /// Forward `content` unchanged to the broker on `topic`
    ///
    /// Failures are returned as-is; retrying is the broker client's job.
    pub fn publish(&self, topic: &str, content: &[u8]) -> Result<(), PublishError> {
        trace!(topic, bytes = content.len(), retain = self.retain, "Publishing");
        self.broker.publish(topic, content, self.retain)
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRouter")
            .field("retain", &self.retain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingBroker;
    use std::collections::HashSet;

    #[test]
    fn test_fixed_topics() {
        assert_eq!(TopicMap::resolve(1).unwrap(), "domoticz/in");
        assert_eq!(TopicMap::resolve(2).unwrap(), "domoticz/in/log");
        assert_eq!(TopicMap::resolve(3).unwrap(), "domoticz/in/cmd");
    }

    #[test]
    fn test_topics_are_distinct() {
        let topics: HashSet<&str> = TopicMap::entries().map(|(_, topic)| topic).collect();
        assert_eq!(topics.len(), Category::ALL.len());
    }

    #[test]
    fn test_unmapped_categories() {
        for tag in [0, 4, 5, 255, u32::MAX] {
            assert_eq!(
                TopicMap::resolve(tag),
                Err(RouteError::UnmappedCategory(tag))
            );
        }
    }

    #[test]
    fn test_publish_passes_content_through() {
        let broker = RecordingBroker::new();
        let router = TopicRouter::new(broker.clone().into_client());

        let topic = router.resolve_topic(1).unwrap();
        router.publish(topic, b"23.5").unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "domoticz/in");
        assert_eq!(published[0].payload, b"23.5");
        assert!(!published[0].retain);
    }

    #[test]
    fn test_publish_with_retain() {
        let broker = RecordingBroker::new();
        let router = TopicRouter::new(broker.clone().into_client()).with_retain(true);

        router.publish(TOPIC_LOG, b"boot").unwrap();
        assert!(broker.published()[0].retain);
    }

    #[test]
    fn test_publish_failure_is_returned() {
        let broker = RecordingBroker::new();
        broker.fail_with(PublishError::Disconnected);
        let router = TopicRouter::new(broker.clone().into_client());

        assert_eq!(
            router.publish(TOPIC_COMMAND, b"restart"),
            Err(PublishError::Disconnected)
        );
        assert_eq!(broker.attempts(), 1);
    }
}
