//! Ingress dispatcher - the per-frame entry point
//!
//! [`IngressDispatcher::on_frame_received`] is what the radio link calls for
//! every inbound frame. It runs the whole pipeline synchronously:
//!
//! ```text
//! raw bytes ──► envelope::decode ──► Received record ──► resolve_topic ──► publish
//!                    │                                        │               │
//!                    ▼                                        ▼               ▼
//!              Rejected record                        Unrouted record  PublishFailed /
//!                                                                      Published record
//! ```
//!
//! Every failure is recorded and the frame is dropped. Nothing is retried,
//! queued or reported back to the sender, and no state is carried from one
//! frame to the next.
//!
//! # Concurrency
//!
//! Each call decodes into its own [`Message`] value, so the dispatcher can be
//! shared behind an `Arc` by several links. Frames from a single caller are
//! processed in call order; across concurrent callers no ordering is implied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::broker::BrokerClient;
use crate::config::GatewayConfig;
use crate::diagnostics::{DiagnosticClock, DiagnosticRecord, DiagnosticsSink, FrameEvent};
use crate::envelope::{self, Message};
use crate::error::{DecodeError, PublishError, RouteError};
use crate::link::{Frame, MacAddress};
use crate::router::TopicRouter;

/// Result of processing one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Payload handed to the broker
    Published {
        /// Topic used
        topic: &'static str,
    },
    /// Frame could not be decoded
    Rejected(DecodeError),
    /// Category has no topic
    Unrouted(RouteError),
    /// Broker refused the publication
    PublishFailed {
        /// Topic attempted
        topic: &'static str,
        /// Broker failure
        error: PublishError,
    },
}

impl FrameOutcome {
    /// Whether the payload reached the broker client
    pub fn is_published(&self) -> bool {
        matches!(self, FrameOutcome::Published { .. })
    }
}

/// Dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames handed to the dispatcher
    pub frames_received: u64,
    /// Frames that failed to decode
    pub decode_failures: u64,
    /// Frames with an unmapped category
    pub unrouted: u64,
    /// Frames the broker refused
    pub publish_failures: u64,
    /// Frames published
    pub published: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_received: AtomicU64,
    decode_failures: AtomicU64,
    unrouted: AtomicU64,
    publish_failures: AtomicU64,
    published: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
        }
    }
}

/// Decodes, records and routes inbound frames
pub struct IngressDispatcher {
    router: TopicRouter,
    sink: Arc<dyn DiagnosticsSink>,
    clock: DiagnosticClock,
    diagnostics_enabled: bool,
    counters: Counters,
}

impl IngressDispatcher {
    /// Create a dispatcher with UTC timestamps and diagnostics enabled
    pub fn new(router: TopicRouter, sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            router,
            sink,
            clock: DiagnosticClock::default(),
            diagnostics_enabled: true,
            counters: Counters::default(),
        }
    }

    /// Create a dispatcher from configuration
    pub fn from_config(
        config: &GatewayConfig,
        broker: Arc<dyn BrokerClient>,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let router = TopicRouter::new(broker).with_retain(config.broker.retain);
        Self {
            clock: DiagnosticClock::from_config(&config.diagnostics),
            diagnostics_enabled: config.diagnostics.enabled,
            ..Self::new(router, sink)
        }
    }

    /// Use a specific clock for record timestamps
    pub fn with_clock(mut self, clock: DiagnosticClock) -> Self {
        self.clock = clock;
        self
    }

    /// Handle one inbound frame
    ///
    /// `length` is the length reported by the link; `raw` must hold at least
    /// that many bytes. Never blocks and never panics on frame content.
    pub fn on_frame_received(&self, sender: MacAddress, raw: &[u8], length: usize) -> FrameOutcome {
        Counters::bump(&self.counters.frames_received);
        trace!(sender = %sender, length, "Frame received");

        let message = match envelope::decode(raw, length) {
            Ok(message) => message,
            Err(error) => {
                Counters::bump(&self.counters.decode_failures);
                self.emit(FrameEvent::Rejected {
                    sender,
                    length,
                    error: error.clone(),
                });
                return FrameOutcome::Rejected(error);
            }
        };

        self.emit(Self::received_event(sender, length, &message));
        self.route(sender, &message)
    }

    /// Handle a frame delivered by a [`RadioLink`](crate::link::RadioLink)
    pub fn handle_frame(&self, frame: &Frame) -> FrameOutcome {
        self.on_frame_received(frame.sender, &frame.data, frame.len())
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    fn route(&self, sender: MacAddress, message: &Message) -> FrameOutcome {
        let topic = match self.router.resolve_topic(message.category) {
            Ok(topic) => topic,
            Err(error) => {
                Counters::bump(&self.counters.unrouted);
                self.emit(FrameEvent::Unrouted {
                    sender,
                    category: message.category,
                });
                return FrameOutcome::Unrouted(error);
            }
        };

        let payload = message.content_bytes();
        match self.router.publish(topic, payload) {
            Ok(()) => {
                Counters::bump(&self.counters.published);
                self.emit(FrameEvent::Published {
                    sender,
                    topic,
                    bytes: payload.len(),
                });
                FrameOutcome::Published { topic }
            }
            Err(error) => {
                Counters::bump(&self.counters.publish_failures);
                self.emit(FrameEvent::PublishFailed {
                    sender,
                    topic,
                    error: error.clone(),
                });
                FrameOutcome::PublishFailed { topic, error }
            }
        }
    }

    fn received_event(sender: MacAddress, length: usize, message: &Message) -> FrameEvent {
        FrameEvent::Received {
            sender,
            length,
            text: message.text().into_owned(),
            text_len: message.content_bytes().len(),
            category: message.category,
            category_name: message.category_name(),
            page: message.page,
        }
    }

    fn emit(&self, event: FrameEvent) {
        if !self.diagnostics_enabled {
            return;
        }
        self.sink.record(&DiagnosticRecord {
            timestamp: self.clock.now(),
            event,
        });
    }
}

impl std::fmt::Debug for IngressDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressDispatcher")
            .field("router", &self.router)
            .field("clock", &self.clock)
            .field("diagnostics_enabled", &self.diagnostics_enabled)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfigBuilder;
    use crate::envelope::{Category, ENVELOPE_SIZE};
    use crate::test_utils::{envelope_bytes, RecordingBroker, RecordingSink};

    const SENDER: MacAddress = MacAddress::new([0x24, 0x0A, 0xC4, 0x11, 0x22, 0x33]);

    fn dispatcher(broker: &RecordingBroker, sink: &RecordingSink) -> IngressDispatcher {
        IngressDispatcher::new(
            TopicRouter::new(broker.clone().into_client()),
            sink.clone().into_sink(),
        )
    }

    #[test]
    fn test_sensor_reading_published() {
        let broker = RecordingBroker::new();
        let sink = RecordingSink::new();
        let dispatcher = dispatcher(&broker, &sink);

        let raw = envelope_bytes("23.5", Category::SensorInfo, 0);
        let outcome = dispatcher.on_frame_received(SENDER, &raw, raw.len());

        assert_eq!(outcome, FrameOutcome::Published { topic: "domoticz/in" });
        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "domoticz/in");
        assert_eq!(published[0].payload, b"23.5");
    }

    #[test]
    fn test_received_record_contents() {
        let broker = RecordingBroker::new();
        let sink = RecordingSink::new();
        let dispatcher = dispatcher(&broker, &sink);

        let raw = envelope_bytes("restart", Category::Command, 1);
        dispatcher.on_frame_received(SENDER, &raw, raw.len());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            FrameEvent::Received {
                sender: SENDER,
                length: ENVELOPE_SIZE,
                text: "restart".to_string(),
                text_len: 7,
                category: 3,
                category_name: "COMMAND",
                page: 1,
            }
        );
        assert_eq!(events[1].kind(), "published");
    }

    #[test]
    fn test_short_frame_rejected() {
        let broker = RecordingBroker::new();
        let sink = RecordingSink::new();
        let dispatcher = dispatcher(&broker, &sink);

        let outcome = dispatcher.on_frame_received(SENDER, &[1, 2, 3, 4], 4);

        assert!(matches!(
            outcome,
            FrameOutcome::Rejected(DecodeError::TooShort { len: 4, .. })
        ));
        assert_eq!(broker.attempts(), 0);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].kind(), "rejected");
    }

    #[test]
    fn test_unmapped_category_not_published() {
        let broker = RecordingBroker::new();
        let sink = RecordingSink::new();
        let dispatcher = dispatcher(&broker, &sink);

        let raw = envelope_bytes("oops", 9u32, 0);
        let outcome = dispatcher.on_frame_received(SENDER, &raw, raw.len());

        assert_eq!(
            outcome,
            FrameOutcome::Unrouted(RouteError::UnmappedCategory(9))
        );
        assert_eq!(broker.attempts(), 0);

        // Received record is still emitted with the raw tag
        let events = sink.events();
        assert!(matches!(
            &events[0],
            FrameEvent::Received { category: 9, category_name: "UNKNOWN", .. }
        ));
        assert_eq!(events[1].kind(), "unrouted");
    }

    #[test]
    fn test_publish_failure_is_recorded() {
        let broker = RecordingBroker::new();
        broker.fail_with(PublishError::TransportFailure("buffer full".to_string()));
        let sink = RecordingSink::new();
        let dispatcher = dispatcher(&broker, &sink);

        let raw = envelope_bytes("boot ok", Category::Log, 0);
        let outcome = dispatcher.on_frame_received(SENDER, &raw, raw.len());

        assert!(matches!(
            outcome,
            FrameOutcome::PublishFailed { topic: "domoticz/in/log", .. }
        ));
        assert_eq!(broker.attempts(), 1);
        assert_eq!(sink.events()[1].kind(), "publish_failed");
        assert_eq!(dispatcher.stats().publish_failures, 1);
    }

    #[test]
    fn test_same_frame_twice_publishes_twice() {
        let broker = RecordingBroker::new();
        let sink = RecordingSink::new();
        let dispatcher = dispatcher(&broker, &sink);

        let raw = envelope_bytes("23.5", Category::SensorInfo, 0);
        dispatcher.on_frame_received(SENDER, &raw, raw.len());
        dispatcher.on_frame_received(SENDER, &raw, raw.len());

        let published = broker.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0], published[1]);
    }

    #[test]
    fn test_stats() {
        let broker = RecordingBroker::new();
        let sink = RecordingSink::new();
        let dispatcher = dispatcher(&broker, &sink);

        let good = envelope_bytes("1", Category::SensorInfo, 0);
        let unmapped = envelope_bytes("2", 0u32, 0);
        dispatcher.on_frame_received(SENDER, &good, good.len());
        dispatcher.on_frame_received(SENDER, &unmapped, unmapped.len());
        dispatcher.on_frame_received(SENDER, &[0; 10], 10);

        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                frames_received: 3,
                decode_failures: 1,
                unrouted: 1,
                publish_failures: 0,
                published: 1,
            }
        );
    }

    #[test]
    fn test_from_config_retain_and_disabled_diagnostics() {
        let broker = RecordingBroker::new();
        let sink = RecordingSink::new();
        let config = GatewayConfigBuilder::new()
            .retain(true)
            .diagnostics(false)
            .build();
        let dispatcher = IngressDispatcher::from_config(
            &config,
            broker.clone().into_client(),
            sink.clone().into_sink(),
        );

        let raw = envelope_bytes("x", Category::Log, 0);
        dispatcher.on_frame_received(SENDER, &raw, raw.len());

        assert!(broker.published()[0].retain);
        assert!(sink.is_empty());
    }
}
