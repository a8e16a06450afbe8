//! Test utilities for exercising the gateway without hardware
//!
//! - [`MockLink`] - in-process [`RadioLink`] fed through a [`MockLinkHandle`]
//! - [`RecordingBroker`] - captures publications, optionally failing them
//! - [`RecordingSink`] - captures diagnostic records
//! - [`envelope_bytes`] / [`envelope_frame`] - build wire-exact envelopes
//!
//! # Example
//!
//! ```rust,ignore
//! use espnow_gateway::test_utils::{envelope_frame, MockLink, RecordingBroker};
//!
//! let link = MockLink::new();
//! link.handle().push(envelope_frame(sender, "23.5", Category::SensorInfo, 0));
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::broker::BrokerClient;
use crate::diagnostics::{DiagnosticRecord, DiagnosticsSink, FrameEvent};
use crate::envelope::{encode, Message};
use crate::error::{GatewayError, PublishError, Result};
use crate::link::{ConnectionState, Frame, MacAddress, RadioLink};

/// Build the wire bytes of one envelope
///
/// Panics if `text` does not fit the content field.
pub fn envelope_bytes(text: &str, category: impl Into<u32>, page: i32) -> Vec<u8> {
    let message = Message::new(text, category, page).expect("text fits the content field");
    encode(&message).to_vec()
}

/// Build a frame carrying one envelope
pub fn envelope_frame(
    sender: MacAddress,
    text: &str,
    category: impl Into<u32>,
    page: i32,
) -> Frame {
    Frame::new(sender, envelope_bytes(text, category, page))
}

// ============================================================================
// Broker
// ============================================================================

/// A publication captured by [`RecordingBroker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Topic published to
    pub topic: String,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// Retain flag
    pub retain: bool,
}

impl Publication {
    /// Payload as text
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    published: Vec<Publication>,
    failure: Option<PublishError>,
    attempts: usize,
}

/// Broker client that records every publication
#[derive(Debug, Clone, Default)]
pub struct RecordingBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl RecordingBroker {
    /// Create an empty recorder that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent publication with `error`
    pub fn fail_with(&self, error: PublishError) {
        self.state.lock().failure = Some(error);
    }

    /// Accept publications again
    pub fn recover(&self) {
        self.state.lock().failure = None;
    }

    /// Successful publications, in call order
    pub fn published(&self) -> Vec<Publication> {
        self.state.lock().published.clone()
    }

    /// Publish calls made, successful or not
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Share as a broker client
    pub fn into_client(self) -> Arc<dyn BrokerClient> {
        Arc::new(self)
    }
}

impl BrokerClient for RecordingBroker {
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> std::result::Result<(), PublishError> {
        let mut state = self.state.lock();
        state.attempts += 1;
        if let Some(error) = &state.failure {
            return Err(error.clone());
        }
        state.published.push(Publication {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            retain,
        });
        Ok(())
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Diagnostics sink that keeps every record
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<DiagnosticRecord>>>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, in emission order
    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().clone()
    }

    /// All events, in emission order
    pub fn events(&self) -> Vec<FrameEvent> {
        self.records.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Share as a diagnostics sink
    pub fn into_sink(self) -> Arc<dyn DiagnosticsSink> {
        Arc::new(self)
    }
}

impl DiagnosticsSink for RecordingSink {
    fn record(&self, record: &DiagnosticRecord) {
        self.records.lock().push(record.clone());
    }
}

// ============================================================================
// Radio link
// ============================================================================

#[derive(Debug, Default)]
struct LinkQueue {
    frames: Mutex<VecDeque<Frame>>,
    closed: AtomicBool,
    reads: AtomicUsize,
    fail_on_read: Mutex<Option<usize>>,
}

/// Feeds frames into a [`MockLink`] owned by a running service
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    queue: Arc<LinkQueue>,
}

impl MockLinkHandle {
    /// Queue a frame for delivery
    pub fn push(&self, frame: Frame) {
        self.queue.frames.lock().push_back(frame);
    }

    /// Report the link closed once the queue drains
    pub fn close(&self) {
        self.queue.closed.store(true, Ordering::SeqCst);
    }

    /// Frames still waiting for delivery
    pub fn pending(&self) -> usize {
        self.queue.frames.lock().len()
    }

    /// Fail the Nth read (1-based) with a read error
    pub fn fail_on_read(&self, n: usize) {
        *self.queue.fail_on_read.lock() = Some(n);
    }
}

/// In-process radio link for tests
#[derive(Debug)]
pub struct MockLink {
    queue: Arc<LinkQueue>,
    state: ConnectionState,
    refuse_connect: bool,
}

impl MockLink {
    /// Create an empty, disconnected link
    pub fn new() -> Self {
        Self {
            queue: Arc::new(LinkQueue::default()),
            state: ConnectionState::Disconnected,
            refuse_connect: false,
        }
    }

    /// Create a link that delivers `frames` then reports closed
    pub fn with_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        let link = Self::new();
        let handle = link.handle();
        for frame in frames {
            handle.push(frame);
        }
        handle.close();
        link
    }

    /// Handle for feeding frames
    pub fn handle(&self) -> MockLinkHandle {
        MockLinkHandle {
            queue: self.queue.clone(),
        }
    }

    /// Make `connect` fail
    pub fn refuse_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadioLink for MockLink {
    async fn connect(&mut self) -> Result<()> {
        if self.refuse_connect {
            return Err(GatewayError::LinkRead("Simulated connect failure".to_string()));
        }
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        // Give other tasks a turn, like a real link waiting on the radio
        tokio::task::yield_now().await;

        let read = self.queue.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.queue.fail_on_read.lock() == Some(read) {
            return Err(GatewayError::LinkRead("Simulated error".to_string()));
        }

        if let Some(frame) = self.queue.frames.lock().pop_front() {
            return Ok(Some(frame));
        }
        if self.queue.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::LinkClosed);
        }
        Ok(None)
    }

    fn name(&self) -> &str {
        "MockLink"
    }
}
