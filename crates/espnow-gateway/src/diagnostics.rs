//! Per-frame diagnostic records
//!
//! Every frame produces at least one [`DiagnosticRecord`]: a timestamp in the
//! gateway's local offset plus a [`FrameEvent`] describing what happened.
//! Records are for operators; nothing in the pipeline depends on them.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::{info, warn};

use crate::config::DiagnosticsConfig;
use crate::error::{DecodeError, PublishError};
use crate::link::MacAddress;

/// What happened to a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Envelope decoded; full content dump
    Received {
        /// Sender hardware address
        sender: MacAddress,
        /// Length reported by the link
        length: usize,
        /// Content up to the first NUL
        text: String,
        /// Content length in bytes
        text_len: usize,
        /// Raw category tag
        category: u32,
        /// Category name, `UNKNOWN` for unmapped tags
        category_name: &'static str,
        /// Paging hint
        page: i32,
    },
    /// Envelope could not be decoded; frame dropped
    Rejected {
        /// Sender hardware address
        sender: MacAddress,
        /// Length reported by the link
        length: usize,
        /// Decode failure
        error: DecodeError,
    },
    /// Category has no topic; frame dropped
    Unrouted {
        /// Sender hardware address
        sender: MacAddress,
        /// Raw category tag
        category: u32,
    },
    /// Broker refused the publication; frame dropped
    PublishFailed {
        /// Sender hardware address
        sender: MacAddress,
        /// Resolved topic
        topic: &'static str,
        /// Broker failure
        error: PublishError,
    },
    /// Payload handed to the broker
    Published {
        /// Sender hardware address
        sender: MacAddress,
        /// Resolved topic
        topic: &'static str,
        /// Payload size in bytes
        bytes: usize,
    },
}

impl FrameEvent {
    /// Short label for the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            FrameEvent::Received { .. } => "received",
            FrameEvent::Rejected { .. } => "rejected",
            FrameEvent::Unrouted { .. } => "unrouted",
            FrameEvent::PublishFailed { .. } => "publish_failed",
            FrameEvent::Published { .. } => "published",
        }
    }

    /// Whether the event marks a dropped frame
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FrameEvent::Rejected { .. } | FrameEvent::Unrouted { .. } | FrameEvent::PublishFailed { .. }
        )
    }
}

/// A timestamped frame event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    /// When the record was produced, in the configured offset
    pub timestamp: DateTime<FixedOffset>,
    /// The event
    pub event: FrameEvent,
}

impl DiagnosticRecord {
    /// Wall-clock time as `HH:MM:SS`
    pub fn formatted_time(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

/// Produces record timestamps in a fixed offset from UTC
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticClock {
    offset: FixedOffset,
}

impl DiagnosticClock {
    /// Clock for an offset in seconds east of UTC
    ///
    /// Offsets chrono cannot represent fall back to UTC.
    pub fn new(utc_offset: i32) -> Self {
        Self {
            offset: FixedOffset::east_opt(utc_offset).unwrap_or_else(|| Utc.fix()),
        }
    }

    /// Clock from diagnostics configuration
    pub fn from_config(config: &DiagnosticsConfig) -> Self {
        Self::new(config.utc_offset)
    }

    /// Current time in the clock's offset
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Offset applied to timestamps
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Default for DiagnosticClock {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Destination for diagnostic records
pub trait DiagnosticsSink: Send + Sync {
    /// Accept one record; must not block
    fn record(&self, record: &DiagnosticRecord);
}

/// Writes each record as one structured `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&self, record: &DiagnosticRecord) {
        let time = record.formatted_time();
        match &record.event {
            FrameEvent::Received {
                sender,
                length,
                text,
                text_len,
                category,
                category_name,
                page,
            } => info!(
                time = %time,
                sender = %sender,
                bytes = length,
                length = text_len,
                content = %text,
                category,
                category_name,
                page,
                "ESP-NOW message received"
            ),
            FrameEvent::Rejected {
                sender,
                length,
                error,
            } => warn!(
                time = %time,
                sender = %sender,
                bytes = length,
                error = %error,
                "Dropping undecodable frame"
            ),
            FrameEvent::Unrouted { sender, category } => warn!(
                time = %time,
                sender = %sender,
                category,
                "Dropping frame with unmapped category"
            ),
            FrameEvent::PublishFailed {
                sender,
                topic,
                error,
            } => warn!(
                time = %time,
                sender = %sender,
                topic,
                error = %error,
                "Failed to publish frame"
            ),
            FrameEvent::Published {
                sender,
                topic,
                bytes,
            } => info!(
                time = %time,
                sender = %sender,
                topic,
                bytes,
                "Published frame"
            ),
        }
    }
}
