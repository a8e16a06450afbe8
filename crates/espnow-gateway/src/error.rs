//! Error types for gateway operations
//!
//! Per-frame failures have their own small enums ([`DecodeError`],
//! [`RouteError`], [`PublishError`]) so the dispatcher can record them and
//! move on. [`GatewayError`] covers everything that can stop the service
//! loop or reject a configuration.

use thiserror::Error;

/// Failure to turn a raw buffer into a [`Message`](crate::envelope::Message)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer is smaller than the fixed envelope size
    #[error("Frame too short: {len} bytes, envelope requires {required}")]
    TooShort {
        /// Bytes actually available
        len: usize,
        /// Fixed envelope size
        required: usize,
    },

    /// Text does not fit the content field with its terminator
    #[error("Content too long: {len} bytes exceeds maximum of {max}")]
    ContentTooLong {
        /// Text length in bytes
        len: usize,
        /// Maximum text length (bound minus terminator)
        max: usize,
    },
}

/// Failure to resolve a category tag to a topic
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// The category tag has no entry in the topic map
    #[error("No topic mapped for category {0}")]
    UnmappedCategory(u32),
}

/// Failure reported by the broker collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The broker client rejected or failed to queue the publication
    #[error("Broker transport failure: {0}")]
    TransportFailure(String),

    /// The broker client has no connection
    #[error("Broker disconnected")]
    Disconnected,
}

/// Main error type for gateway service and configuration
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Envelope decode failure
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Topic resolution failure
    #[error(transparent)]
    Route(#[from] RouteError),

    /// Broker publish failure
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Radio link read error
    #[error("Radio link read error: {0}")]
    LinkRead(String),

    /// Radio link closed and will not deliver more frames
    #[error("Radio link closed")]
    LinkClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Command channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Check if the service loop can keep reading after this error
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            GatewayError::LinkRead(_)
                | GatewayError::Decode(_)
                | GatewayError::Route(_)
                | GatewayError::Publish(_)
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Decode(DecodeError::TooShort { .. }) => "FRAME_TOO_SHORT",
            GatewayError::Decode(DecodeError::ContentTooLong { .. }) => "CONTENT_TOO_LONG",
            GatewayError::Route(RouteError::UnmappedCategory(_)) => "UNMAPPED_CATEGORY",
            GatewayError::Publish(PublishError::TransportFailure(_)) => "PUBLISH_FAILED",
            GatewayError::Publish(PublishError::Disconnected) => "BROKER_DISCONNECTED",
            GatewayError::LinkRead(_) => "LINK_READ_ERROR",
            GatewayError::LinkClosed => "LINK_CLOSED",
            GatewayError::InvalidConfig(_) => "INVALID_CONFIG",
            GatewayError::ChannelClosed => "CHANNEL_CLOSED",
            GatewayError::ConfigParse(_) => "CONFIG_PARSE",
            GatewayError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

// Conversion from tokio mpsc send error
impl<T> From<tokio::sync::mpsc::error::SendError<T>> for GatewayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        GatewayError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err: GatewayError = DecodeError::TooShort {
            len: 4,
            required: 248,
        }
        .into();
        assert_eq!(err.error_code(), "FRAME_TOO_SHORT");

        let err: GatewayError = RouteError::UnmappedCategory(9).into();
        assert_eq!(err.error_code(), "UNMAPPED_CATEGORY");
    }

    #[test]
    fn test_is_retriable() {
        assert!(GatewayError::LinkRead("timeout".to_string()).is_retriable());
        assert!(GatewayError::from(PublishError::Disconnected).is_retriable());
        assert!(!GatewayError::LinkClosed.is_retriable());
        assert!(!GatewayError::InvalidConfig("x".to_string()).is_retriable());
    }

    #[test]
    fn test_too_short_message() {
        let err = DecodeError::TooShort {
            len: 4,
            required: 248,
        };
        assert!(err.to_string().contains('4'));
        assert!(err.to_string().contains("248"));
    }

    #[test]
    fn test_transparent_display() {
        let err = GatewayError::from(RouteError::UnmappedCategory(42));
        assert_eq!(err.to_string(), "No topic mapped for category 42");
    }
}
