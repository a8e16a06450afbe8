//! Radio link collaborator interface
//!
//! The gateway does not drive the ESP-NOW radio itself. A [`RadioLink`]
//! hands over one [`Frame`] at a time, each carrying the sender's hardware
//! address and the raw envelope bytes.
//!
//! - [`udp::UdpLink`] - frames forwarded as UDP datagrams (requires `udp` feature)

#[cfg(feature = "udp")]
mod udp;

#[cfg(feature = "udp")]
pub use udp::UdpLink;

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;

/// Length of an ESP-NOW hardware address
pub const MAC_LEN: usize = 6;

/// 6-byte sender hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress([u8; MAC_LEN]);

impl MacAddress {
    /// Broadcast address
    pub const BROADCAST: MacAddress = MacAddress([0xFF; MAC_LEN]);

    /// Wrap raw address bytes
    pub const fn new(bytes: [u8; MAC_LEN]) -> Self {
        Self(bytes)
    }

    /// Read an address from the start of a slice
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let head: [u8; MAC_LEN] = bytes.get(..MAC_LEN)?.try_into().ok()?;
        Some(Self(head))
    }

    /// Raw address bytes
    pub fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }
}

impl From<[u8; MAC_LEN]> for MacAddress {
    fn from(bytes: [u8; MAC_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GatewayError::InvalidConfig(format!("invalid MAC address: {s}"));

        let mut bytes = [0u8; MAC_LEN];
        let mut parts = s.split([':', '-']);
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

/// One inbound delivery from the radio link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sender hardware address
    pub sender: MacAddress,
    /// Raw envelope bytes as received
    pub data: Bytes,
}

impl Frame {
    /// Create a frame
    pub fn new(sender: MacAddress, data: impl Into<Bytes>) -> Self {
        Self {
            sender,
            data: data.into(),
        }
    }

    /// Length reported by the link
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame carries no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Source of inbound ESP-NOW frames
///
/// Each physical frame must be delivered at most once.
#[async_trait]
pub trait RadioLink: Send + Sync {
    /// Start receiving
    async fn connect(&mut self) -> Result<()>;

    /// Stop receiving
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if currently receiving
    fn is_connected(&self) -> bool;

    /// Read the next frame
    ///
    /// Returns `None` if no frame is available yet.
    /// Returns `Err(GatewayError::LinkClosed)` once the link will never
    /// deliver again.
    async fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Get the link name (for logging)
    fn name(&self) -> &str;
}

/// Connection state for links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not receiving
    Disconnected,
    /// Receiving frames
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}
