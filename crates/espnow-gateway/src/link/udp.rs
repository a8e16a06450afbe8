//! UDP link for forwarded ESP-NOW frames
//!
//! An ESP-NOW receiver board (or a sniffer on the same channel) forwards
//! every frame it hears as one UDP datagram:
//!
//! - Bytes 0-5: sender MAC address
//! - Bytes 6+: envelope bytes exactly as received over the air
//!
//! # Requirements
//!
//! Enable the `udp` feature in Cargo.toml to use this link.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::{ConnectionState, Frame, MacAddress, RadioLink, MAC_LEN};
use crate::error::{GatewayError, Result};

/// Largest ESP-NOW v2 payload
const MAX_ESPNOW_PAYLOAD: usize = 1470;

/// Largest datagram accepted: MAC prefix plus a v2 payload
const MAX_DATAGRAM_LEN: usize = MAC_LEN + MAX_ESPNOW_PAYLOAD;

// One spare byte so an oversized datagram is detected instead of silently cut
const RECV_BUFFER_SIZE: usize = MAX_DATAGRAM_LEN + 1;

/// Receives forwarded frames on a UDP socket
pub struct UdpLink {
    bind: SocketAddr,
    socket: Option<UdpSocket>,
    state: ConnectionState,
    buffer: Vec<u8>,
    name: String,
}

impl UdpLink {
    /// Create a link that will bind `bind` on connect
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            socket: None,
            state: ConnectionState::Disconnected,
            buffer: vec![0u8; RECV_BUFFER_SIZE],
            name: format!("udp:{bind}"),
        }
    }

    /// Address the socket is bound to, once connected
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Split a datagram into sender address and envelope bytes
    fn parse_datagram(datagram: &[u8]) -> Option<Frame> {
        let sender = MacAddress::from_slice(datagram)?;
        Some(Frame::new(
            sender,
            Bytes::copy_from_slice(&datagram[MAC_LEN..]),
        ))
    }
}

#[async_trait]
impl RadioLink for UdpLink {
    async fn connect(&mut self) -> Result<()> {
        let socket = UdpSocket::bind(self.bind).await?;
        info!(addr = %socket.local_addr()?, "UDP link listening");
        self.socket = Some(socket);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.socket = None;
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let socket = self.socket.as_ref().ok_or(GatewayError::LinkClosed)?;

        let (len, peer) = socket
            .recv_from(&mut self.buffer)
            .await
            .map_err(|e| GatewayError::LinkRead(e.to_string()))?;

        if len > MAX_DATAGRAM_LEN {
            warn!(
                peer = %peer,
                max = MAX_DATAGRAM_LEN,
                "Datagram exceeds the largest ESP-NOW frame, ignoring"
            );
            return Ok(None);
        }

        match Self::parse_datagram(&self.buffer[..len]) {
            Some(frame) => {
                debug!(peer = %peer, sender = %frame.sender, bytes = frame.len(), "Datagram received");
                Ok(Some(frame))
            }
            None => {
                warn!(peer = %peer, bytes = len, "Datagram shorter than a MAC address, ignoring");
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datagram() {
        let mut datagram = vec![0x24, 0x0A, 0xC4, 0x01, 0x02, 0x03];
        datagram.extend_from_slice(&[9, 8, 7, 6]);

        let frame = UdpLink::parse_datagram(&datagram).unwrap();
        assert_eq!(frame.sender.to_string(), "24:0A:C4:01:02:03");
        assert_eq!(frame.data.as_ref(), &[9u8, 8, 7, 6][..]);
    }

    #[test]
    fn test_parse_short_datagram() {
        assert!(UdpLink::parse_datagram(&[1, 2, 3]).is_none());
    }

    #[tokio::test]
    async fn test_read_before_connect() {
        let mut link = UdpLink::new("127.0.0.1:0".parse().unwrap());
        assert!(!link.is_connected());
        assert!(matches!(
            link.read_frame().await,
            Err(GatewayError::LinkClosed)
        ));
    }

    #[tokio::test]
    async fn test_receive_datagram() {
        let mut link = UdpLink::new("127.0.0.1:0".parse().unwrap());
        link.connect().await.unwrap();
        let addr = link.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut datagram = vec![1, 2, 3, 4, 5, 6];
        datagram.extend_from_slice(b"payload");
        sender.send_to(&datagram, addr).await.unwrap();

        let frame = link.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.sender, MacAddress::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(frame.data.as_ref(), b"payload");

        link.disconnect().await.unwrap();
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_large_and_oversized_datagrams() {
        let mut link = UdpLink::new("127.0.0.1:0".parse().unwrap());
        link.connect().await.unwrap();
        let addr = link.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut largest = vec![1, 2, 3, 4, 5, 6];
        largest.resize(MAX_DATAGRAM_LEN, 0xAB);
        sender.send_to(&largest, addr).await.unwrap();

        let frame = link.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.len(), MAX_ESPNOW_PAYLOAD);

        let oversized = vec![0x11; MAX_DATAGRAM_LEN + 10];
        sender.send_to(&oversized, addr).await.unwrap();
        assert!(link.read_frame().await.unwrap().is_none());

        let mut next = vec![1, 2, 3, 4, 5, 6];
        next.extend_from_slice(b"after");
        sender.send_to(&next, addr).await.unwrap();
        let frame = link.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.data.as_ref(), b"after");
    }
}
