//! ESP-NOW to MQTT Gateway Core
//!
//! This crate turns ESP-NOW frames sent by battery-powered sensor nodes into
//! MQTT publications on the Domoticz topic tree. It covers the part of the
//! gateway that decides *what* gets published *where*; the radio driver, the
//! MQTT client and the clock are collaborators behind traits.
//!
//! # Architecture
//!
//! 1. **Envelope Codec** ([`envelope`]) - fixed 248-byte struct → [`Message`]
//! 2. **Topic Router** ([`router`]) - category → topic, publish via [`BrokerClient`]
//! 3. **Ingress Dispatcher** ([`dispatcher`]) - per-frame callback, diagnostics
//! 4. **Service** ([`service`]) - receive loop over a [`RadioLink`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use espnow_gateway::{
//!     GatewayConfigBuilder, GatewayService, IngressDispatcher, TracingSink, UdpLink,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfigBuilder::new()
//!         .udp_bind("0.0.0.0:4210".parse()?)
//!         .build();
//!
//!     let broker = Arc::new(|topic: &str, payload: &[u8], _retain: bool| {
//!         println!("{} {}", topic, String::from_utf8_lossy(payload));
//!         Ok(())
//!     });
//!     let dispatcher = Arc::new(IngressDispatcher::from_config(
//!         &config,
//!         broker,
//!         Arc::new(TracingSink),
//!     ));
//!
//!     let link = UdpLink::new("0.0.0.0:4210".parse()?);
//!     let (service, _handle) = GatewayService::new(link, dispatcher, &config.service);
//!     service.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `udp` (default) - [`UdpLink`] for frames forwarded as UDP datagrams
//!
//! # Topics
//!
//! | Category | Tag | Topic |
//! |----------|-----|-------|
//! | SensorInfo | 1 | `domoticz/in` |
//! | Log | 2 | `domoticz/in/log` |
//! | Command | 3 | `domoticz/in/cmd` |
//!
//! The envelope has no version field or checksum, so a sender compiled with a
//! different struct layout is indistinguishable from a valid one as long as
//! the frame is at least 248 bytes long.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod broker;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod link;
pub mod router;
pub mod service;
pub mod test_utils;

pub use broker::BrokerClient;
pub use config::{
    BrokerConfig, DiagnosticsConfig, GatewayConfig, GatewayConfigBuilder, LinkConfig,
    ServiceConfig,
};
pub use diagnostics::{DiagnosticClock, DiagnosticRecord, DiagnosticsSink, FrameEvent, TracingSink};
pub use dispatcher::{DispatchStats, FrameOutcome, IngressDispatcher};
pub use envelope::{decode, encode, Category, Message};
pub use error::{DecodeError, GatewayError, PublishError, Result, RouteError};
pub use link::{ConnectionState, Frame, MacAddress, RadioLink};
pub use router::{TopicMap, TopicRouter};
pub use service::{GatewayHandle, GatewayService, ServiceStats};

#[cfg(feature = "udp")]
pub use link::UdpLink;

// Wire and topic constants
pub use config::{LAST_WILL_PAYLOAD, LAST_WILL_TOPIC, MAX_CONTENT_LEN};
pub use envelope::ENVELOPE_SIZE;
pub use router::{TOPIC_COMMAND, TOPIC_LOG, TOPIC_SENSOR_INFO};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
