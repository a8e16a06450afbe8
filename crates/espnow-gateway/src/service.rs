//! GatewayService - the receive loop around the dispatcher
//!
//! The service owns a [`RadioLink`], reads one frame at a time and hands it
//! to the [`IngressDispatcher`]. Because the next read only starts after the
//! dispatcher has returned, frames are processed strictly in delivery order.
//!
//! ```text
//! ┌──────────────┐  Frame   ┌───────────────────┐  publish  ┌──────────────┐
//! │  RadioLink   │─────────►│ IngressDispatcher │──────────►│ BrokerClient │
//! └──────────────┘          └───────────────────┘           └──────────────┘
//!        ▲                            │ record
//!        │ connect/disconnect         ▼
//! ┌──────────────┐          ┌───────────────────┐
//! │ GatewayHandle│          │  DiagnosticsSink  │
//! └──────────────┘          └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let (service, handle) = GatewayService::new(link, dispatcher, &config.service);
//! tokio::spawn(service.run());
//!
//! let stats = handle.stats().await?;
//! handle.shutdown().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::config::ServiceConfig;
use crate::dispatcher::{DispatchStats, IngressDispatcher};
use crate::error::{GatewayError, Result};
use crate::link::RadioLink;

/// Commands that can be sent to the service
#[derive(Debug)]
pub enum ServiceCommand {
    /// Get service statistics
    GetStats(oneshot::Sender<ServiceStats>),
    /// Stop the service
    Shutdown,
}

/// Service statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStats {
    /// Dispatcher counters
    pub dispatch: DispatchStats,
    /// Recoverable link read errors
    pub link_errors: u64,
}

/// Handle for controlling a running [`GatewayService`]
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    command_tx: mpsc::Sender<ServiceCommand>,
}

impl GatewayHandle {
    /// Get service statistics
    pub async fn stats(&self) -> Result<ServiceStats> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(ServiceCommand::GetStats(tx)).await?;
        rx.await.map_err(|_| GatewayError::ChannelClosed)
    }

    /// Stop the service
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx.send(ServiceCommand::Shutdown).await?;
        Ok(())
    }
}

/// Shortest stats interval; `tokio::time::interval` rejects zero
const MIN_STATS_INTERVAL: Duration = Duration::from_millis(1);

/// Receive loop connecting a radio link to the dispatcher
pub struct GatewayService<L: RadioLink> {
    link: L,
    dispatcher: Arc<IngressDispatcher>,
    command_rx: mpsc::Receiver<ServiceCommand>,
    link_errors: u64,
    idle_poll: Duration,
    stats_interval: Duration,
}

impl<L: RadioLink + 'static> GatewayService<L> {
    /// Create a service and its control handle
    pub fn new(
        link: L,
        dispatcher: Arc<IngressDispatcher>,
        config: &ServiceConfig,
    ) -> (Self, GatewayHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_size.max(1));
        let handle = GatewayHandle { command_tx };

        let service = Self {
            link,
            dispatcher,
            command_rx,
            link_errors: 0,
            idle_poll: config.idle_poll,
            stats_interval: config.stats_interval.max(MIN_STATS_INTERVAL),
        };

        (service, handle)
    }

    /// Current statistics
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            dispatch: self.dispatcher.stats(),
            link_errors: self.link_errors,
        }
    }

    /// Run until shutdown or until the link closes
    ///
    /// Per-frame failures never stop the loop; recoverable link errors are
    /// counted and reading continues. Returns the final statistics.
    pub async fn run(mut self) -> Result<ServiceStats> {
        info!(link = self.link.name(), "Starting ESP-NOW gateway service");

        self.link.connect().await?;
        info!(link = self.link.name(), "Radio link connected");

        let mut stats_tick = tokio::time::interval(self.stats_interval);
        stats_tick.tick().await;

        let result = loop {
            tokio::select! {
                biased;

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ServiceCommand::GetStats(tx) => {
                            let _ = tx.send(self.stats());
                        }
                        ServiceCommand::Shutdown => {
                            info!("Gateway shutdown requested");
                            break Ok(());
                        }
                    }
                }

                read = self.link.read_frame() => {
                    match read {
                        Ok(Some(frame)) => {
                            let outcome = self.dispatcher.handle_frame(&frame);
                            trace!(sender = %frame.sender, ?outcome, "Frame processed");
                        }
                        Ok(None) => {
                            tokio::time::sleep(self.idle_poll).await;
                        }
                        Err(GatewayError::LinkClosed) => {
                            info!(link = self.link.name(), "Radio link closed");
                            break Ok(());
                        }
                        Err(e) if e.is_retriable() => {
                            warn!(code = e.error_code(), "Error reading from radio link: {}", e);
                            self.link_errors += 1;
                        }
                        Err(e) => {
                            error!(code = e.error_code(), "Radio link failed: {}", e);
                            break Err(e);
                        }
                    }
                }

                _ = stats_tick.tick() => {
                    let stats = self.stats();
                    debug!(
                        received = stats.dispatch.frames_received,
                        published = stats.dispatch.published,
                        dropped = stats.dispatch.decode_failures
                            + stats.dispatch.unrouted
                            + stats.dispatch.publish_failures,
                        link_errors = stats.link_errors,
                        "Gateway stats"
                    );
                }
            }
        };

        if let Err(e) = self.link.disconnect().await {
            warn!("Error disconnecting radio link: {}", e);
        }

        info!("ESP-NOW gateway service stopped");
        result.map(|()| self.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Category;
    use crate::link::MacAddress;
    use crate::router::TopicRouter;
    use crate::test_utils::{envelope_frame, MockLink, RecordingBroker, RecordingSink};

    const SENDER: MacAddress = MacAddress::new([0xAA, 0xBB, 0xCC, 0x00, 0x00, 0x01]);

    fn dispatcher(broker: &RecordingBroker) -> Arc<IngressDispatcher> {
        Arc::new(IngressDispatcher::new(
            TopicRouter::new(broker.clone().into_client()),
            RecordingSink::new().into_sink(),
        ))
    }

    fn fast_config() -> ServiceConfig {
        ServiceConfig {
            idle_poll: Duration::from_millis(1),
            ..ServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_processes_frames_in_order_until_closed() {
        let broker = RecordingBroker::new();
        let link = MockLink::with_frames([
            envelope_frame(SENDER, "first", Category::SensorInfo, 0),
            envelope_frame(SENDER, "second", Category::Log, 0),
            envelope_frame(SENDER, "third", Category::Command, 0),
        ]);

        let (service, _handle) = GatewayService::new(link, dispatcher(&broker), &fast_config());
        let stats = service.run().await.unwrap();

        let payloads: Vec<String> = broker.published().iter().map(|p| p.payload_str()).collect();
        assert_eq!(payloads, vec!["first", "second", "third"]);
        assert_eq!(stats.dispatch.published, 3);
    }

    #[tokio::test]
    async fn test_read_error_does_not_stop_loop() {
        let broker = RecordingBroker::new();
        let link = MockLink::with_frames([envelope_frame(SENDER, "after", Category::Log, 0)]);
        link.handle().fail_on_read(1);

        let (service, _handle) = GatewayService::new(link, dispatcher(&broker), &fast_config());
        let stats = service.run().await.unwrap();

        assert_eq!(stats.link_errors, 1);
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_stats_interval_is_clamped() {
        let broker = RecordingBroker::new();
        let link = MockLink::with_frames([envelope_frame(SENDER, "23.5", Category::SensorInfo, 0)]);
        let config = ServiceConfig {
            stats_interval: Duration::ZERO,
            ..fast_config()
        };

        let (service, _handle) = GatewayService::new(link, dispatcher(&broker), &config);
        assert_eq!(service.stats_interval, MIN_STATS_INTERVAL);

        let stats = service.run().await.unwrap();
        assert_eq!(stats.dispatch.published, 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let broker = RecordingBroker::new();
        let link = MockLink::new().refuse_connect();

        let (service, _handle) = GatewayService::new(link, dispatcher(&broker), &fast_config());
        assert!(service.run().await.is_err());
    }

    #[tokio::test]
    async fn test_handle_stats_and_shutdown() {
        let broker = RecordingBroker::new();
        let link = MockLink::new();
        let feed = link.handle();

        let (service, handle) = GatewayService::new(link, dispatcher(&broker), &fast_config());
        let task = tokio::spawn(service.run());

        feed.push(envelope_frame(SENDER, "23.5", Category::SensorInfo, 0));
        while feed.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.dispatch.frames_received, 1);

        handle.shutdown().await.unwrap();
        let final_stats = task.await.unwrap().unwrap();
        assert_eq!(final_stats.dispatch.published, 1);
    }
}
