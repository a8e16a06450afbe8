//! Broker client that writes publications as `topic payload` lines
//!
//! Stands in for an MQTT client: the same packet size limit applies, so a
//! publication that would not fit the client buffer is refused. Payload
//! bytes are written unmodified; a payload containing a newline would break
//! the one-publication-per-line framing and is refused too.

use parking_lot::Mutex;
use std::io::Write;

use espnow_gateway::{BrokerClient, BrokerConfig, PublishError};

/// Fixed MQTT PUBLISH overhead: header, remaining length and topic length
const PUBLISH_OVERHEAD: usize = 7;

pub struct StdoutBroker<W: Write + Send> {
    out: Mutex<W>,
    max_packet_size: usize,
    client_id: String,
}

impl StdoutBroker<std::io::Stdout> {
    pub fn stdout(config: &BrokerConfig) -> Self {
        Self::new(std::io::stdout(), config)
    }
}

impl<W: Write + Send> StdoutBroker<W> {
    pub fn new(out: W, config: &BrokerConfig) -> Self {
        Self {
            out: Mutex::new(out),
            max_packet_size: config.max_packet_size,
            client_id: config.client_id.clone(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> BrokerClient for StdoutBroker<W> {
    fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), PublishError> {
        let size = PUBLISH_OVERHEAD + topic.len() + payload.len();
        if size > self.max_packet_size {
            return Err(PublishError::TransportFailure(format!(
                "packet of {} bytes exceeds buffer of {}",
                size, self.max_packet_size
            )));
        }

        if payload.contains(&b'\n') {
            return Err(PublishError::TransportFailure(
                "payload contains a newline".to_string(),
            ));
        }

        let mut out = self.out.lock();
        let marker: &[u8] = if retain { b" [retained]" } else { b"" };
        let line: [&[u8]; 5] = [topic.as_bytes(), b" ", payload, marker, b"\n"];
        line.iter()
            .try_for_each(|part| out.write_all(part))
            .and_then(|()| out.flush())
            .map_err(|e| PublishError::TransportFailure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_topic_and_payload() {
        let broker = StdoutBroker::new(Vec::new(), &BrokerConfig::default());
        broker.publish("domoticz/in", b"23.5", false).unwrap();
        broker.publish("domoticz/in/cmd", b"restart", true).unwrap();

        let out = String::from_utf8(broker.into_inner()).unwrap();
        assert_eq!(out, "domoticz/in 23.5\ndomoticz/in/cmd restart [retained]\n");
    }

    #[test]
    fn test_payload_bytes_written_verbatim() {
        let broker = StdoutBroker::new(Vec::new(), &BrokerConfig::default());
        broker.publish("domoticz/in", &[0xB0, 0x43, 0xFF], false).unwrap();

        assert_eq!(broker.into_inner(), b"domoticz/in \xB0\x43\xFF\n".to_vec());
    }

    #[test]
    fn test_newline_in_payload_refused() {
        let broker = StdoutBroker::new(Vec::new(), &BrokerConfig::default());

        assert!(matches!(
            broker.publish("domoticz/in/log", b"line one\nline two", false),
            Err(PublishError::TransportFailure(_))
        ));
        assert!(broker.into_inner().is_empty());
    }

    #[test]
    fn test_oversized_packet_refused() {
        let config = BrokerConfig {
            max_packet_size: 240,
            ..BrokerConfig::default()
        };
        let broker = StdoutBroker::new(Vec::new(), &config);
        let payload = vec![b'x'; 239];

        assert!(matches!(
            broker.publish("domoticz/in", &payload, false),
            Err(PublishError::TransportFailure(_))
        ));
        assert!(broker.into_inner().is_empty());
    }

    #[test]
    fn test_client_id_from_config() {
        let broker = StdoutBroker::new(Vec::new(), &BrokerConfig::default());
        assert_eq!(broker.client_id(), "ESPNOW-MQTT-GATEWAY");
    }
}
