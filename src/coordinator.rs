use crate::prelude::*;

use crate::deye::fields::{DataPayload, IdentityPayload, Value};
use crate::deye::logger::ChannelData;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How often retained Home Assistant discovery messages are refreshed for
/// a logger that keeps sending data.
const AUTODISCOVERY_REPUBLISH: Duration = Duration::from_secs(4 * 60 * 60);

// PacketStats {{{
#[derive(Clone, Debug, Default)]
pub struct PacketStats {
    pub packets_received: u64,
    pub handshake_packets_received: u64,
    pub data_packets_received: u64,
    pub heartbeat_packets_received: u64,
    pub unknown_packets_received: u64,
    pub framing_errors: u64,
    pub checksum_failures: u64,
    pub replies_sent: u64,
    pub mqtt_messages_sent: u64,
    pub mqtt_errors: u64,
}

impl PacketStats {
    pub fn print_summary(&self) {
        info!("Packet Statistics:");
        info!("  Total packets received: {}", self.packets_received);
        info!("    Handshake packets: {}", self.handshake_packets_received);
        info!("    Data packets: {}", self.data_packets_received);
        info!("    Heartbeat packets: {}", self.heartbeat_packets_received);
        info!("    Unknown-type packets: {}", self.unknown_packets_received);
        info!("  Framing errors: {}", self.framing_errors);
        info!("  Checksum failures: {}", self.checksum_failures);
        info!("  Time responses sent: {}", self.replies_sent);
        info!("  MQTT:");
        info!("    Messages sent: {}", self.mqtt_messages_sent);
        info!("    Errors: {}", self.mqtt_errors);
    }
}
// }}}

/// Translates decoded logger events into MQTT messages. This is the only
/// place that knows about topic shapes; the codec side only knows field
/// names.
#[derive(Clone)]
pub struct Coordinator {
    config: ConfigWrapper,
    channels: Channels,
    pub shared_stats: Arc<Mutex<PacketStats>>,
}

impl Coordinator {
    pub fn new(config: ConfigWrapper, channels: Channels) -> Self {
        Self {
            config,
            channels,
            shared_stats: Arc::new(Mutex::new(PacketStats::default())),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut receiver = self.channels.from_logger.subscribe();

        // per-logger timestamp of the last discovery publish; this is the
        // only state that survives across packets
        let mut autoconf: HashMap<u32, Instant> = HashMap::new();

        loop {
            match receiver.recv().await {
                Ok(ChannelData::Shutdown) => break,
                Ok(ChannelData::Connected(serial)) => info!("logger {} connected", serial),
                Ok(ChannelData::Disconnect(serial)) => info!("logger {} disconnected", serial),
                Ok(ChannelData::Heartbeat { header }) => {
                    debug!("logger {}: heartbeat", header.logger_serial)
                }
                Ok(ChannelData::Identity { header, identity }) => {
                    self.publish_identity(header.logger_serial, &identity)?
                }
                Ok(ChannelData::Readings { header, readings }) => {
                    self.publish_readings(header.logger_serial, &readings, &mut autoconf)?
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("coordinator lagging, dropped {} events", n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("coordinator exiting");
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.from_logger.send(ChannelData::Shutdown);
    }

    fn send(&self, message: mqtt::Message) -> Result<()> {
        if self
            .channels
            .to_mqtt
            .send(mqtt::ChannelData::Message(message))
            .is_err()
        {
            bail!("send(to_mqtt) failed - channel closed?");
        }
        Ok(())
    }

    fn publish_identity(&self, serial: u32, identity: &IdentityPayload) -> Result<()> {
        info!(
            "logger {}: fw {}, ip {}, hw {}, ssid {}",
            serial, identity.fw_version, identity.ip_addr, identity.hw_version, identity.ssid
        );

        if !self.config.mqtt().enabled() {
            return Ok(());
        }

        let namespace = self.config.mqtt().namespace().to_owned();
        for (name, value) in identity.pairs() {
            self.send(mqtt::Message {
                topic: format!("{}/{}/logger/{}", namespace, serial, name),
                retain: true,
                payload: value.to_string(),
            })?;
        }

        Ok(())
    }

    fn publish_readings(
        &self,
        serial: u32,
        readings: &DataPayload,
        autoconf: &mut HashMap<u32, Instant>,
    ) -> Result<()> {
        if !self.config.mqtt().enabled() {
            return Ok(());
        }

        self.ensure_autodiscovery(serial, autoconf)?;

        // only frame type 1 carries live telemetry; other types decode
        // fine but their values are not current readings
        match readings.get("frame_type") {
            Some(Value::Int(1)) => {}
            other => {
                info!(
                    "logger {}: frame_type {:?} readings, not publishing",
                    serial, other
                );
                return Ok(());
            }
        }

        let namespace = self.config.mqtt().namespace().to_owned();
        for (name, value) in readings.iter() {
            self.send(mqtt::Message {
                topic: format!("{}/{}/{}", namespace, serial, name),
                // energy counters are retained so dashboards survive restarts
                retain: name.ends_with("_kWh"),
                payload: value.to_string(),
            })?;
        }

        self.send(mqtt::Message {
            topic: format!("{}/{}/attributes", namespace, serial),
            retain: false,
            payload: serde_json::to_string(readings)?,
        })?;

        Ok(())
    }

    fn ensure_autodiscovery(
        &self,
        serial: u32,
        autoconf: &mut HashMap<u32, Instant>,
    ) -> Result<()> {
        if !self.config.homeassistant_enabled() {
            return Ok(());
        }

        if let Some(last) = autoconf.get(&serial) {
            if last.elapsed() < AUTODISCOVERY_REPUBLISH {
                return Ok(());
            }
        }

        info!("logger {}: publishing Home Assistant discovery", serial);
        for message in home_assistant::Discovery::new(serial, self.config.mqtt()).all()? {
            self.send(message)?;
        }

        autoconf.insert(serial, Instant::now());
        Ok(())
    }
}
