use crate::prelude::*;

use crate::coordinator::PacketStats;
use crate::deye::fields::{self, DataPayload, IdentityPayload};
use crate::deye::frame_codec::FrameDecoder;
use crate::deye::packet::{self, FrameHeader, MessageType};

use {
    futures::StreamExt,
    net2::TcpStreamExt,
    std::convert::TryFrom,
    std::sync::{Arc, Mutex},
    std::time::Duration,
    tokio::io::AsyncWriteExt,
    tokio::net::{TcpListener, TcpStream},
    tokio_util::codec::FramedRead,
};

const TCP_KEEPALIVE_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelData {
    Connected(u32),
    Disconnect(u32),
    Identity {
        header: FrameHeader,
        identity: IdentityPayload,
    },
    Readings {
        header: FrameHeader,
        readings: DataPayload,
    },
    Heartbeat {
        header: FrameHeader,
    },
    Shutdown,
}
pub type Sender = broadcast::Sender<ChannelData>;

/// Accepts logger TCP connections and runs one task per logger: frame the
/// byte stream, decode, answer with a time response, and forward decoded
/// payloads to the coordinator. The codec itself never touches a socket.
#[derive(Clone)]
pub struct Listener {
    config: ConfigWrapper,
    channels: Channels,
    shared_stats: Arc<Mutex<PacketStats>>,
}

impl Listener {
    pub fn new(
        config: ConfigWrapper,
        channels: Channels,
        shared_stats: Arc<Mutex<PacketStats>>,
    ) -> Self {
        Self {
            config,
            channels,
            shared_stats,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let listener_config = self.config.listener();
        let listener =
            TcpListener::bind((listener_config.host().to_owned(), listener_config.port())).await?;
        info!(
            "listening for loggers on {}:{}",
            listener_config.host(),
            listener_config.port()
        );

        let mut shutdown_rx = self.channels.to_logger.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!("logger connection from {}", peer);
                            let this = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = this.serve(stream).await {
                                    warn!("logger connection from {} closed: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => error!("accept failed: {}", e),
                    }
                }
                msg = shutdown_rx.recv() => {
                    if matches!(msg, Ok(ChannelData::Shutdown) | Err(_)) {
                        info!("listener received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("listener exiting");
        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping listener...");
        let _ = self.channels.to_logger.send(ChannelData::Shutdown);
    }

    async fn serve(&self, stream: TcpStream) -> Result<()> {
        let std_stream = stream.into_std()?;
        if let Err(e) = std_stream.set_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS))) {
            warn!("failed to set TCP keepalive: {}", e);
        }
        let stream = TcpStream::from_std(std_stream)?;

        let (reader, mut writer) = stream.into_split();
        let mut framed = FramedRead::new(reader, FrameDecoder::new());
        let mut shutdown_rx = self.channels.to_logger.subscribe();

        // learned from the first decodable frame
        let mut serial: Option<u32> = None;

        let result = loop {
            tokio::select! {
                msg = shutdown_rx.recv() => {
                    if matches!(msg, Ok(ChannelData::Shutdown) | Err(_)) {
                        break Ok(());
                    }
                }
                frame = framed.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if let Some(reply) = self.handle_frame(&frame, &mut serial) {
                                writer.write_all(&reply).await?;
                                writer.flush().await?;
                            }
                        }
                        Some(Err(e)) => break Err(e),
                        None => break Ok(()), // peer closed
                    }
                }
            }
        };

        if let Some(serial) = serial {
            let _ = self
                .channels
                .from_logger
                .send(ChannelData::Disconnect(serial));
        }

        result
    }

    /// One complete frame in, optionally one time-response frame out.
    /// Decode failures are logged and counted but never kill the
    /// connection; the logger just doesn't get a reply for that frame.
    fn handle_frame(&self, frame: &[u8], serial: &mut Option<u32>) -> Option<Vec<u8>> {
        let computed = packet::checksum(frame);
        let footer = match packet::parse_footer(frame) {
            Ok(f) => f,
            Err(e) => {
                warn!("dropping frame: {}", e);
                self.bump(|s| s.framing_errors += 1);
                return None;
            }
        };

        if footer.checksum != computed {
            self.bump(|s| s.checksum_failures += 1);
            if self.config.reject_bad_checksum() {
                warn!(
                    "dropping frame with checksum mismatch (stored 0x{:02x}, computed 0x{:02x})",
                    footer.checksum, computed
                );
                return None;
            }
            warn!(
                "frame checksum mismatch (stored 0x{:02x}, computed 0x{:02x}), accepting anyway",
                footer.checksum, computed
            );
        }

        let packet = match packet::parse_packet(frame) {
            Ok(p) => p,
            Err(e) => {
                warn!("dropping undecodable frame: {}", e);
                self.bump(|s| s.framing_errors += 1);
                return None;
            }
        };

        let header = packet.header;
        if serial.is_none() {
            *serial = Some(header.logger_serial);
            let _ = self
                .channels
                .from_logger
                .send(ChannelData::Connected(header.logger_serial));
        }
        self.bump(|s| s.packets_received += 1);

        match MessageType::try_from(header.message_type) {
            Ok(MessageType::Handshake) => {
                self.bump(|s| s.handshake_packets_received += 1);
                match fields::parse_logger_packet_payload(&packet) {
                    Ok(identity) => {
                        let _ = self
                            .channels
                            .from_logger
                            .send(ChannelData::Identity { header, identity });
                    }
                    Err(e) => warn!(
                        "logger {}: undecodable handshake payload: {}",
                        header.logger_serial, e
                    ),
                }
            }
            Ok(MessageType::Data) => {
                self.bump(|s| s.data_packets_received += 1);
                match fields::parse_data_packet_payload(&packet) {
                    Ok(readings) => {
                        let _ = self
                            .channels
                            .from_logger
                            .send(ChannelData::Readings { header, readings });
                    }
                    Err(e) => warn!(
                        "logger {}: undecodable data payload: {}",
                        header.logger_serial, e
                    ),
                }
            }
            Ok(MessageType::Heartbeat) => {
                self.bump(|s| s.heartbeat_packets_received += 1);
                let _ = self
                    .channels
                    .from_logger
                    .send(ChannelData::Heartbeat { header });
            }
            Err(_) => {
                // unclassified types are decoded this far but get no reply;
                // we don't know their response code
                self.bump(|s| s.unknown_packets_received += 1);
                return None;
            }
        }

        let opts = self.config.time_response().options();
        match packet::build_time_response(&packet, chrono::Utc::now(), &opts) {
            Ok(reply) => {
                self.bump(|s| s.replies_sent += 1);
                Some(reply)
            }
            Err(e) => {
                // unreachable for the three types matched above
                warn!("logger {}: {}", header.logger_serial, e);
                None
            }
        }
    }

    fn bump(&self, update: impl FnOnce(&mut PacketStats)) {
        if let Ok(mut stats) = self.shared_stats.lock() {
            update(&mut stats);
        }
    }
}
