use crate::prelude::*;

use crate::coordinator::PacketStats;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use std::sync::{Arc, Mutex};

const PUBLISH_ATTEMPTS: u32 = 3;

// Message {{{
/// A fully-formed MQTT message. Topics are absolute; the coordinator bakes
/// the configured namespace (or the Home Assistant discovery prefix) in
/// when it builds them.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}
// }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Message(Message),
    Shutdown,
}

pub type Sender = broadcast::Sender<ChannelData>;

#[derive(Clone)]
pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
    shared_stats: Arc<Mutex<PacketStats>>,
}

impl Mqtt {
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
        let c = self.config.mqtt();

        if !c.enabled() {
            info!("mqtt disabled, skipping");
            return Ok(());
        }

        let mut options = MqttOptions::new("deye-bridge", c.host(), c.port());

        let will = LastWill {
            topic: self.lwt_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(std::time::Duration::from_secs(60));
        if let (Some(u), Some(p)) = (c.username(), c.password()) {
            options.set_credentials(u, p);
        }

        info!("initializing mqtt at {}:{}", c.host(), c.port());

        let (client, eventloop) = AsyncClient::new(options, 10);

        futures::try_join!(
            self.setup(client.clone()),
            self.receiver(eventloop),
            self.sender(client)
        )?;

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping MQTT client...");
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
        Ok(())
    }

    async fn setup(&self, client: AsyncClient) -> Result<()> {
        client
            .publish(self.lwt_topic(), QoS::AtLeastOnce, true, "online")
            .await?;

        Ok(())
    }

    // we publish only; the eventloop still has to be polled for the
    // connection to make progress
    async fn receiver(&self, mut eventloop: EventLoop) -> Result<()> {
        let mut to_mqtt_rx = self.channels.to_mqtt.subscribe();

        loop {
            tokio::select! {
                msg = to_mqtt_rx.recv() => {
                    match msg {
                        Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => {
                            info!("MQTT receiver shutting down");
                            break;
                        }
                        _ => {} // messages are the sender's problem
                    }
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            // nothing subscribes, so nothing should arrive
                            debug!("ignoring unexpected publish on {}", publish.topic);
                        }
                        Err(e) => {
                            error!("{}", e);
                            info!("reconnecting in 5s");
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        }
                        _ => {} // connacks, pingresps etc
                    }
                }
            }
        }

        info!("MQTT receiver loop exiting");
        Ok(())
    }

    // coordinator -> mqtt
    async fn sender(&self, client: AsyncClient) -> Result<()> {
        use ChannelData::*;

        let mut receiver = self.channels.to_mqtt.subscribe();

        loop {
            match receiver.recv().await? {
                Shutdown => {
                    info!("MQTT sender received shutdown signal");
                    let _ = client.disconnect().await;
                    break;
                }
                Message(message) => {
                    debug!("publishing: {} = {}", message.topic, message.payload);

                    let mut attempt = 1;
                    loop {
                        match client
                            .publish(
                                &message.topic,
                                QoS::AtLeastOnce,
                                message.retain,
                                message.payload.as_bytes(),
                            )
                            .await
                        {
                            Ok(_) => {
                                if let Ok(mut stats) = self.shared_stats.lock() {
                                    stats.mqtt_messages_sent += 1;
                                }
                                break;
                            }
                            Err(err) => {
                                if let Ok(mut stats) = self.shared_stats.lock() {
                                    stats.mqtt_errors += 1;
                                }
                                if attempt >= PUBLISH_ATTEMPTS {
                                    error!(
                                        "MQTT publish to {} failed after {} attempts: {:?}",
                                        message.topic, attempt, err
                                    );
                                    break;
                                }
                                error!(
                                    "MQTT publish failed: {:?} - retrying in 10s (attempt {}/{})",
                                    err, attempt, PUBLISH_ATTEMPTS
                                );
                                tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                                attempt += 1;
                            }
                        }
                    }
                }
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }

    fn lwt_topic(&self) -> String {
        format!("{}/LWT", self.config.mqtt().namespace())
    }
}
