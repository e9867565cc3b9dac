pub mod channels;       // Inter-component broadcast channels
pub mod config;         // YAML configuration
pub mod coordinator;    // Decoded events -> MQTT messages
pub mod deye;           // Logger wire protocol: codec, framer, listener
pub mod home_assistant; // MQTT discovery messages
pub mod mqtt;           // MQTT client
pub mod options;        // Command line options
pub mod prelude;        // Common imports
pub mod utils;          // Small helpers

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;

use crate::coordinator::Coordinator;
use crate::deye::logger::Listener;
use crate::mqtt::Mqtt;
use std::error::Error;

#[derive(Clone)]
pub struct Components {
    pub coordinator: Coordinator,
    pub listener: Listener,
    pub mqtt: Mqtt,
    pub channels: Channels,
}

impl Components {
    /// Stop order matters: the coordinator first so no new MQTT messages
    /// are produced, then the publisher, then the listener.
    pub async fn stop(&mut self) {
        info!("Stopping all components...");
        self.coordinator.stop();
        let _ = self.mqtt.stop().await;
        self.listener.stop().await;
        info!("Shutdown complete");
    }
}

pub async fn app(
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let options = Options::new();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .init();

    let config = ConfigWrapper::new(options.config_file).unwrap_or_else(|err| {
        error!("Failed to load config: {:?}", err);
        std::process::exit(255);
    });

    // logger is already running with the default level; switching to the
    // configured one only works if nothing initialized it before us
    if let Err(e) = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.loglevel()),
    )
    .format(|buf, record| {
        writeln!(
            buf,
            "[{} {} {}] {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.level(),
            record.module_path().unwrap_or(""),
            record.args()
        )
    })
    .write_style(env_logger::WriteStyle::Never)
    .try_init()
    {
        debug!("keeping default log level: {}", e);
    }

    info!("deye-bridge {} starting", CARGO_PKG_VERSION);

    let channels = Channels::new();

    let coordinator = Coordinator::new(config.clone(), channels.clone());
    let listener = Listener::new(
        config.clone(),
        channels.clone(),
        coordinator.shared_stats.clone(),
    );
    let mqtt = Mqtt::new(
        config.clone(),
        channels.clone(),
        coordinator.shared_stats.clone(),
    );

    let coordinator_clone = coordinator.clone();
    let coordinator_handle = tokio::spawn(async move {
        if let Err(e) = coordinator_clone.start().await {
            error!("Coordinator task failed: {}", e);
        }
    });

    let listener_clone = listener.clone();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener_clone.start().await {
            error!("Listener task failed: {}", e);
        }
    });

    let mqtt_clone = mqtt.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt_clone.start().await {
            error!("MQTT task failed: {}", e);
        }
    });

    info!("Waiting for shutdown signal...");
    let _ = shutdown_rx.recv().await;

    info!("Shutdown signal received, stopping components...");
    let mut components = Components {
        coordinator: coordinator.clone(),
        listener,
        mqtt,
        channels,
    };
    components.stop().await;

    for (name, handle) in [
        ("coordinator", coordinator_handle),
        ("listener", listener_handle),
        ("mqtt", mqtt_handle),
    ] {
        if let Err(e) = handle.await {
            error!("Error waiting for {} task: {}", name, e);
        }
    }

    if let Ok(stats) = coordinator.shared_stats.lock() {
        stats.print_summary();
    }

    info!("Application shutdown complete");
    Ok(())
}
