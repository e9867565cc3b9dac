use crate::prelude::*;

use serde::Deserialize;
use serde_with::serde_as;
use std::sync::{Arc, Mutex};

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_listener")]
    pub listener: Listener,

    pub mqtt: Mqtt,

    #[serde(default)]
    pub time_response: TimeResponse,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Drop frames whose stored checksum doesn't match. Off by default:
    /// some logger firmwares ship frames with stale checksums that decode
    /// fine otherwise.
    #[serde(default)]
    pub reject_bad_checksum: bool,
}

// Listener {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Listener {
    #[serde(default = "Config::default_listener_host")]
    pub host: String,

    #[serde(default = "Config::default_listener_port")]
    pub port: u16,
}

impl Listener {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
} // }}}

// HomeAssistant {{{
#[derive(Clone, Debug, Deserialize)]
pub struct HomeAssistant {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde(default = "Config::default_mqtt_homeassistant_prefix")]
    pub prefix: String,
}

impl HomeAssistant {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    #[serde(default = "Config::default_mqtt_homeassistant")]
    pub homeassistant: HomeAssistant,
}

impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn homeassistant(&self) -> &HomeAssistant {
        &self.homeassistant
    }
} // }}}

// TimeResponse {{{
/// Policy for the two time-response fields that differ between captured
/// firmware revisions.
#[derive(Clone, Debug, Deserialize)]
pub struct TimeResponse {
    /// Trailing 4-byte word; seen as 0 on most units and 1 on some.
    #[serde(default)]
    pub tail_word: u32,

    /// Hours added to the UTC timestamp for loggers that expect local time.
    #[serde(default)]
    pub utc_offset_hours: i32,
}

impl Default for TimeResponse {
    fn default() -> Self {
        Self {
            tail_word: 0,
            utc_offset_hours: 0,
        }
    }
}

impl TimeResponse {
    pub fn options(&self) -> deye::packet::TimeResponseOptions {
        deye::packet::TimeResponseOptions {
            tail_word: self.tail_word,
            utc_offset_secs: self.utc_offset_hours as i64 * 3600,
        }
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    pub fn listener(&self) -> Listener {
        self.config.lock().unwrap().listener.clone()
    }

    pub fn mqtt(&self) -> Mqtt {
        self.config.lock().unwrap().mqtt.clone()
    }

    pub fn time_response(&self) -> TimeResponse {
        self.config.lock().unwrap().time_response.clone()
    }

    pub fn loglevel(&self) -> String {
        self.config.lock().unwrap().loglevel.clone()
    }

    pub fn reject_bad_checksum(&self) -> bool {
        self.config.lock().unwrap().reject_bad_checksum
    }

    pub fn homeassistant_enabled(&self) -> bool {
        let mqtt = self.mqtt();
        mqtt.enabled() && mqtt.homeassistant().enabled()
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        let config: Self = serde_yaml::from_str(&content)?;

        info!(
            "  Listener: {}:{}",
            config.listener.host(),
            config.listener.port()
        );
        info!(
            "  MQTT: {} ({}:{}, namespace {})",
            if config.mqtt.enabled() {
                "enabled"
            } else {
                "disabled"
            },
            config.mqtt.host(),
            config.mqtt.port(),
            config.mqtt.namespace()
        );

        Ok(config)
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_listener() -> Listener {
        Listener {
            host: Self::default_listener_host(),
            port: Self::default_listener_port(),
        }
    }

    fn default_listener_host() -> String {
        "0.0.0.0".to_string()
    }

    // the port Deye/Solarman loggers dial out to
    fn default_listener_port() -> u16 {
        10000
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_namespace() -> String {
        "deye".to_string()
    }

    fn default_mqtt_homeassistant() -> HomeAssistant {
        HomeAssistant {
            enabled: true,
            prefix: Self::default_mqtt_homeassistant_prefix(),
        }
    }

    fn default_mqtt_homeassistant_prefix() -> String {
        "homeassistant".to_string()
    }
}
