use crate::prelude::*;

use serde::Serialize;

use crate::deye::fields::FIELD_TABLE;

/// Sensors are announced with `expire_after` so a logger that goes dark
/// shows up as unavailable instead of frozen at its last reading.
const EXPIRE_AFTER_SECS: u32 = 300;

// SensorMeta {{{
struct SensorMeta {
    unit: &'static str,
    device_class: Option<&'static str>,
    state_class: &'static str,
    expire_after: Option<u32>,
}

/// Consumer side of the field-naming contract: everything Home Assistant
/// needs to know about a field is inferred from its unit suffix. Fields
/// without a recognized suffix (state words, counters, text, `unkn_*`)
/// get no discovery entry.
fn sensor_meta(name: &str) -> Option<SensorMeta> {
    let meta = if name.ends_with("_V") {
        SensorMeta {
            unit: "V",
            device_class: Some("voltage"),
            state_class: "measurement",
            expire_after: Some(EXPIRE_AFTER_SECS),
        }
    } else if name.ends_with("_A") {
        SensorMeta {
            unit: "A",
            device_class: Some("current"),
            state_class: "measurement",
            expire_after: Some(EXPIRE_AFTER_SECS),
        }
    } else if name.ends_with("_W") {
        SensorMeta {
            unit: "W",
            device_class: Some("power"),
            state_class: "measurement",
            expire_after: Some(EXPIRE_AFTER_SECS),
        }
    } else if name.ends_with("_kWh") {
        SensorMeta {
            unit: "kWh",
            device_class: Some("energy"),
            state_class: "total_increasing",
            expire_after: None,
        }
    } else if name.ends_with("_Hz") {
        SensorMeta {
            unit: "Hz",
            device_class: Some("frequency"),
            state_class: "measurement",
            expire_after: Some(EXPIRE_AFTER_SECS),
        }
    } else if name.ends_with("_C") {
        SensorMeta {
            unit: "°C",
            device_class: Some("temperature"),
            state_class: "measurement",
            expire_after: Some(EXPIRE_AFTER_SECS),
        }
    } else if name.ends_with("_pct") {
        SensorMeta {
            unit: "%",
            device_class: None,
            state_class: "measurement",
            expire_after: Some(EXPIRE_AFTER_SECS),
        }
    } else {
        return None;
    };

    Some(meta)
}
// }}}

#[derive(Serialize)]
struct Device {
    manufacturer: &'static str,
    model: &'static str,
    name: String,
    identifiers: Vec<String>,
}

#[derive(Serialize)]
struct Sensor<'a> {
    state_topic: String,
    name: String,
    unit_of_measurement: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'static str>,
    state_class: &'static str,
    object_id: String,
    unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expire_after: Option<u32>,
    device: &'a Device,
}

/// Builds the retained Home Assistant MQTT discovery messages for one
/// logger. Republished periodically by the coordinator so a restarted
/// broker or Home Assistant picks the sensors back up.
pub struct Discovery {
    serial: u32,
    mqtt: config::Mqtt,
}

impl Discovery {
    pub fn new(serial: u32, mqtt: config::Mqtt) -> Self {
        Self { serial, mqtt }
    }

    pub fn all(&self) -> Result<Vec<mqtt::Message>> {
        let device = Device {
            manufacturer: "Deye",
            model: "Hybrid3Phase",
            name: format!("Deye Hybrid Inverter {}", self.serial),
            identifiers: vec![format!("deye_bridge_{}", self.serial)],
        };

        let mut messages = Vec::new();
        for def in &FIELD_TABLE {
            if let Some(meta) = sensor_meta(def.name) {
                messages.push(self.sensor_config(def.name, &meta, &device)?);
            }
        }

        Ok(messages)
    }

    fn sensor_config(
        &self,
        field: &'static str,
        meta: &SensorMeta,
        device: &Device,
    ) -> Result<mqtt::Message> {
        let node = format!("deye_bridge_{}", self.serial);
        let object = format!("{}_{}", node, field);

        let sensor = Sensor {
            state_topic: format!("{}/{}/{}", self.mqtt.namespace(), self.serial, field),
            name: display_name(field),
            unit_of_measurement: meta.unit,
            device_class: meta.device_class,
            state_class: meta.state_class,
            object_id: object.clone(),
            unique_id: object.clone(),
            expire_after: meta.expire_after,
            device,
        };

        Ok(mqtt::Message {
            topic: format!(
                "{}/sensor/{}/{}/config",
                self.mqtt.homeassistant().prefix(),
                node,
                object
            ),
            retain: true,
            payload: serde_json::to_string(&sensor)?,
        })
    }
}

/// "pv1_volt_V" -> "pv1 volt", for the human-facing entity name.
fn display_name(field: &str) -> String {
    let stem = field
        .rsplit_once('_')
        .map(|(stem, _)| stem)
        .unwrap_or(field);
    stem.replace('_', " ")
}
