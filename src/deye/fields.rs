use crate::prelude::*;

use chrono::TimeZone;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

use super::error::DecodeError;
use super::packet::{self, Packet};

/// Register table base: a 41-byte fixed prefix followed by the 28-byte
/// free-text window.
pub const DATA_FIELD_BASE: usize = 69;

/// First register index after the named table; the open-ended tail of
/// unclassified values continues the numbering from here.
pub const DATA_TAIL_INDEX: u16 = 155;

/// Payload bytes needed to satisfy every named field.
pub const DATA_MIN_PAYLOAD_LEN: usize = DATA_FIELD_BASE + 2 * DATA_TAIL_INDEX as usize;

/// Identity (handshake) payloads must reach the end of the SSID window.
pub const IDENTITY_MIN_PAYLOAD_LEN: usize = 210;

// Value {{{
/// A single decoded field. Scaled registers become floats, scale-1
/// registers stay integers, ASCII windows become text. `Null` carries an
/// undecodable timestamp through to the publisher without failing the
/// whole payload.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(chrono::DateTime<chrono::Utc>),
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Timestamp(v) => {
                write!(f, "{}", v.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            }
            Value::Null => write!(f, "null"),
        }
    }
}
// }}}

// DataPayload {{{
/// Flat field-name -> value mapping in wire order. The unit-suffix naming
/// convention (`_V`, `_A`, `_W`, `_kWh`, `_Hz`, `_C`, `_pct`) is the
/// contract the MQTT/Home-Assistant side keys off; never rename fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataPayload {
    fields: Vec<(String, Value)>,
}

impl DataPayload {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }
}

impl Serialize for DataPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
// }}}

// IdentityPayload {{{
/// Firmware/network metadata carried by handshake packets. Each field is an
/// ASCII window at a fixed absolute payload offset, NUL-trimmed.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub struct IdentityPayload {
    pub fw_version: String,
    pub ip_addr: String,
    pub hw_version: String,
    pub ssid: String,
}

impl IdentityPayload {
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("fw_version", &self.fw_version),
            ("ip_addr", &self.ip_addr),
            ("hw_version", &self.hw_version),
            ("ssid", &self.ssid),
        ]
    }
}
// }}}

// field table {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    U16,
    I16,
    U32,
    I32,
    /// 6-byte wall-clock field, spans three register indices.
    Time,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub index: u16,
    pub kind: FieldKind,
    pub scale: u16,
}

const fn f(name: &'static str, index: u16, kind: FieldKind, scale: u16) -> FieldDef {
    FieldDef {
        name,
        index,
        kind,
        scale,
    }
}

use FieldKind::{I16, I32, Time, U16, U32};

/// Register map of the data payload, anchored at [`DATA_FIELD_BASE`]. Byte
/// offset of index `i` is `DATA_FIELD_BASE + 2*i`; 32-bit fields span two
/// indices, the wall-clock field three. All registers are big-endian.
///
/// The map is reverse-engineered from live captures of a single
/// three-phase hybrid model and still has gaps; `unkn_*` entries are real
/// values whose meaning we have not pinned down yet, kept so nothing on
/// the wire is silently dropped.
pub static FIELD_TABLE: [FieldDef; 146] = [
    f("running_state", 0, U16, 1),
    f("unkn_1", 1, I16, 1),
    f("unkn_2", 2, I16, 1),
    f("unkn_3", 3, I16, 1),
    f("unkn_4", 4, I16, 1),
    f("unkn_5", 5, I16, 1),
    f("unkn_6", 6, I16, 1),
    f("unkn_7", 7, I16, 1),
    f("unkn_8", 8, I16, 1),
    f("unkn_9", 9, I16, 1),
    f("unkn_10", 10, I16, 1),
    f("unkn_11", 11, I16, 1),
    f("unkn_12", 12, I16, 1),
    // battery + grid energy counters
    f("battery_charge_today_kWh", 13, I16, 10),
    f("battery_discharge_today_kWh", 14, I16, 10),
    f("battery_charge_total_kWh", 15, I32, 10),
    f("battery_discharge_total_kWh", 17, I32, 10),
    f("today_bought_from_grid_kWh", 19, I16, 10),
    f("today_sold_to_grid_kWh", 20, I16, 10),
    f("total_bought_from_grid_kWh", 21, I32, 10),
    f("total_sold_to_grid_kWh", 23, I32, 10),
    f("today_to_load_kWh", 25, I16, 10),
    f("total_to_load_kWh", 26, I32, 10),
    f("today_from_pv_kWh", 28, I16, 10),
    f("today_from_pv1_kWh", 29, I16, 10),
    f("today_from_pv2_kWh", 30, I16, 10),
    f("unkn_31", 31, I16, 1),
    f("unkn_32", 32, I16, 1),
    f("total_from_pv_kWh", 33, I32, 10),
    f("inverter_time", 35, Time, 1),
    f("unkn_38", 38, I16, 1),
    f("unkn_39", 39, I16, 1),
    f("unkn_40", 40, I16, 1),
    f("unkn_41", 41, I16, 1),
    f("unkn_42", 42, I16, 1),
    f("unkn_43", 43, I16, 1),
    f("unkn_44", 44, I16, 1),
    f("unkn_45", 45, I16, 1),
    f("unkn_46", 46, I16, 1),
    f("unkn_47", 47, I16, 1),
    f("unkn_48", 48, I16, 1),
    // grid side
    f("grid_phasea_volt_V", 49, I16, 10),
    f("grid_phaseb_volt_V", 50, I16, 10),
    f("grid_phasec_volt_V", 51, I16, 10),
    f("grid_phasea_current_A", 52, I16, 10),
    f("grid_phaseb_current_A", 53, I16, 10),
    f("grid_phasec_current_A", 54, I16, 10),
    f("grid_freq_Hz", 55, U16, 100),
    f("unkn_56", 56, I16, 1),
    f("unkn_57", 57, I16, 1),
    f("unkn_58", 58, I16, 1),
    f("grid_phasea_power_W", 59, I16, 1),
    f("grid_phaseb_power_W", 60, I16, 1),
    f("grid_phasec_power_W", 61, I16, 1),
    f("grid_total_power_W", 62, I16, 1),
    f("unkn_63", 63, I16, 1),
    f("unkn_64", 64, I16, 1),
    // external CT clamps
    f("ct_phasea_power_W", 65, I16, 1),
    f("ct_phaseb_power_W", 66, I16, 1),
    f("ct_phasec_power_W", 67, I16, 1),
    f("ct_total_power_W", 68, I16, 1),
    // inverter output
    f("inverter_phasea_volt_V", 69, I16, 10),
    f("inverter_phaseb_volt_V", 70, I16, 10),
    f("inverter_phasec_volt_V", 71, I16, 10),
    f("inverter_phasea_current_A", 72, I16, 10),
    f("inverter_phaseb_current_A", 73, I16, 10),
    f("inverter_phasec_current_A", 74, I16, 10),
    f("inverter_phasea_power_W", 75, I16, 1),
    f("inverter_phaseb_power_W", 76, I16, 1),
    f("inverter_phasec_power_W", 77, I16, 1),
    f("inverter_total_power_W", 78, I16, 1),
    f("inverter_freq_Hz", 79, U16, 100),
    // load side
    f("load_phasea_volt_V", 80, I16, 10),
    f("load_phaseb_volt_V", 81, I16, 10),
    f("load_phasec_volt_V", 82, I16, 10),
    f("load_phasea_power_W", 83, I16, 1),
    f("load_phaseb_power_W", 84, I16, 1),
    f("load_phasec_power_W", 85, I16, 1),
    f("load_total_power_W", 86, I16, 1),
    f("unkn_87", 87, I16, 1),
    f("unkn_88", 88, I16, 1),
    // temperatures + battery
    f("radiator_temp_C", 89, I16, 10),
    f("igbt_temp_C", 90, I16, 10),
    f("battery_temp_C", 91, I16, 10),
    f("battery_volt_V", 92, I16, 100),
    f("battery_soc_pct", 93, U16, 1),
    f("unkn_94", 94, I16, 1),
    f("battery_out_power_W", 95, I16, 1),
    f("battery_out_current_A", 96, I16, 100),
    f("load_freq_Hz", 97, U16, 100),
    f("unkn_98", 98, I16, 1),
    // PV strings
    f("pv1_volt_V", 99, I16, 10),
    f("pv1_current_A", 100, I16, 10),
    f("pv2_volt_V", 101, I16, 10),
    f("pv2_current_A", 102, I16, 10),
    f("unkn_103", 103, I16, 1),
    f("unkn_104", 104, I16, 1),
    f("unkn_105", 105, I16, 1),
    f("unkn_106", 106, I16, 1),
    f("unkn_107", 107, I16, 1),
    f("pv1_power_W", 108, I16, 1),
    f("pv2_power_W", 109, I16, 1),
    f("unkn_110", 110, I16, 1),
    f("unkn_111", 111, I16, 1),
    f("unkn_112", 112, I16, 1),
    f("unkn_113", 113, I16, 1),
    f("unkn_114", 114, I16, 1),
    f("unkn_115", 115, I16, 1),
    f("unkn_116", 116, I16, 1),
    f("unkn_117", 117, I16, 1),
    f("unkn_118", 118, I16, 1),
    f("unkn_119", 119, I16, 1),
    f("unkn_120", 120, I16, 1),
    // generator port
    f("gen_volt_V", 121, I16, 10),
    f("gen_power_W", 122, I16, 1),
    f("gen_today_kWh", 123, I16, 10),
    f("gen_total_kWh", 124, I32, 10),
    f("unkn_126", 126, I16, 1),
    f("unkn_127", 127, I16, 1),
    f("unkn_128", 128, I16, 1),
    f("unkn_129", 129, I16, 1),
    f("unkn_130", 130, I16, 1),
    f("unkn_131", 131, I16, 1),
    f("unkn_132", 132, I16, 1),
    f("unkn_133", 133, I16, 1),
    f("unkn_134", 134, I16, 1),
    f("unkn_135", 135, I16, 1),
    f("unkn_136", 136, I16, 1),
    f("unkn_137", 137, I16, 1),
    f("unkn_138", 138, I16, 1),
    f("unkn_139", 139, I16, 1),
    f("unkn_140", 140, I16, 1),
    f("unkn_141", 141, I16, 1),
    f("unkn_142", 142, I16, 1),
    f("unkn_143", 143, I16, 1),
    f("unkn_144", 144, I16, 1),
    f("unkn_145", 145, I16, 1),
    f("unkn_146", 146, I16, 1),
    f("unkn_147", 147, I16, 1),
    f("unkn_148", 148, I16, 1),
    f("unkn_149", 149, I16, 1),
    f("unkn_150", 150, I16, 1),
    f("unkn_151", 151, I16, 1),
    f("unkn_152", 152, I16, 1),
    f("unkn_153", 153, I16, 1),
    f("unkn_154", 154, I16, 1),
];
// }}}

fn field_bytes<const N: usize>(
    payload: &[u8],
    off: usize,
    field: &'static str,
) -> Result<[u8; N], DecodeError> {
    match payload.get(off..off + N) {
        Some(bytes) => {
            let mut out = [0u8; N];
            out.copy_from_slice(bytes);
            Ok(out)
        }
        None => Err(DecodeError::TruncatedPayload {
            field,
            needed: off + N,
            actual: payload.len(),
        }),
    }
}

fn be_u32(payload: &[u8], off: usize, field: &'static str) -> Result<u32, DecodeError> {
    Ok(u32::from_be_bytes(field_bytes(payload, off, field)?))
}

fn scaled(raw: i64, scale: u16) -> Value {
    if scale == 1 {
        Value::Int(raw)
    } else {
        Value::Float(raw as f64 / scale as f64)
    }
}

/// Decodes a data (0x42) packet payload into the flat field mapping.
///
/// Named fields are strict: a payload too short for any of them is a
/// `TruncatedPayload` error. Anything beyond the named table is decoded as
/// positionally-named signed 16-bit values, so firmwares that send longer
/// payloads than we know about degrade gracefully instead of failing.
pub fn parse_data_packet_payload(packet: &Packet) -> Result<DataPayload, DecodeError> {
    let p = packet.payload;
    let mut out = DataPayload::default();

    let frame_type = *p.first().ok_or(DecodeError::TruncatedPayload {
        field: "frame_type",
        needed: 1,
        actual: p.len(),
    })?;
    let sensor_type = *p.get(1).ok_or(DecodeError::TruncatedPayload {
        field: "sensor_type",
        needed: 2,
        actual: p.len(),
    })?;
    out.push("frame_type", Value::Int(frame_type as i64));
    out.push("sensor_type", Value::Int(sensor_type as i64));

    let total_working_time = be_u32(p, 3, "total_working_time")?;
    let power_on_time = be_u32(p, 7, "power_on_time")?;
    let offset_time = be_u32(p, 11, "offset_time")?;
    out.push("total_working_time", Value::Int(total_working_time as i64));
    out.push("power_on_time", Value::Int(power_on_time as i64));
    out.push("offset_time", Value::Int(offset_time as i64));

    // logger uptime plus boot offset is the logger's idea of "now"
    let epoch = total_working_time as i64 + offset_time as i64;
    out.push(
        "timestamp",
        match chrono::Utc.timestamp_opt(epoch, 0).single() {
            Some(ts) => Value::Timestamp(ts),
            None => Value::Null,
        },
    );

    let serial: [u8; 10] = field_bytes(p, 25, "inverter_serial")?;
    out.push("inverter_serial", Value::Text(Utils::truncate_to_null(&serial)));
    let info: [u8; 28] = field_bytes(p, 41, "module_info")?;
    out.push("module_info", Value::Text(Utils::truncate_to_null(&info)));

    for def in &FIELD_TABLE {
        let off = DATA_FIELD_BASE + 2 * def.index as usize;
        let value = match def.kind {
            FieldKind::U16 => {
                scaled(u16::from_be_bytes(field_bytes(p, off, def.name)?) as i64, def.scale)
            }
            FieldKind::I16 => {
                scaled(i16::from_be_bytes(field_bytes(p, off, def.name)?) as i64, def.scale)
            }
            FieldKind::U32 => {
                scaled(u32::from_be_bytes(field_bytes(p, off, def.name)?) as i64, def.scale)
            }
            FieldKind::I32 => {
                scaled(i32::from_be_bytes(field_bytes(p, off, def.name)?) as i64, def.scale)
            }
            FieldKind::Time => {
                let raw: [u8; 6] = field_bytes(p, off, def.name)?;
                match packet::parse_time(&raw) {
                    Some(ts) => Value::Timestamp(ts),
                    None => Value::Null,
                }
            }
        };
        out.push(def.name, value);
    }

    // unclassified tail: whatever full 16-bit words remain, numbered on
    // from the table so captures of longer firmware variants stay intact
    let mut index = DATA_TAIL_INDEX as usize;
    let mut off = DATA_FIELD_BASE + 2 * index;
    while off + 2 <= p.len() {
        let raw = i16::from_be_bytes([p[off], p[off + 1]]);
        out.push(format!("unkn_{}", index), Value::Int(raw as i64));
        index += 1;
        off += 2;
    }

    Ok(out)
}

/// Decodes a handshake (0x41) packet payload into logger identity strings.
pub fn parse_logger_packet_payload(packet: &Packet) -> Result<IdentityPayload, DecodeError> {
    let p = packet.payload;

    if p.len() < IDENTITY_MIN_PAYLOAD_LEN {
        return Err(DecodeError::TruncatedPayload {
            field: "ssid",
            needed: IDENTITY_MIN_PAYLOAD_LEN,
            actual: p.len(),
        });
    }

    Ok(IdentityPayload {
        fw_version: Utils::truncate_to_null(&p[19..60]),
        ip_addr: Utils::truncate_to_null(&p[65..82]),
        hw_version: Utils::truncate_to_null(&p[89..130]),
        ssid: Utils::truncate_to_null(&p[172..210]),
    })
}
