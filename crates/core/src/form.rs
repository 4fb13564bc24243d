//! Validated form input.
//!
//! The configuration page posts a flat JSON object whose values are mostly
//! strings. [`FormInput::from_json`] turns it into a typed structure with
//! explicit optionality before anything is emitted.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Per-channel settings collected from `channel_<i>[<prop>]` fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelInput {
    pub name: Option<String>,
    pub precision: Option<String>,
    pub psk: Option<String>,
    pub uplink_enabled: Option<String>,
    pub downlink_enabled: Option<String>,
}

impl ChannelInput {
    fn set(&mut self, prop: &str, value: String) {
        match prop {
            "name" => self.name = Some(value),
            "precision" => self.precision = Some(value),
            "psk" => self.psk = Some(value),
            "uplink_enabled" => self.uplink_enabled = Some(value),
            "downlink_enabled" => self.downlink_enabled = Some(value),
            _ => {}
        }
    }

    fn is_empty(&self) -> bool {
        self == &ChannelInput::default()
    }
}

/// Typed view of the configuration form.
///
/// Scalar fields keep the distinction between "absent" (`None`) and "present
/// but empty" (`Some("")`) because some settings are emitted on presence and
/// others only when non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormInput {
    pub channels_to_write: u32,

    pub device_name: Option<String>,
    pub owner_short_name: Option<String>,
    pub owner_long_name: Option<String>,
    pub tz_string: Option<String>,
    pub bluetooth_fixed_pin: Option<String>,

    /// Channel settings by index. Indexes at or beyond `channels_to_write`
    /// are kept here but never emitted.
    pub channels: BTreeMap<u32, ChannelInput>,

    pub lora_enabled: bool,
    pub lora_region: Option<String>,
    pub lora_modem_preset: Option<String>,
    pub lora_channel_num: Option<String>,
    pub lora_ignore_mqtt: Option<String>,

    pub gps_enabled: bool,
    pub gps_mode: Option<String>,
    pub gps_update_interval: Option<String>,
    pub position_broadcast_interval: Option<String>,
    pub fixed_position: bool,
    pub fixed_lat: Option<String>,
    pub fixed_lon: Option<String>,
    pub fixed_alt: Option<String>,
    pub smart_position_enabled: Option<String>,

    pub admin_keys: [Option<String>; 3],

    pub network_enabled: bool,
    pub network_protocols: Option<String>,
    pub wifi_enabled: bool,
    pub wifi_ssid: Option<String>,
    pub wifi_psk: Option<String>,
    pub mqtt_enabled: bool,
    pub mqtt_address: Option<String>,
    pub mqtt_root_topic: Option<String>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_encryption_enabled: Option<String>,
    pub mqtt_tls_enabled: Option<String>,

    pub oem_text: Option<String>,
    pub oem_font_size: Option<String>,
    pub oem_image_width: Option<String>,
    pub oem_image_height: Option<String>,
    pub oem_image_data: Option<String>,
}

impl Default for FormInput {
    fn default() -> Self {
        Self {
            channels_to_write: 1,
            device_name: None,
            owner_short_name: None,
            owner_long_name: None,
            tz_string: None,
            bluetooth_fixed_pin: None,
            channels: BTreeMap::new(),
            lora_enabled: false,
            lora_region: None,
            lora_modem_preset: None,
            lora_channel_num: None,
            lora_ignore_mqtt: None,
            gps_enabled: false,
            gps_mode: None,
            gps_update_interval: None,
            position_broadcast_interval: None,
            fixed_position: false,
            fixed_lat: None,
            fixed_lon: None,
            fixed_alt: None,
            smart_position_enabled: None,
            admin_keys: [None, None, None],
            network_enabled: false,
            network_protocols: None,
            wifi_enabled: false,
            wifi_ssid: None,
            wifi_psk: None,
            mqtt_enabled: false,
            mqtt_address: None,
            mqtt_root_topic: None,
            mqtt_username: None,
            mqtt_password: None,
            mqtt_encryption_enabled: None,
            mqtt_tls_enabled: None,
            oem_text: None,
            oem_font_size: None,
            oem_image_width: None,
            oem_image_height: None,
            oem_image_data: None,
        }
    }
}

/// Flat string view over the raw JSON object.
struct Fields(BTreeMap<String, String>);

impl Fields {
    fn take(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    fn flag(&mut self, key: &str) -> bool {
        self.take(key).is_some_and(|v| v == "true")
    }
}

fn scalar_text(key: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Array(_) | Value::Object(_) => Err(Error::InvalidForm(format!(
            "field {key:?} must be a string, boolean or number"
        ))),
    }
}

/// Split `channel_<i>[<prop>]` into its index and property name.
fn channel_field(key: &str) -> Option<(u32, &str)> {
    let rest = key.strip_prefix("channel_")?;
    let (index, rest) = rest.split_once('[')?;
    let prop = rest.strip_suffix(']')?;
    // Plain decimal only: no sign, no leading zeros.
    let canonical = !index.is_empty()
        && index.bytes().all(|b| b.is_ascii_digit())
        && (index == "0" || !index.starts_with('0'));
    if !canonical {
        return None;
    }
    Some((index.parse().ok()?, prop))
}

/// Parse the channel count field. Must be a non-negative integer.
pub fn parse_channel_count(raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| Error::InvalidChannelCount(raw.to_string()))
}

impl FormInput {
    /// Build a `FormInput` from the JSON object posted by the form.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidForm("expected a JSON object".to_string()))?;
        Self::from_map(object)
    }

    fn from_map(object: &Map<String, Value>) -> Result<Self> {
        let mut raw = BTreeMap::new();
        let mut channels: BTreeMap<u32, ChannelInput> = BTreeMap::new();

        for (key, value) in object {
            let Some(text) = scalar_text(key, value)? else {
                continue;
            };
            if let Some((index, prop)) = channel_field(key) {
                channels.entry(index).or_default().set(prop, text);
            } else {
                raw.insert(key.clone(), text);
            }
        }
        channels.retain(|_, c| !c.is_empty());

        let mut f = Fields(raw);
        let channels_to_write = match f.take("channels_to_write") {
            Some(count) => parse_channel_count(&count)?,
            None => 1,
        };

        Ok(Self {
            channels_to_write,
            device_name: f.take("device_name"),
            owner_short_name: f.take("owner_short_name"),
            owner_long_name: f.take("owner_long_name"),
            tz_string: f.take("tz_string"),
            bluetooth_fixed_pin: f.take("bluetooth_fixed_pin"),
            channels,
            lora_enabled: f.flag("lora_enabled"),
            lora_region: f.take("lora_region"),
            lora_modem_preset: f.take("lora_modem_preset"),
            lora_channel_num: f.take("lora_channel_num"),
            lora_ignore_mqtt: f.take("lora_ignore_mqtt"),
            gps_enabled: f.flag("gps_enabled"),
            gps_mode: f.take("gps_mode"),
            gps_update_interval: f.take("gps_update_interval"),
            position_broadcast_interval: f.take("position_broadcast_interval"),
            fixed_position: f.flag("fixed_position"),
            fixed_lat: f.take("fixed_lat"),
            fixed_lon: f.take("fixed_lon"),
            fixed_alt: f.take("fixed_alt"),
            smart_position_enabled: f.take("smart_position_enabled"),
            admin_keys: [
                f.take("admin_key_0"),
                f.take("admin_key_1"),
                f.take("admin_key_2"),
            ],
            network_enabled: f.flag("network_enabled"),
            network_protocols: f.take("network_protocols"),
            wifi_enabled: f.flag("wifi_enabled"),
            wifi_ssid: f.take("wifi_ssid"),
            wifi_psk: f.take("wifi_psk"),
            mqtt_enabled: f.flag("mqtt_enabled"),
            mqtt_address: f.take("mqtt_address"),
            mqtt_root_topic: f.take("mqtt_root_topic"),
            mqtt_username: f.take("mqtt_username"),
            mqtt_password: f.take("mqtt_password"),
            mqtt_encryption_enabled: f.take("mqtt_encryption_enabled"),
            mqtt_tls_enabled: f.take("mqtt_tls_enabled"),
            oem_text: f.take("oem_text"),
            oem_font_size: f.take("oem_font_size"),
            oem_image_width: f.take("oem_image_width"),
            oem_image_height: f.take("oem_image_height"),
            oem_image_data: f.take("oem_image_data"),
        })
    }
}
