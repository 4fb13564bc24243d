//! `userPrefs.jsonc` emitter.
//!
//! Pure transformation from [`FormInput`] to an ordered map of
//! `USERPREFS_*` preprocessor definitions. No I/O happens here.

use crate::REGION_PREFIX;
use crate::error::{Error, Result};
use crate::form::{ChannelInput, FormInput};
use serde_json::{Map, Value};

/// Ordered key/value document written to `userPrefs.jsonc`.
///
/// Keys are only ever added; insertion order is preserved in the output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigDocument {
    entries: Map<String, Value>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), Value::String(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize with two-space indentation.
    pub fn to_jsonc(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.entries)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

fn bool_text(value: &str) -> &'static str {
    if value == "true" { "true" } else { "false" }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Add the namespace prefix unless the region already carries it.
pub fn normalize_region(region: &str) -> String {
    if region.starts_with(REGION_PREFIX) {
        region.to_string()
    } else {
        format!("{REGION_PREFIX}{region}")
    }
}

/// Normalize a channel PSK.
///
/// A value already written as a brace-delimited byte array is kept as-is
/// (trimmed). Anything else is split pairwise by character into
/// `{ 0xAA, 0xBB }`. An odd-length value keeps its last character as a lone
/// nibble, matching what the firmware form has always produced. Returns
/// `None` for blank input.
pub fn normalize_psk(psk: &str) -> Option<String> {
    let psk = psk.trim();
    if psk.is_empty() {
        return None;
    }
    if psk.starts_with('{') && psk.ends_with('}') {
        return Some(psk.to_string());
    }

    let chars: Vec<char> = psk.chars().collect();
    if chars.len() % 2 != 0 {
        tracing::warn!(
            hex_len = chars.len(),
            "PSK has an odd number of hex digits; last byte is a single nibble"
        );
    }
    let bytes: Vec<String> = chars
        .chunks(2)
        .map(|pair| format!("0x{}", pair.iter().collect::<String>()))
        .collect();
    Some(format!("{{ {} }}", bytes.join(", ")))
}

fn emit_channel(doc: &mut ConfigDocument, index: u32, channel: &ChannelInput) {
    let prefix = format!("USERPREFS_CHANNEL_{index}");
    if let Some(name) = &channel.name {
        doc.insert(format!("{prefix}_NAME"), name.as_str());
    }
    if let Some(precision) = &channel.precision {
        doc.insert(format!("{prefix}_PRECISION"), precision.as_str());
    }
    if let Some(psk) = channel.psk.as_deref().and_then(normalize_psk) {
        doc.insert(format!("{prefix}_PSK"), psk);
    }
    if let Some(up) = &channel.uplink_enabled {
        doc.insert(format!("{prefix}_UPLINK_ENABLED"), bool_text(up));
    }
    if let Some(down) = &channel.downlink_enabled {
        doc.insert(format!("{prefix}_DOWNLINK_ENABLED"), bool_text(down));
    }
}

fn emit_lora(doc: &mut ConfigDocument, form: &FormInput) {
    if !form.lora_enabled {
        return;
    }
    if let Some(region) = non_empty(&form.lora_region) {
        doc.insert("USERPREFS_CONFIG_LORA_REGION", normalize_region(region));
    }
    if let Some(preset) = &form.lora_modem_preset {
        doc.insert("USERPREFS_LORACONFIG_MODEM_PRESET", preset.as_str());
    }
    if let Some(num) = &form.lora_channel_num {
        doc.insert("USERPREFS_LORACONFIG_CHANNEL_NUM", num.as_str());
    }
    if let Some(ignore) = &form.lora_ignore_mqtt {
        doc.insert("USERPREFS_CONFIG_LORA_IGNORE_MQTT", bool_text(ignore));
    }
}

fn emit_gps(doc: &mut ConfigDocument, form: &FormInput) {
    if !form.gps_enabled {
        return;
    }
    if let Some(mode) = &form.gps_mode {
        doc.insert("USERPREFS_CONFIG_GPS_MODE", mode.as_str());
    }
    if let Some(interval) = &form.gps_update_interval {
        doc.insert("USERPREFS_CONFIG_GPS_UPDATE_INTERVAL", interval.as_str());
    }
    if let Some(interval) = &form.position_broadcast_interval {
        doc.insert(
            "USERPREFS_CONFIG_POSITION_BROADCAST_INTERVAL",
            interval.as_str(),
        );
    }
    if form.fixed_position {
        for (key, value) in [
            ("USERPREFS_CONFIG_POSITION_FIXED_LAT", &form.fixed_lat),
            ("USERPREFS_CONFIG_POSITION_FIXED_LON", &form.fixed_lon),
            ("USERPREFS_CONFIG_POSITION_FIXED_ALT", &form.fixed_alt),
        ] {
            if let Some(v) = non_empty(value) {
                doc.insert(key, v);
            }
        }
    }
    if let Some(smart) = &form.smart_position_enabled {
        doc.insert("USERPREFS_CONFIG_POSITION_SMART_ENABLED", bool_text(smart));
    }
}

fn emit_network(doc: &mut ConfigDocument, form: &FormInput) {
    if !form.network_enabled {
        return;
    }
    if let Some(protocols) = &form.network_protocols {
        doc.insert(
            "USERPREFS_CONFIG_NETWORK_ENABLED_PROTOCOLS",
            protocols.as_str(),
        );
    }
    if form.wifi_enabled {
        if let Some(ssid) = &form.wifi_ssid {
            doc.insert("USERPREFS_CONFIG_WIFI_SSID", ssid.as_str());
        }
        if let Some(psk) = &form.wifi_psk {
            doc.insert("USERPREFS_CONFIG_WIFI_PSK", psk.as_str());
        }
    }
    if form.mqtt_enabled {
        for (key, value) in [
            ("USERPREFS_CONFIG_MQTT_SERVER", &form.mqtt_address),
            ("USERPREFS_CONFIG_MQTT_ROOT_TOPIC", &form.mqtt_root_topic),
            ("USERPREFS_CONFIG_MQTT_USERNAME", &form.mqtt_username),
            ("USERPREFS_CONFIG_MQTT_PASSWORD", &form.mqtt_password),
        ] {
            if let Some(v) = value {
                doc.insert(key, v.as_str());
            }
        }
        if let Some(enc) = &form.mqtt_encryption_enabled {
            doc.insert("USERPREFS_CONFIG_MQTT_ENCRYPTION_ENABLED", bool_text(enc));
        }
        if let Some(tls) = &form.mqtt_tls_enabled {
            doc.insert("USERPREFS_CONFIG_MQTT_TLS_ENABLED", bool_text(tls));
        }
    }
}

/// Turn validated form input into the ordered preferences document.
pub fn emit(form: &FormInput) -> ConfigDocument {
    let mut doc = ConfigDocument::new();

    doc.insert(
        "USERPREFS_CHANNELS_TO_WRITE",
        form.channels_to_write.to_string(),
    );

    for (key, value) in [
        ("USERPREFS_CONFIG_DEVICE_NAME", &form.device_name),
        ("USERPREFS_CONFIG_OWNER_SHORT_NAME", &form.owner_short_name),
        ("USERPREFS_CONFIG_OWNER_LONG_NAME", &form.owner_long_name),
        ("USERPREFS_TZ_STRING", &form.tz_string),
        ("USERPREFS_FIXED_BLUETOOTH", &form.bluetooth_fixed_pin),
    ] {
        if let Some(v) = non_empty(value) {
            doc.insert(key, v);
        }
    }

    for (index, channel) in form.channels.range(..form.channels_to_write) {
        emit_channel(&mut doc, *index, channel);
    }

    emit_lora(&mut doc, form);
    emit_gps(&mut doc, form);

    for (i, key) in form.admin_keys.iter().enumerate() {
        if let Some(k) = non_empty(key) {
            doc.insert(format!("USERPREFS_ADMIN_KEY_{i}"), k);
        }
    }

    emit_network(&mut doc, form);

    for (key, value) in [
        ("USERPREFS_CONFIG_OEM_TEXT", &form.oem_text),
        ("USERPREFS_CONFIG_OEM_FONT_SIZE", &form.oem_font_size),
        ("USERPREFS_CONFIG_OEM_IMAGE_WIDTH", &form.oem_image_width),
        ("USERPREFS_CONFIG_OEM_IMAGE_HEIGHT", &form.oem_image_height),
        ("USERPREFS_CONFIG_OEM_IMAGE_DATA", &form.oem_image_data),
    ] {
        if let Some(v) = non_empty(value) {
            doc.insert(key, v);
        }
    }

    doc
}

/// Parse raw form JSON and render the `userPrefs.jsonc` text.
pub fn generate_prefs(form: &Value) -> Result<String> {
    let input = FormInput::from_json(form)?;
    emit(&input).to_jsonc()
}
