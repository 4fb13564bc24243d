//! Hardware variant catalog and artifact format classification.

use serde::Serialize;
use std::fmt;

/// Container format produced by the firmware build for a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// USB mass-storage flashable image (nRF52, RP2040).
    Uf2,
    /// Raw ESP32 application image.
    Bin,
}

impl ArtifactFormat {
    /// File name PlatformIO writes for this format.
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactFormat::Uf2 => "firmware.uf2",
            ArtifactFormat::Bin => "firmware.bin",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Uf2 => "uf2",
            ArtifactFormat::Bin => "bin",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// ESP32 bootloader + partition table bundle, produced next to `firmware.bin`.
pub const FACTORY_FILE_NAME: &str = "firmware.factory.bin";

/// Every artifact file name the build tree may hold for a variant.
pub const ARTIFACT_FILE_NAMES: [&str; 3] = ["firmware.uf2", "firmware.bin", FACTORY_FILE_NAME];

const NRF52_VARIANTS: &[&str] = &[
    "rak4631",
    "rak4631_eink",
    "t-echo",
    "t-echo-inkhud",
    "nano-g2-ultra",
    "tracker-t1000-e",
    "wio-sdk-wm1110",
    "wio-tracker-wm1110",
    "pca10059_diy_eink",
    "heltec-mesh-node-t114",
    "seeed_xiao_nrf52840_kit",
];

const RP2040_VARIANTS: &[&str] = &[
    "rpipico",
    "rpipicow",
    "rpipico2",
    "rpipico-waveshare",
    "rak11310",
    "senselora_rp2040",
    "rp2040-lora",
];

const UF2_PREFIXES: &[&str] = &["rak4631", "t-echo", "nrf52", "rpipico", "rp2040", "pico2"];

/// Classify a variant id into the format its build produces.
///
/// Total: unknown ids fall back to [`ArtifactFormat::Bin`].
pub fn classify(variant: &str) -> ArtifactFormat {
    if NRF52_VARIANTS.contains(&variant) || RP2040_VARIANTS.contains(&variant) {
        return ArtifactFormat::Uf2;
    }
    if UF2_PREFIXES.iter().any(|p| variant.starts_with(p)) {
        return ArtifactFormat::Uf2;
    }
    ArtifactFormat::Bin
}

/// Catalog entry for a supported hardware target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub id: &'static str,
    pub name: &'static str,
    pub manufacturer: &'static str,
}

impl Variant {
    const fn new(id: &'static str, name: &'static str, manufacturer: &'static str) -> Self {
        Self {
            id,
            name,
            manufacturer,
        }
    }

    pub fn format(&self) -> ArtifactFormat {
        classify(self.id)
    }

    /// All catalog entries, in display order.
    pub fn catalog() -> &'static [Variant] {
        CATALOG
    }

    pub fn find(id: &str) -> Option<&'static Variant> {
        CATALOG.iter().find(|v| v.id == id)
    }

    /// Catalog grouped by manufacturer, groups in first-appearance order.
    pub fn by_manufacturer() -> Vec<(&'static str, Vec<&'static Variant>)> {
        let mut groups: Vec<(&'static str, Vec<&'static Variant>)> = Vec::new();
        for variant in CATALOG {
            match groups.iter_mut().find(|(m, _)| *m == variant.manufacturer) {
                Some((_, members)) => members.push(variant),
                None => groups.push((variant.manufacturer, vec![variant])),
            }
        }
        groups
    }
}

/// PlatformIO environment names are plain identifiers. Anything else would
/// end up on a command line or in a path, so reject it early.
pub fn is_valid_variant_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !id.starts_with('.')
}

static CATALOG: &[Variant] = &[
    Variant::new("tbeam", "LILYGO® T-Beam", "LILYGO"),
    Variant::new("tbeam-s3-core", "LILYGO® T-Beam S3 Core", "LILYGO"),
    Variant::new("tbeam0_7", "LILYGO® T-Beam v0.7", "LILYGO"),
    Variant::new("t-echo", "LILYGO® T-Echo", "LILYGO"),
    Variant::new("t-echo-inkhud", "LILYGO® T-Echo InkHUD", "LILYGO"),
    Variant::new("t-deck", "LILYGO® T-Deck", "LILYGO"),
    Variant::new("t-deck-tft", "LILYGO® T-Deck TFT", "LILYGO"),
    Variant::new("tlora-v1", "LILYGO® TLORA v1", "LILYGO"),
    Variant::new("tlora_v1_3", "LILYGO® TLORA v1.3", "LILYGO"),
    Variant::new("tlora-v2", "LILYGO® TLORA v2", "LILYGO"),
    Variant::new("tlora-v2-1-1_6", "LILYGO® TLORA v2.1-1.6", "LILYGO"),
    Variant::new("tlora-v2-1-1_8", "LILYGO® TLORA v2.1-1.8", "LILYGO"),
    Variant::new("tlora-t3s3-v1", "LILYGO® TLORA T3S3 v1", "LILYGO"),
    Variant::new("tlora-t3s3-epaper", "LILYGO® TLORA T3S3 ePaper", "LILYGO"),
    Variant::new("heltec-v1", "Heltec Wireless Stick v1", "Heltec"),
    Variant::new("heltec-v2_0", "Heltec Wireless Stick v2.0", "Heltec"),
    Variant::new("heltec-v2_1", "Heltec Wireless Stick v2.1", "Heltec"),
    Variant::new("heltec-v3", "Heltec Wireless Stick v3", "Heltec"),
    Variant::new("heltec-wireless-paper", "Heltec Wireless Paper", "Heltec"),
    Variant::new("heltec-wireless-tracker", "Heltec Wireless Tracker", "Heltec"),
    Variant::new("rak4631", "RAK Wireless WisBlock RAK4631", "RAK"),
    Variant::new("rak11200", "RAK Wireless WisBlock RAK11200", "RAK"),
    Variant::new("rak11310", "RAK Wireless WisBlock RAK11310", "RAK"),
    Variant::new("nano-g1", "Nano G1", "Meshtastic"),
    Variant::new("nano-g1-explorer", "Nano G1 Explorer Edition", "Meshtastic"),
    Variant::new("nano-g2-ultra", "Nano G2 Ultra", "Meshtastic"),
    Variant::new("ESP32-S3-Pico", "ESP32-S3-Pico", "Espressif"),
    Variant::new("tracker-t1000-e", "Tracker T1000E", "Meshtastic"),
    Variant::new("picomputer-s3", "Pi Computer S3", "Meshtastic"),
    Variant::new("station-g1", "Meshtastic Station G1", "Meshtastic"),
    Variant::new("station-g2", "Meshtastic Station G2", "Meshtastic"),
    Variant::new("meshtastic-diy-v1", "Meshtastic DIY v1", "DIY"),
    Variant::new("meshtastic-diy-v1_1", "Meshtastic DIY v1.1", "DIY"),
    Variant::new("tbeam-s3", "T-Beam S3", "Custom"),
];
