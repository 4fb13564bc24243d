//! Core domain types and shared logic for the Meshtastic firmware builder.
//!
//! This crate defines the data model used by the builder and server crates:
//! - Validated form input and the `userPrefs.jsonc` emitter
//! - The device variant catalog and artifact format classification
//! - Build request identifiers and lifecycle
//! - The firmware version tracking file
//! - Configuration types

pub mod config;
pub mod error;
pub mod form;
pub mod prefs;
pub mod request;
pub mod variant;
pub mod version;

pub use error::{Error, Result};
pub use form::{ChannelInput, FormInput};
pub use prefs::{ConfigDocument, emit, generate_prefs, normalize_psk, normalize_region};
pub use request::{BuildId, BuildState};
pub use variant::{ArtifactFormat, Variant, classify};
pub use version::FirmwareVersion;

/// File name of the configuration document consumed by the firmware build.
pub const PREFS_FILE_NAME: &str = "userPrefs.jsonc";

/// Namespace prefix every LoRa region code must carry exactly once.
pub const REGION_PREFIX: &str = "meshtastic_Config_LoRaConfig_RegionCode_";
