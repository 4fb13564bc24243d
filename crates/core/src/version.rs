//! Firmware version tracking file.
//!
//! Format:
//!
//! ```text
//! Version: v2.6.11.60ec05e
//! Updated: 2025-06-01T12:00:00Z
//! ```

use crate::error::{Error, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Shown when no version file exists.
pub const NOT_INSTALLED: &str = "Not installed";
/// Shown when no update has ever run.
pub const NEVER_UPDATED: &str = "Never";

/// Installed firmware source release.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FirmwareVersion {
    pub tag: String,
    /// ISO 8601 timestamp of the update, kept as written.
    pub updated: String,
}

impl FirmwareVersion {
    pub fn new(tag: impl Into<String>, updated: OffsetDateTime) -> Result<Self> {
        let updated = updated
            .format(&Rfc3339)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self {
            tag: tag.into(),
            updated,
        })
    }

    /// Placeholder reported before the first update.
    pub fn not_installed() -> Self {
        Self {
            tag: NOT_INSTALLED.to_string(),
            updated: NEVER_UPDATED.to_string(),
        }
    }

    /// Parse the contents of the version file.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim);
        let tag = lines
            .next()
            .and_then(|l| l.strip_prefix("Version:"))
            .map(str::trim)
            .ok_or_else(|| Error::InvalidVersionFile("missing Version line".to_string()))?;
        let updated = lines
            .next()
            .and_then(|l| l.strip_prefix("Updated:"))
            .map(str::trim)
            .ok_or_else(|| Error::InvalidVersionFile("missing Updated line".to_string()))?;

        if tag.is_empty() {
            return Err(Error::InvalidVersionFile("empty version tag".to_string()));
        }

        Ok(Self {
            tag: tag.to_string(),
            updated: updated.to_string(),
        })
    }

    /// Render the file contents.
    pub fn render(&self) -> String {
        format!("Version: {}\nUpdated: {}\n", self.tag, self.updated)
    }
}
