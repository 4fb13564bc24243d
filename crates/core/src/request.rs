//! Build request identifiers and lifecycle.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

const BUILD_ID_PREFIX: &str = "build_";
const SUFFIX_LEN: usize = 8;

/// Identifier of a build request: `build_<unix seconds>_<8 hex chars>`.
///
/// The seconds component is the creation time used for retention. The
/// random suffix keeps ids unique within a second.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildId {
    created_secs: i64,
    suffix: String,
}

impl BuildId {
    /// Generate a fresh id stamped with the current time.
    pub fn new() -> Self {
        Self::at(OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Generate an id stamped with the given unix time.
    pub fn at(created_secs: i64) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self {
            created_secs,
            suffix: uuid[..SUFFIX_LEN].to_string(),
        }
    }

    /// Parse and validate a client-supplied id.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidBuildId(s.to_string());
        let rest = s.strip_prefix(BUILD_ID_PREFIX).ok_or_else(invalid)?;
        let (secs, suffix) = rest.split_once('_').ok_or_else(invalid)?;

        if secs.is_empty() || !secs.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let created_secs: i64 = secs.parse().map_err(|_| invalid())?;

        if suffix.len() != SUFFIX_LEN
            || !suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(invalid());
        }

        Ok(Self {
            created_secs,
            suffix: suffix.to_string(),
        })
    }

    /// Creation time extracted from a directory name, if it is a build id.
    ///
    /// Only the seconds component is required so directories from older
    /// deployments (`build_<secs>`) still age out.
    pub fn created_secs_from_name(name: &str) -> Option<i64> {
        let rest = name.strip_prefix(BUILD_ID_PREFIX)?;
        let secs = rest.split('_').next()?;
        if secs.is_empty() || !secs.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        secs.parse().ok()
    }

    pub fn created_secs(&self) -> i64 {
        self.created_secs
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BUILD_ID_PREFIX}{}_{}", self.created_secs, self.suffix)
    }
}

impl FromStr for BuildId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BuildId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<BuildId> for String {
    fn from(id: BuildId) -> String {
        id.to_string()
    }
}

/// Lifecycle of a build request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Created,
    Configuring,
    Compiling,
    ArtifactLocated,
    Scrubbed,
    ReadyForDownload,
    Failed,
}

impl BuildState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: BuildState) -> bool {
        use BuildState::*;
        matches!(
            (self, next),
            (Created, Configuring)
                | (Configuring, Compiling)
                | (Compiling, ArtifactLocated)
                | (ArtifactLocated, Scrubbed)
                | (Scrubbed, ReadyForDownload)
                | (Created | Configuring | Compiling | ArtifactLocated | Scrubbed, Failed)
        )
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildState::Created => "created",
            BuildState::Configuring => "configuring",
            BuildState::Compiling => "compiling",
            BuildState::ArtifactLocated => "artifact_located",
            BuildState::Scrubbed => "scrubbed",
            BuildState::ReadyForDownload => "ready_for_download",
            BuildState::Failed => "failed",
        };
        f.write_str(s)
    }
}
