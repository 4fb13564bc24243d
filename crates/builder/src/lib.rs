//! Firmware build orchestration for the Meshtastic firmware builder.
//!
//! This crate owns everything that touches the shared PlatformIO tree:
//! - Build-tree layout and locking
//! - The toolchain seam and its PlatformIO implementation
//! - Build orchestration, artifact location and secret scrubbing
//! - Retention sweeps over request directories
//! - Firmware source updates

pub mod error;
pub mod layout;
pub mod locator;
pub mod locks;
pub mod orchestrator;
pub mod retention;
pub mod scrubber;
pub mod service;
pub mod toolchain;
pub mod updater;
pub mod workspace;

pub use error::{BuildError, BuildResult};
pub use layout::BuildTree;
pub use locator::locate;
pub use locks::BuildTreeLocks;
pub use orchestrator::{
    BuildArtifact, BuildOutcome, BuildRequest, ConfigSource, Orchestrator, TimingBreakdown,
};
pub use retention::{RetentionSweeper, SweepStats};
pub use scrubber::{ScrubGuard, ScrubPlan, ScrubReport, Scrubber};
pub use service::{ArtifactHandle, BuildReceipt, BuildService};
pub use toolchain::{CommandOutput, CompileOptions, PlatformIo, Toolchain};
pub use updater::{GithubReleaseUpdater, SourceUpdater};
pub use workspace::RequestWorkspace;
