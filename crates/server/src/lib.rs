//! HTTP API server for the Meshtastic firmware builder.
//!
//! This crate provides the HTTP surface:
//! - userPrefs generation, preview and download
//! - Firmware builds and artifact downloads
//! - Admin cleanup and firmware source updates
//! - Background retention sweeps

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sweeper;

pub use auth::RequestId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
