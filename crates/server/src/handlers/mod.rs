//! HTTP request handlers.

pub mod admin;
pub mod artifacts;
pub mod build;
pub mod config;
pub mod system;

pub use admin::*;
pub use artifacts::*;
pub use build::*;
pub use config::*;
pub use system::*;
