//! SMART data acquisition and health assessment for ATA and NVMe drives.

pub mod alerts;
pub mod collectors;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod orchestrator;
pub mod predict;
pub mod util;

pub use error::{SmartError, SmartResult};
