//! Device access: the adapter contract, its platform implementations, and the
//! SMART read cache.

pub mod chain;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod smart_cache;
pub mod smartctl;
pub mod surface;

use crate::config::GeneralConfig;
use crate::error::SmartResult;
use crate::models::device::DeviceInfo;
use crate::models::smart::SmartRecord;

/// A successful SMART read and the access method that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SmartReading {
    pub record: SmartRecord,
    pub method: String,
}

/// What the core needs from a platform: identity, size and raw SMART data.
///
/// Implementations must return within a bounded time and report a timeout
/// as `IoError`. A reading must never be returned for a partial transfer.
pub trait DeviceAccessAdapter {
    /// Short method name, e.g. `"ioctl"` or `"smartctl"`.
    fn name(&self) -> &str;

    /// Paths of every drive this adapter can see. Empty is `NoDrivesFound`.
    fn list_drives(&self) -> SmartResult<Vec<String>>;

    fn basic_info(&self, path: &str) -> SmartResult<DeviceInfo>;

    fn device_size(&self, path: &str) -> SmartResult<u64>;

    fn read_smart(&self, path: &str) -> SmartResult<SmartReading>;
}

/// Build the adapter chain for this platform from the configured method order.
pub fn platform_adapter(cfg: &GeneralConfig) -> Box<dyn DeviceAccessAdapter> {
    let mut methods: Vec<Box<dyn DeviceAccessAdapter>> = Vec::new();
    for m in &cfg.methods {
        match m.as_str() {
            "ioctl" => {
                #[cfg(target_os = "linux")]
                methods.push(Box::new(linux::LinuxAdapter::new(cfg.command_timeout_sec)));
                #[cfg(not(target_os = "linux"))]
                tracing::debug!("ioctl access is only available on Linux, skipping");
            }
            "smartctl" => methods.push(Box::new(smartctl::SmartctlAdapter::new(
                &cfg.smartctl_path,
                cfg.command_timeout_sec,
            ))),
            other => tracing::warn!(method = other, "unknown access method in config, ignoring"),
        }
    }
    if methods.is_empty() {
        methods.push(Box::new(smartctl::SmartctlAdapter::new(&cfg.smartctl_path, cfg.command_timeout_sec)));
    }
    Box::new(chain::FallbackAdapter::new(methods))
}
