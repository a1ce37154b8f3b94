//! Drives one SMART query: cache first, then exactly one adapter read.

use crate::alerts::{self, HealthAlert};
use crate::collectors::smart_cache::{DeviceSignature, SmartCache};
use crate::collectors::DeviceAccessAdapter;
use crate::error::{SmartError, SmartResult, SUCCESS_CODE};
use crate::health::{self, HealthVerdict};
use crate::models::device::DeviceInfo;
use crate::models::smart::{DriveKind, NvmeHealthLog, SmartRecord};
use crate::predict::{self, Prediction};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Method name reported when a query is answered from the cache.
pub const CACHED_METHOD: &str = "Cached Data";

/// How the last query was answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionInfo {
    pub method:     String,
    pub success:    bool,
    pub elapsed_ms: u64,
    pub error_code: i32,
    pub error:      Option<String>,
}

impl ExecutionInfo {
    fn ok(method: &str, elapsed_ms: u64) -> Self {
        Self { method: method.to_string(), success: true, elapsed_ms, error_code: SUCCESS_CODE, error: None }
    }

    fn failed(method: &str, elapsed_ms: u64, err: &SmartError) -> Self {
        Self {
            method:     method.to_string(),
            success:    false,
            elapsed_ms,
            error_code: err.code(),
            error:      Some(err.to_string()),
        }
    }
}

/// Per-device session state. Not shared between threads; give each device
/// its own context.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub cache:          SmartCache,
    /// Identity to check cached data against. Derived from basic info when unset.
    pub signature:      Option<DeviceSignature>,
    /// Drive type the caller asked for; `Unknown` accepts either.
    pub expected_kind:  DriveKind,
    pub last_execution: Option<ExecutionInfo>,
    pub device_info:    Option<DeviceInfo>,
}

impl QueryContext {
    pub fn new(cache: SmartCache) -> Self {
        Self { cache, ..Default::default() }
    }

    pub fn with_signature(mut self, signature: DeviceSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn expecting(mut self, kind: DriveKind) -> Self {
        self.expected_kind = kind;
        self
    }

    fn check_kind(&self, actual: DriveKind) -> SmartResult<()> {
        if self.expected_kind != DriveKind::Unknown && actual != self.expected_kind {
            return Err(SmartError::WrongDriveType { expected: self.expected_kind, actual });
        }
        Ok(())
    }
}

pub fn get_smart_data(
    adapter: &dyn DeviceAccessAdapter,
    path: &str,
    ctx: &mut QueryContext,
) -> SmartResult<SmartRecord> {
    get_smart_data_at(adapter, path, ctx, Utc::now())
}

/// [`get_smart_data`] with an explicit clock for the cache.
pub fn get_smart_data_at(
    adapter: &dyn DeviceAccessAdapter,
    path: &str,
    ctx: &mut QueryContext,
    now: DateTime<Utc>,
) -> SmartResult<SmartRecord> {
    if path.trim().is_empty() {
        let err = SmartError::InvalidParameter("empty device path".into());
        ctx.last_execution = Some(ExecutionInfo::failed(adapter.name(), 0, &err));
        return Err(err);
    }

    let signature = if ctx.cache.is_enabled() {
        let sig = resolve_signature(adapter, path, ctx);
        if let Some(record) = cached_record(ctx, &sig, now) {
            return match ctx.check_kind(record.kind()) {
                Ok(()) => {
                    ctx.last_execution = Some(ExecutionInfo::ok(CACHED_METHOD, 0));
                    Ok(record)
                }
                Err(err) => {
                    ctx.last_execution = Some(ExecutionInfo::failed(CACHED_METHOD, 0, &err));
                    Err(err)
                }
            };
        }
        Some(sig)
    } else {
        None
    };

    let started = Instant::now();
    let result = adapter.read_smart(path);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let reading = match result {
        Ok(r) => r,
        Err(err) => {
            tracing::warn!(path, method = adapter.name(), error = %err, "SMART read failed");
            ctx.last_execution = Some(ExecutionInfo::failed(adapter.name(), elapsed_ms, &err));
            return Err(err);
        }
    };

    if let Err(err) = ctx.check_kind(reading.record.kind()) {
        ctx.last_execution = Some(ExecutionInfo::failed(&reading.method, elapsed_ms, &err));
        return Err(err);
    }

    if let (Some(sig), SmartRecord::Nvme(log)) = (&signature, &reading.record) {
        ctx.cache.update_at(sig, &log.to_bytes(), now);
    }

    tracing::info!(path, method = %reading.method, elapsed_ms, "SMART data read");
    ctx.last_execution = Some(ExecutionInfo::ok(&reading.method, elapsed_ms));
    Ok(reading.record)
}

fn resolve_signature(adapter: &dyn DeviceAccessAdapter, path: &str, ctx: &mut QueryContext) -> DeviceSignature {
    if let Some(sig) = &ctx.signature {
        return sig.clone();
    }
    let sig = match adapter.basic_info(path) {
        Ok(info) => {
            let sig = DeviceSignature::from_info(&info);
            ctx.device_info = Some(info);
            sig
        }
        Err(e) => {
            tracing::debug!(path, error = %e, "no identity for cache signature");
            DeviceSignature::unknown()
        }
    };
    ctx.signature = Some(sig.clone());
    sig
}

fn cached_record(ctx: &mut QueryContext, sig: &DeviceSignature, now: DateTime<Utc>) -> Option<SmartRecord> {
    let bytes = ctx.cache.lookup_at(sig, now)?;
    match NvmeHealthLog::from_bytes(&bytes) {
        Ok(log) => Some(SmartRecord::Nvme(log)),
        Err(e) => {
            tracing::warn!(error = %e, "cached page unreadable, discarding");
            ctx.cache.invalidate();
            None
        }
    }
}

// ── Assessment ────────────────────────────────────────────────────────

/// Everything the interpreters say about one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub verdict:    HealthVerdict,
    pub prediction: Prediction,
    /// NVMe only; empty for ATA drives.
    pub alerts:     Vec<HealthAlert>,
}

impl Assessment {
    pub fn of(record: &SmartRecord, spare_threshold_override: Option<u8>) -> Self {
        Self {
            verdict:    health::evaluate(record),
            prediction: predict::predict(record),
            alerts:     record
                .as_nvme()
                .map(|log| alerts::analyze(log, spare_threshold_override))
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::SmartReading;
    use std::cell::Cell;

    struct OneShot {
        record: SmartRecord,
        reads:  Cell<u32>,
    }

    impl DeviceAccessAdapter for OneShot {
        fn name(&self) -> &str { "test" }
        fn list_drives(&self) -> SmartResult<Vec<String>> { Ok(vec!["/dev/t".into()]) }
        fn basic_info(&self, path: &str) -> SmartResult<DeviceInfo> {
            let mut info = DeviceInfo::new(path);
            info.model = Some("M".into());
            info.serial = Some("S".into());
            Ok(info)
        }
        fn device_size(&self, _: &str) -> SmartResult<u64> { Ok(0) }
        fn read_smart(&self, _: &str) -> SmartResult<SmartReading> {
            self.reads.set(self.reads.get() + 1);
            Ok(SmartReading { record: self.record.clone(), method: "test read".into() })
        }
    }

    fn nvme_adapter() -> OneShot {
        let log = NvmeHealthLog { temperature: 310, avail_spare: 100, spare_threshold: 10, ..Default::default() };
        OneShot { record: SmartRecord::Nvme(log), reads: Cell::new(0) }
    }

    #[test]
    fn empty_path_is_rejected_without_reading() {
        let a = nvme_adapter();
        let mut ctx = QueryContext::default();
        assert!(matches!(get_smart_data(&a, "  ", &mut ctx), Err(SmartError::InvalidParameter(_))));
        assert_eq!(a.reads.get(), 0);
        assert!(!ctx.last_execution.unwrap().success);
    }

    #[test]
    fn signature_is_derived_from_basic_info() {
        let a = nvme_adapter();
        let mut ctx = QueryContext::default();
        get_smart_data(&a, "/dev/t", &mut ctx).unwrap();
        assert_eq!(ctx.signature.as_ref().unwrap().as_str(), "MODEL=M&SERIAL=S");
        assert_eq!(ctx.device_info.as_ref().unwrap().path, "/dev/t");
    }

    #[test]
    fn disabled_cache_skips_signature_and_always_reads() {
        let a = nvme_adapter();
        let mut ctx = QueryContext::new(SmartCache::disabled());
        get_smart_data(&a, "/dev/t", &mut ctx).unwrap();
        get_smart_data(&a, "/dev/t", &mut ctx).unwrap();
        assert_eq!(a.reads.get(), 2);
        assert!(ctx.signature.is_none());
    }

    #[test]
    fn assessment_has_no_alerts_for_ata() {
        let record = SmartRecord::Ata(Default::default());
        let a = Assessment::of(&record, None);
        assert!(a.alerts.is_empty());
        assert_eq!(a.verdict, HealthVerdict::Unknown);
    }
}
