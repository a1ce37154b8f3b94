use crate::models::smart::{critical_warning as cw, AtaAttributeTable, NvmeHealthLog, SmartRecord};
use serde::Serialize;

/// Overall health verdict. Ordered by severity; `Unknown` means no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HealthVerdict {
    Ok,
    Warning,
    Prefail,
    Failing,
    Unknown,
}

impl HealthVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            HealthVerdict::Ok      => "OK",
            HealthVerdict::Warning => "WARNING",
            HealthVerdict::Prefail => "PREFAIL",
            HealthVerdict::Failing => "FAILING",
            HealthVerdict::Unknown => "UNKNOWN",
        }
    }

    /// Raise to at least `to`. Never lowers.
    fn raise(&mut self, to: HealthVerdict) {
        if to > *self { *self = to; }
    }
}

/// NVMe composite temperature above which the drive is considered hot (70 °C).
const NVME_HOT_KELVIN: u16 = 343;

/// ATA attributes whose pre-fail threshold crossing means imminent failure.
const CRITICAL_ATA_IDS: &[u8] = &[5, 196, 197, 198];

pub fn evaluate(record: &SmartRecord) -> HealthVerdict {
    match record {
        SmartRecord::Nvme(log) => evaluate_nvme(log),
        SmartRecord::Ata(table) => evaluate_ata(table),
    }
}

/// As [`evaluate`], with an absent record yielding `Unknown`.
pub fn evaluate_opt(record: Option<&SmartRecord>) -> HealthVerdict {
    record.map(evaluate).unwrap_or(HealthVerdict::Unknown)
}

pub fn evaluate_nvme(log: &NvmeHealthLog) -> HealthVerdict {
    if log.has_warning(cw::RELIABILITY_DEGRADED) || log.has_warning(cw::READ_ONLY) {
        return HealthVerdict::Failing;
    }

    let media_errors = log.media_errors().saturating();
    let spare = log.avail_spare;
    let spare_thr = log.spare_threshold;

    let failing = log.percent_used > 110
        || (spare_thr > 0 && spare == 0)
        || (spare_thr > 4 && spare < spare_thr / 4)
        || media_errors > 100;
    if failing {
        return HealthVerdict::Failing;
    }

    let mut v = HealthVerdict::Ok;
    if log.has_warning(cw::SPARE_BELOW_THRESHOLD)  { v.raise(HealthVerdict::Warning); }
    if spare < spare_thr                           { v.raise(HealthVerdict::Warning); }
    if log.has_warning(cw::TEMPERATURE)            { v.raise(HealthVerdict::Warning); }
    if log.temperature > NVME_HOT_KELVIN           { v.raise(HealthVerdict::Warning); }
    if log.has_warning(cw::VOLATILE_BACKUP_FAILED) { v.raise(HealthVerdict::Warning); }
    if (95..=110).contains(&log.percent_used)      { v.raise(HealthVerdict::Warning); }
    if media_errors > 0                            { v.raise(HealthVerdict::Warning); }
    if log.unsafe_shutdowns().saturating() > 20    { v.raise(HealthVerdict::Warning); }
    v
}

/// An empty table is reported as `Unknown` (no data), not `Ok`.
pub fn evaluate_ata(table: &AtaAttributeTable) -> HealthVerdict {
    if table.is_empty() {
        return HealthVerdict::Unknown;
    }

    let mut v = HealthVerdict::Ok;
    for attr in table {
        if attr.is_prefail() && attr.at_or_below_threshold() {
            v.raise(HealthVerdict::Prefail);
            if CRITICAL_ATA_IDS.contains(&attr.id) {
                v.raise(HealthVerdict::Failing);
            }
        }

        let raw = attr.raw_value();
        match attr.id {
            5 => {
                if raw > 50     { v.raise(HealthVerdict::Failing); }
                else if raw > 5 { v.raise(HealthVerdict::Warning); }
            }
            197 | 198 => {
                if raw > 10     { v.raise(HealthVerdict::Failing); }
                else if raw > 0 { v.raise(HealthVerdict::Warning); }
            }
            199 => {
                if raw > 100    { v.raise(HealthVerdict::Warning); }
            }
            _ => {}
        }

        if v == HealthVerdict::Failing {
            break;
        }
    }
    v
}
