//! Coarse forward-looking pass/warn/fail classification.
//!
//! Thresholds here are deliberately independent of [`crate::health`]; the two
//! answer different questions and are tuned separately.

use crate::models::smart::{critical_warning as cw, AtaAttribute, AtaAttributeTable, NvmeHealthLog, SmartRecord};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Prediction {
    Ok,
    Warning,
    Failure,
    Unknown,
}

impl Prediction {
    pub fn label(&self) -> &'static str {
        match self {
            Prediction::Ok      => "OK",
            Prediction::Warning => "WARNING",
            Prediction::Failure => "FAILURE PREDICTED",
            Prediction::Unknown => "UNKNOWN",
        }
    }
}

const FAIL_KELVIN: u16 = 353; // 80 °C
const WARN_KELVIN: u16 = 343; // 70 °C

pub fn predict(record: &SmartRecord) -> Prediction {
    match record {
        SmartRecord::Nvme(log) => predict_nvme(log),
        SmartRecord::Ata(table) => predict_ata(table),
    }
}

pub fn predict_opt(record: Option<&SmartRecord>) -> Prediction {
    record.map(predict).unwrap_or(Prediction::Unknown)
}

pub fn predict_nvme(log: &NvmeHealthLog) -> Prediction {
    let failure = log.has_warning(cw::RELIABILITY_DEGRADED)
        || log.has_warning(cw::READ_ONLY)
        || (log.avail_spare == 0 && log.spare_threshold > 0)
        || log.percent_used >= 99
        || log.temperature >= FAIL_KELVIN;
    if failure {
        return Prediction::Failure;
    }

    let warning = log.has_warning(cw::SPARE_BELOW_THRESHOLD)
        || log.has_warning(cw::TEMPERATURE)
        || log.has_warning(cw::VOLATILE_BACKUP_FAILED)
        || log.percent_used >= 90
        || log.temperature >= WARN_KELVIN;
    if warning { Prediction::Warning } else { Prediction::Ok }
}

/// Most severe outcome over every attribute; an empty table is `Unknown`.
pub fn predict_ata(table: &AtaAttributeTable) -> Prediction {
    if table.is_empty() {
        return Prediction::Unknown;
    }
    table.iter()
        .map(predict_attribute)
        .max()
        .unwrap_or(Prediction::Ok)
}

fn predict_attribute(attr: &AtaAttribute) -> Prediction {
    let raw = attr.raw_value();
    match attr.id {
        5 if raw >= 50   => Prediction::Failure,
        5 if raw >= 5    => Prediction::Warning,
        197 if raw >= 10 => Prediction::Failure,
        197 if raw >= 1  => Prediction::Warning,
        198 if raw >= 1  => Prediction::Warning,
        _                => Prediction::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::decode::encode_ata_raw6;

    fn nvme(f: impl FnOnce(&mut NvmeHealthLog)) -> Prediction {
        let mut log = NvmeHealthLog {
            temperature: 300, avail_spare: 100, spare_threshold: 10, percent_used: 5,
            ..Default::default()
        };
        f(&mut log);
        predict(&SmartRecord::Nvme(log))
    }

    fn ata(attrs: &[(u8, u64)]) -> Prediction {
        let mut t = AtaAttributeTable::new();
        for &(id, raw) in attrs {
            t.push(AtaAttribute::new(id, 0, 100, 100, 0, encode_ata_raw6(raw)));
        }
        predict(&SmartRecord::Ata(t))
    }

    #[test]
    fn nvme_tiers() {
        assert_eq!(nvme(|_| {}), Prediction::Ok);
        assert_eq!(nvme(|l| l.percent_used = 90), Prediction::Warning);
        assert_eq!(nvme(|l| l.percent_used = 99), Prediction::Failure);
        assert_eq!(nvme(|l| l.temperature = 343), Prediction::Warning);
        assert_eq!(nvme(|l| l.temperature = 353), Prediction::Failure);
        assert_eq!(nvme(|l| l.avail_spare = 0), Prediction::Failure);
        assert_eq!(nvme(|l| { l.avail_spare = 0; l.spare_threshold = 0 }), Prediction::Ok);
        assert_eq!(nvme(|l| l.critical_warning = cw::VOLATILE_BACKUP_FAILED), Prediction::Warning);
        assert_eq!(nvme(|l| l.critical_warning = cw::READ_ONLY), Prediction::Failure);
    }

    #[test]
    fn wear_thresholds_differ_from_health_interpreter() {
        // 100% used: predictor already says failure, interpreter only warns
        let mut log = NvmeHealthLog { temperature: 300, avail_spare: 100, spare_threshold: 10, ..Default::default() };
        log.percent_used = 100;
        assert_eq!(predict_nvme(&log), Prediction::Failure);
        assert_eq!(crate::health::evaluate_nvme(&log), crate::health::HealthVerdict::Warning);
    }

    #[test]
    fn ata_tiers() {
        assert_eq!(ata(&[(5, 4)]), Prediction::Ok);
        assert_eq!(ata(&[(5, 5)]), Prediction::Warning);
        assert_eq!(ata(&[(5, 50)]), Prediction::Failure);
        assert_eq!(ata(&[(197, 1)]), Prediction::Warning);
        assert_eq!(ata(&[(197, 10)]), Prediction::Failure);
        assert_eq!(ata(&[(198, 10_000)]), Prediction::Warning);
    }

    #[test]
    fn ata_takes_worst_across_attributes() {
        // a warning attribute first must not hide a later failure
        assert_eq!(ata(&[(198, 1), (5, 60)]), Prediction::Failure);
        assert_eq!(ata(&[(9, 40_000), (197, 2)]), Prediction::Warning);
    }

    #[test]
    fn no_data_is_unknown() {
        assert_eq!(ata(&[]), Prediction::Unknown);
        assert_eq!(predict_opt(None), Prediction::Unknown);
    }
}
