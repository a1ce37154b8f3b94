use crate::models::smart::NvmeHealthLog;
use crate::util::decode::Counter128;
use serde::Serialize;

pub const MAX_ALERTS: usize = 10;
pub const DESCRIPTION_MAX: usize = 128;
pub const VALUE_MAX: usize = 64;

const TEMP_WARN_C: i32 = 60;
const TEMP_CRIT_C: i32 = 70;
const USED_WARN_PCT: u8 = 80;
const USED_CRIT_PCT: u8 = 90;
const UNSAFE_WARN: u64 = 10;
const UNSAFE_CRIT: u64 = 50;
const ERRLOG_WARN: u64 = 5;
const ERRLOG_CRIT: u64 = 20;
const SPARE_WARN_MARGIN: u8 = 5;

/// Value string used when a counter exceeds 64 bits.
pub const OVERFLOW_VALUE: &str = ">18446744073709551615 (exceeds 64-bit)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlertKind {
    CriticalWarning,
    Temperature,
    SpareLow,
    PercentUsed,
    UnsafeShutdowns,
    MediaErrors,
    MediaErrorsOverflow,
    ErrorLogEntries,
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::CriticalWarning     => "critical_warning",
            AlertKind::Temperature         => "temperature",
            AlertKind::SpareLow            => "spare_low",
            AlertKind::PercentUsed         => "percent_used",
            AlertKind::UnsafeShutdowns     => "unsafe_shutdowns",
            AlertKind::MediaErrors         => "media_errors",
            AlertKind::MediaErrorsOverflow => "media_errors_overflow",
            AlertKind::ErrorLogEntries     => "error_log_entries",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Warning  => "WARN",
            Severity::Critical => "CRIT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthAlert {
    pub kind:            AlertKind,
    pub is_critical:     bool,
    pub description:     String,
    pub current_value:   String,
    pub threshold_value: String,
}

impl HealthAlert {
    fn new(kind: AlertKind, severity: Severity, description: String, current: String, threshold: String) -> Self {
        Self {
            kind,
            is_critical:     severity == Severity::Critical,
            description:     bounded(description, DESCRIPTION_MAX),
            current_value:   bounded(current, VALUE_MAX),
            threshold_value: bounded(threshold, VALUE_MAX),
        }
    }

    pub fn severity(&self) -> Severity {
        if self.is_critical { Severity::Critical } else { Severity::Warning }
    }
}

fn bounded(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) { cut -= 1; }
        s.truncate(cut);
    }
    s
}

/// Append-only list capped at [`MAX_ALERTS`]; extra alerts are dropped.
#[derive(Debug, Default)]
struct AlertList(Vec<HealthAlert>);

impl AlertList {
    fn push(&mut self, alert: HealthAlert) {
        if self.0.len() < MAX_ALERTS {
            self.0.push(alert);
        }
    }
}

/// Scan an NVMe health log against fixed thresholds.
///
/// `spare_threshold_override` replaces the drive's own spare threshold when set.
/// Alerts come back in evaluation order: critical-warning flags, temperature,
/// spare, percent used, unsafe shutdowns, media errors, error-log entries.
pub fn analyze(log: &NvmeHealthLog, spare_threshold_override: Option<u8>) -> Vec<HealthAlert> {
    let mut out = AlertList::default();

    // ── Critical warning byte ──────────────────────────────────────────
    if log.critical_warning != 0 {
        let flags = log.active_warnings();
        let detail = if flags.is_empty() { "reserved bits set".to_string() } else { flags.join(", ") };
        out.push(HealthAlert::new(
            AlertKind::CriticalWarning,
            Severity::Critical,
            format!("Critical warning: {}", detail),
            format!("0x{:02X}", log.critical_warning),
            "0x00".into(),
        ));
    }

    // ── Temperature ────────────────────────────────────────────────────
    if let Some(temp) = log.temperature_celsius() {
        if temp >= TEMP_CRIT_C {
            out.push(HealthAlert::new(
                AlertKind::Temperature,
                Severity::Critical,
                format!("Temperature {}°C at or above critical limit", temp),
                format!("{}°C", temp),
                format!("{}°C", TEMP_CRIT_C),
            ));
        } else if temp >= TEMP_WARN_C {
            out.push(HealthAlert::new(
                AlertKind::Temperature,
                Severity::Warning,
                format!("Temperature {}°C at or above warning limit", temp),
                format!("{}°C", temp),
                format!("{}°C", TEMP_WARN_C),
            ));
        }
    }

    // ── Available spare ────────────────────────────────────────────────
    let spare_thr = spare_threshold_override.unwrap_or(log.spare_threshold);
    if log.avail_spare < spare_thr {
        out.push(HealthAlert::new(
            AlertKind::SpareLow,
            Severity::Critical,
            format!("Available spare {}% below threshold {}%", log.avail_spare, spare_thr),
            format!("{}%", log.avail_spare),
            format!("{}%", spare_thr),
        ));
    } else if (log.avail_spare as u16) < spare_thr as u16 + SPARE_WARN_MARGIN as u16 {
        out.push(HealthAlert::new(
            AlertKind::SpareLow,
            Severity::Warning,
            format!("Available spare {}% approaching threshold {}%", log.avail_spare, spare_thr),
            format!("{}%", log.avail_spare),
            format!("{}%", spare_thr as u16 + SPARE_WARN_MARGIN as u16),
        ));
    }

    // ── Percentage used ────────────────────────────────────────────────
    if log.percent_used >= USED_CRIT_PCT {
        out.push(HealthAlert::new(
            AlertKind::PercentUsed,
            Severity::Critical,
            format!("Endurance {}% used, drive near end of rated life", log.percent_used),
            format!("{}%", log.percent_used),
            format!("{}%", USED_CRIT_PCT),
        ));
    } else if log.percent_used >= USED_WARN_PCT {
        out.push(HealthAlert::new(
            AlertKind::PercentUsed,
            Severity::Warning,
            format!("Endurance {}% used", log.percent_used),
            format!("{}%", log.percent_used),
            format!("{}%", USED_WARN_PCT),
        ));
    }

    // ── Counters ───────────────────────────────────────────────────────
    if let Some(a) = tiered_counter(
        AlertKind::UnsafeShutdowns, log.unsafe_shutdowns(), UNSAFE_WARN, UNSAFE_CRIT, "unsafe shutdown(s)",
    ) {
        out.push(a);
    }

    let media = log.media_errors();
    if media.overflows() {
        out.push(HealthAlert::new(
            AlertKind::MediaErrorsOverflow,
            Severity::Critical,
            "Media error count exceeds 64-bit range".into(),
            OVERFLOW_VALUE.into(),
            "0".into(),
        ));
    } else if media.low > 0 {
        out.push(HealthAlert::new(
            AlertKind::MediaErrors,
            Severity::Critical,
            format!("{} uncorrectable media/data integrity error(s)", media.low),
            media.low.to_string(),
            "0".into(),
        ));
    }

    if let Some(a) = tiered_counter(
        AlertKind::ErrorLogEntries, log.num_error_log_entries(), ERRLOG_WARN, ERRLOG_CRIT, "error log entries",
    ) {
        out.push(a);
    }

    out.0
}

fn tiered_counter(kind: AlertKind, counter: Counter128, warn: u64, crit: u64, what: &str) -> Option<HealthAlert> {
    let current = match counter.value() {
        Some(v) => v.to_string(),
        None    => OVERFLOW_VALUE.to_string(),
    };
    let value = counter.saturating();
    if value >= crit {
        Some(HealthAlert::new(kind, Severity::Critical, format!("{} {}", current, what), current, crit.to_string()))
    } else if value >= warn {
        Some(HealthAlert::new(kind, Severity::Warning, format!("{} {}", current, what), current, warn.to_string()))
    } else {
        None
    }
}

/// Highest severity present, if any.
pub fn worst(alerts: &[HealthAlert]) -> Option<Severity> {
    alerts.iter().map(HealthAlert::severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::smart::critical_warning as cw;

    fn healthy() -> NvmeHealthLog {
        NvmeHealthLog {
            temperature:     300,
            avail_spare:     50,
            spare_threshold: 10,
            percent_used:    10,
            ..Default::default()
        }
    }

    #[test]
    fn healthy_log_has_no_alerts() {
        assert!(analyze(&healthy(), None).is_empty());
    }

    #[test]
    fn flags_come_before_wear() {
        let mut log = healthy();
        log.critical_warning = cw::SPARE_BELOW_THRESHOLD;
        log.percent_used = 95;
        let alerts = analyze(&log, None);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, AlertKind::CriticalWarning);
        assert!(alerts[0].description.contains("available spare below threshold"));
        assert_eq!(alerts[0].current_value, "0x01");
        assert_eq!(alerts[1].kind, AlertKind::PercentUsed);
        assert!(alerts[1].is_critical);
    }

    #[test]
    fn temperature_uses_integer_kelvin_offset() {
        let mut log = healthy();
        log.temperature = 332; // 59 °C
        assert!(analyze(&log, None).is_empty());
        log.temperature = 333; // 60 °C
        let a = analyze(&log, None);
        assert_eq!(a[0].kind, AlertKind::Temperature);
        assert!(!a[0].is_critical);
        assert_eq!(a[0].threshold_value, "60°C");
        log.temperature = 343; // 70 °C
        assert!(analyze(&log, None)[0].is_critical);
    }

    #[test]
    fn spare_override_and_margin() {
        let mut log = healthy();
        log.avail_spare = 14;
        let a = analyze(&log, None);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].kind, AlertKind::SpareLow);
        assert!(!a[0].is_critical);

        let a = analyze(&log, Some(20));
        assert!(a[0].is_critical);
        assert_eq!(a[0].threshold_value, "20%");

        log.avail_spare = 15;
        assert!(analyze(&log, None).is_empty());
    }

    #[test]
    fn counter_tiers() {
        let mut log = healthy();
        log.unsafe_shutdowns = Counter128::from(10).to_bytes();
        log.num_error_log_entries = Counter128::from(20).to_bytes();
        let a = analyze(&log, None);
        assert_eq!(a.len(), 2);
        assert_eq!((a[0].kind, a[0].is_critical), (AlertKind::UnsafeShutdowns, false));
        assert_eq!((a[1].kind, a[1].is_critical), (AlertKind::ErrorLogEntries, true));
    }

    #[test]
    fn any_media_error_is_critical() {
        let mut log = healthy();
        log.media_errors = Counter128::from(1).to_bytes();
        let a = analyze(&log, None);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].kind, AlertKind::MediaErrors);
        assert!(a[0].is_critical);
        assert_eq!(a[0].current_value, "1");
    }

    #[test]
    fn media_overflow_uses_sentinel() {
        let mut log = healthy();
        log.media_errors = Counter128 { low: 7, high: 1 }.to_bytes();
        let a = analyze(&log, None);
        assert_eq!(a[0].kind, AlertKind::MediaErrorsOverflow);
        assert_eq!(a[0].current_value, OVERFLOW_VALUE);
        assert!(!a[0].current_value.starts_with('7'));
    }

    #[test]
    fn everything_at_once_stays_in_order_and_bounded() {
        let log = NvmeHealthLog {
            critical_warning: 0xFF,
            temperature: 400,
            avail_spare: 0,
            spare_threshold: 10,
            percent_used: 100,
            unsafe_shutdowns: Counter128::from(1000).to_bytes(),
            media_errors: Counter128::from(5).to_bytes(),
            num_error_log_entries: Counter128 { low: 0, high: 2 }.to_bytes(),
            ..Default::default()
        };
        let a = analyze(&log, None);
        let kinds: Vec<AlertKind> = a.iter().map(|x| x.kind).collect();
        assert_eq!(kinds, vec![
            AlertKind::CriticalWarning,
            AlertKind::Temperature,
            AlertKind::SpareLow,
            AlertKind::PercentUsed,
            AlertKind::UnsafeShutdowns,
            AlertKind::MediaErrors,
            AlertKind::ErrorLogEntries,
        ]);
        assert!(a.len() <= MAX_ALERTS);
        assert!(a.iter().all(|x| x.description.len() <= DESCRIPTION_MAX));
        assert!(a.iter().all(|x| x.current_value.len() <= VALUE_MAX));
        assert_eq!(worst(&a), Some(Severity::Critical));
    }

    #[test]
    fn list_is_capped() {
        let mut list = AlertList::default();
        for _ in 0..15 {
            list.push(HealthAlert::new(AlertKind::Temperature, Severity::Warning, "x".into(), "1".into(), "2".into()));
        }
        assert_eq!(list.0.len(), MAX_ALERTS);
    }

    #[test]
    fn long_strings_are_bounded() {
        let a = HealthAlert::new(
            AlertKind::Temperature, Severity::Warning, "é".repeat(100), "9".repeat(80), String::new(),
        );
        assert!(a.description.len() <= DESCRIPTION_MAX);
        assert_eq!(a.current_value.len(), VALUE_MAX);
    }
}
