use crate::alerts::HealthAlert;
use crate::error::SmartError;
use crate::models::device::DeviceInfo;
use crate::models::smart::{AtaAttributeTable, NvmeHealthLog, SmartRecord};
use crate::orchestrator::{Assessment, ExecutionInfo};
use crate::util::decode::Counter128;
use crate::util::human::fmt_bytes;
use serde_json::{json, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Txt,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Txt  => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Csv  => "csv",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = SmartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(ReportFormat::Txt),
            "json"         => Ok(ReportFormat::Json),
            "csv"          => Ok(ReportFormat::Csv),
            f @ ("xml" | "html") => Err(SmartError::InvalidParameter(format!("{} reports are not supported", f))),
            other => Err(SmartError::InvalidParameter(format!("unknown report format '{}'", other))),
        }
    }
}

/// Everything a report shows about one device.
pub struct Report<'a> {
    pub info:       &'a DeviceInfo,
    pub execution:  Option<&'a ExecutionInfo>,
    pub record:     &'a SmartRecord,
    pub assessment: &'a Assessment,
}

pub fn render(format: ReportFormat, report: &Report<'_>) -> String {
    match format {
        ReportFormat::Txt  => render_txt(report),
        ReportFormat::Json => render_json(report),
        ReportFormat::Csv  => render_csv(report),
    }
}

// ── Text ──────────────────────────────────────────────────────────────

pub fn render_txt(r: &Report<'_>) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let mut out = String::new();

    out.push_str("═══════════════════════════════════════════════\n");
    out.push_str(&format!("  SMART Report: {}  ({})\n", r.info.path, now));
    out.push_str("═══════════════════════════════════════════════\n\n");

    out.push_str("── Device ─────────────────────────────────────\n");
    out.push_str(&format!("  Model:     {}\n", r.info.model_or_unknown()));
    out.push_str(&format!("  Serial:    {}\n", r.info.serial.as_deref().unwrap_or("-")));
    out.push_str(&format!("  Firmware:  {}\n", r.info.firmware.as_deref().unwrap_or("-")));
    out.push_str(&format!("  Type:      {} ({})\n", r.record.kind(), r.info.bus.label()));
    if let Some(size) = r.info.size_bytes {
        out.push_str(&format!("  Capacity:  {}\n", fmt_bytes(size)));
    }
    if let Some(exec) = r.execution {
        out.push_str(&format!("  Method:    {} ({} ms)\n", exec.method, exec.elapsed_ms));
    }
    out.push('\n');

    out.push_str("── Health ─────────────────────────────────────\n");
    out.push_str(&format!("  Verdict:    {}\n", r.assessment.verdict.label()));
    out.push_str(&format!("  Prediction: {}\n", r.assessment.prediction.label()));
    if let Some(t) = r.record.temperature_celsius() {
        out.push_str(&format!("  Temp:       {}°C\n", t));
    }
    if let Some(poh) = r.record.power_on_hours() {
        out.push_str(&format!("  Power On:   {} h\n", poh));
    }
    out.push('\n');

    match r.record {
        SmartRecord::Nvme(log) => txt_nvme(&mut out, log),
        SmartRecord::Ata(table) => txt_ata(&mut out, table),
    }

    out.push_str(&format!("── Alerts ({}) ─────────────────────────────────\n", r.assessment.alerts.len()));
    if r.assessment.alerts.is_empty() {
        out.push_str("  ● No alerts\n");
    }
    for a in &r.assessment.alerts {
        out.push_str(&format!(
            "  [{}]  {}  (value {}, threshold {})\n",
            a.severity().label(), a.description, a.current_value, a.threshold_value
        ));
    }
    out.push_str("═══════════════════════════════════════════════\n");
    out
}

fn txt_nvme(out: &mut String, log: &NvmeHealthLog) {
    out.push_str("── NVMe Health Log ────────────────────────────\n");
    out.push_str(&format!("  Critical Warning:    0x{:02X}\n", log.critical_warning));
    for w in log.active_warnings() {
        out.push_str(&format!("    - {}\n", w));
    }
    out.push_str(&format!("  Available Spare:     {}% (threshold {}%)\n", log.avail_spare, log.spare_threshold));
    out.push_str(&format!("  Percentage Used:     {}%\n", log.percent_used));
    out.push_str(&format!("  Data Read:           {}\n", fmt_bytes(log.bytes_read())));
    out.push_str(&format!("  Data Written:        {}\n", fmt_bytes(log.bytes_written())));
    for (name, c) in nvme_counters(log) {
        out.push_str(&format!("  {:<20} {}\n", format!("{}:", name), counter_text(c)));
    }
    out.push('\n');
}

fn txt_ata(out: &mut String, table: &AtaAttributeTable) {
    out.push_str(&format!("── ATA Attributes ({}) ─────────────────────────\n", table.len()));
    out.push_str(&format!(
        "  {:>3} {:<28} {:>6} {:>3} {:>3} {:>3} {:>14}\n",
        "ID", "Name", "Flags", "Cur", "Wst", "Thr", "Raw"
    ));
    out.push_str(&format!("  {}\n", "─".repeat(66)));
    for a in table {
        out.push_str(&format!(
            "  {:>3} {:<28} 0x{:04X} {:>3} {:>3} {:>3} {:>14}{}\n",
            a.id, a.name, a.flags, a.current, a.worst, a.threshold, a.raw_value(),
            if a.is_prefail() && a.at_or_below_threshold() { "  FAILING_NOW" } else { "" },
        ));
    }
    out.push('\n');
}

// ── JSON ──────────────────────────────────────────────────────────────

pub fn render_json(r: &Report<'_>) -> String {
    let smart = match r.record {
        SmartRecord::Nvme(log) => nvme_json(log),
        SmartRecord::Ata(table) => ata_json(table),
    };
    let doc = json!({
        "device":        device_json(r.info, Some(r.record.kind().label())),
        "access_method": access_json(r.execution),
        "smart":      smart,
        "health":     r.assessment.verdict.label(),
        "prediction": r.assessment.prediction.label(),
        "alerts":     r.assessment.alerts.iter().map(alert_json).collect::<Vec<_>>(),
        "timestamp":  chrono::Utc::now().to_rfc3339(),
    });
    serde_json::to_string_pretty(&doc).unwrap_or_else(|_| doc.to_string())
}

/// JSON document for a read that produced no SMART data: identity, the
/// failed access attempt with its status code, and the time of the attempt.
pub fn render_json_failure(info: &DeviceInfo, execution: Option<&ExecutionInfo>) -> String {
    let doc = json!({
        "device":        device_json(info, None),
        "access_method": access_json(execution),
        "smart":         Value::Null,
        "timestamp":     chrono::Utc::now().to_rfc3339(),
    });
    serde_json::to_string_pretty(&doc).unwrap_or_else(|_| doc.to_string())
}

fn device_json(info: &DeviceInfo, kind: Option<&str>) -> Value {
    json!({
        "path":       info.path,
        "model":      info.model,
        "serial":     info.serial,
        "firmware":   info.firmware,
        "kind":       kind,
        "bus":        info.bus.label(),
        "size_bytes": info.size_bytes,
    })
}

fn access_json(execution: Option<&ExecutionInfo>) -> Value {
    match execution {
        Some(e) => json!({
            "name":       e.method,
            "success":    e.success,
            "elapsed_ms": e.elapsed_ms,
            "error_code": e.error_code,
            "error":      e.error,
        }),
        None => Value::Null,
    }
}

fn nvme_json(log: &NvmeHealthLog) -> Value {
    let mut m = serde_json::Map::new();
    m.insert("critical_warning".into(), json!(log.critical_warning));
    m.insert("temperature_kelvin".into(), json!(log.temperature));
    m.insert("temperature_celsius".into(), json!(log.temperature_celsius()));
    m.insert("available_spare".into(), json!(log.avail_spare));
    m.insert("spare_threshold".into(), json!(log.spare_threshold));
    m.insert("percentage_used".into(), json!(log.percent_used));
    for (name, c) in nvme_counters(log) {
        m.insert(name.to_ascii_lowercase().replace(' ', "_"), counter_json(c));
    }
    m.insert("warning_temp_time".into(), json!(log.warning_temp_time));
    m.insert("critical_temp_time".into(), json!(log.critical_temp_time));
    Value::Object(m)
}

fn ata_json(table: &AtaAttributeTable) -> Value {
    let attrs: Vec<Value> = table.iter().map(|a| json!({
        "id":        a.id,
        "name":      a.name,
        "flags":     a.flags,
        "current":   a.current,
        "worst":     a.worst,
        "threshold": a.threshold,
        "raw":       a.raw_value(),
    })).collect();
    json!({ "attributes": attrs })
}

fn alert_json(a: &HealthAlert) -> Value {
    json!({
        "kind":        a.kind.label(),
        "critical":    a.is_critical,
        "description": a.description,
        "value":       a.current_value,
        "threshold":   a.threshold_value,
    })
}

/// A 64-bit counter as a number; anything wider as a decimal string.
fn counter_json(c: Counter128) -> Value {
    match c.value() {
        Some(v) => json!(v),
        None    => json!(counter_text(c)),
    }
}

// ── CSV ───────────────────────────────────────────────────────────────

pub fn render_csv(r: &Report<'_>) -> String {
    let mut out = String::from("field,value\n");
    let mut row = |k: &str, v: &str| out.push_str(&format!("{},{}\n", csv_field(k), csv_field(v)));

    row("path", &r.info.path);
    row("model", r.info.model_or_unknown());
    row("serial", r.info.serial.as_deref().unwrap_or(""));
    row("kind", r.record.kind().label());
    row("health", r.assessment.verdict.label());
    row("prediction", r.assessment.prediction.label());
    if let Some(e) = r.execution {
        row("method", &e.method);
        row("elapsed_ms", &e.elapsed_ms.to_string());
    }
    match r.record {
        SmartRecord::Nvme(log) => {
            row("critical_warning", &log.critical_warning.to_string());
            row("temperature_kelvin", &log.temperature.to_string());
            row("available_spare", &log.avail_spare.to_string());
            row("spare_threshold", &log.spare_threshold.to_string());
            row("percentage_used", &log.percent_used.to_string());
            for (name, c) in nvme_counters(log) {
                row(&name.to_ascii_lowercase().replace(' ', "_"), &counter_text(c));
            }
        }
        SmartRecord::Ata(table) => {
            for a in table {
                row(&format!("attr_{}_{}", a.id, a.name), &a.raw_value().to_string());
            }
        }
    }
    for (i, a) in r.assessment.alerts.iter().enumerate() {
        row(&format!("alert_{}", i + 1), &format!("{}: {}", a.severity().label(), a.description));
    }
    out
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

// ── Shared ────────────────────────────────────────────────────────────

fn nvme_counters(log: &NvmeHealthLog) -> [(&'static str, Counter128); 10] {
    [
        ("Data Units Read",      log.data_units_read()),
        ("Data Units Written",   log.data_units_written()),
        ("Host Read Commands",   log.host_read_commands()),
        ("Host Write Commands",  log.host_write_commands()),
        ("Controller Busy Time", log.controller_busy_time()),
        ("Power Cycles",         log.power_cycles()),
        ("Power On Hours",       log.power_on_hours()),
        ("Unsafe Shutdowns",     log.unsafe_shutdowns()),
        ("Media Errors",         log.media_errors()),
        ("Error Log Entries",    log.num_error_log_entries()),
    ]
}

fn counter_text(c: Counter128) -> String {
    (((c.high as u128) << 64) | c.low as u128).to_string()
}
