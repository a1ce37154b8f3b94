use crate::collectors::{DeviceAccessAdapter, SmartReading};
use crate::error::{SmartError, SmartResult};
use crate::models::device::{clean, BusType, DeviceInfo};
use crate::models::smart::{AtaAttribute, AtaAttributeTable, DriveKind, NvmeHealthLog, SmartRecord};
use crate::util::decode::{encode_ata_raw6, Counter128};
use serde_json::Value;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub const METHOD: &str = "smartctl JSON";

/// smartctl exit-status bits (see smartctl(8) "RETURN VALUES").
const EXIT_CMDLINE: i32 = 0x01;
const EXIT_OPEN_FAILED: i32 = 0x02;

/// Reads SMART data by running `smartctl --json` and normalising its output.
pub struct SmartctlAdapter {
    binary:  String,
    timeout: Duration,
}

impl SmartctlAdapter {
    pub fn new(binary: &str, timeout_sec: u64) -> Self {
        Self { binary: binary.to_string(), timeout: Duration::from_secs(timeout_sec.max(1)) }
    }

    fn run(&self, path: &str, args: &[&str]) -> SmartResult<Value> {
        let out = run_with_timeout(&self.binary, args, self.timeout).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SmartError::Unsupported(format!("{} not installed", self.binary)),
            _ => SmartError::from_io(path, e),
        })?;

        // smartctl sets non-zero exit bits even on success, so parse regardless.
        let v: Value = serde_json::from_slice(&out.stdout)
            .map_err(|e| SmartError::Error(format!("unparseable smartctl output: {}", e)))?;
        let status = v["smartctl"]["exit_status"].as_i64().unwrap_or(0) as i32;
        if status & (EXIT_CMDLINE | EXIT_OPEN_FAILED) != 0 {
            return Err(open_failure(path, &v));
        }
        Ok(v)
    }
}

impl DeviceAccessAdapter for SmartctlAdapter {
    fn name(&self) -> &str {
        "smartctl"
    }

    fn list_drives(&self) -> SmartResult<Vec<String>> {
        let v = self.run("", &["--json=c", "--scan"])?;
        let drives: Vec<String> = v["devices"]
            .as_array()
            .map(|a| a.iter().filter_map(|d| d["name"].as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if drives.is_empty() {
            return Err(SmartError::NoDrivesFound);
        }
        Ok(drives)
    }

    fn basic_info(&self, path: &str) -> SmartResult<DeviceInfo> {
        let v = self.run(path, &["--json=c", "-i", path])?;
        Ok(parse_info(path, &v))
    }

    fn device_size(&self, path: &str) -> SmartResult<u64> {
        self.basic_info(path)?
            .size_bytes
            .ok_or_else(|| SmartError::Unsupported(format!("{}: capacity not reported", path)))
    }

    fn read_smart(&self, path: &str) -> SmartResult<SmartReading> {
        let v = self.run(path, &["--json=c", "-a", path])?;
        let record = parse_record(path, &v)?;
        Ok(SmartReading { record, method: METHOD.to_string() })
    }
}

fn open_failure(path: &str, v: &Value) -> SmartError {
    let msg = v["smartctl"]["messages"]
        .as_array()
        .and_then(|m| m.first())
        .and_then(|m| m["string"].as_str())
        .unwrap_or("device open failed")
        .to_string();
    let lower = msg.to_lowercase();
    if lower.contains("permission denied") || lower.contains("operation not permitted") {
        SmartError::AccessDenied(path.to_string())
    } else if lower.contains("no such file") || lower.contains("no such device") {
        SmartError::DeviceNotFound(path.to_string())
    } else if lower.contains("unknown usb bridge") || lower.contains("please specify device type") {
        SmartError::Unsupported(msg)
    } else {
        SmartError::IoError { path: path.to_string(), detail: msg }
    }
}

/// Spawn `binary args…` and wait at most `timeout` for it. Expiry kills the child.
fn run_with_timeout(binary: &str, args: &[&str], timeout: Duration) -> std::io::Result<std::process::Output> {
    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Both pipes are drained on threads so neither can fill up and stall the child.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("{} did not finish within {}s", binary, timeout.as_secs()),
            ));
        }
        std::thread::sleep(Duration::from_millis(20));
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    Ok(std::process::Output { status, stdout, stderr })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        buf
    })
}

// ── JSON normalisation ────────────────────────────────────────────────

fn protocol(v: &Value) -> DriveKind {
    match v["device"]["protocol"].as_str().unwrap_or("") {
        "NVMe" => DriveKind::Nvme,
        "ATA"  => DriveKind::Ata,
        _      => DriveKind::Unknown,
    }
}

pub(crate) fn parse_info(path: &str, v: &Value) -> DeviceInfo {
    let kind = protocol(v);
    let bus = match kind {
        DriveKind::Nvme => BusType::Nvme,
        DriveKind::Ata  => {
            if v["sata_version"].is_object() { BusType::Sata } else { BusType::Ata }
        }
        DriveKind::Unknown => BusType::from_transport(v["device"]["type"].as_str().unwrap_or("")),
    };
    let size_bytes = v["user_capacity"]["bytes"].as_u64()
        .or_else(|| v["nvme_total_capacity"].as_u64());
    DeviceInfo {
        path:       path.to_string(),
        model:      v["model_name"].as_str().and_then(clean),
        serial:     v["serial_number"].as_str().and_then(clean),
        firmware:   v["firmware_version"].as_str().and_then(clean),
        kind,
        bus,
        rotational: v["rotation_rate"].as_u64().map(|r| r > 0),
        size_bytes,
    }
}

pub(crate) fn parse_record(path: &str, v: &Value) -> SmartResult<SmartRecord> {
    match protocol(v) {
        DriveKind::Nvme => parse_nvme_health(v)
            .map(SmartRecord::Nvme)
            .ok_or_else(|| SmartError::DeviceError {
                path:   path.to_string(),
                detail: "NVMe health log missing from smartctl output".into(),
            }),
        DriveKind::Ata => {
            let table = parse_ata_attributes(v);
            if table.is_empty() && !v["ata_smart_attributes"].is_object() {
                return Err(SmartError::DeviceError {
                    path:   path.to_string(),
                    detail: "SMART attribute table missing from smartctl output".into(),
                });
            }
            Ok(SmartRecord::Ata(table))
        }
        DriveKind::Unknown => Err(SmartError::Unsupported(format!(
            "{}: protocol {:?} has no SMART attribute model",
            path,
            v["device"]["protocol"].as_str().unwrap_or("unknown")
        ))),
    }
}

fn parse_ata_attributes(v: &Value) -> AtaAttributeTable {
    let mut table = AtaAttributeTable::new();
    let rows = match v["ata_smart_attributes"]["table"].as_array() {
        Some(t) => t,
        None    => return table,
    };
    for entry in rows {
        let id = match entry["id"].as_u64() {
            Some(id) if (1..=255).contains(&id) => id as u8,
            _ => continue,
        };
        let mut attr = AtaAttribute::new(
            id,
            entry["flags"]["value"].as_u64().unwrap_or(0) as u16,
            entry["value"].as_u64().unwrap_or(0) as u8,
            entry["worst"].as_u64().unwrap_or(0) as u8,
            entry["thresh"].as_u64().unwrap_or(0) as u8,
            encode_ata_raw6(entry["raw"]["value"].as_u64().unwrap_or(0)),
        );
        if let Some(name) = entry["name"].as_str() {
            attr.name = name.to_string();
        }
        table.push(attr);
    }
    table
}

fn parse_nvme_health(v: &Value) -> Option<NvmeHealthLog> {
    let log = &v["nvme_smart_health_information_log"];
    if !log.is_object() { return None; }

    let kelvin = |c: &Value| c.as_i64().map(|t| (t + 273).clamp(0, u16::MAX as i64) as u16).unwrap_or(0);
    let mut temp_sensors = [0u16; 8];
    if let Some(sensors) = log["temperature_sensors"].as_array() {
        for (slot, t) in temp_sensors.iter_mut().zip(sensors) {
            *slot = kelvin(t);
        }
    }

    Some(NvmeHealthLog {
        critical_warning:      log["critical_warning"].as_u64().unwrap_or(0) as u8,
        temperature:           kelvin(&log["temperature"]),
        avail_spare:           log["available_spare"].as_u64().unwrap_or(100) as u8,
        spare_threshold:       log["available_spare_threshold"].as_u64().unwrap_or(10) as u8,
        percent_used:          log["percentage_used"].as_u64().unwrap_or(0).min(255) as u8,
        data_units_read:       counter(&log["data_units_read"]),
        data_units_written:    counter(&log["data_units_written"]),
        host_read_commands:    counter(&log["host_reads"]),
        host_write_commands:   counter(&log["host_writes"]),
        controller_busy_time:  counter(&log["controller_busy_time"]),
        power_cycles:          counter(&log["power_cycles"]),
        power_on_hours:        counter(&log["power_on_hours"]),
        unsafe_shutdowns:      counter(&log["unsafe_shutdowns"]),
        media_errors:          counter(&log["media_errors"]),
        num_error_log_entries: counter(&log["num_err_log_entries"]),
        warning_temp_time:     log["warning_temp_time"].as_u64().unwrap_or(0) as u32,
        critical_temp_time:    log["critical_comp_time"].as_u64().unwrap_or(0) as u32,
        temp_sensors,
    })
}

/// smartctl prints counters wider than 64 bits as floating-point numbers.
fn counter(v: &Value) -> [u8; 16] {
    if let Some(n) = v.as_u64() {
        return Counter128::from(n).to_bytes();
    }
    match v.as_f64() {
        Some(f) if f > 0.0 => (f as u128).to_le_bytes(),
        _                  => [0; 16],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nvme_output_normalises_to_kelvin_and_counters() {
        let v = json!({
            "device": { "name": "/dev/nvme0", "protocol": "NVMe" },
            "model_name": "Samsung SSD 980 PRO 1TB",
            "serial_number": "S5GXNX0T123456",
            "nvme_smart_health_information_log": {
                "critical_warning": 0,
                "temperature": 41,
                "available_spare": 100,
                "available_spare_threshold": 10,
                "percentage_used": 2,
                "data_units_read": 1234567,
                "power_on_hours": 812,
                "media_errors": 0,
                "num_err_log_entries": 3,
                "temperature_sensors": [41, 47]
            }
        });
        let r = parse_record("/dev/nvme0", &v).unwrap();
        let log = r.as_nvme().unwrap();
        assert_eq!(log.temperature, 314);
        assert_eq!(log.temperature_celsius(), Some(41));
        assert_eq!(log.data_units_read().value(), Some(1_234_567));
        assert_eq!(log.num_error_log_entries().value(), Some(3));
        assert_eq!(log.temp_sensors[..3], [314, 320, 0]);

        let info = parse_info("/dev/nvme0", &v);
        assert_eq!(info.kind, DriveKind::Nvme);
        assert_eq!(info.serial.as_deref(), Some("S5GXNX0T123456"));
    }

    #[test]
    fn huge_counter_overflows_into_high_word() {
        let bytes = counter(&json!(3.6893488147419103e19)); // 2 * 2^64
        let c = crate::util::decode::decode_u64_le_128(bytes);
        assert!(c.overflows());
        assert_eq!(c.high, 2);
    }

    #[test]
    fn ata_output_keeps_flags_and_raw() {
        let v = json!({
            "device": { "name": "/dev/sda", "protocol": "ATA" },
            "rotation_rate": 7200,
            "sata_version": { "string": "SATA 3.3" },
            "user_capacity": { "bytes": 4000787030016u64 },
            "ata_smart_attributes": { "table": [
                { "id": 5, "name": "Reallocated_Sector_Ct", "value": 100, "worst": 100, "thresh": 10,
                  "flags": { "value": 51, "prefailure": true }, "raw": { "value": 8 } },
                { "id": 0, "name": "bogus" },
                { "id": 194, "name": "Temperature_Celsius", "value": 64, "worst": 45, "thresh": 0,
                  "flags": { "value": 34 }, "raw": { "value": 193273528356u64 } }
            ]}
        });
        let r = parse_record("/dev/sda", &v).unwrap();
        let t = r.as_ata().unwrap();
        assert_eq!(t.len(), 2);
        let a = t.get(5).unwrap();
        assert!(a.is_prefail());
        assert_eq!(a.raw_value(), 8);
        assert_eq!(a.threshold, 10);
        assert_eq!(t.temperature_celsius(), Some(36));

        let info = parse_info("/dev/sda", &v);
        assert_eq!(info.bus, BusType::Sata);
        assert_eq!(info.rotational, Some(true));
        assert_eq!(info.size_bytes, Some(4_000_787_030_016));
    }

    #[test]
    fn open_failures_map_to_statuses() {
        let v = json!({ "smartctl": { "exit_status": 2, "messages": [
            { "string": "Smartctl open device: /dev/sda failed: Permission denied", "severity": "error" }
        ]}});
        assert_eq!(open_failure("/dev/sda", &v), SmartError::AccessDenied("/dev/sda".into()));

        let v = json!({ "smartctl": { "messages": [
            { "string": "/dev/sdz: No such device" }
        ]}});
        assert_eq!(open_failure("/dev/sdz", &v), SmartError::DeviceNotFound("/dev/sdz".into()));
    }

    #[test]
    fn unknown_protocol_is_unsupported() {
        let v = json!({ "device": { "protocol": "SCSI" } });
        assert!(matches!(parse_record("/dev/sdb", &v), Err(SmartError::Unsupported(_))));
    }

    #[test]
    fn missing_binary_is_unsupported() {
        let a = SmartctlAdapter::new("/nonexistent/smartctl-binary", 1);
        assert!(matches!(a.read_smart("/dev/sda"), Err(SmartError::Unsupported(_))));
    }

    #[cfg(unix)]
    #[test]
    fn chatty_stderr_does_not_stall_the_child() {
        if !std::path::Path::new("/bin/sh").exists() {
            return;
        }
        // Far more than a pipe buffer holds.
        let script = "i=0; while [ $i -lt 4000 ]; do echo 'warning: noisy diagnostic line padding padding' >&2; i=$((i+1)); done; echo '{}'";
        let started = Instant::now();
        let out = run_with_timeout("/bin/sh", &["-c", script], Duration::from_secs(20)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "{}");
        assert!(out.stderr.len() > 64 * 1024);
    }
}
