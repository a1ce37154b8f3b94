use crate::collectors::{DeviceAccessAdapter, SmartReading};
use crate::error::{SmartError, SmartResult};
use crate::models::device::{clean, BusType, DeviceInfo};
use crate::models::smart::{AtaAttributeTable, DriveKind, NvmeHealthLog, SmartRecord, SMART_PAGE_SIZE};
use nix::errno::Errno;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

pub const NVME_METHOD: &str = "NVMe admin passthrough";
pub const ATA_METHOD: &str = "HDIO SMART";

const SYS_BLOCK: &str = "/sys/block";

/// Kernel block devices that never carry SMART data.
const SKIP_PREFIX: &[&str] = &["loop", "ram", "zram", "dm-", "md", "sr", "fd", "nbd"];

// ── NVMe admin passthrough ────────────────────────────────────────────

/// `struct nvme_passthru_cmd` from <linux/nvme_ioctl.h>.
#[repr(C)]
#[derive(Debug, Default)]
#[allow(dead_code)]
struct NvmeAdminCmd {
    opcode:       u8,
    flags:        u8,
    rsvd1:        u16,
    nsid:         u32,
    cdw2:         u32,
    cdw3:         u32,
    metadata:     u64,
    addr:         u64,
    metadata_len: u32,
    data_len:     u32,
    cdw10:        u32,
    cdw11:        u32,
    cdw12:        u32,
    cdw13:        u32,
    cdw14:        u32,
    cdw15:        u32,
    timeout_ms:   u32,
    result:       u32,
}

const NVME_ADMIN_GET_LOG_PAGE: u8 = 0x02;
const NVME_LOG_SMART_INFO: u32 = 0x02;
const NVME_NSID_ALL: u32 = 0xFFFF_FFFF;

nix::ioctl_readwrite!(nvme_admin_cmd, b'N', 0x41, NvmeAdminCmd);

// ── ATA via HDIO_DRIVE_CMD ────────────────────────────────────────────

const HDIO_DRIVE_CMD: libc::c_ulong = 0x031f;
const HDIO_GET_IDENTITY: libc::c_ulong = 0x030d;
const HDIO_CMD_HEADER: usize = 4;

const ATA_SMART_CMD: u8 = 0xB0;
const ATA_SMART_READ_VALUES: u8 = 0xD0;
const ATA_SMART_READ_THRESHOLDS: u8 = 0xD1;

nix::ioctl_readwrite_bad!(hdio_drive_cmd, HDIO_DRIVE_CMD, [u8; HDIO_CMD_HEADER + SMART_PAGE_SIZE]);
nix::ioctl_read_bad!(hdio_get_identity, HDIO_GET_IDENTITY, [u8; SMART_PAGE_SIZE]);

/// Direct kernel access: sysfs for identity, ioctls for SMART pages.
pub struct LinuxAdapter {
    timeout_ms: u32,
}

impl LinuxAdapter {
    pub fn new(timeout_sec: u64) -> Self {
        let ms = timeout_sec.max(1).saturating_mul(1000);
        Self { timeout_ms: u32::try_from(ms).unwrap_or(u32::MAX) }
    }
}

impl DeviceAccessAdapter for LinuxAdapter {
    fn name(&self) -> &str {
        "ioctl"
    }

    fn list_drives(&self) -> SmartResult<Vec<String>> {
        let entries = std::fs::read_dir(SYS_BLOCK).map_err(|e| SmartError::from_io(SYS_BLOCK, e))?;
        let mut drives: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !SKIP_PREFIX.iter().any(|p| name.starts_with(p)))
            .map(|name| format!("/dev/{}", name))
            .collect();
        if drives.is_empty() {
            return Err(SmartError::NoDrivesFound);
        }
        drives.sort();
        Ok(drives)
    }

    fn basic_info(&self, path: &str) -> SmartResult<DeviceInfo> {
        let name = block_name(path)?;
        let sys = Path::new(SYS_BLOCK).join(&name);
        if !sys.exists() {
            return Err(SmartError::DeviceNotFound(path.to_string()));
        }
        let dev = sys.join("device");
        let bus = detect_bus(&name, &sys);

        let mut info = DeviceInfo::new(path);
        info.bus  = bus;
        info.kind = bus.drive_kind();
        info.model = read_attr(&dev.join("model"));
        info.firmware = read_attr(&dev.join("firmware_rev")).or_else(|| read_attr(&dev.join("rev")));
        info.serial = read_attr(&dev.join("serial")).or_else(|| vpd_serial(&dev.join("vpd_pg80")));
        info.rotational = read_attr(&sys.join("queue").join("rotational")).map(|r| r == "1");
        info.size_bytes = sysfs_size(&sys);

        if info.kind == DriveKind::Ata && info.serial.is_none() {
            if let Ok(file) = open_device(path) {
                apply_identity(&file, &mut info);
            }
        }
        Ok(info)
    }

    fn device_size(&self, path: &str) -> SmartResult<u64> {
        let name = block_name(path)?;
        sysfs_size(&Path::new(SYS_BLOCK).join(&name))
            .ok_or_else(|| SmartError::DeviceNotFound(path.to_string()))
    }

    fn read_smart(&self, path: &str) -> SmartResult<SmartReading> {
        let name = block_name(path)?;
        let bus = detect_bus(&name, &Path::new(SYS_BLOCK).join(&name));
        let file = open_device(path)?;
        match bus.drive_kind() {
            DriveKind::Nvme => {
                let log = self.nvme_health_log(path, &file)?;
                Ok(SmartReading { record: SmartRecord::Nvme(log), method: NVME_METHOD.into() })
            }
            DriveKind::Ata => {
                let table = ata_smart_table(path, &file)?;
                Ok(SmartReading { record: SmartRecord::Ata(table), method: ATA_METHOD.into() })
            }
            DriveKind::Unknown => Err(SmartError::Unsupported(format!(
                "{}: no direct SMART path for {} bus", path, bus.label()
            ))),
        }
    }
}

impl LinuxAdapter {
    fn nvme_health_log(&self, path: &str, file: &File) -> SmartResult<NvmeHealthLog> {
        let mut page = [0u8; SMART_PAGE_SIZE];
        let numd = (SMART_PAGE_SIZE as u32 / 4) - 1;
        let mut cmd = NvmeAdminCmd {
            opcode:     NVME_ADMIN_GET_LOG_PAGE,
            nsid:       NVME_NSID_ALL,
            addr:       page.as_mut_ptr() as u64,
            data_len:   SMART_PAGE_SIZE as u32,
            cdw10:      NVME_LOG_SMART_INFO | (numd << 16),
            timeout_ms: self.timeout_ms,
            ..Default::default()
        };
        // SAFETY: `cmd.addr` points at `page`, which outlives the call and is `data_len` bytes long.
        let status = unsafe { nvme_admin_cmd(file.as_raw_fd(), &mut cmd) }
            .map_err(|e| map_errno(path, e))?;
        if status != 0 {
            return Err(SmartError::DeviceError {
                path:   path.to_string(),
                detail: format!("NVMe status 0x{:04X}", status),
            });
        }
        NvmeHealthLog::from_bytes(&page)
    }
}

fn ata_smart_table(path: &str, file: &File) -> SmartResult<AtaAttributeTable> {
    let values = ata_smart_page(path, file, ATA_SMART_READ_VALUES)?;
    let thresholds = match ata_smart_page(path, file, ATA_SMART_READ_THRESHOLDS) {
        Ok(t) => Some(t),
        Err(e) => {
            tracing::warn!(path, error = %e, "SMART thresholds unavailable, treating as zero");
            None
        }
    };
    AtaAttributeTable::from_pages(&values, thresholds.as_ref().map(|t| &t[..]))
}

fn ata_smart_page(path: &str, file: &File, feature: u8) -> SmartResult<[u8; SMART_PAGE_SIZE]> {
    let mut buf = [0u8; HDIO_CMD_HEADER + SMART_PAGE_SIZE];
    buf[0] = ATA_SMART_CMD;
    buf[1] = if feature == ATA_SMART_READ_THRESHOLDS { 1 } else { 0 };
    buf[2] = feature;
    buf[3] = 1;
    // SAFETY: HDIO_DRIVE_CMD reads a 4-byte header and writes back header + one 512-byte sector.
    unsafe { hdio_drive_cmd(file.as_raw_fd(), &mut buf) }.map_err(|e| map_errno(path, e))?;

    let mut page = [0u8; SMART_PAGE_SIZE];
    page.copy_from_slice(&buf[HDIO_CMD_HEADER..]);
    Ok(page)
}

/// Fill model/serial/firmware from the kernel's cached IDENTIFY data.
fn apply_identity(file: &File, info: &mut DeviceInfo) {
    let mut id = [0u8; SMART_PAGE_SIZE];
    // SAFETY: HDIO_GET_IDENTITY writes at most one 512-byte identify block.
    if unsafe { hdio_get_identity(file.as_raw_fd(), &mut id) }.is_err() {
        return;
    }
    // IDENTIFY strings are stored as big-endian 16-bit words.
    let text = |range: std::ops::Range<usize>| {
        let swapped: Vec<u8> = id[range].chunks_exact(2).flat_map(|w| [w[1], w[0]]).collect();
        clean(&String::from_utf8_lossy(&swapped))
    };
    info.serial = info.serial.take().or_else(|| text(20..40));
    info.firmware = info.firmware.take().or_else(|| text(46..54));
    info.model = info.model.take().or_else(|| text(54..94));
}

fn open_device(path: &str) -> SmartResult<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|e| SmartError::from_io(path, e))
}

fn map_errno(path: &str, e: Errno) -> SmartError {
    match e {
        Errno::EACCES | Errno::EPERM => SmartError::AccessDenied(path.to_string()),
        Errno::ENOENT | Errno::ENODEV | Errno::ENXIO => SmartError::DeviceNotFound(path.to_string()),
        Errno::ENOTTY | Errno::EINVAL | Errno::EOPNOTSUPP => {
            SmartError::Unsupported(format!("{}: ioctl not supported ({})", path, e.desc()))
        }
        Errno::ENOMEM => SmartError::NoMemory,
        Errno::EIO => SmartError::DeviceError { path: path.to_string(), detail: e.desc().to_string() },
        _ => SmartError::IoError { path: path.to_string(), detail: e.desc().to_string() },
    }
}

// ── sysfs helpers ─────────────────────────────────────────────────────

/// Kernel block name for a device path: `/dev/nvme0` → `nvme0n1`, `/dev/sda` → `sda`.
fn block_name(path: &str) -> SmartResult<String> {
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SmartError::InvalidParameter(format!("not a device path: {:?}", path)))?;

    if is_nvme_controller(name) {
        // Controller character device: use its first namespace for sysfs lookups.
        let ns = format!("{}n1", name);
        if Path::new(SYS_BLOCK).join(&ns).exists() {
            return Ok(ns);
        }
    }
    Ok(name.to_string())
}

fn is_nvme_controller(name: &str) -> bool {
    name.strip_prefix("nvme")
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn detect_bus(name: &str, sys: &Path) -> BusType {
    if name.starts_with("nvme") {
        return BusType::Nvme;
    }
    let resolved: PathBuf = std::fs::canonicalize(sys).unwrap_or_default();
    classify_sysfs_path(&resolved.to_string_lossy())
}

fn classify_sysfs_path(p: &str) -> BusType {
    if p.contains("/usb") {
        BusType::Usb
    } else if p.contains("/ata") {
        BusType::Sata
    } else if p.contains("/virtio") {
        BusType::Virtual
    } else if p.contains("/host") {
        BusType::Scsi
    } else {
        BusType::Unknown
    }
}

fn sysfs_size(sys: &Path) -> Option<u64> {
    read_attr(&sys.join("size"))
        .and_then(|s| s.parse::<u64>().ok())
        .map(|sectors| sectors * 512)
}

fn read_attr(p: &Path) -> Option<String> {
    std::fs::read_to_string(p).ok().as_deref().and_then(clean)
}

/// Unit serial number VPD page: 4-byte header then the ASCII serial.
fn vpd_serial(p: &Path) -> Option<String> {
    let bytes = std::fs::read(p).ok()?;
    let len = *bytes.get(3)? as usize;
    let end = (4 + len).min(bytes.len());
    clean(&String::from_utf8_lossy(bytes.get(4..end)?))
}
