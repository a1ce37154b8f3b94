use crate::models::smart::DriveKind;
use serde::Serialize;

/// Physical bus a drive is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BusType {
    #[default]
    Unknown,
    Ata,
    Sata,
    Nvme,
    Scsi,
    Sas,
    Usb,
    Virtual,
}

impl BusType {
    pub fn label(&self) -> &'static str {
        match self {
            BusType::Unknown => "Unknown",
            BusType::Ata     => "ATA",
            BusType::Sata    => "SATA",
            BusType::Nvme    => "NVMe",
            BusType::Scsi    => "SCSI",
            BusType::Sas     => "SAS",
            BusType::Usb     => "USB",
            BusType::Virtual => "Virtual",
        }
    }

    /// Parse a transport name as reported by lsblk, sysfs or smartctl.
    pub fn from_transport(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ata" | "pata" => BusType::Ata,
            "sata"         => BusType::Sata,
            "nvme" | "pcie" => BusType::Nvme,
            "scsi"         => BusType::Scsi,
            "sas"          => BusType::Sas,
            "usb"          => BusType::Usb,
            "virtio" | "virtual" => BusType::Virtual,
            _              => BusType::Unknown,
        }
    }

    /// Protocol family SMART data is read with on this bus.
    pub fn drive_kind(&self) -> DriveKind {
        match self {
            BusType::Ata | BusType::Sata => DriveKind::Ata,
            BusType::Nvme                => DriveKind::Nvme,
            _                            => DriveKind::Unknown,
        }
    }
}

/// Identity of one drive, as returned by an adapter's basic-info query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub path:       String,
    pub model:      Option<String>,
    pub serial:     Option<String>,
    pub firmware:   Option<String>,
    pub kind:       DriveKind,
    pub bus:        BusType,
    pub rotational: Option<bool>,
    pub size_bytes: Option<u64>,
}

impl DeviceInfo {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    pub fn model_or_unknown(&self) -> &str {
        self.model.as_deref().unwrap_or("Unknown")
    }

    pub fn media_label(&self) -> &'static str {
        match (self.kind, self.rotational) {
            (DriveKind::Nvme, _)    => "NVMe",
            (_, Some(true))         => "HDD",
            (DriveKind::Ata, _)     => "SSD",
            _                       => "?",
        }
    }
}

/// Trim a reported identity string, treating blank as absent.
pub fn clean(s: &str) -> Option<String> {
    let t = s.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    (!t.is_empty()).then(|| t.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_names_map_to_kinds() {
        assert_eq!(BusType::from_transport("SATA").drive_kind(), DriveKind::Ata);
        assert_eq!(BusType::from_transport("nvme").drive_kind(), DriveKind::Nvme);
        assert_eq!(BusType::from_transport("usb").drive_kind(), DriveKind::Unknown);
    }

    #[test]
    fn clean_strips_padding() {
        assert_eq!(clean("  WDC WD10  \0\0"), Some("WDC WD10".to_string()));
        assert_eq!(clean("   "), None);
    }
}
