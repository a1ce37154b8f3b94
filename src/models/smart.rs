use crate::error::{SmartError, SmartResult};
use crate::util::decode::{self, array_at, Counter128};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of an NVMe SMART / Health Information log page and of the ATA SMART pages.
pub const SMART_PAGE_SIZE: usize = 512;
/// Attribute slots in an ATA SMART page.
pub const MAX_ATA_ATTRIBUTES: usize = 30;
pub const ATTR_NAME_MAX: usize = 32;

const ATA_ENTRY_SIZE: usize = 12;
const ATA_TABLE_OFFSET: usize = 2;

/// ATA attribute flag bits (word at offset 1 of each record).
pub const ATTR_FLAG_PREFAIL: u16 = 0x0001;
pub const ATTR_FLAG_ONLINE:  u16 = 0x0002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DriveKind {
    #[default]
    Unknown,
    Ata,
    Nvme,
}

impl DriveKind {
    pub fn label(&self) -> &'static str {
        match self {
            DriveKind::Unknown => "Unknown",
            DriveKind::Ata     => "ATA",
            DriveKind::Nvme    => "NVMe",
        }
    }
}

impl fmt::Display for DriveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── ATA ───────────────────────────────────────────────────────────────

/// One ATA SMART attribute row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtaAttribute {
    pub id:        u8,
    pub name:      String,
    pub flags:     u16,
    pub current:   u8,
    pub worst:     u8,
    pub threshold: u8,
    pub raw:       [u8; 6],
}

impl AtaAttribute {
    /// Build an attribute with the well-known name for `id`.
    pub fn new(id: u8, flags: u16, current: u8, worst: u8, threshold: u8, raw: [u8; 6]) -> Self {
        Self { id, name: attribute_name(id).to_string(), flags, current, worst, threshold, raw }
    }

    pub fn raw_value(&self) -> u64 {
        decode::decode_ata_raw6(self.raw)
    }

    pub fn is_prefail(&self) -> bool {
        self.flags & ATTR_FLAG_PREFAIL != 0
    }

    pub fn is_online(&self) -> bool {
        self.flags & ATTR_FLAG_ONLINE != 0
    }

    /// Normalised value has reached a non-zero vendor threshold.
    pub fn at_or_below_threshold(&self) -> bool {
        self.threshold > 0 && self.current <= self.threshold
    }
}

/// Ordered attribute table; insertion order is table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtaAttributeTable {
    attributes: Vec<AtaAttribute>,
}

impl AtaAttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute. Returns false (and drops it) once the table holds 30 entries.
    pub fn push(&mut self, mut attr: AtaAttribute) -> bool {
        if self.attributes.len() >= MAX_ATA_ATTRIBUTES {
            return false;
        }
        truncate_name(&mut attr.name);
        self.attributes.push(attr);
        true
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AtaAttribute> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize { self.attributes.len() }
    pub fn is_empty(&self) -> bool { self.attributes.is_empty() }

    pub fn get(&self, id: u8) -> Option<&AtaAttribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    /// Parse a READ DATA page, joining thresholds from a READ THRESHOLDS page when given.
    pub fn from_pages(data: &[u8], thresholds: Option<&[u8]>) -> SmartResult<Self> {
        check_len(data)?;
        if let Some(t) = thresholds {
            check_len(t)?;
        }

        let mut table = Self::new();
        for slot in 0..MAX_ATA_ATTRIBUTES {
            let off = ATA_TABLE_OFFSET + slot * ATA_ENTRY_SIZE;
            let id = data[off];
            if id == 0 { continue; }

            let flags   = decode::decode_u16_le(array_at(data, off + 1));
            let current = data[off + 3];
            let worst   = data[off + 4];
            let raw     = array_at::<6>(data, off + 5);
            let threshold = thresholds
                .map(|t| threshold_for(t, id, slot))
                .unwrap_or(0);

            table.push(AtaAttribute::new(id, flags, current, worst, threshold, raw));
        }
        Ok(table)
    }

    /// Serialise back into READ DATA and READ THRESHOLDS pages.
    pub fn to_pages(&self) -> ([u8; SMART_PAGE_SIZE], [u8; SMART_PAGE_SIZE]) {
        let mut data = [0u8; SMART_PAGE_SIZE];
        let mut thresh = [0u8; SMART_PAGE_SIZE];
        data[0] = 0x10;
        thresh[0] = 0x10;
        for (slot, a) in self.attributes.iter().enumerate() {
            let off = ATA_TABLE_OFFSET + slot * ATA_ENTRY_SIZE;
            data[off] = a.id;
            data[off + 1..off + 3].copy_from_slice(&a.flags.to_le_bytes());
            data[off + 3] = a.current;
            data[off + 4] = a.worst;
            data[off + 5..off + 11].copy_from_slice(&a.raw);
            thresh[off] = a.id;
            thresh[off + 1] = a.threshold;
        }
        (data, thresh)
    }

    /// Drive temperature from attribute 194 (or 190), low byte of the raw field.
    pub fn temperature_celsius(&self) -> Option<i32> {
        self.get(194)
            .or_else(|| self.get(190))
            .map(|a| a.raw[0] as i32)
            .filter(|t| *t > 0)
    }

    pub fn power_on_hours(&self) -> Option<u64> {
        self.get(9).map(|a| a.raw_value() & 0xFFFF_FFFF)
    }

    pub fn power_cycles(&self) -> Option<u64> {
        self.get(12).map(|a| a.raw_value())
    }
}

impl<'a> IntoIterator for &'a AtaAttributeTable {
    type Item = &'a AtaAttribute;
    type IntoIter = std::slice::Iter<'a, AtaAttribute>;
    fn into_iter(self) -> Self::IntoIter { self.attributes.iter() }
}

fn check_len(page: &[u8]) -> SmartResult<()> {
    if page.len() < SMART_PAGE_SIZE {
        return Err(SmartError::DataUnderflow { expected: SMART_PAGE_SIZE, actual: page.len() });
    }
    Ok(())
}

/// Threshold records normally share the data page's slot order; fall back to an id scan.
fn threshold_for(page: &[u8], id: u8, slot: usize) -> u8 {
    let off = ATA_TABLE_OFFSET + slot * ATA_ENTRY_SIZE;
    if page[off] == id {
        return page[off + 1];
    }
    (0..MAX_ATA_ATTRIBUTES)
        .map(|s| ATA_TABLE_OFFSET + s * ATA_ENTRY_SIZE)
        .find(|o| page[*o] == id)
        .map(|o| page[o + 1])
        .unwrap_or(0)
}

fn truncate_name(name: &mut String) {
    if name.len() > ATTR_NAME_MAX {
        let mut cut = ATTR_NAME_MAX;
        while !name.is_char_boundary(cut) { cut -= 1; }
        name.truncate(cut);
    }
}

/// Conventional name for a vendor attribute id.
pub fn attribute_name(id: u8) -> &'static str {
    match id {
        1   => "Raw_Read_Error_Rate",
        2   => "Throughput_Performance",
        3   => "Spin_Up_Time",
        4   => "Start_Stop_Count",
        5   => "Reallocated_Sector_Ct",
        7   => "Seek_Error_Rate",
        8   => "Seek_Time_Performance",
        9   => "Power_On_Hours",
        10  => "Spin_Retry_Count",
        11  => "Calibration_Retry_Count",
        12  => "Power_Cycle_Count",
        170 => "Available_Reservd_Space",
        171 => "Program_Fail_Count",
        172 => "Erase_Fail_Count",
        173 => "Wear_Leveling_Count",
        174 => "Unexpect_Power_Loss_Ct",
        177 => "Wear_Leveling_Count",
        181 => "Program_Fail_Cnt_Total",
        182 => "Erase_Fail_Count_Total",
        183 => "Runtime_Bad_Block",
        184 => "End-to-End_Error",
        187 => "Reported_Uncorrect",
        188 => "Command_Timeout",
        189 => "High_Fly_Writes",
        190 => "Airflow_Temperature_Cel",
        191 => "G-Sense_Error_Rate",
        192 => "Power-Off_Retract_Count",
        193 => "Load_Cycle_Count",
        194 => "Temperature_Celsius",
        195 => "Hardware_ECC_Recovered",
        196 => "Reallocated_Event_Count",
        197 => "Current_Pending_Sector",
        198 => "Offline_Uncorrectable",
        199 => "UDMA_CRC_Error_Count",
        200 => "Multi_Zone_Error_Rate",
        231 => "SSD_Life_Left",
        232 => "Available_Reservd_Space",
        233 => "Media_Wearout_Indicator",
        240 => "Head_Flying_Hours",
        241 => "Total_LBAs_Written",
        242 => "Total_LBAs_Read",
        _   => "Unknown_Attribute",
    }
}

// ── NVMe ──────────────────────────────────────────────────────────────

/// Bits of the NVMe critical warning byte.
pub mod critical_warning {
    pub const SPARE_BELOW_THRESHOLD:  u8 = 0x01;
    pub const TEMPERATURE:            u8 = 0x02;
    pub const RELIABILITY_DEGRADED:   u8 = 0x04;
    pub const READ_ONLY:              u8 = 0x08;
    pub const VOLATILE_BACKUP_FAILED: u8 = 0x10;
    pub const PMR_READ_ONLY:          u8 = 0x20;

    /// (bit, description) pairs in bit order.
    pub const DESCRIPTIONS: &[(u8, &str)] = &[
        (SPARE_BELOW_THRESHOLD,  "available spare below threshold"),
        (TEMPERATURE,            "temperature outside threshold"),
        (RELIABILITY_DEGRADED,   "NVM subsystem reliability degraded"),
        (READ_ONLY,              "media placed in read-only mode"),
        (VOLATILE_BACKUP_FAILED, "volatile memory backup failed"),
        (PMR_READ_ONLY,          "persistent memory region read-only"),
    ];
}

/// NVMe SMART / Health Information log page (log identifier 02h).
///
/// The ten 128-bit counters are kept as raw little-endian bytes, exactly as
/// they arrive from the controller, and decoded on access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NvmeHealthLog {
    pub critical_warning:      u8,
    /// Composite temperature in Kelvin; 0 when not reported.
    pub temperature:           u16,
    pub avail_spare:           u8,
    pub spare_threshold:       u8,
    pub percent_used:          u8,
    pub data_units_read:       [u8; 16],
    pub data_units_written:    [u8; 16],
    pub host_read_commands:    [u8; 16],
    pub host_write_commands:   [u8; 16],
    pub controller_busy_time:  [u8; 16],
    pub power_cycles:          [u8; 16],
    pub power_on_hours:        [u8; 16],
    pub unsafe_shutdowns:      [u8; 16],
    pub media_errors:          [u8; 16],
    pub num_error_log_entries: [u8; 16],
    /// Minutes spent above the warning composite temperature.
    pub warning_temp_time:     u32,
    /// Minutes spent above the critical composite temperature.
    pub critical_temp_time:    u32,
    /// Temperature sensors 1-8 in Kelvin; 0 = sensor absent.
    pub temp_sensors:          [u16; 8],
}

const COUNTERS_OFFSET: usize = 32;

impl NvmeHealthLog {
    pub fn from_bytes(page: &[u8]) -> SmartResult<Self> {
        check_len(page)?;
        let c = |i: usize| array_at::<16>(page, COUNTERS_OFFSET + i * 16);
        let mut temp_sensors = [0u16; 8];
        for (i, t) in temp_sensors.iter_mut().enumerate() {
            *t = decode::decode_u16_le(array_at(page, 200 + i * 2));
        }
        Ok(Self {
            critical_warning:      page[0],
            temperature:           decode::decode_u16_le(array_at(page, 1)),
            avail_spare:           page[3],
            spare_threshold:       page[4],
            percent_used:          page[5],
            data_units_read:       c(0),
            data_units_written:    c(1),
            host_read_commands:    c(2),
            host_write_commands:   c(3),
            controller_busy_time:  c(4),
            power_cycles:          c(5),
            power_on_hours:        c(6),
            unsafe_shutdowns:      c(7),
            media_errors:          c(8),
            num_error_log_entries: c(9),
            warning_temp_time:     decode::decode_u32_le(array_at(page, 192)),
            critical_temp_time:    decode::decode_u32_le(array_at(page, 196)),
            temp_sensors,
        })
    }

    pub fn to_bytes(&self) -> [u8; SMART_PAGE_SIZE] {
        let mut page = [0u8; SMART_PAGE_SIZE];
        page[0] = self.critical_warning;
        page[1..3].copy_from_slice(&self.temperature.to_le_bytes());
        page[3] = self.avail_spare;
        page[4] = self.spare_threshold;
        page[5] = self.percent_used;
        let counters = [
            &self.data_units_read, &self.data_units_written,
            &self.host_read_commands, &self.host_write_commands,
            &self.controller_busy_time, &self.power_cycles,
            &self.power_on_hours, &self.unsafe_shutdowns,
            &self.media_errors, &self.num_error_log_entries,
        ];
        for (i, c) in counters.iter().enumerate() {
            let off = COUNTERS_OFFSET + i * 16;
            page[off..off + 16].copy_from_slice(*c);
        }
        page[192..196].copy_from_slice(&self.warning_temp_time.to_le_bytes());
        page[196..200].copy_from_slice(&self.critical_temp_time.to_le_bytes());
        for (i, t) in self.temp_sensors.iter().enumerate() {
            page[200 + i * 2..202 + i * 2].copy_from_slice(&t.to_le_bytes());
        }
        page
    }

    pub fn has_warning(&self, bit: u8) -> bool {
        self.critical_warning & bit != 0
    }

    /// Descriptions of every critical-warning bit that is set.
    pub fn active_warnings(&self) -> Vec<&'static str> {
        critical_warning::DESCRIPTIONS.iter()
            .filter(|(bit, _)| self.has_warning(*bit))
            .map(|(_, d)| *d)
            .collect()
    }

    /// Composite temperature in °C (Kelvin - 273), `None` when not reported.
    pub fn temperature_celsius(&self) -> Option<i32> {
        (self.temperature > 0).then(|| self.temperature as i32 - 273)
    }

    pub fn data_units_read(&self) -> Counter128       { decode::decode_u64_le_128(self.data_units_read) }
    pub fn data_units_written(&self) -> Counter128    { decode::decode_u64_le_128(self.data_units_written) }
    pub fn host_read_commands(&self) -> Counter128    { decode::decode_u64_le_128(self.host_read_commands) }
    pub fn host_write_commands(&self) -> Counter128   { decode::decode_u64_le_128(self.host_write_commands) }
    pub fn controller_busy_time(&self) -> Counter128  { decode::decode_u64_le_128(self.controller_busy_time) }
    pub fn power_cycles(&self) -> Counter128          { decode::decode_u64_le_128(self.power_cycles) }
    pub fn power_on_hours(&self) -> Counter128        { decode::decode_u64_le_128(self.power_on_hours) }
    pub fn unsafe_shutdowns(&self) -> Counter128      { decode::decode_u64_le_128(self.unsafe_shutdowns) }
    pub fn media_errors(&self) -> Counter128          { decode::decode_u64_le_128(self.media_errors) }
    pub fn num_error_log_entries(&self) -> Counter128 { decode::decode_u64_le_128(self.num_error_log_entries) }

    /// Approximate bytes read (1 data unit = 1000 * 512 bytes).
    pub fn bytes_read(&self) -> u64    { self.data_units_read().saturating().saturating_mul(512_000) }
    pub fn bytes_written(&self) -> u64 { self.data_units_written().saturating().saturating_mul(512_000) }
}

// ── Canonical record ──────────────────────────────────────────────────

/// The decoded result of one SMART query. Exactly one variant is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmartRecord {
    Ata(AtaAttributeTable),
    Nvme(NvmeHealthLog),
}

impl SmartRecord {
    pub fn is_nvme(&self) -> bool {
        matches!(self, SmartRecord::Nvme(_))
    }

    pub fn kind(&self) -> DriveKind {
        match self {
            SmartRecord::Ata(_)  => DriveKind::Ata,
            SmartRecord::Nvme(_) => DriveKind::Nvme,
        }
    }

    pub fn as_nvme(&self) -> Option<&NvmeHealthLog> {
        match self {
            SmartRecord::Nvme(log) => Some(log),
            SmartRecord::Ata(_)    => None,
        }
    }

    pub fn as_ata(&self) -> Option<&AtaAttributeTable> {
        match self {
            SmartRecord::Ata(t)  => Some(t),
            SmartRecord::Nvme(_) => None,
        }
    }

    pub fn temperature_celsius(&self) -> Option<i32> {
        match self {
            SmartRecord::Ata(t)    => t.temperature_celsius(),
            SmartRecord::Nvme(log) => log.temperature_celsius(),
        }
    }

    pub fn power_on_hours(&self) -> Option<u64> {
        match self {
            SmartRecord::Ata(t)    => t.power_on_hours(),
            SmartRecord::Nvme(log) => Some(log.power_on_hours().saturating()),
        }
    }
}
