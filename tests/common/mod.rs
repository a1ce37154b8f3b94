#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use smartprobe::collectors::{DeviceAccessAdapter, SmartReading};
use smartprobe::models::device::DeviceInfo;
use smartprobe::models::smart::{DriveKind, NvmeHealthLog, SmartRecord};
use smartprobe::{SmartError, SmartResult};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// In-memory adapter that replays canned reads and counts calls.
pub struct ScriptedAdapter {
    pub info:        Option<DeviceInfo>,
    reads:           RefCell<VecDeque<SmartResult<SmartReading>>>,
    pub read_calls:  Cell<u32>,
    pub info_calls:  Cell<u32>,
}

impl ScriptedAdapter {
    pub fn new(model: &str, serial: &str) -> Self {
        let mut info = DeviceInfo::new("/dev/nvme0");
        info.model = Some(model.into());
        info.serial = Some(serial.into());
        info.kind = DriveKind::Nvme;
        Self { info: Some(info), reads: RefCell::default(), read_calls: Cell::new(0), info_calls: Cell::new(0) }
    }

    pub fn anonymous() -> Self {
        Self { info: None, ..Self::new("", "") }
    }

    pub fn then_ok(self, record: SmartRecord) -> Self {
        self.reads.borrow_mut().push_back(Ok(SmartReading { record, method: "scripted".into() }));
        self
    }

    pub fn then_err(self, err: SmartError) -> Self {
        self.reads.borrow_mut().push_back(Err(err));
        self
    }

    pub fn set_identity(&mut self, model: &str, serial: &str) {
        if let Some(info) = &mut self.info {
            info.model = Some(model.into());
            info.serial = Some(serial.into());
        }
    }
}

impl DeviceAccessAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    fn list_drives(&self) -> SmartResult<Vec<String>> {
        Ok(vec!["/dev/nvme0".into()])
    }

    fn basic_info(&self, path: &str) -> SmartResult<DeviceInfo> {
        self.info_calls.set(self.info_calls.get() + 1);
        self.info.clone().ok_or_else(|| SmartError::DeviceNotFound(path.into()))
    }

    fn device_size(&self, _path: &str) -> SmartResult<u64> {
        Ok(500_107_862_016)
    }

    fn read_smart(&self, _path: &str) -> SmartResult<SmartReading> {
        self.read_calls.set(self.read_calls.get() + 1);
        self.reads
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(SmartError::Error("script exhausted".into())))
    }
}

pub fn healthy_nvme() -> NvmeHealthLog {
    NvmeHealthLog {
        critical_warning: 0,
        temperature:      300,
        avail_spare:      50,
        spare_threshold:  10,
        percent_used:     10,
        ..Default::default()
    }
}

/// Manual clock anchored at a fixed instant.
pub fn t(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
}
