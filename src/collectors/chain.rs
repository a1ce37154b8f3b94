use crate::collectors::{DeviceAccessAdapter, SmartReading};
use crate::error::{SmartError, SmartResult};
use crate::models::device::DeviceInfo;

/// Tries each access method in order; the first success wins and the last
/// failure is reported when all of them fail.
pub struct FallbackAdapter {
    methods: Vec<Box<dyn DeviceAccessAdapter>>,
}

impl FallbackAdapter {
    pub fn new(methods: Vec<Box<dyn DeviceAccessAdapter>>) -> Self {
        Self { methods }
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.name()).collect()
    }

    fn first_ok<T>(&self, op: &str, f: impl Fn(&dyn DeviceAccessAdapter) -> SmartResult<T>) -> SmartResult<T> {
        let mut last = SmartError::Unsupported(format!("no access method available for {}", op));
        for m in &self.methods {
            match f(m.as_ref()) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::debug!(method = m.name(), op, error = %e, "access method failed, trying next");
                    last = e;
                }
            }
        }
        Err(last)
    }
}

impl DeviceAccessAdapter for FallbackAdapter {
    fn name(&self) -> &str {
        "auto"
    }

    fn list_drives(&self) -> SmartResult<Vec<String>> {
        self.first_ok("list_drives", |m| m.list_drives())
    }

    fn basic_info(&self, path: &str) -> SmartResult<DeviceInfo> {
        self.first_ok("basic_info", |m| m.basic_info(path))
    }

    fn device_size(&self, path: &str) -> SmartResult<u64> {
        self.first_ok("device_size", |m| m.device_size(path))
    }

    fn read_smart(&self, path: &str) -> SmartResult<SmartReading> {
        self.first_ok("read_smart", |m| m.read_smart(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::smart::{NvmeHealthLog, SmartRecord};

    struct Fixed {
        name:   &'static str,
        result: SmartResult<SmartReading>,
    }

    impl DeviceAccessAdapter for Fixed {
        fn name(&self) -> &str { self.name }
        fn list_drives(&self) -> SmartResult<Vec<String>> { Err(SmartError::NoDrivesFound) }
        fn basic_info(&self, path: &str) -> SmartResult<DeviceInfo> { Ok(DeviceInfo::new(path)) }
        fn device_size(&self, _: &str) -> SmartResult<u64> { Err(SmartError::Unsupported("size".into())) }
        fn read_smart(&self, _: &str) -> SmartResult<SmartReading> { self.result.clone() }
    }

    fn reading(method: &str) -> SmartReading {
        SmartReading { record: SmartRecord::Nvme(NvmeHealthLog::default()), method: method.into() }
    }

    #[test]
    fn first_success_wins() {
        let chain = FallbackAdapter::new(vec![
            Box::new(Fixed { name: "a", result: Err(SmartError::AccessDenied("/dev/x".into())) }),
            Box::new(Fixed { name: "b", result: Ok(reading("b")) }),
            Box::new(Fixed { name: "c", result: Ok(reading("c")) }),
        ]);
        assert_eq!(chain.read_smart("/dev/x").unwrap().method, "b");
        assert_eq!(chain.method_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn last_error_is_reported() {
        let chain = FallbackAdapter::new(vec![
            Box::new(Fixed { name: "a", result: Err(SmartError::AccessDenied("/dev/x".into())) }),
            Box::new(Fixed { name: "b", result: Err(SmartError::DeviceNotFound("/dev/x".into())) }),
        ]);
        assert_eq!(chain.read_smart("/dev/x").unwrap_err(), SmartError::DeviceNotFound("/dev/x".into()));
        assert_eq!(chain.list_drives().unwrap_err(), SmartError::NoDrivesFound);
    }

    #[test]
    fn empty_chain_is_unsupported() {
        let chain = FallbackAdapter::new(Vec::new());
        assert!(matches!(chain.read_smart("/dev/x"), Err(SmartError::Unsupported(_))));
    }
}
